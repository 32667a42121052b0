//! # 应用配置
//!
//! 通过 `config` crate 加载 TOML 配置文件，并叠加 `CUSTODIAN__` 前缀的环境变量，
//! 例如 `CUSTODIAN__SCHEDULER__THREADS=8`。未出现的字段使用各配置段的默认值。

mod sections;

pub use sections::*;

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub fabric: FabricConfig,
    pub encryption: EncryptionConfig,
    pub agents: Vec<AgentConfig>,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/custodian.toml",
                "custodian.toml",
                "/etc/custodian/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CUSTODIAN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("scheduler 配置无效")?;
        self.fabric.validate().context("fabric 配置无效")?;
        self.encryption.validate().context("encryption 配置无效")?;
        for agent in &self.agents {
            agent
                .validate()
                .with_context(|| format!("agent 配置无效: {}", agent.name))?;
        }
        self.observability
            .validate()
            .context("observability 配置无效")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.threads, 5);
        assert_eq!(config.scheduler.run_interval_ms, 125);
        assert_eq!(config.encryption.cipher, "aes256-ctr");
        assert_eq!(config.fabric.kind, FabricKind::Remote);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            threads = 2

            [fabric]
            kind = "simulation"
            simulation_delay_ms = 50

            [[agents]]
            name = "db01"
            address = "10.0.0.5:5444"
            credential = "token-db01"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.threads, 2);
        assert_eq!(config.scheduler.elevate_interval_seconds, 1);
        assert_eq!(config.fabric.kind, FabricKind::Simulation);
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].address, "10.0.0.5:5444");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.scheduler.threads = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.encryption.cipher = "des-cbc".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agents.push(AgentConfig {
            name: "blank".to_string(),
            address: " ".to_string(),
            credential: "x".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[scheduler]\nthreads = 3\n\n[encryption]\ncipher = \"twofish-cbc\"\nfixed_key = true"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.scheduler.threads, 3);
        assert_eq!(config.encryption.cipher, "twofish-cbc");
        assert!(config.encryption.fixed_key);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/custodian.toml")).is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_agents() {
        let mut config = AppConfig::default();
        config.agents.push(AgentConfig {
            name: "db01".to_string(),
            address: "10.0.0.5:5444".to_string(),
            credential: "token".to_string(),
        });
        let rendered = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.agents[0].name, "db01");
    }
}
