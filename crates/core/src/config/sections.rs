use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::cipher_lengths;

/// 调度器与控制循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker池大小，即同时执行的调度单元上限
    pub threads: usize,
    pub run_interval_ms: u64,
    pub elevate_interval_seconds: u64,
    pub dispatch_interval_seconds: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: 5,
            run_interval_ms: 125,
            elevate_interval_seconds: 1,
            dispatch_interval_seconds: 1,
            shutdown_grace_seconds: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threads == 0 {
            return Err(anyhow::anyhow!("Worker线程数必须大于0"));
        }

        if self.run_interval_ms == 0 {
            return Err(anyhow::anyhow!("调度运行间隔必须大于0"));
        }

        if self.elevate_interval_seconds == 0 {
            return Err(anyhow::anyhow!("优先级提升间隔必须大于0"));
        }

        if self.dispatch_interval_seconds == 0 {
            return Err(anyhow::anyhow!("任务分发间隔必须大于0"));
        }

        Ok(())
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }

    pub fn elevate_interval(&self) -> Duration {
        Duration::from_secs(self.elevate_interval_seconds)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// 远程执行后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FabricKind {
    Remote,
    Simulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub kind: FabricKind,
    pub connect_timeout_seconds: u64,
    pub exec_path: String,
    pub simulation_delay_ms: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            kind: FabricKind::Remote,
            connect_timeout_seconds: 10,
            exec_path: "/v1/exec".to_string(),
            simulation_delay_ms: 2000,
        }
    }
}

impl FabricConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kind == FabricKind::Remote {
            if self.connect_timeout_seconds == 0 {
                return Err(anyhow::anyhow!("连接超时时间必须大于0"));
            }

            if !self.exec_path.starts_with('/') {
                return Err(anyhow::anyhow!(
                    "远程执行路径必须以 / 开头: {}",
                    self.exec_path
                ));
            }
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn simulation_delay(&self) -> Duration {
        Duration::from_millis(self.simulation_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub cipher: String,
    pub fixed_key: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            cipher: "aes256-ctr".to_string(),
            fixed_key: false,
        }
    }
}

impl EncryptionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if cipher_lengths(&self.cipher).is_none() {
            return Err(anyhow::anyhow!(
                "不支持的加密算法: {}，支持的前缀: [\"aes128\", \"aes256\", \"twofish\"]",
                self.cipher
            ));
        }

        Ok(())
    }
}

/// 静态注册的远程Agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub credential: String,
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            return Err(anyhow::anyhow!("Agent地址不能为空"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    /// 调度器状态接口的监听地址，为空时不启动
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_bind: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            status_bind: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        if let Some(bind) = &self.status_bind {
            if bind.trim().is_empty() {
                return Err(anyhow::anyhow!("状态接口监听地址不能为空字符串"));
            }
        }

        Ok(())
    }
}
