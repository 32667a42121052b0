use custodian_core::{EncryptionParams, SchedulerError, SchedulerResult, Task, TaskOperation};
use serde::{Deserialize, Serialize};

/// 发送给远程Agent的命令
///
/// 序列化为单个 JSON 对象，空字段不输出。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommand {
    pub operation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_plugin: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub store_plugin: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub store_endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restore_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypt_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypt_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypt_iv: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compression: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_uuid: String,
}

/// Agent输出流中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentLine {
    Output(String),
    Error(String),
}

impl AgentLine {
    /// 解析带 `O:` / `E:` 前缀的输出行
    pub fn parse(line: &str) -> SchedulerResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = line.strip_prefix("O:") {
            Ok(AgentLine::Output(rest.to_string()))
        } else if let Some(rest) = line.strip_prefix("E:") {
            Ok(AgentLine::Error(rest.to_string()))
        } else {
            Err(SchedulerError::MalformedResponse(format!(
                "无法识别的Agent输出行: {line:?}"
            )))
        }
    }
}

impl AgentCommand {
    /// 根据任务构造命令，备份和恢复需要提供加密参数
    pub fn for_task(task: &Task, encryption: Option<&EncryptionParams>) -> Self {
        let operation = match task.op {
            TaskOperation::AgentStatus => "status",
            other => other.as_str(),
        };

        let mut command = Self {
            operation: operation.to_string(),
            task_uuid: task.uuid.to_string(),
            ..Self::default()
        };

        match task.op {
            TaskOperation::Backup | TaskOperation::Restore => {
                command.target_plugin = task.target_plugin.clone();
                command.target_endpoint = task.target_endpoint.clone();
                command.store_plugin = task.store_plugin.clone();
                command.store_endpoint = task.store_endpoint.clone();
                command.compression = task.compression.clone();
                if task.op == TaskOperation::Restore {
                    command.restore_key = task.restore_key.clone();
                }
            }
            TaskOperation::Purge => {
                command.store_plugin = task.store_plugin.clone();
                command.store_endpoint = task.store_endpoint.clone();
                command.restore_key = task.restore_key.clone();
            }
            TaskOperation::TestStore => {
                command.store_plugin = task.store_plugin.clone();
                command.store_endpoint = task.store_endpoint.clone();
            }
            TaskOperation::AgentStatus => {}
        }

        if let Some(params) = encryption {
            command.encrypt_type = params.cipher.clone();
            command.encrypt_key = params.key.replace('-', "");
            command.encrypt_iv = params.iv.replace('-', "");
        }

        command
    }

    /// 按操作类型检查必填字段
    pub fn validate(&self) -> SchedulerResult<()> {
        let require = |value: &str, field: &str| -> SchedulerResult<()> {
            if value.is_empty() {
                Err(SchedulerError::InvalidCommand(format!(
                    "缺少必填字段 '{field}' ({} 操作)",
                    self.operation
                )))
            } else {
                Ok(())
            }
        };

        match self.operation.as_str() {
            "" => Err(SchedulerError::InvalidCommand(
                "缺少必填字段 'operation'".to_string(),
            )),
            "backup" => {
                require(&self.target_plugin, "target_plugin")?;
                require(&self.target_endpoint, "target_endpoint")?;
                require(&self.store_plugin, "store_plugin")?;
                require(&self.store_endpoint, "store_endpoint")
            }
            "restore" => {
                require(&self.target_plugin, "target_plugin")?;
                require(&self.target_endpoint, "target_endpoint")?;
                require(&self.store_plugin, "store_plugin")?;
                require(&self.store_endpoint, "store_endpoint")?;
                require(&self.restore_key, "restore_key")
            }
            "purge" => {
                require(&self.store_plugin, "store_plugin")?;
                require(&self.store_endpoint, "store_endpoint")?;
                require(&self.restore_key, "restore_key")
            }
            "test-store" => {
                require(&self.store_plugin, "store_plugin")?;
                require(&self.store_endpoint, "store_endpoint")
            }
            "status" => Ok(()),
            other => Err(SchedulerError::InvalidCommand(format!(
                "不支持的操作: '{other}'"
            ))),
        }
    }

    /// 校验后序列化为发送给Agent的载荷
    pub fn to_payload(&self) -> SchedulerResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// 一行人类可读的命令描述
    pub fn details(&self) -> String {
        match self.operation.as_str() {
            "backup" => format!(
                "backup of target '{}' to store '{}' with task_uuid '{}'",
                self.target_plugin, self.store_plugin, self.task_uuid
            ),
            "restore" => format!(
                "restore of [{}] from store '{}' to target '{}'",
                self.restore_key, self.store_plugin, self.target_plugin
            ),
            "purge" => format!(
                "purge of [{}] from store '{}'",
                self.restore_key, self.store_plugin
            ),
            other => format!("{other} op"),
        }
    }
}
