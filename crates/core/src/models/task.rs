use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SchedulerError;

/// 备份任务定义
///
/// 表示任务存储中一条被请求的操作记录。核心调度逻辑只读取任务并推进其状态，
/// 任务的创建由外部 API 负责。
///
/// # 字段说明
///
/// - `uuid`: 任务的唯一标识符，同时作为调度单元的关联键
/// - `op`: 请求的操作类型
/// - `status`: 任务当前状态，只能单调推进
/// - `target_uuid`: 操作针对的数据目标，备份和恢复任务以此判断互斥
/// - `archive_uuid`: 关联的归档，备份时写入、恢复和清理时读取
/// - `agent`: 执行该任务的远程 Agent 地址
/// - `target_plugin` / `target_endpoint`: 目标系统插件及其配置
/// - `store_plugin` / `store_endpoint`: 云存储插件及其配置
/// - `restore_key`: 恢复或清理时定位归档的键
/// - `compression`: 归档压缩方式
/// - `log`: 执行过程中累积的任务日志
///
/// # 使用示例
///
/// ```rust
/// use custodian_core::models::{Task, TaskOperation, TaskStatus};
///
/// let task = Task::new(TaskOperation::Backup, "10.0.0.5:5444");
/// assert_eq!(task.status, TaskStatus::Pending);
/// assert!(task.op.is_exclusive());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    pub op: TaskOperation,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub target_uuid: Option<Uuid>,
    #[serde(default)]
    pub archive_uuid: Option<Uuid>,
    pub agent: String,
    #[serde(default)]
    pub target_plugin: String,
    #[serde(default)]
    pub target_endpoint: String,
    #[serde(default)]
    pub store_plugin: String,
    #[serde(default)]
    pub store_endpoint: String,
    #[serde(default)]
    pub restore_key: String,
    #[serde(default)]
    pub compression: String,
    #[serde(default = "Utc::now")]
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log: String,
}

impl Task {
    /// 创建新的待处理任务
    pub fn new(op: TaskOperation, agent: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            op,
            status: TaskStatus::Pending,
            target_uuid: None,
            archive_uuid: None,
            agent: agent.into(),
            target_plugin: String::new(),
            target_endpoint: String::new(),
            store_plugin: String::new(),
            store_endpoint: String::new(),
            restore_key: String::new(),
            compression: String::new(),
            requested_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            log: String::new(),
        }
    }

    pub fn with_target(mut self, target_uuid: Uuid) -> Self {
        self.target_uuid = Some(target_uuid);
        self
    }

    pub fn with_archive(mut self, archive_uuid: Uuid) -> Self {
        self.archive_uuid = Some(archive_uuid);
        self
    }

    pub fn with_target_plugin(
        mut self,
        plugin: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        self.target_plugin = plugin.into();
        self.target_endpoint = endpoint.into();
        self
    }

    pub fn with_store_plugin(
        mut self,
        plugin: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        self.store_plugin = plugin.into();
        self.store_endpoint = endpoint.into();
        self
    }

    pub fn with_restore_key(mut self, restore_key: impl Into<String>) -> Self {
        self.restore_key = restore_key.into();
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = compression.into();
        self
    }

    /// 检查任务是否已被调度或正在运行
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// 任务操作类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOperation {
    Backup,
    Restore,
    Purge,
    AgentStatus,
    TestStore,
}

impl TaskOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOperation::Backup => "backup",
            TaskOperation::Restore => "restore",
            TaskOperation::Purge => "purge",
            TaskOperation::AgentStatus => "agent-status",
            TaskOperation::TestStore => "test-store",
        }
    }

    /// 同一目标上同时只能运行一个的操作（备份与恢复）
    pub fn is_exclusive(&self) -> bool {
        matches!(self, TaskOperation::Backup | TaskOperation::Restore)
    }
}

impl fmt::Display for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskOperation {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup" => Ok(TaskOperation::Backup),
            "restore" => Ok(TaskOperation::Restore),
            "purge" => Ok(TaskOperation::Purge),
            "agent-status" => Ok(TaskOperation::AgentStatus),
            "test-store" => Ok(TaskOperation::TestStore),
            other => Err(SchedulerError::InvalidCommand(format!(
                "未知的任务操作: {other}"
            ))),
        }
    }
}

/// 任务状态
///
/// 状态只能沿 `pending → scheduled → running → done | failed | canceled`
/// 方向推进，任何非终止状态都可以直接进入终止状态。
///
/// ```text
/// Pending → Scheduled → Running → Done
///    ↓          ↓          ↓
///  Failed    Failed    Failed / Canceled
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Scheduled,
    Running,
    Done,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Scheduled | TaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Scheduled => 1,
            TaskStatus::Running => 2,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled => 3,
        }
    }

    /// 检查状态流转是否单调向前
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
