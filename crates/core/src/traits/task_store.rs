//! 任务存储接口定义
//!
//! 调度核心只通过 [`TaskStore`] 读取待处理任务并推进任务状态，
//! 持久化方式由实现决定。实现必须保证：
//!
//! - 状态只能单调推进（见 [`TaskStatus::can_transition_to`](crate::models::TaskStatus::can_transition_to)），
//!   非法流转返回 [`SchedulerError::InvalidTransition`]
//! - `mark_scheduled` 只接受 `pending` 状态的任务，这是防止重复分发的持久化保证
//! - `unschedule_tasks` 是唯一允许的回退，只在启动恢复时调用
//!
//! [`SchedulerError::InvalidTransition`]: crate::errors::SchedulerError::InvalidTransition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::SchedulerResult;
use crate::models::{Task, TaskOperation};

/// 任务存储接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 获取所有状态为 `pending` 的任务
    async fn get_pending_tasks(&self) -> SchedulerResult<Vec<Task>>;

    /// 获取指定操作类型中已调度或正在运行的任务
    async fn get_active_tasks(&self, ops: &[TaskOperation]) -> SchedulerResult<Vec<Task>>;

    async fn get_task(&self, uuid: Uuid) -> SchedulerResult<Option<Task>>;

    /// 将任务从 `pending` 标记为 `scheduled`
    async fn mark_scheduled(&self, uuid: Uuid) -> SchedulerResult<()>;

    async fn mark_started(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()>;

    async fn mark_completed(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()>;

    async fn mark_failed(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()>;

    async fn mark_canceled(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()>;

    /// 向任务日志追加文本
    async fn append_log(&self, uuid: Uuid, text: &str) -> SchedulerResult<()>;

    /// 记录备份任务产生的归档
    async fn record_archive(
        &self,
        task_uuid: Uuid,
        archive_uuid: Uuid,
        key: &str,
        size: i64,
    ) -> SchedulerResult<()>;

    /// 将归档标记为已清理
    async fn purge_archive(&self, archive_uuid: Uuid) -> SchedulerResult<()>;

    /// 启动恢复：将遗留的 `running` 任务标记为失败，返回受影响的任务
    async fn fail_running_tasks(&self, at: DateTime<Utc>) -> SchedulerResult<Vec<Task>>;

    /// 启动恢复：将遗留的 `scheduled` 任务退回 `pending`，返回受影响的数量
    async fn unschedule_tasks(&self) -> SchedulerResult<usize>;
}
