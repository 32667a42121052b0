use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodian_core::{
    SchedulerError, SchedulerResult, Task, TaskOperation, TaskStatus, TaskStore,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 备份产生的归档记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub uuid: Uuid,
    pub task_uuid: Uuid,
    pub key: String,
    pub size: i64,
    pub purged: bool,
    pub created_at: DateTime<Utc>,
}

/// 内存任务存储
///
/// 使用 `Arc<RwLock<HashMap>>` 保存任务与归档，适用于单进程部署和测试。
/// 状态流转规则与持久化实现一致：只能单调推进，`mark_scheduled` 只接受 `pending`。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    archives: Arc<RwLock<HashMap<Uuid, ArchiveRecord>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_tasks(tasks: Vec<Task>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.insert(task).await;
        }
        store
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.uuid, task);
    }

    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|task| task.requested_at);
        tasks
    }

    pub async fn archive(&self, uuid: Uuid) -> Option<ArchiveRecord> {
        self.archives.read().await.get(&uuid).cloned()
    }

    async fn transition(
        &self,
        uuid: Uuid,
        next: TaskStatus,
        at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&uuid)
            .ok_or(SchedulerError::TaskNotFound { id: uuid })?;

        let allowed = match next {
            TaskStatus::Scheduled => task.status == TaskStatus::Pending,
            _ => task.status.can_transition_to(next),
        };
        if !allowed {
            return Err(SchedulerError::InvalidTransition {
                id: uuid,
                from: task.status.to_string(),
                to: next.to_string(),
            });
        }

        debug!("任务 {} 状态变更: {} -> {}", uuid, task.status, next);
        task.status = next;
        match next {
            TaskStatus::Running => task.started_at = at,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled => task.stopped_at = at,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_pending_tasks(&self) -> SchedulerResult<Vec<Task>> {
        Ok(self
            .list()
            .await
            .into_iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .collect())
    }

    async fn get_active_tasks(&self, ops: &[TaskOperation]) -> SchedulerResult<Vec<Task>> {
        Ok(self
            .list()
            .await
            .into_iter()
            .filter(|task| task.is_active() && ops.contains(&task.op))
            .collect())
    }

    async fn get_task(&self, uuid: Uuid) -> SchedulerResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&uuid).cloned())
    }

    async fn mark_scheduled(&self, uuid: Uuid) -> SchedulerResult<()> {
        self.transition(uuid, TaskStatus::Scheduled, None).await
    }

    async fn mark_started(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.transition(uuid, TaskStatus::Running, Some(at)).await
    }

    async fn mark_completed(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.transition(uuid, TaskStatus::Done, Some(at)).await
    }

    async fn mark_failed(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.transition(uuid, TaskStatus::Failed, Some(at)).await
    }

    async fn mark_canceled(&self, uuid: Uuid, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.transition(uuid, TaskStatus::Canceled, Some(at)).await
    }

    async fn append_log(&self, uuid: Uuid, text: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&uuid)
            .ok_or(SchedulerError::TaskNotFound { id: uuid })?;
        task.log.push_str(text);
        Ok(())
    }

    async fn record_archive(
        &self,
        task_uuid: Uuid,
        archive_uuid: Uuid,
        key: &str,
        size: i64,
    ) -> SchedulerResult<()> {
        if self.tasks.read().await.get(&task_uuid).is_none() {
            return Err(SchedulerError::TaskNotFound { id: task_uuid });
        }

        self.archives.write().await.insert(
            archive_uuid,
            ArchiveRecord {
                uuid: archive_uuid,
                task_uuid,
                key: key.to_string(),
                size,
                purged: false,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn purge_archive(&self, archive_uuid: Uuid) -> SchedulerResult<()> {
        match self.archives.write().await.get_mut(&archive_uuid) {
            Some(archive) => {
                archive.purged = true;
                Ok(())
            }
            None => Err(SchedulerError::TaskStore(format!(
                "归档不存在: {archive_uuid}"
            ))),
        }
    }

    async fn fail_running_tasks(&self, at: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        let mut tasks = self.tasks.write().await;
        let mut failed = Vec::new();
        for task in tasks.values_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Failed;
                task.stopped_at = Some(at);
                failed.push(task.clone());
            }
        }
        Ok(failed)
    }

    async fn unschedule_tasks(&self) -> SchedulerResult<usize> {
        let mut tasks = self.tasks.write().await;
        let mut count = 0;
        for task in tasks.values_mut() {
            if task.status == TaskStatus::Scheduled {
                task.status = TaskStatus::Pending;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_lifecycle() {
        let task = Task::new(TaskOperation::Backup, "agent");
        let uuid = task.uuid;
        let store = InMemoryTaskStore::with_tasks(vec![task]).await;

        store.mark_scheduled(uuid).await.unwrap();
        assert!(store.mark_scheduled(uuid).await.is_err());
        store.mark_started(uuid, Utc::now()).await.unwrap();
        store.mark_completed(uuid, Utc::now()).await.unwrap();

        let task = store.get_task(uuid).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.started_at.is_some());
        assert!(task.stopped_at.is_some());

        assert!(matches!(
            store.mark_failed(uuid, Utc::now()).await,
            Err(SchedulerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_task_can_fail_directly() {
        let task = Task::new(TaskOperation::Purge, "agent");
        let uuid = task.uuid;
        let store = InMemoryTaskStore::with_tasks(vec![task]).await;

        store.append_log(uuid, "no agent\n").await.unwrap();
        store.mark_failed(uuid, Utc::now()).await.unwrap();
        assert!(store.mark_scheduled(uuid).await.is_err());
        assert_eq!(store.get_task(uuid).await.unwrap().unwrap().log, "no agent\n");
    }

    #[tokio::test]
    async fn test_active_task_filter() {
        let backup = Task::new(TaskOperation::Backup, "a");
        let status = Task::new(TaskOperation::AgentStatus, "a");
        let pending = Task::new(TaskOperation::Restore, "a");
        let store =
            InMemoryTaskStore::with_tasks(vec![backup.clone(), status.clone(), pending.clone()])
                .await;
        store.mark_scheduled(backup.uuid).await.unwrap();
        store.mark_scheduled(status.uuid).await.unwrap();

        let active = store
            .get_active_tasks(&[TaskOperation::Backup, TaskOperation::Restore])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].uuid, backup.uuid);

        let pending_tasks = store.get_pending_tasks().await.unwrap();
        assert_eq!(pending_tasks.len(), 1);
        assert_eq!(pending_tasks[0].uuid, pending.uuid);
    }

    #[tokio::test]
    async fn test_recovery_transitions() {
        let running = Task::new(TaskOperation::Backup, "a");
        let scheduled = Task::new(TaskOperation::Restore, "a");
        let store =
            InMemoryTaskStore::with_tasks(vec![running.clone(), scheduled.clone()]).await;
        store.mark_scheduled(running.uuid).await.unwrap();
        store.mark_started(running.uuid, Utc::now()).await.unwrap();
        store.mark_scheduled(scheduled.uuid).await.unwrap();

        let failed = store.fail_running_tasks(Utc::now()).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].uuid, running.uuid);
        assert_eq!(store.unschedule_tasks().await.unwrap(), 1);
        assert_eq!(
            store.get_task(scheduled.uuid).await.unwrap().unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_archive_records() {
        let task = Task::new(TaskOperation::Backup, "a");
        let archive = Uuid::new_v4();
        let store = InMemoryTaskStore::with_tasks(vec![task.clone()]).await;

        store.record_archive(task.uuid, archive, "key-1", 1024).await.unwrap();
        store.purge_archive(archive).await.unwrap();
        let record = store.archive(archive).await.unwrap();
        assert!(record.purged);
        assert_eq!(record.size, 1024);

        assert!(store.purge_archive(Uuid::new_v4()).await.is_err());
        assert!(store
            .record_archive(Uuid::new_v4(), archive, "k", 1)
            .await
            .is_err());
    }
}
