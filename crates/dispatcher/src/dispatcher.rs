//! # 任务分发器
//!
//! 每个分发周期把任务存储中的待处理任务转换为调度单元：
//!
//! 1. 收集正在进行的备份/恢复任务所针对的目标
//! 2. 读取全部 `pending` 任务
//! 3. 为每个任务解析 Fabric，解析失败的任务通过 [`ErrorFabric`] 记录错误后标记失败
//! 4. 备份/恢复在目标已有进行中的操作时跳过，否则准备加密参数后调度；
//!    清理、状态检查和存储测试无条件调度
//! 5. 调度成功的任务标记为 `scheduled`，这是防止重复分发的持久化保证

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use custodian_core::{
    EncryptionConfig, EncryptionParams, SchedulerError, SchedulerResult, Task, TaskOperation,
    TaskStatus, TaskStore, Vault,
};
use custodian_worker::{ErrorFabric, Scheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::priority::priority_for;
use crate::resolver::FabricResolver;

/// 单个分发周期的结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Scheduled,
    Skipped,
    Failed,
}

pub struct TaskDispatcher {
    store: Arc<dyn TaskStore>,
    vault: Arc<dyn Vault>,
    resolver: Arc<dyn FabricResolver>,
    scheduler: Arc<Scheduler>,
    encryption: EncryptionConfig,
}

impl TaskDispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        vault: Arc<dyn Vault>,
        resolver: Arc<dyn FabricResolver>,
        scheduler: Arc<Scheduler>,
        encryption: EncryptionConfig,
    ) -> Self {
        Self {
            store,
            vault,
            resolver,
            scheduler,
            encryption,
        }
    }

    /// 执行一个分发周期
    pub async fn dispatch(&self) -> SchedulerResult<DispatchReport> {
        let mut report = DispatchReport::default();

        let mut inflight: HashMap<Uuid, Uuid> = HashMap::new();
        for task in self
            .store
            .get_active_tasks(&[TaskOperation::Backup, TaskOperation::Restore])
            .await?
        {
            if let Some(target) = task.target_uuid {
                inflight.insert(target, task.uuid);
            }
        }

        let pending = self.store.get_pending_tasks().await?;
        if pending.is_empty() {
            return Ok(report);
        }
        info!(
            "开始分发 {} 个待处理任务 ({} 个目标有进行中的操作)",
            pending.len(),
            inflight.len()
        );

        for task in pending {
            if task.status != TaskStatus::Pending {
                continue;
            }
            match self.dispatch_task(&task, &mut inflight).await {
                Ok(Outcome::Scheduled) => report.scheduled += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("分发 [{}] 任务 {} 失败: {}", task.op, task.uuid, e);
                    report.errors += 1;
                }
            }
        }

        metrics::counter!("custodian_tasks_dispatched_total", "outcome" => "scheduled")
            .increment(report.scheduled as u64);
        metrics::counter!("custodian_tasks_dispatched_total", "outcome" => "failed")
            .increment(report.failed as u64);

        info!(
            "分发周期完成: 调度 {} 个, 跳过 {} 个, 失败 {} 个, 错误 {} 个",
            report.scheduled, report.skipped, report.failed, report.errors
        );
        Ok(report)
    }

    async fn dispatch_task(
        &self,
        task: &Task,
        inflight: &mut HashMap<Uuid, Uuid>,
    ) -> SchedulerResult<Outcome> {
        let fabric = match self.resolver.fabric_for(task).await {
            Ok(fabric) => fabric,
            Err(e) => return self.fail_unresolved(task, e).await,
        };

        let chore = match task.op {
            TaskOperation::Backup | TaskOperation::Restore => {
                let Some(target) = task.target_uuid else {
                    return self
                        .task_errored(task, format!("{} 任务没有指定目标", task.op))
                        .await;
                };
                if let Some(other) = inflight.get(&target) {
                    info!(
                        "跳过 [{}] 任务 {}，目标 {} 上已有进行中的任务 {}",
                        task.op, task.uuid, target, other
                    );
                    return Ok(Outcome::Skipped);
                }

                let params = match self.encryption_for(task).await {
                    Ok(params) => params,
                    Err(e) => {
                        return self
                            .task_errored(task, format!("无法获取加密参数: {e}"))
                            .await;
                    }
                };

                if task.op == TaskOperation::Backup {
                    fabric.backup(task, &params)
                } else {
                    fabric.restore(task, &params)
                }
            }
            TaskOperation::Purge => fabric.purge(task),
            TaskOperation::AgentStatus => fabric.status(task),
            TaskOperation::TestStore => fabric.test_store(task),
        };

        self.store.mark_scheduled(task.uuid).await?;

        let priority = priority_for(task.op);
        if let Err(e) = self.scheduler.schedule(priority, chore) {
            return self
                .task_errored(task, format!("无法调度任务: {e}"))
                .await;
        }

        if task.op.is_exclusive() {
            if let Some(target) = task.target_uuid {
                inflight.insert(target, task.uuid);
            }
        }

        debug!(
            "[{}] 任务 {} 已通过 {} 后端进入优先级带 {}",
            task.op,
            task.uuid,
            fabric.name(),
            priority
        );
        Ok(Outcome::Scheduled)
    }

    async fn encryption_for(&self, task: &Task) -> SchedulerResult<EncryptionParams> {
        let archive = task
            .archive_uuid
            .ok_or_else(|| SchedulerError::Encryption("任务没有关联的归档".to_string()))?;

        let params = match task.op {
            TaskOperation::Backup => {
                self.vault
                    .new_parameters(archive, &self.encryption.cipher, self.encryption.fixed_key)
                    .await?
            }
            _ => self.vault.retrieve(archive).await?.ok_or_else(|| {
                SchedulerError::Encryption(format!("归档 {archive} 没有加密参数"))
            })?,
        };

        if params.is_empty() {
            return Err(SchedulerError::Encryption(format!(
                "归档 {archive} 的加密参数为空"
            )));
        }
        Ok(params)
    }

    /// 解析不到执行后端的任务：运行错误调度单元，把输出写入任务日志后标记失败
    async fn fail_unresolved(&self, task: &Task, err: SchedulerError) -> SchedulerResult<Outcome> {
        error!(
            "无法为 [{}] 任务 {} 找到执行后端: {}",
            task.op, task.uuid, err
        );

        let transcript = ErrorFabric::new(&err)
            .chore(task)
            .run_to_completion()
            .await;

        let mut log = String::from("无法找到执行该任务的远程执行后端\n");
        for line in &transcript.errors {
            log.push_str(line);
            log.push('\n');
        }
        self.store.append_log(task.uuid, &log).await?;
        self.store.mark_failed(task.uuid, Utc::now()).await?;
        warn!("[{}] 任务 {} 已标记为失败", task.op, task.uuid);
        Ok(Outcome::Failed)
    }

    async fn task_errored(&self, task: &Task, message: String) -> SchedulerResult<Outcome> {
        error!("[{}] 任务 {} 出错: {}", task.op, task.uuid, message);
        self.store
            .append_log(task.uuid, &format!("TASK FAILED!!  {message}\n"))
            .await?;
        self.store.mark_failed(task.uuid, Utc::now()).await?;
        Ok(Outcome::Failed)
    }
}
