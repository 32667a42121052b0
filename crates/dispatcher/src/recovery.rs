use std::sync::Arc;

use chrono::Utc;
use custodian_core::{SchedulerResult, TaskOperation, TaskStore};
use tracing::{debug, info, warn};

/// 启动恢复的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// 上次退出时仍在运行、现已标记为失败的任务数
    pub failed: usize,
    /// 从 `scheduled` 退回 `pending` 的任务数
    pub rescheduled: usize,
}

/// 启动时恢复任务状态
///
/// 上一个进程持有的调度单元已经全部丢失：运行中的任务无法继续，只能标记失败；
/// 已调度但未启动的任务退回待处理，由下一个分发周期重新调度。
pub struct RecoveryService {
    store: Arc<dyn TaskStore>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn recover_interrupted_tasks(&self) -> SchedulerResult<RecoveryReport> {
        info!("开始恢复上次运行中断的任务");

        let failed = self.store.fail_running_tasks(Utc::now()).await?;
        for task in &failed {
            warn!("[{}] 任务 {} 在调度器重启时仍在运行，已标记为失败", task.op, task.uuid);
            if let Err(e) = self
                .store
                .append_log(task.uuid, "TASK FAILED!!  调度器重启时任务仍在运行\n")
                .await
            {
                warn!("无法追加任务 {} 的日志: {}", task.uuid, e);
            }

            if task.op != TaskOperation::Backup {
                continue;
            }
            if let Some(archive) = task.archive_uuid {
                if let Err(e) = self.store.purge_archive(archive).await {
                    debug!("中断的备份 {} 没有可清理的归档 {}: {}", task.uuid, archive, e);
                }
            }
        }

        let rescheduled = self.store.unschedule_tasks().await?;

        let report = RecoveryReport {
            failed: failed.len(),
            rescheduled,
        };
        info!(
            "任务恢复完成: {} 个任务标记为失败, {} 个任务退回待处理",
            report.failed, report.rescheduled
        );
        Ok(report)
    }
}
