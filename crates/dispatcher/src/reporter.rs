//! 调度单元输出的消费者，负责把执行结果写回任务存储

use std::sync::Arc;

use chrono::Utc;
use custodian_core::{
    AgentHealth, AgentRegistry, SchedulerError, SchedulerResult, Task, TaskOperation, TaskStore,
};
use custodian_worker::{ChoreExit, ChoreInfo, ChoreOutput, ChoreSink};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const LOG_SEPARATOR: &str = "\n\n------\n";

#[derive(Debug, Deserialize)]
struct BackupOutput {
    key: String,
    #[serde(default)]
    archive_size: i64,
}

#[derive(Debug, Deserialize)]
struct AgentStatusOutput {
    name: String,
    version: String,
    health: String,
}

/// 任务执行结果上报器
///
/// 错误通道的每一行在到达时立即追加到任务日志；信息通道的内容被累积，
/// 在退出状态到达后按任务类型解析。
#[derive(Clone)]
pub struct TaskReporter {
    store: Arc<dyn TaskStore>,
    registry: Arc<dyn AgentRegistry>,
}

impl TaskReporter {
    pub fn new(store: Arc<dyn TaskStore>, registry: Arc<dyn AgentRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn report(&self, chore: &ChoreInfo, output: ChoreOutput) -> SchedulerResult<()> {
        let uuid = chore.task_uuid;
        match chore.worker_id {
            Some(worker_id) => {
                if let Err(e) = self.store.mark_started(uuid, Utc::now()).await {
                    warn!("无法将任务 {} 标记为运行中: {}", uuid, e);
                }
                debug!(
                    "工作线程 {} 开始执行任务 {} (调度单元 {})",
                    worker_id, uuid, chore.id
                );
            }
            None => debug!("任务 {} 在执行前被取消 (调度单元 {})", uuid, chore.id),
        }

        let ChoreOutput {
            mut info,
            mut errors,
            exit,
        } = output;

        let store = &self.store;
        let log_errors = async {
            while let Some(line) = errors.recv().await {
                if let Err(e) = store.append_log(uuid, &format!("{line}\n")).await {
                    warn!("无法追加任务 {} 的日志: {}", uuid, e);
                }
            }
        };
        let gather_output = async {
            let mut gathered = String::new();
            while let Some(line) = info.recv().await {
                gathered.push_str(&line);
                gathered.push('\n');
            }
            gathered
        };
        let wait_exit = async { exit.await.unwrap_or_else(|_| ChoreExit::abandoned()) };

        let ((), gathered, exit) = tokio::join!(log_errors, gather_output, wait_exit);

        self.store.append_log(uuid, LOG_SEPARATOR).await?;

        let task = self
            .store
            .get_task(uuid)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id: uuid })?;

        let succeeded = self.finalize(&task, gathered.trim(), exit).await?;
        let now = Utc::now();
        if succeeded {
            info!("[{}] 任务 {} 执行成功", task.op, uuid);
            metrics::counter!("custodian_tasks_finished_total", "outcome" => "done").increment(1);
            self.store.mark_completed(uuid, now).await
        } else if exit == ChoreExit::canceled() {
            info!("[{}] 任务 {} 已取消", task.op, uuid);
            metrics::counter!("custodian_tasks_finished_total", "outcome" => "canceled")
                .increment(1);
            self.store.mark_canceled(uuid, now).await
        } else {
            warn!(
                "[{}] 任务 {} 执行失败: rc={} signal={:?}",
                task.op, uuid, exit.code, exit.signal
            );
            metrics::counter!("custodian_tasks_finished_total", "outcome" => "failed")
                .increment(1);
            self.store.mark_failed(uuid, now).await
        }
    }

    async fn finalize(&self, task: &Task, output: &str, exit: ChoreExit) -> SchedulerResult<bool> {
        match task.op {
            TaskOperation::Backup => self.finalize_backup(task, output, exit).await,
            TaskOperation::AgentStatus => self.finalize_status(task, output, exit).await,
            TaskOperation::Purge => {
                if !exit.success() {
                    return Ok(false);
                }
                if let Some(archive) = task.archive_uuid {
                    if let Err(e) = self.store.purge_archive(archive).await {
                        self.log(task.uuid, &format!("无法将归档 {archive} 标记为已清理: {e}\n"))
                            .await?;
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TaskOperation::Restore | TaskOperation::TestStore => Ok(exit.success()),
        }
    }

    async fn finalize_backup(
        &self,
        task: &Task,
        output: &str,
        exit: ChoreExit,
    ) -> SchedulerResult<bool> {
        if !exit.success() {
            return Ok(false);
        }

        let parsed: BackupOutput = match serde_json::from_str(output) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.log(task.uuid, &format!("BACKUP: 无法解析备份输出 `{output}`: {e}\n"))
                    .await?;
                return Ok(false);
            }
        };
        if parsed.key.is_empty() {
            self.log(task.uuid, "BACKUP: 备份输出中没有恢复键\n").await?;
            return Ok(false);
        }
        let Some(archive) = task.archive_uuid else {
            self.log(task.uuid, "BACKUP: 任务没有关联的归档\n").await?;
            return Ok(false);
        };

        self.log(
            task.uuid,
            &format!(
                "BACKUP: restore key  = {}\nBACKUP: archive size = {} bytes\n",
                parsed.key, parsed.archive_size
            ),
        )
        .await?;
        self.store
            .record_archive(task.uuid, archive, &parsed.key, parsed.archive_size)
            .await?;
        Ok(true)
    }

    async fn finalize_status(
        &self,
        task: &Task,
        output: &str,
        exit: ChoreExit,
    ) -> SchedulerResult<bool> {
        let (health, succeeded) = if !exit.success() {
            (
                AgentHealth::errored(format!("status 命令退出码 {}", exit.code)),
                false,
            )
        } else {
            match serde_json::from_str::<AgentStatusOutput>(output) {
                Ok(status) => (
                    AgentHealth::healthy(status.name, status.version, status.health),
                    true,
                ),
                Err(e) => {
                    self.log(task.uuid, &format!("STATUS: 无法解析状态输出 `{output}`: {e}\n"))
                        .await?;
                    (AgentHealth::errored(format!("无法解析状态输出: {e}")), false)
                }
            }
        };

        if let Err(e) = self.registry.update_health(&task.agent, health).await {
            error!("无法更新Agent {} 的健康状态: {}", task.agent, e);
        }
        Ok(succeeded)
    }

    async fn log(&self, uuid: Uuid, text: &str) -> SchedulerResult<()> {
        self.store.append_log(uuid, text).await
    }
}

impl ChoreSink for TaskReporter {
    fn consume(&self, chore: ChoreInfo, output: ChoreOutput) -> BoxFuture<'static, ()> {
        let reporter = self.clone();
        Box::pin(async move {
            if let Err(e) = reporter.report(&chore, output).await {
                error!(
                    "上报调度单元 {} (任务 {}) 的结果失败: {}",
                    chore.id, chore.task_uuid, e
                );
            }
        })
    }
}
