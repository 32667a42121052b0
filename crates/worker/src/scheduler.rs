//! # 调度器
//!
//! 固定大小的 Worker 池加上按优先级分带的 FIFO 队列。
//!
//! - 优先级带编号为 `0..PRIORITY_BANDS`，0 为最高优先级
//! - 同一优先级带内先进先出，不同带之间严格按优先级选择（优先级提升除外）
//! - 同时执行的调度单元数量恰好受 Worker 数量限制
//!
//! `schedule`、`run`、`elevate` 共用同一把锁，锁内只做 O(1) 的簿记，
//! 调度单元在锁外以独立的 tokio 任务执行。
//!
//! ```rust
//! use std::sync::Arc;
//! use custodian_worker::{Chore, LoggingSink, Scheduler};
//! use uuid::Uuid;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = Scheduler::new(2, Arc::new(LoggingSink));
//! let chore = Chore::new(Uuid::new_v4(), |handle| async move {
//!     handle.info("{}");
//!     handle.exit(0);
//! });
//! scheduler.schedule(20, chore).unwrap();
//! assert_eq!(scheduler.run(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use custodian_core::{SchedulerError, SchedulerResult};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chore::Chore;
use crate::sink::{ChoreInfo, ChoreSink};
use crate::worker::{Worker, WorkerStatus};

/// 优先级带数量
pub const PRIORITY_BANDS: usize = 100;

const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// 积压队列中的一项，`priority` 即调度时使用的优先级带编号
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacklogEntry {
    pub priority: usize,
    pub position: usize,
    pub task_uuid: Uuid,
    pub chore_id: String,
}

/// 调度器状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub workers: Vec<WorkerStatus>,
    pub backlog: Vec<BacklogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 调度单元尚在队列中，已被移除并以取消状态交给消费者
    Dequeued,
    /// 调度单元正在执行，已发送取消信号
    Signalled,
    NotFound,
}

pub struct Scheduler {
    bands: Mutex<Vec<VecDeque<Chore>>>,
    workers: Vec<Arc<Worker>>,
    sink: Arc<dyn ChoreSink>,
    running: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// 创建包含 `threads` 个 Worker 的调度器
    pub fn new(threads: usize, sink: Arc<dyn ChoreSink>) -> Self {
        info!("初始化调度器: {} 个Worker, {} 个优先级带", threads, PRIORITY_BANDS);
        Self {
            bands: Mutex::new((0..PRIORITY_BANDS).map(|_| VecDeque::new()).collect()),
            workers: (1..=threads).map(|id| Arc::new(Worker::new(id))).collect(),
            sink,
            running: Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) fn lock_bands(&self) -> MutexGuard<'_, Vec<VecDeque<Chore>>> {
        self.bands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_running(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.lock_bands().iter().map(VecDeque::len).sum()
    }

    /// 将调度单元追加到指定优先级带的末尾
    pub fn schedule(&self, priority: usize, chore: Chore) -> SchedulerResult<()> {
        if priority >= PRIORITY_BANDS {
            return Err(SchedulerError::PriorityOutOfRange {
                priority,
                bands: PRIORITY_BANDS,
            });
        }

        debug!(
            "调度单元 {} (任务 {}) 进入优先级带 {}",
            chore.id(),
            chore.task_uuid(),
            priority
        );

        let backlog = {
            let mut bands = self.lock_bands();
            bands[priority].push_back(chore);
            bands.iter().map(VecDeque::len).sum::<usize>()
        };

        metrics::counter!("custodian_chores_scheduled_total").increment(1);
        metrics::gauge!("custodian_scheduler_backlog").set(backlog as f64);
        Ok(())
    }

    /// 为每个空闲的 Worker 分配最高优先级的调度单元，返回分配数量
    ///
    /// 执行在独立的任务中进行，本方法立即返回。
    pub fn run(&self) -> usize {
        let mut assignments = Vec::new();
        let backlog = {
            let mut bands = self.lock_bands();
            for worker in &self.workers {
                if !worker.available() {
                    continue;
                }
                let Some(band) = bands.iter().position(|queue| !queue.is_empty()) else {
                    break;
                };
                let Some(chore) = bands[band].pop_front() else {
                    break;
                };
                if !worker.reserve(&chore) {
                    bands[band].push_front(chore);
                    continue;
                }
                assignments.push((Arc::clone(worker), chore));
            }
            bands.iter().map(VecDeque::len).sum::<usize>()
        };

        let assigned = assignments.len();
        for (worker, chore) in assignments {
            self.launch(worker, chore);
        }

        if assigned > 0 {
            metrics::counter!("custodian_chores_assigned_total").increment(assigned as u64);
            metrics::gauge!("custodian_scheduler_backlog").set(backlog as f64);
        }
        assigned
    }

    fn launch(&self, worker: Arc<Worker>, mut chore: Chore) {
        let chore_info = ChoreInfo {
            id: chore.id().to_string(),
            task_uuid: chore.task_uuid(),
            worker_id: Some(worker.id()),
        };
        info!(
            "将调度单元 {} (任务 {}) 分配给 Worker {}",
            chore_info.id,
            chore_info.task_uuid,
            worker.id()
        );

        let consumer = chore
            .take_output()
            .map(|output| self.sink.consume(chore_info, output));

        let mut running = self.lock_running();
        while running.try_join_next().is_some() {}
        running.spawn(async move {
            let execution = worker.run_reserved(chore);
            match consumer {
                Some(consumer) => {
                    tokio::join!(execution, consumer);
                }
                None => execution.await,
            }
        });
    }

    /// 当前调度器状态的快照
    pub fn status(&self) -> SchedulerStatus {
        let backlog = {
            let bands = self.lock_bands();
            bands
                .iter()
                .enumerate()
                .flat_map(|(band, queue)| {
                    queue
                        .iter()
                        .enumerate()
                        .map(move |(position, chore)| BacklogEntry {
                            priority: band,
                            position,
                            task_uuid: chore.task_uuid(),
                            chore_id: chore.id().to_string(),
                        })
                })
                .collect()
        };

        SchedulerStatus {
            workers: self.workers.iter().map(|worker| worker.status()).collect(),
            backlog,
        }
    }

    /// 取消任务对应的调度单元
    ///
    /// 队列中的调度单元不再执行，直接以取消状态交给消费者；
    /// 正在执行的调度单元收到取消信号后自行退出。
    pub fn cancel(&self, task_uuid: Uuid) -> CancelOutcome {
        let dequeued = {
            let mut bands = self.lock_bands();
            bands.iter_mut().find_map(|queue| {
                let position = queue.iter().position(|c| c.task_uuid() == task_uuid)?;
                queue.remove(position)
            })
        };

        if let Some(chore) = dequeued {
            info!("已从队列中移除调度单元 {} (任务 {})", chore.id(), task_uuid);
            self.withdraw(chore);
            metrics::gauge!("custodian_scheduler_backlog").set(self.backlog_len() as f64);
            return CancelOutcome::Dequeued;
        }

        if self
            .workers
            .iter()
            .any(|worker| worker.cancel_running(task_uuid))
        {
            info!("已向任务 {} 的调度单元发送取消信号", task_uuid);
            return CancelOutcome::Signalled;
        }

        CancelOutcome::NotFound
    }

    fn withdraw(&self, chore: Chore) {
        let chore_info = ChoreInfo {
            id: chore.id().to_string(),
            task_uuid: chore.task_uuid(),
            worker_id: None,
        };
        let Some(output) = chore.withdraw() else {
            return;
        };
        let consumer = self.sink.consume(chore_info, output);

        let mut running = self.lock_running();
        while running.try_join_next().is_some() {}
        running.spawn(consumer);
    }

    /// 丢弃积压队列并等待正在执行的调度单元结束
    ///
    /// 超过 `grace` 后向仍在执行的调度单元发送取消信号，再等待片刻后强制终止。
    pub async fn shutdown(&self, grace: Duration) {
        let dropped = {
            let mut bands = self.lock_bands();
            let dropped: usize = bands.iter().map(VecDeque::len).sum();
            bands.iter_mut().for_each(VecDeque::clear);
            dropped
        };
        if dropped > 0 {
            warn!("停止调度，丢弃 {} 个尚未执行的调度单元", dropped);
        }

        let mut running = std::mem::take(&mut *self.lock_running());
        if running.is_empty() {
            return;
        }

        info!("等待 {} 个正在执行的调度单元结束", running.len());
        let drained = tokio::time::timeout(grace, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return;
        }

        warn!("等待超时，取消仍在执行的调度单元");
        for worker in &self.workers {
            if let Some(task_uuid) = worker.cancel_current() {
                info!("取消 Worker {} 上的任务 {}", worker.id(), task_uuid);
            }
        }

        let cancelled = tokio::time::timeout(CANCEL_GRACE, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if cancelled.is_err() {
            warn!("强制终止 {} 个调度单元", running.len());
            running.shutdown().await;
        }
    }
}
