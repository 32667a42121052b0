use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::chore::{Chore, ChoreCanceller};

/// Worker的状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub id: usize,
    pub idle: bool,
    pub task_uuid: Option<Uuid>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct WorkerState {
    busy: bool,
    task_uuid: Option<Uuid>,
    last_seen: Option<DateTime<Utc>>,
    canceller: Option<ChoreCanceller>,
}

/// 执行槽位，同一时刻最多运行一个调度单元
pub struct Worker {
    id: usize,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: Mutex::new(WorkerState::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn available(&self) -> bool {
        !self.lock().busy
    }

    /// 将Worker标记为忙碌并记录调度单元，Worker已忙碌时返回 `false`
    pub(crate) fn reserve(&self, chore: &Chore) -> bool {
        let mut state = self.lock();
        if state.busy {
            return false;
        }
        state.busy = true;
        state.task_uuid = Some(chore.task_uuid());
        state.last_seen = Some(Utc::now());
        state.canceller = Some(chore.canceller());
        true
    }

    fn release(&self) {
        let mut state = self.lock();
        state.busy = false;
        state.canceller = None;
        state.last_seen = Some(Utc::now());
    }

    /// 向正在执行指定任务的调度单元发送取消信号
    pub(crate) fn cancel_running(&self, task_uuid: Uuid) -> bool {
        let state = self.lock();
        if !state.busy || state.task_uuid != Some(task_uuid) {
            return false;
        }
        match &state.canceller {
            Some(canceller) => {
                canceller.cancel();
                true
            }
            None => false,
        }
    }

    /// 向正在执行的调度单元发送取消信号
    pub(crate) fn cancel_current(&self) -> Option<Uuid> {
        let state = self.lock();
        if !state.busy {
            return None;
        }
        if let Some(canceller) = &state.canceller {
            canceller.cancel();
        }
        state.task_uuid
    }

    pub fn status(&self) -> WorkerStatus {
        let state = self.lock();
        WorkerStatus {
            id: self.id,
            idle: !state.busy,
            task_uuid: state.task_uuid,
            last_seen: state.last_seen,
        }
    }

    /// 占用Worker并执行调度单元直到闭包返回
    ///
    /// Worker正忙时直接丢弃调度单元。无论闭包正常返回还是panic，Worker都会恢复为空闲。
    pub async fn execute(&self, chore: Chore) {
        if !self.reserve(&chore) {
            warn!(
                "Worker {} 正忙，丢弃调度单元 {} (任务 {})",
                self.id,
                chore.id(),
                chore.task_uuid()
            );
            return;
        }
        self.run_reserved(chore).await;
    }

    /// 执行已通过 `reserve` 占用本Worker的调度单元
    pub(crate) async fn run_reserved(&self, chore: Chore) {
        let _release = ReleaseOnDrop(self);

        let chore_id = chore.id().to_string();
        let task_uuid = chore.task_uuid();
        debug!("Worker {} 开始执行调度单元 {} (任务 {})", self.id, chore_id, task_uuid);

        if let Err(panic) = AssertUnwindSafe(chore.run()).catch_unwind().await {
            error!(
                "Worker {} 执行调度单元 {} (任务 {}) 时发生panic: {}",
                self.id,
                chore_id,
                task_uuid,
                panic_message(panic.as_ref())
            );
        }

        debug!("Worker {} 完成调度单元 {}", self.id, chore_id);
    }
}

struct ReleaseOnDrop<'a>(&'a Worker);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}
