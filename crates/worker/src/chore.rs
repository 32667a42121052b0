//! # 调度单元（Chore）
//!
//! Chore 封装一次远程操作：一个以 [`ChoreHandle`] 为参数的异步闭包，
//! 以及三条输出通道：
//!
//! - 信息通道：操作的结果输出（例如备份完成后的 JSON）
//! - 错误通道：执行过程中的日志和错误行，逐行实时送出
//! - 退出通道：一次性的 `(return_code, signal)`，只能由闭包发送，且恰好发送一次
//!
//! 调度器和 Worker 都不解析 Chore 的内容，输出由 [`ChoreSink`](crate::ChoreSink) 消费。

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

/// 被取消的调度单元使用的退出码与信号
pub const CANCELED_EXIT_CODE: i32 = 130;
pub const CANCELED_SIGNAL: i32 = 15;

/// 闭包未发送退出状态（提前返回或panic）时记录的退出码
pub const ABANDONED_EXIT_CODE: i32 = 255;

static CHORE_SERIAL: AtomicU64 = AtomicU64::new(0);

fn next_chore_id() -> String {
    let serial = CHORE_SERIAL.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{:08}", Utc::now().format("%Y%m%d-%H%M%S"), serial)
}

type ChoreFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type ChoreWork = Box<dyn FnOnce(ChoreHandle) -> ChoreFuture + Send + 'static>;

/// 调度单元的退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChoreExit {
    pub code: i32,
    pub signal: Option<i32>,
}

impl ChoreExit {
    pub fn new(code: i32, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    pub fn abandoned() -> Self {
        Self::new(ABANDONED_EXIT_CODE, None)
    }

    pub fn canceled() -> Self {
        Self::new(CANCELED_EXIT_CODE, Some(CANCELED_SIGNAL))
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

/// 闭包用来输出内容和上报退出状态的句柄
#[derive(Clone)]
pub struct ChoreHandle {
    id: Arc<str>,
    task_uuid: Uuid,
    info_tx: mpsc::UnboundedSender<String>,
    error_tx: mpsc::UnboundedSender<String>,
    exit_tx: Arc<Mutex<Option<oneshot::Sender<ChoreExit>>>>,
    cancel_rx: watch::Receiver<bool>,
}

impl ChoreHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_uuid(&self) -> Uuid {
        self.task_uuid
    }

    /// 输出一行结果
    pub fn info(&self, line: impl Into<String>) {
        let line = line.into();
        debug!(chore = %self.id, "O: {}", line);
        // 接收端已关闭时丢弃
        let _ = self.info_tx.send(line);
    }

    /// 输出一行日志或错误
    pub fn error(&self, line: impl Into<String>) {
        let line = line.into();
        debug!(chore = %self.id, "E: {}", line);
        let _ = self.error_tx.send(line);
    }

    /// 上报退出码，只有第一次调用生效，返回是否由本次调用发送
    pub fn exit(&self, code: i32) -> bool {
        self.send_exit(ChoreExit::new(code, None))
    }

    pub fn exit_with_signal(&self, code: i32, signal: i32) -> bool {
        self.send_exit(ChoreExit::new(code, Some(signal)))
    }

    fn send_exit(&self, exit: ChoreExit) -> bool {
        let sender = match self.exit_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => {
                debug!(chore = %self.id, "退出状态: rc={} signal={:?}", exit.code, exit.signal);
                let _ = tx.send(exit);
                true
            }
            None => {
                warn!(
                    chore = %self.id,
                    "忽略重复的退出状态: rc={} signal={:?}", exit.code, exit.signal
                );
                false
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// 等待取消信号，未被取消时永不完成
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// 用于向调度单元发送取消信号
#[derive(Clone)]
pub struct ChoreCanceller(Arc<watch::Sender<bool>>);

impl ChoreCanceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// 调度单元三条输出通道的接收端
pub struct ChoreOutput {
    pub info: mpsc::UnboundedReceiver<String>,
    pub errors: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<ChoreExit>,
}

/// 一次完整执行的输出记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoreTranscript {
    pub info: Vec<String>,
    pub errors: Vec<String>,
    pub exit: ChoreExit,
}

impl ChoreOutput {
    /// 读取全部输出直到退出状态到达且通道关闭
    pub async fn collect(self) -> ChoreTranscript {
        let ChoreOutput {
            mut info,
            mut errors,
            exit,
        } = self;

        let drain_info = async {
            let mut lines = Vec::new();
            while let Some(line) = info.recv().await {
                lines.push(line);
            }
            lines
        };
        let drain_errors = async {
            let mut lines = Vec::new();
            while let Some(line) = errors.recv().await {
                lines.push(line);
            }
            lines
        };
        let wait_exit = async { exit.await.unwrap_or_else(|_| ChoreExit::abandoned()) };

        let (info, errors, exit) = tokio::join!(drain_info, drain_errors, wait_exit);
        ChoreTranscript { info, errors, exit }
    }
}

/// 调度单元
pub struct Chore {
    id: Arc<str>,
    task_uuid: Uuid,
    work: ChoreWork,
    handle: ChoreHandle,
    output: Option<ChoreOutput>,
    cancel: ChoreCanceller,
}

impl Chore {
    /// 以任务UUID为关联键创建调度单元
    pub fn new<F, Fut>(task_uuid: Uuid, work: F) -> Self
    where
        F: FnOnce(ChoreHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id: Arc<str> = Arc::from(next_chore_id());
        let (info_tx, info_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = ChoreHandle {
            id: Arc::clone(&id),
            task_uuid,
            info_tx,
            error_tx,
            exit_tx: Arc::new(Mutex::new(Some(exit_tx))),
            cancel_rx,
        };

        Self {
            id,
            task_uuid,
            work: Box::new(move |handle| Box::pin(work(handle))),
            handle,
            output: Some(ChoreOutput {
                info: info_rx,
                errors: error_rx,
                exit: exit_rx,
            }),
            cancel: ChoreCanceller(Arc::new(cancel_tx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_uuid(&self) -> Uuid {
        self.task_uuid
    }

    pub fn canceller(&self) -> ChoreCanceller {
        self.cancel.clone()
    }

    /// 取出输出通道的接收端，只能取一次
    pub fn take_output(&mut self) -> Option<ChoreOutput> {
        self.output.take()
    }

    /// 不执行闭包，直接以取消状态结束调度单元
    ///
    /// 返回的输出通道中包含一行说明和取消退出状态，调用方仍需把它交给消费者。
    pub(crate) fn withdraw(mut self) -> Option<ChoreOutput> {
        let output = self.take_output();
        self.cancel.cancel();
        self.handle.error("调度单元在执行前被取消");
        self.handle.exit_with_signal(CANCELED_EXIT_CODE, CANCELED_SIGNAL);
        output
    }

    /// 执行闭包直到其返回
    pub async fn run(self) {
        let Chore {
            work,
            handle,
            cancel,
            ..
        } = self;
        work(handle).await;
        drop(cancel);
    }

    /// 在当前任务中执行并收集全部输出
    pub async fn run_to_completion(mut self) -> ChoreTranscript {
        let output = self.take_output();
        let run = self.run();
        match output {
            Some(output) => {
                let ((), transcript) = tokio::join!(run, output.collect());
                transcript
            }
            None => {
                run.await;
                ChoreTranscript {
                    info: Vec::new(),
                    errors: Vec::new(),
                    exit: ChoreExit::abandoned(),
                }
            }
        }
    }
}

impl std::fmt::Debug for Chore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chore")
            .field("id", &self.id)
            .field("task_uuid", &self.task_uuid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_is_sent_exactly_once() {
        let chore = Chore::new(Uuid::new_v4(), |handle| async move {
            assert!(handle.exit(0));
            assert!(!handle.exit(1));
            assert!(!handle.exit_with_signal(2, 9));
        });

        let transcript = chore.run_to_completion().await;
        assert_eq!(transcript.exit, ChoreExit::new(0, None));
    }

    #[tokio::test]
    async fn test_output_streams_are_kept_apart() {
        let chore = Chore::new(Uuid::new_v4(), |handle| async move {
            handle.error("starting");
            handle.info("{\"key\":\"k\"}");
            handle.error("done");
            handle.exit(0);
        });

        let transcript = chore.run_to_completion().await;
        assert_eq!(transcript.info, vec!["{\"key\":\"k\"}".to_string()]);
        assert_eq!(
            transcript.errors,
            vec!["starting".to_string(), "done".to_string()]
        );
        assert!(transcript.exit.success());
    }

    #[tokio::test]
    async fn test_missing_exit_is_abandoned() {
        let chore = Chore::new(Uuid::new_v4(), |handle| async move {
            handle.error("forgot to exit");
        });

        let transcript = chore.run_to_completion().await;
        assert_eq!(transcript.exit, ChoreExit::abandoned());
        assert!(!transcript.exit.success());
    }

    #[tokio::test]
    async fn test_cancellation_reaches_closure() {
        let chore = Chore::new(Uuid::new_v4(), |handle| async move {
            handle.cancelled().await;
            handle.exit_with_signal(CANCELED_EXIT_CODE, CANCELED_SIGNAL);
        });
        let canceller = chore.canceller();
        canceller.cancel();
        assert!(canceller.is_cancelled());

        let transcript = chore.run_to_completion().await;
        assert_eq!(transcript.exit, ChoreExit::canceled());
    }

    #[tokio::test]
    async fn test_withdrawn_chore_reports_cancellation_without_running() {
        let chore = Chore::new(Uuid::new_v4(), |handle| async move {
            handle.info("should not run");
            handle.exit(0);
        });

        let output = chore.withdraw().unwrap();
        let transcript = output.collect().await;
        assert!(transcript.info.is_empty());
        assert_eq!(transcript.errors.len(), 1);
        assert_eq!(transcript.exit, ChoreExit::canceled());
    }

    #[test]
    fn test_chore_ids_are_unique_and_formatted() {
        let a = Chore::new(Uuid::new_v4(), |_| async {});
        let b = Chore::new(Uuid::new_v4(), |_| async {});
        assert_ne!(a.id(), b.id());
        let parts: Vec<&str> = a.id().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
    }
}
