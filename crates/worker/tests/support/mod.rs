#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use custodian_worker::{Chore, ChoreInfo, ChoreOutput, ChoreSink, ChoreTranscript, Scheduler};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

/// 记录每个调度单元完整输出的消费者
#[derive(Clone, Default)]
pub struct RecordingSink {
    transcripts: Arc<Mutex<Vec<(ChoreInfo, ChoreTranscript)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcripts(&self) -> Vec<(ChoreInfo, ChoreTranscript)> {
        self.transcripts.lock().unwrap().clone()
    }

    pub fn transcript_for(&self, task_uuid: Uuid) -> Option<ChoreTranscript> {
        self.transcripts()
            .into_iter()
            .find(|(info, _)| info.task_uuid == task_uuid)
            .map(|(_, transcript)| transcript)
    }

    pub async fn wait_for(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.transcripts.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("调度单元未在预期时间内完成");
    }
}

impl ChoreSink for RecordingSink {
    fn consume(&self, chore: ChoreInfo, output: ChoreOutput) -> BoxFuture<'static, ()> {
        let transcripts = Arc::clone(&self.transcripts);
        Box::pin(async move {
            let transcript = output.collect().await;
            transcripts.lock().unwrap().push((chore, transcript));
        })
    }
}

/// 启动时上报标签并立即成功退出的调度单元
pub fn labelled_chore(label: &'static str, started: mpsc::UnboundedSender<&'static str>) -> Chore {
    Chore::new(Uuid::new_v4(), move |handle| async move {
        let _ = started.send(label);
        handle.exit(0);
    })
}

/// 反复调用 `run` 直到收集到 `count` 个启动标签
pub async fn run_until(
    scheduler: &Scheduler,
    started: &mut mpsc::UnboundedReceiver<&'static str>,
    count: usize,
) -> Vec<&'static str> {
    let mut order = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while order.len() < count {
            scheduler.run();
            tokio::select! {
                Some(label) = started.recv() => order.push(label),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    })
    .await
    .expect("调度单元未在预期时间内启动");
    order
}

pub async fn wait_until_idle(scheduler: &Scheduler) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.status().workers.iter().any(|w| !w.idle) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Worker未在预期时间内空闲");
}
