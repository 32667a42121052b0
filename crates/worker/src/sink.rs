use futures::future::BoxFuture;
use tracing::{error, info};
use uuid::Uuid;

use crate::chore::ChoreOutput;

/// 被启动的调度单元的标识信息
#[derive(Debug, Clone)]
pub struct ChoreInfo {
    pub id: String,
    pub task_uuid: Uuid,
    /// 在队列中被取消、从未分配Worker时为 `None`
    pub worker_id: Option<usize>,
}

/// 调度单元输出的消费者
///
/// 调度器为每个被分配的调度单元调用一次 `consume`，返回的 future 与调度单元
/// 的执行在同一个任务中并发运行，必须读取全部三条通道直到退出状态到达。
/// 在队列中被取消的调度单元同样会交给消费者，此时退出状态为取消。
pub trait ChoreSink: Send + Sync {
    fn consume(&self, chore: ChoreInfo, output: ChoreOutput) -> BoxFuture<'static, ()>;
}

/// 只把输出写入日志的消费者
#[derive(Debug, Default, Clone)]
pub struct LoggingSink;

impl ChoreSink for LoggingSink {
    fn consume(&self, chore: ChoreInfo, output: ChoreOutput) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let transcript = output.collect().await;
            for line in &transcript.errors {
                info!(chore = %chore.id, task = %chore.task_uuid, "{}", line);
            }
            if transcript.exit.success() {
                info!(
                    "调度单元 {} 执行完成，输出 {} 行",
                    chore.id,
                    transcript.info.len()
                );
            } else {
                error!(
                    "调度单元 {} 执行失败: rc={} signal={:?}",
                    chore.id, transcript.exit.code, transcript.exit.signal
                );
            }
        })
    }
}
