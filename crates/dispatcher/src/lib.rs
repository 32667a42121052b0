//! # 任务分发
//!
//! 连接任务存储与调度器：
//!
//! - [`TaskDispatcher`] 把待处理任务转换为调度单元并放入优先级带
//! - [`TaskReporter`] 消费调度单元输出，把日志、归档和最终状态写回存储
//! - [`RecoveryService`] 在启动时清理上一个进程遗留的任务状态
//! - [`FabricResolver`] 为任务选择远程执行后端

pub mod dispatcher;
pub mod priority;
pub mod recovery;
pub mod reporter;
pub mod resolver;

pub use dispatcher::{DispatchReport, TaskDispatcher};
pub use priority::*;
pub use recovery::{RecoveryReport, RecoveryService};
pub use reporter::TaskReporter;
pub use resolver::{AgentFabricResolver, FabricResolver};
