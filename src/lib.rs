//! # Custodian
//!
//! 备份与恢复编排守护进程：从任务存储读取待处理的备份、恢复、清理、
//! Agent状态检查和存储测试任务，按优先级交给固定大小的工作线程池，
//! 通过远程Agent执行并把结果写回任务存储。

pub mod app;
pub mod logging;
pub mod shutdown;

pub use app::{load_tasks, Application};
pub use logging::init_logging;
pub use shutdown::{ShutdownListener, ShutdownManager, ShutdownReason};
