//! # custodian-core
//!
//! 备份编排系统的核心定义：错误类型、任务模型、外部协作者接口以及应用配置。
//!
//! 调度器、Fabric 和分发器都只依赖本 crate 中的接口，
//! 任务存储、密钥保管库和 Agent 注册表的具体实现由上层注入。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::{SchedulerError, SchedulerResult};
pub use models::*;
pub use traits::*;
