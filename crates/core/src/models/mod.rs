//! # 数据模型
//!
//! 任务存储中的任务记录、归档加密参数以及 Agent 相关的数据结构。
//!
//! ## 任务状态流转
//! ```text
//! pending → scheduled → running → done | failed | canceled
//! ```
//! 分发器只会选中状态恰好为 `pending` 的任务，状态变更由任务存储保证单调。

pub mod agent;
pub mod encryption;
pub mod task;

pub use agent::*;
pub use encryption::*;
pub use task::*;
