//! # 远程执行后端（Fabric）
//!
//! Fabric 把一个任务操作翻译成调度单元，闭包负责与远程 Agent 交互并把输出
//! 写入调度单元的通道。构造调度单元本身不做任何 I/O，可以在分发循环中直接调用。
//!
//! 三种实现：
//!
//! - [`RemoteFabric`]：通过认证的远程执行会话在 Agent 上运行命令
//! - [`SimulationFabric`]：不访问网络，按配置的延迟输出合成结果
//! - [`ErrorFabric`]：包装一个已知错误，所有操作都立即以非零退出码结束

mod command;
mod error;
mod remote;
mod simulation;
mod transport;

pub use command::{AgentCommand, AgentLine};
pub use error::ErrorFabric;
pub use remote::{RemoteFabric, RemoteSession, RemoteTransport};
pub use simulation::SimulationFabric;
pub use transport::HttpTransport;

use custodian_core::{EncryptionParams, Task};

use crate::chore::Chore;

/// 远程执行后端
pub trait Fabric: Send + Sync {
    fn name(&self) -> &'static str;

    fn backup(&self, task: &Task, encryption: &EncryptionParams) -> Chore;

    fn restore(&self, task: &Task, encryption: &EncryptionParams) -> Chore;

    fn status(&self, task: &Task) -> Chore;

    fn purge(&self, task: &Task) -> Chore;

    fn test_store(&self, task: &Task) -> Chore;
}
