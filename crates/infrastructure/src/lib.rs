//! 外部协作者的内存实现：任务存储、密钥保管库和静态Agent注册表。

pub mod agent_registry;
pub mod memory_store;
pub mod vault;

pub use agent_registry::StaticAgentRegistry;
pub use memory_store::{ArchiveRecord, InMemoryTaskStore};
pub use vault::InMemoryVault;
