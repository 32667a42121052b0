pub mod agent_registry;
pub mod task_store;
pub mod vault;

pub use agent_registry::*;
pub use task_store::*;
pub use vault::*;
