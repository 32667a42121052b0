//! # custodian-worker
//!
//! 调度核心：调度单元（[`Chore`]）、执行槽位（[`Worker`]）、
//! 带优先级的调度器（[`Scheduler`]）及其防饥饿提升，以及远程执行后端（[`Fabric`]）。

pub mod chore;
pub mod elevator;
pub mod fabric;
pub mod scheduler;
pub mod sink;
pub mod worker;

pub use chore::{
    Chore, ChoreCanceller, ChoreExit, ChoreHandle, ChoreOutput, ChoreTranscript,
    ABANDONED_EXIT_CODE, CANCELED_EXIT_CODE, CANCELED_SIGNAL,
};
pub use elevator::elevate_bands;
pub use fabric::{
    AgentCommand, AgentLine, ErrorFabric, Fabric, HttpTransport, RemoteFabric, RemoteSession,
    RemoteTransport, SimulationFabric,
};
pub use scheduler::{BacklogEntry, CancelOutcome, Scheduler, SchedulerStatus, PRIORITY_BANDS};
pub use sink::{ChoreInfo, ChoreSink, LoggingSink};
pub use worker::{Worker, WorkerStatus};
