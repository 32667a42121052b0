#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use custodian_core::{
    EncryptionConfig, EncryptionParams, SchedulerError, SchedulerResult, Task, TaskOperation,
    TaskStatus, TaskStore,
};
use custodian_dispatcher::{FabricResolver, TaskDispatcher, TaskReporter};
use custodian_infrastructure::{InMemoryTaskStore, InMemoryVault, StaticAgentRegistry};
use custodian_worker::{Chore, Fabric, Scheduler, SimulationFabric};
use uuid::Uuid;

pub const AGENT: &str = "10.0.0.5:5444";

/// 固定返回同一个后端，或者总是解析失败
pub struct StaticResolver {
    fabric: Option<Arc<dyn Fabric>>,
}

impl StaticResolver {
    pub fn with(fabric: Arc<dyn Fabric>) -> Self {
        Self {
            fabric: Some(fabric),
        }
    }

    pub fn unresolvable() -> Self {
        Self { fabric: None }
    }
}

#[async_trait]
impl FabricResolver for StaticResolver {
    async fn fabric_for(&self, task: &Task) -> SchedulerResult<Arc<dyn Fabric>> {
        match &self.fabric {
            Some(fabric) => Ok(Arc::clone(fabric)),
            None => Err(SchedulerError::AgentNotFound {
                address: task.agent.clone(),
            }),
        }
    }
}

/// 所有操作都输出一行错误并以指定退出码结束的后端
pub struct ExitFabric {
    pub code: i32,
}

impl ExitFabric {
    fn chore(&self, task: &Task) -> Chore {
        let code = self.code;
        Chore::new(task.uuid, move |handle| async move {
            handle.error(format!("agent exited with {code}"));
            handle.exit(code);
        })
    }
}

impl Fabric for ExitFabric {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn backup(&self, task: &Task, _encryption: &EncryptionParams) -> Chore {
        self.chore(task)
    }

    fn restore(&self, task: &Task, _encryption: &EncryptionParams) -> Chore {
        self.chore(task)
    }

    fn status(&self, task: &Task) -> Chore {
        self.chore(task)
    }

    fn purge(&self, task: &Task) -> Chore {
        self.chore(task)
    }

    fn test_store(&self, task: &Task) -> Chore {
        self.chore(task)
    }
}

pub struct Harness {
    pub store: InMemoryTaskStore,
    pub vault: InMemoryVault,
    pub registry: StaticAgentRegistry,
    pub scheduler: Arc<Scheduler>,
    pub dispatcher: TaskDispatcher,
}

impl Harness {
    pub fn new(resolver: StaticResolver, threads: usize) -> Self {
        let store = InMemoryTaskStore::new();
        let vault = InMemoryVault::new();
        let registry = StaticAgentRegistry::new(&[]);
        let reporter = TaskReporter::new(Arc::new(store.clone()), Arc::new(registry.clone()));
        let scheduler = Arc::new(Scheduler::new(threads, Arc::new(reporter)));
        let dispatcher = TaskDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(vault.clone()),
            Arc::new(resolver),
            Arc::clone(&scheduler),
            EncryptionConfig::default(),
        );
        Self {
            store,
            vault,
            registry,
            scheduler,
            dispatcher,
        }
    }

    pub fn simulated(delay: Duration, threads: usize) -> Self {
        Self::new(
            StaticResolver::with(Arc::new(SimulationFabric::new(AGENT, delay))),
            threads,
        )
    }

    pub async fn task(&self, uuid: Uuid) -> Task {
        self.store
            .get_task(uuid)
            .await
            .unwrap()
            .expect("任务不存在")
    }

    /// 反复驱动调度器直到任务到达指定状态
    pub async fn run_until_status(&self, uuid: Uuid, status: TaskStatus) -> Task {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                self.scheduler.run();
                let task = self.task(uuid).await;
                if task.status == status {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("任务未在预期时间内到达目标状态")
    }
}

/// 按顺序递增请求时间，保证待处理任务的读取顺序
pub fn task_at(op: TaskOperation, offset_ms: i64) -> Task {
    let mut task = Task::new(op, AGENT);
    task.requested_at = Utc::now() + chrono::Duration::milliseconds(offset_ms);
    task
}

pub fn backup_of(target: Uuid, offset_ms: i64) -> Task {
    task_at(TaskOperation::Backup, offset_ms)
        .with_target(target)
        .with_archive(Uuid::new_v4())
        .with_target_plugin("fs", "{\"base_dir\":\"/srv\"}")
        .with_store_plugin("s3", "{\"bucket\":\"b\"}")
        .with_compression("bzip2")
}

pub fn restore_of(target: Uuid, archive: Uuid, offset_ms: i64) -> Task {
    task_at(TaskOperation::Restore, offset_ms)
        .with_target(target)
        .with_archive(archive)
        .with_target_plugin("fs", "{\"base_dir\":\"/srv\"}")
        .with_store_plugin("s3", "{\"bucket\":\"b\"}")
        .with_restore_key("simulated/fs/key")
}
