use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use custodian_core::{AgentCredential, AgentRegistry, FabricKind, SchedulerResult, Task};
use custodian_worker::{Fabric, RemoteFabric, RemoteTransport, SimulationFabric};
use tracing::debug;

/// 为任务解析远程执行后端
#[async_trait]
pub trait FabricResolver: Send + Sync {
    async fn fabric_for(&self, task: &Task) -> SchedulerResult<Arc<dyn Fabric>>;
}

/// 根据Agent注册表和配置的后端类型解析 Fabric
pub struct AgentFabricResolver {
    registry: Arc<dyn AgentRegistry>,
    kind: FabricKind,
    transport: Arc<dyn RemoteTransport>,
    simulation_delay: Duration,
}

impl AgentFabricResolver {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        kind: FabricKind,
        transport: Arc<dyn RemoteTransport>,
        simulation_delay: Duration,
    ) -> Self {
        Self {
            registry,
            kind,
            transport,
            simulation_delay,
        }
    }
}

#[async_trait]
impl FabricResolver for AgentFabricResolver {
    async fn fabric_for(&self, task: &Task) -> SchedulerResult<Arc<dyn Fabric>> {
        match self.kind {
            FabricKind::Simulation => Ok(Arc::new(SimulationFabric::new(
                task.agent.clone(),
                self.simulation_delay,
            ))),
            FabricKind::Remote => {
                let binding = self.registry.binding_for(task).await?;
                let credential = AgentCredential::parse(&binding.credential)?;
                debug!("任务 {} 通过Agent {} 执行", task.uuid, binding.address);
                Ok(Arc::new(RemoteFabric::new(
                    binding.address,
                    credential,
                    Arc::clone(&self.transport),
                )))
            }
        }
    }
}
