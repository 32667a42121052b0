use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use custodian_core::{
    AgentBinding, AgentConfig, AgentHealth, AgentRegistry, SchedulerError, SchedulerResult, Task,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 由配置文件静态注册的Agent表
#[derive(Debug, Clone, Default)]
pub struct StaticAgentRegistry {
    agents: Arc<HashMap<String, AgentConfig>>,
    health: Arc<RwLock<HashMap<String, AgentHealth>>>,
}

impl StaticAgentRegistry {
    pub fn new(agents: &[AgentConfig]) -> Self {
        let agents = agents
            .iter()
            .map(|agent| (agent.address.trim().to_string(), agent.clone()))
            .collect();
        Self {
            agents: Arc::new(agents),
            health: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentRegistry for StaticAgentRegistry {
    async fn binding_for(&self, task: &Task) -> SchedulerResult<AgentBinding> {
        let address = task.agent.trim();
        if address.is_empty() {
            return Err(SchedulerError::AgentNotSpecified);
        }

        let agent = self
            .agents
            .get(address)
            .ok_or_else(|| SchedulerError::AgentNotFound {
                address: address.to_string(),
            })?;

        Ok(AgentBinding {
            address: agent.address.trim().to_string(),
            credential: agent.credential.clone(),
        })
    }

    async fn update_health(&self, address: &str, health: AgentHealth) -> SchedulerResult<()> {
        if health.is_healthy() {
            info!("Agent {} 状态: {}", address, health.status);
        } else {
            warn!(
                "Agent {} 状态异常: {}",
                address,
                health.error.as_deref().unwrap_or("未知错误")
            );
        }
        self.health
            .write()
            .await
            .insert(address.to_string(), health);
        Ok(())
    }

    async fn health_of(&self, address: &str) -> SchedulerResult<Option<AgentHealth>> {
        Ok(self.health.read().await.get(address).cloned())
    }
}
