use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{AgentBinding, AgentHealth, Task};

/// Agent注册表接口
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// 解析任务所属Agent的地址与凭证
    async fn binding_for(&self, task: &Task) -> SchedulerResult<AgentBinding>;

    /// 记录 agent-status 任务上报的健康信息
    async fn update_health(&self, address: &str, health: AgentHealth) -> SchedulerResult<()>;

    async fn health_of(&self, address: &str) -> SchedulerResult<Option<AgentHealth>>;
}
