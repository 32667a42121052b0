use thiserror::Error;
use uuid::Uuid;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("优先级超出范围: {priority} (有效范围 0..{bands})")]
    PriorityOutOfRange { priority: usize, bands: usize },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },

    #[error("非法的任务状态流转: {id} {from} -> {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("未指定执行任务的远程Agent")]
    AgentNotSpecified,

    #[error("Agent未注册: {address}")]
    AgentNotFound { address: String },

    #[error("无效的Agent凭证: {0}")]
    InvalidCredential(String),

    #[error("加密参数错误: {0}")]
    Encryption(String),

    #[error("任务存储错误: {0}")]
    TaskStore(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的Agent命令: {0}")]
    InvalidCommand(String),

    #[error("Agent响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
