use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// Agent注册表为任务解析出的连接信息
#[derive(Debug, Clone)]
pub struct AgentBinding {
    pub address: String,
    pub credential: String,
}

/// 远程执行会话使用的凭证
///
/// 凭证是一个不含空白的可打印 ASCII 令牌，调试输出中不会泄露其内容。
#[derive(Clone, PartialEq, Eq)]
pub struct AgentCredential(String);

impl AgentCredential {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(SchedulerError::InvalidCredential("凭证为空".to_string()));
        }
        if !token.chars().all(|c| c.is_ascii_graphic()) {
            return Err(SchedulerError::InvalidCredential(
                "凭证包含非法字符".to_string(),
            ));
        }
        Ok(Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AgentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AgentCredential(***)")
    }
}

/// agent-status 任务上报的Agent健康信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub name: Option<String>,
    pub version: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl AgentHealth {
    pub fn healthy(name: String, version: String, status: String) -> Self {
        Self {
            name: Some(name),
            version: Some(version),
            status,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            name: None,
            version: None,
            status: "error".to_string(),
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}
