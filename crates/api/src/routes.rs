use std::sync::Arc;

use axum::{routing::get, Router};
use custodian_worker::Scheduler;

use crate::handlers::{health::health_check, scheduler::scheduler_status};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/v2/health", get(health_check))
        .route("/v2/scheduler/status", get(scheduler_status))
        .with_state(state)
}
