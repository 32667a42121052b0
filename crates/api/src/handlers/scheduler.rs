use axum::extract::State;
use custodian_worker::SchedulerStatus;

use crate::{response::ApiResponse, routes::AppState};

/// 获取工作线程和积压队列的快照
pub async fn scheduler_status(State(state): State<AppState>) -> ApiResponse<SchedulerStatus> {
    ApiResponse::success(state.scheduler.status())
}
