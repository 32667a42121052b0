//! # Custodian API
//!
//! 调度器的只读HTTP观测接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /v2/health` - 存活检查
//! - `GET /v2/scheduler/status` - 工作线程与积压队列快照
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use custodian_api::create_app;
//! use custodian_worker::{LoggingSink, Scheduler};
//!
//! # async fn serve() -> std::io::Result<()> {
//! let scheduler = Arc::new(Scheduler::new(5, Arc::new(LoggingSink)));
//! let app = create_app(scheduler);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8888").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 响应格式
//!
//! ```json
//! {
//!   "success": true,
//!   "data": { "workers": [], "backlog": [] },
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use custodian_worker::Scheduler;

pub use response::ApiResponse;
pub use routes::{create_routes, AppState};

/// 创建带日志与追踪中间件的应用
pub fn create_app(scheduler: Arc<Scheduler>) -> Router {
    create_routes(AppState { scheduler })
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(middleware::cors_layer())
        .layer(middleware::trace_layer())
}
