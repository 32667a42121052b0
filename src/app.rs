use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use custodian_api::create_app;
use custodian_core::{AgentRegistry, AppConfig, Task, TaskStore};
use custodian_dispatcher::{AgentFabricResolver, RecoveryService, TaskDispatcher, TaskReporter};
use custodian_infrastructure::{InMemoryTaskStore, InMemoryVault, StaticAgentRegistry};
use custodian_worker::{HttpTransport, Scheduler};
use tokio::{net::TcpListener, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info};

use crate::shutdown::ShutdownListener;

/// 主应用程序
///
/// 持有调度器与分发器，`run` 依次完成启动恢复、状态接口、分发循环和控制循环，
/// 收到关闭信号后在宽限期内排空正在执行的调度单元。
pub struct Application {
    config: AppConfig,
    store: Arc<dyn TaskStore>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<TaskDispatcher>,
    recovery: RecoveryService,
}

impl Application {
    /// 使用空的内存任务存储创建应用
    ///
    /// 内存存储之外没有任务来源，守护进程将一直空转；需要处理任务时使用
    /// [`Application::with_tasks`] 预置任务，或通过 [`Application::with_store`]
    /// 注入外部的任务存储实现。
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(InMemoryTaskStore::new()))
    }

    /// 使用预置了给定任务的内存任务存储创建应用
    pub async fn with_tasks(config: AppConfig, tasks: Vec<Task>) -> Result<Self> {
        info!("向内存任务存储预置 {} 个任务", tasks.len());
        let store = InMemoryTaskStore::with_tasks(tasks).await;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn TaskStore>) -> Result<Self> {
        info!(
            "初始化应用程序: {} 个工作线程, {:?} 后端, {} 个已注册Agent",
            config.scheduler.threads,
            config.fabric.kind,
            config.agents.len()
        );

        let registry: Arc<dyn AgentRegistry> = Arc::new(StaticAgentRegistry::new(&config.agents));
        let transport = HttpTransport::new(
            config.fabric.connect_timeout(),
            config.fabric.exec_path.clone(),
        )
        .context("创建Agent传输层失败")?;

        let resolver = AgentFabricResolver::new(
            Arc::clone(&registry),
            config.fabric.kind,
            Arc::new(transport),
            config.fabric.simulation_delay(),
        );
        let reporter = TaskReporter::new(Arc::clone(&store), registry);
        let scheduler = Arc::new(Scheduler::new(config.scheduler.threads, Arc::new(reporter)));
        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::clone(&store),
            Arc::new(InMemoryVault::new()),
            Arc::new(resolver),
            Arc::clone(&scheduler),
            config.encryption.clone(),
        ));

        Ok(Self {
            recovery: RecoveryService::new(Arc::clone(&store)),
            store,
            config,
            scheduler,
            dispatcher,
        })
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        self.recovery
            .recover_interrupted_tasks()
            .await
            .context("恢复中断的任务失败")?;

        let status_server = match &self.config.observability.status_bind {
            Some(bind) => Some(self.start_status_server(bind, shutdown.clone()).await?),
            None => None,
        };

        let dispatch_handle = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let interval = self.config.scheduler.dispatch_interval();
            let listener = shutdown.clone();
            tokio::spawn(async move {
                run_dispatch_loop(dispatcher, interval, listener).await;
            })
        };

        run_control_loop(
            &self.scheduler,
            self.config.scheduler.run_interval(),
            self.config.scheduler.elevate_interval(),
            &mut shutdown,
        )
        .await;

        if let Err(e) = dispatch_handle.await {
            error!("分发循环异常退出: {}", e);
        }

        self.scheduler
            .shutdown(self.config.scheduler.shutdown_grace())
            .await;

        if let Some(server) = status_server {
            if let Err(e) = server.await {
                error!("状态接口异常退出: {}", e);
            }
        }

        info!("调度器已停止");
        Ok(())
    }

    async fn start_status_server(
        &self,
        bind: &str,
        mut shutdown: ShutdownListener,
    ) -> Result<JoinHandle<()>> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("绑定地址失败: {bind}"))?;
        info!("调度器状态接口启动在 http://{}", bind);

        let app = create_app(Arc::clone(&self.scheduler));
        Ok(tokio::spawn(async move {
            let stop = async move {
                shutdown.triggered().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop)
                .await
            {
                error!("状态接口运行失败: {}", e);
            }
        }))
    }
}

/// 控制循环：高频分配空闲工作线程，低频执行优先级提升
async fn run_control_loop(
    scheduler: &Scheduler,
    run_every: Duration,
    elevate_every: Duration,
    shutdown: &mut ShutdownListener,
) {
    let mut run_tick = tokio::time::interval(run_every);
    run_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut elevate_tick =
        tokio::time::interval_at(tokio::time::Instant::now() + elevate_every, elevate_every);
    elevate_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = run_tick.tick() => {
                let assigned = scheduler.run();
                if assigned > 0 {
                    debug!("本轮分配了 {} 个调度单元", assigned);
                }
            }
            _ = elevate_tick.tick() => {
                scheduler.elevate();
            }
            reason = shutdown.triggered() => {
                info!("控制循环停止: {}", reason);
                break;
            }
        }
    }
}

/// 分发循环
async fn run_dispatch_loop(
    dispatcher: Arc<TaskDispatcher>,
    every: Duration,
    mut shutdown: ShutdownListener,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = dispatcher.dispatch().await {
                    error!("任务分发失败: {}", e);
                }
            }
            reason = shutdown.triggered() => {
                info!("分发循环停止: {}", reason);
                break;
            }
        }
    }
}

/// 从 JSON 文件读取任务列表，用于预置内存任务存储
///
/// 文件内容为任务对象数组，除 `op` 和 `agent` 外的字段均可省略。
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取任务文件失败: {}", path.display()))?;
    let tasks: Vec<Task> = serde_json::from_str(&content)
        .with_context(|| format!("解析任务文件失败: {}", path.display()))?;
    Ok(tasks)
}
