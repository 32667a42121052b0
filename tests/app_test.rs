use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use custodian::{load_tasks, Application, ShutdownManager, ShutdownReason};
use custodian_core::{AppConfig, FabricKind, Task, TaskOperation, TaskStatus, TaskStore};
use custodian_infrastructure::InMemoryTaskStore;
use uuid::Uuid;

const AGENT: &str = "10.0.0.5:5444";

fn simulation_config(delay_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.threads = 2;
    config.scheduler.run_interval_ms = 10;
    config.scheduler.shutdown_grace_seconds = 0;
    config.fabric.kind = FabricKind::Simulation;
    config.fabric.simulation_delay_ms = delay_ms;
    config
}

fn backup() -> Task {
    Task::new(TaskOperation::Backup, AGENT)
        .with_target(Uuid::new_v4())
        .with_archive(Uuid::new_v4())
        .with_target_plugin("fs", "{}")
        .with_store_plugin("s3", "{}")
}

async fn wait_for_status(store: &InMemoryTaskStore, uuid: Uuid, status: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = store.get_task(uuid).await.unwrap().unwrap();
            if task.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("任务未在预期时间内到达目标状态");
}

#[tokio::test]
async fn test_application_runs_tasks_to_completion() {
    let mut interrupted = backup();
    interrupted.status = TaskStatus::Running;
    let mut leftover = Task::new(TaskOperation::TestStore, AGENT).with_store_plugin("s3", "{}");
    leftover.status = TaskStatus::Scheduled;
    let fresh = backup();
    let status = Task::new(TaskOperation::AgentStatus, AGENT);

    let store = InMemoryTaskStore::with_tasks(vec![
        interrupted.clone(),
        leftover.clone(),
        fresh.clone(),
        status.clone(),
    ])
    .await;

    let app = Arc::new(
        Application::with_store(simulation_config(0), Arc::new(store.clone())).unwrap(),
    );
    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let listener = shutdown.subscribe();
        tokio::spawn(async move { app.run(listener).await })
    };

    wait_for_status(&store, interrupted.uuid, TaskStatus::Failed).await;
    wait_for_status(&store, leftover.uuid, TaskStatus::Done).await;
    wait_for_status(&store, fresh.uuid, TaskStatus::Done).await;
    wait_for_status(&store, status.uuid, TaskStatus::Done).await;

    let archive = store.archive(fresh.archive_uuid.unwrap()).await.unwrap();
    assert!(!archive.key.is_empty());

    shutdown.shutdown(ShutdownReason::Requested);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_running_chores() {
    let task = Task::new(TaskOperation::TestStore, AGENT).with_store_plugin("s3", "{}");
    let store = InMemoryTaskStore::with_tasks(vec![task.clone()]).await;

    let app = Arc::new(
        Application::with_store(simulation_config(60_000), Arc::new(store.clone())).unwrap(),
    );
    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let listener = shutdown.subscribe();
        tokio::spawn(async move { app.run(listener).await })
    };

    wait_for_status(&store, task.uuid, TaskStatus::Running).await;
    shutdown.shutdown(ShutdownReason::Requested);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let canceled = store.get_task(task.uuid).await.unwrap().unwrap();
    assert_eq!(canceled.status, TaskStatus::Canceled);
    assert!(canceled.log.contains("TASK CANCELED"));
}

#[tokio::test]
async fn test_application_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[scheduler]
threads = 3

[fabric]
kind = "simulation"

[[agents]]
name = "db-01"
address = "10.0.0.9:5444"
credential = "secret-token"
"#
    )
    .unwrap();

    let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
    let app = Application::new(config).unwrap();
    assert_eq!(app.scheduler().worker_count(), 3);
    assert_eq!(app.config().agents.len(), 1);
}

#[tokio::test]
async fn test_application_runs_tasks_from_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(
        file,
        r#"[
  {{"op": "test-store", "agent": "{AGENT}", "store_plugin": "s3", "store_endpoint": "{{}}"}},
  {{"op": "agent-status", "agent": "{AGENT}"}}
]"#
    )
    .unwrap();

    let tasks = load_tasks(file.path()).unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|task| task.status == TaskStatus::Pending));
    let uuids: Vec<Uuid> = tasks.iter().map(|task| task.uuid).collect();
    assert_ne!(uuids[0], uuids[1]);

    let app = Arc::new(
        Application::with_tasks(simulation_config(0), tasks)
            .await
            .unwrap(),
    );
    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let listener = shutdown.subscribe();
        tokio::spawn(async move { app.run(listener).await })
    };

    let store = app.store();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let mut done = 0;
            for uuid in &uuids {
                let task = store.get_task(*uuid).await.unwrap().unwrap();
                if task.status == TaskStatus::Done {
                    done += 1;
                }
            }
            if done == uuids.len() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("预置的任务未在预期时间内完成");

    shutdown.shutdown(ShutdownReason::Requested);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[test]
fn test_malformed_task_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(file, r#"[{{"agent": "{AGENT}"}}]"#).unwrap();
    assert!(load_tasks(file.path()).is_err());
}
