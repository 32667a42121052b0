use std::time::Duration;

use custodian_core::{EncryptionParams, Task, TaskOperation};
use rand::Rng;
use serde_json::json;

use super::Fabric;
use crate::chore::{Chore, ChoreHandle, CANCELED_EXIT_CODE, CANCELED_SIGNAL};

/// 不访问网络的模拟后端，用于演示和测试
pub struct SimulationFabric {
    agent: String,
    delay: Duration,
}

impl SimulationFabric {
    pub fn new(agent: impl Into<String>, delay: Duration) -> Self {
        Self {
            agent: agent.into(),
            delay,
        }
    }

    fn simulate(&self, task: &Task, result: Option<serde_json::Value>) -> Chore {
        let agent = self.agent.clone();
        let delay = self.delay;
        let op = task.op;
        let plugin = match op {
            TaskOperation::Backup | TaskOperation::Restore => task.target_plugin.clone(),
            _ => task.store_plugin.clone(),
        };

        Chore::new(task.uuid, move |handle| async move {
            handle.error(format!("SIMULATION: 在Agent {agent} 上模拟 {op} 操作"));
            if !plugin.is_empty() {
                handle.error(format!("SIMULATION: 使用 {plugin} 插件"));
            }

            if !pause(&handle, delay).await {
                return;
            }

            if let Some(result) = result {
                handle.info(result.to_string());
            }
            handle.error(format!("SIMULATION: {op} 操作完成"));
            handle.exit(0);
        })
    }
}

/// 等待模拟延迟，被取消时上报取消状态并返回 false
async fn pause(handle: &ChoreHandle, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = handle.cancelled() => {
            handle.error("TASK CANCELED");
            handle.exit_with_signal(CANCELED_EXIT_CODE, CANCELED_SIGNAL);
            false
        }
    }
}

impl Fabric for SimulationFabric {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn backup(&self, task: &Task, encryption: &EncryptionParams) -> Chore {
        let (size, suffix) = {
            let mut rng = rand::rng();
            (
                rng.random_range(1024..64 * 1024 * 1024_i64),
                rng.random::<u32>(),
            )
        };
        let key = format!(
            "simulated/{}/{}-{:08x}",
            task.target_plugin, encryption.cipher, suffix
        );
        self.simulate(
            task,
            Some(json!({
                "key": key,
                "archive_size": size,
                "compression": task.compression,
            })),
        )
    }

    fn restore(&self, task: &Task, _encryption: &EncryptionParams) -> Chore {
        self.simulate(task, None)
    }

    fn status(&self, task: &Task) -> Chore {
        self.simulate(
            task,
            Some(json!({
                "name": self.agent,
                "version": "simulated",
                "health": "ok",
            })),
        )
    }

    fn purge(&self, task: &Task) -> Chore {
        self.simulate(task, None)
    }

    fn test_store(&self, task: &Task) -> Chore {
        self.simulate(task, Some(json!({ "healthy": true })))
    }
}
