use std::sync::Arc;

use async_trait::async_trait;
use custodian_core::{AgentCredential, EncryptionParams, SchedulerResult, Task};
use tracing::{error, info};

use super::command::{AgentCommand, AgentLine};
use super::Fabric;
use crate::chore::{Chore, ChoreHandle, CANCELED_EXIT_CODE, CANCELED_SIGNAL};

/// 建立到Agent的认证远程执行会话
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn open(
        &self,
        address: &str,
        credential: &AgentCredential,
        payload: String,
    ) -> SchedulerResult<Box<dyn RemoteSession>>;
}

/// 一次远程命令执行
#[async_trait]
pub trait RemoteSession: Send {
    /// 读取下一行输出，输出结束时返回 `None`
    async fn next_line(&mut self) -> SchedulerResult<Option<String>>;

    /// 获取远程命令的退出码
    async fn wait(self: Box<Self>) -> SchedulerResult<i32>;
}

/// 通过远程执行会话在Agent上运行命令的后端
pub struct RemoteFabric {
    address: String,
    credential: AgentCredential,
    transport: Arc<dyn RemoteTransport>,
}

impl RemoteFabric {
    pub fn new(
        address: impl Into<String>,
        credential: AgentCredential,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        Self {
            address: address.into(),
            credential,
            transport,
        }
    }

    fn execute(&self, task: &Task, command: AgentCommand) -> Chore {
        let address = self.address.clone();
        let credential = self.credential.clone();
        let transport = Arc::clone(&self.transport);

        Chore::new(task.uuid, move |handle| async move {
            let payload = match command.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    handle.error(format!("TASK FAILED!!  无法生成Agent命令: {e}"));
                    handle.exit(1);
                    return;
                }
            };

            info!("在Agent {} 上执行 {}", address, command.details());

            let session = tokio::select! {
                session = transport.open(&address, &credential, payload) => session,
                _ = handle.cancelled() => {
                    cancel(&handle);
                    return;
                }
            };
            let mut session = match session {
                Ok(session) => session,
                Err(e) => {
                    error!("连接Agent {} 失败: {}", address, e);
                    handle.error(format!("TASK FAILED!!  无法连接Agent {address}: {e}"));
                    handle.exit(1);
                    return;
                }
            };

            loop {
                let line = tokio::select! {
                    line = session.next_line() => line,
                    _ = handle.cancelled() => {
                        cancel(&handle);
                        return;
                    }
                };

                match line {
                    Ok(Some(line)) if line.is_empty() => continue,
                    Ok(Some(line)) => match AgentLine::parse(&line) {
                        Ok(AgentLine::Output(text)) => handle.info(text),
                        Ok(AgentLine::Error(text)) => handle.error(text),
                        Err(e) => {
                            handle.error(format!("TASK FAILED!!  {e}"));
                            handle.exit(1);
                            return;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        handle.error(format!("TASK FAILED!!  读取Agent {address} 输出失败: {e}"));
                        handle.exit(1);
                        return;
                    }
                }
            }

            match session.wait().await {
                Ok(rc) => {
                    handle.exit(rc);
                }
                Err(e) => {
                    handle.error(format!("TASK FAILED!!  {e}"));
                    handle.exit(1);
                }
            }
        })
    }
}

fn cancel(handle: &ChoreHandle) {
    handle.error("TASK CANCELED");
    handle.exit_with_signal(CANCELED_EXIT_CODE, CANCELED_SIGNAL);
}

impl Fabric for RemoteFabric {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn backup(&self, task: &Task, encryption: &EncryptionParams) -> Chore {
        self.execute(task, AgentCommand::for_task(task, Some(encryption)))
    }

    fn restore(&self, task: &Task, encryption: &EncryptionParams) -> Chore {
        self.execute(task, AgentCommand::for_task(task, Some(encryption)))
    }

    fn status(&self, task: &Task) -> Chore {
        self.execute(task, AgentCommand::for_task(task, None))
    }

    fn purge(&self, task: &Task) -> Chore {
        self.execute(task, AgentCommand::for_task(task, None))
    }

    fn test_store(&self, task: &Task) -> Chore {
        self.execute(task, AgentCommand::for_task(task, None))
    }
}
