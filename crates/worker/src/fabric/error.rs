use custodian_core::{EncryptionParams, Task};

use super::Fabric;
use crate::chore::Chore;

/// 包装一个既有错误的后端，所有操作都立即失败
pub struct ErrorFabric {
    error: String,
}

impl ErrorFabric {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }

    /// 生成立即输出错误并以非零退出码结束的调度单元
    pub fn chore(&self, task: &Task) -> Chore {
        let error = self.error.clone();
        Chore::new(task.uuid, move |handle| async move {
            handle.error(format!("TASK FAILED!!  {error}"));
            handle.exit(1);
        })
    }
}

impl Fabric for ErrorFabric {
    fn name(&self) -> &'static str {
        "error"
    }

    fn backup(&self, task: &Task, _encryption: &EncryptionParams) -> Chore {
        self.chore(task)
    }

    fn restore(&self, task: &Task, _encryption: &EncryptionParams) -> Chore {
        self.chore(task)
    }

    fn status(&self, task: &Task) -> Chore {
        self.chore(task)
    }

    fn purge(&self, task: &Task) -> Chore {
        self.chore(task)
    }

    fn test_store(&self, task: &Task) -> Chore {
        self.chore(task)
    }
}
