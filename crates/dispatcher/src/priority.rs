//! 各操作类型的固定调度优先级（优先级带编号，0 为最高）

use custodian_core::TaskOperation;

pub const BACKUP_PRIORITY: usize = 20;
pub const RESTORE_PRIORITY: usize = 20;
pub const AGENT_STATUS_PRIORITY: usize = 30;
pub const TEST_STORE_PRIORITY: usize = 40;
pub const PURGE_PRIORITY: usize = 50;

pub fn priority_for(op: TaskOperation) -> usize {
    match op {
        TaskOperation::Backup => BACKUP_PRIORITY,
        TaskOperation::Restore => RESTORE_PRIORITY,
        TaskOperation::AgentStatus => AGENT_STATUS_PRIORITY,
        TaskOperation::TestStore => TEST_STORE_PRIORITY,
        TaskOperation::Purge => PURGE_PRIORITY,
    }
}
