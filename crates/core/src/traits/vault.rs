use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::SchedulerResult;
use crate::models::EncryptionParams;

/// 加密密钥保管库接口
///
/// 返回空参数或 `None` 都被调用方视为任务的硬失败。
#[async_trait]
pub trait Vault: Send + Sync {
    /// 为新归档生成加密参数，`use_fixed_key` 为真时复用保管库级的固定密钥
    async fn new_parameters(
        &self,
        archive_uuid: Uuid,
        cipher: &str,
        use_fixed_key: bool,
    ) -> SchedulerResult<EncryptionParams>;

    /// 取回归档的加密参数
    async fn retrieve(&self, archive_uuid: Uuid) -> SchedulerResult<Option<EncryptionParams>>;
}
