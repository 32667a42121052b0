use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use custodian_core::{cipher_lengths, EncryptionParams, SchedulerError, SchedulerResult, Vault};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const HEX: &[u8] = b"0123456789ABCDEF";

fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| HEX[rng.random_range(0..HEX.len())] as char)
        .collect()
}

/// 内存密钥保管库
///
/// 按加密算法前缀生成大写十六进制密钥和IV，并按归档保存以供恢复时取回。
/// 固定密钥模式下同一算法复用同一把密钥，IV 每次重新生成。
#[derive(Debug, Clone, Default)]
pub struct InMemoryVault {
    archives: Arc<RwLock<HashMap<Uuid, EncryptionParams>>>,
    fixed_keys: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入归档的加密参数
    pub async fn store(&self, archive_uuid: Uuid, params: EncryptionParams) {
        self.archives.write().await.insert(archive_uuid, params);
    }

    async fn fixed_key(&self, cipher: &str, len: usize) -> String {
        let mut keys = self.fixed_keys.write().await;
        keys.entry(cipher.to_string())
            .or_insert_with(|| random_hex(len))
            .clone()
    }
}

#[async_trait]
impl Vault for InMemoryVault {
    async fn new_parameters(
        &self,
        archive_uuid: Uuid,
        cipher: &str,
        use_fixed_key: bool,
    ) -> SchedulerResult<EncryptionParams> {
        let (key_len, iv_len) = cipher_lengths(cipher)
            .ok_or_else(|| SchedulerError::Encryption(format!("无效的加密算法: {cipher}")))?;

        let key = if use_fixed_key {
            self.fixed_key(cipher, key_len).await
        } else {
            random_hex(key_len)
        };
        let params = EncryptionParams::new(cipher, key, random_hex(iv_len));

        debug!("为归档 {} 生成加密参数 ({})", archive_uuid, cipher);
        self.archives
            .write()
            .await
            .insert(archive_uuid, params.clone());
        Ok(params)
    }

    async fn retrieve(&self, archive_uuid: Uuid) -> SchedulerResult<Option<EncryptionParams>> {
        Ok(self.archives.read().await.get(&archive_uuid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_upper_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }

    #[tokio::test]
    async fn test_key_lengths_follow_cipher() {
        let vault = InMemoryVault::new();

        let aes128 = vault
            .new_parameters(Uuid::new_v4(), "aes128-ctr", false)
            .await
            .unwrap();
        assert_eq!((aes128.key.len(), aes128.iv.len()), (32, 32));

        let aes256 = vault
            .new_parameters(Uuid::new_v4(), "aes256-ctr", false)
            .await
            .unwrap();
        assert_eq!((aes256.key.len(), aes256.iv.len()), (64, 32));
        assert!(is_upper_hex(&aes256.key));
        assert!(is_upper_hex(&aes256.iv));

        let twofish = vault
            .new_parameters(Uuid::new_v4(), "twofish-cfb", false)
            .await
            .unwrap();
        assert_eq!((twofish.key.len(), twofish.iv.len()), (64, 32));

        assert!(matches!(
            vault.new_parameters(Uuid::new_v4(), "rc4", false).await,
            Err(SchedulerError::Encryption(_))
        ));
    }

    #[tokio::test]
    async fn test_parameters_are_retrievable_per_archive() {
        let vault = InMemoryVault::new();
        let archive = Uuid::new_v4();
        let params = vault
            .new_parameters(archive, "aes256-ctr", false)
            .await
            .unwrap();

        assert_eq!(vault.retrieve(archive).await.unwrap(), Some(params));
        assert_eq!(vault.retrieve(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fixed_key_is_reused_with_fresh_iv() {
        let vault = InMemoryVault::new();
        let first = vault
            .new_parameters(Uuid::new_v4(), "aes256-ctr", true)
            .await
            .unwrap();
        let second = vault
            .new_parameters(Uuid::new_v4(), "aes256-ctr", true)
            .await
            .unwrap();
        let random = vault
            .new_parameters(Uuid::new_v4(), "aes256-ctr", false)
            .await
            .unwrap();

        assert_eq!(first.key, second.key);
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.key, random.key);
    }
}
