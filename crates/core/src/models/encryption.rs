use std::fmt;

use serde::{Deserialize, Serialize};

/// 归档的加密参数
///
/// 由密钥保管库按归档生成或取回，备份和恢复命令都必须携带。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParams {
    pub cipher: String,
    pub key: String,
    pub iv: String,
}

impl EncryptionParams {
    pub fn new(cipher: impl Into<String>, key: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            cipher: cipher.into(),
            key: key.into(),
            iv: iv.into(),
        }
    }

    /// 任一字段为空都视为不可用的参数
    pub fn is_empty(&self) -> bool {
        self.cipher.is_empty() || self.key.is_empty() || self.iv.is_empty()
    }
}

impl fmt::Debug for EncryptionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionParams")
            .field("cipher", &self.cipher)
            .field("key", &"***")
            .field("iv", &"***")
            .finish()
    }
}

/// 支持的加密算法前缀及其密钥/IV长度（十六进制字符数）
pub fn cipher_lengths(cipher: &str) -> Option<(usize, usize)> {
    if cipher.starts_with("aes128") {
        Some((32, 32))
    } else if cipher.starts_with("aes256") || cipher.starts_with("twofish") {
        Some((64, 32))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_key_material() {
        let params = EncryptionParams::new("aes256-ctr", "DEADBEEF", "CAFEBABE");
        let rendered = format!("{params:?}");
        assert!(rendered.contains("aes256-ctr"));
        assert!(!rendered.contains("DEADBEEF"));
        assert!(!rendered.contains("CAFEBABE"));
    }

    #[test]
    fn test_cipher_lengths() {
        assert_eq!(cipher_lengths("aes128-cfb"), Some((32, 32)));
        assert_eq!(cipher_lengths("aes256-ctr"), Some((64, 32)));
        assert_eq!(cipher_lengths("twofish-cbc"), Some((64, 32)));
        assert_eq!(cipher_lengths("rot13"), None);
        assert!(EncryptionParams::new("aes256-ctr", "", "00").is_empty());
    }
}
