//! 键值存储抽象
//!
//! 缓存、历史记录和配额三个子系统共享同一个键值存储，各自使用独立的键前缀。
//! 存储容量是有限的（与其他数据共享），写入可能因为容量不足而失败，
//! 上层必须能够处理 `StorageError::QuotaExceeded`。

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use super::size::estimate_str_size;

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 容量不足
    #[error("存储容量不足: 需要 {needed} 字节，上限 {limit} 字节")]
    QuotaExceeded { needed: usize, limit: usize },

    /// 底层存储错误
    #[error("存储后端错误: {0}")]
    Backend(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),
}

impl StorageError {
    /// 是否为容量不足错误
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }

    pub fn backend<T: std::fmt::Display>(error: T) -> Self {
        StorageError::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        StorageError::Serialization(error.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// 共享键值存储
pub trait KeyValueStore: Send + Sync {
    /// 读取键对应的值
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// 写入键值，容量不足时返回 `QuotaExceeded`
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// 删除键，键不存在时不做任何事
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// 列出所有以指定前缀开头的键
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// 已使用的字节数
    fn used_bytes(&self) -> StorageResult<usize>;
}

/// 内存存储，可选容量上限
///
/// 容量按 键 + 值 的字节数计算。
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带容量上限的内存存储
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// 当前键数量
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error<T>(_: T) -> StorageError {
        StorageError::Backend("内存存储锁已损坏".to_string())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;

        if let Some(limit) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| estimate_str_size(k) + estimate_str_size(v))
                .sum();
            let needed = others + estimate_str_size(key) + estimate_str_size(value);
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn used_bytes(&self) -> StorageResult<usize> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries
            .iter()
            .map(|(k, v)| estimate_str_size(k) + estimate_str_size(v))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.len(), 2);

        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let err = store.set("x", "123456789").unwrap_err();
        assert!(err.is_quota_exceeded());

        // 覆盖同一个键时不重复计算旧值
        store.set("k", "123456789").unwrap();
        assert_eq!(store.used_bytes().unwrap(), 10);
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        store.set("cache_1", "a").unwrap();
        store.set("cache_2", "b").unwrap();
        store.set("history", "c").unwrap();

        let mut keys = store.keys_with_prefix("cache_").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache_1".to_string(), "cache_2".to_string()]);
    }
}
