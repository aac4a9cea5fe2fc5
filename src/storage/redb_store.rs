//! 基于 redb 的磁盘键值存储
//!
//! 所有本地状态（缓存、历史、配额）保存在同一个 redb 数据库文件的同一张表中。

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use super::kv::{KeyValueStore, StorageError, StorageResult};
use super::size::estimate_str_size;

const LOCAL_STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_state");

/// 磁盘键值存储
pub struct RedbStore {
    db: Database,
    quota_bytes: Option<usize>,
}

impl RedbStore {
    /// 打开（或创建）数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::backend)?;
            }
        }

        let db = Database::create(path).map_err(StorageError::backend)?;
        tracing::debug!("已打开本地状态数据库: {}", path.display());

        Ok(Self {
            db,
            quota_bytes: None,
        })
    }

    /// 设置容量上限
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// 读取全部键值对
    fn read_all(&self) -> StorageResult<Vec<(String, String)>> {
        let txn = self.db.begin_read().map_err(StorageError::backend)?;
        let table = match txn.open_table(LOCAL_STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::backend(e)),
        };

        let mut pairs = Vec::new();
        for item in table.iter().map_err(StorageError::backend)? {
            let (key, value) = item.map_err(StorageError::backend)?;
            pairs.push((key.value().to_string(), value.value().to_string()));
        }
        Ok(pairs)
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let txn = self.db.begin_read().map_err(StorageError::backend)?;
        let table = match txn.open_table(LOCAL_STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::backend(e)),
        };

        let value = table.get(key).map_err(StorageError::backend)?;
        Ok(value.map(|v| v.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(limit) = self.quota_bytes {
            let others: usize = self
                .read_all()?
                .iter()
                .filter(|(k, _)| k != key)
                .map(|(k, v)| estimate_str_size(k) + estimate_str_size(v))
                .sum();
            let needed = others + estimate_str_size(key) + estimate_str_size(value);
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        let txn = self.db.begin_write().map_err(StorageError::backend)?;
        {
            let mut table = txn
                .open_table(LOCAL_STATE_TABLE)
                .map_err(StorageError::backend)?;
            table.insert(key, value).map_err(StorageError::backend)?;
        }
        txn.commit().map_err(StorageError::backend)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let txn = self.db.begin_write().map_err(StorageError::backend)?;
        {
            let mut table = txn
                .open_table(LOCAL_STATE_TABLE)
                .map_err(StorageError::backend)?;
            table.remove(key).map_err(StorageError::backend)?;
        }
        txn.commit().map_err(StorageError::backend)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .read_all()?
            .into_iter()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn used_bytes(&self) -> StorageResult<usize> {
        Ok(self
            .read_all()?
            .iter()
            .map(|(k, v)| estimate_str_size(k) + estimate_str_size(v))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redb_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            assert_eq!(store.get("missing").unwrap(), None);
            store.set("cache_a", "1").unwrap();
            store.set("history", "[]").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("cache_a").unwrap(), Some("1".to_string()));
        assert_eq!(store.keys_with_prefix("cache_").unwrap(), vec!["cache_a".to_string()]);

        store.remove("cache_a").unwrap();
        assert_eq!(store.get("cache_a").unwrap(), None);
    }

    #[test]
    fn test_redb_store_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("state.redb"))
            .unwrap()
            .with_quota(8);

        store.set("k", "1234").unwrap();
        let err = store.set("other", "12345").unwrap_err();
        assert!(err.is_quota_exceeded());
    }
}
