//! TTL 缓存
//!
//! 按类别设置过期时间的键值缓存，条目以 JSON 形式保存在共享键值存储中。
//!
//! - 文章解析结果：24 小时
//! - 文本生成结果：7 天
//! - 翻译结果：7 天
//! - 图片：永不缓存
//!
//! 缓存只是优化手段：任何读写失败都只记录日志，读取退化为未命中，写入被丢弃。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::kv::{KeyValueStore, StorageError};
use super::size::{estimate_size, estimate_str_size, format_mib};
use super::CacheRepository;
use crate::clock::Clock;

/// 缓存键前缀
pub const CACHE_KEY_PREFIX: &str = "cache_";

/// 单个条目的最大字节数（2 MiB）
pub const MAX_ENTRY_SIZE: usize = 2 * 1024 * 1024;

/// 缓存类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// 文章解析
    Parse,
    /// 文本生成（摘要、要点、社交帖子）
    Ai,
    /// 翻译
    Translate,
    /// 图片，永不缓存
    Image,
}

impl CacheCategory {
    /// 类别的存活时间，`None` 表示不缓存
    pub fn lifetime(&self) -> Option<Duration> {
        match self {
            CacheCategory::Parse => Some(Duration::hours(24)),
            CacheCategory::Ai => Some(Duration::days(7)),
            CacheCategory::Translate => Some(Duration::days(7)),
            CacheCategory::Image => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Parse => "parse",
            CacheCategory::Ai => "ai",
            CacheCategory::Translate => "translate",
            CacheCategory::Image => "image",
        }
    }
}

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub category: CacheCategory,
    /// 创建时间（Unix 毫秒）
    pub created_at: i64,
    /// 过期时间（Unix 毫秒）
    pub expires_at: i64,
}

impl<T> CacheEntry<T> {
    /// 检查是否过期（严格晚于过期时间才算过期）
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

/// 用于统计和清理的条目头信息，不关心具体数据类型
#[derive(Debug, Deserialize)]
struct EntryHeader {
    category: CacheCategory,
    created_at: i64,
    expires_at: i64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

/// 生成缓存键
///
/// 按顺序拼接主体、操作类型、语言以及排序后的附加参数，再计算 blake3 摘要。
/// `BTreeMap` 保证附加参数按键排序，参数顺序不会影响结果。
pub fn fingerprint(
    primary_subject: &str,
    operation_kind: &str,
    language: &str,
    extra_params: Option<&BTreeMap<String, String>>,
) -> String {
    let mut parts = vec![
        primary_subject.to_string(),
        operation_kind.to_string(),
        language.to_string(),
    ];

    if let Some(params) = extra_params {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("|");
        parts.push(joined);
    }

    let mut hasher = blake3::Hasher::new();
    for part in &parts {
        // 长度前缀避免 ("a|b", "c") 与 ("a", "b|c") 冲突
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{}{}", CACHE_KEY_PREFIX, hasher.finalize().to_hex())
}

/// TTL 缓存
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_entry_size: usize,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_entry_size: MAX_ENTRY_SIZE,
        }
    }

    /// 自定义单条目上限
    pub fn with_max_entry_size(mut self, max_entry_size: usize) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// 读取缓存
    ///
    /// 条目过期或损坏时删除并返回 `None`；类别不匹配视为未命中。
    pub fn get<T: DeserializeOwned>(&self, key: &str, category: CacheCategory) -> Option<T> {
        let stored = match self.store.get(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("读取缓存失败: {}", e);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&stored) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("缓存条目损坏，已删除 {}: {}", key, e);
                self.remove_quietly(key);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            tracing::debug!("缓存条目已过期: {}", key);
            self.remove_quietly(key);
            return None;
        }

        if entry.category != category {
            tracing::debug!(
                "缓存类别不匹配: 期望 {}，实际 {}",
                category.as_str(),
                entry.category.as_str()
            );
            return None;
        }

        Some(entry.data)
    }

    /// 写入缓存
    ///
    /// 超过单条目上限或图片类别的数据不会被缓存。容量不足时依次尝试：
    /// 清理过期条目后重试、淘汰最旧的一半条目后重试，仍失败则放弃写入。
    pub fn put<T: Serialize>(&self, key: &str, category: CacheCategory, data: &T) {
        let Some(lifetime) = category.lifetime() else {
            tracing::debug!("{} 类别不缓存，跳过写入", category.as_str());
            return;
        };

        let estimated_size = estimate_size(data);
        if estimated_size > self.max_entry_size {
            tracing::warn!(
                "缓存条目过大 ({})，跳过 {} 缓存",
                if estimated_size == usize::MAX {
                    "无法估算".to_string()
                } else {
                    format_mib(estimated_size)
                },
                category.as_str()
            );
            return;
        }

        let now = self.clock.now_millis();
        let entry = CacheEntry {
            data,
            category,
            created_at: now,
            expires_at: now + lifetime.num_milliseconds(),
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("缓存条目序列化失败: {}", e);
                return;
            }
        };

        match self.store.set(key, &serialized) {
            Ok(()) => return,
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!("存储容量不足，清理过期缓存后重试: {}", e);
            }
            Err(e) => {
                tracing::warn!("写入缓存失败: {}", e);
                return;
            }
        }

        self.sweep_expired();
        match self.store.set(key, &serialized) {
            Ok(()) => return,
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!("清理过期缓存后仍然容量不足，淘汰最旧的一半条目");
            }
            Err(e) => {
                tracing::warn!("写入缓存失败: {}", e);
                return;
            }
        }

        let total = self.entry_headers().len();
        if total > 0 {
            self.clear_oldest(total / 2);
        }
        if let Err(e) = self.store.set(key, &serialized) {
            tracing::warn!("清理后仍无法写入缓存，放弃: {}", e);
        }
    }

    /// 删除所有过期条目，返回删除数量（损坏的条目一并删除）
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut cleared = 0;

        for key in self.cache_keys() {
            match self.read_header(&key) {
                Some(Ok(header)) if now > header.expires_at => {
                    self.remove_quietly(&key);
                    cleared += 1;
                }
                Some(Err(_)) => {
                    self.remove_quietly(&key);
                    cleared += 1;
                }
                _ => {}
            }
        }

        if cleared > 0 {
            tracing::info!("已清理 {} 个过期缓存条目", cleared);
        }
        cleared
    }

    /// 删除最旧的 `count` 个条目，返回删除数量
    pub fn clear_oldest(&self, count: usize) -> usize {
        let mut headers = self.entry_headers();
        headers.sort_by_key(|(_, header)| header.created_at);

        let mut cleared = 0;
        for (key, _) in headers.into_iter().take(count) {
            self.remove_quietly(&key);
            cleared += 1;
        }

        if cleared > 0 {
            tracing::info!("已淘汰 {} 个最旧的缓存条目", cleared);
        }
        cleared
    }

    /// 清空所有缓存条目，返回删除数量
    pub fn clear_all(&self) -> usize {
        let keys = self.cache_keys();
        for key in &keys {
            self.remove_quietly(key);
        }
        tracing::info!("已清空 {} 个缓存条目", keys.len());
        keys.len()
    }

    /// 汇总统计
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for key in self.cache_keys() {
            let Ok(Some(stored)) = self.store.get(&key) else {
                continue;
            };
            stats.total += 1;
            stats.total_size_bytes += estimate_str_size(&stored);

            let Ok(header) = serde_json::from_str::<EntryHeader>(&stored) else {
                *stats.by_category.entry("unknown".to_string()).or_insert(0) += 1;
                continue;
            };

            *stats
                .by_category
                .entry(header.category.as_str().to_string())
                .or_insert(0) += 1;

            if stats.oldest_entry.map_or(true, |t| header.created_at < t) {
                stats.oldest_entry = Some(header.created_at);
            }
            if stats.newest_entry.map_or(true, |t| header.created_at > t) {
                stats.newest_entry = Some(header.created_at);
            }
        }

        stats
    }

    fn cache_keys(&self) -> Vec<String> {
        self.store
            .keys_with_prefix(CACHE_KEY_PREFIX)
            .unwrap_or_else(|e| {
                tracing::warn!("列出缓存键失败: {}", e);
                Vec::new()
            })
    }

    fn read_header(&self, key: &str) -> Option<Result<EntryHeader, StorageError>> {
        match self.store.get(key) {
            Ok(Some(stored)) => Some(serde_json::from_str(&stored).map_err(StorageError::from)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("读取缓存条目失败 {}: {}", key, e);
                None
            }
        }
    }

    /// 读取全部可解析条目的头信息，损坏条目直接删除
    fn entry_headers(&self) -> Vec<(String, EntryHeader)> {
        let mut headers = Vec::new();
        for key in self.cache_keys() {
            match self.read_header(&key) {
                Some(Ok(header)) => headers.push((key, header)),
                Some(Err(_)) => self.remove_quietly(&key),
                None => {}
            }
        }
        headers
    }

    fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!("删除缓存条目失败 {}: {}", key, e);
        }
    }
}

impl CacheRepository for TtlCache {
    fn get_raw(&self, key: &str, category: CacheCategory) -> Option<serde_json::Value> {
        self.get(key, category)
    }

    fn put_raw(&self, key: &str, category: CacheCategory, data: &serde_json::Value) {
        self.put(key, category, data)
    }

    fn sweep_expired(&self) -> usize {
        TtlCache::sweep_expired(self)
    }

    fn clear_all(&self) -> usize {
        TtlCache::clear_all(self)
    }

    fn stats(&self) -> CacheStats {
        TtlCache::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::kv::MemoryStore;
    use chrono::{Local, TimeZone};

    fn setup(store: Arc<dyn KeyValueStore>) -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        ));
        (TtlCache::new(store, clock.clone()), clock)
    }

    #[test]
    fn test_fingerprint_is_stable_and_param_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("tone".to_string(), "formal".to_string());
        a.insert("length".to_string(), "short".to_string());

        let mut b = BTreeMap::new();
        b.insert("length".to_string(), "short".to_string());
        b.insert("tone".to_string(), "formal".to_string());

        let key_a = fingerprint("https://example.com/a", "about", "ru", Some(&a));
        let key_b = fingerprint("https://example.com/a", "about", "ru", Some(&b));
        assert_eq!(key_a, key_b);
        assert!(key_a.starts_with(CACHE_KEY_PREFIX));

        let other_lang = fingerprint("https://example.com/a", "about", "me", Some(&a));
        assert_ne!(key_a, other_lang);
        assert_ne!(
            fingerprint("a|b", "c", "", None),
            fingerprint("a", "b|c", "", None)
        );
    }

    #[test]
    fn test_put_then_get_returns_same_data() {
        let (cache, _) = setup(Arc::new(MemoryStore::new()));
        let key = fingerprint("https://example.com", "thesis", "ru", None);

        let data = vec!["первый тезис".to_string(), "second".to_string()];
        cache.put(&key, CacheCategory::Ai, &data);

        let cached: Option<Vec<String>> = cache.get(&key, CacheCategory::Ai);
        assert_eq!(cached, Some(data));
    }

    #[test]
    fn test_entry_expires_strictly_after_deadline() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = setup(store.clone());
        let key = fingerprint("https://example.com", "parse", "ru", None);

        cache.put(&key, CacheCategory::Parse, &"body".to_string());

        clock.advance(Duration::hours(24));
        assert_eq!(
            cache.get::<String>(&key, CacheCategory::Parse),
            Some("body".to_string())
        );

        clock.advance(Duration::milliseconds(1));
        assert_eq!(cache.get::<String>(&key, CacheCategory::Parse), None);
        // 过期条目被惰性删除
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn test_oversized_payload_is_not_cached() {
        let (cache, _) = setup(Arc::new(MemoryStore::new()));
        let key = fingerprint("https://example.com", "translate", "ru", None);

        let huge = "x".repeat(MAX_ENTRY_SIZE + 1);
        cache.put(&key, CacheCategory::Translate, &huge);
        assert_eq!(cache.get::<String>(&key, CacheCategory::Translate), None);
    }

    #[test]
    fn test_image_category_is_never_cached() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _) = setup(store.clone());
        let key = fingerprint("https://example.com", "illustration", "ru", None);

        cache.put(&key, CacheCategory::Image, &"data:image/png;base64,AAAA".to_string());
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_removed_on_read() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _) = setup(store.clone());
        store.set("cache_broken", "{not json").unwrap();

        assert_eq!(cache.get::<String>("cache_broken", CacheCategory::Ai), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_expired_counts_removed_entries() {
        let (cache, clock) = setup(Arc::new(MemoryStore::new()));
        cache.put("cache_parse", CacheCategory::Parse, &1);
        cache.put("cache_ai", CacheCategory::Ai, &2);

        clock.advance(Duration::days(2));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.get::<i32>("cache_ai", CacheCategory::Ai), Some(2));
    }

    #[test]
    fn test_quota_recovery_sweeps_expired_entries_first() {
        let store = Arc::new(MemoryStore::with_quota(500));
        let (cache, clock) = setup(store.clone());

        for i in 0..4 {
            cache.put(&format!("cache_old{}", i), CacheCategory::Parse, &"o".repeat(20));
        }
        clock.advance(Duration::days(2));

        cache.put("cache_new", CacheCategory::Ai, &"n".repeat(200));
        assert_eq!(
            cache.get::<String>("cache_new", CacheCategory::Ai),
            Some("n".repeat(200))
        );
        assert_eq!(store.keys_with_prefix("cache_old").unwrap().len(), 0);
    }

    #[test]
    fn test_quota_recovery_evicts_oldest_half() {
        let store = Arc::new(MemoryStore::with_quota(600));
        let (cache, clock) = setup(store.clone());

        for i in 0..4 {
            cache.put(&format!("cache_{}", i), CacheCategory::Ai, &"v".repeat(40));
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(cache.stats().total, 4);

        cache.put("cache_new", CacheCategory::Ai, &"n".repeat(150));

        assert!(cache.get::<String>("cache_new", CacheCategory::Ai).is_some());
        assert!(cache.get::<String>("cache_0", CacheCategory::Ai).is_none());
        assert!(cache.get::<String>("cache_1", CacheCategory::Ai).is_none());
        assert!(cache.get::<String>("cache_3", CacheCategory::Ai).is_some());
    }

    #[test]
    fn test_write_is_dropped_when_nothing_helps() {
        let store = Arc::new(MemoryStore::with_quota(50));
        let (cache, _) = setup(store.clone());

        cache.put("cache_big", CacheCategory::Ai, &"b".repeat(100));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats_and_clear_all() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = setup(store.clone());
        let first = clock.now_millis();

        cache.put("cache_a", CacheCategory::Parse, &"a");
        clock.advance(Duration::seconds(30));
        cache.put("cache_b", CacheCategory::Ai, &"b");
        cache.put("cache_c", CacheCategory::Ai, &"c");
        store.set("unrelated", "keep").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category.get("ai"), Some(&2));
        assert_eq!(stats.by_category.get("parse"), Some(&1));
        assert_eq!(stats.oldest_entry, Some(first));
        assert_eq!(stats.newest_entry, Some(first + 30_000));
        assert!(stats.total_size_bytes > 0);

        assert_eq!(cache.clear_all(), 3);
        assert_eq!(cache.stats().total, 0);
        assert_eq!(store.get("unrelated").unwrap(), Some("keep".to_string()));
    }
}
