//! 本地状态
//!
//! 三个互相独立的子系统共享同一个键值存储：
//! - [`TtlCache`]: 按类别过期的缓存
//! - [`HistoryLog`]: 有界历史记录
//! - [`DailyQuota`]: 每日配额计数
//!
//! 编排器只依赖下面三个窄接口，测试时可以用内存实现替换。
//! 存储层的任何失败都不会传播给调用方。

pub mod cache;
pub mod history;
pub mod kv;
pub mod quota;
pub mod redb_store;
pub mod size;

pub use cache::{fingerprint, CacheCategory, CacheEntry, CacheStats, TtlCache};
pub use history::{
    format_relative_time, HistoryItem, HistoryLog, ImagePresence, NewHistoryItem, OperationKind,
};
pub use kv::{KeyValueStore, MemoryStore, StorageError, StorageResult};
pub use quota::{DailyQuota, QuotaRecord};
pub use redb_store::RedbStore;
pub use size::{estimate_size, format_mib};

/// 配额仓库
pub trait QuotaRepository: Send + Sync {
    /// 每日上限
    fn daily_limit(&self) -> u32;

    /// 今天剩余次数
    fn remaining(&self) -> u32;

    /// 是否还能继续
    fn can_proceed(&self) -> bool {
        self.remaining() > 0
    }

    /// 消耗一次配额
    fn increment(&self);

    /// 距离本地午夜的时间
    fn time_until_reset(&self) -> chrono::Duration;

    /// 清除配额记录
    fn reset(&self);
}

/// 历史记录仓库
pub trait HistoryRepository: Send + Sync {
    /// 追加记录，返回实际保存的条目（被预算淘汰时为 `None`）
    fn append(&self, item: NewHistoryItem) -> Option<HistoryItem>;

    /// 全部记录，新的在前
    fn list(&self) -> Vec<HistoryItem>;

    fn get(&self, id: &str) -> Option<HistoryItem>;

    fn remove(&self, id: &str);

    fn clear(&self);
}

/// 缓存仓库，数据以 JSON 值形式存取
pub trait CacheRepository: Send + Sync {
    fn get_raw(&self, key: &str, category: CacheCategory) -> Option<serde_json::Value>;

    fn put_raw(&self, key: &str, category: CacheCategory, data: &serde_json::Value);

    fn sweep_expired(&self) -> usize;

    fn clear_all(&self) -> usize;

    fn stats(&self) -> CacheStats;
}
