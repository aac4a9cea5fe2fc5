//! 每日配额计数
//!
//! 记录按本地日历日划分。读取时如果日期已经变化，计数视为 0，
//! 不需要任何定时任务。计数器本身不强制上限，调用方需要先检查 `can_proceed`。

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, LocalResult, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use super::kv::KeyValueStore;
use super::QuotaRepository;
use crate::clock::Clock;

/// 配额记录存储键
pub const QUOTA_KEY: &str = "image_generation_limit";

/// 默认每日上限
pub const DEFAULT_DAILY_LIMIT: u32 = 3;

/// 配额记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub count: u32,
    /// 本地日期 `YYYY-MM-DD`
    #[serde(rename = "date")]
    pub date_key: String,
}

/// 每日配额
pub struct DailyQuota {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, daily_limit: u32) -> Self {
        Self {
            store,
            clock,
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// 今天的记录（跨日后计数归零）
    pub fn snapshot(&self) -> QuotaRecord {
        let today = date_key(self.clock.now());
        let fresh = QuotaRecord {
            count: 0,
            date_key: today.clone(),
        };

        let stored = match self.store.get(QUOTA_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return fresh,
            Err(e) => {
                tracing::warn!("读取配额记录失败: {}", e);
                return fresh;
            }
        };

        match serde_json::from_str::<QuotaRecord>(&stored) {
            Ok(record) if record.date_key == today => record,
            Ok(_) => fresh,
            Err(e) => {
                tracing::warn!("配额记录损坏，按新的一天处理: {}", e);
                fresh
            }
        }
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.snapshot().count)
    }

    pub fn can_proceed(&self) -> bool {
        self.remaining() > 0
    }

    /// 计数加一
    pub fn increment(&self) {
        let mut record = self.snapshot();
        record.count = record.count.saturating_add(1);

        let result = serde_json::to_string(&record)
            .map_err(super::kv::StorageError::from)
            .and_then(|serialized| self.store.set(QUOTA_KEY, &serialized));

        match result {
            Ok(()) => tracing::debug!(
                "配额已使用 {}/{} ({})",
                record.count,
                self.daily_limit,
                record.date_key
            ),
            Err(e) => tracing::warn!("保存配额记录失败: {}", e),
        }
    }

    /// 距离下一个本地午夜的时间
    pub fn time_until_reset(&self) -> Duration {
        time_until_midnight(self.clock.now())
    }

    /// 清除记录
    pub fn reset(&self) {
        if let Err(e) = self.store.remove(QUOTA_KEY) {
            tracing::warn!("重置配额失败: {}", e);
        }
    }
}

impl QuotaRepository for DailyQuota {
    fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    fn remaining(&self) -> u32 {
        DailyQuota::remaining(self)
    }

    fn increment(&self) {
        DailyQuota::increment(self)
    }

    fn time_until_reset(&self) -> Duration {
        DailyQuota::time_until_reset(self)
    }

    fn reset(&self) {
        DailyQuota::reset(self)
    }
}

/// 本地日期键
pub fn date_key(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// 距离下一个本地午夜的时间
pub fn time_until_midnight(now: DateTime<Local>) -> Duration {
    let next_day = now.date_naive() + Duration::days(1);
    let midnight = next_day.and_hms_opt(0, 0, 0).map(|naive| Local.from_local_datetime(&naive));

    match midnight {
        Some(LocalResult::Single(at)) | Some(LocalResult::Ambiguous(at, _)) => at - now,
        // 午夜不存在（夏令时跳变），按 24 小时减去已过时间估算
        _ => {
            let elapsed = now.time().num_seconds_from_midnight();
            Duration::days(1) - Duration::seconds(i64::from(elapsed))
        }
    }
}
