//! 时间来源
//!
//! 缓存过期、历史记录时间和每日配额都依赖“当前时间”。通过 `Clock` 注入，
//! 测试可以使用 `ManualClock` 精确控制时间流逝。

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local};

/// 时间来源抽象
pub trait Clock: Send + Sync {
    /// 当前本地时间
    fn now(&self) -> DateTime<Local>;

    /// 当前时间的 Unix 毫秒时间戳
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// 手动时钟，时间只在调用 `set` / `advance` 时变化
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 设置为指定时间
    pub fn set(&self, at: DateTime<Local>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = at;
    }

    /// 向前拨动时钟
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now_millis() - start.timestamp_millis(), 5 * 60 * 1000);
    }
}
