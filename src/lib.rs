//! # Article Illustrator
//!
//! 根据文章正文生成插图：先用文本生成服务得到英文图片提示词，再按降级链依次尝试
//! 多个图片服务，结果统一为 base64 数据URL。
//!
//! ## 模块组织
//!
//! - `illustration` - 插图生成流程（配置、提示词、图片服务、编排）
//! - `storage` - 本地状态（缓存、历史记录、每日配额）
//! - `env` - 类型化的环境变量
//! - `clock` - 可替换的时间源
//! - `utils` - 数据URL工具

pub mod clock;
pub mod env;
pub mod illustration;
pub mod storage;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use illustration::{
    GeneratedIllustration, IllustrationError, IllustrationRequest, IllustrationResult,
    IllustrationService,
};
pub use storage::{DailyQuota, HistoryLog, KeyValueStore, MemoryStore, RedbStore, TtlCache};
