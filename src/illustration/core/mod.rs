//! 插图系统核心模块
//!
//! ```text
//! IllustrationService (service.rs)
//!     ├── QuotaRepository (storage/quota.rs)
//!     ├── PromptSynthesizer (prompt/synthesizer.rs)
//!     ├── FallbackChain (providers/chain.rs)
//!     └── HistoryRepository (storage/history.rs)
//! ```

pub mod service;

pub use service::{
    illustration_file_name, GeneratedIllustration, IllustrationRequest, IllustrationService,
    ServiceStats, ServiceStatsSnapshot,
};
