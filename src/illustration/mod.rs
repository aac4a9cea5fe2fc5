//! 文章插图生成
//!
//! 文章正文先交给文本生成服务得到英文提示词，再按降级链依次尝试图片服务。

pub mod config;
pub mod core;
pub mod error;
pub mod prompt;
pub mod providers;

pub use config::{ConfigManager, Credentials, IllustrationConfig};
pub use self::core::{
    illustration_file_name, GeneratedIllustration, IllustrationRequest, IllustrationService,
    ServiceStats,
};
pub use error::{IllustrationError, IllustrationResult};
pub use prompt::{PromptLanguage, PromptSynthesizer};
pub use providers::{FallbackChain, GeneratedImage, HttpTransport, ImageStrategy, ReqwestTransport};
