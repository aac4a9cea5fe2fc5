//! 插图配置管理模块
//!
//! 支持配置文件、`.env` 文件、环境变量和默认值

pub mod manager;

pub use manager::{ConfigManager, Credentials, IllustrationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 文本生成服务
    pub const DEFAULT_TEXT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
    pub const DEFAULT_TEXT_MODEL: &str = "mistralai/devstral-2512:free";
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_MAX_TOKENS: u32 = 200;
    pub const APP_TITLE: &str = "Article Illustration Generator";
    pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

    // 文章截断
    pub const MAX_ARTICLE_CHARS: usize = 30_000;

    // 图片模型
    pub const DEFAULT_IMAGE_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";
    pub const DEFAULT_ALTERNATIVE_MODEL: &str = "runwayml/stable-diffusion-v1-5";
    pub const FALLBACK_MODELS: &[&str] = &[
        "CompVis/stable-diffusion-v1-4",
        "stabilityai/sdxl-turbo",
        "stabilityai/stable-diffusion-2-1",
        "stabilityai/stable-diffusion-2-1-base",
    ];
    pub const DEFAULT_ROUTING_HINT: &str = "nscale";
    pub const DEFAULT_INFERENCE_STEPS: u32 = 20;

    // 图片服务端点
    pub const DEFAULT_SDK_ENDPOINT: &str = "https://router.huggingface.co";
    pub const SDK_DEFAULT_PROVIDER: &str = "hf-inference";
    pub const DEFAULT_ROUTER_ENDPOINT: &str = "https://router.huggingface.co/models";
    pub const DEFAULT_INFERENCE_ENDPOINT: &str = "https://api-inference.huggingface.co/models";
    pub const DEFAULT_JOB_ENDPOINT: &str = "https://api.replicate.com/v1";
    pub const DEFAULT_JOB_VERSION: &str =
        "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";

    // 任务轮询
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

    // 其他
    pub const DEFAULT_DAILY_IMAGE_LIMIT: u32 = 3;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_STATE_PATH: &str = "~/.local/share/article-illustrator/state.redb";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "illustrator.toml",
        ".illustrator.toml",
        "illustrator.json",
        "~/.config/article-illustrator/config.toml",
        "/etc/article-illustrator/config.toml",
    ];
}

/// 是否存在配置文件
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}
