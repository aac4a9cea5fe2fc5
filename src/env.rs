//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。凭据只从环境变量读取。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只在变量显式设置时返回值，未设置时为 `Ok(None)`
    fn get_explicit() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// 核心环境变量
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "ILLUSTRATOR_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.trim().to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.trim().to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 本地状态数据库路径
    pub struct StatePath;
    impl EnvVar<String> for StatePath {
        const NAME: &'static str = "ILLUSTRATOR_STATE_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str =
            "Path of the local state database (cache, history, quota)";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("~/.local/share/article-illustrator/state.redb".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 应用地址，作为 HTTP-Referer 发送给文本生成服务
    pub struct AppUrl;
    impl EnvVar<String> for AppUrl {
        const NAME: &'static str = "ILLUSTRATOR_APP_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Application URL sent as HTTP-Referer to the text provider";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("http://localhost:3000".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }

    /// 每日图片生成上限
    pub struct DailyImageLimit;
    impl EnvVar<usize> for DailyImageLimit {
        const NAME: &'static str = "ILLUSTRATOR_DAILY_IMAGE_LIMIT";
        const DEFAULT: Option<usize> = Some(3);
        const DESCRIPTION: &'static str = "Maximum number of illustrations per local calendar day";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1000)
        }
    }

    /// 单个 HTTP 请求超时
    pub struct RequestTimeout;
    impl EnvVar<Duration> for RequestTimeout {
        const NAME: &'static str = "ILLUSTRATOR_REQUEST_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(120));
        const DESCRIPTION: &'static str = "Timeout of a single provider HTTP request in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let seconds = parse_positive_usize(value, Self::NAME, 1, 600)?;
            Ok(Duration::from_secs(seconds as u64))
        }
    }
}

/// 服务凭据
pub mod credentials {
    use super::*;

    /// 文本生成服务密钥
    pub struct OpenRouterApiKey;
    impl EnvVar<String> for OpenRouterApiKey {
        const NAME: &'static str = "OPENROUTER_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "API key of the text-generation provider (required)";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// Hugging Face 密钥
    pub struct HuggingFaceApiKey;
    impl EnvVar<String> for HuggingFaceApiKey {
        const NAME: &'static str = "HUGGINGFACE_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Hugging Face token for the SDK, router and inference stages";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 异步任务服务令牌
    pub struct ReplicateApiToken;
    impl EnvVar<String> for ReplicateApiToken {
        const NAME: &'static str = "REPLICATE_API_TOKEN";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Replicate token for the job-based fallback stage";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }
}

/// 图片模型相关环境变量
pub mod huggingface {
    use super::*;

    /// 主模型
    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "HUGGINGFACE_MODEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Primary image model";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("stabilityai/stable-diffusion-xl-base-1.0".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            parse_model_id(value, Self::NAME)
        }
    }

    /// 备用模型
    pub struct AlternativeModel;
    impl EnvVar<String> for AlternativeModel {
        const NAME: &'static str = "HUGGINGFACE_ALTERNATIVE_MODEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Alternate image model tried right after the primary one";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("runwayml/stable-diffusion-v1-5".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            parse_model_id(value, Self::NAME)
        }
    }

    /// SDK 路由提示
    pub struct Provider;
    impl EnvVar<String> for Provider {
        const NAME: &'static str = "HUGGINGFACE_PROVIDER";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Inference provider hint for the SDK stage";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("nscale".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 推理步数
    pub struct Steps;
    impl EnvVar<usize> for Steps {
        const NAME: &'static str = "HUGGINGFACE_STEPS";
        const DEFAULT: Option<usize> = Some(20);
        const DESCRIPTION: &'static str = "Inference step count for the SDK stage";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 150)
        }
    }
}

/// 辅助函数
fn non_empty(value: &str, var_name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Value must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_http_url(value: &str, var_name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    match url::Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid URL '{}'. Must start with http:// or https://", value),
        }),
    }
}

fn parse_model_id(value: &str, var_name: &str) -> EnvResult<String> {
    let trimmed = non_empty(value, var_name)?;
    if trimmed.contains(char::is_whitespace) || trimmed.starts_with('/') || trimmed.ends_with('/') {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid model id '{}'. Use the form owner/name", value),
        });
    }
    Ok(trimmed)
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 环境变量配置汇总
#[derive(Clone)]
pub struct EnvConfig {
    pub log_level: String,
    pub state_path: String,
    pub app_url: String,
    pub daily_image_limit: usize,
    pub request_timeout: Duration,

    pub openrouter_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub replicate_api_token: Option<String>,

    pub huggingface_model: String,
    pub huggingface_alternative_model: String,
    pub huggingface_provider: String,
    pub huggingface_steps: usize,
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("log_level", &self.log_level)
            .field("state_path", &self.state_path)
            .field("app_url", &self.app_url)
            .field("daily_image_limit", &self.daily_image_limit)
            .field("request_timeout", &self.request_timeout)
            .field("openrouter_api_key", &mask(&self.openrouter_api_key))
            .field("huggingface_api_key", &mask(&self.huggingface_api_key))
            .field("replicate_api_token", &mask(&self.replicate_api_token))
            .field("huggingface_model", &self.huggingface_model)
            .field("huggingface_alternative_model", &self.huggingface_alternative_model)
            .field("huggingface_provider", &self.huggingface_provider)
            .field("huggingface_steps", &self.huggingface_steps)
            .finish()
    }
}

fn mask(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "[configured]"
    } else {
        "[not set]"
    }
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            log_level: core::LogLevel::get()?,
            state_path: core::StatePath::get()?,
            app_url: core::AppUrl::get()?,
            daily_image_limit: core::DailyImageLimit::get()?,
            request_timeout: core::RequestTimeout::get()?,

            openrouter_api_key: credentials::OpenRouterApiKey::get().ok(),
            huggingface_api_key: credentials::HuggingFaceApiKey::get().ok(),
            replicate_api_token: credentials::ReplicateApiToken::get().ok(),

            huggingface_model: huggingface::Model::get()?,
            huggingface_alternative_model: huggingface::AlternativeModel::get()?,
            huggingface_provider: huggingface::Provider::get()?,
            huggingface_steps: huggingface::Steps::get()?,
        })
    }

    /// 打印配置摘要（隐藏敏感信息）
    pub fn print_summary(&self) {
        println!("Environment Configuration Summary:");
        println!("  Log Level: {}", self.log_level);
        println!("  State Path: {}", self.state_path);
        println!("  Daily Image Limit: {}", self.daily_image_limit);
        println!("  Image Model: {}", self.huggingface_model);
        println!("  OpenRouter Key: {}", mask(&self.openrouter_api_key));
        println!("  Hugging Face Key: {}", mask(&self.huggingface_api_key));
        println!("  Replicate Token: {}", mask(&self.replicate_api_token));
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&format!("- `{}`: {}\n", core::LogLevel::NAME, core::LogLevel::DESCRIPTION));
    docs.push_str(&format!("- `{}`: {}\n", core::StatePath::NAME, core::StatePath::DESCRIPTION));
    docs.push_str(&format!("- `{}`: {}\n", core::AppUrl::NAME, core::AppUrl::DESCRIPTION));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::DailyImageLimit::NAME,
        core::DailyImageLimit::DESCRIPTION,
        core::DailyImageLimit::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::RequestTimeout::NAME,
        core::RequestTimeout::DESCRIPTION,
        core::RequestTimeout::DEFAULT
    ));

    docs.push_str("\n## Credentials\n\n");
    docs.push_str(&format!(
        "- `{}`: {}\n",
        credentials::OpenRouterApiKey::NAME,
        credentials::OpenRouterApiKey::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        credentials::HuggingFaceApiKey::NAME,
        credentials::HuggingFaceApiKey::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        credentials::ReplicateApiToken::NAME,
        credentials::ReplicateApiToken::DESCRIPTION
    ));

    docs.push_str("\n## Image Models\n\n");
    docs.push_str(&format!("- `{}`: {}\n", huggingface::Model::NAME, huggingface::Model::DESCRIPTION));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        huggingface::AlternativeModel::NAME,
        huggingface::AlternativeModel::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        huggingface::Provider::NAME,
        huggingface::Provider::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        huggingface::Steps::NAME,
        huggingface::Steps::DESCRIPTION,
        huggingface::Steps::DEFAULT
    ));

    docs
}
