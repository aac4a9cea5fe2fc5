//! 配置管理器
//!
//! 配置按以下顺序合成：默认值、配置文件、环境变量覆盖。
//! 凭据只从环境变量读取，永远不会出现在配置文件里。

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::illustration::error::{IllustrationError, IllustrationResult};

/// 插图配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IllustrationConfig {
    // 文本生成
    pub text_endpoint: String,
    pub text_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_article_chars: usize,
    pub app_url: String,

    // 图片模型
    pub image_model: String,
    pub alternative_image_model: String,
    pub fallback_models: Vec<String>,
    pub routing_hint: String,
    pub inference_steps: u32,

    // 端点
    pub sdk_endpoint: String,
    pub router_endpoint: String,
    pub inference_endpoint: String,
    pub job_endpoint: String,
    pub job_version: String,

    // 轮询
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,

    // 其他
    pub daily_image_limit: u32,
    pub request_timeout_secs: u64,
    pub state_path: String,
}

impl Default for IllustrationConfig {
    fn default() -> Self {
        Self {
            text_endpoint: constants::DEFAULT_TEXT_ENDPOINT.to_string(),
            text_model: constants::DEFAULT_TEXT_MODEL.to_string(),
            temperature: constants::DEFAULT_TEMPERATURE,
            max_tokens: constants::DEFAULT_MAX_TOKENS,
            max_article_chars: constants::MAX_ARTICLE_CHARS,
            app_url: constants::DEFAULT_APP_URL.to_string(),

            image_model: constants::DEFAULT_IMAGE_MODEL.to_string(),
            alternative_image_model: constants::DEFAULT_ALTERNATIVE_MODEL.to_string(),
            fallback_models: constants::FALLBACK_MODELS
                .iter()
                .map(|model| model.to_string())
                .collect(),
            routing_hint: constants::DEFAULT_ROUTING_HINT.to_string(),
            inference_steps: constants::DEFAULT_INFERENCE_STEPS,

            sdk_endpoint: constants::DEFAULT_SDK_ENDPOINT.to_string(),
            router_endpoint: constants::DEFAULT_ROUTER_ENDPOINT.to_string(),
            inference_endpoint: constants::DEFAULT_INFERENCE_ENDPOINT.to_string(),
            job_endpoint: constants::DEFAULT_JOB_ENDPOINT.to_string(),
            job_version: constants::DEFAULT_JOB_VERSION.to_string(),

            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_poll_attempts: constants::DEFAULT_MAX_POLL_ATTEMPTS,

            daily_image_limit: constants::DEFAULT_DAILY_IMAGE_LIMIT,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            state_path: constants::DEFAULT_STATE_PATH.to_string(),
        }
    }
}

impl IllustrationConfig {
    /// 验证配置
    pub fn validate(&self) -> IllustrationResult<()> {
        if self.image_model.trim().is_empty() {
            return Err(IllustrationError::Configuration("图片模型不能为空".to_string()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(IllustrationError::Configuration(
                "temperature 必须在 0 到 2 之间".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(IllustrationError::Configuration("max_tokens 不能为0".to_string()));
        }

        if self.max_article_chars == 0 {
            return Err(IllustrationError::Configuration("文章长度上限不能为0".to_string()));
        }

        if self.inference_steps == 0 {
            return Err(IllustrationError::Configuration("推理步数不能为0".to_string()));
        }

        if self.max_poll_attempts == 0 {
            return Err(IllustrationError::Configuration("轮询次数不能为0".to_string()));
        }

        if self.daily_image_limit == 0 {
            return Err(IllustrationError::Configuration("每日上限不能为0".to_string()));
        }

        for (name, endpoint) in [
            ("text_endpoint", &self.text_endpoint),
            ("sdk_endpoint", &self.sdk_endpoint),
            ("router_endpoint", &self.router_endpoint),
            ("inference_endpoint", &self.inference_endpoint),
            ("job_endpoint", &self.job_endpoint),
        ] {
            if url::Url::parse(endpoint).is_err() {
                return Err(IllustrationError::Configuration(format!(
                    "{} 不是有效的URL: {}",
                    name, endpoint
                )));
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖，只处理显式设置的变量
    pub fn apply_env_overrides(&mut self) -> IllustrationResult<()> {
        use crate::env::{core, huggingface, EnvVar};

        if let Some(model) = huggingface::Model::get_explicit()? {
            tracing::info!("环境变量覆盖图片模型: {}", model);
            self.image_model = model;
        }

        if let Some(model) = huggingface::AlternativeModel::get_explicit()? {
            self.alternative_image_model = model;
        }

        if let Some(hint) = huggingface::Provider::get_explicit()? {
            self.routing_hint = hint;
        }

        if let Some(steps) = huggingface::Steps::get_explicit()? {
            self.inference_steps = steps as u32;
        }

        if let Some(app_url) = core::AppUrl::get_explicit()? {
            self.app_url = app_url;
        }

        if let Some(limit) = core::DailyImageLimit::get_explicit()? {
            self.daily_image_limit = limit as u32;
        }

        if let Some(timeout) = core::RequestTimeout::get_explicit()? {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Some(state_path) = core::StatePath::get_explicit()? {
            self.state_path = state_path;
        }

        Ok(())
    }

    /// 去重后的候选模型列表，保持顺序
    pub fn candidate_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        let all = [&self.image_model, &self.alternative_image_model]
            .into_iter()
            .chain(self.fallback_models.iter());

        for model in all {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 展开 `~` 后的状态文件路径
    pub fn expanded_state_path(&self) -> String {
        shellexpand::tilde(&self.state_path).into_owned()
    }
}

/// 服务凭据
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openrouter_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
}

impl Credentials {
    /// 从环境变量读取凭据
    pub fn from_env() -> Self {
        use crate::env::{credentials, EnvVar};

        Self {
            openrouter_api_key: credentials::OpenRouterApiKey::get().ok(),
            huggingface_api_key: credentials::HuggingFaceApiKey::get().ok(),
            replicate_api_token: credentials::ReplicateApiToken::get().ok(),
        }
    }

    /// 是否有任何图片服务凭据
    pub fn has_image_credentials(&self) -> bool {
        self.huggingface_api_key.is_some() || self.replicate_api_token.is_some()
    }

    /// 全部服务失败时附带的提示
    pub fn missing_credential_hint(&self) -> String {
        let mut hints = Vec::new();
        if self.huggingface_api_key.is_none() {
            hints.push(
                "Consider adding HUGGINGFACE_API_KEY to .env.local to enable the Hugging Face endpoints.",
            );
        }
        if self.replicate_api_token.is_none() {
            hints.push(
                "Consider adding REPLICATE_API_TOKEN to .env.local for alternative service (free tier available at replicate.com).",
            );
        } else {
            hints.push("Replicate API also failed or is not configured correctly.");
        }
        hints.join(" ")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |secret: &Option<String>| if secret.is_some() { "[configured]" } else { "[not set]" };
        f.debug_struct("Credentials")
            .field("openrouter_api_key", &mask(&self.openrouter_api_key))
            .field("huggingface_api_key", &mask(&self.huggingface_api_key))
            .field("replicate_api_token", &mask(&self.replicate_api_token))
            .finish()
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: IllustrationConfig,
    credentials: Credentials,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> IllustrationResult<Self> {
        Self::load_dotenv();

        let mut config = Self::load_config()?;
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(Self {
            config,
            credentials: Credentials::from_env(),
        })
    }

    /// 使用指定配置文件
    pub fn from_path<P: AsRef<Path>>(path: P) -> IllustrationResult<Self> {
        Self::load_dotenv();

        let mut config = Self::load_from_file(path.as_ref())?;
        config.apply_env_overrides()?;
        config
            .validate()
            .map_err(|e| e.with_context(path.as_ref().display()))?;

        Ok(Self {
            config,
            credentials: Credentials::from_env(),
        })
    }

    /// 直接由配置和凭据构建
    pub fn with_parts(config: IllustrationConfig, credentials: Credentials) -> IllustrationResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credentials,
        })
    }

    /// 获取配置
    pub fn get_config(&self) -> &IllustrationConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn into_parts(self) -> (IllustrationConfig, Credentials) {
        (self.config, self.credentials)
    }

    /// 按搜索路径加载配置文件
    fn load_config() -> IllustrationResult<IllustrationConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(IllustrationConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> IllustrationResult<IllustrationConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IllustrationError::Configuration(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| IllustrationError::Configuration(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| IllustrationError::Configuration(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> IllustrationResult<()> {
        let config = IllustrationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| IllustrationError::Configuration(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| IllustrationError::Configuration(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
