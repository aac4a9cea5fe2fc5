//! 插图模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use thiserror::Error;

/// 错误详情的最大长度（字符）
pub const MAX_ERROR_EXCERPT_CHARS: usize = 200;

/// 插图错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IllustrationError {
    /// 输入验证错误
    #[error("输入无效: {0}")]
    Validation(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 今日配额已用完
    #[error("今日插图生成次数已用完（上限 {limit} 次），{reset_in_secs} 秒后重置")]
    QuotaExceeded { limit: u32, reset_in_secs: i64 },

    /// 提示词生成错误
    #[error("提示词生成失败: {0}")]
    PromptSynthesis(String),

    /// 服务暂时不可用（模型加载中）
    #[error("图片服务暂时不可用 ({provider}, 状态 {status})，请稍后重试")]
    ProviderTransient { provider: String, status: u16 },

    /// 所有图片服务均失败
    #[error("所有图片服务均失败 (状态 {status}): {details}. {hint}")]
    ProviderExhausted {
        status: u16,
        details: String,
        hint: String,
    },

    /// 超时错误
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 响应中没有可用的图片
    #[error("响应格式错误: {0}")]
    ResponseFormat(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl IllustrationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            IllustrationError::ProviderTransient { .. } => true,
            IllustrationError::Timeout(_) => true,
            IllustrationError::Network(_) => true,
            IllustrationError::ProviderExhausted { .. } => true,
            IllustrationError::QuotaExceeded { .. } => false, // 需要等到第二天
            IllustrationError::Validation(_) => false,
            IllustrationError::Configuration(_) => false,
            IllustrationError::PromptSynthesis(_) => false,
            IllustrationError::ResponseFormat(_) => false,
            IllustrationError::Internal(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IllustrationError::Validation(_) => ErrorSeverity::Info,
            IllustrationError::QuotaExceeded { .. } => ErrorSeverity::Info,
            IllustrationError::Configuration(_) => ErrorSeverity::Critical,
            IllustrationError::PromptSynthesis(_) => ErrorSeverity::Error,
            IllustrationError::ProviderTransient { .. } => ErrorSeverity::Warning,
            IllustrationError::ProviderExhausted { .. } => ErrorSeverity::Error,
            IllustrationError::Timeout(_) => ErrorSeverity::Warning,
            IllustrationError::ResponseFormat(_) => ErrorSeverity::Error,
            IllustrationError::Network(_) => ErrorSeverity::Warning,
            IllustrationError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            IllustrationError::Validation(_) => ErrorCategory::Input,
            IllustrationError::Configuration(_) => ErrorCategory::Configuration,
            IllustrationError::QuotaExceeded { .. } => ErrorCategory::RateLimit,
            IllustrationError::PromptSynthesis(_) => ErrorCategory::Service,
            IllustrationError::ProviderTransient { .. } => ErrorCategory::Service,
            IllustrationError::ProviderExhausted { .. } => ErrorCategory::Service,
            IllustrationError::Timeout(_) => ErrorCategory::Timeout,
            IllustrationError::ResponseFormat(_) => ErrorCategory::Parsing,
            IllustrationError::Network(_) => ErrorCategory::Network,
            IllustrationError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self, context);

        match &mut self {
            IllustrationError::Validation(ref mut msg) => *msg = new_msg,
            IllustrationError::Configuration(ref mut msg) => *msg = new_msg,
            IllustrationError::PromptSynthesis(ref mut msg) => *msg = new_msg,
            IllustrationError::Timeout(ref mut msg) => *msg = new_msg,
            IllustrationError::ResponseFormat(ref mut msg) => *msg = new_msg,
            IllustrationError::Network(ref mut msg) => *msg = new_msg,
            IllustrationError::Internal(ref mut msg) => *msg = new_msg,
            IllustrationError::ProviderExhausted { ref mut details, .. } => {
                *details = format!("{} (上下文: {})", details, context);
            }
            IllustrationError::QuotaExceeded { .. } | IllustrationError::ProviderTransient { .. } => {}
        }

        self
    }

    /// 供调用方展示的简短提示
    pub fn user_hint(&self) -> &'static str {
        match self {
            IllustrationError::Validation(_) => "Provide the article text first.",
            IllustrationError::Configuration(_) => "Check the API keys in your .env file.",
            IllustrationError::QuotaExceeded { .. } => "Daily limit reached, come back tomorrow.",
            IllustrationError::ProviderTransient { .. } => "The model is warming up, try again shortly.",
            IllustrationError::Timeout(_) => "Generation took too long, please try again.",
            _ => "Image generation failed, please try again later.",
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    RateLimit,
    Input,
    Service,
    Timeout,
    Parsing,
    Internal,
}

/// 单个服务阶段的失败记录
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub provider: String,
    /// HTTP 状态码，连接失败时为空
    pub status: Option<u16>,
    pub body: String,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} 返回状态 {}: {}", self.provider, status, self.excerpt()),
            None => write!(f, "{} 无响应: {}", self.provider, self.excerpt()),
        }
    }
}

impl StageError {
    pub fn http(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn transport(provider: impl Into<String>, error: &TransportError) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            body: error.to_string(),
        }
    }

    /// 截断后的错误详情
    pub fn excerpt(&self) -> String {
        excerpt(&self.body)
    }
}

/// 截断错误详情
pub fn excerpt(text: &str) -> String {
    text.chars().take(MAX_ERROR_EXCERPT_CHARS).collect()
}

/// HTTP 传输错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    Connect(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("读取响应失败: {0}")]
    Body(String),
}

impl From<TransportError> for IllustrationError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout(msg) => IllustrationError::Timeout(msg),
            other => IllustrationError::Network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for IllustrationError {
    fn from(error: serde_json::Error) -> Self {
        IllustrationError::ResponseFormat(format!("JSON解析错误: {}", error))
    }
}

impl From<crate::env::EnvError> for IllustrationError {
    fn from(error: crate::env::EnvError) -> Self {
        IllustrationError::Configuration(error.to_string())
    }
}

/// 错误结果类型别名
pub type IllustrationResult<T> = Result<T, IllustrationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &IllustrationError) {
        self.total_errors += 1;

        *self.by_category.entry(error.category()).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// 获取错误率
    pub fn error_rate(&self, total_operations: usize) -> f64 {
        if total_operations == 0 {
            0.0
        } else {
            self.total_errors as f64 / total_operations as f64
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 记录并返回错误
    pub fn log_error<T>(error: IllustrationError) -> IllustrationResult<T> {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("插图信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("插图警告: {}", error),
            ErrorSeverity::Error => tracing::error!("插图错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("插图严重错误: {}", error),
        }

        Err(error)
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> IllustrationError {
        IllustrationError::Configuration(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> IllustrationError {
        IllustrationError::Validation(msg.to_string())
    }

    /// 创建响应格式错误
    pub fn response_format_error<T: fmt::Display>(msg: T) -> IllustrationError {
        IllustrationError::ResponseFormat(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> IllustrationError {
        IllustrationError::Internal(msg.to_string())
    }
}
