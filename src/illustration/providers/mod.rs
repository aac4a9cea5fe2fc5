//! 图片服务降级链
//!
//! 四个阶段按顺序尝试，每个阶段都实现 [`ImageStrategy`]：
//!
//! 1. `huggingface-sdk`: 带路由提示调用一次，失败后不带提示再调用一次
//! 2. `huggingface-router`: 逐个模型调用新版端点，404 换下一个模型
//! 3. `huggingface-inference`: 逐个模型调用旧版端点，410 换下一个模型
//! 4. `replicate`: 提交异步任务并轮询结果
//!
//! 阶段之间严格串行。

pub mod chain;
pub mod inference;
pub mod jobs;
pub mod normalize;
pub mod sdk;
pub mod transport;

use async_trait::async_trait;

use crate::illustration::error::{IllustrationError, StageError};

pub use chain::FallbackChain;
pub use inference::{EndpointGeneration, ModelEndpointStage};
pub use jobs::JobStage;
pub use normalize::{extract_image_from_json, normalize_image_response};
pub use sdk::SdkStage;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

pub const SDK_LABEL: &str = "huggingface-sdk";
pub const ROUTER_LABEL: &str = "huggingface-router";
pub const INFERENCE_LABEL: &str = "huggingface-inference";
pub const JOB_LABEL: &str = "replicate";

/// 某个阶段生成的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// base64 数据URL
    pub data_uri: String,
    pub provider_label: String,
    pub model: Option<String>,
}

/// 阶段未产出图片的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// 缺少凭据，阶段被跳过
    Unavailable(String),
    /// 阶段已尽力，交给下一阶段；附带最后一次错误
    Exhausted(Option<StageError>),
    /// 终止整个降级链（模型加载中、超时、响应格式错误）
    Halt(IllustrationError),
}

/// 降级链中的一个阶段
#[async_trait]
pub trait ImageStrategy: Send + Sync {
    fn label(&self) -> &'static str;

    async fn attempt(&self, prompt: &str) -> Result<GeneratedImage, StageFailure>;
}
