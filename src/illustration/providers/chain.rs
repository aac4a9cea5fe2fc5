//! 降级链执行器

use std::sync::Arc;

use super::inference::{EndpointGeneration, ModelEndpointStage};
use super::jobs::JobStage;
use super::sdk::SdkStage;
use super::transport::HttpTransport;
use super::{GeneratedImage, ImageStrategy, StageFailure};
use crate::illustration::config::{Credentials, IllustrationConfig};
use crate::illustration::error::{IllustrationError, IllustrationResult, StageError};

/// 全部阶段都没有 HTTP 错误可报告时的详情
pub const NO_SERVICE_DETAILS: &str = "Unable to connect to any image generation service";

/// 没有 HTTP 状态码时使用的状态
pub const DEFAULT_FAILURE_STATUS: u16 = 500;

/// 按顺序执行各阶段的降级链
pub struct FallbackChain {
    stages: Vec<Box<dyn ImageStrategy>>,
    credential_hint: String,
}

impl FallbackChain {
    pub fn new(credential_hint: impl Into<String>) -> Self {
        Self {
            stages: Vec::new(),
            credential_hint: credential_hint.into(),
        }
    }

    /// 追加一个阶段
    pub fn with_stage(mut self, stage: impl ImageStrategy + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// 按配置组装标准的四阶段链
    pub fn from_config(
        config: &IllustrationConfig,
        credentials: &Credentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let models = config.candidate_models();
        let hf_key = credentials.huggingface_api_key.clone();
        let routing_hint = Some(config.routing_hint.clone());

        Self::new(credentials.missing_credential_hint())
            .with_stage(SdkStage::new(
                transport.clone(),
                &config.sdk_endpoint,
                &config.image_model,
                routing_hint,
                config.inference_steps,
                hf_key.clone(),
            ))
            .with_stage(ModelEndpointStage::new(
                transport.clone(),
                EndpointGeneration::Router,
                &config.router_endpoint,
                models.clone(),
                hf_key.clone(),
            ))
            .with_stage(ModelEndpointStage::new(
                transport.clone(),
                EndpointGeneration::Legacy,
                &config.inference_endpoint,
                models,
                hf_key,
            ))
            .with_stage(
                JobStage::new(
                    transport,
                    &config.job_endpoint,
                    &config.job_version,
                    credentials.replicate_api_token.clone(),
                )
                .with_polling(config.poll_interval(), config.max_poll_attempts),
            )
    }

    pub fn stage_labels(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.label()).collect()
    }

    /// 依次尝试各阶段，返回第一张生成的图片
    pub async fn generate(&self, prompt: &str) -> IllustrationResult<GeneratedImage> {
        let mut last_error: Option<StageError> = None;

        for stage in &self.stages {
            let label = stage.label();
            metrics::counter!("illustrator_stage_attempts_total", "stage" => label).increment(1);

            match stage.attempt(prompt).await {
                Ok(image) => {
                    metrics::counter!("illustrator_stage_success_total", "stage" => label).increment(1);
                    tracing::info!("✅ {} 生成图片成功", label);
                    return Ok(image);
                }
                Err(StageFailure::Unavailable(reason)) => {
                    tracing::debug!("跳过 {}: {}", label, reason);
                }
                Err(StageFailure::Exhausted(error)) => {
                    metrics::counter!("illustrator_stage_failures_total", "stage" => label).increment(1);
                    tracing::warn!("{} 未能生成图片，尝试下一个服务", label);
                    if error.is_some() {
                        last_error = error;
                    }
                }
                Err(StageFailure::Halt(error)) => {
                    metrics::counter!("illustrator_stage_failures_total", "stage" => label).increment(1);
                    tracing::warn!("{} 终止降级链: {}", label, error);
                    return Err(error);
                }
            }
        }

        Err(self.exhausted(last_error))
    }

    fn exhausted(&self, last_error: Option<StageError>) -> IllustrationError {
        let (status, details) = match last_error {
            Some(error) => {
                let details = error.excerpt();
                let details = if details.trim().is_empty() {
                    NO_SERVICE_DETAILS.to_string()
                } else {
                    details
                };
                (error.status.unwrap_or(DEFAULT_FAILURE_STATUS), details)
            }
            None => (DEFAULT_FAILURE_STATUS, NO_SERVICE_DETAILS.to_string()),
        };

        tracing::error!("所有图片服务均失败，状态 {}", status);
        IllustrationError::ProviderExhausted {
            status,
            details,
            hint: self.credential_hint.clone(),
        }
    }
}
