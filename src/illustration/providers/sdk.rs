//! SDK 风格的推理服务
//!
//! 先带路由提示调用，失败后不带提示重试一次。任何失败都只会让降级链进入下一阶段，
//! 包括权限不足。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::normalize::normalize_image_response;
use super::transport::{HttpRequest, HttpTransport};
use super::{GeneratedImage, ImageStrategy, StageFailure, SDK_LABEL};
use crate::illustration::config::constants::SDK_DEFAULT_PROVIDER;
use crate::illustration::error::StageError;

/// SDK 阶段
pub struct SdkStage {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    model: String,
    routing_hint: Option<String>,
    inference_steps: u32,
    api_key: Option<String>,
}

impl SdkStage {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        routing_hint: Option<String>,
        inference_steps: u32,
        api_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            model: model.into(),
            routing_hint: routing_hint.filter(|hint| !hint.trim().is_empty()),
            inference_steps,
            api_key,
        }
    }

    /// 请求地址：`<endpoint>/<provider>/models/<model>`
    pub fn url_for(&self, routing_hint: Option<&str>) -> String {
        format!(
            "{}/{}/models/{}",
            self.endpoint.trim_end_matches('/'),
            routing_hint.unwrap_or(SDK_DEFAULT_PROVIDER),
            self.model
        )
    }

    async fn call(&self, api_key: &str, prompt: &str, routing_hint: Option<&str>) -> Result<String, StageError> {
        let body = json!({
            "inputs": prompt,
            "parameters": { "num_inference_steps": self.inference_steps },
        });
        let request = HttpRequest::post_json(self.url_for(routing_hint), &body).bearer(api_key);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| StageError::transport(SDK_LABEL, &e))?;

        if !response.is_success() {
            return Err(StageError::http(SDK_LABEL, response.status, response.text()));
        }

        normalize_image_response(&response, SDK_LABEL)
            .map_err(|e| StageError::http(SDK_LABEL, response.status, e.to_string()))
    }
}

/// 是否为权限或认证失败
pub fn is_permission_error(error: &StageError) -> bool {
    if matches!(error.status, Some(401) | Some(403)) {
        return true;
    }
    let body = error.body.to_lowercase();
    body.contains("sufficient permissions")
        || body.contains("authentication")
        || body.contains("permissions")
}

#[async_trait]
impl ImageStrategy for SdkStage {
    fn label(&self) -> &'static str {
        SDK_LABEL
    }

    async fn attempt(&self, prompt: &str) -> Result<GeneratedImage, StageFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(StageFailure::Unavailable("未配置 HUGGINGFACE_API_KEY".to_string()));
        };

        let image = |data_uri: String| GeneratedImage {
            data_uri,
            provider_label: SDK_LABEL.to_string(),
            model: Some(self.model.clone()),
        };

        if let Some(hint) = self.routing_hint.as_deref() {
            tracing::info!("使用模型 {} 和路由提示 {} 调用 SDK", self.model, hint);
            match self.call(api_key, prompt, Some(hint)).await {
                Ok(data_uri) => return Ok(image(data_uri)),
                Err(e) => tracing::warn!("带路由提示调用失败，改为不带提示重试: {}", e),
            }
        }

        match self.call(api_key, prompt, None).await {
            Ok(data_uri) => Ok(image(data_uri)),
            Err(e) => {
                tracing::error!("SDK 调用失败: {}", e);
                if is_permission_error(&e) {
                    tracing::error!("⚠️ 当前令牌没有 Inference Providers 权限");
                    tracing::error!("解决方法: 在 https://huggingface.co/settings/tokens 创建带该权限的令牌，或配置 REPLICATE_API_TOKEN");
                }
                Err(StageFailure::Exhausted(Some(e)))
            }
        }
    }
}
