//! 同步模型端点
//!
//! 两代端点共用同一套逐模型迭代逻辑，区别只在于哪个状态码表示“换下一个模型”：
//! 新版路由端点是 404，正在下线的旧版端点是 410。
//!
//! - 2xx: 归一化响应并结束降级链
//! - 503: 模型加载中，以可重试错误结束降级链
//! - 换模型状态码: 记录错误，尝试下一个模型
//! - 其他状态码: 记录错误并停止本阶段
//! - 连接失败: 记录错误，尝试下一个模型

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::normalize::normalize_image_response;
use super::transport::{HttpRequest, HttpTransport};
use super::{GeneratedImage, ImageStrategy, StageFailure, INFERENCE_LABEL, ROUTER_LABEL};
use crate::illustration::error::{IllustrationError, StageError};

/// 端点代际
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointGeneration {
    /// 新版路由端点
    Router,
    /// 旧版推理端点
    Legacy,
}

impl EndpointGeneration {
    pub fn label(&self) -> &'static str {
        match self {
            EndpointGeneration::Router => ROUTER_LABEL,
            EndpointGeneration::Legacy => INFERENCE_LABEL,
        }
    }

    /// 表示“尝试下一个模型”的状态码
    pub fn continue_status(&self) -> u16 {
        match self {
            EndpointGeneration::Router => 404,
            EndpointGeneration::Legacy => 410,
        }
    }
}

/// 逐模型调用同步端点的阶段
pub struct ModelEndpointStage {
    transport: Arc<dyn HttpTransport>,
    generation: EndpointGeneration,
    endpoint: String,
    models: Vec<String>,
    api_key: Option<String>,
}

impl ModelEndpointStage {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        generation: EndpointGeneration,
        endpoint: impl Into<String>,
        models: Vec<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            generation,
            endpoint: endpoint.into(),
            models,
            api_key,
        }
    }

    pub fn url_for(&self, model: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl ImageStrategy for ModelEndpointStage {
    fn label(&self) -> &'static str {
        self.generation.label()
    }

    async fn attempt(&self, prompt: &str) -> Result<GeneratedImage, StageFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(StageFailure::Unavailable("未配置 HUGGINGFACE_API_KEY".to_string()));
        };

        let label = self.label();
        let mut last_error: Option<StageError> = None;

        for model in &self.models {
            tracing::info!("尝试模型 {} ({})", model, label);

            let request = HttpRequest::post_json(self.url_for(model), &json!({ "inputs": prompt }))
                .bearer(api_key);

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("模型 {} 请求失败: {}", model, e);
                    last_error = Some(StageError::transport(label, &e));
                    continue;
                }
            };

            if response.is_success() {
                tracing::info!("模型 {} 返回状态 {}", model, response.status);
                return normalize_image_response(&response, label)
                    .map(|data_uri| GeneratedImage {
                        data_uri,
                        provider_label: label.to_string(),
                        model: Some(model.clone()),
                    })
                    .map_err(StageFailure::Halt);
            }

            if response.status == 503 {
                tracing::warn!("模型 {} 正在加载", model);
                return Err(StageFailure::Halt(IllustrationError::ProviderTransient {
                    provider: label.to_string(),
                    status: 503,
                }));
            }

            tracing::warn!("模型 {} 返回状态 {}", model, response.status);
            let error = StageError::http(label, response.status, response.text());
            let try_next = response.status == self.generation.continue_status();
            last_error = Some(error);

            if !try_next {
                break;
            }
        }

        Err(StageFailure::Exhausted(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_semantics() {
        assert_eq!(EndpointGeneration::Router.continue_status(), 404);
        assert_eq!(EndpointGeneration::Legacy.continue_status(), 410);
        assert_eq!(EndpointGeneration::Router.label(), "huggingface-router");
        assert_eq!(EndpointGeneration::Legacy.label(), "huggingface-inference");
    }
}
