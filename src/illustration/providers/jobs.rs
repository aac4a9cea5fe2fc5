//! 异步任务服务
//!
//! 提交一个预测任务，然后按固定间隔轮询，直到任务成功、失败或轮询次数用完。
//! 成功后下载输出图片并编码为数据URL。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::transport::{HttpRequest, HttpTransport};
use super::{GeneratedImage, ImageStrategy, StageFailure, JOB_LABEL};
use crate::illustration::error::{IllustrationError, StageError};
use crate::utils::data_url::{create_data_url, detect_image_media_type, DEFAULT_IMAGE_MEDIA_TYPE};

/// 任务状态
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl Prediction {
    fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }

    fn is_failed(&self) -> bool {
        self.status == "failed" || self.status == "canceled"
    }

    /// 输出地址：数组的第一项或单个字符串
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
            serde_json::Value::String(url) => Some(url.clone()),
            _ => None,
        }
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => format!("任务状态为 {}", self.status),
        }
    }
}

/// 异步任务阶段
pub struct JobStage {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    version: String,
    api_token: Option<String>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl JobStage {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: impl Into<String>,
        version: impl Into<String>,
        api_token: Option<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            version: version.into(),
            api_token,
            poll_interval: crate::illustration::config::constants::DEFAULT_POLL_INTERVAL,
            max_poll_attempts: crate::illustration::config::constants::DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }

    /// 设置轮询间隔和最大轮询次数
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    fn auth(&self, request: HttpRequest, token: &str) -> HttpRequest {
        request.header("Authorization", format!("Token {}", token))
    }

    async fn create(&self, token: &str, prompt: &str) -> Result<Prediction, StageFailure> {
        let body = json!({
            "version": self.version,
            "input": {
                "prompt": prompt,
                "num_outputs": 1,
                "aspect_ratio": "1:1",
                "output_format": "png",
            },
        });
        let request = self.auth(
            HttpRequest::post_json(format!("{}/predictions", self.endpoint), &body),
            token,
        );

        let response = self.transport.send(request).await.map_err(|e| {
            tracing::error!("提交任务失败: {}", e);
            StageFailure::Exhausted(Some(StageError::transport(JOB_LABEL, &e)))
        })?;

        if !response.is_success() {
            tracing::error!("提交任务返回状态 {}", response.status);
            return Err(StageFailure::Exhausted(Some(StageError::http(
                JOB_LABEL,
                response.status,
                response.text(),
            ))));
        }

        let prediction: Prediction = response.json().map_err(StageFailure::Halt)?;
        if prediction.id.is_empty() && !prediction.is_succeeded() {
            return Err(StageFailure::Halt(IllustrationError::ResponseFormat(
                "任务响应中缺少 id".to_string(),
            )));
        }
        Ok(prediction)
    }

    /// 轮询直到终态，返回终态任务
    async fn wait(&self, token: &str, mut prediction: Prediction) -> Result<Prediction, StageFailure> {
        let status_url = format!("{}/predictions/{}", self.endpoint, prediction.id);
        let mut polls = 0u32;

        while !prediction.is_succeeded() && !prediction.is_failed() {
            if polls >= self.max_poll_attempts {
                return Err(StageFailure::Halt(IllustrationError::Timeout(format!(
                    "任务在 {} 次轮询后仍未完成",
                    polls
                ))));
            }

            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let request = self.auth(HttpRequest::get(&status_url), token);
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => match response.json::<Prediction>() {
                    Ok(next) => prediction = next,
                    Err(e) => tracing::warn!("第 {} 次轮询响应无法解析: {}", polls, e),
                },
                Ok(response) => tracing::warn!("第 {} 次轮询返回状态 {}", polls, response.status),
                Err(e) => tracing::warn!("第 {} 次轮询失败: {}", polls, e),
            }
        }

        tracing::debug!("任务 {} 在 {} 次轮询后结束: {}", prediction.id, polls, prediction.status);
        Ok(prediction)
    }

    async fn download(&self, url: &str) -> Result<String, StageFailure> {
        let response = self.transport.send(HttpRequest::get(url)).await.map_err(|e| {
            StageFailure::Exhausted(Some(StageError::transport(JOB_LABEL, &e)))
        })?;

        if !response.is_success() {
            return Err(StageFailure::Exhausted(Some(StageError::http(
                JOB_LABEL,
                response.status,
                response.text(),
            ))));
        }
        if response.body.is_empty() {
            return Err(StageFailure::Halt(IllustrationError::ResponseFormat(
                "任务输出图片为空".to_string(),
            )));
        }

        let media_type = response
            .media_type()
            .filter(|media_type| media_type.starts_with("image/"))
            .or_else(|| detect_image_media_type(&response.body).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_IMAGE_MEDIA_TYPE.to_string());

        Ok(create_data_url(&media_type, &response.body))
    }
}

#[async_trait]
impl ImageStrategy for JobStage {
    fn label(&self) -> &'static str {
        JOB_LABEL
    }

    async fn attempt(&self, prompt: &str) -> Result<GeneratedImage, StageFailure> {
        let Some(token) = self.api_token.as_deref() else {
            return Err(StageFailure::Unavailable("未配置 REPLICATE_API_TOKEN".to_string()));
        };

        tracing::info!("提交异步图片任务");
        let created = self.create(token, prompt).await?;
        let finished = self.wait(token, created).await?;

        if finished.is_failed() {
            let message = finished.error_message();
            tracing::error!("任务失败: {}", message);
            return Err(StageFailure::Exhausted(Some(StageError {
                provider: JOB_LABEL.to_string(),
                status: None,
                body: message,
            })));
        }

        let Some(url) = finished.output_url() else {
            return Err(StageFailure::Halt(IllustrationError::ResponseFormat(
                "任务成功但没有输出".to_string(),
            )));
        };

        let data_uri = self.download(&url).await?;
        tracing::info!("异步任务生成图片成功");

        Ok(GeneratedImage {
            data_uri,
            provider_label: JOB_LABEL.to_string(),
            model: Some(self.version.clone()),
        })
    }
}
