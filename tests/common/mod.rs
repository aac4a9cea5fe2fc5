// 集成测试公共模块
//
// 提供脚本化的 HTTP 传输、固定时钟和测试配置

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde_json::Value;

use article_illustrator::clock::ManualClock;
use article_illustrator::illustration::config::{Credentials, IllustrationConfig};
use article_illustrator::illustration::error::TransportError;
use article_illustrator::illustration::providers::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use article_illustrator::storage::MemoryStore;

pub const TEXT_URL: &str = "https://text.test/chat";
pub const SDK_BASE: &str = "https://sdk.test";
pub const ROUTER_BASE: &str = "https://router.test/models";
pub const LEGACY_BASE: &str = "https://legacy.test/models";
pub const JOB_BASE: &str = "https://jobs.test/v1";
pub const OUTPUT_URL: &str = "https://cdn.test/out.png";

pub const MODEL_A: &str = "org/model-a";
pub const MODEL_B: &str = "org/model-b";

/// 最小的 PNG 数据
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\x0D\x0A\x1A\x0A".to_vec();
    bytes.extend_from_slice(b"\x00\x00\x00\x0DIHDR-test-image");
    bytes
}

pub fn image_response(bytes: Vec<u8>) -> HttpResponse {
    HttpResponse {
        status: 200,
        content_type: Some("image/png".to_string()),
        body: bytes,
    }
}

pub fn json_response(status: u16, value: Value) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: value.to_string().into_bytes(),
    }
}

pub fn text_response(status: u16, text: &str) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("text/plain".to_string()),
        body: text.as_bytes().to_vec(),
    }
}

/// 文本服务的成功响应
pub fn completion_response(content: &str) -> HttpResponse {
    json_response(
        200,
        serde_json::json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] }),
    )
}

type Reply = Result<HttpResponse, TransportError>;

/// 脚本化的传输层
///
/// 每个 URL 对应一个响应队列，队列只剩最后一个响应时重复返回它。
/// 没有脚本的 URL 返回连接错误。
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: HttpResponse) -> &Self {
        self.push(url, Ok(response))
    }

    pub fn fail(&self, url: &str, error: TransportError) -> &Self {
        self.push(url, Err(error))
    }

    fn push(&self, url: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// 指定 URL 收到的请求数
    pub fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.url == url).count()
    }

    /// URL 以指定前缀开头的请求数
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.url.starts_with(prefix)).count()
    }

    pub fn first_to(&self, url: &str) -> Option<HttpRequest> {
        self.requests().into_iter().find(|r| r.url == url)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        let method = request.method;
        self.requests.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Connect(format!("{:?} {} 无脚本", method, url)))),
            None => Err(TransportError::Connect(format!("{:?} {} 无脚本", method, url))),
        }
    }
}

pub fn router_url(model: &str) -> String {
    format!("{}/{}", ROUTER_BASE, model)
}

pub fn legacy_url(model: &str) -> String {
    format!("{}/{}", LEGACY_BASE, model)
}

pub fn sdk_url(provider: &str, model: &str) -> String {
    format!("{}/{}/models/{}", SDK_BASE, provider, model)
}

pub fn predictions_url() -> String {
    format!("{}/predictions", JOB_BASE)
}

pub fn prediction_url(id: &str) -> String {
    format!("{}/predictions/{}", JOB_BASE, id)
}

/// 指向测试端点、不等待轮询的配置
pub fn test_config() -> IllustrationConfig {
    IllustrationConfig {
        text_endpoint: TEXT_URL.to_string(),
        image_model: MODEL_A.to_string(),
        alternative_image_model: MODEL_B.to_string(),
        fallback_models: Vec::new(),
        routing_hint: "nscale".to_string(),
        sdk_endpoint: SDK_BASE.to_string(),
        router_endpoint: ROUTER_BASE.to_string(),
        inference_endpoint: LEGACY_BASE.to_string(),
        job_endpoint: JOB_BASE.to_string(),
        job_version: "test-version".to_string(),
        poll_interval_ms: 0,
        ..IllustrationConfig::default()
    }
}

pub fn credentials(openrouter: bool, huggingface: bool, replicate: bool) -> Credentials {
    Credentials {
        openrouter_api_key: openrouter.then(|| "or-key".to_string()),
        huggingface_api_key: huggingface.then(|| "hf-key".to_string()),
        replicate_api_token: replicate.then(|| "r8-token".to_string()),
    }
}

/// 2024-05-10 21:30 本地时间
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2024, 5, 10, 21, 30, 0).unwrap(),
    ))
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn is_get(request: &HttpRequest) -> bool {
    request.method == HttpMethod::Get
}
