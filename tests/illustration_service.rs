//! 插图服务集成测试
//!
//! 覆盖完整流程：配额检查、提示词生成、图片降级链和历史记录。

use std::sync::Arc;

use article_illustrator::illustration::error::{ErrorCategory, IllustrationError};
use article_illustrator::illustration::{IllustrationRequest, IllustrationService};
use article_illustrator::storage::{
    DailyQuota, HistoryLog, ImagePresence, OperationKind,
};

mod common {
    include!("common/mod.rs");
}

use common::*;

struct TestEnvironment {
    transport: Arc<ScriptedTransport>,
    quota: Arc<DailyQuota>,
    history: Arc<HistoryLog>,
}

impl TestEnvironment {
    fn new() -> Self {
        let store = memory_store();
        let clock = test_clock();
        Self {
            transport: ScriptedTransport::new(),
            quota: Arc::new(DailyQuota::new(store.clone(), clock.clone(), 3)),
            history: Arc::new(HistoryLog::new(store, clock)),
        }
    }

    fn service(&self, openrouter: bool, huggingface: bool, replicate: bool) -> IllustrationService {
        IllustrationService::new(
            &test_config(),
            credentials(openrouter, huggingface, replicate),
            self.transport.clone(),
            self.quota.clone(),
            self.history.clone(),
        )
    }

    fn script_success(&self) {
        self.transport
            .respond(TEXT_URL, completion_response("**Prompt:** A cat. \n\nNote: be creative"))
            .respond(&router_url(MODEL_A), image_response(png_bytes()));
    }
}

#[tokio::test]
async fn test_successful_generation_consumes_quota_and_records_history() {
    let env = TestEnvironment::new();
    env.script_success();
    let service = env.service(true, true, false);

    let request = IllustrationRequest::new("Статья о кошках", "ru").with_source_url("https://example.com/cats");
    let illustration = service.generate(request).await.unwrap();

    assert_eq!(illustration.prompt_text, "A cat.");
    assert_eq!(illustration.provider_label, "huggingface-router");
    assert!(illustration.image_data_uri.starts_with("data:image/png;base64,"));

    assert_eq!(env.quota.remaining(), 2);

    let items = env.history.list();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].operation_kind, OperationKind::Illustration);
    assert_eq!(items[0].image_presence, ImagePresence::Present);
    assert_eq!(items[0].url, "https://example.com/cats");
    assert_eq!(items[0].text_result, None);

    // 提示词请求携带的头
    let text_request = env.transport.first_to(TEXT_URL).unwrap();
    assert_eq!(text_request.header_value("Authorization"), Some("Bearer or-key"));
    assert!(text_request.header_value("X-Title").is_some());
    assert!(text_request.header_value("HTTP-Referer").is_some());

    // 图片服务收到的是清理后的提示词
    let image_request = env.transport.first_to(&router_url(MODEL_A)).unwrap();
    assert_eq!(image_request.json_body().unwrap()["inputs"], "A cat.");

    let stats = service.get_stats().snapshot();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.by_provider.get("huggingface-router"), Some(&1));

    println!("✅ 成功生成插图，配额和历史记录已更新");
}

#[tokio::test]
async fn test_montenegrin_instructions() {
    let env = TestEnvironment::new();
    env.script_success();
    let service = env.service(true, true, false);

    service.generate_illustration("Članak o mačkama", "me").await.unwrap();

    let body = env.transport.first_to(TEXT_URL).and_then(|r| r.json_body()).unwrap();
    let system = body["messages"][0]["content"].as_str().unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(system.starts_with("Ti si ekspert"));
    assert!(user.contains("Članak o mačkama"));
    assert_eq!(body["max_tokens"], 200);
}

#[tokio::test]
async fn test_failure_does_not_consume_quota() {
    let env = TestEnvironment::new();
    env.transport
        .respond(TEXT_URL, completion_response("A cat on a roof"))
        .respond(
            &router_url(MODEL_A),
            json_response(401, serde_json::json!({ "error": "Invalid credentials in Authorization header" })),
        )
        .respond(&legacy_url(MODEL_A), text_response(410, "gone"))
        .respond(&legacy_url(MODEL_B), text_response(410, "gone"));
    let service = env.service(true, true, false);

    let error = service.generate_illustration("Статья", "ru").await.unwrap_err();

    assert!(matches!(error, IllustrationError::ProviderExhausted { status: 410, .. }));
    assert_eq!(env.quota.remaining(), 3);
    assert!(env.history.list().is_empty());
    assert_eq!(service.get_stats().snapshot().failures, 1);
}

#[tokio::test]
async fn test_quota_exhausted_blocks_before_network() {
    let env = TestEnvironment::new();
    env.script_success();
    for _ in 0..3 {
        env.quota.increment();
    }
    let service = env.service(true, true, true);

    let error = service.generate_illustration("Статья", "ru").await.unwrap_err();

    match error {
        IllustrationError::QuotaExceeded { limit, reset_in_secs } => {
            assert_eq!(limit, 3);
            assert_eq!(reset_in_secs, 150 * 60);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(env.transport.requests().is_empty());
}

#[tokio::test]
async fn test_empty_article_is_validation_error() {
    let env = TestEnvironment::new();
    let service = env.service(true, true, true);

    let error = service.generate_illustration("  \n\t ", "ru").await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::Input);
    assert!(!error.is_retryable());
    assert!(env.transport.requests().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_are_configuration_errors() {
    let env = TestEnvironment::new();

    let error = env.service(false, true, true).generate_illustration("Статья", "ru").await.unwrap_err();
    assert!(matches!(error, IllustrationError::Configuration(_)));

    let error = env.service(true, false, false).generate_illustration("Статья", "ru").await.unwrap_err();
    assert!(matches!(error, IllustrationError::Configuration(_)));

    assert!(env.transport.requests().is_empty());
    assert_eq!(env.quota.remaining(), 3);
}

#[tokio::test]
async fn test_prompt_failure_skips_image_providers() {
    let env = TestEnvironment::new();
    env.transport.respond(TEXT_URL, text_response(429, "rate limited"));
    let service = env.service(true, true, true);

    let error = service.generate_illustration("Статья", "ru").await.unwrap_err();

    assert!(matches!(error, IllustrationError::PromptSynthesis(_)));
    assert_eq!(env.transport.requests().len(), 1);
}

#[tokio::test]
async fn test_prompt_empty_after_cleanup_is_error() {
    let env = TestEnvironment::new();
    env.transport.respond(TEXT_URL, completion_response("**Prompt:**\nNote: nothing"));
    let service = env.service(true, true, false);

    let error = service.generate_illustration("Статья", "ru").await.unwrap_err();
    assert!(matches!(error, IllustrationError::PromptSynthesis(_)));
}

#[tokio::test]
async fn test_long_article_is_truncated_before_submission() {
    let env = TestEnvironment::new();
    env.script_success();
    let service = env.service(true, true, false);

    let article = "ж".repeat(40_000);
    service.generate_illustration(&article, "ru").await.unwrap();

    let body = env.transport.first_to(TEXT_URL).and_then(|r| r.json_body()).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("[... текст обрезан из-за ограничений длины ...]"));
    assert!(!user.contains(&"ж".repeat(30_001)));
    assert!(user.contains(&"ж".repeat(30_000)));
}
