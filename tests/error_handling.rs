//! 错误处理集成测试
//!
//! 验证错误分类、可重试性以及错误在各层之间的转换。

use article_illustrator::env::{huggingface, EnvVar};
use article_illustrator::illustration::config::{ConfigManager, Credentials, IllustrationConfig};
use article_illustrator::illustration::error::{
    helpers, ErrorCategory, ErrorSeverity, ErrorStats, IllustrationError, StageError, TransportError,
};

#[test]
fn test_error_taxonomy() {
    let cases = vec![
        (helpers::validation_error("empty"), ErrorCategory::Input, false),
        (helpers::config_error("no key"), ErrorCategory::Configuration, false),
        (
            IllustrationError::QuotaExceeded { limit: 3, reset_in_secs: 60 },
            ErrorCategory::RateLimit,
            false,
        ),
        (IllustrationError::PromptSynthesis("401".into()), ErrorCategory::Service, false),
        (
            IllustrationError::ProviderTransient { provider: "huggingface-router".into(), status: 503 },
            ErrorCategory::Service,
            true,
        ),
        (IllustrationError::Timeout("polling".into()), ErrorCategory::Timeout, true),
        (helpers::response_format_error("no image"), ErrorCategory::Parsing, false),
        (helpers::internal_error("bug"), ErrorCategory::Internal, false),
    ];

    for (error, category, retryable) in cases {
        assert_eq!(error.category(), category, "{}", error);
        assert_eq!(error.is_retryable(), retryable, "{}", error);
        assert!(!error.user_hint().is_empty());
    }

    println!("✅ 错误分类正确");
}

#[test]
fn test_exhausted_error_message_contains_diagnostics() {
    let error = IllustrationError::ProviderExhausted {
        status: 410,
        details: "gone".to_string(),
        hint: "Consider adding REPLICATE_API_TOKEN".to_string(),
    };

    let message = error.to_string();
    assert!(message.contains("410"));
    assert!(message.contains("gone"));
    assert!(message.contains("REPLICATE_API_TOKEN"));
    assert_eq!(error.severity(), ErrorSeverity::Error);
}

#[test]
fn test_with_context() {
    let error = helpers::config_error("missing key").with_context("illustrate");
    assert!(error.to_string().contains("illustrate"));
    assert_eq!(error.category(), ErrorCategory::Configuration);

    let error = IllustrationError::ProviderExhausted {
        status: 500,
        details: "down".into(),
        hint: String::new(),
    }
    .with_context("replicate");
    match error {
        IllustrationError::ProviderExhausted { details, .. } => assert!(details.contains("replicate")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_conversions() {
    let error: IllustrationError = TransportError::Timeout("120s".into()).into();
    assert!(matches!(error, IllustrationError::Timeout(_)));

    let error: IllustrationError = TransportError::Body("reset".into()).into();
    assert_eq!(error.category(), ErrorCategory::Network);

    let error: IllustrationError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert_eq!(error.category(), ErrorCategory::Parsing);

    let env_error = huggingface::Steps::parse("0").unwrap_err();
    let error: IllustrationError = env_error.into();
    assert_eq!(error.category(), ErrorCategory::Configuration);
}

#[test]
fn test_stage_error_excerpt_is_bounded() {
    let error = StageError::http("huggingface-inference", 500, "é".repeat(500));
    assert_eq!(error.excerpt().chars().count(), 200);
    assert!(error.to_string().starts_with("huggingface-inference"));
}

#[test]
fn test_error_stats() {
    let mut stats = ErrorStats::default();
    stats.record_error(&IllustrationError::Timeout("t".into()));
    stats.record_error(&helpers::config_error("c"));
    stats.record_error(&helpers::validation_error("v"));

    assert_eq!(stats.total_errors, 3);
    assert_eq!(stats.retryable_errors, 1);
    assert_eq!(stats.critical_errors, 1);
    assert_eq!(stats.by_category.get(&ErrorCategory::Timeout), Some(&1));
    assert!((stats.error_rate(6) - 0.5).abs() < f64::EPSILON);

    stats.reset();
    assert_eq!(stats.total_errors, 0);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = IllustrationConfig {
        max_poll_attempts: 0,
        ..IllustrationConfig::default()
    };
    let error = ConfigManager::with_parts(config, Credentials::default()).unwrap_err();
    assert_eq!(error.category(), ErrorCategory::Configuration);
}

#[test]
fn test_invalid_config_file_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("illustrator.toml");
    std::fs::write(&path, "max_poll_attempts = 0").unwrap();

    let error = ConfigManager::from_path(&path).unwrap_err();
    assert_eq!(error.category(), ErrorCategory::Configuration);
    assert!(error.to_string().contains("illustrator.toml"));
}

#[test]
fn test_broken_config_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("illustrator.toml");
    std::fs::write(&path, "daily_image_limit = \"many\"").unwrap();

    let error = ConfigManager::load_from_file(&path).unwrap_err();
    assert!(matches!(error, IllustrationError::Configuration(_)));

    let missing = ConfigManager::load_from_file(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, IllustrationError::Configuration(_)));
}
