//! 插图服务核心实现
//!
//! 本模块把配额、提示词合成、图片降级链和历史记录组合成一次完整的插图生成流程。
//! 这是插图系统的主要入口点。
//!
//! ## 处理流程
//!
//! 1. 校验文章正文
//! 2. 检查今日配额（只读，不消耗）
//! 3. 检查凭据配置
//! 4. 调用文本服务生成提示词
//! 5. 依次尝试图片服务
//! 6. 成功后消耗一次配额并写入历史记录
//!
//! 任何一步失败都不会消耗配额，也不会写入历史。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use article_illustrator::illustration::core::IllustrationService;
//!
//! let service = IllustrationService::new(&config, credentials, transport, quota, history);
//! let illustration = service.generate_illustration(&article, "ru").await?;
//! println!("{} 生成了图片", illustration.provider_label);
//! ```

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Instant;

use serde::Serialize;

use crate::illustration::config::{Credentials, IllustrationConfig};
use crate::illustration::error::{helpers, IllustrationError, IllustrationResult};
use crate::illustration::prompt::{PromptLanguage, PromptSettings, PromptSynthesizer};
use crate::illustration::providers::{FallbackChain, HttpTransport};
use crate::storage::{HistoryRepository, NewHistoryItem, QuotaRepository};

/// 一次插图请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllustrationRequest {
    pub article_text: String,
    /// 语言代码，`me` 为黑山语，其他按俄语处理
    pub language: String,
    /// 文章来源，只用于历史记录
    pub source_url: Option<String>,
}

impl IllustrationRequest {
    pub fn new(article_text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            article_text: article_text.into(),
            language: language.into(),
            source_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// 生成结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedIllustration {
    pub prompt_text: String,
    pub image_data_uri: String,
    pub provider_label: String,
}

/// 下载文件名：`illustration_<epoch-ms>.png`
pub fn illustration_file_name(epoch_ms: i64) -> String {
    format!("illustration_{}.png", epoch_ms)
}

/// 插图服务
///
/// 三个本地状态仓库通过窄接口注入，测试时可以换成内存实现。
pub struct IllustrationService {
    quota: Arc<dyn QuotaRepository>,
    history: Arc<dyn HistoryRepository>,
    synthesizer: PromptSynthesizer,
    chain: FallbackChain,
    credentials: Credentials,
    stats: ServiceStats,
}

impl IllustrationService {
    /// 按配置创建服务，降级链使用标准的四个阶段
    pub fn new(
        config: &IllustrationConfig,
        credentials: Credentials,
        transport: Arc<dyn HttpTransport>,
        quota: Arc<dyn QuotaRepository>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        let synthesizer = PromptSynthesizer::new(
            transport.clone(),
            PromptSettings::from(config),
            credentials.openrouter_api_key.clone().unwrap_or_default(),
        );
        let chain = FallbackChain::from_config(config, &credentials, transport);

        Self::from_parts(synthesizer, chain, credentials, quota, history)
    }

    /// 用现成的组件创建服务
    pub fn from_parts(
        synthesizer: PromptSynthesizer,
        chain: FallbackChain,
        credentials: Credentials,
        quota: Arc<dyn QuotaRepository>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        tracing::debug!("插图服务已创建，降级链: {:?}", chain.stage_labels());
        Self {
            quota,
            history,
            synthesizer,
            chain,
            credentials,
            stats: ServiceStats::default(),
        }
    }

    /// 根据文章正文生成插图
    pub async fn generate_illustration(
        &self,
        article_text: &str,
        language_code: &str,
    ) -> IllustrationResult<GeneratedIllustration> {
        self.generate(IllustrationRequest::new(article_text, language_code))
            .await
    }

    /// 执行完整的插图流程
    pub async fn generate(&self, request: IllustrationRequest) -> IllustrationResult<GeneratedIllustration> {
        let start = Instant::now();
        self.stats.inc_requests();
        metrics::counter!("illustrator_requests_total").increment(1);

        let result = self.run(&request).await;
        self.stats.add_processing_time(start.elapsed());

        match result {
            Ok(illustration) => {
                self.stats.inc_successes(&illustration.provider_label);
                metrics::counter!(
                    "illustrator_illustrations_total",
                    "provider" => illustration.provider_label.clone()
                )
                .increment(1);
                Ok(illustration)
            }
            Err(error) => {
                self.stats.record_failure(&error);
                metrics::counter!("illustrator_failures_total", "category" => format!("{:?}", error.category()))
                    .increment(1);
                helpers::log_error(error)
            }
        }
    }

    async fn run(&self, request: &IllustrationRequest) -> IllustrationResult<GeneratedIllustration> {
        if request.article_text.trim().is_empty() {
            return Err(helpers::validation_error("文章内容为空"));
        }

        if !self.quota.can_proceed() {
            return Err(IllustrationError::QuotaExceeded {
                limit: self.quota.daily_limit(),
                reset_in_secs: self.quota.time_until_reset().num_seconds(),
            });
        }

        self.check_credentials()?;

        let language = PromptLanguage::from_code(&request.language);
        tracing::info!(
            "开始生成插图，文章 {} 字符，指令语言 {}",
            request.article_text.chars().count(),
            language.code()
        );

        let prompt_text = self
            .synthesizer
            .synthesize(&request.article_text, language)
            .await?;

        let image = self.chain.generate(&prompt_text).await?;

        // 只有成功才消耗配额
        self.quota.increment();

        let url = request.source_url.clone().unwrap_or_default();
        if self
            .history
            .append(NewHistoryItem::illustration(url, request.language.clone()))
            .is_none()
        {
            tracing::debug!("插图历史记录未能保存");
        }

        tracing::info!(
            "插图生成完成 ({}), 今日剩余 {} 次",
            image.provider_label,
            self.quota.remaining()
        );

        Ok(GeneratedIllustration {
            prompt_text,
            image_data_uri: image.data_uri,
            provider_label: image.provider_label,
        })
    }

    fn check_credentials(&self) -> IllustrationResult<()> {
        if self.credentials.openrouter_api_key.is_none() {
            return Err(helpers::config_error(
                "未配置 OPENROUTER_API_KEY，请在 .env 文件中添加",
            ));
        }
        if !self.credentials.has_image_credentials() {
            return Err(helpers::config_error(
                "未配置任何图片服务凭据，请添加 HUGGINGFACE_API_KEY 或 REPLICATE_API_TOKEN",
            ));
        }
        Ok(())
    }

    /// 今日剩余次数
    pub fn remaining_quota(&self) -> u32 {
        self.quota.remaining()
    }

    pub fn get_stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn stage_labels(&self) -> Vec<&'static str> {
        self.chain.stage_labels()
    }
}

/// 服务统计信息
///
/// 计数器使用原子操作，可以在多个请求之间共享。
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 收到的请求数
    pub requests: AtomicUsize,

    /// 成功生成的插图数
    pub successes: AtomicUsize,

    /// 失败次数
    pub failures: AtomicUsize,

    /// 可重试的失败（模型加载中、超时等）
    pub transient_failures: AtomicUsize,

    /// 总处理时间，以毫秒为单位
    pub processing_time_ms: AtomicU64,

    by_provider: Mutex<BTreeMap<String, usize>>,
}

impl ServiceStats {
    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_successes(&self, provider: &str) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_provider) = self.by_provider.lock() {
            *by_provider.entry(provider.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_failure(&self, error: &IllustrationError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if matches!(
            error,
            IllustrationError::ProviderTransient { .. } | IllustrationError::Timeout(_)
        ) {
            self.transient_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_processing_time(&self, duration: std::time::Duration) {
        self.processing_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            processing_time_ms: self.processing_time_ms.load(Ordering::Relaxed),
            by_provider: self
                .by_provider
                .lock()
                .map(|by_provider| by_provider.clone())
                .unwrap_or_default(),
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.transient_failures.store(0, Ordering::Relaxed);
        self.processing_time_ms.store(0, Ordering::Relaxed);
        if let Ok(mut by_provider) = self.by_provider.lock() {
            by_provider.clear();
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatsSnapshot {
    pub requests: usize,
    pub successes: usize,
    pub failures: usize,
    pub transient_failures: usize,
    pub processing_time_ms: u64,
    pub by_provider: BTreeMap<String, usize>,
}

impl ServiceStatsSnapshot {
    /// 成功率
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(illustration_file_name(1_700_000_000_123), "illustration_1700000000123.png");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ServiceStats::default();
        stats.inc_requests();
        stats.inc_requests();
        stats.inc_successes("replicate");
        stats.record_failure(&IllustrationError::ProviderTransient {
            provider: "huggingface-router".to_string(),
            status: 503,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.transient_failures, 1);
        assert_eq!(snapshot.by_provider.get("replicate"), Some(&1));
        assert!((snapshot.success_rate() - 0.5).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.snapshot(), ServiceStatsSnapshot::default());
    }
}
