//! 有界历史记录
//!
//! 历史记录保存在单个键下的 JSON 数组中，受两个独立的上限约束：
//! 条目数量和序列化后的总字节数。超出任一上限时从尾部（最旧）开始淘汰。
//! 图片数据永远不会写入历史，只保留一个存在标记。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, TimeZone};
use serde::{Deserialize, Serialize};

use super::kv::KeyValueStore;
use super::size::estimate_size;
use super::HistoryRepository;
use crate::clock::Clock;

/// 历史记录存储键
pub const HISTORY_KEY: &str = "article_processor_history";

/// 最大条目数
pub const MAX_HISTORY_ITEMS: usize = 20;

/// 文本结果的最大字符数
pub const MAX_TEXT_CHARS: usize = 5000;

/// 整个历史记录的最大字节数（1 MiB）
pub const MAX_HISTORY_BYTES: usize = 1024 * 1024;

/// 文本被截断时追加的标记
pub const TEXT_TRUNCATION_MARKER: &str = "\n\n[...]";

/// 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    About,
    Thesis,
    Telegram,
    Translate,
    Illustration,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::About => "about",
            OperationKind::Thesis => "thesis",
            OperationKind::Telegram => "telegram",
            OperationKind::Translate => "translate",
            OperationKind::Illustration => "illustration",
        }
    }
}

/// 图片存在标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePresence {
    /// 没有图片
    None,
    /// 生成过图片
    Present,
    /// 调用方传入了图片数据，写入时被剥离
    Elided,
}

/// 历史记录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub url: String,
    pub operation_kind: OperationKind,
    pub text_result: Option<String>,
    pub image_presence: ImagePresence,
    /// 创建时间（Unix 毫秒）
    pub created_at: i64,
    pub language: String,
}

/// 待追加的条目，`id` 和时间由日志生成
#[derive(Debug, Clone)]
pub struct NewHistoryItem {
    pub url: String,
    pub operation_kind: OperationKind,
    pub text_result: Option<String>,
    pub image_presence: ImagePresence,
    /// 图片数据本身，永远不会被保存
    pub image_payload: Option<String>,
    pub language: String,
}

impl NewHistoryItem {
    pub fn text(
        url: impl Into<String>,
        operation_kind: OperationKind,
        text_result: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            operation_kind,
            text_result: Some(text_result.into()),
            image_presence: ImagePresence::None,
            image_payload: None,
            language: language.into(),
        }
    }

    /// 插图记录，只保存存在标记
    pub fn illustration(url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            operation_kind: OperationKind::Illustration,
            text_result: None,
            image_presence: ImagePresence::Present,
            image_payload: None,
            language: language.into(),
        }
    }
}

/// 有界历史记录
pub struct HistoryLog {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_items: usize,
    max_text_chars: usize,
    max_bytes: usize,
    id_counter: AtomicU64,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_items: MAX_HISTORY_ITEMS,
            max_text_chars: MAX_TEXT_CHARS,
            max_bytes: MAX_HISTORY_BYTES,
            id_counter: AtomicU64::new(0),
        }
    }

    /// 自定义上限
    pub fn with_limits(mut self, max_items: usize, max_text_chars: usize, max_bytes: usize) -> Self {
        self.max_items = max_items;
        self.max_text_chars = max_text_chars;
        self.max_bytes = max_bytes;
        self
    }

    /// 追加一条记录
    ///
    /// 先剥离图片并截断文本，再插入头部；随后按数量和字节上限从尾部淘汰，
    /// 新插入的条目本身也可能被淘汰。
    pub fn append(&self, new_item: NewHistoryItem) -> Option<HistoryItem> {
        let now = self.clock.now_millis();
        let item = self.prepare(new_item, now);

        let mut items = self.load();
        items.insert(0, item.clone());
        items.truncate(self.max_items);

        while !items.is_empty() && estimate_size(&items) > self.max_bytes {
            if let Some(dropped) = items.pop() {
                tracing::debug!("历史记录超出字节上限，淘汰: {}", dropped.id);
            }
        }

        let saved = self.persist(items)?;
        saved.into_iter().find(|saved| saved.id == item.id)
    }

    /// 全部记录，新的在前
    pub fn list(&self) -> Vec<HistoryItem> {
        self.load()
    }

    pub fn get(&self, id: &str) -> Option<HistoryItem> {
        self.load().into_iter().find(|item| item.id == id)
    }

    /// 删除指定记录，不存在时不做任何事
    pub fn remove(&self, id: &str) {
        let items = self.load();
        let before = items.len();
        let remaining: Vec<HistoryItem> = items.into_iter().filter(|item| item.id != id).collect();

        if remaining.len() != before {
            self.persist(remaining);
        }
    }

    /// 清空历史
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(HISTORY_KEY) {
            tracing::warn!("清空历史记录失败: {}", e);
        }
    }

    fn prepare(&self, new_item: NewHistoryItem, now: i64) -> HistoryItem {
        let image_presence = if new_item.image_payload.is_some() {
            ImagePresence::Elided
        } else {
            new_item.image_presence
        };

        let text_result = new_item
            .text_result
            .map(|text| truncate_text(&text, self.max_text_chars));

        HistoryItem {
            id: self.next_id(now, &new_item.url),
            url: new_item.url,
            operation_kind: new_item.operation_kind,
            text_result,
            image_presence,
            created_at: now,
            language: new_item.language,
        }
    }

    /// 生成 `history_<毫秒>_<9 位十六进制>` 形式的 id
    fn next_id(&self, now: i64, url: &str) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);

        let mut hasher = blake3::Hasher::new();
        hasher.update(&now.to_le_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&counter.to_le_bytes());
        hasher.update(url.as_bytes());
        let hex = hasher.finalize().to_hex();

        format!("history_{}_{}", now, &hex.as_str()[..9])
    }

    fn load(&self) -> Vec<HistoryItem> {
        let stored = match self.store.get(HISTORY_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("读取历史记录失败: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<HistoryItem>>(&stored) {
            Ok(mut items) => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                items
            }
            Err(e) => {
                tracing::warn!("历史记录损坏，按空记录处理: {}", e);
                Vec::new()
            }
        }
    }

    /// 写入记录，容量不足时保留较新的一半重试一次；返回实际写入的记录
    fn persist(&self, mut items: Vec<HistoryItem>) -> Option<Vec<HistoryItem>> {
        match self.write(&items) {
            Ok(()) => return Some(items),
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!("存储容量不足，历史记录减半后重试: {}", e);
            }
            Err(e) => {
                tracing::warn!("保存历史记录失败: {}", e);
                return None;
            }
        }

        items.truncate(items.len() / 2);
        match self.write(&items) {
            Ok(()) => Some(items),
            Err(e) => {
                tracing::warn!("减半后仍无法保存历史记录，放弃: {}", e);
                None
            }
        }
    }

    fn write(&self, items: &[HistoryItem]) -> Result<(), super::kv::StorageError> {
        let serialized = serde_json::to_string(items)?;
        self.store.set(HISTORY_KEY, &serialized)
    }
}

impl HistoryRepository for HistoryLog {
    fn append(&self, item: NewHistoryItem) -> Option<HistoryItem> {
        HistoryLog::append(self, item)
    }

    fn list(&self) -> Vec<HistoryItem> {
        HistoryLog::list(self)
    }

    fn get(&self, id: &str) -> Option<HistoryItem> {
        HistoryLog::get(self, id)
    }

    fn remove(&self, id: &str) {
        HistoryLog::remove(self, id)
    }

    fn clear(&self) {
        HistoryLog::clear(self)
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TEXT_TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TEXT_TRUNCATION_MARKER);
    truncated
}

/// 相对时间
///
/// 不到 1 分钟显示 "just now"，之后依次按分钟、小时、天显示，
/// 7 天以上显示日期（年份与当前不同时才带年份）。
pub fn format_relative_time(timestamp_ms: i64, now: DateTime<Local>) -> String {
    let diff = (now.timestamp_millis() - timestamp_ms).max(0);

    let minutes = diff / 60_000;
    let hours = diff / 3_600_000;
    let days = diff / 86_400_000;

    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{} min ago", minutes);
    }
    if hours < 24 {
        return format!("{} h ago", hours);
    }
    if days < 7 {
        return format!("{} d ago", days);
    }

    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(date) if date.year() != now.year() => date.format("%-d %b %Y").to_string(),
        Some(date) => date.format("%-d %b").to_string(),
        None => timestamp_ms.to_string(),
    }
}
