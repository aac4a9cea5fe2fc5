//! 提示词生成
//!
//! 把文章正文交给文本生成服务，得到一段英文的图片描述，再清理掉格式残留。

pub mod cleanup;
pub mod synthesizer;

pub use cleanup::clean_prompt;
pub use synthesizer::{truncate_article, PromptSettings, PromptSynthesizer, TRUNCATION_MARKER};

/// 指令语言
///
/// 生成的提示词始终是英文，这里只决定发给文本服务的指令用哪种语言。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptLanguage {
    Russian,
    Montenegrin,
}

impl PromptLanguage {
    /// `me` 对应黑山语，其他任何代码都按俄语处理
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("me") {
            PromptLanguage::Montenegrin
        } else {
            PromptLanguage::Russian
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PromptLanguage::Russian => "ru",
            PromptLanguage::Montenegrin => "me",
        }
    }
}
