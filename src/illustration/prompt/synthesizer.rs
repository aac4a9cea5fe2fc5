//! 提示词合成器

use std::sync::Arc;

use serde_json::json;

use super::cleanup::clean_prompt;
use super::PromptLanguage;
use crate::illustration::config::{constants, IllustrationConfig};
use crate::illustration::error::{excerpt, IllustrationError, IllustrationResult};
use crate::illustration::providers::transport::{HttpRequest, HttpTransport};

/// 文章被截断时追加的标记
pub const TRUNCATION_MARKER: &str = "\n\n[... текст обрезан из-за ограничений длины ...]";

const SYSTEM_RU: &str = "Ты эксперт по созданию детальных и креативных описаний изображений. \
Твоя задача - создать краткий, но детальный промпт для генерации иллюстрации на основе статьи.

Требования:
- Промпт должен быть на английском языке (для лучших результатов AI модели генерации изображений)
- Длина: 50-100 слов
- Описывай визуальные элементы: предмет, фон, стиль, атмосферу
- Будь конкретным и креативным
- Фокусируйся на главной теме статьи
- Не добавляй лишних деталей";

const SYSTEM_ME: &str = "Ti si ekspert za kreiranje detaljnih i kreativnih opisa slika. \
Tvoja zadaća je da kreiraš kratak, ali detaljan prompt za generisanje ilustracije na osnovu članka.

Zahtjevi:
- Prompt mora biti na engleskom jeziku (za bolje rezultate AI modela za generisanje slika)
- Dužina: 50-100 riječi
- Opisuj vizuelne elemente: predmet, pozadinu, stil, atmosferu
- Budi specifičan i kreativan
- Fokusiraj se na glavnu temu članka
- Ne dodavaj nepotrebne detalje";

const USER_RU: &str = "Создай детальный промпт на английском языке для генерации иллюстрации \
на основе следующей статьи. Промпт должен описать визуальные элементы, стиль и атмосферу, \
соответствующую главной теме статьи.

Статья:
{article}

ВАЖНО: 
- Ответ должен быть ТОЛЬКО промптом на английском языке
- Без markdown форматирования (без **, *, #, и т.д.)
- Без дополнительных комментариев, объяснений или меток
- Только чистый текст описания изображения";

const USER_ME: &str = "Kreiraj detaljan prompt na engleskom jeziku za generisanje ilustracije \
na osnovu sljedećeg članka. Prompt treba da opiše vizuelne elemente, stil i atmosferu \
koja odgovara glavnoj temi članka.

Članak:
{article}

VAŽNO: 
- Odgovor mora biti SAMO prompt na engleskom jeziku
- Bez markdown formata (bez **, *, #, itd.)
- Bez dodatnih komentara, objašnjenja ili labela
- Samo čist tekst opisa slike";

/// 按语言选择系统指令并填入文章
fn instruction_pair(article: &str, language: PromptLanguage) -> (&'static str, String) {
    let (system, user_template) = match language {
        PromptLanguage::Russian => (SYSTEM_RU, USER_RU),
        PromptLanguage::Montenegrin => (SYSTEM_ME, USER_ME),
    };
    (system, user_template.replace("{article}", article))
}

/// 文本生成参数
#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_article_chars: usize,
    pub app_url: String,
}

impl From<&IllustrationConfig> for PromptSettings {
    fn from(config: &IllustrationConfig) -> Self {
        Self {
            endpoint: config.text_endpoint.clone(),
            model: config.text_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_article_chars: config.max_article_chars,
            app_url: config.app_url.clone(),
        }
    }
}

/// 按字符数截断文章，超出时追加标记；返回是否发生截断
pub fn truncate_article(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let mut truncated = text[..byte_index].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            (truncated, true)
        }
        None => (text.to_string(), false),
    }
}

/// 提示词合成器
pub struct PromptSynthesizer {
    transport: Arc<dyn HttpTransport>,
    settings: PromptSettings,
    api_key: String,
}

impl PromptSynthesizer {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: PromptSettings, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            settings,
            api_key: api_key.into(),
        }
    }

    /// 生成图片提示词
    pub async fn synthesize(&self, article_text: &str, language: PromptLanguage) -> IllustrationResult<String> {
        let (article, truncated) = truncate_article(article_text, self.settings.max_article_chars);
        if truncated {
            tracing::warn!(
                "文章过长，已从 {} 字符截断到 {} 字符",
                article_text.chars().count(),
                self.settings.max_article_chars
            );
        }

        let (system, user) = instruction_pair(&article, language);

        let body = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        let request = HttpRequest::post_json(&self.settings.endpoint, &body)
            .bearer(&self.api_key)
            .header("HTTP-Referer", &self.settings.app_url)
            .header("X-Title", constants::APP_TITLE);

        tracing::info!("正在通过 {} 生成图片提示词", self.settings.model);

        let response = self.transport.send(request).await.map_err(|e| {
            IllustrationError::PromptSynthesis(format!("文本生成服务请求失败: {}", e))
        })?;

        if !response.is_success() {
            tracing::error!("文本生成服务返回错误状态 {}", response.status);
            return Err(IllustrationError::PromptSynthesis(format!(
                "文本生成服务返回状态 {}: {}",
                response.status,
                excerpt(&response.text())
            )));
        }

        let payload: serde_json::Value = serde_json::from_slice(&response.body).map_err(|e| {
            IllustrationError::PromptSynthesis(format!("文本生成服务响应不是有效的JSON: {}", e))
        })?;

        let raw = payload
            .pointer("/choices/0/message/content")
            .and_then(|content| content.as_str())
            .map(str::trim)
            .unwrap_or_default();

        if raw.is_empty() {
            return Err(IllustrationError::PromptSynthesis(
                "文本生成服务返回了空的提示词".to_string(),
            ));
        }

        let prompt = clean_prompt(raw);
        if prompt.is_empty() {
            return Err(IllustrationError::PromptSynthesis(
                "清理格式后提示词为空".to_string(),
            ));
        }

        tracing::debug!("提示词已生成: {}", prompt.chars().take(100).collect::<String>());
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_article() {
        let (text, truncated) = truncate_article("короткий", 100);
        assert_eq!(text, "короткий");
        assert!(!truncated);

        let (text, truncated) = truncate_article("абвгд", 3);
        assert!(truncated);
        assert_eq!(text, format!("абв{}", TRUNCATION_MARKER));

        let (text, truncated) = truncate_article("abc", 3);
        assert_eq!(text, "abc");
        assert!(!truncated);
    }

    #[test]
    fn test_instruction_pair_russian() {
        let (system, user) = instruction_pair("Текст статьи", PromptLanguage::Russian);
        assert!(system.contains(
            "- Промпт должен быть на английском языке (для лучших результатов AI модели генерации изображений)"
        ));
        assert!(system.contains("- Будь конкретным и креативным"));
        assert!(system.ends_with("- Не добавляй лишних деталей"));
        assert!(user.contains("соответствующую главной теме статьи.\n\nСтатья:\nТекст статьи\n\nВАЖНО: \n"));
        assert!(user.ends_with("- Только чистый текст описания изображения"));
    }

    #[test]
    fn test_instruction_pair_montenegrin() {
        let (system, user) = instruction_pair("Tekst članka", PromptLanguage::Montenegrin);
        assert!(system.contains(
            "- Prompt mora biti na engleskom jeziku (za bolje rezultate AI modela za generisanje slika)"
        ));
        assert!(system.contains("- Budi specifičan i kreativan"));
        assert!(system.ends_with("- Ne dodavaj nepotrebne detalje"));
        assert!(user.contains("koja odgovara glavnoj temi članka.\n\nČlanak:\nTekst članka\n\nVAŽNO: \n"));
        assert!(user.ends_with("- Samo čist tekst opisa slike"));
    }
}
