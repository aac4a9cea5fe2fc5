//! 响应归一化
//!
//! 不论哪个阶段成功，最终都输出一个 base64 `data:` URI。
//! JSON 响应依次检查 `image` 字段、`blob` 字段，最后扫描任意足够长的 base64 字符串。

use std::sync::OnceLock;

use regex::Regex;

use super::transport::HttpResponse;
use crate::illustration::error::{IllustrationError, IllustrationResult};
use crate::utils::{create_data_url, detect_image_media_type, DEFAULT_IMAGE_MEDIA_TYPE};

fn base64_token_regex() -> &'static Regex {
    static BASE64_TOKEN: OnceLock<Regex> = OnceLock::new();
    BASE64_TOKEN.get_or_init(|| {
        Regex::new(r#""([A-Za-z0-9+/=]{100,})""#).unwrap_or_else(|_| Regex::new(r"$^").unwrap())
    })
}

/// 把已经是 base64 的图片数据补全为数据URL
fn inline_base64(data: &str) -> String {
    if data.starts_with("data:") {
        data.to_string()
    } else {
        format!("data:{};base64,{}", DEFAULT_IMAGE_MEDIA_TYPE, data)
    }
}

/// 从 JSON 响应中提取图片
pub fn extract_image_from_json(value: &serde_json::Value) -> Option<String> {
    if let Some(image) = value.get("image").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        return Some(inline_base64(image));
    }

    if let Some(blob) = value.get("blob").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        return Some(inline_base64(blob));
    }

    let serialized = value.to_string();
    base64_token_regex()
        .captures(&serialized)
        .and_then(|captures| captures.get(1))
        .map(|token| inline_base64(token.as_str()))
}

/// 把服务响应转换为数据URL
pub fn normalize_image_response(response: &HttpResponse, provider: &str) -> IllustrationResult<String> {
    if let Some(media_type) = response.media_type().filter(|m| m.starts_with("image/")) {
        if response.body.is_empty() {
            return Err(IllustrationError::ResponseFormat(format!(
                "{} 返回了空的图片",
                provider
            )));
        }
        return Ok(create_data_url(&media_type, &response.body));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
        if let Some(data_url) = extract_image_from_json(&value) {
            return Ok(data_url);
        }
        tracing::error!("{} 的JSON响应中找不到图片", provider);
        return Err(IllustrationError::ResponseFormat(format!(
            "{} 的响应中没有可提取的图片",
            provider
        )));
    }

    // 缺少 Content-Type 时按魔数识别
    if let Some(media_type) = detect_image_media_type(&response.body) {
        return Ok(create_data_url(media_type, &response.body));
    }

    Err(IllustrationError::ResponseFormat(format!(
        "{} 返回了无法识别的响应格式",
        provider
    )))
}
