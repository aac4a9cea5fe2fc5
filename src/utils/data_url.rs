//! 数据URL工具

use base64::{engine::general_purpose::STANDARD, Engine};

/// 无法识别时使用的图片类型
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// 图片文件签名，`.` 匹配任意字节
const IMAGE_SIGNATURES: [(&[u8], &str); 7] = [
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"<svg ", "image/svg+xml"),
    (b"RIFF....WEBPVP8", "image/webp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
];

/// 根据魔数识别图片类型
pub fn detect_image_media_type(data: &[u8]) -> Option<&'static str> {
    IMAGE_SIGNATURES
        .iter()
        .find(|(signature, _)| matches_signature(data, signature))
        .map(|(_, media_type)| *media_type)
}

fn matches_signature(data: &[u8], signature: &[u8]) -> bool {
    data.len() >= signature.len()
        && signature
            .iter()
            .zip(data)
            .all(|(expected, actual)| *expected == b'.' || expected == actual)
}

/// 创建 base64 数据URL
pub fn create_data_url(media_type: &str, data: &[u8]) -> String {
    let media_type = if media_type.trim().is_empty() {
        detect_image_media_type(data).unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE)
    } else {
        media_type.trim()
    };

    format!("data:{};base64,{}", media_type, STANDARD.encode(data))
}

/// 解析数据URL，返回媒体类型和解码后的数据
///
/// 只支持 base64 编码的数据URL。
pub fn parse_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;

    let mut params = header.split(';');
    let media_type = params.next().unwrap_or_default().trim().to_lowercase();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return None;
    }

    let data = STANDARD.decode(payload.trim()).ok()?;
    let media_type = if media_type.is_empty() {
        "text/plain".to_string()
    } else {
        media_type
    };
    Some((media_type, data))
}
