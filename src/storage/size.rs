//! 存储大小估算
//!
//! 缓存和历史记录的淘汰都依赖同一条规则：先序列化再测量，拿不准时向上取整。
//! 无法序列化的值视为无限大，这样它永远不会被写入。

use serde::Serialize;

/// 估算任意可序列化值的存储大小（字节）
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
    match serde_json::to_string(value) {
        Ok(serialized) => estimate_str_size(&serialized),
        Err(e) => {
            tracing::debug!("无法序列化用于大小估算，按上限处理: {}", e);
            usize::MAX
        }
    }
}

/// 估算字符串的存储大小（UTF-8 字节数）
pub fn estimate_str_size(value: &str) -> usize {
    value.len()
}

/// 以 MiB 为单位显示字节数
pub fn format_mib(bytes: usize) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
