//! # 工具模块
//!
//! - `data_url` - 数据URL创建、解析以及图片类型识别

pub mod data_url;

pub use data_url::{create_data_url, detect_image_media_type, parse_data_url, DEFAULT_IMAGE_MEDIA_TYPE};
