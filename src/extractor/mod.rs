//! 提取模块：从页面HTML中提取可见文本
pub mod text_extractor;

pub use self::text_extractor::TextExtractor;
