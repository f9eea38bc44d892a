//! 编译后模式模型
//! 正则编译后的结构

use regex::Regex;

use super::glob::GlobMode;
use crate::detector::ProbeRequest;

/// 编译后的通配模式
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    glob: String,
    mode: GlobMode,
    regex: Regex,
}

impl CompiledPattern {
    pub(crate) fn new(glob: &str, mode: GlobMode, regex: Regex) -> Self {
        Self {
            glob: glob.to_string(),
            mode,
            regex,
        }
    }

    /// 简单匹配判断
    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    /// 原始通配串
    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn mode(&self) -> GlobMode {
        self.mode
    }

    /// 正则源码（不含标志位）
    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn flags(&self) -> &'static str {
        self.mode.flags()
    }

    /// 序列化为内容探测请求（在会话自身的上下文中重建正则）
    pub fn to_probe_request(&self) -> ProbeRequest {
        ProbeRequest {
            source: self.source().to_string(),
            flags: self.flags().to_string(),
        }
    }
}

/// 编译后的单条规则
///
/// 缺失的匹配器视为该信号恒满足。
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 在规则列表中的位置
    pub index: usize,
    pub url: Option<CompiledPattern>,
    pub title: Option<CompiledPattern>,
    pub content: Option<CompiledPattern>,
    pub wait: Option<String>,
}

impl CompiledRule {
    /// 是否不含任何模式（会匹配所有会话）
    pub fn is_catch_all(&self) -> bool {
        self.url.is_none() && self.title.is_none() && self.content.is_none()
    }
}
