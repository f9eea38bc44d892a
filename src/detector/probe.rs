//! 内容探测
//! 在会话自身的上下文中，用序列化后的内容匹配器检查页面可见文本。
//! 探测不会向调用方报错：会话不可访问时返回 None（不确定），按未匹配处理。

use std::collections::HashMap;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::session::{Session, SessionId};
use crate::error::{AcResult, AutoCloseError};
use crate::extractor::TextExtractor;

/// 序列化后的内容匹配器：正则源码 + 标志位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub source: String,
    pub flags: String,
}

impl ProbeRequest {
    /// 在目标上下文中重建正则
    pub fn to_regex(&self) -> AcResult<Regex> {
        let mut builder = RegexBuilder::new(&self.source);
        for flag in self.flags.chars() {
            match flag {
                's' => builder.dot_matches_new_line(true),
                'i' => builder.case_insensitive(true),
                other => {
                    return Err(AutoCloseError::InvalidInput(format!("不支持的正则标志：{}", other)));
                }
            };
        }
        Ok(builder.build()?)
    }

    /// 用本请求检查一段文本
    pub fn test(&self, text: &str) -> AcResult<bool> {
        Ok(self.to_regex()?.is_match(text))
    }
}

/// 内容探测接口
#[async_trait]
pub trait ContentProbe: Send + Sync {
    /// `Some(bool)` 为确定结果，`None` 表示会话不可访问
    async fn probe(&self, session: &Session, request: &ProbeRequest) -> Option<bool>;
}

/// 页面文本登记表探测器
///
/// 适用于宿主已持有页面内容的场景：宿主登记每个会话的HTML或纯文本，
/// 探测时在登记的文本上执行匹配。未登记的会话视为不可访问。
#[derive(Debug, Default)]
pub struct PageTextProbe {
    pages: RwLock<HashMap<SessionId, String>>,
}

impl PageTextProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记页面HTML（提取可见文本后保存）
    pub async fn set_html(&self, id: SessionId, html: &str) {
        self.set_text(id, TextExtractor::visible_text(html)).await;
    }

    /// 登记纯文本
    pub async fn set_text(&self, id: SessionId, text: impl Into<String>) {
        self.pages.write().await.insert(id, text.into());
    }

    /// 会话关闭后移除
    pub async fn remove(&self, id: SessionId) {
        self.pages.write().await.remove(&id);
    }
}

#[async_trait]
impl ContentProbe for PageTextProbe {
    async fn probe(&self, session: &Session, request: &ProbeRequest) -> Option<bool> {
        let pages = self.pages.read().await;
        let Some(text) = pages.get(&session.id) else {
            debug!(session = %session.id, "会话未登记页面内容，探测结果不确定");
            return None;
        };
        match request.test(text) {
            Ok(matched) => Some(matched),
            Err(e) => {
                debug!(session = %session.id, "探测请求无法执行：{}", e);
                None
            }
        }
    }
}

/// 不执行任何探测，所有内容检查都视为不确定
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContentProbe;

#[async_trait]
impl ContentProbe for NoContentProbe {
    async fn probe(&self, _session: &Session, _request: &ProbeRequest) -> Option<bool> {
        None
    }
}
