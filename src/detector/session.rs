//! 会话（浏览器标签页）模型

use std::fmt;

use serde::{Deserialize, Serialize};

/// 会话ID，会话存活期间保持不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Complete,
}

/// 会话快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub url: String,
    pub title: String,
    pub status: SessionStatus,
}

impl Session {
    /// 创建已加载完成的会话
    pub fn complete(id: u64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: SessionId(id),
            url: url.into(),
            title: title.into(),
            status: SessionStatus::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }
}
