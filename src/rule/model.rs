//! 规则数据模型定义
//! 仅存储规则数据，无任何业务逻辑，支持序列化/反序列化

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::WaitSpec;

/// 有序规则列表，按引用（`Arc` 指针）识别是否变化
pub type RuleSet = Arc<Vec<RuleRecord>>;

/// 单条关闭规则（与设置页的表格行一一对应）
///
/// 字段缺失或为空串表示不检查该信号。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// URL 前缀模式（pathStart）
    #[serde(default, alias = "urlPattern", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 标题模式（textAll）
    #[serde(default, alias = "titlePattern", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 页面内容模式（textHas）
    #[serde(default, alias = "contentPattern", skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    /// 等待时间（如 `30s`、`500ms`）
    #[serde(default, alias = "waitSpec", skip_serializing_if = "Option::is_none")]
    pub wait: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl RuleRecord {
    pub fn url_pattern(&self) -> Option<&str> {
        present(&self.url)
    }

    pub fn title_pattern(&self) -> Option<&str> {
        present(&self.title)
    }

    pub fn content_pattern(&self) -> Option<&str> {
        present(&self.contents)
    }

    pub fn wait_spec(&self) -> Option<&str> {
        present(&self.wait)
    }

    /// 三个模式字段都为空
    pub fn is_blank(&self) -> bool {
        self.url_pattern().is_none() && self.title_pattern().is_none() && self.content_pattern().is_none()
    }

    /// 规范化：空串视为缺失，等待时间按 wait-spec 语法整理
    pub fn normalized(&self) -> Self {
        let keep = |field: Option<&str>| field.map(str::to_string);
        Self {
            url: keep(self.url_pattern()),
            title: keep(self.title_pattern()),
            contents: keep(self.content_pattern()),
            wait: self.wait_spec().and_then(WaitSpec::normalize),
        }
    }
}

impl fmt::Display for RuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |field: Option<&str>| field.unwrap_or("-").to_string();
        write!(
            f,
            "url={} title={} contents={} wait={}",
            show(self.url_pattern()),
            show(self.title_pattern()),
            show(self.content_pattern()),
            show(self.wait_spec())
        )
    }
}

/// 内置默认规则：Zoom 的“启动会议”中转页
pub fn default_rules() -> Vec<RuleRecord> {
    vec![RuleRecord {
        url: Some("https://{*.|}zoom.us/".to_string()),
        title: Some("Launch Meeting * Zoom".to_string()),
        contents: Some("Your meeting has been launched".to_string()),
        wait: Some("30s".to_string()),
    }]
}
