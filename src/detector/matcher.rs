//! 会话匹配器
//! 按顺序评估编译后的规则，返回第一条所有信号都满足的规则。
//! URL 和标题是同步检查；内容检查需要异步探测，只在前两者都满足时才发起。

use std::sync::Arc;

use tracing::{debug, trace};

use super::probe::ContentProbe;
use super::session::Session;
use crate::compiler::{CompiledPattern, CompiledRule};

/// 会话匹配器
#[derive(Clone)]
pub struct SessionMatcher {
    probe: Arc<dyn ContentProbe>,
}

impl SessionMatcher {
    pub fn new(probe: Arc<dyn ContentProbe>) -> Self {
        Self { probe }
    }

    /// 判断会话是否应被关闭，返回命中的规则
    pub async fn should_close(&self, rules: &[CompiledRule], session: &Session) -> Option<CompiledRule> {
        for rule in rules {
            if !Self::signal_matches(rule.url.as_ref(), &session.url) {
                trace!(session = %session.id, rule = rule.index, "URL 不匹配");
                continue;
            }
            if !Self::signal_matches(rule.title.as_ref(), &session.title) {
                trace!(session = %session.id, rule = rule.index, "标题不匹配");
                continue;
            }
            if let Some(content) = &rule.content {
                let request = content.to_probe_request();
                // 挂起点：结果可能在会话状态变化后才返回
                if self.probe.probe(session, &request).await != Some(true) {
                    trace!(session = %session.id, rule = rule.index, "内容不匹配或无法探测");
                    continue;
                }
            }

            debug!(session = %session.id, rule = rule.index, url = %session.url, "会话命中规则");
            return Some(rule.clone());
        }
        None
    }

    /// 缺失的匹配器视为满足
    fn signal_matches(pattern: Option<&CompiledPattern>, input: &str) -> bool {
        pattern.is_none_or(|p| p.is_match(input))
    }
}
