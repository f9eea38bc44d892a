//! 规则编译器核心
//! 仅负责将原始规则记录编译为可执行的匹配器

use std::time::Instant;

use tracing::{debug, warn};

use super::glob::{GlobMode, PatternCompiler};
use super::pattern::{CompiledPattern, CompiledRule};
use crate::error::AcResult;
use crate::rule::RuleRecord;

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则列表（保持原有顺序）
    ///
    /// 某条规则的模式无法编译时整条规则被丢弃，不会因缺少匹配器而放宽匹配范围。
    pub fn compile(rules: &[RuleRecord]) -> Vec<CompiledRule> {
        let start = Instant::now();
        let mut stats = CompileStats::default();
        let mut compiled = Vec::with_capacity(rules.len());

        for (index, rule) in rules.iter().enumerate() {
            match Self::compile_rule(index, rule, &mut stats) {
                Ok(compiled_rule) => {
                    if compiled_rule.is_catch_all() {
                        warn!(index, "规则未设置任何模式，将匹配所有会话");
                    }
                    compiled.push(compiled_rule);
                }
                Err(e) => {
                    warn!(index, "规则编译失败，已跳过：{}", e);
                    stats.skipped += 1;
                }
            }
        }

        debug!(
            "✅ 规则编译完成，总耗时{:?}，规则{}条（跳过{}条）",
            start.elapsed(),
            compiled.len(),
            stats.skipped
        );
        debug!(
            "📊 编译统计：URL模式{}条、标题模式{}条、内容模式{}条",
            stats.url_count, stats.title_count, stats.content_count
        );

        compiled
    }

    /// 编译单条规则
    pub fn compile_rule(index: usize, rule: &RuleRecord, stats: &mut CompileStats) -> AcResult<CompiledRule> {
        let url = Self::compile_field(rule.url_pattern(), GlobMode::PathStart, &mut stats.url_count)?;
        let title = Self::compile_field(rule.title_pattern(), GlobMode::TextAll, &mut stats.title_count)?;
        let content = Self::compile_field(rule.content_pattern(), GlobMode::TextHas, &mut stats.content_count)?;

        Ok(CompiledRule {
            index,
            url,
            title,
            content,
            wait: rule.wait_spec().map(str::to_string),
        })
    }

    fn compile_field(
        pattern: Option<&str>,
        mode: GlobMode,
        counter: &mut usize,
    ) -> AcResult<Option<CompiledPattern>> {
        let Some(pattern) = pattern else {
            return Ok(None);
        };
        let compiled = PatternCompiler::compile(pattern, mode)?;
        *counter += 1;
        Ok(Some(compiled))
    }
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    pub url_count: usize,
    pub title_count: usize,
    pub content_count: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(url: &str, title: &str, contents: &str, wait: &str) -> RuleRecord {
        let field = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RuleRecord {
            url: field(url),
            title: field(title),
            contents: field(contents),
            wait: field(wait),
        }
    }

    #[test]
    fn test_fields_map_to_modes() {
        let compiled = RuleCompiler::compile(&[rule("https://a.com/", "Done *", "bye", "5s")]);
        assert_eq!(compiled.len(), 1);

        let first = &compiled[0];
        assert_eq!(first.url.as_ref().unwrap().mode(), GlobMode::PathStart);
        assert_eq!(first.title.as_ref().unwrap().mode(), GlobMode::TextAll);
        assert_eq!(first.content.as_ref().unwrap().mode(), GlobMode::TextHas);
        assert_eq!(first.wait.as_deref(), Some("5s"));
    }

    #[test]
    fn test_absent_fields_have_no_matcher_and_order_is_kept() {
        let compiled = RuleCompiler::compile(&[
            rule("", "Only title", "", ""),
            rule("", "", "", ""),
        ]);

        assert_eq!(compiled[0].index, 0);
        assert!(compiled[0].url.is_none());
        assert!(compiled[0].content.is_none());
        assert!(compiled[0].wait.is_none());
        // 空规则保留，匹配所有会话
        assert_eq!(compiled[1].index, 1);
        assert!(compiled[1].is_catch_all());
    }

    #[test]
    fn test_stats_count_patterns() {
        let mut stats = CompileStats::default();
        RuleCompiler::compile_rule(0, &rule("https://a/", "", "x", ""), &mut stats).unwrap();
        RuleCompiler::compile_rule(1, &rule("https://b/", "t", "", ""), &mut stats).unwrap();
        assert_eq!(stats.url_count, 2);
        assert_eq!(stats.title_count, 1);
        assert_eq!(stats.content_count, 1);
    }
}
