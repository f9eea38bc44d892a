//! 规则编译缓存
//! 单槽缓存：记住最近一次输入的规则列表引用及其编译结果，
//! 按引用（而非内容）判断是否需要重新编译

use std::sync::Arc;

use tracing::debug;

use super::model::RuleSet;
use crate::compiler::{CompiledRule, RuleCompiler};

/// 规则缓存管理器
#[derive(Debug, Default)]
pub struct RuleCache {
    last: Option<(RuleSet, Arc<Vec<CompiledRule>>)>,
    compile_count: usize,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取编译结果；规则列表引用变化时重新编译并替换缓存
    pub fn get_or_compile(&mut self, rules: &RuleSet) -> Arc<Vec<CompiledRule>> {
        if let Some((last_rules, compiled)) = &self.last {
            if Arc::ptr_eq(last_rules, rules) {
                return Arc::clone(compiled);
            }
        }

        debug!(rules = rules.len(), "规则列表已变化，重新编译");
        let compiled = Arc::new(RuleCompiler::compile(rules));
        self.compile_count += 1;
        self.last = Some((Arc::clone(rules), Arc::clone(&compiled)));
        compiled
    }

    /// 累计编译次数
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// 清除缓存
    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::{default_rules, RuleRecord};

    #[test]
    fn test_same_reference_is_not_recompiled() {
        let mut cache = RuleCache::new();
        let rules: RuleSet = Arc::new(default_rules());

        let first = cache.get_or_compile(&rules);
        let second = cache.get_or_compile(&rules);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn test_equal_but_distinct_reference_recompiles_once() {
        let mut cache = RuleCache::new();
        let rules: RuleSet = Arc::new(default_rules());
        let twin: RuleSet = Arc::new(default_rules());
        assert_eq!(rules, twin);

        let first = cache.get_or_compile(&rules);
        let second = cache.get_or_compile(&twin);
        let third = cache.get_or_compile(&twin);

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn test_replacement_evicts_previous_entry() {
        let mut cache = RuleCache::new();
        let a: RuleSet = Arc::new(vec![RuleRecord::default()]);
        let b: RuleSet = Arc::new(Vec::new());

        cache.get_or_compile(&a);
        cache.get_or_compile(&b);
        cache.get_or_compile(&a);
        assert_eq!(cache.compile_count(), 3);

        cache.clear();
        cache.get_or_compile(&a);
        assert_eq!(cache.compile_count(), 4);
    }
}
