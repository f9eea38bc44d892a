//! 规则模块：负责规则的数据模型、编译缓存与持久化存储
pub mod model;
pub mod cache;
pub mod store;

// 导出核心接口
pub use self::model::{default_rules, RuleRecord, RuleSet};
pub use self::cache::RuleCache;
pub use self::store::{bootstrap, ConfigStore, FileConfigStore, MemoryConfigStore, StoreFormat};
