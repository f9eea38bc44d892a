//! 编译模块：将通配模式和规则记录编译为可执行的匹配器
pub mod glob;
pub mod pattern;
pub mod compiler;

pub use self::glob::{GlobMode, PatternCompiler};
pub use self::pattern::{CompiledPattern, CompiledRule};
pub use self::compiler::{CompileStats, RuleCompiler};
