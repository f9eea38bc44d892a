//! rsautoclose - 规则驱动的浏览器会话自动关闭引擎

// 导出全局错误类型
pub use self::error::{AcResult, AutoCloseError};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, GlobalConfig, DEFAULT_WAIT};

// 导出规则模块核心接口
pub use self::rule::{
    bootstrap, default_rules, ConfigStore, FileConfigStore, MemoryConfigStore, RuleCache,
    RuleRecord, RuleSet, StoreFormat,
};

// 导出提取模块核心接口
pub use self::extractor::TextExtractor;

// 导出工具模块核心接口
pub use self::utils::{WaitSpec, WaitUnit};

// 导出编译模块核心接口
pub use self::compiler::{
    CompileStats, CompiledPattern, CompiledRule, GlobMode, PatternCompiler, RuleCompiler,
};

// 导出检测模块核心接口
pub use self::detector::{
    ContentProbe, HttpContentProbe, NoContentProbe, PageTextProbe, ProbeRequest, Session,
    SessionId, SessionMatcher, SessionStatus,
};

// 导出控制模块核心接口
pub use self::controller::{
    ClosureController, ClosureState, ControlHandle, Envelope, Message, MessageKind,
    OverlayEvent, OverlayPhase, OverlayPort, OverlayTheme, OverlayView, SessionHost,
    SimulatedHost,
};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod rule;
pub mod extractor;
pub mod utils;
pub mod compiler;
pub mod detector;
pub mod controller;
