//! 检测模块：会话模型、内容探测与规则匹配
pub mod session;
pub mod probe;
pub mod http_probe;
pub mod matcher;

// 导出核心接口
pub use self::session::{Session, SessionId, SessionStatus};
pub use self::probe::{ContentProbe, NoContentProbe, PageTextProbe, ProbeRequest};
pub use self::http_probe::HttpContentProbe;
pub use self::matcher::SessionMatcher;
