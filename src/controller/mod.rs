//! 控制模块：关闭状态机、消息协议、倒计时遮罩与宿主接口
pub mod state;
pub mod message;
pub mod overlay;
pub mod host;
pub mod controller;

// 导出核心接口
pub use self::state::{ClosureState, ClosureTable};
pub use self::message::{ControlHandle, Envelope, Message, MessageKind, OverlayPort};
pub use self::overlay::{OverlayEvent, OverlayPhase, OverlayTheme, OverlayView};
pub use self::host::{SessionHost, SimulatedHost};
pub use self::controller::ClosureController;
