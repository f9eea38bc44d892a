//! 消息协议
//! 控制器与遮罩/设置页之间的四种消息，以及以会话为作用域的双向通道端点

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::detector::SessionId;
use crate::error::{AcResult, AutoCloseError};
use crate::rule::RuleRecord;

/// 消息类型标签（线上格式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    OpenSettings,
    GetDefaults,
    CloseNow,
    Cancel,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::OpenSettings => "open-settings",
            MessageKind::GetDefaults => "get-defaults",
            MessageKind::CloseNow => "close-now",
            MessageKind::Cancel => "cancel",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = AutoCloseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open-settings" => Ok(MessageKind::OpenSettings),
            "get-defaults" => Ok(MessageKind::GetDefaults),
            "close-now" => Ok(MessageKind::CloseNow),
            "cancel" => Ok(MessageKind::Cancel),
            other => Err(AutoCloseError::InvalidInput(format!("未知的消息类型：{}", other))),
        }
    }
}

/// 入站消息
#[derive(Debug)]
pub enum Message {
    /// 打开设置页
    OpenSettings,
    /// 请求内置默认规则
    GetDefaults { reply: oneshot::Sender<Vec<RuleRecord>> },
    /// 倒计时结束，立即关闭
    CloseNow,
    /// 用户取消
    Cancel,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::OpenSettings => MessageKind::OpenSettings,
            Message::GetDefaults { .. } => MessageKind::GetDefaults,
            Message::CloseNow => MessageKind::CloseNow,
            Message::Cancel => MessageKind::Cancel,
        }
    }
}

/// 带来源的消息，来源为空表示来自设置页等非会话上下文
#[derive(Debug)]
pub struct Envelope {
    pub session: Option<SessionId>,
    pub message: Message,
}

/// 会话侧的消息端口（会话 -> 控制器）
#[derive(Debug, Clone)]
pub struct OverlayPort {
    session: SessionId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl OverlayPort {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn send(&self, message: Message) -> AcResult<()> {
        let kind = message.kind();
        self.tx
            .send(Envelope {
                session: Some(self.session),
                message,
            })
            .map_err(|_| AutoCloseError::ChannelClosed(format!("{} 发送失败，控制器已退出", kind)))
    }
}

/// 设置页侧的控制句柄
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ControlHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    fn send(&self, message: Message) -> AcResult<()> {
        let kind = message.kind();
        self.tx
            .send(Envelope { session: None, message })
            .map_err(|_| AutoCloseError::ChannelClosed(format!("{} 发送失败，控制器已退出", kind)))
    }

    /// 请求内置默认规则（请求/响应）
    pub async fn get_defaults(&self) -> AcResult<Vec<RuleRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::GetDefaults { reply })?;
        rx.await
            .map_err(|_| AutoCloseError::ChannelClosed("get-defaults 未收到回复".to_string()))
    }

    pub fn open_settings(&self) -> AcResult<()> {
        self.send(Message::OpenSettings)
    }
}
