//! 宿主平台接口
//! 控制器通过它向会话注入遮罩、关闭会话、打开设置页；
//! 具体的注入机制由宿主（浏览器扩展等）实现。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::message::OverlayPort;
use super::overlay::{OverlayEvent, OverlayTheme, OverlayView};
use crate::detector::{Session, SessionId};
use crate::error::{AcResult, AutoCloseError};

/// 宿主平台能力
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// 在会话上下文中注入倒计时遮罩，遮罩通过 `port` 回发消息
    async fn inject_overlay(&self, session: &Session, wait: Duration, port: OverlayPort) -> AcResult<()>;

    /// 关闭会话；会话已不存在时返回 `RemovalFailed`
    async fn remove_session(&self, id: SessionId) -> AcResult<()>;

    /// 打开设置页
    async fn open_settings(&self) -> AcResult<()>;
}

/// 进程内模拟宿主
///
/// 注入时在本地任务中运行遮罩视图，页面事件通过 `send_event` 投递。
/// 用于命令行演示和端到端测试。
#[derive(Debug, Default)]
pub struct SimulatedHost {
    theme: OverlayTheme,
    overlays: Mutex<HashMap<SessionId, mpsc::UnboundedSender<OverlayEvent>>>,
    removed: Mutex<Vec<SessionId>>,
    gone: Mutex<HashSet<SessionId>>,
    settings_opened: AtomicUsize,
}

impl SimulatedHost {
    pub fn new(theme: OverlayTheme) -> Self {
        Self {
            theme,
            ..Default::default()
        }
    }

    /// 向会话的遮罩投递页面事件，遮罩不存在时返回 false
    pub async fn send_event(&self, id: SessionId, event: OverlayEvent) -> bool {
        match self.overlays.lock().await.get(&id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// 模拟用户手动关闭会话
    pub async fn close_externally(&self, id: SessionId) {
        self.overlays.lock().await.remove(&id);
        self.gone.lock().await.insert(id);
    }

    /// 已被宿主关闭的会话（按关闭顺序）
    pub async fn removed(&self) -> Vec<SessionId> {
        self.removed.lock().await.clone()
    }

    pub fn settings_opened(&self) -> usize {
        self.settings_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHost for SimulatedHost {
    async fn inject_overlay(&self, session: &Session, wait: Duration, port: OverlayPort) -> AcResult<()> {
        if self.gone.lock().await.contains(&session.id) {
            return Err(AutoCloseError::InjectionFailed(format!("会话 {} 已不存在", session.id)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let view = OverlayView::new(wait, port, self.theme.clone());
        debug!(session = %session.id, ?wait, view = %view.render(Duration::ZERO), "遮罩已注入");
        tokio::spawn(view.run(rx));
        // 替换旧遮罩，旧遮罩的事件源随之关闭
        self.overlays.lock().await.insert(session.id, tx);
        Ok(())
    }

    async fn remove_session(&self, id: SessionId) -> AcResult<()> {
        if !self.gone.lock().await.insert(id) {
            return Err(AutoCloseError::RemovalFailed(format!("会话 {} 已不存在", id)));
        }
        self.overlays.lock().await.remove(&id);
        self.removed.lock().await.push(id);
        info!(session = %id, "会话已关闭");
        Ok(())
    }

    async fn open_settings(&self) -> AcResult<()> {
        self.settings_opened.fetch_add(1, Ordering::SeqCst);
        info!("打开设置页");
        Ok(())
    }
}
