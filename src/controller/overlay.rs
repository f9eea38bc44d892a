//! 倒计时遮罩
//! 注入到会话页面中的遮罩视图：全屏半透明遮罩 + 顶部进度条，进度条在 `wait`
//! 时间内从满宽收缩到零。动画结束发送 close-now；点击遮罩或按 Escape 发送
//! cancel 并只保留设置入口；点击设置入口发送 open-settings。
//!
//! 遮罩由页面自身的计时器驱动，与控制器的兜底计时器相互独立。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::message::{Message, OverlayPort};
use crate::error::AcResult;

/// 遮罩外观
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayTheme {
    /// 倒计时期间显示的文字
    pub closing_label: String,
    /// 取消后保留的设置入口文字
    pub settings_label: String,
    /// 进度条满宽时的字符数
    pub bar_width: usize,
}

impl Default for OverlayTheme {
    fn default() -> Self {
        Self {
            closing_label: "🙅 Closing".to_string(),
            settings_label: "Auto Close Settings".to_string(),
            bar_width: 24,
        }
    }
}

/// 遮罩阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    /// 倒计时中
    Counting,
    /// 用户已取消，只剩设置入口
    Dismissed,
    /// 倒计时结束，已请求关闭
    Finished,
}

/// 页面事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    ClickOverlay,
    KeyDown(String),
    ClickSettings,
    TransitionEnd,
}

/// 遮罩视图
#[derive(Debug)]
pub struct OverlayView {
    wait: Duration,
    phase: OverlayPhase,
    port: OverlayPort,
    theme: OverlayTheme,
}

impl OverlayView {
    pub fn new(wait: Duration, port: OverlayPort, theme: OverlayTheme) -> Self {
        Self {
            wait,
            phase: OverlayPhase::Counting,
            port,
            theme,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn theme(&self) -> &OverlayTheme {
        &self.theme
    }

    /// 进度条剩余宽度（1.0 为满宽）
    pub fn progress(&self, elapsed: Duration) -> f64 {
        match self.phase {
            OverlayPhase::Counting if !self.wait.is_zero() => {
                (1.0 - elapsed.as_secs_f64() / self.wait.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// 按当前阶段渲染遮罩（文本形式）
    pub fn render(&self, elapsed: Duration) -> String {
        match self.phase {
            OverlayPhase::Counting => {
                let width = self.theme.bar_width;
                let filled = ((self.progress(elapsed) * width as f64).round() as usize).min(width);
                format!(
                    "{} [{}{}]",
                    self.theme.closing_label,
                    "█".repeat(filled),
                    " ".repeat(width - filled)
                )
            }
            OverlayPhase::Dismissed => format!("⚙ {}", self.theme.settings_label),
            OverlayPhase::Finished => String::new(),
        }
    }

    /// 处理页面事件
    pub fn handle(&mut self, event: &OverlayEvent) -> AcResult<()> {
        match (self.phase, event) {
            (OverlayPhase::Counting, OverlayEvent::TransitionEnd) => {
                self.phase = OverlayPhase::Finished;
                self.port.send(Message::CloseNow)
            }
            (OverlayPhase::Counting, OverlayEvent::ClickOverlay) => self.dismiss(),
            (OverlayPhase::Counting, OverlayEvent::KeyDown(key)) if key == "Escape" => self.dismiss(),
            (_, OverlayEvent::ClickSettings) => self.port.send(Message::OpenSettings),
            _ => Ok(()),
        }
    }

    fn dismiss(&mut self) -> AcResult<()> {
        self.phase = OverlayPhase::Dismissed;
        self.port.send(Message::Cancel)
    }

    /// 以页面计时器驱动遮罩，直到倒计时结束或事件源关闭
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<OverlayEvent>) -> OverlayPhase {
        let session = self.port.session();
        let started = Instant::now();
        let animation = sleep(self.wait);
        tokio::pin!(animation);

        loop {
            let event = tokio::select! {
                _ = &mut animation, if self.phase == OverlayPhase::Counting => OverlayEvent::TransitionEnd,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(e) = self.handle(&event) {
                warn!(session = %session, "遮罩消息发送失败：{}", e);
            }
            debug!(session = %session, ?event, view = %self.render(started.elapsed()), "遮罩事件");
            if self.phase == OverlayPhase::Finished {
                break;
            }
        }
        self.phase
    }
}
