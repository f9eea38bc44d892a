//! 关闭控制器
//! 会话加载完成 -> 规则匹配 -> 开始倒计时并注入遮罩 -> 遮罩回发 close-now / cancel
//! -> 关闭或取消。遮罩消息可能丢失（页面跳转、崩溃），因此每次倒计时都带一个
//! `wait + 宽限时间` 的兜底计时器，到期仍在倒计时则强制关闭。

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::host::SessionHost;
use super::message::{ControlHandle, Envelope, Message, OverlayPort};
use super::state::{ClosureState, ClosureTable};
use crate::compiler::CompiledRule;
use crate::config::GlobalConfig;
use crate::detector::{ContentProbe, Session, SessionId, SessionMatcher};
use crate::rule::{default_rules, ConfigStore, RuleCache, RuleSet};
use crate::utils::WaitSpec;

/// 关闭控制器
pub struct ClosureController {
    config: GlobalConfig,
    rules: watch::Receiver<RuleSet>,
    cache: Mutex<RuleCache>,
    matcher: SessionMatcher,
    host: Arc<dyn SessionHost>,
    table: ClosureTable,
    /// 正在处理事件的会话，值为处理期间到达的最新一条事件
    queued: Mutex<HashMap<SessionId, Option<Session>>>,
    inbox: mpsc::UnboundedSender<Envelope>,
    this: Weak<ClosureController>,
}

impl ClosureController {
    /// 创建控制器，返回控制器和入站消息接收端（交给 `run`）
    pub fn new(
        config: GlobalConfig,
        store: &dyn ConfigStore,
        probe: Arc<dyn ContentProbe>,
        host: Arc<dyn SessionHost>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let controller = Arc::new_cyclic(|this| Self {
            config,
            rules: store.subscribe(),
            cache: Mutex::new(RuleCache::new()),
            matcher: SessionMatcher::new(probe),
            host,
            table: ClosureTable::new(),
            queued: Mutex::new(HashMap::new()),
            inbox,
            this: this.clone(),
        });
        (controller, inbox_rx)
    }

    /// 为会话创建消息端口（注入遮罩时交给宿主）
    pub fn port(&self, id: SessionId) -> OverlayPort {
        OverlayPort::new(id, self.inbox.clone())
    }

    /// 设置页使用的控制句柄
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle::new(self.inbox.clone())
    }

    /// 当前规则快照的编译结果
    pub async fn compiled_rules(&self) -> Arc<Vec<CompiledRule>> {
        let rules = self.rules.borrow().clone();
        self.cache.lock().await.get_or_compile(&rules)
    }

    /// 累计编译次数
    pub async fn compile_count(&self) -> usize {
        self.cache.lock().await.compile_count()
    }

    pub async fn state(&self, id: SessionId) -> ClosureState {
        self.table.state(id).await
    }

    /// 会话状态更新；仅加载完成时参与匹配，命中则开始倒计时
    pub async fn on_session_updated(&self, session: &Session) -> bool {
        if !session.is_complete() {
            return false;
        }

        let rules = self.compiled_rules().await;
        let Some(rule) = self.matcher.should_close(&rules, session).await else {
            return false;
        };

        let wait = rule.wait.as_deref().unwrap_or(&self.config.default_wait);
        self.start_closing(session, wait).await
    }

    /// 派发会话事件：同一会话的事件串行处理，不同会话互不阻塞。
    /// 处理期间到达的事件只保留最新一条，当前事件处理完后接着处理。
    pub async fn dispatch(self: &Arc<Self>, session: Session) {
        let id = session.id;
        {
            let mut queued = self.queued.lock().await;
            if let Some(slot) = queued.get_mut(&id) {
                debug!(session = %id, "会话事件处理中，排队等待");
                *slot = Some(session);
                return;
            }
            queued.insert(id, None);
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut next = Some(session);
            while let Some(session) = next.take() {
                controller.on_session_updated(&session).await;

                let mut queued = controller.queued.lock().await;
                next = queued.get_mut(&id).and_then(Option::take);
                if next.is_none() {
                    queued.remove(&id);
                }
            }
        });
    }

    /// 开始倒计时并注入遮罩，返回是否成功进入倒计时
    pub async fn start_closing(&self, session: &Session, wait: &str) -> bool {
        let id = session.id;
        let wait = WaitSpec::resolve(Some(wait), &self.config.default_wait);
        let deadline = wait.saturating_add(self.config.fallback_grace);
        let this = self.this.clone();

        let epoch = self
            .table
            .begin(id, wait, |epoch| {
                tokio::spawn(async move {
                    sleep(deadline).await;
                    if let Some(controller) = this.upgrade() {
                        controller.fallback_close(id, epoch).await;
                    }
                })
            })
            .await;

        info!(session = %id, title = %session.title, url = %session.url, ?wait, "开始倒计时关闭");

        if let Err(e) = self.host.inject_overlay(session, wait, self.port(id)).await {
            // 没有可见的倒计时就不关闭，兜底任务随后会因代次不匹配而放弃
            warn!(session = %id, "遮罩注入失败，放弃本次倒计时：{}", e);
            self.table.finish_epoch(id, epoch).await;
            return false;
        }
        true
    }

    /// 关闭会话；不在倒计时（已取消、已关闭、重复请求）时为空操作
    pub async fn actual_close(&self, id: SessionId) -> bool {
        if !self.table.finish(id).await {
            debug!(session = %id, "会话不在倒计时，忽略关闭请求");
            return false;
        }
        self.remove(id).await;
        true
    }

    /// 取消倒计时；不在倒计时时为空操作
    pub async fn cancel_close(&self, id: SessionId) -> bool {
        if !self.table.finish(id).await {
            debug!(session = %id, "会话不在倒计时，忽略取消请求");
            return false;
        }
        info!(session = %id, "用户取消了自动关闭");
        true
    }

    /// 会话已被关闭，丢弃其倒计时
    pub async fn on_session_removed(&self, id: SessionId) {
        if self.table.finish(id).await {
            debug!(session = %id, "会话已不存在，倒计时作废");
        }
    }

    /// 兜底关闭：仅作用于创建它的那次倒计时
    async fn fallback_close(&self, id: SessionId, epoch: u64) {
        if !self.table.finish_epoch(id, epoch).await {
            return;
        }
        warn!(session = %id, epoch, "未收到遮罩消息，兜底强制关闭");
        self.remove(id).await;
    }

    async fn remove(&self, id: SessionId) {
        info!(session = %id, "关闭会话");
        if let Err(e) = self.host.remove_session(id).await {
            warn!(session = %id, "关闭会话失败（可能已被关闭）：{}", e);
        }
    }

    /// 处理入站消息
    pub async fn handle_message(&self, envelope: Envelope) {
        let Envelope { session, message } = envelope;
        debug!(session = ?session, kind = %message.kind(), "收到消息");

        match message {
            Message::CloseNow => match session {
                Some(id) => {
                    self.actual_close(id).await;
                }
                None => warn!("close-now 消息缺少来源会话，已忽略"),
            },
            Message::Cancel => match session {
                Some(id) => {
                    self.cancel_close(id).await;
                }
                None => warn!("cancel 消息缺少来源会话，已忽略"),
            },
            Message::OpenSettings => {
                if let Err(e) = self.host.open_settings().await {
                    warn!("打开设置页失败：{}", e);
                }
            }
            Message::GetDefaults { reply } => {
                if reply.send(default_rules()).is_err() {
                    debug!("get-defaults 请求方已离开");
                }
            }
        }
    }

    /// 事件循环：会话事件经 `dispatch` 按会话串行处理，入站消息按序处理。
    /// 会话事件源关闭后退出。
    pub async fn run(
        self: Arc<Self>,
        mut sessions: mpsc::Receiver<Session>,
        mut inbox: mpsc::UnboundedReceiver<Envelope>,
    ) {
        loop {
            tokio::select! {
                event = sessions.recv() => match event {
                    Some(session) => self.dispatch(session).await,
                    None => break,
                },
                Some(envelope) = inbox.recv() => self.handle_message(envelope).await,
            }
        }
        debug!("会话事件源已关闭，控制器退出");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::config::ConfigManager;
    use crate::controller::{OverlayEvent, SimulatedHost};
    use crate::detector::{PageTextProbe, ProbeRequest, SessionStatus};
    use crate::error::{AcResult, AutoCloseError};
    use crate::rule::{MemoryConfigStore, RuleRecord};

    /// 只记录调用、不运行遮罩的宿主
    #[derive(Default)]
    struct RecordingHost {
        injected: StdMutex<Vec<(SessionId, Duration)>>,
        removed: StdMutex<Vec<SessionId>>,
        fail_inject: bool,
        fail_remove: bool,
    }

    impl RecordingHost {
        fn removed(&self) -> Vec<SessionId> {
            self.removed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionHost for RecordingHost {
        async fn inject_overlay(&self, session: &Session, wait: Duration, _port: OverlayPort) -> AcResult<()> {
            if self.fail_inject {
                return Err(AutoCloseError::InjectionFailed("permission denied".to_string()));
            }
            self.injected.lock().unwrap().push((session.id, wait));
            Ok(())
        }

        async fn remove_session(&self, id: SessionId) -> AcResult<()> {
            self.removed.lock().unwrap().push(id);
            if self.fail_remove {
                return Err(AutoCloseError::RemovalFailed("no such tab".to_string()));
            }
            Ok(())
        }

        async fn open_settings(&self) -> AcResult<()> {
            Ok(())
        }
    }

    /// 每次探测都挂起，直到测试放行；进入时通知测试
    struct GatedProbe {
        calls: AtomicUsize,
        entered: mpsc::UnboundedSender<SessionId>,
        release: Semaphore,
    }

    impl GatedProbe {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionId>) {
            let (entered, rx) = mpsc::unbounded_channel();
            let probe = Arc::new(Self {
                calls: AtomicUsize::new(0),
                entered,
                release: Semaphore::new(0),
            });
            (probe, rx)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentProbe for GatedProbe {
        async fn probe(&self, session: &Session, _request: &ProbeRequest) -> Option<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.entered.send(session.id);
            self.release.acquire().await.ok()?.forget();
            Some(true)
        }
    }

    fn config() -> GlobalConfig {
        ConfigManager::custom().fallback_grace(Duration::from_secs(5)).build()
    }

    fn setup(host: Arc<RecordingHost>) -> (Arc<ClosureController>, MemoryConfigStore) {
        let store = MemoryConfigStore::with_rules(default_rules());
        let (controller, _inbox) =
            ClosureController::new(config(), &store, Arc::new(PageTextProbe::new()), host);
        (controller, store)
    }

    fn zoom_session(id: u64) -> Session {
        Session::complete(id, "https://zoom.us/j/1", "Launch Meeting - Zoom")
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(1);

        assert!(controller.start_closing(&session, "30s").await);
        assert_eq!(
            host.injected.lock().unwrap().as_slice(),
            &[(session.id, Duration::from_secs(30))]
        );
        assert!(matches!(controller.state(session.id).await, ClosureState::CountingDown { .. }));

        assert!(controller.actual_close(session.id).await);
        assert!(!controller.actual_close(session.id).await);
        assert!(!controller.cancel_close(session.id).await);

        assert_eq!(host.removed(), vec![session.id]);
        assert_eq!(controller.state(session.id).await, ClosureState::None);
    }

    #[tokio::test]
    async fn test_cancel_prevents_close() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(2);

        controller.start_closing(&session, "30s").await;
        assert!(controller.cancel_close(session.id).await);
        assert!(!controller.cancel_close(session.id).await);
        assert!(!controller.actual_close(session.id).await);
        assert!(host.removed().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_wait_uses_default() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());

        controller.start_closing(&zoom_session(3), "later").await;
        assert_eq!(
            controller.state(SessionId(3)).await,
            ClosureState::CountingDown { wait: Duration::from_secs(10), epoch: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_forces_exactly_one_close() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(4);

        controller.start_closing(&session, "1s").await;

        // wait + grace 之前保持倒计时
        sleep(Duration::from_secs(5)).await;
        assert!(matches!(controller.state(session.id).await, ClosureState::CountingDown { .. }));
        assert!(host.removed().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(controller.state(session.id).await, ClosureState::None);
        assert_eq!(host.removed(), vec![session.id]);

        // 迟到的 close-now 不会再次关闭
        controller
            .handle_message(Envelope {
                session: Some(session.id),
                message: Message::CloseNow,
            })
            .await;
        sleep(Duration::from_secs(60)).await;
        assert_eq!(host.removed(), vec![session.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_countdown_overwrites_previous() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(5);

        controller.start_closing(&session, "1s").await;
        controller.start_closing(&session, "20s").await;

        // 第一次倒计时的兜底（6s）已被取消
        sleep(Duration::from_secs(10)).await;
        assert!(host.removed().is_empty());
        assert!(matches!(
            controller.state(session.id).await,
            ClosureState::CountingDown { wait, .. } if wait == Duration::from_secs(20)
        ));

        sleep(Duration::from_secs(20)).await;
        assert_eq!(host.removed(), vec![session.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injection_failure_abandons_countdown() {
        let host = Arc::new(RecordingHost {
            fail_inject: true,
            ..Default::default()
        });
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(6);

        assert!(!controller.start_closing(&session, "1s").await);
        assert_eq!(controller.state(session.id).await, ClosureState::None);

        sleep(Duration::from_secs(30)).await;
        assert!(host.removed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_wait_saturates_instead_of_overflowing() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(11);

        assert!(controller.start_closing(&session, "18446744073709551615s").await);
        assert!(matches!(
            controller.state(session.id).await,
            ClosureState::CountingDown { wait, .. } if wait == Duration::from_secs(u64::MAX)
        ));

        sleep(Duration::from_secs(3600)).await;
        assert!(host.removed().is_empty());
        assert!(controller.actual_close(session.id).await);
        assert_eq!(host.removed(), vec![session.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_match_after_session_closed_is_discarded() {
        let (probe, mut entered) = GatedProbe::new();
        let host = Arc::new(SimulatedHost::default());
        let store = MemoryConfigStore::with_rules(default_rules());
        let (controller, _inbox) = ClosureController::new(config(), &store, probe.clone(), host.clone());
        let session = zoom_session(10);

        let pending = tokio::spawn({
            let controller = Arc::clone(&controller);
            let session = session.clone();
            async move { controller.on_session_updated(&session).await }
        });
        assert_eq!(entered.recv().await, Some(session.id));

        // 内容检查挂起期间用户手动关闭了会话
        host.close_externally(session.id).await;
        controller.on_session_removed(session.id).await;

        probe.release.add_permits(1);
        assert!(!pending.await.unwrap());

        sleep(Duration::from_secs(120)).await;
        assert!(host.removed().await.is_empty());
        assert_eq!(controller.state(session.id).await, ClosureState::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_one_session_are_serialized() {
        let (probe, mut entered) = GatedProbe::new();
        let host = Arc::new(RecordingHost::default());
        let store = MemoryConfigStore::with_rules(default_rules());
        let (controller, _inbox) = ClosureController::new(config(), &store, probe.clone(), host.clone());

        controller.dispatch(zoom_session(12)).await;
        assert_eq!(entered.recv().await, Some(SessionId(12)));

        // 处理中到达的事件排队，只保留最新一条
        controller.dispatch(zoom_session(12)).await;
        controller.dispatch(zoom_session(12)).await;

        // 其他会话不受影响
        controller.dispatch(zoom_session(13)).await;
        assert_eq!(entered.recv().await, Some(SessionId(13)));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(probe.calls(), 2);

        probe.release.add_permits(2);
        assert_eq!(entered.recv().await, Some(SessionId(12)));
        probe.release.add_permits(1);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(probe.calls(), 3);
        let injected = host.injected.lock().unwrap().clone();
        assert_eq!(injected.iter().filter(|(id, _)| *id == SessionId(12)).count(), 2);
        assert_eq!(injected.iter().filter(|(id, _)| *id == SessionId(13)).count(), 1);
        assert!(controller.queued.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_removal_failure_is_swallowed() {
        let host = Arc::new(RecordingHost {
            fail_remove: true,
            ..Default::default()
        });
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(7);

        controller.start_closing(&session, "30s").await;
        assert!(controller.actual_close(session.id).await);
        assert_eq!(controller.state(session.id).await, ClosureState::None);
    }

    #[tokio::test]
    async fn test_session_removed_drops_countdown() {
        let host = Arc::new(RecordingHost::default());
        let (controller, _store) = setup(host.clone());
        let session = zoom_session(8);

        controller.start_closing(&session, "30s").await;
        controller.on_session_removed(session.id).await;
        assert_eq!(controller.state(session.id).await, ClosureState::None);
        assert!(!controller.actual_close(session.id).await);
        assert!(host.removed().is_empty());
    }

    #[tokio::test]
    async fn test_rule_snapshot_is_compiled_once_per_reference() {
        let host = Arc::new(RecordingHost::default());
        let (controller, store) = setup(host.clone());

        let loading = Session {
            status: SessionStatus::Loading,
            ..zoom_session(9)
        };
        assert!(!controller.on_session_updated(&loading).await);
        assert_eq!(controller.compile_count().await, 0);

        let first = controller.compiled_rules().await;
        let second = controller.compiled_rules().await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(controller.compile_count().await, 1);

        // 内容相同的新列表同样触发一次重新编译
        store.set(default_rules()).await.unwrap();
        controller.compiled_rules().await;
        controller.compiled_rules().await;
        assert_eq!(controller.compile_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_with_simulated_overlay() {
        let store = MemoryConfigStore::with_rules(vec![
            RuleRecord {
                url: Some("https://{*.|}zoom.us/".to_string()),
                contents: Some("Your meeting has been launched".to_string()),
                wait: Some("30s".to_string()),
                ..Default::default()
            },
            RuleRecord {
                url: Some("https://done.example/".to_string()),
                ..Default::default()
            },
        ]);
        let probe = Arc::new(PageTextProbe::new());
        let host = Arc::new(SimulatedHost::default());
        let (controller, inbox) = ClosureController::new(config(), &store, probe.clone(), host.clone());
        let control = controller.control_handle();

        let (sessions, sessions_rx) = mpsc::channel(16);
        let runner = tokio::spawn(Arc::clone(&controller).run(sessions_rx, inbox));

        // 倒计时结束后由遮罩发起关闭
        let zoom = Session::complete(1, "https://us02web.zoom.us/j/42", "Zoom");
        probe.set_html(zoom.id, "<p>Your meeting has been launched</p>").await;
        sessions
            .send(Session { status: SessionStatus::Loading, ..zoom.clone() })
            .await
            .unwrap();
        sessions.send(zoom.clone()).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert!(matches!(controller.state(zoom.id).await, ClosureState::CountingDown { .. }));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(host.removed().await, vec![zoom.id]);
        assert_eq!(controller.state(zoom.id).await, ClosureState::None);

        // 用户取消，之后点击设置入口
        let done = Session::complete(2, "https://done.example/thanks", "Thanks");
        sessions.send(done.clone()).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert!(host.send_event(done.id, OverlayEvent::ClickOverlay).await);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.state(done.id).await, ClosureState::None);
        assert!(host.send_event(done.id, OverlayEvent::ClickSettings).await);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(host.removed().await, vec![zoom.id]);
        assert_eq!(host.settings_opened(), 1);

        // 设置页请求默认规则
        assert_eq!(control.get_defaults().await.unwrap(), default_rules());

        drop(sessions);
        runner.await.unwrap();
    }
}
