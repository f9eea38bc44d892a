//! 关闭状态表
//! 每个会话只有 None / CountingDown 两种状态，表中不存在即为 None。
//! 所有状态转换都在同一把锁内完成检查和修改，过期或重复的请求自然成为空操作。

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::detector::SessionId;

/// 会话的关闭状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureState {
    None,
    CountingDown {
        wait: Duration,
        /// 倒计时代次，每次开始倒计时递增
        epoch: u64,
    },
}

#[derive(Debug)]
struct Countdown {
    wait: Duration,
    epoch: u64,
    fallback: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<SessionId, Countdown>,
    next_epoch: u64,
}

/// 关闭状态表
#[derive(Debug, Default)]
pub struct ClosureTable {
    inner: Mutex<Table>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// None -> CountingDown；已在倒计时则覆盖（旧的兜底计时器被取消）
    ///
    /// `spawn_fallback` 在锁内以新代次调用，返回兜底任务句柄。
    pub async fn begin<F>(&self, id: SessionId, wait: Duration, spawn_fallback: F) -> u64
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let mut table = self.inner.lock().await;
        table.next_epoch += 1;
        let epoch = table.next_epoch;

        let countdown = Countdown {
            wait,
            epoch,
            fallback: spawn_fallback(epoch),
        };
        if let Some(previous) = table.entries.insert(id, countdown) {
            debug!(session = %id, previous = previous.epoch, epoch, "覆盖进行中的倒计时");
            previous.fallback.abort();
        }
        epoch
    }

    /// CountingDown -> None，并取消兜底计时器；不在倒计时则返回 false
    pub async fn finish(&self, id: SessionId) -> bool {
        match self.inner.lock().await.entries.remove(&id) {
            Some(countdown) => {
                countdown.fallback.abort();
                true
            }
            None => false,
        }
    }

    /// 仅当仍是指定代次的倒计时才结束（不取消兜底任务，调用方可能就是它）
    pub async fn finish_epoch(&self, id: SessionId, epoch: u64) -> bool {
        let mut table = self.inner.lock().await;
        if table.entries.get(&id).map(|c| c.epoch) != Some(epoch) {
            return false;
        }
        table.entries.remove(&id);
        true
    }

    pub async fn state(&self, id: SessionId) -> ClosureState {
        match self.inner.lock().await.entries.get(&id) {
            Some(countdown) => ClosureState::CountingDown {
                wait: countdown.wait,
                epoch: countdown.epoch,
            },
            None => ClosureState::None,
        }
    }

    /// 正在倒计时的会话数
    pub async fn active(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
