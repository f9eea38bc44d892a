//! 规则存储
//! 负责规则列表的持久化（JSON / MessagePack）、首次运行的默认规则初始化，
//! 以及规则变化通知（tokio watch 通道，每次变化发布新的 `Arc` 快照）

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use super::model::{default_rules, RuleRecord, RuleSet};
use crate::error::{AcResult, AutoCloseError};

/// 规则存储接口
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 读取规则列表，从未写入过时返回 None
    async fn get(&self) -> AcResult<Option<Vec<RuleRecord>>>;

    /// 写入规则列表并通知订阅者
    async fn set(&self, rules: Vec<RuleRecord>) -> AcResult<()>;

    /// 订阅规则变化
    fn subscribe(&self) -> watch::Receiver<RuleSet>;
}

/// 内容变化时才发布新快照，避免无谓的重新编译
fn publish_if_changed(tx: &watch::Sender<RuleSet>, rules: &[RuleRecord]) -> bool {
    tx.send_if_modified(|current| {
        if current.as_slice() == rules {
            false
        } else {
            *current = Arc::new(rules.to_vec());
            true
        }
    })
}

/// 首次运行初始化：存储为空或无法读取时写入内置默认规则，返回当前规则快照
pub async fn bootstrap(store: &dyn ConfigStore) -> AcResult<RuleSet> {
    let existing = match store.get().await {
        Ok(rules) => rules,
        Err(e) => {
            warn!("读取已保存的规则失败，将写入默认规则：{}", e);
            None
        }
    };

    match existing {
        Some(rules) if !rules.is_empty() => {
            debug!(rules = rules.len(), "已加载保存的规则");
        }
        _ => {
            info!("规则存储为空，写入内置默认规则");
            store.set(default_rules()).await?;
        }
    }

    let snapshot = store.subscribe().borrow().clone();
    Ok(snapshot)
}

/// 内存规则存储
#[derive(Debug)]
pub struct MemoryConfigStore {
    stored: RwLock<Option<Vec<RuleRecord>>>,
    tx: watch::Sender<RuleSet>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            stored: RwLock::new(None),
            tx,
        }
    }

    /// 预置规则
    pub fn with_rules(rules: Vec<RuleRecord>) -> Self {
        let (tx, _) = watch::channel(Arc::new(rules.clone()));
        Self {
            stored: RwLock::new(Some(rules)),
            tx,
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> AcResult<Option<Vec<RuleRecord>>> {
        Ok(self.stored.read().await.clone())
    }

    async fn set(&self, rules: Vec<RuleRecord>) -> AcResult<()> {
        let snapshot = Arc::new(rules.clone());
        *self.stored.write().await = Some(rules);
        self.tx.send_replace(snapshot);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<RuleSet> {
        self.tx.subscribe()
    }
}

/// 存储文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Json,
    MsgPack,
}

impl StoreFormat {
    /// 按扩展名推断：`.mp` / `.msgpack` 为 MessagePack，其余为 JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mp") | Some("msgpack") => StoreFormat::MsgPack,
            _ => StoreFormat::Json,
        }
    }
}

/// 文件规则存储
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    format: StoreFormat,
    tx: watch::Sender<RuleSet>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = StoreFormat::from_path(&path);
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self { path, format, tx }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, action: &str, e: std::io::Error) -> AutoCloseError {
        AutoCloseError::ConfigStoreError(format!("{} {} 失败：{}", action, self.path.display(), e))
    }

    fn decode(&self, data: &[u8]) -> AcResult<Vec<RuleRecord>> {
        match self.format {
            StoreFormat::Json => Ok(serde_json::from_slice(data)?),
            StoreFormat::MsgPack => rmp_serde::from_slice(data)
                .map_err(|e| AutoCloseError::MsgPackError(format!("反序列化失败：{}", e))),
        }
    }

    fn encode(&self, rules: &[RuleRecord]) -> AcResult<Vec<u8>> {
        match self.format {
            StoreFormat::Json => Ok(serde_json::to_vec_pretty(rules)?),
            // 按字段名编码，缺失字段才能被正确省略
            StoreFormat::MsgPack => rmp_serde::to_vec_named(rules)
                .map_err(|e| AutoCloseError::MsgPackError(format!("序列化失败：{}", e))),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self) -> AcResult<Option<Vec<RuleRecord>>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error("读取", e)),
        };

        let rules = self.decode(&data)?;
        debug!(path = %self.path.display(), rules = rules.len(), "规则文件读取成功");

        // 文件可能被外部修改，内容不同则通知订阅者
        publish_if_changed(&self.tx, &rules);
        Ok(Some(rules))
    }

    async fn set(&self, rules: Vec<RuleRecord>) -> AcResult<()> {
        let data = self.encode(&rules)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.store_error("创建目录", e))?;
        }
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| self.store_error("写入", e))?;
        debug!(path = %self.path.display(), rules = rules.len(), "规则已写入文件");

        self.tx.send_replace(Arc::new(rules));
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<RuleSet> {
        self.tx.subscribe()
    }
}
