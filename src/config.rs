//! 全局配置管理,存储所有可配置项

use std::path::PathBuf;
use std::time::Duration;

use crate::controller::OverlayTheme;

/// 规则未指定等待时间时使用的默认值
pub const DEFAULT_WAIT: &str = "10s";

/// 全局配置
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // 规则存储路径（.json 或 .mp）
    pub store_path: PathBuf,
    // 默认等待时间（wait-spec 字符串）
    pub default_wait: String,
    // 兜底关闭的宽限时间：倒计时结束后再等这么久仍未收到消息则强制关闭
    pub fallback_grace: Duration,
    // HTTP内容探测超时（单位：秒）
    pub probe_timeout: u64,
    // 遮罩外观
    pub overlay_theme: OverlayTheme,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("autoclose_rules.json"),
            default_wait: DEFAULT_WAIT.to_string(),
            fallback_grace: Duration::from_secs(5),
            probe_timeout: 30,
            overlay_theme: OverlayTheme::default(),
            verbose: false,
        }
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_path(mut self, path: PathBuf) -> Self {
        self.config.store_path = path;
        self
    }

    pub fn default_wait(mut self, wait: impl Into<String>) -> Self {
        self.config.default_wait = wait.into();
        self
    }

    pub fn fallback_grace(mut self, grace: Duration) -> Self {
        self.config.fallback_grace = grace;
        self
    }

    pub fn probe_timeout(mut self, timeout: u64) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn overlay_theme(mut self, theme: OverlayTheme) -> Self {
        self.config.overlay_theme = theme;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
