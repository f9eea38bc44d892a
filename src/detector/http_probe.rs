//! HTTP 内容探测器
//! 重新请求会话的 URL，提取可见文本后执行匹配。
//! 只能近似页面的实时内容，适合命令行检查和无浏览器宿主的场景。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::probe::{ContentProbe, ProbeRequest};
use super::session::Session;
use crate::config::GlobalConfig;
use crate::error::{AcResult, AutoCloseError};
use crate::extractor::TextExtractor;

#[derive(Debug, Clone)]
pub struct HttpContentProbe {
    client: Client,
}

impl HttpContentProbe {
    pub fn new(config: &GlobalConfig) -> AcResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout))
            .build()?;
        Ok(Self { client })
    }

    /// 拉取页面并提取可见文本
    pub async fn fetch_text(&self, raw_url: &str) -> AcResult<String> {
        let url = Url::parse(raw_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AutoCloseError::ProbeUnavailable(format!("不支持的协议：{}", url.scheme())));
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(TextExtractor::visible_text(&body))
    }
}

#[async_trait]
impl ContentProbe for HttpContentProbe {
    async fn probe(&self, session: &Session, request: &ProbeRequest) -> Option<bool> {
        let text = match self.fetch_text(&session.url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session = %session.id, url = %session.url, "页面内容拉取失败：{}", e);
                return None;
            }
        };
        debug!(session = %session.id, chars = text.len(), "页面内容拉取成功");

        request.test(&text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{GlobMode, PatternCompiler};

    #[tokio::test]
    async fn test_non_http_sessions_are_unavailable() {
        let probe = HttpContentProbe::new(&GlobalConfig::default()).unwrap();
        let request = PatternCompiler::compile("x", GlobMode::TextHas).unwrap().to_probe_request();

        let session = Session::complete(1, "chrome://settings", "Settings");
        assert_eq!(probe.probe(&session, &request).await, None);

        let session = Session::complete(2, "not a url", "Broken");
        assert_eq!(probe.probe(&session, &request).await, None);
    }
}
