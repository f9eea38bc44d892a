//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum AutoCloseError {
    // 模式编译相关错误
    #[error("未知的通配模式：{0}")]
    InvalidMode(String),
    #[error("正则编译失败：{0}")]
    RegexCompileError(#[from] RegexError),

    // 规则存储相关错误
    #[error("规则存储失败：{0}")]
    ConfigStoreError(String),
    #[error("MessagePack序列化/反序列化失败：{0}")]
    MsgPackError(String),

    // 会话相关错误
    #[error("内容探测不可用：{0}")]
    ProbeUnavailable(String),
    #[error("遮罩注入失败：{0}")]
    InjectionFailed(String),
    #[error("关闭会话失败：{0}")]
    RemovalFailed(String),
    #[error("消息通道已关闭：{0}")]
    ChannelClosed(String),

    // 网络相关错误
    #[error("网络请求失败：{0}")]
    HttpError(#[from] reqwest::Error),

    // 序列化/反序列化错误
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("URL解析失败：{0}")]
    UrlError(#[from] UrlParseError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
}

// 全局Result类型
pub type AcResult<T> = Result<T, AutoCloseError>;
