//! 通配模式编译器
//! 将 glob 风格的模式串按三种固定模式翻译为锚定正则
//!
//! 翻译分两步：先由 `tokenize` 切分为记号流，再由无状态的 `translate_token`
//! 逐个翻译记号，花括号深度作为参数显式传入、作为返回值传出。

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use super::pattern::CompiledPattern;
use crate::error::{AcResult, AutoCloseError};

/// 匹配模式（集合固定且封闭）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GlobMode {
    /// URL 前缀：仅锚定开头，区分大小写，`*` 不跨越 `/`，`**` 任意
    PathStart,
    /// 标题全匹配：首尾锚定，忽略大小写，空格串匹配任意空白
    TextAll,
    /// 内容包含：单词边界包裹的子串，忽略大小写，空格串匹配任意空白
    TextHas,
}

/// 模式的翻译参数
#[derive(Debug, Clone, Copy)]
struct ModeSpec {
    prefix: &'static str,
    suffix: &'static str,
    case_insensitive: bool,
    double_star: bool,
    flexible_spaces: bool,
}

impl GlobMode {
    pub const ALL: [GlobMode; 3] = [GlobMode::PathStart, GlobMode::TextAll, GlobMode::TextHas];

    fn spec(self) -> ModeSpec {
        match self {
            GlobMode::PathStart => ModeSpec {
                prefix: "^",
                suffix: "",
                case_insensitive: false,
                double_star: true,
                flexible_spaces: false,
            },
            GlobMode::TextAll => ModeSpec {
                prefix: "^",
                suffix: "$",
                case_insensitive: true,
                double_star: false,
                flexible_spaces: true,
            },
            GlobMode::TextHas => ModeSpec {
                prefix: r"\b",
                suffix: r"\b",
                case_insensitive: true,
                double_star: false,
                flexible_spaces: true,
            },
        }
    }

    /// 模式名称
    pub fn name(self) -> &'static str {
        match self {
            GlobMode::PathStart => "pathStart",
            GlobMode::TextAll => "textAll",
            GlobMode::TextHas => "textHas",
        }
    }

    /// 正则标志位（s=点号匹配换行，i=忽略大小写）
    pub fn flags(self) -> &'static str {
        if self.spec().case_insensitive { "si" } else { "s" }
    }
}

impl fmt::Display for GlobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GlobMode {
    type Err = AutoCloseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pathStart" | "path_start" | "path-start" => Ok(GlobMode::PathStart),
            "textAll" | "text_all" | "text-all" => Ok(GlobMode::TextAll),
            "textHas" | "text_has" | "text-has" => Ok(GlobMode::TextHas),
            other => Err(AutoCloseError::InvalidMode(other.to_string())),
        }
    }
}

/// 模式串记号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobToken<'a> {
    /// 连续的 `*`，记录个数
    Stars(usize),
    /// 连续的空格
    Spaces(&'a str),
    /// `\*` `\{` `\|` `\}` `\\`
    Escaped(char),
    /// 无法组成转义的单个反斜杠
    Backslash,
    /// 正则元字符
    Meta(char),
    /// 普通字符串
    Literal(&'a str),
}

fn is_meta(c: char) -> bool {
    matches!(c, '.' | '?' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '{' | '}' | '|')
}

fn is_escapable(c: char) -> bool {
    matches!(c, '*' | '{' | '|' | '}' | '\\')
}

/// 将模式串切分为记号流（从左到右，取最长的星号串和空格串）
fn tokenize(pattern: &str) -> Vec<GlobToken<'_>> {
    let mut tokens = Vec::new();
    let mut chars = pattern.char_indices().peekable();
    let mut literal_start: Option<usize> = None;

    while let Some((i, c)) = chars.next() {
        let token = match c {
            '*' => {
                let mut count = 1;
                while chars.next_if(|&(_, next)| next == '*').is_some() {
                    count += 1;
                }
                Some(GlobToken::Stars(count))
            }
            ' ' => {
                let mut end = i + 1;
                while let Some((j, _)) = chars.next_if(|&(_, next)| next == ' ') {
                    end = j + 1;
                }
                Some(GlobToken::Spaces(&pattern[i..end]))
            }
            '\\' => match chars.next_if(|&(_, next)| is_escapable(next)) {
                Some((_, escaped)) => Some(GlobToken::Escaped(escaped)),
                None => Some(GlobToken::Backslash),
            },
            c if is_meta(c) => Some(GlobToken::Meta(c)),
            _ => None,
        };

        match token {
            Some(token) => {
                if let Some(start) = literal_start.take() {
                    tokens.push(GlobToken::Literal(&pattern[start..i]));
                }
                tokens.push(token);
            }
            None => {
                literal_start.get_or_insert(i);
            }
        }
    }

    if let Some(start) = literal_start {
        tokens.push(GlobToken::Literal(&pattern[start..]));
    }
    tokens
}

fn escape_char(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0u8; 4]))
}

/// 翻译单个记号，返回正则片段和新的花括号深度
fn translate_token<'a>(token: GlobToken<'a>, depth: usize, spec: ModeSpec) -> (Cow<'a, str>, usize) {
    match token {
        GlobToken::Stars(1) if spec.double_star => (Cow::Borrowed("[^/]*"), depth),
        GlobToken::Stars(_) => (Cow::Borrowed(".*"), depth),
        GlobToken::Spaces(_) if spec.flexible_spaces => (Cow::Borrowed(r"\s+"), depth),
        GlobToken::Spaces(run) => (Cow::Borrowed(run), depth),
        GlobToken::Escaped(c) => (Cow::Owned(escape_char(c)), depth),
        GlobToken::Backslash => (Cow::Borrowed(r"\\"), depth),
        GlobToken::Meta('{') => (Cow::Borrowed("(?:"), depth + 1),
        GlobToken::Meta('}') if depth > 0 => (Cow::Borrowed(")"), depth - 1),
        GlobToken::Meta('|') if depth > 0 => (Cow::Borrowed("|"), depth),
        GlobToken::Meta(c) => (Cow::Owned(escape_char(c)), depth),
        GlobToken::Literal(text) => (Cow::Owned(regex::escape(text)), depth),
    }
}

/// 翻译整条记号流，并补齐未闭合的分组
fn translate(tokens: &[GlobToken<'_>], spec: ModeSpec) -> String {
    let mut source = String::from(spec.prefix);
    let mut depth = 0;
    for &token in tokens {
        let (piece, next_depth) = translate_token(token, depth, spec);
        source.push_str(&piece);
        depth = next_depth;
    }
    source.push_str(&")".repeat(depth));
    source.push_str(spec.suffix);
    source
}

/// 模式编译器
pub struct PatternCompiler;

impl PatternCompiler {
    /// 生成模式对应的正则源码（不含标志位）
    pub fn translate(pattern: &str, mode: GlobMode) -> String {
        translate(&tokenize(pattern), mode.spec())
    }

    /// 编译模式串
    pub fn compile(pattern: &str, mode: GlobMode) -> AcResult<CompiledPattern> {
        let spec = mode.spec();
        let source = translate(&tokenize(pattern), spec);
        let regex = RegexBuilder::new(&source)
            .dot_matches_new_line(true)
            .case_insensitive(spec.case_insensitive)
            .build()?;
        Ok(CompiledPattern::new(pattern, mode, regex))
    }

    /// 按模式名称编译，名称未知时返回 `InvalidMode`
    pub fn compile_named(pattern: &str, mode: &str) -> AcResult<CompiledPattern> {
        Self::compile(pattern, mode.parse()?)
    }
}
