//! 可见文本提取器
//! 基于 html5ever 分词器，近似浏览器的 innerText：
//! 跳过 head/script/style 等不可见内容，块级元素之间插入分隔，空白折叠为单个空格

use std::cell::{Cell, RefCell};

use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts
};
use tendril::StrTendril;

/// 内容不可见的标签
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "title"];

/// 会在文本中产生换行的块级标签
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

#[derive(Debug, Default)]
pub struct TextExtractor {
    text: RefCell<String>,
    hidden_depth: Cell<usize>,
    in_head: Cell<bool>,
}

impl TokenSink for TextExtractor {
    type Handle = ();

    fn process_token(&self, token: Token, _line: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(Tag { kind, name, self_closing, .. }) => {
                return self.handle_tag(kind, name.as_ref(), self_closing);
            }
            Token::CharacterTokens(chars) => {
                if self.hidden_depth.get() == 0 && !self.in_head.get() {
                    self.text.borrow_mut().push_str(&chars);
                }
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

impl TextExtractor {
    /// 提取HTML中的可见文本
    pub fn visible_text(html: &str) -> String {
        let tokenizer = Tokenizer::new(TextExtractor::default(), TokenizerOpts::default());
        let queue = BufferQueue::default();
        queue.push_back(StrTendril::from(html));

        let _ = tokenizer.feed(&queue);
        tokenizer.end();

        tokenizer.sink.finish()
    }

    fn handle_tag(&self, kind: TagKind, name: &str, self_closing: bool) -> TokenSinkResult<()> {
        match (kind, name) {
            (TagKind::StartTag, "head") => self.in_head.set(true),
            (TagKind::EndTag, "head") | (TagKind::StartTag, "body") => self.in_head.set(false),
            (TagKind::StartTag, tag) if HIDDEN_TAGS.contains(&tag) && !self_closing => {
                self.hidden_depth.set(self.hidden_depth.get() + 1);
                // 让分词器按原始文本处理脚本和样式内容
                return match tag {
                    "script" => TokenSinkResult::RawData(RawKind::ScriptData),
                    "style" | "noscript" => TokenSinkResult::RawData(RawKind::Rawtext),
                    "title" => TokenSinkResult::RawData(RawKind::Rcdata),
                    _ => TokenSinkResult::Continue,
                };
            }
            (TagKind::EndTag, tag) if HIDDEN_TAGS.contains(&tag) => {
                self.hidden_depth.set(self.hidden_depth.get().saturating_sub(1));
            }
            (_, tag) if BLOCK_TAGS.contains(&tag) => self.text.borrow_mut().push('\n'),
            _ => {}
        }
        TokenSinkResult::Continue
    }

    fn finish(&self) -> String {
        self.text
            .borrow()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
