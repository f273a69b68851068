use std::ops::Range;

use crate::error::CompileError;
use crate::template::BlockKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal output, including the contents of `{{{…}}` escapes.
    Text(String),
    /// `{{name.identifier key=value}}`. Escaped tags never produce a
    /// reference; they are scanned as `Text`, so no escape flag is carried.
    Reference(String),
    /// `{{#…}}`, `{{^…}}` or `{{*…}}`
    BlockStart { kind: BlockKind, raw: String },
    /// `{{/…}}`
    BlockEnd(String),
    /// `{{!…}}`, produced for completeness and dropped by the compiler.
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// Single forward pass over template source, yielding tokens lazily.
///
/// After the first error the scanner yields nothing further.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    /// Literal text collected but not yet emitted.
    pending: String,
    pending_start: usize,
    failed: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            pos: 0,
            pending: String::new(),
            pending_start: 0,
            failed: false,
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.pending.is_empty() {
            self.pending_start = self.pos;
        }
        self.pending.push_str(text);
    }

    fn take_text(&mut self) -> Option<Token> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Token {
            kind: TokenKind::Text(std::mem::take(&mut self.pending)),
            span: self.pending_start..self.pos,
        })
    }

    /// `{{{content}}`: the content joins the pending text run, which is
    /// then emitted. Text after the escape starts a new run.
    fn scan_escape(&mut self) -> Result<Option<Token>, CompileError> {
        let source = self.source;
        let start = self.pos;
        let content_start = start + 3;
        let Some(len) = source[content_start..].find("}}") else {
            return Err(CompileError::syntax(
                "unterminated escape: `{{{` has no matching `}}`",
                start..source.len(),
            ));
        };
        self.push_text(&source[content_start..content_start + len]);
        self.pos = content_start + len + 2;
        Ok(self.take_text())
    }

    fn scan_tag(&mut self) -> Result<Token, CompileError> {
        let source = self.source;
        let start = self.pos;
        let body_start = start + 2;
        let Some(len) = source[body_start..].find("}}") else {
            return Err(CompileError::syntax(
                "unclosed `{{`: expected `}}` before end of template",
                start..source.len(),
            ));
        };
        let body = &source[body_start..body_start + len];
        self.pos = body_start + len + 2;

        let kind = match body.chars().next() {
            Some('!') => TokenKind::Comment(body[1..].to_string()),
            Some('#') => block_start(BlockKind::Conditional, &body[1..]),
            Some('^') => block_start(BlockKind::NegatedConditional, &body[1..]),
            Some('*') => block_start(BlockKind::Collection, &body[1..]),
            Some('/') => TokenKind::BlockEnd(body[1..].trim().to_string()),
            _ => TokenKind::Reference(body.trim().to_string()),
        };
        Ok(Token {
            kind,
            span: start..self.pos,
        })
    }
}

fn block_start(kind: BlockKind, raw: &str) -> TokenKind {
    TokenKind::BlockStart {
        kind,
        raw: raw.trim().to_string(),
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let source = self.source;
        loop {
            let rest = &source[self.pos..];
            if rest.is_empty() {
                return self.take_text().map(Ok);
            }

            match rest.find("{{") {
                None => {
                    self.push_text(rest);
                    self.pos = source.len();
                }
                Some(0) if rest.starts_with("{{{") => match self.scan_escape() {
                    Ok(Some(token)) => return Some(Ok(token)),
                    Ok(None) => {}
                    Err(err) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                },
                Some(0) => {
                    if let Some(text) = self.take_text() {
                        return Some(Ok(text));
                    }
                    let result = self.scan_tag();
                    self.failed = result.is_err();
                    return Some(result);
                }
                Some(offset) => {
                    self.push_text(&rest[..offset]);
                    self.pos += offset;
                }
            }
        }
    }
}

/// Scan the whole source eagerly.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    Scanner::new(source).collect()
}
