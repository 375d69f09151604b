//! # Tokenizer
//!
//! Lexes one piece of score text into a flat list of [`CodeToken`]s.
//!
//! ## Token classes
//! - **word**: a run of ASCII alphanumerics or non-ASCII alphabetic characters
//! - **symbol**: any other visible character; `[[` and `]]` are lexed as single
//!   ligature symbols
//! - **string literal**: `"..."` with `\\ \" \r \n \t \xHH \uHHHH` escapes
//! - **comment**: `// ...` to end of line, or `/* ... */`
//! - **eol** / **eof**
//!
//! The scanner tries each token class in a fixed priority order at every
//! position. Characters no class accepts (whitespace, control characters) are
//! skipped one at a time, so the scan always terminates. Problems such as an
//! unterminated string are reported as issues and never stop the scan.
//!
//! Ranges are character indices into the scanned text. For every token except
//! string literals (whose `content` is the unescaped value) the text under the
//! range is exactly `content`.
//!
//! ## Example
//! ```rust
//! use nmn::tokenizer::{tokenize, TokenKind, TokenizeOptions};
//!
//! let out = tokenize("N: 1 2 \"la\"", &TokenizeOptions::default());
//! let kinds: Vec<_> = out.result.iter().map(|t| t.kind).collect();
//! assert_eq!(kinds, vec![
//!     TokenKind::Word, TokenKind::Symbol, TokenKind::Word,
//!     TokenKind::Word, TokenKind::StringLiteral, TokenKind::Eof,
//! ]);
//! assert_eq!(out.result[4].content, "la");
//! ```

use crate::issue::{Issues, NO_ARGS};
use serde::Serialize;

/// Half-open character range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn empty_at(at: usize) -> Self {
        Span { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both.
    pub fn join(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn contains(&self, at: usize) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
    Word,
    Symbol,
    StringLiteral,
    Comment,
    Eol,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeToken {
    pub kind: TokenKind,
    pub content: String,
    pub range: Span,
    /// First token on its physical line.
    pub line_head: bool,
}

impl CodeToken {
    pub fn is_symbol(&self, s: &str) -> bool {
        self.kind == TokenKind::Symbol && self.content == s
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Synthetic end-of-input token at `at`.
    pub fn eof(at: usize) -> Self {
        CodeToken {
            kind: TokenKind::Eof,
            content: String::new(),
            range: Span::empty_at(at),
            line_head: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenizeOptions {
    /// Line number reported on issues.
    pub line_number: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenized {
    pub result: Vec<CodeToken>,
    pub issues: Issues,
}

/// Multi-character symbols, matched before single characters.
const LIGATURES: &[&str] = &["[[", "]]"];

/// Tokenize `code`. The result always ends with an eof token.
pub fn tokenize(code: &str, options: &TokenizeOptions) -> Tokenized {
    let mut scanner = Scanner::new(code, options.line_number);
    let result = scanner.run();
    Tokenized {
        result,
        issues: scanner.issues,
    }
}

pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphabetic())
}

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && !is_word_char(c) && c != '"'
}

struct Scanner {
    chars: Vec<char>,
    position: usize,
    line_number: usize,
    line_head: bool,
    issues: Issues,
}

impl Scanner {
    fn new(code: &str, line_number: usize) -> Self {
        Self {
            chars: code.chars().collect(),
            position: 0,
            line_number,
            line_head: true,
            issues: Issues::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn make(&mut self, kind: TokenKind, content: String, start: usize) -> CodeToken {
        let token = CodeToken {
            kind,
            content,
            range: Span::new(start, self.position),
            line_head: self.line_head,
        };
        self.line_head = kind == TokenKind::Eol;
        token
    }

    fn run(&mut self) -> Vec<CodeToken> {
        let mut tokens = Vec::new();
        loop {
            let token = self
                .scan_eof()
                .or_else(|| self.scan_eol())
                .or_else(|| self.scan_comment())
                .or_else(|| self.scan_string())
                .or_else(|| self.scan_symbol())
                .or_else(|| self.scan_word());
            match token {
                Some(t) if t.kind == TokenKind::Eof => {
                    tokens.push(t);
                    break;
                }
                Some(t) => tokens.push(t),
                None => self.position += 1,
            }
        }
        tokens
    }

    fn scan_eof(&mut self) -> Option<CodeToken> {
        if self.position < self.chars.len() {
            return None;
        }
        let at = self.position;
        Some(self.make(TokenKind::Eof, String::new(), at))
    }

    fn scan_eol(&mut self) -> Option<CodeToken> {
        if self.peek() != Some('\n') {
            return None;
        }
        let start = self.position;
        self.position += 1;
        Some(self.make(TokenKind::Eol, "\n".to_string(), start))
    }

    fn scan_comment(&mut self) -> Option<CodeToken> {
        let start = self.position;
        if self.starts_with("//") {
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.position += 1;
            }
        } else if self.starts_with("/*") {
            self.position += 2;
            loop {
                if self.starts_with("*/") {
                    self.position += 2;
                    break;
                }
                if self.peek().is_none() {
                    self.issues.error(self.line_number, start, "unclosed_comment", NO_ARGS);
                    break;
                }
                self.position += 1;
            }
        } else {
            return None;
        }
        let content = self.slice(start, self.position);
        Some(self.make(TokenKind::Comment, content, start))
    }

    fn scan_string(&mut self) -> Option<CodeToken> {
        if self.peek() != Some('"') {
            return None;
        }
        let start = self.position;
        self.position += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.issues.error(self.line_number, start, "unclosed_string", NO_ARGS);
                    break;
                }
                Some('"') => {
                    self.position += 1;
                    break;
                }
                Some('\\') => self.scan_escape(&mut value),
                Some(c) => {
                    value.push(c);
                    self.position += 1;
                }
            }
        }
        Some(self.make(TokenKind::StringLiteral, value, start))
    }

    /// Consume one escape sequence starting at a backslash.
    fn scan_escape(&mut self, value: &mut String) {
        let start = self.position;
        self.position += 1;
        let simple = match self.peek() {
            Some('\\') => Some('\\'),
            Some('"') => Some('"'),
            Some('r') => Some('\r'),
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            _ => None,
        };
        if let Some(c) = simple {
            value.push(c);
            self.position += 1;
            return;
        }
        let digits = match self.peek() {
            Some('x') => 2,
            Some('u') => 4,
            _ => 0,
        };
        if digits > 0 {
            let hex: String = (1..=digits).filter_map(|i| self.peek_at(i)).collect();
            let decoded = if hex.chars().count() == digits && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
            } else {
                None
            };
            if let Some(c) = decoded {
                value.push(c);
                self.position += 1 + digits;
                return;
            }
        }
        // Keep the raw text of a bad escape and move on.
        let end = match self.peek() {
            Some(c) if c != '\n' => {
                self.position += 1;
                value.push('\\');
                value.push(c);
                self.position
            }
            _ => {
                value.push('\\');
                self.position
            }
        };
        let raw = self.slice(start, end);
        self.issues.error(self.line_number, start, "invalid_escape", [raw]);
    }

    fn scan_symbol(&mut self) -> Option<CodeToken> {
        let start = self.position;
        if let Some(lig) = LIGATURES.iter().find(|l| self.starts_with(l)) {
            self.position += lig.chars().count();
            return Some(self.make(TokenKind::Symbol, lig.to_string(), start));
        }
        let c = self.peek().filter(|c| is_symbol_char(*c))?;
        self.position += 1;
        Some(self.make(TokenKind::Symbol, c.to_string(), start))
    }

    fn scan_word(&mut self) -> Option<CodeToken> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if !is_word_char(c) {
                break;
            }
            self.position += 1;
        }
        if self.position == start {
            return None;
        }
        let content = self.slice(start, self.position);
        Some(self.make(TokenKind::Word, content, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(code: &str) -> Tokenized {
        tokenize(code, &TokenizeOptions::default())
    }

    fn contents(code: &str) -> Vec<String> {
        lex(code).result.into_iter().map(|t| t.content).collect()
    }

    #[test]
    fn test_words_and_symbols() {
        assert_eq!(
            contents("N[a,b]: 1#2 你好"),
            vec!["N", "[", "a", ",", "b", "]", ":", "1", "#", "2", "你好", ""]
        );
    }

    #[test]
    fn test_ligatures() {
        let out = lex("1[[3,5]]");
        let c: Vec<_> = out.result.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(c, vec!["1", "[[", "3", ",", "5", "]]", ""]);
    }

    #[test]
    fn test_string_escapes() {
        let out = lex(r#""a\"b\n\x41中""#);
        assert!(out.issues.is_empty());
        assert_eq!(out.result[0].kind, TokenKind::StringLiteral);
        assert_eq!(out.result[0].content, "a\"b\nA中");
        assert_eq!(out.result[0].range, Span::new(0, 13));
    }

    #[test]
    fn test_invalid_escape_and_unclosed_string() {
        let out = lex(r#""a\qb"#);
        let keys = out.issues.keys();
        assert_eq!(keys, vec!["invalid_escape", "unclosed_string"]);
        assert_eq!(out.result[0].content, "a\\qb");
        assert!(out.result.last().unwrap().is_eof());
    }

    #[test]
    fn test_comments() {
        let out = lex("1 2 // tail\n/* block */3 /* open");
        let kinds: Vec<_> = out.result.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Comment,
                TokenKind::Eol,
                TokenKind::Comment,
                TokenKind::Word,
                TokenKind::Comment,
                TokenKind::Eof
            ]
        );
        assert_eq!(out.issues.keys(), vec!["unclosed_comment"]);
        assert!(out.result[4].line_head);
        assert!(!out.result[5].line_head);
    }

    #[test]
    fn test_ranges_reproduce_source() {
        let code = "Dt: \"Title\" // c\nN[x]: 1 2 | 3' 4,, ||: \t ~ é";
        let chars: Vec<char> = code.chars().collect();
        let out = lex(code);
        let mut last_end = 0;
        for token in &out.result {
            assert!(token.range.start >= last_end, "overlap at {:?}", token);
            assert!(token.range.start <= token.range.end);
            let text: String = chars[token.range.start..token.range.end].iter().collect();
            if token.kind != TokenKind::StringLiteral {
                assert_eq!(text, token.content);
            }
            // Only whitespace may be skipped between tokens.
            let gap: String = chars[last_end..token.range.start].iter().collect();
            assert!(gap.chars().all(char::is_whitespace), "gap {:?}", gap);
            last_end = token.range.end;
        }
        assert_eq!(last_end, chars.len());
    }

    #[test]
    fn test_always_ends_with_eof() {
        for code in ["", "   ", "\"", "/*", "\\"] {
            let out = lex(code);
            assert!(out.result.last().unwrap().is_eof(), "{:?}", code);
        }
    }
}
