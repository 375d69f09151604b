//! # Line Classifier
//!
//! Turns document text into a flat list of classified lines. Each logical line
//! is tokenized and becomes one of:
//!
//! - a **delimiter** line: only a run of `=` or `-` symbols
//! - a **command** line: `Head[props]: content`
//!
//! Blank and comment-only lines vanish silently. Anything else is reported as
//! `wtf_line` and dropped.

use crate::commands::{self, Command, CommandDef};
use crate::issue::{Issues, NO_ARGS};
use crate::linifier::linify;
use crate::tokenizer::{tokenize, CodeToken, Span, TokenKind, TokenizeOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct DelimiterLine {
    pub line_number: usize,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub line_number: usize,
    pub command: Command,
    /// Head as written (short code or alias).
    pub head: String,
    /// Tokens inside the `[...]` after the head, ending in eof.
    pub props: Option<Vec<CodeToken>>,
    /// Tokens after the colon, comments removed, ending in eof.
    pub content: Vec<CodeToken>,
    /// Content text after the colon, trimmed, without the trailing comment.
    pub text: String,
    /// Character offset of `text` within the logical line.
    pub text_offset: usize,
    pub comment: Option<String>,
    /// Whole logical line.
    pub line_text: String,
}

impl CommandLine {
    pub fn def(&self) -> &'static CommandDef {
        commands::definition(self.command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedLine {
    Delimiter(DelimiterLine),
    Command(CommandLine),
}

pub fn classify(text: &str, issues: &mut Issues) -> Vec<ClassifiedLine> {
    let mut out = Vec::new();
    for line in linify(text) {
        let tokenized = tokenize(&line.text, &TokenizeOptions { line_number: line.line_number });
        issues.extend(tokenized.issues);
        if let Some(classified) = classify_line(line.line_number, &line.text, tokenized.result, issues) {
            out.push(classified);
        }
    }
    log::debug!("classified {} lines", out.len());
    out
}

fn is_open(t: &CodeToken) -> bool {
    t.kind == TokenKind::Symbol && matches!(t.content.as_str(), "(" | "[" | "[[" | "{")
}

fn is_close(t: &CodeToken) -> bool {
    t.kind == TokenKind::Symbol && matches!(t.content.as_str(), ")" | "]" | "]]" | "}")
}

/// Index of the first `:` outside any bracket.
pub fn top_level_colon(tokens: &[CodeToken]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate() {
        if is_open(t) {
            depth += 1;
        } else if is_close(t) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && t.is_symbol(":") {
            return Some(i);
        }
    }
    None
}

fn classify_line(
    line_number: usize,
    line_text: &str,
    tokens: Vec<CodeToken>,
    issues: &mut Issues,
) -> Option<ClassifiedLine> {
    let meaningful: Vec<&CodeToken> = tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Comment | TokenKind::Eol))
        .collect();
    let first = meaningful.first()?;

    if let Some(level) = delimiter_run(&meaningful) {
        return Some(ClassifiedLine::Delimiter(DelimiterLine { line_number, level }));
    }

    let colon = match (first.is_word(), top_level_colon(&tokens)) {
        (true, Some(colon)) => colon,
        _ => {
            issues.warn(line_number, first.range.start, "wtf_line", NO_ARGS);
            return None;
        }
    };

    let head = first.content.clone();
    let def = match commands::lookup(&head) {
        Some(def) => def,
        None => {
            issues.warn(line_number, first.range.start, "unknown_command", [&head]);
            return None;
        }
    };

    let props = extract_props(line_number, &tokens[1..colon], colon_start(&tokens, colon), issues);

    let chars: Vec<char> = line_text.chars().collect();
    let after: &[CodeToken] = &tokens[colon + 1..];
    let comment = after
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Eof)
        .filter(|t| t.kind == TokenKind::Comment);
    let content_end = comment.map_or(chars.len(), |c| c.range.start);
    let content_start = tokens[colon].range.end;
    let raw: String = chars[content_start..content_end].iter().collect();
    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let text = raw.trim().to_string();

    let mut content: Vec<CodeToken> = after
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::Eof | TokenKind::Eol))
        .cloned()
        .collect();
    content.push(CodeToken::eof(content_end));

    log::trace!("line {}: command {}", line_number, def.head);
    Some(ClassifiedLine::Command(CommandLine {
        line_number,
        command: def.command,
        head,
        props,
        content,
        text,
        text_offset: content_start + leading,
        comment: comment.map(|c| c.content.clone()),
        line_text: line_text.to_string(),
    }))
}

fn colon_start(tokens: &[CodeToken], colon: usize) -> usize {
    tokens[colon].range.start
}

/// `Some(level)` when the line is only a run of one delimiter character.
fn delimiter_run(meaningful: &[&CodeToken]) -> Option<usize> {
    let first = meaningful.first()?;
    if first.kind != TokenKind::Symbol || first.content.chars().count() != 1 {
        return None;
    }
    let c = first.content.chars().next()?;
    let level = commands::delimiter_level(c)?;
    meaningful
        .iter()
        .all(|t| t.kind == TokenKind::Symbol && t.content == first.content)
        .then_some(level)
}

/// Props are the tokens between head and colon, which must be one `[...]`.
fn extract_props(
    line_number: usize,
    between: &[CodeToken],
    colon_at: usize,
    issues: &mut Issues,
) -> Option<Vec<CodeToken>> {
    let between: Vec<&CodeToken> = between.iter().filter(|t| t.kind != TokenKind::Comment).collect();
    if between.is_empty() {
        return None;
    }
    let opens = between.first().is_some_and(|t| t.is_symbol("["));
    let closes = between.last().is_some_and(|t| t.is_symbol("]"));
    let inner_depth_ok = {
        let mut depth = 0i32;
        let mut ok = true;
        for (i, t) in between.iter().enumerate() {
            if is_open(t) {
                depth += 1;
            } else if is_close(t) {
                depth -= 1;
                // The outer pair may only close at the very end.
                if depth == 0 && i + 1 != between.len() {
                    ok = false;
                }
            }
        }
        ok && depth == 0
    };

    let well_formed = opens && closes && inner_depth_ok && between.len() >= 2;
    if !well_formed {
        issues.error(line_number, between[0].range.start, "bad_command_format", NO_ARGS);
    }
    let start = usize::from(opens);
    let end = if closes && between.len() > start { between.len() - 1 } else { between.len() };
    let mut inner: Vec<CodeToken> = between[start..end].iter().map(|t| (*t).clone()).collect();
    let eof_at = if closes { between[between.len() - 1].range.start } else { colon_at };
    inner.push(CodeToken::eof(eof_at));
    Some(inner)
}

/// Span of the content text inside the logical line.
pub fn content_span(line: &CommandLine) -> Span {
    Span::new(line.text_offset, line.text_offset + line.text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> (Option<ClassifiedLine>, Issues) {
        let mut issues = Issues::new();
        let mut lines = classify(text, &mut issues);
        (lines.pop(), issues)
    }

    fn command(text: &str) -> CommandLine {
        match one(text).0 {
            Some(ClassifiedLine::Command(c)) => c,
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            one("===").0,
            Some(ClassifiedLine::Delimiter(DelimiterLine { line_number: 0, level: 1 }))
        );
        assert_eq!(
            one("  -  // fragment").0,
            Some(ClassifiedLine::Delimiter(DelimiterLine { line_number: 0, level: 2 }))
        );
        assert!(matches!(one("-=").0, None));
    }

    #[test]
    fn test_command_with_props_and_comment() {
        let line = command("N[alto, 2]:  1 2 | 3 // hi");
        assert_eq!(line.command, Command::Notes);
        assert_eq!(line.text, "1 2 | 3");
        assert_eq!(line.text_offset, 13);
        assert_eq!(line.comment.as_deref(), Some("// hi"));
        let props: Vec<_> = line.props.unwrap().iter().map(|t| t.content.clone()).collect();
        assert_eq!(props, vec!["alto", ",", "2", ""]);
        let content: Vec<_> = line.content.iter().map(|t| t.content.clone()).collect();
        assert_eq!(content, vec!["1", "2", "|", "3", ""]);
    }

    #[test]
    fn test_alias_head() {
        let line = command("Title: Hello");
        assert_eq!(line.command, Command::Title);
        assert_eq!(line.head, "Title");
        assert!(line.props.is_none());
    }

    #[test]
    fn test_colon_inside_brackets_is_not_top_level() {
        let line = command("N[a:b]: 1");
        assert_eq!(line.text, "1");
    }

    #[test]
    fn test_bad_command_format() {
        let mut issues = Issues::new();
        let lines = classify("N x: 1", &mut issues);
        assert_eq!(lines.len(), 1);
        assert_eq!(issues.keys(), vec!["bad_command_format"]);
    }

    #[test]
    fn test_wtf_and_unknown() {
        let (line, issues) = one("hello world");
        assert!(line.is_none());
        assert_eq!(issues.keys(), vec!["wtf_line"]);
        let (line, issues) = one("Q: 1 2");
        assert!(line.is_none());
        assert_eq!(issues.keys(), vec!["unknown_command"]);
        let (line, issues) = one("   // only a comment");
        assert!(line.is_none());
        assert!(issues.is_empty());
    }
}
