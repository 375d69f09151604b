//! # Sparse Builder
//!
//! Splits a token stream into nested bracket groups. `()`, `[]`, `[[]]` and
//! `{}` nest; commas split a bracket's content into groups depending on the
//! command's [`SplitMode`].
//!
//! Unclosed brackets are closed at the end of the line (`unclosed_bracket`,
//! once per bracket). Closing brackets without a partner are dropped
//! (`unpaired_bracket`, once per occurrence). Every group ends with a
//! synthetic eof token so readers can always look one token ahead.

use crate::classifier::CommandLine;
use crate::commands::{Command, SplitMode};
use crate::issue::Issues;
use crate::tokenizer::{CodeToken, Span, TokenKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bracket {
    Paren,
    Square,
    DoubleSquare,
    Curly,
}

impl Bracket {
    fn from_open(s: &str) -> Option<Bracket> {
        match s {
            "(" => Some(Bracket::Paren),
            "[" => Some(Bracket::Square),
            "[[" => Some(Bracket::DoubleSquare),
            "{" => Some(Bracket::Curly),
            _ => None,
        }
    }

    pub fn open(&self) -> &'static str {
        match self {
            Bracket::Paren => "(",
            Bracket::Square => "[",
            Bracket::DoubleSquare => "[[",
            Bracket::Curly => "{",
        }
    }

    pub fn close(&self) -> &'static str {
        match self {
            Bracket::Paren => ")",
            Bracket::Square => "]",
            Bracket::DoubleSquare => "]]",
            Bracket::Curly => "}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SparseItem {
    Token(CodeToken),
    Pair(BracketPair),
}

impl SparseItem {
    pub fn range(&self) -> Span {
        match self {
            SparseItem::Token(t) => t.range,
            SparseItem::Pair(p) => p.range,
        }
    }

    pub fn token(&self) -> Option<&CodeToken> {
        match self {
            SparseItem::Token(t) => Some(t),
            SparseItem::Pair(_) => None,
        }
    }

    pub fn pair(&self) -> Option<&BracketPair> {
        match self {
            SparseItem::Pair(p) => Some(p),
            SparseItem::Token(_) => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.token().is_some_and(|t| t.is_eof())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketPair {
    pub range: Span,
    /// `None` for the root group of a line.
    pub bracket: Option<Bracket>,
    /// The closing bracket was written.
    pub closed: bool,
    pub groups: Vec<Vec<SparseItem>>,
    pub text: String,
}

impl BracketPair {
    pub fn is(&self, bracket: Bracket) -> bool {
        self.bracket == Some(bracket)
    }

    /// Items of every group, eof markers removed.
    pub fn items(&self) -> impl Iterator<Item = &SparseItem> {
        self.groups.iter().flatten().filter(|i| !i.is_eof())
    }

    /// Groups that hold anything besides their eof marker.
    pub fn non_empty_groups(&self) -> impl Iterator<Item = &[SparseItem]> {
        self.groups
            .iter()
            .map(|g| trim_eof(g))
            .filter(|g| !g.is_empty())
    }
}

/// A group without its trailing eof.
pub fn trim_eof(group: &[SparseItem]) -> &[SparseItem] {
    match group.last() {
        Some(last) if last.is_eof() => &group[..group.len() - 1],
        _ => group,
    }
}

/// A command line with its props and content split into bracket groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseLine {
    pub line_number: usize,
    pub command: Command,
    pub head: String,
    pub props: Option<BracketPair>,
    pub content: BracketPair,
    pub text: String,
    pub text_offset: usize,
    pub comment: Option<String>,
}

pub struct SparseBuilder;

impl SparseBuilder {
    pub fn parse(line: &CommandLine, issues: &mut Issues) -> SparseLine {
        let chars: Vec<char> = line.line_text.chars().collect();
        let props = line
            .props
            .as_ref()
            .map(|p| build_pair(p, SplitMode::Always, &chars, line.line_number, issues));
        let content = build_pair(&line.content, line.def().split, &chars, line.line_number, issues);
        SparseLine {
            line_number: line.line_number,
            command: line.command,
            head: line.head.clone(),
            props,
            content,
            text: line.text.clone(),
            text_offset: line.text_offset,
            comment: line.comment.clone(),
        }
    }
}

struct Frame {
    bracket: Option<Bracket>,
    start: usize,
    groups: Vec<Vec<SparseItem>>,
    current: Vec<SparseItem>,
}

impl Frame {
    fn new(bracket: Option<Bracket>, start: usize) -> Self {
        Frame {
            bracket,
            start,
            groups: Vec::new(),
            current: Vec::new(),
        }
    }

    fn end_group(&mut self, at: usize) {
        let mut group = std::mem::take(&mut self.current);
        group.push(SparseItem::Token(CodeToken::eof(at)));
        self.groups.push(group);
    }

    fn into_pair(mut self, end: usize, closed: bool, chars: &[char]) -> BracketPair {
        let inner_end = if closed {
            end - self.bracket.map_or(0, |b| b.close().len())
        } else {
            end
        };
        self.end_group(inner_end);
        let range = Span::new(self.start, end);
        let text = chars.get(range.start..range.end.min(chars.len())).map_or_else(String::new, |s| s.iter().collect());
        BracketPair {
            range,
            bracket: self.bracket,
            closed,
            groups: self.groups,
            text,
        }
    }
}

/// Build the bracket tree of one token stream.
pub fn build_pair(
    tokens: &[CodeToken],
    mode: SplitMode,
    chars: &[char],
    line_number: usize,
    issues: &mut Issues,
) -> BracketPair {
    let start = tokens.first().map_or(0, |t| t.range.start);
    let end = tokens.last().map_or(start, |t| t.range.end);
    let mut stack: Vec<Frame> = vec![Frame::new(None, start)];

    let split = |depth: usize| match mode {
        SplitMode::Always => true,
        SplitMode::Never => false,
        SplitMode::Others => depth > 0,
    };

    for token in tokens.iter().filter(|t| t.kind != TokenKind::Eof) {
        if token.kind == TokenKind::Symbol {
            if let Some(bracket) = Bracket::from_open(&token.content) {
                stack.push(Frame::new(Some(bracket), token.range.start));
                continue;
            }
            if token.content == "]]" {
                // `]]` closes a double bracket, or two single ones.
                if top_is(&stack, Bracket::DoubleSquare) {
                    close(&mut stack, token.range.end, chars);
                } else {
                    let mid = token.range.start + 1;
                    close_or_drop(&mut stack, Bracket::Square, mid, line_number, token.range.start, issues, chars);
                    close_or_drop(&mut stack, Bracket::Square, token.range.end, line_number, mid, issues, chars);
                }
                continue;
            }
            let closing = match token.content.as_str() {
                ")" => Some(Bracket::Paren),
                "]" => Some(Bracket::Square),
                "}" => Some(Bracket::Curly),
                _ => None,
            };
            if let Some(bracket) = closing {
                close_or_drop(&mut stack, bracket, token.range.end, line_number, token.range.start, issues, chars);
                continue;
            }
            if token.content == "," && split(stack.len() - 1) {
                if let Some(top) = stack.last_mut() {
                    top.end_group(token.range.start);
                }
                continue;
            }
        }
        if let Some(top) = stack.last_mut() {
            top.current.push(SparseItem::Token(token.clone()));
        }
    }

    while stack.len() > 1 {
        if let Some(top) = stack.last() {
            let open = top.bracket.map_or("", |b| b.open());
            issues.error(line_number, top.start, "unclosed_bracket", [open]);
        }
        if let Some(frame) = stack.pop() {
            let pair = frame.into_pair(end, false, chars);
            if let Some(parent) = stack.last_mut() {
                parent.current.push(SparseItem::Pair(pair));
            }
        }
    }

    match stack.pop() {
        Some(root) => root.into_pair(end, true, chars),
        None => Frame::new(None, start).into_pair(end, true, chars),
    }
}

fn top_is(stack: &[Frame], bracket: Bracket) -> bool {
    stack.len() > 1 && stack.last().and_then(|f| f.bracket) == Some(bracket)
}

fn close(stack: &mut Vec<Frame>, end: usize, chars: &[char]) {
    if let Some(frame) = stack.pop() {
        let pair = frame.into_pair(end, true, chars);
        if let Some(parent) = stack.last_mut() {
            parent.current.push(SparseItem::Pair(pair));
        }
    }
}

fn close_or_drop(
    stack: &mut Vec<Frame>,
    bracket: Bracket,
    end: usize,
    line_number: usize,
    at: usize,
    issues: &mut Issues,
    chars: &[char],
) {
    if top_is(stack, bracket) {
        close(stack, end, chars);
    } else {
        issues.error(line_number, at, "unpaired_bracket", [bracket.close()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize, TokenizeOptions};

    fn pair(text: &str, mode: SplitMode) -> (BracketPair, Issues) {
        let mut issues = Issues::new();
        let tokens = tokenize(text, &TokenizeOptions::default()).result;
        let chars: Vec<char> = text.chars().collect();
        let p = build_pair(&tokens, mode, &chars, 0, &mut issues);
        (p, issues)
    }

    fn words(group: &[SparseItem]) -> Vec<String> {
        trim_eof(group)
            .iter()
            .map(|i| match i {
                SparseItem::Token(t) => t.content.clone(),
                SparseItem::Pair(p) => p.text.clone(),
            })
            .collect()
    }

    #[test]
    fn test_others_mode_keeps_top_level_commas() {
        let (p, issues) = pair("1, 2 (3, 4)", SplitMode::Others);
        assert!(issues.is_empty());
        assert_eq!(p.groups.len(), 1);
        assert_eq!(words(&p.groups[0]), vec!["1", ",", "2", "(3, 4)"]);
        let inner = p.groups[0][3].pair().unwrap();
        assert!(inner.is(Bracket::Paren));
        assert_eq!(inner.groups.len(), 2);
        assert_eq!(words(&inner.groups[1]), vec!["4"]);
    }

    #[test]
    fn test_always_and_never() {
        let (p, _) = pair("a, b,", SplitMode::Always);
        assert_eq!(p.groups.len(), 3);
        assert_eq!(p.groups[2].len(), 1);
        assert!(p.groups[2][0].is_eof());
        let (p, _) = pair("a, [b, c]", SplitMode::Never);
        assert_eq!(p.groups.len(), 1);
        assert_eq!(p.groups[0][2].pair().unwrap().groups.len(), 1);
    }

    #[test]
    fn test_double_square() {
        let (p, issues) = pair("1[[3,5]] 2[a[b]]", SplitMode::Others);
        assert!(issues.is_empty(), "{:?}", issues);
        let items = trim_eof(&p.groups[0]);
        assert!(items[1].pair().unwrap().is(Bracket::DoubleSquare));
        let outer = items[3].pair().unwrap();
        assert!(outer.is(Bracket::Square));
        assert_eq!(outer.text, "[a[b]]");
        assert!(outer.items().nth(1).unwrap().pair().unwrap().is(Bracket::Square));
    }

    #[test]
    fn test_unclosed_brackets_once_each() {
        let (p, issues) = pair("(1 [2 {3", SplitMode::Others);
        assert_eq!(issues.keys(), vec!["unclosed_bracket"; 3]);
        let outer = trim_eof(&p.groups[0])[0].pair().unwrap();
        assert!(!outer.closed);
    }

    #[test]
    fn test_unpaired_per_occurrence() {
        let (p, issues) = pair("1 ) 2 ] } (3]", SplitMode::Others);
        assert_eq!(issues.keys(), vec!["unpaired_bracket"; 4]
            .into_iter()
            .chain(["unclosed_bracket"])
            .collect::<Vec<_>>());
        assert_eq!(words(&p.groups[0])[..2], ["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_never_panics_on_noise() {
        for text in ["]]]]", "[[[[", "([)]", "{,}", "", ",,,", "[[a]", "[a]]"] {
            let (p, _) = pair(text, SplitMode::Others);
            assert!(!p.groups.is_empty());
            for g in &p.groups {
                assert!(g.last().unwrap().is_eof());
            }
        }
    }
}
