//! # Lyric Tokens
//!
//! Reads an `L:` line into the stream of tokens that are later handed out
//! one per sounding note.
//!
//! - `"text"` is one syllable, taken verbatim
//! - an ASCII word is one syllable; `don't` stays whole
//! - every other letter is a syllable of its own
//! - `_` leaves a note without text, `-` holds the previous syllable
//! - `/` only divides and produces nothing
//! - punctuation sticks to the syllable before it
//! - `[role]` marks the next syllable, `(...)` puts several on one note

use super::Source;
use crate::issue::Issues;
use crate::model::lyric::{is_lyric_punct, LyricChar, LyricToken};
use crate::sparse::{Bracket, BracketPair, SparseItem};
use crate::tokenizer::{CodeToken, Span, TokenKind};

pub fn parse_lyrics(items: &[&SparseItem], source: &Source, line_number: usize, issues: &mut Issues) -> Vec<LyricToken> {
    let mut reader = LyricReader {
        source,
        line_number,
        tokens: Vec::new(),
        prefix: None,
    };
    reader.read(items, issues);
    if let Some((_, at)) = reader.prefix.take() {
        issues.warn(line_number, at, "bad_lyric_token", ["[]"]);
    }
    reader.tokens
}

struct LyricReader<'s> {
    source: &'s Source,
    line_number: usize,
    tokens: Vec<LyricToken>,
    /// Role waiting for the next syllable, with where it was written.
    prefix: Option<(String, usize)>,
}

impl LyricReader<'_> {
    fn read(&mut self, items: &[&SparseItem], issues: &mut Issues) {
        let mut i = 0;
        while i < items.len() {
            match items[i] {
                SparseItem::Token(t) => i = self.token(items, i, t, issues),
                SparseItem::Pair(pair) if pair.is(Bracket::Square) => {
                    let role = inner_text(pair, self.source);
                    self.prefix = Some((role, pair.range.start));
                    i += 1;
                }
                SparseItem::Pair(pair) if pair.is(Bracket::Paren) => {
                    self.group(pair, issues);
                    i += 1;
                }
                SparseItem::Pair(pair) => {
                    issues.warn(self.line_number, pair.range.start, "bad_lyric_token", [&pair.text]);
                    i += 1;
                }
            }
        }
    }

    /// Handles the token at `i`; returns the next index.
    fn token(&mut self, items: &[&SparseItem], i: usize, t: &CodeToken, issues: &mut Issues) -> usize {
        match t.kind {
            TokenKind::StringLiteral => {
                self.push_chars(vec![LyricChar::new(t.content.clone())], false, t.range);
                i + 1
            }
            TokenKind::Word if t.content.is_ascii() => {
                let (text, range, next) = ascii_word(items, i);
                self.push_chars(vec![LyricChar::new(text)], false, range);
                next
            }
            TokenKind::Word => {
                for (text, range) in split_letters(t) {
                    self.push_chars(vec![LyricChar::new(text)], false, range);
                }
                i + 1
            }
            TokenKind::Symbol => {
                match t.content.as_str() {
                    "/" => {}
                    "_" => self.tokens.push(LyricToken::Skip { range: t.range }),
                    "-" => self.tokens.push(LyricToken::Extension { range: t.range }),
                    s if s.chars().all(is_lyric_punct) => {
                        if !self.attach_punct(s) {
                            issues.warn(self.line_number, t.range.start, "bad_lyric_token", [s]);
                        }
                    }
                    s => issues.warn(self.line_number, t.range.start, "bad_lyric_token", [s]),
                }
                i + 1
            }
            _ => i + 1,
        }
    }

    /// `(...)`: every syllable inside lands on one note.
    fn group(&mut self, pair: &BracketPair, issues: &mut Issues) {
        let mut inner = LyricReader {
            source: self.source,
            line_number: self.line_number,
            tokens: Vec::new(),
            prefix: self.prefix.take(),
        };
        let items: Vec<&SparseItem> = pair.items().collect();
        inner.read(&items, issues);
        let mut chars = Vec::new();
        for token in inner.tokens {
            match token {
                LyricToken::Chars { chars: c, .. } => chars.extend(c),
                other => issues.warn(self.line_number, other.range().start, "bad_lyric_token", [&pair.text]),
            }
        }
        if chars.is_empty() {
            issues.warn(self.line_number, pair.range.start, "bad_lyric_token", [&pair.text]);
            return;
        }
        self.tokens.push(LyricToken::Chars {
            chars,
            grouped: true,
            range: pair.range,
        });
    }

    fn push_chars(&mut self, mut chars: Vec<LyricChar>, grouped: bool, range: Span) {
        if let (Some((role, _)), Some(first)) = (self.prefix.take(), chars.first_mut()) {
            first.prefix = role;
        }
        self.tokens.push(LyricToken::Chars { chars, grouped, range });
    }

    fn attach_punct(&mut self, punct: &str) -> bool {
        match self.tokens.last_mut() {
            Some(LyricToken::Chars { chars, .. }) => match chars.last_mut() {
                Some(last) => {
                    last.postfix.push_str(punct);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

/// An ASCII word with touching apostrophes and the word parts after them.
fn ascii_word(items: &[&SparseItem], i: usize) -> (String, Span, usize) {
    let Some(first) = items[i].token() else {
        return (String::new(), items[i].range(), i + 1);
    };
    let mut text = first.content.clone();
    let mut range = first.range;
    let mut next = i + 1;
    while let Some(t) = items.get(next).and_then(|it| it.token()) {
        let touching = t.range.start == range.end;
        let joins = match t.kind {
            TokenKind::Symbol => t.content == "'",
            TokenKind::Word => text.ends_with('\'') && t.content.is_ascii(),
            _ => false,
        };
        if !(touching && joins) {
            break;
        }
        text.push_str(&t.content);
        range = range.join(&t.range);
        next += 1;
    }
    (text, range, next)
}

/// A word mixing scripts: ASCII runs stay together, other letters split.
fn split_letters(t: &CodeToken) -> Vec<(String, Span)> {
    let mut out: Vec<(String, Span)> = Vec::new();
    let mut ascii_run: Option<(String, usize)> = None;
    for (k, c) in t.content.chars().enumerate() {
        let at = t.range.start + k;
        if c.is_ascii() {
            match &mut ascii_run {
                Some((run, _)) => run.push(c),
                None => ascii_run = Some((c.to_string(), at)),
            }
            continue;
        }
        if let Some((run, start)) = ascii_run.take() {
            let len = run.chars().count();
            out.push((run, Span::new(start, start + len)));
        }
        out.push((c.to_string(), Span::new(at, at + 1)));
    }
    if let Some((run, start)) = ascii_run {
        let len = run.chars().count();
        out.push((run, Span::new(start, start + len)));
    }
    out
}

fn inner_text(pair: &BracketPair, source: &Source) -> String {
    let mut items = pair.items();
    let Some(first) = items.next() else {
        return String::new();
    };
    let last = items.last().unwrap_or(first);
    source.slice(first.range().join(&last.range())).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, ClassifiedLine};
    use crate::sparse::SparseBuilder;

    fn lyrics(code: &str) -> (Vec<LyricToken>, Issues) {
        let mut issues = Issues::new();
        let line = classify(code, &mut issues)
            .into_iter()
            .find_map(|l| match l {
                ClassifiedLine::Command(c) => Some(c),
                _ => None,
            })
            .unwrap();
        let sparse = SparseBuilder::parse(&line, &mut issues);
        let source = Source::of(&sparse);
        let items: Vec<&SparseItem> = sparse.content.items().collect();
        let out = parse_lyrics(&items, &source, 0, &mut issues);
        (out, issues)
    }

    fn texts(tokens: &[LyricToken]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                LyricToken::Chars { chars, .. } => chars.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("+"),
                LyricToken::Skip { .. } => "_".to_string(),
                LyricToken::Extension { .. } => "-".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_string_literals() {
        let (tokens, issues) = lyrics(r#"L: "a"/"b"/"c""#);
        assert!(issues.is_empty());
        assert_eq!(texts(&tokens), vec!["a", "b", "c"]);
        for t in &tokens {
            let LyricToken::Chars { chars, grouped, .. } = t else {
                panic!("expected chars");
            };
            assert!(!grouped);
            assert!(chars[0].occupies_space);
            assert!(chars[0].prefix.is_empty() && chars[0].postfix.is_empty());
        }
    }

    #[test]
    fn test_words_and_letters() {
        let (tokens, issues) = lyrics("L: don't stop _ - 我们");
        assert!(issues.is_empty(), "{:?}", issues.keys());
        assert_eq!(texts(&tokens), vec!["don't", "stop", "_", "-", "我", "们"]);
    }

    #[test]
    fn test_punct_role_and_group() {
        let (tokens, issues) = lyrics("L: [女]你好，(今天) ok!");
        assert!(issues.is_empty(), "{:?}", issues.keys());
        assert_eq!(texts(&tokens), vec!["你", "好", "今+天", "ok"]);
        let LyricToken::Chars { chars, .. } = &tokens[0] else {
            panic!("expected chars");
        };
        assert_eq!(chars[0].prefix, "女");
        let LyricToken::Chars { chars, .. } = &tokens[1] else {
            panic!("expected chars");
        };
        assert_eq!(chars[0].postfix, "，");
        assert!(matches!(&tokens[2], LyricToken::Chars { grouped: true, .. }));
        let LyricToken::Chars { chars, .. } = &tokens[3] else {
            panic!("expected chars");
        };
        assert_eq!(chars[0].postfix, "!");
    }

    #[test]
    fn test_dangling_punct() {
        let (tokens, issues) = lyrics("L: , la");
        assert_eq!(texts(&tokens), vec!["la"]);
        assert_eq!(issues.keys(), vec!["bad_lyric_token"]);
    }
}
