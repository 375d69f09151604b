//! Lyric syllables, before and after they are placed under notes.

use crate::frac::Frac;
use crate::tokenizer::Span;
use serde::Serialize;

/// One written syllable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricChar {
    pub text: String,
    /// Role marker written as `[...]` before the syllable.
    pub prefix: String,
    /// Trailing punctuation.
    pub postfix: String,
    /// Takes horizontal room in layout. Bare punctuation does not.
    pub occupies_space: bool,
}

impl LyricChar {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let occupies_space = !text.is_empty() && !text.chars().all(is_lyric_punct);
        LyricChar {
            text,
            prefix: String::new(),
            postfix: String::new(),
            occupies_space,
        }
    }
}

/// Punctuation that attaches to the syllable before it.
pub fn is_lyric_punct(c: char) -> bool {
    matches!(c, ',' | '.' | '!' | '?' | ';' | ':' | '，' | '。' | '！' | '？' | '；' | '：' | '、')
}

/// What one note of the melody receives, in lyric-row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LyricToken {
    /// One syllable, or several under a `(...)` group.
    Chars {
        chars: Vec<LyricChar>,
        grouped: bool,
        range: Span,
    },
    /// `_`: leave the note without a syllable.
    Skip { range: Span },
    /// `-`: the previous syllable continues over this note.
    Extension { range: Span },
}

impl LyricToken {
    pub fn range(&self) -> Span {
        match self {
            LyricToken::Chars { range, .. } | LyricToken::Skip { range } | LyricToken::Extension { range } => *range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LyricNoteContent {
    Chars { chars: Vec<LyricChar>, grouped: bool },
    Extension,
}

/// A syllable anchored to a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricNote {
    /// Section-local position of the note it sits under.
    pub start_pos: Frac,
    pub length: Frac,
    /// Index of the section within the article.
    pub section: usize,
    pub content: LyricNoteContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupies_space() {
        assert!(LyricChar::new("la").occupies_space);
        assert!(LyricChar::new("我").occupies_space);
        assert!(!LyricChar::new(",").occupies_space);
        assert!(!LyricChar::new("").occupies_space);
    }
}
