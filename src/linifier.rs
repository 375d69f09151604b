//! Splits document text into logical lines.
//!
//! `\r\n` and `\r` are normalized to `\n`. A physical line ending in a single
//! backslash continues on the next one: the backslash is dropped and the texts
//! are concatenated. A logical line keeps the number of its first physical line.

use serde::Serialize;

/// One physical line's share of a logical line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSegment {
    pub line_number: usize,
    /// Character offset of this segment inside the logical line.
    pub offset: usize,
    /// Length in characters, without the continuation backslash.
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitLine {
    pub line_number: usize,
    pub text: String,
    pub segments: Vec<LineSegment>,
}

impl SplitLine {
    /// Map a physical `(row, col)` to a character offset in this line.
    pub fn offset_of(&self, row: usize, col: usize) -> Option<usize> {
        let segment = self.segments.iter().find(|s| s.line_number == row)?;
        Some(segment.offset + col.min(segment.len))
    }
}

fn continues(line: &str) -> bool {
    line.ends_with('\\') && !line.ends_with("\\\\")
}

pub fn linify(text: &str) -> Vec<SplitLine> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines = Vec::new();
    let mut pending: Option<SplitLine> = None;

    for (line_number, raw) in normalized.split('\n').enumerate() {
        let joined = continues(raw);
        let body = if joined { &raw[..raw.len() - 1] } else { raw };
        let len = body.chars().count();

        let mut line = pending.take().unwrap_or_else(|| SplitLine {
            line_number,
            text: String::new(),
            segments: Vec::new(),
        });
        line.segments.push(LineSegment {
            line_number,
            offset: line.text.chars().count(),
            len,
        });
        line.text.push_str(body);

        if joined {
            pending = Some(line);
        } else {
            lines.push(line);
        }
    }
    if let Some(line) = pending {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_normalize() {
        let lines = linify("a\r\nb\rc\nd");
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert_eq!(lines[3].line_number, 3);
    }

    #[test]
    fn test_continuation() {
        let lines = linify("N: 1 2 \\\n3 4\nN: 5");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "N: 1 2 3 4");
        assert_eq!(lines[0].line_number, 0);
        assert_eq!(lines[1].line_number, 2);
        assert_eq!(lines[0].offset_of(1, 1), Some(8));
        assert_eq!(lines[0].offset_of(2, 0), None);
    }

    #[test]
    fn test_double_backslash_is_not_continuation() {
        let lines = linify("a\\\\\nb");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a\\\\");
    }

    #[test]
    fn test_trailing_continuation_at_eof() {
        let lines = linify("a\\");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "a");
    }
}
