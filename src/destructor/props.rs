//! Music property items (`Sp`, `P`, `Pi`, separator shifts) and render
//! property lines (`Rp`).

use super::{Chunk, Source};
use crate::frac::Frac;
use crate::issue::Issues;
use crate::model::props::{BaseTuning, Beats, BeatsProblem, MusicPropsPatch, Qpm, MAX_TRANSPOSE};
use crate::model::render::{RenderPropError, RenderProps};
use crate::tokenizer::TokenKind;
use once_cell::sync::Lazy;
use regex::Regex;

static TRANSPOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]\d+(\.\d+)?$").unwrap());
static BEATS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+/\d+").unwrap());
static SPEED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[qsh]pm=").unwrap());

/// One recognized music property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropItem {
    Transpose(f64),
    Base(BaseTuning),
    Qpm(Qpm),
    Beats(Beats),
    Reduction(Frac),
    Extra(String),
}

/// Parse one space-separated item. `None` when it was recognized but invalid
/// (an issue has been reported).
pub fn parse_prop_item(text: &str, line_number: usize, index: usize, issues: &mut Issues) -> Option<PropItem> {
    if TRANSPOSE.is_match(text) {
        let value: f64 = text.trim_start_matches('+').parse().ok()?;
        return Some(PropItem::Transpose(clamp_transpose(value, line_number, index, issues)));
    }
    if let Some(name) = text.strip_prefix("1=") {
        return match BaseTuning::parse(name) {
            Some(base) => Some(PropItem::Base(base)),
            None => {
                issues.warn(line_number, index, "bad_tuning", [text]);
                None
            }
        };
    }
    if SPEED.is_match(text) {
        return match Qpm::parse(text) {
            Some(qpm) => Some(PropItem::Qpm(qpm)),
            None => {
                issues.warn(line_number, index, "bad_qpm", [text]);
                None
            }
        };
    }
    if BEATS.is_match(text) {
        return match Beats::parse(text) {
            Ok((beats, problem)) => {
                if let Some(BeatsProblem::Unequal(sum, n)) = problem {
                    issues.warn(line_number, index, "unequal_beats", [sum, n]);
                }
                Some(PropItem::Beats(beats))
            }
            Err(_) => {
                issues.warn(line_number, index, "bad_beats", [text]);
                None
            }
        };
    }
    if let Some(ratio) = text.strip_prefix("r=") {
        return match Frac::parse(ratio).filter(|r| r.is_finite() && !r.is_zero() && !r.is_negative()) {
            Some(r) => Some(PropItem::Reduction(r)),
            None => {
                issues.warn(line_number, index, "bad_reduction", [text]);
                None
            }
        };
    }
    Some(PropItem::Extra(text.to_string()))
}

pub fn clamp_transpose(value: f64, line_number: usize, index: usize, issues: &mut Issues) -> f64 {
    if value.abs() <= MAX_TRANSPOSE {
        return value;
    }
    let clamped = value.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
    issues.warn(line_number, index, "transpose_range", [value, clamped]);
    clamped
}

/// Fold the items of a props line into a patch; later items win.
pub fn parse_music_props(chunks: &[Chunk<'_>], line_number: usize, issues: &mut Issues) -> MusicPropsPatch {
    let mut patch = MusicPropsPatch::default();
    for chunk in chunks {
        match parse_prop_item(&chunk.text, line_number, chunk.range.start, issues) {
            Some(PropItem::Transpose(v)) => patch.transpose = Some(v),
            Some(PropItem::Base(b)) => patch.base = Some(b),
            Some(PropItem::Qpm(q)) => patch.qpm = Some(q),
            Some(PropItem::Beats(b)) => patch.beats = Some(b),
            Some(PropItem::Reduction(r)) => patch.reduction = Some(r),
            Some(PropItem::Extra(e)) => patch.extras.push(e),
            None => {}
        }
    }
    patch
}

/// `key=value` items; a quoted value is taken verbatim.
pub fn parse_render_props(chunks: &[Chunk<'_>], source: &Source, line_number: usize, issues: &mut Issues) -> RenderProps {
    let mut props = RenderProps::new();
    for chunk in chunks {
        let Some((key, raw)) = chunk.text.split_once('=') else {
            issues.warn(line_number, chunk.range.start, "rp_bad_format", [&chunk.text]);
            continue;
        };
        let quoted = chunk
            .items
            .last()
            .and_then(|i| i.token())
            .filter(|t| t.kind == TokenKind::StringLiteral && source.slice(t.range) == raw);
        let value = quoted.map_or(raw, |t| t.content.as_str());
        match props.set(key, value) {
            Ok(()) => {}
            Err(RenderPropError::UnknownKey) => issues.warn(line_number, chunk.range.start, "rp_unknown_key", [key]),
            Err(RenderPropError::BadValue) => {
                issues.warn(line_number, chunk.range.start, "rp_unknown_value", [key, value])
            }
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str) -> (Option<PropItem>, Issues) {
        let mut issues = Issues::new();
        let item = parse_prop_item(text, 0, 0, &mut issues);
        (item, issues)
    }

    #[test]
    fn test_items() {
        assert_eq!(item("+2").0, Some(PropItem::Transpose(2.0)));
        assert_eq!(item("-1.5").0, Some(PropItem::Transpose(-1.5)));
        assert!(matches!(item("1=bE").0, Some(PropItem::Base(_))));
        assert!(matches!(item("qpm=96").0, Some(PropItem::Qpm(_))));
        assert!(matches!(item("3/4").0, Some(PropItem::Beats(_))));
        assert_eq!(item("r=1/3").0, Some(PropItem::Reduction(Frac::new(1, 3))));
        assert_eq!(item("legato").0, Some(PropItem::Extra("legato".into())));
    }

    #[test]
    fn test_invalid_items_report() {
        let (i, issues) = item("+100");
        assert_eq!(i, Some(PropItem::Transpose(88.0)));
        assert_eq!(issues.keys(), vec!["transpose_range"]);
        assert_eq!(item("1=H").1.keys(), vec!["bad_tuning"]);
        assert_eq!(item("qpm=fast").1.keys(), vec!["bad_qpm"]);
        assert_eq!(item("4/0").1.keys(), vec!["bad_beats"]);
        assert_eq!(item("r=0").1.keys(), vec!["bad_reduction"]);
        assert_eq!(item("4/4=1+2").1.keys(), vec!["unequal_beats"]);
    }
}
