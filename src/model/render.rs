//! Render properties (`Rp` lines): typed layout settings looked up in a fixed
//! key table. Unset keys fall back to defaults at the point of use.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for RenderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderValue::Int(v) => write!(f, "{}", v),
            RenderValue::Float(v) => write!(f, "{}", v),
            RenderValue::Bool(v) => write!(f, "{}", v),
            RenderValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Int(i64, i64),
    Float(f64, f64),
    Bool,
    Text,
    Choice(&'static [&'static str]),
}

const FONT_SIZE: Kind = Kind::Float(1.0, 200.0);
const SPACING: Kind = Kind::Float(0.0, 500.0);
const MARGIN: Kind = Kind::Float(0.0, 1000.0);

static KEYS: &[(&str, Kind)] = &[
    ("n", Kind::Int(1, 64)),
    ("page_width", Kind::Float(1.0, 5000.0)),
    ("margin_top", MARGIN),
    ("margin_bottom", MARGIN),
    ("margin_left", MARGIN),
    ("margin_right", MARGIN),
    ("scale", Kind::Float(0.1, 10.0)),
    ("title_size", FONT_SIZE),
    ("subtitle_size", FONT_SIZE),
    ("author_size", FONT_SIZE),
    ("note_size", FONT_SIZE),
    ("lyric_size", FONT_SIZE),
    ("annotation_size", FONT_SIZE),
    ("chord_size", FONT_SIZE),
    ("force_size", FONT_SIZE),
    ("footnote_size", FONT_SIZE),
    ("text_size", FONT_SIZE),
    ("font_title", Kind::Text),
    ("font_note", Kind::Text),
    ("font_lyric", Kind::Text),
    ("font_text", Kind::Text),
    ("line_spacing", SPACING),
    ("part_spacing", SPACING),
    ("lyric_spacing", SPACING),
    ("article_spacing", SPACING),
    ("fragment_spacing", SPACING),
    ("separator_inset", Kind::Float(0.0, 100.0)),
    ("grace_scale", Kind::Float(0.1, 1.0)),
    ("debug", Kind::Bool),
    ("debug_columns", Kind::Bool),
    ("show_measure_number", Kind::Bool),
    ("hide_empty_voices", Kind::Bool),
    ("compact", Kind::Bool),
    ("show_jumpers", Kind::Bool),
    ("measure_number_start", Kind::Int(0, 9999)),
    ("lyric_align", Kind::Choice(&["left", "center"])),
    ("tie_style", Kind::Choice(&["arc", "line"])),
    ("color_scheme", Kind::Choice(&["light", "dark"])),
    ("pagination", Kind::Choice(&["none", "page"])),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPropError {
    UnknownKey,
    BadValue,
}

fn convert(kind: Kind, raw: &str) -> Option<RenderValue> {
    match kind {
        Kind::Int(lo, hi) => raw.parse::<i64>().ok().filter(|v| (lo..=hi).contains(v)).map(RenderValue::Int),
        Kind::Float(lo, hi) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= lo && *v <= hi)
            .map(RenderValue::Float),
        Kind::Bool => match raw {
            "true" | "yes" | "on" | "1" => Some(RenderValue::Bool(true)),
            "false" | "no" | "off" | "0" => Some(RenderValue::Bool(false)),
            _ => None,
        },
        Kind::Text => (!raw.is_empty()).then(|| RenderValue::Text(raw.to_string())),
        Kind::Choice(options) => options.contains(&raw).then(|| RenderValue::Text(raw.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderProps {
    values: BTreeMap<&'static str, RenderValue>,
}

impl RenderProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known_key(key: &str) -> bool {
        KEYS.iter().any(|(k, _)| *k == key)
    }

    /// Validate and store one `key=value`.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), RenderPropError> {
        let (name, kind) = KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .ok_or(RenderPropError::UnknownKey)?;
        let value = convert(*kind, raw).ok_or(RenderPropError::BadValue)?;
        self.values.insert(*name, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RenderValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `other` written over `self`.
    pub fn overlay(&self, other: &RenderProps) -> RenderProps {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (*k, v.clone())));
        RenderProps { values }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            RenderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            RenderValue::Float(v) => Some(*v),
            RenderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(RenderValue::Bool(true)))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            RenderValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Sections per rendered line.
    pub fn sections_per_line(&self) -> usize {
        self.int("n").map_or(4, |n| n as usize)
    }

    pub fn page_width(&self) -> f64 {
        self.float("page_width").unwrap_or(800.0)
    }

    /// Width available to a line after left and right margins.
    pub fn line_width(&self) -> f64 {
        let left = self.float("margin_left").unwrap_or(40.0);
        let right = self.float("margin_right").unwrap_or(40.0);
        (self.page_width() - left - right).max(0.0)
    }

    pub fn note_size(&self) -> f64 {
        self.float("note_size").unwrap_or(20.0)
    }

    pub fn lyric_size(&self) -> f64 {
        self.float("lyric_size").unwrap_or(16.0)
    }

    pub fn separator_inset(&self) -> f64 {
        self.float("separator_inset").unwrap_or(4.0)
    }

    pub fn grace_scale(&self) -> f64 {
        self.float("grace_scale").unwrap_or(0.6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_validate() {
        let mut rp = RenderProps::new();
        assert_eq!(rp.set("n", "3"), Ok(()));
        assert_eq!(rp.set("n", "0"), Err(RenderPropError::BadValue));
        assert_eq!(rp.set("nope", "1"), Err(RenderPropError::UnknownKey));
        assert_eq!(rp.set("tie_style", "line"), Ok(()));
        assert_eq!(rp.set("tie_style", "curvy"), Err(RenderPropError::BadValue));
        assert_eq!(rp.set("debug", "yes"), Ok(()));
        assert_eq!(rp.sections_per_line(), 3);
        assert!(rp.flag("debug"));
        assert_eq!(rp.text("tie_style"), Some("line"));
    }

    #[test]
    fn test_overlay_and_defaults() {
        let mut doc = RenderProps::new();
        doc.set("n", "2").unwrap();
        doc.set("page_width", "600").unwrap();
        let mut frag = RenderProps::new();
        frag.set("n", "5").unwrap();
        let merged = doc.overlay(&frag);
        assert_eq!(merged.sections_per_line(), 5);
        assert_eq!(merged.line_width(), 520.0);
        assert_eq!(RenderProps::new().sections_per_line(), 4);
    }
}
