//! Musical properties: tuning, transposition, speed, time signature and
//! reduction. A [`MusicProps`] is the fully resolved context; a
//! [`MusicPropsPatch`] is what one line or separator changes.

use crate::frac::Frac;
use serde::Serialize;
use std::fmt;

/// Largest transposition magnitude in semitones.
pub const MAX_TRANSPOSE: f64 = 88.0;

/// Base tuning written as `1=X`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BaseTuning {
    /// A named key such as `C`, `#F`, `bB`; `semitones` counts from C.
    Named { name: String, semitones: i32 },
    /// `1=?`: no particular key.
    Unknown,
}

impl BaseTuning {
    /// Parse the part after `1=`.
    pub fn parse(text: &str) -> Option<BaseTuning> {
        if text == "?" {
            return Some(BaseTuning::Unknown);
        }
        let mut chars = text.chars().peekable();
        let mut shift = 0;
        while let Some(c) = chars.peek().copied() {
            match c {
                '#' => shift += 1,
                'b' => shift -= 1,
                _ => break,
            }
            chars.next();
        }
        let letter = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        Some(BaseTuning::Named {
            name: text.to_string(),
            semitones: base + shift,
        })
    }

    pub fn semitones(&self) -> i32 {
        match self {
            BaseTuning::Named { semitones, .. } => *semitones,
            BaseTuning::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QpmSymbol {
    /// `qpm`: quarter notes per minute.
    Quarter,
    /// `spm`: dotted quarter notes per minute.
    DottedQuarter,
    /// `hpm`: half notes per minute.
    Half,
}

impl QpmSymbol {
    /// Length of one counted beat in quarters.
    pub fn quarters(&self) -> Frac {
        match self {
            QpmSymbol::Quarter => Frac::one(),
            QpmSymbol::DottedQuarter => Frac::new(3, 2),
            QpmSymbol::Half => Frac::from_int(2),
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            QpmSymbol::Quarter => "qpm",
            QpmSymbol::DottedQuarter => "spm",
            QpmSymbol::Half => "hpm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Qpm {
    pub value: f64,
    pub symbol: QpmSymbol,
    /// Display text after `/`, e.g. `Allegro`.
    pub text: Option<String>,
}

impl Qpm {
    /// Parse `qpm=120`, `spm=60/Andante`, `hpm=40`.
    pub fn parse(text: &str) -> Option<Qpm> {
        let (key, rest) = text.split_once('=')?;
        let symbol = match key {
            "qpm" => QpmSymbol::Quarter,
            "spm" => QpmSymbol::DottedQuarter,
            "hpm" => QpmSymbol::Half,
            _ => return None,
        };
        let (number, label) = match rest.split_once('/') {
            Some((n, l)) => (n, Some(l.to_string())),
            None => (rest, None),
        };
        let value: f64 = number.parse().ok()?;
        if !(value.is_finite() && value > 0.0) {
            return None;
        }
        Some(Qpm { value, symbol, text: label })
    }

    /// Speed normalized to quarter notes per minute.
    pub fn quarters_per_minute(&self) -> f64 {
        self.value * self.symbol.quarters().to_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Swing {
    None,
    /// `T` suffix: eighth notes swing.
    Eighth,
    /// `t` suffix: sixteenth notes swing.
    Sixteenth,
}

impl Swing {
    /// Length in quarters of the unit the swing warp repeats over.
    pub fn period(&self) -> Option<Frac> {
        match self {
            Swing::None => None,
            Swing::Eighth => Some(Frac::one()),
            Swing::Sixteenth => Some(Frac::new(1, 2)),
        }
    }
}

/// Time signature `N/M`, with optional swing and beat grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Beats {
    pub value: i64,
    pub defaults: i64,
    pub swing: Swing,
    /// `=a+b+...` grouping, empty when not written.
    pub components: Vec<i64>,
}

/// Why a beats text was rejected or questioned.
#[derive(Debug, Clone, PartialEq)]
pub enum BeatsProblem {
    Invalid,
    /// Grouping sums to the first value instead of the numerator.
    Unequal(i64, i64),
}

impl Beats {
    /// Parse `3/4`, `6/8T`, `7/8=2+2+3`.
    pub fn parse(text: &str) -> Result<(Beats, Option<BeatsProblem>), BeatsProblem> {
        let (sig, grouping) = match text.split_once('=') {
            Some((s, g)) => (s, Some(g)),
            None => (text, None),
        };
        let (num, rest) = sig.split_once('/').ok_or(BeatsProblem::Invalid)?;
        let (den, swing) = if let Some(d) = rest.strip_suffix('T') {
            (d, Swing::Eighth)
        } else if let Some(d) = rest.strip_suffix('t') {
            (d, Swing::Sixteenth)
        } else {
            (rest, Swing::None)
        };
        let value: i64 = num.parse().map_err(|_| BeatsProblem::Invalid)?;
        let defaults: i64 = den.parse().map_err(|_| BeatsProblem::Invalid)?;
        // A full section is `4 * value / defaults` quarters.
        if value <= 0 || defaults <= 0 || value.checked_mul(4).is_none() {
            return Err(BeatsProblem::Invalid);
        }
        let components = match grouping {
            Some(g) => g
                .split('+')
                .map(|c| c.parse::<i64>().ok().filter(|v| *v > 0))
                .collect::<Option<Vec<_>>>()
                .ok_or(BeatsProblem::Invalid)?,
            None => Vec::new(),
        };
        let sum = components
            .iter()
            .try_fold(0i64, |acc, c| acc.checked_add(*c))
            .ok_or(BeatsProblem::Invalid)?;
        let problem = (!components.is_empty() && sum != value).then_some(BeatsProblem::Unequal(sum, value));
        Ok((Beats { value, defaults, swing, components }, problem))
    }

    /// Length of a plain note in quarters.
    pub fn unit(&self) -> Frac {
        Frac::new(4, self.defaults)
    }

    /// Length of a full section in quarters.
    pub fn section_quarters(&self) -> Frac {
        Frac::from_int(self.value) * Frac::new(4, self.defaults)
    }
}

impl fmt::Display for Beats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.defaults)?;
        match self.swing {
            Swing::Eighth => write!(f, "T")?,
            Swing::Sixteenth => write!(f, "t")?,
            Swing::None => {}
        }
        if !self.components.is_empty() {
            let parts: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
            write!(f, "={}", parts.join("+"))?;
        }
        Ok(())
    }
}

/// Resolved musical context of a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicProps {
    /// Semitones, possibly fractional.
    pub transpose: f64,
    pub base: Option<BaseTuning>,
    pub qpm: Option<Qpm>,
    pub beats: Option<Beats>,
    /// Time ratio applied per `(...)` level.
    pub reduction: Frac,
    pub extras: Vec<String>,
}

impl Default for MusicProps {
    fn default() -> Self {
        MusicProps {
            transpose: 0.0,
            base: None,
            qpm: None,
            beats: None,
            reduction: Frac::new(1, 2),
            extras: Vec::new(),
        }
    }
}

impl MusicProps {
    /// Length of a plain note in quarters.
    pub fn unit(&self) -> Frac {
        self.beats.as_ref().map_or(Frac::one(), Beats::unit)
    }

    /// Context with `patch` written over it.
    pub fn apply(&self, patch: &MusicPropsPatch) -> MusicProps {
        let mut extras = self.extras.clone();
        extras.extend(patch.extras.iter().cloned());
        MusicProps {
            transpose: patch.transpose.unwrap_or(self.transpose),
            base: patch.base.clone().or_else(|| self.base.clone()),
            qpm: patch.qpm.clone().or_else(|| self.qpm.clone()),
            beats: patch.beats.clone().or_else(|| self.beats.clone()),
            reduction: patch.reduction.unwrap_or(self.reduction),
            extras,
        }
    }
}

/// Fields one line or separator sets; unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicPropsPatch {
    pub transpose: Option<f64>,
    pub base: Option<BaseTuning>,
    pub qpm: Option<Qpm>,
    pub beats: Option<Beats>,
    pub reduction: Option<Frac>,
    pub extras: Vec<String>,
}

impl MusicPropsPatch {
    pub fn is_empty(&self) -> bool {
        self.transpose.is_none()
            && self.base.is_none()
            && self.qpm.is_none()
            && self.beats.is_none()
            && self.reduction.is_none()
            && self.extras.is_empty()
    }

    /// `other` written over `self`.
    pub fn merge(&self, other: &MusicPropsPatch) -> MusicPropsPatch {
        let mut extras = self.extras.clone();
        extras.extend(other.extras.iter().cloned());
        MusicPropsPatch {
            transpose: other.transpose.or(self.transpose),
            base: other.base.clone().or_else(|| self.base.clone()),
            qpm: other.qpm.clone().or_else(|| self.qpm.clone()),
            beats: other.beats.clone().or_else(|| self.beats.clone()),
            reduction: other.reduction.or(self.reduction),
            extras,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_parse() {
        let (b, problem) = Beats::parse("6/8T").unwrap();
        assert_eq!(b.value, 6);
        assert_eq!(b.swing, Swing::Eighth);
        assert_eq!(b.unit(), Frac::new(1, 2));
        assert_eq!(b.section_quarters(), Frac::from_int(3));
        assert!(problem.is_none());

        let (b, problem) = Beats::parse("7/8=2+2+2").unwrap();
        assert_eq!(b.components, vec![2, 2, 2]);
        assert_eq!(problem, Some(BeatsProblem::Unequal(6, 7)));
        assert_eq!(b.to_string(), "7/8=2+2+2");

        assert!(Beats::parse("0/4").is_err());
        assert!(Beats::parse("4").is_err());
        assert!(Beats::parse("4/x").is_err());
    }

    #[test]
    fn test_beats_reject_overflow() {
        assert_eq!(
            Beats::parse("4/4=9223372036854775807+1").unwrap_err(),
            BeatsProblem::Invalid
        );
        assert_eq!(Beats::parse("9223372036854775807/1").unwrap_err(), BeatsProblem::Invalid);
        let (b, _) = Beats::parse("2305843009213693951/1").unwrap();
        assert_eq!(b.section_quarters(), Frac::from_int(2305843009213693951 * 4));
    }

    #[test]
    fn test_qpm_parse() {
        let q = Qpm::parse("spm=60/Andante").unwrap();
        assert_eq!(q.symbol, QpmSymbol::DottedQuarter);
        assert_eq!(q.text.as_deref(), Some("Andante"));
        assert_eq!(q.quarters_per_minute(), 90.0);
        assert!(Qpm::parse("bpm=60").is_none());
        assert!(Qpm::parse("qpm=-3").is_none());
    }

    #[test]
    fn test_base_tuning() {
        assert_eq!(BaseTuning::parse("#F").unwrap().semitones(), 6);
        assert_eq!(BaseTuning::parse("bB").unwrap().semitones(), 10);
        assert_eq!(BaseTuning::parse("?"), Some(BaseTuning::Unknown));
        assert!(BaseTuning::parse("H").is_none());
    }

    #[test]
    fn test_apply_patch() {
        let base = MusicProps::default();
        let patch = MusicPropsPatch {
            transpose: Some(2.0),
            beats: Beats::parse("3/4").ok().map(|(b, _)| b),
            ..Default::default()
        };
        let props = base.apply(&patch);
        assert_eq!(props.transpose, 2.0);
        assert_eq!(props.unit(), Frac::one());
        assert_eq!(props.reduction, Frac::new(1, 2));
        let again = props.apply(&MusicPropsPatch::default());
        assert_eq!(again, props);
    }
}
