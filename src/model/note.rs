//! Notes and the per-row note characters they carry.
//!
//! Every row kind shares [`MusicNote`]; what a note *is* depends on the row:
//! a pitch for `N`/`Ln`, a chord symbol for `C`, a text for `A`, an accent
//! mark for `F`. Positions and lengths are in quarters, relative to the start
//! of the note's section.

use crate::frac::Frac;
use crate::model::props::MusicProps;
use crate::tokenizer::Span;
use serde::Serialize;

/// Behaviour shared by every note character type.
pub trait NoteChar: Clone + std::fmt::Debug + PartialEq + Serialize {
    /// Whether the character takes part in lyric alignment and playback.
    fn is_sounding(&self) -> bool;

    /// Text used to estimate its rendered width.
    fn display(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Accidental {
    Sharp,
    Flat,
    HalfSharp,
    Natural,
    HalfFlat,
}

impl Accidental {
    pub fn from_char(c: char) -> Option<Accidental> {
        match c {
            '#' => Some(Accidental::Sharp),
            'b' => Some(Accidental::Flat),
            '^' => Some(Accidental::HalfSharp),
            '%' => Some(Accidental::Natural),
            '$' => Some(Accidental::HalfFlat),
            _ => None,
        }
    }

    /// Pitch offset in semitones.
    pub fn semitones(&self) -> f64 {
        match self {
            Accidental::Sharp => 1.0,
            Accidental::Flat => -1.0,
            Accidental::HalfSharp => 0.5,
            Accidental::Natural => 0.0,
            Accidental::HalfFlat => -0.5,
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            Accidental::Sharp => '#',
            Accidental::Flat => 'b',
            Accidental::HalfSharp => '^',
            Accidental::Natural => '%',
            Accidental::HalfFlat => '$',
        }
    }
}

/// Major scale degrees 1..7 in semitones above the tonic.
const DEGREES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Middle C as a MIDI number; `1` without transposition sounds here.
pub const BASE_MIDI: f64 = 60.0;

/// A pitch, rest (`0`) or drum hit (`X`, `Y`, `Z`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCharMusic {
    pub char: char,
    pub accidentals: Vec<Accidental>,
    /// Octave offset from `'`/`e` (up) and `,`/`d` (down).
    pub octave: i32,
    /// Extra semitones from a `[+N]` note attribute.
    pub delta: i32,
}

impl NoteCharMusic {
    pub fn new(char: char) -> Self {
        NoteCharMusic {
            char,
            accidentals: Vec::new(),
            octave: 0,
            delta: 0,
        }
    }

    pub fn is_music_char(c: char) -> bool {
        c.is_ascii_digit() || matches!(c, 'X' | 'Y' | 'Z')
    }

    pub fn is_rest(&self) -> bool {
        self.char == '0'
    }

    pub fn is_drum(&self) -> bool {
        matches!(self.char, 'X' | 'Y' | 'Z')
    }

    /// Playback pitch as a (possibly fractional) MIDI number.
    ///
    /// `None` for rests, drum hits and the out-of-scale digits `8`/`9`.
    pub fn semitones(&self, props: &MusicProps) -> Option<f64> {
        let degree = self.char.to_digit(10)? as usize;
        if !(1..=7).contains(&degree) {
            return None;
        }
        let base = props.base.as_ref().map_or(0, |b| b.semitones());
        let accidental: f64 = self.accidentals.iter().map(Accidental::semitones).sum();
        Some(
            BASE_MIDI
                + f64::from(base)
                + f64::from(DEGREES[degree - 1])
                + f64::from(12 * self.octave)
                + f64::from(self.delta)
                + accidental
                + props.transpose,
        )
    }
}

impl NoteChar for NoteCharMusic {
    fn is_sounding(&self) -> bool {
        !self.is_rest()
    }

    fn display(&self) -> String {
        let mut s: String = self.accidentals.iter().map(Accidental::glyph).collect();
        s.push(self.char);
        s
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCharChord {
    /// Empty for a `0` placeholder.
    pub text: String,
}

impl NoteChar for NoteCharChord {
    fn is_sounding(&self) -> bool {
        !self.text.is_empty()
    }

    fn display(&self) -> String {
        self.text.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCharText {
    /// Empty for a `0` placeholder.
    pub text: String,
}

impl NoteChar for NoteCharText {
    fn is_sounding(&self) -> bool {
        !self.text.is_empty()
    }

    fn display(&self) -> String {
        self.text.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ForceKind {
    /// `>`
    Accent,
    /// `^`
    Strong,
    /// `_`
    Tenuto,
    /// `!`
    Staccatissimo,
}

impl ForceKind {
    pub fn from_char(c: char) -> Option<ForceKind> {
        match c {
            '>' => Some(ForceKind::Accent),
            '^' => Some(ForceKind::Strong),
            '_' => Some(ForceKind::Tenuto),
            '!' => Some(ForceKind::Staccatissimo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCharForce {
    /// `None` for a `0` placeholder.
    pub kind: Option<ForceKind>,
}

impl NoteChar for NoteCharForce {
    fn is_sounding(&self) -> bool {
        self.kind.is_some()
    }

    fn display(&self) -> String {
        match self.kind {
            Some(ForceKind::Accent) => ">".into(),
            Some(ForceKind::Strong) => "^".into(),
            Some(ForceKind::Tenuto) => "_".into(),
            Some(ForceKind::Staccatissimo) => "!".into(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Decorator {
    Staccato,
    Accent,
    Tenuto,
    Marcato,
    Fermata,
    Trill,
    Mordent,
    Turn,
}

impl Decorator {
    pub fn parse(text: &str) -> Option<Decorator> {
        match text {
            "." => Some(Decorator::Staccato),
            ">" => Some(Decorator::Accent),
            "-" => Some(Decorator::Tenuto),
            "^" => Some(Decorator::Marcato),
            "fm" => Some(Decorator::Fermata),
            "tr" => Some(Decorator::Trill),
            "mr" => Some(Decorator::Mordent),
            "tn" => Some(Decorator::Turn),
            _ => None,
        }
    }
}

/// What `[...]` or `[[...]]` right after a note adds to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoteAttr {
    Decorator { decorator: Decorator },
    /// `g(...)` before the note, `ga(...)` after it.
    Grace { after: bool, notes: Vec<NoteCharMusic> },
    SlideIn,
    SlideOut,
    /// `+N` / `-N` semitones.
    Delta { semitones: i32 },
    /// `[[...]]`: stacked chord tones.
    Stack { notes: Vec<NoteCharMusic> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSuffix {
    pub tie: bool,
    pub slur: bool,
    pub dots: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoteKind<T> {
    Note { char: T },
    /// A `-` continuing the previous note.
    Extend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicNote<T> {
    pub line_number: usize,
    pub range: Span,
    pub start_pos: Frac,
    pub length: Frac,
    pub attrs: Vec<NoteAttr>,
    pub suffix: NoteSuffix,
    /// Written, but does not sound on its own (tied into, or a leading `-`).
    pub voided: bool,
    #[serde(flatten)]
    pub kind: NoteKind<T>,
}

impl<T: NoteChar> MusicNote<T> {
    pub fn char(&self) -> Option<&T> {
        match &self.kind {
            NoteKind::Note { char } => Some(char),
            NoteKind::Extend => None,
        }
    }

    /// A note that sounds and can carry a lyric syllable.
    pub fn is_sounding(&self) -> bool {
        !self.voided && self.char().is_some_and(NoteChar::is_sounding)
    }

    pub fn end_pos(&self) -> Frac {
        self.start_pos + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DecorationKind {
    Tuplet,
    Tie,
    Slur,
}

/// A bracket-like mark spanning several notes.
///
/// A missing start means it continues from the previous section, a missing
/// end that it continues into the next one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decoration {
    pub kind: DecorationKind,
    pub start_pos: Option<Frac>,
    pub end_pos: Option<Frac>,
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::props::BaseTuning;

    #[test]
    fn test_semitones() {
        let mut props = MusicProps::default();
        let mut n = NoteCharMusic::new('3');
        assert_eq!(n.semitones(&props), Some(64.0));
        n.accidentals.push(Accidental::Flat);
        n.octave = 1;
        assert_eq!(n.semitones(&props), Some(75.0));
        props.base = BaseTuning::parse("D");
        props.transpose = -0.5;
        assert_eq!(n.semitones(&props), Some(76.5));
        assert_eq!(NoteCharMusic::new('0').semitones(&props), None);
        assert_eq!(NoteCharMusic::new('X').semitones(&props), None);
    }

    #[test]
    fn test_sounding() {
        assert!(!NoteCharMusic::new('0').is_sounding());
        assert!(NoteCharMusic::new('X').is_sounding());
        assert!(!NoteCharChord { text: String::new() }.is_sounding());
        assert!(NoteCharForce { kind: Some(ForceKind::Accent) }.is_sounding());
    }
}
