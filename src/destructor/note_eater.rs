//! # Note Eater
//!
//! Consumes the items of one section into timed notes.
//!
//! Items are first broken into atoms: single characters (with whether they
//! touch the previous atom), string literals and bracket pairs. The eater then
//! walks the atoms:
//!
//! - `(...)` shortens everything inside by the reduction ratio
//! - `T(...)` / `T[f,c](...)` is a tuplet (ratio `f/c`, default `2/3`),
//!   `D(...)` keeps the ratio
//! - `-` continues the previous note by one unit; at the start of a section
//!   it is a voided placeholder
//! - anything else is handed to the row's [`CharReader`], then touching
//!   suffixes are collected: `~` tie, `*` slur, `.` dot, `[...]` attributes,
//!   `[[...]]` stacked tones
//!
//! A dotted note lasts `unit * (2 - 1/2^dots)`. Swing time signatures warp
//! the finished positions of the section.
//!
//! Nesting multiplies ratios. A group whose ratio no longer fits a [`Frac`]
//! is reported as `bad_nesting` and skipped.

use super::{group_span, Source};
use crate::frac::Frac;
use crate::issue::Issues;
use crate::model::note::{
    Accidental, Decoration, DecorationKind, Decorator, ForceKind, MusicNote, NoteAttr, NoteChar, NoteCharChord,
    NoteCharForce, NoteCharMusic, NoteCharText, NoteKind, NoteSuffix,
};
use crate::model::props::MusicProps;
use crate::sparse::{trim_eof, Bracket, BracketPair, SparseItem};
use crate::tokenizer::{is_word_char, Span, TokenKind};

/// Most dots honoured on one note.
const MAX_DOTS: u32 = 8;

/// Largest factor accepted in `T[f,c]`.
const MAX_TUPLET_FACTOR: i64 = 64;

#[derive(Debug, Clone)]
pub enum Atom<'a> {
    Char { c: char, at: usize, joined: bool },
    Str { text: String, range: Span, joined: bool },
    Pair { pair: &'a BracketPair, joined: bool },
}

impl Atom<'_> {
    pub fn joined(&self) -> bool {
        match self {
            Atom::Char { joined, .. } | Atom::Str { joined, .. } | Atom::Pair { joined, .. } => *joined,
        }
    }

    pub fn range(&self) -> Span {
        match self {
            Atom::Char { at, .. } => Span::new(*at, at + 1),
            Atom::Str { range, .. } => *range,
            Atom::Pair { pair, .. } => pair.range,
        }
    }

    pub fn char(&self) -> Option<char> {
        match self {
            Atom::Char { c, .. } => Some(*c),
            _ => None,
        }
    }

    fn paren(&self) -> Option<&BracketPair> {
        match self {
            Atom::Pair { pair, .. } if pair.is(Bracket::Paren) => Some(*pair),
            _ => None,
        }
    }

    fn text(&self) -> String {
        match self {
            Atom::Char { c, .. } => c.to_string(),
            Atom::Str { text, .. } => text.clone(),
            Atom::Pair { pair, .. } => pair.text.clone(),
        }
    }
}

#[derive(Default)]
struct Atomizer<'a> {
    atoms: Vec<Atom<'a>>,
    prev_end: Option<usize>,
}

impl<'a> Atomizer<'a> {
    fn touches(&self, start: usize) -> bool {
        self.prev_end == Some(start)
    }

    fn push_item(&mut self, item: &'a SparseItem) {
        match item {
            SparseItem::Token(t) => match t.kind {
                TokenKind::Word | TokenKind::Symbol => {
                    for (k, c) in t.content.chars().enumerate() {
                        let at = t.range.start + k;
                        let joined = k > 0 || self.touches(at);
                        self.atoms.push(Atom::Char { c, at, joined });
                    }
                }
                TokenKind::StringLiteral => {
                    let joined = self.touches(t.range.start);
                    self.atoms.push(Atom::Str {
                        text: t.content.clone(),
                        range: t.range,
                        joined,
                    });
                }
                TokenKind::Comment | TokenKind::Eol | TokenKind::Eof => return,
            },
            SparseItem::Pair(pair) => {
                let joined = self.touches(pair.range.start);
                self.atoms.push(Atom::Pair { pair, joined });
            }
        }
        self.prev_end = Some(item.range().end);
    }

    fn push_comma(&mut self, at: usize) {
        let joined = self.touches(at);
        self.atoms.push(Atom::Char { c: ',', at, joined });
        self.prev_end = Some(at + 1);
    }
}

pub fn atomize<'a>(items: impl IntoIterator<Item = &'a SparseItem>) -> Vec<Atom<'a>> {
    let mut atomizer = Atomizer::default();
    for item in items {
        atomizer.push_item(item);
    }
    atomizer.atoms
}

/// Atoms inside a bracket. Commas split bracket content into groups; they
/// are put back since `,` is also the octave-down suffix.
pub fn inner_atoms(pair: &BracketPair) -> Vec<Atom<'_>> {
    let mut atomizer = Atomizer::default();
    for (gi, group) in pair.groups.iter().enumerate() {
        if gi > 0 {
            let at = pair.groups[gi - 1].last().map_or(pair.range.start, |eof| eof.range().start);
            atomizer.push_comma(at);
        }
        for item in trim_eof(group) {
            atomizer.push_item(item);
        }
    }
    atomizer.atoms
}

/// Outcome of reading a note head.
pub enum HeadRead<T> {
    /// A note char and the number of atoms it used.
    Note(T, usize),
    /// Atoms consumed after an issue was reported.
    Skip(usize),
    /// Not a note head of this row kind.
    NotMine,
}

/// Reads the note heads of one kind of row.
pub trait CharReader {
    type Char: NoteChar;

    fn read_head(&self, atoms: &[Atom<'_>], i: usize, line_number: usize, issues: &mut Issues) -> HeadRead<Self::Char>;

    /// Fold note attributes into the char.
    fn attach(&self, _char: &mut Self::Char, _attrs: &[NoteAttr]) {}
}

/// `N` and `Ln` rows: pitches, rests and drum hits.
pub struct MusicReader;

impl CharReader for MusicReader {
    type Char = NoteCharMusic;

    fn read_head(&self, atoms: &[Atom<'_>], i: usize, line_number: usize, issues: &mut Issues) -> HeadRead<NoteCharMusic> {
        let mut j = i;
        let mut accidentals = Vec::new();
        while let Some(Atom::Char { c, joined, .. }) = atoms.get(j) {
            let Some(acc) = Accidental::from_char(*c) else {
                break;
            };
            if j > i && !joined {
                break;
            }
            accidentals.push(acc);
            j += 1;
        }
        match atoms.get(j) {
            Some(Atom::Char { c, joined, .. }) if NoteCharMusic::is_music_char(*c) && (j == i || *joined) => {
                let mut char = NoteCharMusic::new(*c);
                char.accidentals = accidentals;
                j += 1;
                while let Some(Atom::Char { c, joined: true, .. }) = atoms.get(j) {
                    match *c {
                        '\'' | 'e' => char.octave += 1,
                        ',' | 'd' => char.octave -= 1,
                        _ => break,
                    }
                    j += 1;
                }
                HeadRead::Note(char, j - i)
            }
            _ if !accidentals.is_empty() => {
                let glyphs: String = accidentals.iter().map(Accidental::glyph).collect();
                issues.warn(line_number, atoms[i].range().start, "dangling_accidental", [glyphs]);
                HeadRead::Skip(j - i)
            }
            _ => HeadRead::NotMine,
        }
    }

    fn attach(&self, char: &mut NoteCharMusic, attrs: &[NoteAttr]) {
        let delta = attrs.iter().fold(0i32, |acc, a| match a {
            NoteAttr::Delta { semitones } => acc.saturating_add(*semitones),
            _ => acc,
        });
        char.delta = char.delta.saturating_add(delta);
    }
}

/// A run of touching word characters (plus `#` when `sharp` is set).
fn word_run(atoms: &[Atom<'_>], i: usize, sharp: bool) -> Option<(String, usize)> {
    let accept = |c: char| is_word_char(c) || (sharp && c == '#');
    let first = atoms.get(i)?.char().filter(|c| accept(*c))?;
    let mut text = first.to_string();
    let mut j = i + 1;
    while let Some(Atom::Char { c, joined: true, .. }) = atoms.get(j) {
        if !accept(*c) {
            break;
        }
        text.push(*c);
        j += 1;
    }
    Some((text, j - i))
}

/// `C` rows: chord symbols.
pub struct ChordReader;

impl CharReader for ChordReader {
    type Char = NoteCharChord;

    fn read_head(&self, atoms: &[Atom<'_>], i: usize, _: usize, _: &mut Issues) -> HeadRead<NoteCharChord> {
        if let Some(Atom::Str { text, .. }) = atoms.get(i) {
            return HeadRead::Note(NoteCharChord { text: text.clone() }, 1);
        }
        match word_run(atoms, i, true) {
            Some((text, n)) if text == "0" => HeadRead::Note(NoteCharChord { text: String::new() }, n),
            Some((text, n)) => HeadRead::Note(NoteCharChord { text }, n),
            None => HeadRead::NotMine,
        }
    }
}

/// `A` rows: free text.
pub struct TextReader;

impl CharReader for TextReader {
    type Char = NoteCharText;

    fn read_head(&self, atoms: &[Atom<'_>], i: usize, _: usize, _: &mut Issues) -> HeadRead<NoteCharText> {
        if let Some(Atom::Str { text, .. }) = atoms.get(i) {
            return HeadRead::Note(NoteCharText { text: text.clone() }, 1);
        }
        match word_run(atoms, i, false) {
            Some((text, n)) if text == "0" => HeadRead::Note(NoteCharText { text: String::new() }, n),
            Some((text, n)) => HeadRead::Note(NoteCharText { text }, n),
            None => HeadRead::NotMine,
        }
    }
}

/// `F` rows: accent marks.
pub struct ForceReader;

impl CharReader for ForceReader {
    type Char = NoteCharForce;

    fn read_head(&self, atoms: &[Atom<'_>], i: usize, _: usize, _: &mut Issues) -> HeadRead<NoteCharForce> {
        match atoms.get(i).and_then(Atom::char) {
            Some('0') => HeadRead::Note(NoteCharForce { kind: None }, 1),
            Some(c) => match ForceKind::from_char(c) {
                Some(kind) => HeadRead::Note(NoteCharForce { kind: Some(kind) }, 1),
                None => HeadRead::NotMine,
            },
            None => HeadRead::NotMine,
        }
    }
}

/// Notes of one section.
#[derive(Debug, Clone)]
pub struct Eaten<T> {
    pub notes: Vec<MusicNote<T>>,
    pub decorations: Vec<Decoration>,
    /// Written length in quarters.
    pub total: Frac,
    /// Start of the last note.
    pub last_pos: Frac,
}

pub struct NoteEater<'r, R> {
    reader: &'r R,
    source: &'r Source,
    props: &'r MusicProps,
    line_number: usize,
}

impl<'r, R: CharReader> NoteEater<'r, R> {
    pub fn new(reader: &'r R, source: &'r Source, props: &'r MusicProps, line_number: usize) -> Self {
        NoteEater {
            reader,
            source,
            props,
            line_number,
        }
    }

    pub fn eat(&self, items: &[&SparseItem], issues: &mut Issues) -> Eaten<R::Char> {
        let atoms = atomize(items.iter().copied());
        let mut out = Eaten {
            notes: Vec::new(),
            decorations: Vec::new(),
            total: Frac::zero(),
            last_pos: Frac::zero(),
        };
        out.total = self.eat_atoms(&atoms, Frac::one(), Frac::zero(), &mut out, issues);
        if let Some(period) = self.props.beats.as_ref().and_then(|b| b.swing.period()) {
            swing(&mut out, period);
        }
        out.last_pos = out.notes.iter().map(|n| n.start_pos).max().unwrap_or_else(Frac::zero);
        out
    }

    /// Eat `atoms` from `start` at `ratio`; returns the end position.
    fn eat_atoms(&self, atoms: &[Atom<'_>], ratio: Frac, start: Frac, out: &mut Eaten<R::Char>, issues: &mut Issues) -> Frac {
        let unit = self.props.unit() * ratio;
        let mut pos = start;
        let mut i = 0;
        while i < atoms.len() {
            let atom = &atoms[i];
            if let Some((consumed, end)) = self.try_tuplet(atoms, i, ratio, pos, out, issues) {
                pos = end;
                i += consumed;
                continue;
            }
            match atom {
                Atom::Char { c: '-', at, .. } => {
                    out.notes.push(MusicNote {
                        line_number: self.line_number,
                        range: Span::new(*at, at + 1),
                        start_pos: pos,
                        length: unit,
                        attrs: Vec::new(),
                        suffix: NoteSuffix::default(),
                        voided: out.notes.is_empty(),
                        kind: NoteKind::Extend,
                    });
                    pos += unit;
                    i += 1;
                }
                Atom::Pair { pair, .. } if pair.is(Bracket::Paren) => {
                    let reduced = ratio * self.props.reduction;
                    if reduced.is_indeterminate() {
                        issues.warn(self.line_number, pair.range.start, "bad_nesting", [&pair.text]);
                    } else {
                        pos = self.eat_atoms(&inner_atoms(pair), reduced, pos, out, issues);
                    }
                    i += 1;
                }
                Atom::Pair { pair, .. } => {
                    issues.warn(self.line_number, pair.range.start, "unknown_note_token", [&pair.text]);
                    i += 1;
                }
                Atom::Char { c, at, .. } if matches!(*c, '~' | '*' | '.') => {
                    issues.warn(self.line_number, *at, "dangling_suffix", [c]);
                    i += 1;
                }
                _ => match self.reader.read_head(atoms, i, self.line_number, issues) {
                    HeadRead::Note(char, used) => {
                        let (next, length) = self.finish_note(char, atoms, i, used, pos, unit, out, issues);
                        pos += length;
                        i = next;
                    }
                    HeadRead::Skip(used) => i += used.max(1),
                    HeadRead::NotMine => {
                        issues.warn(self.line_number, atom.range().start, "unknown_note_char", [atom.text()]);
                        i += 1;
                    }
                },
            }
        }
        pos
    }

    /// `T(...)`, `T[f,c](...)` or `D(...)` at `i`: atoms used and end position.
    fn try_tuplet(
        &self,
        atoms: &[Atom<'_>],
        i: usize,
        ratio: Frac,
        pos: Frac,
        out: &mut Eaten<R::Char>,
        issues: &mut Issues,
    ) -> Option<(usize, Frac)> {
        let prefix = atoms[i].char().filter(|c| matches!(*c, 'T' | 'D'))?;
        let next = atoms.get(i + 1).filter(|a| a.joined())?;
        let (descriptor, paren, used) = match next {
            Atom::Pair { pair, .. } if prefix == 'T' && pair.is(Bracket::Square) => {
                let paren = atoms.get(i + 2).filter(|a| a.joined())?.paren()?;
                (Some(*pair), paren, 3)
            }
            other => (None, other.paren()?, 2),
        };

        let inner = inner_atoms(paren);
        if prefix == 'D' {
            let end = self.eat_atoms(&inner, ratio, pos, out, issues);
            return Some((used, end));
        }

        let (f, c) = match descriptor {
            Some(d) => parse_tuplet(d).unwrap_or_else(|| {
                issues.warn(self.line_number, d.range.start, "bad_triplet", [&d.text]);
                (2, 3)
            }),
            None => (2, 3),
        };
        let tuplet_ratio = ratio * Frac::new(f, c);
        if tuplet_ratio.is_indeterminate() {
            issues.warn(self.line_number, paren.range.start, "bad_nesting", [&paren.text]);
            return Some((used, pos));
        }
        let end = self.eat_atoms(&inner, tuplet_ratio, pos, out, issues);
        // Written slots inside the group, counted at the tuplet's unit.
        let slots = (end - pos) / (self.props.unit() * tuplet_ratio);
        let label = if slots == Frac::from_int(c) {
            c.to_string()
        } else {
            format!("{}:{}", c, f)
        };
        out.decorations.push(Decoration {
            kind: DecorationKind::Tuplet,
            start_pos: Some(pos),
            end_pos: Some(end),
            label: Some(label),
        });
        Some((used, end))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_note(
        &self,
        mut char: R::Char,
        atoms: &[Atom<'_>],
        i: usize,
        used: usize,
        pos: Frac,
        unit: Frac,
        out: &mut Eaten<R::Char>,
        issues: &mut Issues,
    ) -> (usize, Frac) {
        let mut j = i + used;
        let mut suffix = NoteSuffix::default();
        let mut attrs = Vec::new();
        while let Some(atom) = atoms.get(j).filter(|a| a.joined()) {
            match atom {
                Atom::Char { c: '~', .. } => suffix.tie = true,
                Atom::Char { c: '*', .. } => suffix.slur = true,
                Atom::Char { c: '.', .. } => suffix.dots += 1,
                Atom::Pair { pair, .. } if pair.is(Bracket::Square) => {
                    attrs.extend(parse_note_attrs(pair, self.source, self.line_number, issues))
                }
                Atom::Pair { pair, .. } if pair.is(Bracket::DoubleSquare) => attrs.push(NoteAttr::Stack {
                    notes: pair
                        .groups
                        .iter()
                        .flat_map(|g| music_heads(&atomize(trim_eof(g)), self.line_number, issues))
                        .collect(),
                }),
                _ => break,
            }
            j += 1;
        }
        self.reader.attach(&mut char, &attrs);

        let dots = suffix.dots.min(MAX_DOTS);
        let length = unit * Frac::new((1 << (dots + 1)) - 1, 1 << dots);
        let range = atoms[i].range().join(&atoms[j - 1].range());
        out.notes.push(MusicNote {
            line_number: self.line_number,
            range,
            start_pos: pos,
            length,
            attrs,
            suffix,
            voided: false,
            kind: NoteKind::Note { char },
        });
        (j, length)
    }
}

/// `[f, c]` with two integers in `1..=MAX_TUPLET_FACTOR`.
fn parse_tuplet(pair: &BracketPair) -> Option<(i64, i64)> {
    let values: Vec<i64> = pair
        .non_empty_groups()
        .map(|g| match g {
            [SparseItem::Token(t)] => t
                .content
                .parse::<i64>()
                .ok()
                .filter(|v| (1..=MAX_TUPLET_FACTOR).contains(v)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    match values.as_slice() {
        [f, c] => Some((*f, *c)),
        _ => None,
    }
}

/// Read plain music heads, e.g. grace notes or stacked tones.
fn music_heads(atoms: &[Atom<'_>], line_number: usize, issues: &mut Issues) -> Vec<NoteCharMusic> {
    let mut heads = Vec::new();
    let mut i = 0;
    while i < atoms.len() {
        match MusicReader.read_head(atoms, i, line_number, issues) {
            HeadRead::Note(char, used) => {
                heads.push(char);
                i += used;
            }
            HeadRead::Skip(used) => i += used.max(1),
            HeadRead::NotMine => {
                // Commas between groups are not octave marks here.
                if atoms[i].char() != Some(',') {
                    issues.warn(line_number, atoms[i].range().start, "unknown_note_char", [atoms[i].text()]);
                }
                i += 1;
            }
        }
    }
    heads
}

/// The comma-separated items of `[...]` after a note.
fn parse_note_attrs(pair: &BracketPair, source: &Source, line_number: usize, issues: &mut Issues) -> Vec<NoteAttr> {
    let mut attrs = Vec::new();
    for group in pair.non_empty_groups() {
        if let [SparseItem::Token(head), SparseItem::Pair(inner)] = group {
            if matches!(head.content.as_str(), "g" | "ga") && inner.is(Bracket::Paren) {
                attrs.push(NoteAttr::Grace {
                    after: head.content == "ga",
                    notes: music_heads(&inner_atoms(inner), line_number, issues),
                });
                continue;
            }
        }
        let Some(span) = group_span(group) else {
            continue;
        };
        let text = source.slice(span);
        let attr = match text.as_str() {
            "/" => Some(NoteAttr::SlideIn),
            "\\" => Some(NoteAttr::SlideOut),
            t => Decorator::parse(t)
                .map(|decorator| NoteAttr::Decorator { decorator })
                .or_else(|| parse_delta(t).map(|semitones| NoteAttr::Delta { semitones })),
        };
        match attr {
            Some(a) => attrs.push(a),
            None => issues.warn(line_number, span.start, "unknown_note_attr", [text]),
        }
    }
    attrs
}

fn parse_delta(text: &str) -> Option<i32> {
    let digits = text.strip_prefix('+').or_else(|| text.strip_prefix('-'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i32 = digits.parse().ok()?;
    Some(if text.starts_with('-') { -value } else { value })
}

/// Swing warp over one period: the first half stretches to 2/3.
fn warp(x: Frac, period: Frac) -> Frac {
    let k = Frac::from_int((x / period).floor());
    let base = period * k;
    let r = x - base;
    let half = period * Frac::new(1, 2);
    let warped = if r <= half {
        r * Frac::new(4, 3)
    } else {
        period * Frac::new(2, 3) + (r - half) * Frac::new(2, 3)
    };
    base + warped
}

fn swing<T>(out: &mut Eaten<T>, period: Frac) {
    for note in &mut out.notes {
        let start = warp(note.start_pos, period);
        let end = warp(note.start_pos + note.length, period);
        note.start_pos = start;
        note.length = end - start;
    }
    for deco in &mut out.decorations {
        deco.start_pos = deco.start_pos.map(|p| warp(p, period));
        deco.end_pos = deco.end_pos.map(|p| warp(p, period));
    }
}
