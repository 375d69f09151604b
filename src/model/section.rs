//! Sections (measures), the separators between them, and separator attributes.

use crate::frac::Frac;
use crate::model::note::{Decoration, MusicNote, NoteChar};
use crate::model::props::{BaseTuning, Beats, MusicProps, Qpm};
use crate::tokenizer::Span;
use serde::Serialize;

/// The twelve legal separator glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SeparatorChar {
    #[serde(rename = "/")]
    Slash,
    #[serde(rename = "|")]
    Bar,
    #[serde(rename = "||")]
    Double,
    #[serde(rename = "|||")]
    Terminal,
    #[serde(rename = "||:")]
    RepeatStart,
    #[serde(rename = ":||")]
    RepeatEnd,
    #[serde(rename = ":||:")]
    RepeatBoth,
    #[serde(rename = "/|")]
    SlashBar,
    #[serde(rename = "/||")]
    SlashDouble,
    #[serde(rename = "/|||")]
    SlashTerminal,
    #[serde(rename = "/||:")]
    SlashRepeatStart,
    #[serde(rename = ":/||")]
    SlashRepeatEnd,
}

struct GlyphDef {
    char: SeparatorChar,
    glyph: &'static str,
    begin_ok: bool,
    end_ok: bool,
    after: SeparatorChar,
    before: SeparatorChar,
}

use SeparatorChar as S;

static GLYPHS: &[GlyphDef] = &[
    GlyphDef { char: S::Slash, glyph: "/", begin_ok: true, end_ok: true, after: S::Slash, before: S::Slash },
    GlyphDef { char: S::Bar, glyph: "|", begin_ok: true, end_ok: true, after: S::Bar, before: S::Slash },
    GlyphDef { char: S::Double, glyph: "||", begin_ok: true, end_ok: true, after: S::Double, before: S::Slash },
    GlyphDef { char: S::Terminal, glyph: "|||", begin_ok: false, end_ok: true, after: S::Terminal, before: S::Slash },
    GlyphDef { char: S::RepeatStart, glyph: "||:", begin_ok: true, end_ok: false, after: S::Double, before: S::RepeatStart },
    GlyphDef { char: S::RepeatEnd, glyph: ":||", begin_ok: false, end_ok: true, after: S::RepeatEnd, before: S::Slash },
    GlyphDef { char: S::RepeatBoth, glyph: ":||:", begin_ok: false, end_ok: false, after: S::RepeatEnd, before: S::RepeatStart },
    GlyphDef { char: S::SlashBar, glyph: "/|", begin_ok: true, end_ok: true, after: S::SlashBar, before: S::Slash },
    GlyphDef { char: S::SlashDouble, glyph: "/||", begin_ok: true, end_ok: true, after: S::SlashDouble, before: S::Slash },
    GlyphDef { char: S::SlashTerminal, glyph: "/|||", begin_ok: false, end_ok: true, after: S::SlashTerminal, before: S::Slash },
    GlyphDef { char: S::SlashRepeatStart, glyph: "/||:", begin_ok: true, end_ok: false, after: S::SlashDouble, before: S::RepeatStart },
    GlyphDef { char: S::SlashRepeatEnd, glyph: ":/||", begin_ok: false, end_ok: true, after: S::SlashRepeatEnd, before: S::Slash },
];

impl SeparatorChar {
    fn def(&self) -> &'static GlyphDef {
        // One entry per variant, in declaration order.
        &GLYPHS[*self as usize]
    }

    pub fn parse(glyph: &str) -> Option<SeparatorChar> {
        GLYPHS.iter().find(|g| g.glyph == glyph).map(|g| g.char)
    }

    pub fn glyph(&self) -> &'static str {
        self.def().glyph
    }

    pub fn begin_ok(&self) -> bool {
        self.def().begin_ok
    }

    pub fn end_ok(&self) -> bool {
        self.def().end_ok
    }

    /// Form drawn at the end of a rendered line.
    pub fn after(&self) -> SeparatorChar {
        self.def().after
    }

    /// Form drawn at the start of the next rendered line.
    pub fn before(&self) -> SeparatorChar {
        self.def().before
    }

    pub fn is_repeat_start(&self) -> bool {
        matches!(self, S::RepeatStart | S::RepeatBoth | S::SlashRepeatStart)
    }

    pub fn is_repeat_end(&self) -> bool {
        matches!(self, S::RepeatEnd | S::RepeatBoth | S::SlashRepeatEnd)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, S::Terminal | S::SlashTerminal)
    }

    /// The section before it is not held to the time signature.
    pub fn is_unconstrained(&self) -> bool {
        self.glyph().contains('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JumpKind {
    /// `D.S.`
    DalSegno,
    /// `D.C.`
    DaCapo,
    /// `Fine.`
    Fine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Shift {
    Transpose { semitones: f64 },
    Tuning { base: BaseTuning },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SeparatorAttr {
    Label { text: String },
    Beats { beats: Beats },
    Qpm { qpm: Qpm },
    Shift { shift: Shift },
    Weight { weight: f64 },
    Reset,
    /// `N` / `N.`: applies on the N-th pass.
    Iter { number: u32 },
    /// `xN`: repeat N times.
    Times { count: u32 },
    Jump { jump: JumpKind },
    /// `$`
    Segno,
    /// `@`
    Portal,
}

/// Where an attribute group sits around the separator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttrSlot {
    /// `{...}` right before the run.
    Pre,
    /// `[...]` right after the run.
    Own,
    /// `{...}` after the own slot.
    Post,
}

impl SeparatorAttr {
    pub fn name(&self) -> &'static str {
        match self {
            SeparatorAttr::Label { .. } => "label",
            SeparatorAttr::Beats { .. } => "beats",
            SeparatorAttr::Qpm { .. } => "qpm",
            SeparatorAttr::Shift { .. } => "shift",
            SeparatorAttr::Weight { .. } => "weight",
            SeparatorAttr::Reset => "reset",
            SeparatorAttr::Iter { .. } => "iter",
            SeparatorAttr::Times { .. } => "times",
            SeparatorAttr::Jump { .. } => "jump",
            SeparatorAttr::Segno => "segno",
            SeparatorAttr::Portal => "portal",
        }
    }

    pub fn allowed_in(&self, slot: AttrSlot) -> bool {
        use AttrSlot::*;
        match self {
            SeparatorAttr::Label { .. } => true,
            SeparatorAttr::Jump { .. } => matches!(slot, Pre | Own),
            SeparatorAttr::Segno | SeparatorAttr::Portal => matches!(slot, Own | Post),
            _ => slot == Own,
        }
    }

    /// The own-slot form makes no sense on the first separator of a row.
    pub fn forbidden_at_begin(&self) -> bool {
        matches!(
            self,
            SeparatorAttr::Iter { .. } | SeparatorAttr::Times { .. } | SeparatorAttr::Jump { .. }
        )
    }

    /// The own-slot form makes no sense on the last separator of a row.
    pub fn forbidden_at_end(&self) -> bool {
        matches!(
            self,
            SeparatorAttr::Beats { .. }
                | SeparatorAttr::Qpm { .. }
                | SeparatorAttr::Shift { .. }
                | SeparatorAttr::Weight { .. }
                | SeparatorAttr::Reset
                | SeparatorAttr::Segno
                | SeparatorAttr::Portal
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparatorAttrs {
    pub pre: Vec<SeparatorAttr>,
    #[serde(rename = "self")]
    pub own: Vec<SeparatorAttr>,
    pub post: Vec<SeparatorAttr>,
}

impl SeparatorAttrs {
    pub fn all(&self) -> impl Iterator<Item = &SeparatorAttr> {
        self.pre.iter().chain(&self.own).chain(&self.post)
    }

    pub fn iterations(&self) -> Vec<u32> {
        self.own
            .iter()
            .filter_map(|a| match a {
                SeparatorAttr::Iter { number } => Some(*number),
                _ => None,
            })
            .collect()
    }

    pub fn times(&self) -> Option<u32> {
        self.own.iter().find_map(|a| match a {
            SeparatorAttr::Times { count } => Some(*count),
            _ => None,
        })
    }

    pub fn jump(&self) -> Option<JumpKind> {
        self.pre.iter().chain(&self.own).find_map(|a| match a {
            SeparatorAttr::Jump { jump } => Some(*jump),
            _ => None,
        })
    }

    pub fn has_segno(&self) -> bool {
        self.all().any(|a| matches!(a, SeparatorAttr::Segno))
    }

    pub fn has_portal(&self) -> bool {
        self.all().any(|a| matches!(a, SeparatorAttr::Portal))
    }

    pub fn has_reset(&self) -> bool {
        self.own.iter().any(|a| matches!(a, SeparatorAttr::Reset))
    }

    pub fn weight(&self) -> Option<f64> {
        self.own.iter().find_map(|a| match a {
            SeparatorAttr::Weight { weight } => Some(*weight),
            _ => None,
        })
    }
}

/// One separator occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSeparator {
    pub char: SeparatorChar,
    pub attrs: SeparatorAttrs,
    /// Empty for the virtual separator synthesized at a row edge.
    pub range: Span,
}

impl SectionSeparator {
    pub fn virtual_at(at: usize) -> Self {
        SectionSeparator {
            char: SeparatorChar::Slash,
            attrs: SeparatorAttrs::default(),
            range: Span::empty_at(at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSeparators {
    pub before: SectionSeparator,
    pub after: SectionSeparator,
    /// How the next line opens if the line breaks after this section.
    pub next: SeparatorChar,
}

/// Length a section must have under `props`, or `None` when the section is
/// held to nothing (no time signature, or a `/` separator after it).
pub fn constrained_length(props: &MusicProps, after: SeparatorChar) -> Option<Frac> {
    if after.is_unconstrained() {
        return None;
    }
    props.beats.as_ref().map(Beats::section_quarters)
}

/// Back-reference from any copy of a section to its source slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdCard {
    pub line_number: usize,
    /// Position of the section within its row.
    pub index: usize,
    pub uuid: String,
}

impl IdCard {
    pub fn new(line_number: usize, index: usize) -> Self {
        IdCard {
            line_number,
            index,
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionValidation {
    Ok,
    Less,
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureValidation {
    /// Played twice within one iteration.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionContent<T> {
    pub notes: Vec<MusicNote<T>>,
    pub decoration: Vec<Decoration>,
    /// Written length in quarters.
    pub total_quarters: Frac,
    pub validation: SectionValidation,
    /// A tie or slur comes in from the previous section.
    pub left_split: bool,
    /// The first note is voided by a tie from the previous section.
    pub left_split_void: bool,
    /// A tie or slur continues into the next section.
    pub right_split: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SectionBody<T> {
    Section(SectionContent<T>),
    /// `...N`; `count: None` omits to the end of the fragment.
    Omit { count: Option<usize> },
    Empty,
    /// Placeholder where a voice has no section at this index.
    Nullish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicSection<T> {
    pub id_card: IdCard,
    pub range: Span,
    /// Global section index within the article.
    pub ordinal: usize,
    pub start_pos: Frac,
    pub separator: SectionSeparators,
    pub musical_props: MusicProps,
    pub structure_validation: Option<StructureValidation>,
    pub body: SectionBody<T>,
}

impl<T: NoteChar> MusicSection<T> {
    pub fn content(&self) -> Option<&SectionContent<T>> {
        match &self.body {
            SectionBody::Section(c) => Some(c),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut SectionContent<T>> {
        match &mut self.body {
            SectionBody::Section(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self.body, SectionBody::Nullish)
    }

    pub fn notes(&self) -> &[MusicNote<T>] {
        self.content().map_or(&[], |c| c.notes.as_slice())
    }

    /// Placeholder standing where a voice is silent.
    pub fn nullish(line_number: usize, props: MusicProps) -> Self {
        MusicSection {
            id_card: IdCard::new(line_number, 0),
            range: Span::default(),
            ordinal: 0,
            start_pos: Frac::zero(),
            separator: SectionSeparators {
                before: SectionSeparator::virtual_at(0),
                after: SectionSeparator::virtual_at(0),
                next: SeparatorChar::Slash,
            },
            musical_props: props,
            structure_validation: None,
            body: SectionBody::Nullish,
        }
    }

    /// Same slot and props, different body. Used for omit expansion.
    pub fn with_body(&self, body: SectionBody<T>) -> Self {
        MusicSection {
            id_card: self.id_card.clone(),
            range: self.range,
            ordinal: self.ordinal,
            start_pos: self.start_pos,
            separator: self.separator.clone(),
            musical_props: self.musical_props.clone(),
            structure_validation: self.structure_validation,
            body,
        }
    }

    /// Convert the note characters, keeping everything else.
    pub fn map_chars<U, F: Fn(&T) -> U>(&self, f: F) -> MusicSection<U> {
        use crate::model::note::NoteKind;
        let body = match &self.body {
            SectionBody::Section(c) => SectionBody::Section(SectionContent {
                notes: c
                    .notes
                    .iter()
                    .map(|n| MusicNote {
                        line_number: n.line_number,
                        range: n.range,
                        start_pos: n.start_pos,
                        length: n.length,
                        attrs: n.attrs.clone(),
                        suffix: n.suffix.clone(),
                        voided: n.voided,
                        kind: match &n.kind {
                            NoteKind::Note { char } => NoteKind::Note { char: f(char) },
                            NoteKind::Extend => NoteKind::Extend,
                        },
                    })
                    .collect(),
                decoration: c.decoration.clone(),
                total_quarters: c.total_quarters,
                validation: c.validation,
                left_split: c.left_split,
                left_split_void: c.left_split_void,
                right_split: c.right_split,
            }),
            SectionBody::Omit { count } => SectionBody::Omit { count: *count },
            SectionBody::Empty => SectionBody::Empty,
            SectionBody::Nullish => SectionBody::Nullish,
        };
        MusicSection {
            id_card: self.id_card.clone(),
            range: self.range,
            ordinal: self.ordinal,
            start_pos: self.start_pos,
            separator: self.separator.clone(),
            musical_props: self.musical_props.clone(),
            structure_validation: self.structure_validation,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyph_table_order() {
        for g in GLYPHS {
            assert_eq!(g.char.glyph(), g.glyph);
            assert_eq!(SeparatorChar::parse(g.glyph), Some(g.char));
        }
        assert_eq!(SeparatorChar::parse("::"), None);
    }

    #[test]
    fn test_line_edge_forms() {
        assert_eq!(SeparatorChar::RepeatBoth.after(), SeparatorChar::RepeatEnd);
        assert_eq!(SeparatorChar::RepeatBoth.before(), SeparatorChar::RepeatStart);
        assert_eq!(SeparatorChar::Bar.before(), SeparatorChar::Slash);
        assert!(!SeparatorChar::Terminal.begin_ok());
        assert!(!SeparatorChar::RepeatStart.end_ok());
    }

    #[test]
    fn test_unconstrained() {
        assert!(SeparatorChar::SlashBar.is_unconstrained());
        assert!(SeparatorChar::SlashRepeatEnd.is_unconstrained());
        assert!(!SeparatorChar::RepeatEnd.is_unconstrained());
    }

    #[test]
    fn test_attr_slots() {
        let jump = SeparatorAttr::Jump { jump: JumpKind::DaCapo };
        assert!(jump.allowed_in(AttrSlot::Pre));
        assert!(!jump.allowed_in(AttrSlot::Post));
        assert!(jump.forbidden_at_begin());
        assert!(SeparatorAttr::Segno.allowed_in(AttrSlot::Post));
        assert!(SeparatorAttr::Segno.forbidden_at_end());
        assert!(!SeparatorAttr::Reset.allowed_in(AttrSlot::Pre));
    }
}
