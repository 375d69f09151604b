//! # Score Model
//!
//! Typed data shared by the later pipeline stages: musical and render
//! properties, notes, sections with their separators, lyrics and jumpers.
//!
//! Every type here is build-once. Stages produce new values instead of
//! mutating ones they received, and everything serializes with camelCase
//! field names for consumers of the JSON output.

pub mod jumper;
pub mod lyric;
pub mod note;
pub mod props;
pub mod render;
pub mod section;

pub use jumper::Jumper;
pub use lyric::{LyricChar, LyricNote, LyricNoteContent, LyricToken};
pub use note::{
    Accidental, Decoration, DecorationKind, MusicNote, NoteAttr, NoteChar, NoteCharChord, NoteCharForce,
    NoteCharMusic, NoteCharText, NoteKind, NoteSuffix,
};
pub use props::{BaseTuning, Beats, MusicProps, MusicPropsPatch, Qpm, Swing};
pub use render::RenderProps;
pub use section::{
    IdCard, MusicSection, SectionBody, SectionContent, SectionSeparator, SectionSeparators, SectionValidation,
    SeparatorAttr, SeparatorAttrs, SeparatorChar,
};
