//! # Column Stater
//!
//! Turns the destructed tree into render-ready articles.
//!
//! ## Stages
//! Each music article goes through five steps:
//!
//! 1. [`flatten`]: the note rows of all fragments are laid end to end, one
//!    timeline per voice. A voice is recognized across fragments by its
//!    signature (its tags plus how many earlier voices of the fragment carry
//!    the same tags). Where a voice is silent it gets `nullish` sections.
//! 2. [`flatten::allocate`]: every global section index gets a start time
//!    and a measure number shared by all voices.
//! 3. [`interlink`]: ties and slurs are resolved across section boundaries.
//! 4. [`lyrics`]: lyric lines are merged like voices and their syllables
//!    are placed under the sounding notes.
//! 5. [`linify`]: the article is cut into rendered lines.
//!
//! The sequencer runs between steps 4 and 5 so that conflicts it finds show
//! up on the rendered sections; [`ColumnStater::state`] runs all five steps
//! without it.

pub mod flatten;
pub mod interlink;
pub mod linify;
pub mod lyrics;

#[cfg(test)]
mod tests;

use crate::commands::Command;
use crate::destructor::{DestructedLine, LineContent};
use crate::error::NmnError;
use crate::frac::Frac;
use crate::issue::Issues;
use crate::layout::{SectionLayout, TextMeasure};
use crate::line_tree::LineTree;
use crate::model::jumper::Jumper;
use crate::model::lyric::{LyricNote, LyricToken};
use crate::model::note::{NoteCharChord, NoteCharForce, NoteCharMusic, NoteCharText};
use crate::model::render::RenderProps;
use crate::model::section::{MusicSection, StructureValidation};
use serde::Serialize;

/// The whole compiled score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDocument {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub prescripts: Vec<String>,
    pub authors: Vec<String>,
    pub footnotes: Vec<String>,
    pub render_props: RenderProps,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Article {
    Music(MusicArticle),
    Text(TextArticle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextArticle {
    pub line_number: usize,
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicArticle {
    pub line_number: usize,
    pub title: Option<String>,
    pub render_props: RenderProps,
    pub columns: Vec<Column>,
    pub jumpers: Vec<Jumper>,
    pub lines: Vec<RenderLine>,
}

/// One global section index of an article, shared by all voices.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub index: usize,
    /// Printed measure number. Does not advance across a `/` separator.
    pub measure_number: usize,
    pub start_pos: Frac,
    pub quarters: Frac,
    /// Share of the line width, from a `w=` separator attribute.
    pub weight: f64,
}

/// A music article with every voice on the global section axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatArticle {
    pub line_number: usize,
    pub title: Option<String>,
    pub render_props: RenderProps,
    pub columns: Vec<Column>,
    pub parts: Vec<FlatPart>,
    pub jumpers: Vec<Jumper>,
    /// Fragments in order; each one starts a new rendered line.
    pub fragments: Vec<FragmentSpan>,
}

/// Global section range of one fragment and the render props in effect there.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSpan {
    pub line_number: usize,
    pub start: usize,
    pub end: usize,
    pub render_props: RenderProps,
}

impl FlatArticle {
    pub fn section_count(&self) -> usize {
        self.columns.len()
    }

    /// Flag every voice's section at `index` as played twice in one pass.
    pub fn mark_conflict(&mut self, index: usize) {
        for part in &mut self.parts {
            if let Some(section) = part.notes.get_mut(index) {
                section.structure_validation = Some(StructureValidation::Conflict);
            }
            for line in &mut part.lyric_lines {
                if let Some(section) = line.substitute.as_mut().and_then(|s| s.get_mut(index)) {
                    section.structure_validation = Some(StructureValidation::Conflict);
                }
            }
        }
    }
}

/// One voice across the whole article.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPart {
    pub signature: String,
    pub tags: Vec<String>,
    pub notes: Vec<MusicSection<NoteCharMusic>>,
    pub chords: Vec<Vec<MusicSection<NoteCharChord>>>,
    pub annotations: Vec<Vec<MusicSection<NoteCharText>>>,
    pub forces: Vec<Vec<MusicSection<NoteCharForce>>>,
    pub lyric_lines: Vec<FlatLyricLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatLyricLine {
    pub signature: String,
    pub tags: Vec<String>,
    /// Passes this line is sung on; empty means all.
    pub passes: Vec<u32>,
    pub label: Option<String>,
    /// `Ln` melody, when any fragment gives this line its own notes.
    pub substitute: Option<Vec<MusicSection<NoteCharMusic>>>,
    /// Syllables per global section index.
    pub lyrics: Vec<Vec<LyricNote>>,
    /// Syllable streams per fragment, consumed by the lyric stage.
    #[serde(skip)]
    pub pending: Vec<PendingLyrics>,
}

/// Lyric tokens written for one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLyrics {
    pub line_number: usize,
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<LyricToken>,
}

/// One rendered line of an article.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderLine {
    /// First global section index.
    pub start: usize,
    /// One past the last.
    pub end: usize,
    pub columns: Vec<Column>,
    pub parts: Vec<LinePart>,
    pub layout: Vec<SectionLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinePart {
    pub signature: String,
    pub tags: Vec<String>,
    pub notes: Vec<MusicSection<NoteCharMusic>>,
    pub chords: Vec<Vec<MusicSection<NoteCharChord>>>,
    pub annotations: Vec<Vec<MusicSection<NoteCharText>>>,
    pub forces: Vec<Vec<MusicSection<NoteCharForce>>>,
    pub lyric_lines: Vec<LineLyrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLyrics {
    pub signature: String,
    pub tags: Vec<String>,
    pub label: Option<String>,
    pub substitute: Option<Vec<MusicSection<NoteCharMusic>>>,
    pub lyrics: Vec<Vec<LyricNote>>,
}

/// An article after flattening, before it is cut into lines.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatEntry {
    Music(FlatArticle),
    Text(TextArticle),
}

/// Document metadata and its flattened articles.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatDocument {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub prescripts: Vec<String>,
    pub authors: Vec<String>,
    pub footnotes: Vec<String>,
    pub render_props: RenderProps,
    pub articles: Vec<FlatEntry>,
}

pub struct ColumnStater;

impl ColumnStater {
    /// All five stages.
    pub fn state<M: TextMeasure>(
        doc: &LineTree<DestructedLine>,
        defaults: &RenderProps,
        measure: &M,
        issues: &mut Issues,
    ) -> Result<ScoreDocument, NmnError> {
        let flat = Self::flatten(doc, defaults, issues)?;
        Ok(Self::linify(flat, measure))
    }

    /// Stages one to four. `defaults` sit underneath the document's `Rp`.
    pub fn flatten(
        doc: &LineTree<DestructedLine>,
        defaults: &RenderProps,
        issues: &mut Issues,
    ) -> Result<FlatDocument, NmnError> {
        if doc.level != 0 {
            return Err(NmnError::Internal {
                stage: "column stater",
                message: format!("expected a document node, got level {}", doc.level),
            });
        }
        let render_props = defaults.overlay(&render_props_of(doc));
        let mut articles = Vec::with_capacity(doc.children.len());
        for article in &doc.children {
            if article.level != 1 {
                return Err(NmnError::Internal {
                    stage: "column stater",
                    message: format!("expected an article node, got level {}", article.level),
                });
            }
            let entry = if is_text_article(article) {
                FlatEntry::Text(text_article(article))
            } else {
                let mut flat = flatten::flatten_article(article, &render_props, issues)?;
                flatten::allocate(&mut flat);
                interlink::interlink(&mut flat, issues);
                lyrics::place_lyrics(&mut flat, issues);
                FlatEntry::Music(flat)
            };
            articles.push(entry);
        }
        log::debug!("flattened {} articles", articles.len());
        Ok(FlatDocument {
            title: text_of(doc, "Dt"),
            subtitle: text_of(doc, "Ds"),
            prescripts: texts_of(doc, Command::Prescript),
            authors: texts_of(doc, Command::Author),
            footnotes: texts_of(doc, Command::Footnote),
            render_props,
            articles,
        })
    }

    /// Stage five: cut music articles into laid-out lines.
    pub fn linify<M: TextMeasure>(flat: FlatDocument, measure: &M) -> ScoreDocument {
        let articles = flat
            .articles
            .into_iter()
            .map(|entry| match entry {
                FlatEntry::Text(text) => Article::Text(text),
                FlatEntry::Music(article) => Article::Music(linify::linify_article(article, measure)),
            })
            .collect();
        ScoreDocument {
            title: flat.title,
            subtitle: flat.subtitle,
            prescripts: flat.prescripts,
            authors: flat.authors,
            footnotes: flat.footnotes,
            render_props: flat.render_props,
            articles,
        }
    }
}

fn is_text_article(article: &LineTree<DestructedLine>) -> bool {
    article
        .lines
        .iter()
        .any(|l| l.command == Command::Text)
}

fn text_article(article: &LineTree<DestructedLine>) -> TextArticle {
    TextArticle {
        line_number: article.line_number,
        title: text_of(article, "S"),
        paragraphs: texts_of(article, Command::Text),
    }
}

fn render_props_of(node: &LineTree<DestructedLine>) -> RenderProps {
    match node.unique("Rp").map(|l| &l.content) {
        Some(LineContent::RenderProps(props)) => props.clone(),
        _ => RenderProps::new(),
    }
}

fn text_of(node: &LineTree<DestructedLine>, head: &str) -> Option<String> {
    match node.unique(head).map(|l| &l.content) {
        Some(LineContent::Text(text)) => Some(text.clone()),
        _ => None,
    }
}

fn texts_of(node: &LineTree<DestructedLine>, command: Command) -> Vec<String> {
    node.lines
        .iter()
        .filter(|l| l.command == command)
        .filter_map(|l| match &l.content {
            LineContent::Text(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
