//! # Destructor
//!
//! Gives every line of the tree its typed meaning. Property lines become
//! patches, note rows become sections of timed notes, lyric lines become
//! syllable streams.
//!
//! ## Musical context
//! Music props are resolved while walking the tree, not looked up later:
//!
//! - the document context is the defaults with `Sp` applied
//! - an article applies its `P`
//! - fragments of an article are folded in order: each starts from the
//!   previous fragment's closing context, applies its own `P`, and hands on
//!   the time/speed/key changes its note rows made through separator
//!   attributes
//! - a part applies its `Pi`; its `N` row may change the context again at
//!   separators, and the other rows of the part follow the `N` row section by
//!   section
//!
//! Each section therefore carries the exact props it is played with.

pub mod jumpers;
pub mod lyrics;
pub mod note_eater;
pub mod props;
pub mod sections;

#[cfg(test)]
mod tests;

use crate::classifier::CommandLine;
use crate::commands::Command;
use crate::issue::Issues;
use crate::line_tree::LineTree;
use crate::model::jumper::Jumper;
use crate::model::lyric::LyricToken;
use crate::model::note::{NoteCharChord, NoteCharForce, NoteCharMusic, NoteCharText};
use crate::model::props::{MusicProps, MusicPropsPatch};
use crate::model::render::RenderProps;
use crate::model::section::MusicSection;
use crate::sparse::{BracketPair, SparseBuilder, SparseItem, SparseLine};
use crate::tokenizer::{Span, TokenKind};
use note_eater::{ChordReader, CharReader, ForceReader, MusicReader, TextReader};
use sections::{PropsSource, SectionsParser};
use serde::Serialize;

/// A note row: voice tags plus its sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow<T> {
    pub tags: Vec<String>,
    pub sections: Vec<MusicSection<T>>,
    /// Context after the last separator.
    #[serde(skip)]
    pub final_props: MusicProps,
    /// Everything the row's separators changed.
    #[serde(skip)]
    pub variation: MusicPropsPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricRow {
    pub tags: Vec<String>,
    /// Passes this verse is sung on; empty means all.
    pub passes: Vec<u32>,
    pub tokens: Vec<LyricToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum LineContent {
    Text(String),
    MusicProps(MusicPropsPatch),
    RenderProps(RenderProps),
    Jumpers(Vec<Jumper>),
    Notes(NoteRow<NoteCharMusic>),
    Chords(NoteRow<NoteCharChord>),
    Annotations(NoteRow<NoteCharText>),
    Force(NoteRow<NoteCharForce>),
    Lyrics(LyricRow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestructedLine {
    pub line_number: usize,
    pub command: Command,
    pub head: String,
    pub content: LineContent,
}

/// Source text of a line's content, addressed by the token ranges.
pub struct Source {
    chars: Vec<char>,
    offset: usize,
}

impl Source {
    pub fn of(line: &SparseLine) -> Self {
        Source {
            chars: line.text.chars().collect(),
            offset: line.text_offset,
        }
    }

    pub fn slice(&self, span: Span) -> String {
        let start = span.start.saturating_sub(self.offset).min(self.chars.len());
        let end = span.end.saturating_sub(self.offset).clamp(start, self.chars.len());
        self.chars[start..end].iter().collect()
    }
}

/// A run of items with no whitespace between them.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub items: Vec<&'a SparseItem>,
    pub range: Span,
    pub text: String,
}

pub fn chunks<'a>(items: impl IntoIterator<Item = &'a SparseItem>, source: &Source) -> Vec<Chunk<'a>> {
    let mut out: Vec<Chunk<'a>> = Vec::new();
    for item in items {
        let range = item.range();
        match out.last_mut() {
            Some(chunk) if chunk.range.end == range.start => {
                chunk.items.push(item);
                chunk.range = chunk.range.join(&range);
            }
            _ => out.push(Chunk {
                items: vec![item],
                range,
                text: String::new(),
            }),
        }
    }
    for chunk in &mut out {
        chunk.text = source.slice(chunk.range);
    }
    out
}

/// Range covered by a group of items.
pub fn group_span(items: &[SparseItem]) -> Option<Span> {
    let first = items.first()?;
    let last = items.last()?;
    Some(first.range().join(&last.range()))
}

/// Item texts of a props bracket: `N[alto, 2]` gives `["alto", "2"]`.
fn prop_texts(props: Option<&BracketPair>) -> Vec<String> {
    let Some(props) = props else {
        return Vec::new();
    };
    props
        .non_empty_groups()
        .map(|g| {
            g.iter()
                .filter_map(SparseItem::token)
                .map(|t| t.content.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .collect()
}

/// Plain text of a line; a lone string literal is unquoted.
fn line_text(line: &SparseLine) -> String {
    let items: Vec<&SparseItem> = line.content.items().collect();
    match items.as_slice() {
        [SparseItem::Token(t)] if t.kind == TokenKind::StringLiteral => t.content.clone(),
        _ => line.text.clone(),
    }
}

pub struct Destructor;

impl Destructor {
    pub fn destruct(tree: LineTree<CommandLine>, issues: &mut Issues) -> LineTree<DestructedLine> {
        let sparse = tree.map_lines(&mut |line: CommandLine| SparseBuilder::parse(&line, issues));
        let mut doc = DocumentWalker { issues };
        let out = doc.document(sparse);
        log::debug!("destructed {} articles", out.children.len());
        out
    }
}

struct DocumentWalker<'i> {
    issues: &'i mut Issues,
}

impl DocumentWalker<'_> {
    fn document(&mut self, tree: LineTree<SparseLine>) -> LineTree<DestructedLine> {
        let sp = props_patch(&tree, "Sp");
        let ctx = MusicProps::default().apply(&sp);
        self.node(tree, |walker, children| {
            children.into_iter().map(|article| walker.article(article, &ctx)).collect()
        })
    }

    fn article(&mut self, tree: LineTree<SparseLine>, doc_ctx: &MusicProps) -> LineTree<DestructedLine> {
        let p = props_patch(&tree, "P");
        let mut ctx = doc_ctx.apply(&p);
        self.node(tree, |walker, children| {
            children
                .into_iter()
                .map(|fragment| {
                    let (out, next) = walker.fragment(fragment, &ctx);
                    ctx = next;
                    out
                })
                .collect()
        })
    }

    /// Returns the fragment and the context the next fragment starts from.
    fn fragment(&mut self, tree: LineTree<SparseLine>, ctx: &MusicProps) -> (LineTree<DestructedLine>, MusicProps) {
        let p = props_patch(&tree, "P");
        let frag_ctx = ctx.apply(&p);
        let mut variation = MusicPropsPatch::default();
        let out = self.node(tree, |walker, children| {
            children
                .into_iter()
                .map(|part| {
                    let (out, v) = walker.part(part, &frag_ctx);
                    if !v.is_empty() {
                        variation = v;
                    }
                    out
                })
                .collect()
        });
        (out, frag_ctx.apply(&variation))
    }

    fn part(&mut self, tree: LineTree<SparseLine>, frag_ctx: &MusicProps) -> (LineTree<DestructedLine>, MusicPropsPatch) {
        let pi = props_patch(&tree, "Pi");
        let ctx = frag_ctx.apply(&pi);
        let notes_index = tree.unique_lines.get("N").copied();
        let mut notes = notes_index
            .and_then(|i| tree.lines.get(i))
            .map(|line| self.note_row(line, MusicReader, PropsSource::Running(ctx.clone())));
        let track: Vec<MusicProps> = notes
            .as_ref()
            .map(|row| row.sections.iter().map(|s| s.musical_props.clone()).collect())
            .unwrap_or_default();
        let variation = notes.as_ref().map(|row| row.variation.clone()).unwrap_or_default();

        let LineTree {
            line_number,
            level,
            lines,
            unique_lines,
            children,
            pruned,
        } = tree;
        let lines = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| {
                let track_source = || PropsSource::Track {
                    track: &track,
                    fallback: &ctx,
                };
                let content = match line.command {
                    Command::Notes if Some(i) == notes_index => match notes.take() {
                        Some(row) => LineContent::Notes(row),
                        None => LineContent::Notes(self.note_row(&line, MusicReader, PropsSource::Running(ctx.clone()))),
                    },
                    Command::Chords => LineContent::Chords(self.note_row(&line, ChordReader, track_source())),
                    Command::Annotations => LineContent::Annotations(self.note_row(&line, TextReader, track_source())),
                    Command::Force => LineContent::Force(self.note_row(&line, ForceReader, track_source())),
                    _ => self.simple(&line),
                };
                finish(line, content)
            })
            .collect();
        let children = children.into_iter().map(|lyric| self.lyric_line(lyric, &ctx)).collect();
        (
            LineTree {
                line_number,
                level,
                lines,
                unique_lines,
                children,
                pruned,
            },
            variation,
        )
    }

    fn lyric_line(&mut self, tree: LineTree<SparseLine>, ctx: &MusicProps) -> LineTree<DestructedLine> {
        let LineTree {
            line_number,
            level,
            lines,
            unique_lines,
            children,
            pruned,
        } = tree;
        debug_assert!(children.is_empty());
        let lines = lines
            .into_iter()
            .map(|line| {
                let content = match line.command {
                    Command::LyricNotes => {
                        LineContent::Notes(self.note_row(&line, MusicReader, PropsSource::Running(ctx.clone())))
                    }
                    _ => self.simple(&line),
                };
                finish(line, content)
            })
            .collect();
        LineTree {
            line_number,
            level,
            lines,
            unique_lines,
            children: Vec::new(),
            pruned,
        }
    }

    /// Convert a node's lines in place and its children with `children`.
    fn node(
        &mut self,
        tree: LineTree<SparseLine>,
        children: impl FnOnce(&mut Self, Vec<LineTree<SparseLine>>) -> Vec<LineTree<DestructedLine>>,
    ) -> LineTree<DestructedLine> {
        let LineTree {
            line_number,
            level,
            lines,
            unique_lines,
            children: kids,
            pruned,
        } = tree;
        let lines = lines
            .into_iter()
            .map(|line| {
                let content = self.simple(&line);
                finish(line, content)
            })
            .collect();
        let children = children(self, kids);
        LineTree {
            line_number,
            level,
            lines,
            unique_lines,
            children,
            pruned,
        }
    }

    /// Lines whose meaning does not depend on the musical context.
    fn simple(&mut self, line: &SparseLine) -> LineContent {
        let source = Source::of(line);
        match line.command {
            Command::Title
            | Command::Subtitle
            | Command::Prescript
            | Command::Author
            | Command::Footnote
            | Command::Article
            | Command::Text
            | Command::LyricAnnotation => LineContent::Text(line_text(line)),
            Command::ScoreProps | Command::Props | Command::PartProps => {
                let chunks = chunks(line.content.items(), &source);
                LineContent::MusicProps(props::parse_music_props(&chunks, line.line_number, self.issues))
            }
            Command::RenderProps => {
                let chunks = chunks(line.content.items(), &source);
                LineContent::RenderProps(props::parse_render_props(&chunks, &source, line.line_number, self.issues))
            }
            Command::Jumpers => {
                let items: Vec<&SparseItem> = line.content.items().collect();
                LineContent::Jumpers(jumpers::parse_jumpers(&items, &source, line.line_number, self.issues))
            }
            Command::Lyrics => {
                let (passes, tags) = split_lyric_props(prop_texts(line.props.as_ref()));
                let items: Vec<&SparseItem> = line.content.items().collect();
                LineContent::Lyrics(LyricRow {
                    tags,
                    passes,
                    tokens: lyrics::parse_lyrics(&items, &source, line.line_number, self.issues),
                })
            }
            // Rows that need a context get it from their part or lyric line.
            Command::Notes | Command::LyricNotes => {
                LineContent::Notes(self.note_row(line, MusicReader, PropsSource::Running(MusicProps::default())))
            }
            Command::Chords => LineContent::Chords(self.note_row(line, ChordReader, PropsSource::Running(MusicProps::default()))),
            Command::Annotations => {
                LineContent::Annotations(self.note_row(line, TextReader, PropsSource::Running(MusicProps::default())))
            }
            Command::Force => LineContent::Force(self.note_row(line, ForceReader, PropsSource::Running(MusicProps::default()))),
        }
    }

    fn note_row<R: CharReader>(&mut self, line: &SparseLine, reader: R, props: PropsSource<'_>) -> NoteRow<R::Char> {
        let source = Source::of(line);
        let items: Vec<&SparseItem> = line.content.items().collect();
        let parser = SectionsParser::new(reader, &source, line.line_number);
        let parsed = parser.parse(&items, props, self.issues);
        NoteRow {
            tags: prop_texts(line.props.as_ref()),
            sections: parsed.sections,
            final_props: parsed.final_props,
            variation: parsed.variation,
        }
    }
}

/// The patch of a node's props line, if it has one.
fn props_patch(tree: &LineTree<SparseLine>, head: &str) -> MusicPropsPatch {
    match tree.unique(head) {
        Some(line) => {
            let source = Source::of(line);
            let chunks = chunks(line.content.items(), &source);
            let mut scratch = Issues::new();
            // Reported when the line itself is converted.
            props::parse_music_props(&chunks, line.line_number, &mut scratch)
        }
        None => MusicPropsPatch::default(),
    }
}

fn finish(line: SparseLine, content: LineContent) -> DestructedLine {
    DestructedLine {
        line_number: line.line_number,
        command: line.command,
        head: line.head,
        content,
    }
}

/// Integer props are pass numbers, the rest are tags.
fn split_lyric_props(texts: Vec<String>) -> (Vec<u32>, Vec<String>) {
    let mut passes = Vec::new();
    let mut tags = Vec::new();
    for text in texts {
        match text.trim_end_matches('.').parse::<u32>() {
            Ok(n) if n > 0 => passes.push(n),
            _ => tags.push(text),
        }
    }
    (passes, tags)
}
