//! Ties and slurs across section boundaries.
//!
//! A `~` joins a note to the next note of the voice; when both have the same
//! character the second one is voided: it keeps its length but does not
//! sound again. A `*` opens a slur, the next `*` closes it. Spans that cross
//! sections are cut into pieces, one per section, and the sections are
//! flagged as split on the sides where a piece continues.

use super::FlatArticle;
use crate::frac::Frac;
use crate::issue::Issues;
use crate::model::note::{Decoration, DecorationKind, NoteChar, NoteKind};
use crate::model::section::MusicSection;

pub fn interlink(flat: &mut FlatArticle, issues: &mut Issues) {
    for part in &mut flat.parts {
        link_row(&mut part.notes, issues);
        for line in &mut part.lyric_lines {
            if let Some(substitute) = &mut line.substitute {
                link_row(substitute, issues);
            }
        }
    }
}

/// Where a span starts: section, note, position, and source location.
#[derive(Clone, Copy)]
struct Anchor {
    section: usize,
    note: usize,
    pos: Frac,
    line_number: usize,
    index: usize,
}

pub fn link_row<T: NoteChar>(row: &mut [MusicSection<T>], issues: &mut Issues) {
    let mut tie: Option<Anchor> = None;
    let mut slur: Option<Anchor> = None;

    for k in 0..row.len() {
        let mut seen_note = false;
        for i in 0..row[k].notes().len() {
            let note = &row[k].notes()[i];
            if matches!(note.kind, NoteKind::Extend) {
                continue;
            }
            let here = Anchor {
                section: k,
                note: i,
                pos: note.start_pos,
                line_number: note.line_number,
                index: note.range.start,
            };
            let (ties_on, slurs) = (note.suffix.tie, note.suffix.slur);
            let display = note.char().map(NoteChar::display);
            let first_in_section = !seen_note;
            seen_note = true;

            if let Some(from) = tie.take() {
                let same = row[from.section].notes()[from.note].char().map(NoteChar::display) == display;
                if let Some(content) = row[k].content_mut() {
                    if same {
                        content.notes[i].voided = true;
                        if first_in_section && from.section != k {
                            content.left_split_void = true;
                        }
                    }
                }
                add_span(row, DecorationKind::Tie, from, here);
            }
            if ties_on {
                tie = Some(here);
            }
            if slurs {
                match slur.take() {
                    Some(from) => add_span(row, DecorationKind::Slur, from, here),
                    None => slur = Some(here),
                }
            }
        }
    }

    for (kind, open) in [("Tie", tie), ("Slur", slur)] {
        if let Some(anchor) = open {
            issues.warn(anchor.line_number, anchor.index, "unclosed_decoration", [kind]);
        }
    }
}

fn add_span<T: NoteChar>(row: &mut [MusicSection<T>], kind: DecorationKind, from: Anchor, to: Anchor) {
    let piece = |start: Option<Frac>, end: Option<Frac>| Decoration {
        kind,
        start_pos: start,
        end_pos: end,
        label: None,
    };
    if from.section == to.section {
        if let Some(content) = row[from.section].content_mut() {
            content.decoration.push(piece(Some(from.pos), Some(to.pos)));
        }
        return;
    }
    if let Some(content) = row[from.section].content_mut() {
        content.decoration.push(piece(Some(from.pos), None));
        content.right_split = true;
    }
    for section in &mut row[from.section + 1..to.section] {
        if let Some(content) = section.content_mut() {
            content.decoration.push(piece(None, None));
            content.left_split = true;
            content.right_split = true;
        }
    }
    if let Some(content) = row[to.section].content_mut() {
        content.decoration.push(piece(None, Some(to.pos)));
        content.left_split = true;
    }
}
