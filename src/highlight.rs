//! Cursor to section lookup for editors.
//!
//! Every written section has a uuid on its [`IdCard`](crate::model::section::IdCard);
//! copies made for rendered lines and the sequence keep it. The table built
//! here maps each source line to the uuids of its sections, so a host can
//! find the section under the cursor without parsing the document again.

use crate::classifier::{classify, ClassifiedLine};
use crate::columns::{Article, LinePart, ScoreDocument};
use crate::commands::Command;
use crate::destructor::sections::section_reach;
use crate::issue::Issues;
use crate::linifier::linify;
use crate::model::note::NoteChar;
use crate::model::section::MusicSection;
use crate::sparse::{SparseBuilder, SparseItem};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPosition {
    /// Position of the section within its row.
    pub index: usize,
    pub uuid: String,
}

/// Source line number to the sections written on it, by index.
pub type SectionPositions = BTreeMap<usize, Vec<SectionPosition>>;

/// Every written section of a compiled document.
pub fn section_positions(doc: &ScoreDocument) -> SectionPositions {
    let mut table = SectionPositions::new();
    for article in &doc.articles {
        let Article::Music(music) = article else {
            continue;
        };
        for line in &music.lines {
            for part in &line.parts {
                collect_part(part, &mut table);
            }
        }
    }
    for entries in table.values_mut() {
        entries.sort_by_key(|p| p.index);
    }
    table
}

fn collect_part(part: &LinePart, table: &mut SectionPositions) {
    collect(&part.notes, table);
    part.chords.iter().for_each(|r| collect(r, table));
    part.annotations.iter().for_each(|r| collect(r, table));
    part.forces.iter().for_each(|r| collect(r, table));
    for lyric in &part.lyric_lines {
        if let Some(substitute) = &lyric.substitute {
            collect(substitute, table);
        }
    }
}

fn collect<T: NoteChar>(row: &[MusicSection<T>], table: &mut SectionPositions) {
    for section in row.iter().filter(|s| !s.is_nullish()) {
        let card = &section.id_card;
        let entries = table.entry(card.line_number).or_default();
        if !entries.iter().any(|p| p.index == card.index) {
            entries.push(SectionPosition {
                index: card.index,
                uuid: card.uuid.clone(),
            });
        }
    }
}

/// Uuid of the section under the cursor at physical `(row, col)`, both
/// zero-based. Only the line under the cursor is read again.
///
/// A section reaches from the end of the separator before it to the start
/// of the separator after it, both ends included. A caret right before a
/// separator belongs to the section on its left and one right after it to
/// the section on its right. Reaches never share an offset, and a caret
/// inside a separator of two or more characters selects nothing.
pub fn get_highlighted_section(table: &SectionPositions, code: &str, row: usize, col: usize) -> Option<String> {
    let line = linify(code)
        .into_iter()
        .find(|l| l.segments.iter().any(|s| s.line_number == row))?;
    let offset = line.offset_of(row, col)?;

    let mut issues = Issues::new();
    let command = classify(&line.text, &mut issues)
        .into_iter()
        .find_map(|c| match c {
            ClassifiedLine::Command(c) => Some(c),
            ClassifiedLine::Delimiter(_) => None,
        })?;
    if !matches!(
        command.command,
        Command::Notes | Command::Chords | Command::Annotations | Command::Force | Command::LyricNotes
    ) {
        return None;
    }
    let sparse = SparseBuilder::parse(&command, &mut issues);
    let items: Vec<&SparseItem> = sparse.content.items().collect();
    let slot = section_reach(&items)
        .iter()
        .position(|r| r.start <= offset && offset <= r.end)?;

    table
        .get(&line.line_number)?
        .iter()
        .find(|p| p.index == slot)
        .map(|p| p.uuid.clone())
}
