//! Cutting an article into rendered lines.
//!
//! Every fragment starts a new line, and a line holds at most
//! `sections_per_line` sections (taken from the fragment's render props).
//! Rows that have nothing to show on a line are left out of it.

use super::{Column, FlatArticle, FlatLyricLine, FlatPart, LineLyrics, LinePart, MusicArticle, RenderLine};
use crate::layout::{PositionDispatcher, TextMeasure};
use crate::model::note::NoteChar;
use crate::model::section::MusicSection;

pub fn linify_article<M: TextMeasure>(flat: FlatArticle, measure: &M) -> MusicArticle {
    let mut lines = Vec::new();
    for fragment in &flat.fragments {
        let per_line = fragment.render_props.sections_per_line().max(1);
        let mut start = fragment.start;
        while start < fragment.end {
            let end = (start + per_line).min(fragment.end);
            let mut line = cut(&flat, start, end);
            line.layout = PositionDispatcher::new(measure, &fragment.render_props).dispatch(&line);
            lines.push(line);
            start = end;
        }
    }
    log::debug!("article at line {}: {} rendered lines", flat.line_number, lines.len());
    MusicArticle {
        line_number: flat.line_number,
        title: flat.title,
        render_props: flat.render_props,
        columns: flat.columns,
        jumpers: flat.jumpers,
        lines,
    }
}

fn cut(flat: &FlatArticle, start: usize, end: usize) -> RenderLine {
    let columns: Vec<Column> = flat.columns.get(start..end).unwrap_or(&[]).to_vec();
    let parts = flat
        .parts
        .iter()
        .filter(|p| has_content(p.notes.get(start..end)))
        .map(|p| line_part(p, start, end))
        .collect();
    RenderLine {
        start,
        end,
        columns,
        parts,
        layout: Vec::new(),
    }
}

fn has_content<T: NoteChar>(sections: Option<&[MusicSection<T>]>) -> bool {
    sections.is_some_and(|s| s.iter().any(|s| !s.is_nullish()))
}

/// Sections `start..end` of a row, with the separators at both ends set the
/// way a line start or end draws them.
fn slice<T: NoteChar>(row: &[MusicSection<T>], start: usize, end: usize) -> Vec<MusicSection<T>> {
    let mut out: Vec<MusicSection<T>> = row.get(start..end).unwrap_or(&[]).to_vec();
    if start > 0 {
        if let (Some(prev), Some(first)) = (row.get(start - 1), out.first_mut()) {
            first.separator.before.char = prev.separator.next;
        }
    }
    if let Some(last) = out.last_mut() {
        last.separator.after.char = last.separator.after.char.after();
    }
    out
}

fn slice_rows<T: NoteChar>(rows: &[Vec<MusicSection<T>>], start: usize, end: usize) -> Vec<Vec<MusicSection<T>>> {
    rows.iter()
        .filter(|r| has_content(r.get(start..end)))
        .map(|r| slice(r, start, end))
        .collect()
}

fn line_part(part: &FlatPart, start: usize, end: usize) -> LinePart {
    LinePart {
        signature: part.signature.clone(),
        tags: part.tags.clone(),
        notes: slice(&part.notes, start, end),
        chords: slice_rows(&part.chords, start, end),
        annotations: slice_rows(&part.annotations, start, end),
        forces: slice_rows(&part.forces, start, end),
        lyric_lines: part
            .lyric_lines
            .iter()
            .filter_map(|l| line_lyrics(l, start, end))
            .collect(),
    }
}

fn line_lyrics(line: &FlatLyricLine, start: usize, end: usize) -> Option<LineLyrics> {
    let lyrics = line.lyrics.get(start..end).unwrap_or(&[]).to_vec();
    let substitute = line
        .substitute
        .as_ref()
        .filter(|s| has_content(s.get(start..end)))
        .map(|s| slice(s, start, end));
    if substitute.is_none() && lyrics.iter().all(Vec::is_empty) {
        return None;
    }
    Some(LineLyrics {
        signature: line.signature.clone(),
        tags: line.tags.clone(),
        label: line.label.clone(),
        substitute,
        lyrics,
    })
}
