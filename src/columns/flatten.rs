//! Fragments laid end to end, and the time axis they share.

use super::{render_props_of, text_of, Column, FlatArticle, FlatLyricLine, FlatPart, FragmentSpan, PendingLyrics};
use crate::commands::Command;
use crate::destructor::{DestructedLine, LineContent, LyricRow, NoteRow};
use crate::error::NmnError;
use crate::frac::Frac;
use crate::issue::Issues;
use crate::line_tree::LineTree;
use crate::model::note::{NoteChar, NoteCharMusic};
use crate::model::props::{Beats, MusicProps};
use crate::model::render::RenderProps;
use crate::model::section::{constrained_length, MusicSection, SectionBody, SeparatorChar};
use std::collections::HashMap;

/// First printed measure number unless `measure_number_start` says otherwise.
const FIRST_MEASURE: usize = 1;

fn internal(message: String) -> NmnError {
    NmnError::Internal {
        stage: "column stater",
        message,
    }
}

/// Stage one: every voice of every fragment on one global section axis.
pub fn flatten_article(
    article: &LineTree<DestructedLine>,
    doc_props: &RenderProps,
    issues: &mut Issues,
) -> Result<FlatArticle, NmnError> {
    let render_props = doc_props.overlay(&render_props_of(article));
    let mut flat = FlatArticle {
        line_number: article.line_number,
        title: text_of(article, "S"),
        render_props: render_props.clone(),
        columns: Vec::new(),
        parts: Vec::new(),
        jumpers: Vec::new(),
        fragments: Vec::new(),
    };

    let mut offset = 0;
    for fragment in &article.children {
        if fragment.level != 2 {
            return Err(internal(format!("expected a fragment node, got level {}", fragment.level)));
        }
        let count = fragment_width(fragment)?;
        if count == 0 {
            continue;
        }

        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for part in &fragment.children {
            let tags = part_tags(part);
            let signature = signature(&tags, &mut tag_counts);
            let index = match flat.parts.iter().position(|p| p.signature == signature) {
                Some(i) => i,
                None => {
                    flat.parts.push(new_part(signature, tags, offset));
                    flat.parts.len() - 1
                }
            };
            fill_part(&mut flat.parts[index], part, offset, count);
        }
        for part in &mut flat.parts {
            pad_part(part, offset + count);
        }

        if let Some(DestructedLine {
            content: LineContent::Jumpers(jumpers),
            line_number,
            ..
        }) = fragment.unique("J")
        {
            for jumper in jumpers {
                if jumper.start >= count || jumper.end > count {
                    issues.warn(*line_number, jumper.range.start, "jumper_range", [jumper.start + 1, jumper.end, count]);
                }
                if jumper.start >= count {
                    continue;
                }
                let mut clamped = jumper.clone();
                clamped.end = clamped.end.min(count);
                flat.jumpers.push(clamped.shifted(offset));
            }
        }

        flat.fragments.push(FragmentSpan {
            line_number: fragment.line_number,
            start: offset,
            end: offset + count,
            render_props: render_props.overlay(&render_props_of(fragment)),
        });
        offset += count;
    }

    fill_nullish_props(&mut flat);
    log::trace!(
        "article at line {}: {} voices over {} sections",
        flat.line_number,
        flat.parts.len(),
        offset
    );
    Ok(flat)
}

/// Tags plus the number of earlier voices in the fragment with the same tags.
fn signature(tags: &[String], counts: &mut HashMap<String, usize>) -> String {
    let key = tags.join(",");
    let n = counts.entry(key.clone()).or_insert(0);
    let signature = format!("{}#{}", key, n);
    *n += 1;
    signature
}

fn part_tags(part: &LineTree<DestructedLine>) -> Vec<String> {
    match part.unique("N").map(|l| &l.content) {
        Some(LineContent::Notes(row)) => row.tags.clone(),
        _ => Vec::new(),
    }
}

fn new_part(signature: String, tags: Vec<String>, offset: usize) -> FlatPart {
    let mut part = FlatPart {
        signature,
        tags,
        notes: Vec::new(),
        chords: Vec::new(),
        annotations: Vec::new(),
        forces: Vec::new(),
        lyric_lines: Vec::new(),
    };
    pad(&mut part.notes, offset);
    part
}

/// Columns a row takes once its omissions are counted out.
fn written_width<T>(sections: &[MusicSection<T>]) -> usize {
    sections
        .iter()
        .map(|s| match s.body {
            SectionBody::Omit { count: Some(n) } => n.max(1),
            _ => 1,
        })
        .sum()
}

fn fragment_width(fragment: &LineTree<DestructedLine>) -> Result<usize, NmnError> {
    let mut width = 0;
    for part in &fragment.children {
        if part.level != 3 {
            return Err(internal(format!("expected a part node, got level {}", part.level)));
        }
        for line in part.lines.iter().chain(part.children.iter().flat_map(|l| l.lines.iter())) {
            let w = match &line.content {
                LineContent::Notes(row) => written_width(&row.sections),
                LineContent::Chords(row) => written_width(&row.sections),
                LineContent::Annotations(row) => written_width(&row.sections),
                LineContent::Force(row) => written_width(&row.sections),
                _ => 0,
            };
            width = width.max(w);
        }
    }
    Ok(width)
}

/// A row's sections expanded to exactly `count` columns.
fn expand<T: NoteChar>(sections: &[MusicSection<T>], count: usize) -> Vec<MusicSection<T>> {
    let fixed = written_width(sections);
    let mut fill_left = count.saturating_sub(fixed);
    let mut out = Vec::with_capacity(count);
    for section in sections {
        let copies = match section.body {
            SectionBody::Omit { count: Some(n) } => n.max(1),
            SectionBody::Omit { count: None } => 1 + std::mem::take(&mut fill_left),
            _ => 1,
        };
        for _ in 0..copies {
            out.push(section.clone());
        }
    }
    out.truncate(count);
    pad(&mut out, count);
    out
}

fn pad<T: NoteChar>(row: &mut Vec<MusicSection<T>>, len: usize) {
    while row.len() < len {
        row.push(MusicSection::nullish(0, MusicProps::default()));
    }
}

fn append<T: NoteChar>(rows: &mut Vec<Vec<MusicSection<T>>>, i: usize, row: &NoteRow<T>, offset: usize, count: usize) {
    while rows.len() <= i {
        rows.push(Vec::new());
    }
    let target = &mut rows[i];
    pad(target, offset);
    target.extend(expand(&row.sections, count));
}

fn fill_part(flat: &mut FlatPart, part: &LineTree<DestructedLine>, offset: usize, count: usize) {
    let (mut c, mut a, mut f) = (0, 0, 0);
    for line in &part.lines {
        match (&line.content, line.command) {
            (LineContent::Notes(row), Command::Notes) => {
                pad(&mut flat.notes, offset);
                flat.notes.extend(expand(&row.sections, count));
            }
            (LineContent::Chords(row), _) => {
                append(&mut flat.chords, c, row, offset, count);
                c += 1;
            }
            (LineContent::Annotations(row), _) => {
                append(&mut flat.annotations, a, row, offset, count);
                a += 1;
            }
            (LineContent::Force(row), _) => {
                append(&mut flat.forces, f, row, offset, count);
                f += 1;
            }
            _ => {}
        }
    }

    let mut tag_counts: HashMap<String, usize> = HashMap::new();
    for lyric in &part.children {
        let Some((row, line_number)) = lyric.unique("L").and_then(|l| match &l.content {
            LineContent::Lyrics(row) => Some((row, l.line_number)),
            _ => None,
        }) else {
            continue;
        };
        let signature = signature(&lyric_key(row), &mut tag_counts);
        let index = match flat.lyric_lines.iter().position(|l| l.signature == signature) {
            Some(i) => i,
            None => {
                flat.lyric_lines.push(FlatLyricLine {
                    signature,
                    tags: row.tags.clone(),
                    passes: row.passes.clone(),
                    label: None,
                    substitute: None,
                    lyrics: Vec::new(),
                    pending: Vec::new(),
                });
                flat.lyric_lines.len() - 1
            }
        };
        let target = &mut flat.lyric_lines[index];
        if target.label.is_none() {
            target.label = match lyric.unique("La").map(|l| &l.content) {
                Some(LineContent::Text(text)) => Some(text.clone()),
                _ => None,
            };
        }
        if let Some(LineContent::Notes(melody)) = lyric.unique("Ln").map(|l| &l.content) {
            let substitute = target.substitute.get_or_insert_with(Vec::new);
            pad(substitute, offset);
            substitute.extend(expand(&melody.sections, count));
        }
        target.pending.push(PendingLyrics {
            line_number,
            start: offset,
            end: offset + count,
            tokens: row.tokens.clone(),
        });
    }
}

fn lyric_key(row: &LyricRow) -> Vec<String> {
    let mut key = row.tags.clone();
    key.extend(row.passes.iter().map(|p| format!("{}.", p)));
    key
}

fn pad_part(part: &mut FlatPart, len: usize) {
    pad(&mut part.notes, len);
    part.chords.iter_mut().for_each(|r| pad(r, len));
    part.annotations.iter_mut().for_each(|r| pad(r, len));
    part.forces.iter_mut().for_each(|r| pad(r, len));
    for line in &mut part.lyric_lines {
        if let Some(substitute) = &mut line.substitute {
            pad(substitute, len);
        }
    }
}

/// Placeholders take the props of the first voice that has a section there.
fn fill_nullish_props(flat: &mut FlatArticle) {
    let len = flat.parts.first().map_or(0, |p| p.notes.len());
    for k in 0..len {
        let reference = flat
            .parts
            .iter()
            .filter_map(|p| p.notes.get(k))
            .find(|s| !s.is_nullish())
            .map(|s| s.musical_props.clone());
        let Some(props) = reference else {
            continue;
        };
        for part in &mut flat.parts {
            set_props(&mut part.notes, k, &props);
            part.chords.iter_mut().for_each(|r| set_props(r, k, &props));
            part.annotations.iter_mut().for_each(|r| set_props(r, k, &props));
            part.forces.iter_mut().for_each(|r| set_props(r, k, &props));
            for line in &mut part.lyric_lines {
                if let Some(substitute) = &mut line.substitute {
                    set_props(substitute, k, &props);
                }
            }
        }
    }
}

fn set_props<T: NoteChar>(row: &mut [MusicSection<T>], k: usize, props: &MusicProps) {
    if let Some(section) = row.get_mut(k).filter(|s| s.is_nullish()) {
        section.musical_props = props.clone();
    }
}

/// Quarters a section asks its column for.
///
/// The time signature decides, unless the section is closed by a `/`
/// separator: then its written length does. Placeholders ask for nothing.
pub fn section_stat<T: NoteChar>(section: &MusicSection<T>) -> Option<Frac> {
    let stated = section.musical_props.beats.as_ref().map(Beats::section_quarters);
    match &section.body {
        SectionBody::Section(content) => Some(
            constrained_length(&section.musical_props, section.separator.after.char).unwrap_or(content.total_quarters),
        ),
        SectionBody::Omit { .. } | SectionBody::Empty => stated,
        SectionBody::Nullish => None,
    }
}

fn part_stats(part: &FlatPart, k: usize) -> impl Iterator<Item = Option<Frac>> + '_ {
    let notes = part.notes.get(k).map(section_stat);
    let chords = part.chords.iter().filter_map(move |r| r.get(k)).map(section_stat);
    let annotations = part.annotations.iter().filter_map(move |r| r.get(k)).map(section_stat);
    let forces = part.forces.iter().filter_map(move |r| r.get(k)).map(section_stat);
    let substitutes = part
        .lyric_lines
        .iter()
        .filter_map(move |l| l.substitute.as_ref().and_then(|s| s.get(k)))
        .map(section_stat);
    notes.into_iter().chain(chords).chain(annotations).chain(forces).chain(substitutes)
}

/// The section a column takes its separators from.
fn reference_section(flat: &FlatArticle, k: usize) -> Option<&MusicSection<NoteCharMusic>> {
    flat.parts.iter().filter_map(|p| p.notes.get(k)).find(|s| !s.is_nullish())
}

/// Stage two: start times and measure numbers.
pub fn allocate(flat: &mut FlatArticle) {
    let len = flat.parts.first().map_or(0, |p| p.notes.len());
    let first_measure = flat
        .render_props
        .int("measure_number_start")
        .map_or(FIRST_MEASURE, |n| n.max(0) as usize);

    let mut columns: Vec<Column> = Vec::with_capacity(len);
    let mut start = Frac::zero();
    for k in 0..len {
        let quarters = flat
            .parts
            .iter()
            .flat_map(|p| part_stats(p, k))
            .flatten()
            .max()
            .filter(|q| q.is_finite() && *q > Frac::zero())
            .unwrap_or_else(Frac::one);
        let weight = flat
            .parts
            .iter()
            .filter_map(|p| p.notes.get(k))
            .filter_map(|s| s.separator.before.attrs.weight())
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
            .unwrap_or(1.0);
        let measure_number = match columns.last() {
            None => first_measure,
            Some(prev) => {
                let continues = reference_section(flat, k - 1).is_some_and(|s| {
                    s.separator.after.char == SeparatorChar::Slash && !s.separator.after.range.is_empty()
                });
                if continues {
                    prev.measure_number
                } else {
                    prev.measure_number + 1
                }
            }
        };
        columns.push(Column {
            index: k,
            measure_number,
            start_pos: start,
            quarters,
            weight,
        });
        start += quarters;
    }

    for part in &mut flat.parts {
        place(&mut part.notes, &columns);
        part.chords.iter_mut().for_each(|r| place(r, &columns));
        part.annotations.iter_mut().for_each(|r| place(r, &columns));
        part.forces.iter_mut().for_each(|r| place(r, &columns));
        for line in &mut part.lyric_lines {
            if let Some(substitute) = &mut line.substitute {
                place(substitute, &columns);
            }
        }
    }
    flat.columns = columns;
}

fn place<T: NoteChar>(row: &mut [MusicSection<T>], columns: &[Column]) {
    for (section, column) in row.iter_mut().zip(columns) {
        section.ordinal = column.index;
        section.start_pos = column.start_pos;
    }
}
