//! Syllables placed under notes.
//!
//! Each fragment's lyric tokens are handed out in order, one per sounding
//! note of the melody: the line's own `Ln` notes where it has them in that
//! fragment, the voice's `N` notes otherwise. Rests, voided notes and `-`
//! continuations take nothing.

use super::{FlatArticle, FlatLyricLine};
use crate::issue::Issues;
use crate::model::lyric::{LyricNote, LyricNoteContent, LyricToken};
use crate::model::note::NoteCharMusic;
use crate::model::section::MusicSection;

pub fn place_lyrics(flat: &mut FlatArticle, issues: &mut Issues) {
    let count = flat.section_count();
    for part in &mut flat.parts {
        for line in &mut part.lyric_lines {
            line.lyrics = vec![Vec::new(); count];
            for pending in std::mem::take(&mut line.pending) {
                let melody = melody_for(line, &part.notes, pending.start, pending.end);
                let placed = place(melody, pending.start, pending.end, &pending.tokens);
                if placed.leftover > 0 {
                    issues.warn(pending.line_number, 0, "lyrics_exceed_notes", [placed.leftover]);
                }
                for note in placed.notes {
                    if let Some(slot) = line.lyrics.get_mut(note.section) {
                        slot.push(note);
                    }
                }
            }
        }
    }
}

fn melody_for<'a>(
    line: &'a FlatLyricLine,
    notes: &'a [MusicSection<NoteCharMusic>],
    start: usize,
    end: usize,
) -> &'a [MusicSection<NoteCharMusic>] {
    match &line.substitute {
        Some(sub) if sub.get(start..end).is_some_and(|s| s.iter().any(|s| !s.is_nullish())) => sub,
        _ => notes,
    }
}

struct Placed {
    notes: Vec<LyricNote>,
    leftover: usize,
}

fn place(melody: &[MusicSection<NoteCharMusic>], start: usize, end: usize, tokens: &[LyricToken]) -> Placed {
    let mut tokens = tokens.iter();
    let mut out = Vec::new();
    let sections = melody.get(start..end.min(melody.len())).unwrap_or(&[]);
    'outer: for (offset, section) in sections.iter().enumerate() {
        for note in section.notes().iter().filter(|n| n.is_sounding()) {
            let Some(token) = tokens.next() else {
                break 'outer;
            };
            let content = match token {
                LyricToken::Chars { chars, grouped, .. } => LyricNoteContent::Chars {
                    chars: chars.clone(),
                    grouped: *grouped,
                },
                LyricToken::Extension { .. } => LyricNoteContent::Extension,
                LyricToken::Skip { .. } => continue,
            };
            out.push(LyricNote {
                start_pos: note.start_pos,
                length: note.length,
                section: start + offset,
                content,
            });
        }
    }
    Placed {
        notes: out,
        leftover: tokens.count(),
    }
}
