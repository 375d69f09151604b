//! # Position Dispatcher
//!
//! Gives every time position of a rendered line a horizontal coordinate.
//!
//! ## Footprints
//! Whatever sits at a position (note glyphs, syllables, chord names) asks
//! for room on its left and right. Notes and syllables *occupy* that room:
//! neighbours must not come closer. Chord names, annotations and lyric
//! punctuation only *prefer* it: they are honoured when the section has the
//! space and ignored otherwise.
//!
//! ## Dispatch
//! A section's width is split into gaps: from the section start to its
//! first position, between positions, and from the last position to the
//! end. The start gap also holds the separator inset and a time signature
//! that changes there.
//!
//! 1. Share the width among the gaps in proportion to the time they span.
//! 2. Any gap smaller than its requirement becomes rigid: it gets exactly
//!    its requirement and leaves the proportional pool.
//! 3. Share what is left among the remaining gaps and check again.
//!
//! This ends in `pass` when every gap is satisfied, which always happens
//! when the requirements fit the width. Otherwise it ends `dead`, and the
//! section is laid out from the last attempt, wider than asked for.

use super::measure::TextMeasure;
use crate::columns::RenderLine;
use crate::frac::Frac;
use crate::model::lyric::{LyricChar, LyricNoteContent};
use crate::model::note::{NoteChar, NoteCharMusic, NoteKind};
use crate::model::render::RenderProps;
use crate::model::section::{MusicSection, SeparatorAttr};
use serde::Serialize;
use std::collections::BTreeMap;

const EPSILON: f64 = 1e-9;

/// Room asked for around one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Footprint {
    /// Occupied room.
    pub left: f64,
    pub right: f64,
    /// Preferred room, at least the occupied room.
    pub soft_left: f64,
    pub soft_right: f64,
}

impl Footprint {
    pub fn hard(left: f64, right: f64) -> Self {
        Footprint {
            left,
            right,
            soft_left: left,
            soft_right: right,
        }
    }

    pub fn soft(left: f64, right: f64) -> Self {
        Footprint {
            left: 0.0,
            right: 0.0,
            soft_left: left,
            soft_right: right,
        }
    }

    fn merge(&mut self, other: Footprint) {
        self.left = self.left.max(other.left);
        self.right = self.right.max(other.right);
        self.soft_left = self.soft_left.max(other.soft_left).max(self.left);
        self.soft_right = self.soft_right.max(other.soft_right).max(self.right);
    }
}

/// What one section needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRequest {
    pub length: Frac,
    pub start_inset: f64,
    pub end_inset: f64,
    /// Sorted by position.
    pub columns: Vec<(Frac, Footprint)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchStatus {
    Pass,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub status: DispatchStatus,
    /// Gap widths, one more than there are columns.
    pub gaps: Vec<f64>,
    /// Column offsets from the section start.
    pub offsets: Vec<f64>,
}

impl Dispatch {
    pub fn total(&self) -> f64 {
        self.gaps.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionX {
    pub pos: Frac,
    pub x: f64,
}

/// Where a section of a line ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionLayout {
    pub index: usize,
    pub x: f64,
    pub width: f64,
    pub status: DispatchStatus,
    pub positions: Vec<PositionX>,
}

struct Gap {
    weight: f64,
    hard: f64,
    soft: f64,
}

fn gaps_of(request: &SectionRequest) -> Vec<Gap> {
    let zero = Footprint::default();
    let end = request
        .columns
        .last()
        .map_or(request.length, |(p, _)| (*p).max(request.length));
    let mut gaps = Vec::with_capacity(request.columns.len() + 1);
    let mut prev_pos = Frac::zero();
    let mut prev = (request.start_inset, request.start_inset);
    for (pos, fp) in &request.columns {
        gaps.push(Gap {
            weight: (*pos - prev_pos).to_f64().max(0.0),
            hard: prev.0 + fp.left,
            soft: prev.1 + fp.soft_left,
        });
        prev_pos = *pos;
        prev = (fp.right, fp.soft_right);
    }
    let last = request.columns.last().map_or(zero, |(_, fp)| *fp);
    let (tail_hard, tail_soft) = if request.columns.is_empty() {
        (prev.0 + request.end_inset, prev.1 + request.end_inset)
    } else {
        (last.right + request.end_inset, last.soft_right + request.end_inset)
    };
    gaps.push(Gap {
        weight: (end - prev_pos).to_f64().max(0.0),
        hard: tail_hard,
        soft: tail_soft,
    });
    gaps
}

/// Relax one set of requirements into `width`.
fn relax(weights: &[f64], required: &[f64], width: f64) -> (DispatchStatus, Vec<f64>) {
    let n = weights.len();
    let mut rigid: Vec<bool> = weights.iter().map(|w| *w <= EPSILON).collect();
    loop {
        let fixed: f64 = (0..n).filter(|i| rigid[*i]).map(|i| required[i]).sum();
        let pool = width - fixed;
        let free_weight: f64 = (0..n).filter(|i| !rigid[*i]).map(|i| weights[i]).sum();

        if free_weight <= EPSILON {
            if fixed > width + EPSILON {
                return (DispatchStatus::Dead, required.to_vec());
            }
            // Everything is rigid but fits: spread the slack by time.
            let total_weight: f64 = weights.iter().sum();
            let gaps = (0..n)
                .map(|i| {
                    let share = if total_weight > EPSILON {
                        weights[i] / total_weight
                    } else {
                        1.0 / n as f64
                    };
                    required[i] + pool * share
                })
                .collect();
            return (DispatchStatus::Pass, gaps);
        }

        let gaps: Vec<f64> = (0..n)
            .map(|i| {
                if rigid[i] {
                    required[i]
                } else {
                    pool.max(0.0) * weights[i] / free_weight
                }
            })
            .collect();
        let failing: Vec<usize> = (0..n)
            .filter(|i| !rigid[*i] && gaps[*i] + EPSILON < required[*i])
            .collect();
        if failing.is_empty() {
            let status = if pool < -EPSILON {
                DispatchStatus::Dead
            } else {
                DispatchStatus::Pass
            };
            return (status, gaps);
        }
        for i in failing {
            rigid[i] = true;
        }
    }
}

/// Lay out one section in `width`.
pub fn dispatch_compute(request: &SectionRequest, width: f64) -> Dispatch {
    let gaps = gaps_of(request);
    let weights: Vec<f64> = gaps.iter().map(|g| g.weight).collect();
    let hard: Vec<f64> = gaps.iter().map(|g| g.hard).collect();
    let soft: Vec<f64> = gaps.iter().map(|g| g.soft.max(g.hard)).collect();

    let (status, widths) = match relax(&weights, &soft, width) {
        (DispatchStatus::Pass, widths) => (DispatchStatus::Pass, widths),
        _ => relax(&weights, &hard, width),
    };
    let offsets = widths
        .iter()
        .take(request.columns.len())
        .scan(0.0, |x, w| {
            *x += w;
            Some(*x)
        })
        .collect();
    Dispatch {
        status,
        gaps: widths,
        offsets,
    }
}

/// Lays out whole lines with one measure and one set of render props.
pub struct PositionDispatcher<'a, M> {
    measure: &'a M,
    props: &'a RenderProps,
}

impl<'a, M: TextMeasure> PositionDispatcher<'a, M> {
    pub fn new(measure: &'a M, props: &'a RenderProps) -> Self {
        PositionDispatcher { measure, props }
    }

    pub fn dispatch(&self, line: &RenderLine) -> Vec<SectionLayout> {
        let line_width = self.props.line_width();
        let total_weight: f64 = line.columns.iter().map(|c| c.weight).sum();
        let mut x = 0.0;
        let mut out = Vec::with_capacity(line.columns.len());
        for (i, column) in line.columns.iter().enumerate() {
            let width = if total_weight > EPSILON {
                line_width * column.weight / total_weight
            } else {
                line_width / line.columns.len() as f64
            };
            let request = self.request(line, i);
            let dispatch = dispatch_compute(&request, width);
            let positions = request
                .columns
                .iter()
                .zip(&dispatch.offsets)
                .map(|((pos, _), offset)| PositionX { pos: *pos, x: x + offset })
                .collect();
            let used = dispatch.total().max(width);
            out.push(SectionLayout {
                index: column.index,
                x,
                width: used,
                status: dispatch.status,
                positions,
            });
            x += used;
        }
        out
    }

    /// Footprints of the `i`-th section of `line`.
    pub fn request(&self, line: &RenderLine, i: usize) -> SectionRequest {
        let note_size = self.props.note_size();
        let lyric_size = self.props.lyric_size();
        let chord_size = self.props.float("chord_size").unwrap_or(note_size * 0.7);
        let annotation_size = self.props.float("annotation_size").unwrap_or(note_size * 0.6);
        let force_size = self.props.float("force_size").unwrap_or(note_size * 0.6);

        let mut columns: BTreeMap<Frac, Footprint> = BTreeMap::new();
        let mut put = |pos: Frac, fp: Footprint| columns.entry(pos).or_default().merge(fp);

        for part in &line.parts {
            if let Some(section) = part.notes.get(i) {
                self.music_footprints(section, note_size, &mut put);
            }
            for row in &part.chords {
                self.text_footprints(row.get(i), chord_size, &mut put);
            }
            for row in &part.annotations {
                self.text_footprints(row.get(i), annotation_size, &mut put);
            }
            for row in &part.forces {
                self.text_footprints(row.get(i), force_size, &mut put);
            }
            for lyric in &part.lyric_lines {
                if let Some(section) = lyric.substitute.as_ref().and_then(|s| s.get(i)) {
                    self.music_footprints(section, note_size, &mut put);
                }
                for note in lyric.lyrics.get(i).into_iter().flatten() {
                    let LyricNoteContent::Chars { chars, .. } = &note.content else {
                        continue;
                    };
                    put(note.start_pos, self.syllable_footprint(chars, lyric_size));
                }
            }
        }

        let separator_inset = self.props.separator_inset();
        let beats_width = line
            .parts
            .first()
            .and_then(|p| p.notes.get(i))
            .and_then(|s| shown_beats(s, line.start + i == 0))
            .map_or(0.0, |text| self.measure.measure(&text, note_size));
        SectionRequest {
            length: line.columns.get(i).map_or(Frac::one(), |c| c.quarters),
            start_inset: separator_inset + beats_width,
            end_inset: separator_inset,
            columns: columns.into_iter().collect(),
        }
    }

    fn music_footprints(
        &self,
        section: &MusicSection<NoteCharMusic>,
        size: f64,
        put: &mut impl FnMut(Frac, Footprint),
    ) {
        for note in section.notes() {
            let width = match &note.kind {
                NoteKind::Note { char } => self.note_width(char, size),
                NoteKind::Extend => self.measure.measure("-", size),
            };
            put(note.start_pos, Footprint::hard(width / 2.0, width / 2.0));
        }
    }

    /// Accidentals sit left of the digit.
    fn note_width(&self, char: &NoteCharMusic, size: f64) -> f64 {
        self.measure.measure(&char.char.to_string(), size)
            + char.accidentals.len() as f64 * self.measure.accidental(size)
    }

    fn text_footprints<T: NoteChar>(
        &self,
        section: Option<&MusicSection<T>>,
        size: f64,
        put: &mut impl FnMut(Frac, Footprint),
    ) {
        for note in section.map_or(&[][..], |s| s.notes()) {
            if let Some(char) = note.char() {
                let width = self.measure.measure(&char.display(), size);
                put(note.start_pos, Footprint::soft(width / 2.0, width / 2.0));
            }
        }
    }

    fn syllable_footprint(&self, chars: &[LyricChar], size: f64) -> Footprint {
        let text: String = chars.iter().map(|c| format!("{}{}", c.prefix, c.text)).collect();
        let postfix: String = chars.iter().map(|c| c.postfix.as_str()).collect();
        let width = self.measure.measure(&text, size);
        let tail = self.measure.measure(&postfix, size);
        if chars.iter().any(|c| c.occupies_space) {
            Footprint {
                left: width / 2.0,
                right: width / 2.0,
                soft_left: width / 2.0,
                soft_right: width / 2.0 + tail,
            }
        } else {
            Footprint::soft(width / 2.0, width / 2.0 + tail)
        }
    }
}

/// The time signature printed at the start of a section, if any.
fn shown_beats<T: NoteChar>(section: &MusicSection<T>, first: bool) -> Option<String> {
    let changed = section
        .separator
        .before
        .attrs
        .own
        .iter()
        .find_map(|a| match a {
            SeparatorAttr::Beats { beats } => Some(beats.to_string()),
            _ => None,
        });
    match changed {
        Some(text) => Some(text),
        None if first => section.musical_props.beats.as_ref().map(|b| b.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(columns: Vec<(Frac, Footprint)>) -> SectionRequest {
        SectionRequest {
            length: Frac::from_int(4),
            start_inset: 2.0,
            end_inset: 2.0,
            columns,
        }
    }

    fn four_notes(width: f64) -> SectionRequest {
        request((0..4).map(|i| (Frac::from_int(i), Footprint::hard(width, width))).collect())
    }

    #[test]
    fn test_proportional_when_roomy() {
        let d = dispatch_compute(&four_notes(1.0), 100.0);
        assert_eq!(d.status, DispatchStatus::Pass);
        assert!((d.total() - 100.0).abs() < 1e-6);
        // The first gap spans no time and holds only its requirement.
        assert!((d.gaps[0] - 3.0).abs() < 1e-6);
        let spacing: Vec<f64> = d.offsets.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(spacing.iter().all(|s| (s - spacing[0]).abs() < 1e-6));
    }

    #[test]
    fn test_rigidifies_crowded_gaps() {
        let mut req = four_notes(1.0);
        req.columns[1].1 = Footprint::hard(10.0, 10.0);
        let d = dispatch_compute(&req, 60.0);
        assert_eq!(d.status, DispatchStatus::Pass);
        for (i, g) in gaps_of(&req).iter().enumerate() {
            assert!(d.gaps[i] + 1e-6 >= g.hard, "gap {} too small", i);
        }
    }

    #[test]
    fn test_dead_when_too_narrow() {
        let d = dispatch_compute(&four_notes(5.0), 20.0);
        assert_eq!(d.status, DispatchStatus::Dead);
        assert!(d.total() > 20.0);
    }

    #[test]
    fn test_wider_never_turns_dead() {
        let req = four_notes(3.0);
        let required: f64 = gaps_of(&req).iter().map(|g| g.hard).sum();
        let mut was_pass = false;
        for step in 0..40 {
            let width = required * 0.5 + step as f64 * 2.0;
            let status = dispatch_compute(&req, width).status;
            if width + 1e-9 >= required {
                assert_eq!(status, DispatchStatus::Pass, "width {}", width);
            }
            if was_pass {
                assert_eq!(status, DispatchStatus::Pass);
            }
            was_pass = status == DispatchStatus::Pass;
        }
    }

    #[test]
    fn test_soft_room_when_available() {
        let mut req = four_notes(1.0);
        req.columns[1].1.soft_right = 15.0;
        let roomy = dispatch_compute(&req, 100.0);
        assert!(roomy.gaps[2] + 1e-6 >= 16.0);
        let tight = dispatch_compute(&req, 20.0);
        assert_eq!(tight.status, DispatchStatus::Pass);
        assert!(tight.gaps[2] < 16.0);
    }
}
