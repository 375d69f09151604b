//! # Sequence Reader
//!
//! Walks a flattened music article the way a performer reads it and writes
//! down every section played, in order.
//!
//! ## Iterations
//! The walk is split into iterations. An iteration is a run of sections
//! played on one pass, and its `number` is the pass number that volta
//! brackets (`[1.]`, `J: 3-4[2.]`) test against. Every backward jump opens
//! the next iteration; a `reset` separator attribute starts over at 1.
//!
//! ## Structure markers
//! - `:||` jumps back to the nearest `||:` that plays on the next pass (or
//!   the start). With `[xN]` it does so `N - 1` times, without it every
//!   time it is reached.
//! - `[1.]` on a separator plays the sections behind it only on pass 1.
//! - `D.S.` / `D.C.` jump once to the nearest `$` before them / the start.
//! - `Fine.` ends the walk once a later marker has been used.
//! - `@` skips ahead to the next `@` once a later marker has been used.
//! - `|||` ends the walk.
//!
//! ## Safety valve
//! A broken structure can loop forever (a bare `||: ... :||` does). The
//! reader opens at most `iteration_limit` iterations; past that it raises
//! `repeat_overflow`, sets [`SequenceArticle::overflow`] and stops.
//!
//! ## Flat pass
//! With `flat` set the article is read straight through once, ignoring all
//! markers, as iteration `0`. [`SequenceReader::sequence`] puts that pass
//! in front of the performed ones.

#[cfg(test)]
mod tests;

use crate::columns::FlatArticle;
use crate::issue::Issues;
use crate::model::note::{NoteChar, NoteCharMusic, NoteKind};
use crate::model::props::{Beats, MusicProps};
use crate::model::section::{JumpKind, MusicSection, SectionSeparators};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Number of the flat pass.
pub const FLAT_ITERATION: u32 = 0;

/// Performed timeline of one music article.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceArticle {
    /// The walk was cut short by the iteration limit.
    pub overflow: bool,
    /// Some section was played twice within one iteration.
    pub conflict: bool,
    /// Global indices of those sections.
    pub conflicted_sections: Vec<usize>,
    pub iterations: Vec<SequenceIteration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceIteration {
    pub number: u32,
    pub sections: Vec<SequenceSection>,
}

/// One section as performed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSection {
    /// Global section index in the article.
    pub index: usize,
    pub measure_number: usize,
    pub parts: Vec<SequencePartInfo>,
    /// Quarters per minute: the slowest voice wins.
    pub qpm: f64,
    pub beats: Option<Beats>,
    pub length_quarters: f64,
    pub length_millis: f64,
    pub start_millis: f64,
}

/// What one voice plays in a performed section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencePartInfo {
    pub signature: String,
    pub section: MusicSection<NoteCharMusic>,
    /// Props in effect on this pass, jumper octave included.
    pub props: MusicProps,
}

/// A sounding note on the absolute time line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedNote {
    pub signature: String,
    /// MIDI number, possibly fractional.
    pub pitch: f64,
    pub start_millis: f64,
    pub length_millis: f64,
}

impl SequenceSection {
    /// Sounding notes of this section. Tied and `-` continuations lengthen
    /// the note before them within the section.
    pub fn notes(&self) -> Vec<SequencedNote> {
        collect_notes(std::iter::once(self))
    }
}

impl SequenceArticle {
    /// Length of the performance, flat pass excluded.
    pub fn total_millis(&self) -> f64 {
        self.performed().map(|s| s.length_millis).sum()
    }

    /// Sounding notes of the performance, with ties merged across sections.
    pub fn notes(&self) -> Vec<SequencedNote> {
        collect_notes(self.performed())
    }

    fn performed(&self) -> impl Iterator<Item = &SequenceSection> {
        self.iterations
            .iter()
            .filter(|i| i.number != FLAT_ITERATION)
            .flat_map(|i| i.sections.iter())
    }
}

fn collect_notes<'a>(sections: impl Iterator<Item = &'a SequenceSection>) -> Vec<SequencedNote> {
    let mut out: Vec<SequencedNote> = Vec::new();
    // Last sounding note per voice, as an index into `out`.
    let mut last: HashMap<&str, usize> = HashMap::new();
    for section in sections {
        let millis_per_quarter = 60_000.0 / section.qpm;
        for part in &section.parts {
            let key = part.signature.as_str();
            for note in part.section.notes() {
                let start = section.start_millis + note.start_pos.to_f64() * millis_per_quarter;
                let length = note.length.to_f64() * millis_per_quarter;
                let pitch = match &note.kind {
                    NoteKind::Note { char } if !note.voided => {
                        if char.is_sounding() && !char.is_drum() {
                            char.semitones(&part.props)
                        } else {
                            None
                        }
                    }
                    // A `-` is eaten as its own Extend note; adding its length
                    // here gives the same sounding note as lengthening the
                    // note before it in place.
                    _ => {
                        if let Some(held) = last.get(key).and_then(|i| out.get_mut(*i)) {
                            held.length_millis += length;
                        }
                        continue;
                    }
                };
                match pitch {
                    Some(pitch) => {
                        last.insert(key, out.len());
                        out.push(SequencedNote {
                            signature: part.signature.clone(),
                            pitch,
                            start_millis: start,
                            length_millis: length,
                        });
                    }
                    None => {
                        last.remove(key);
                    }
                }
            }
        }
    }
    out
}

/// Walks articles with a fixed iteration limit and fallback speed.
#[derive(Debug, Clone)]
pub struct SequenceReader {
    iteration_limit: usize,
    default_qpm: f64,
}

impl SequenceReader {
    pub fn new(iteration_limit: usize, default_qpm: f64) -> Self {
        SequenceReader {
            iteration_limit,
            default_qpm,
        }
    }

    /// Flat pass followed by the performed passes. Conflicted sections are
    /// flagged on the article.
    pub fn sequence(&self, article: &mut FlatArticle, issues: &mut Issues) -> SequenceArticle {
        let flat = self.read(article, true, issues);
        let mut performed = self.read(article, false, issues);
        for index in &performed.conflicted_sections {
            article.mark_conflict(*index);
        }
        let mut iterations = flat.iterations;
        iterations.append(&mut performed.iterations);
        SequenceArticle {
            overflow: performed.overflow,
            conflict: performed.conflict,
            conflicted_sections: performed.conflicted_sections,
            iterations,
        }
    }

    /// One pass over `article`, performed or flat.
    pub fn read(&self, article: &FlatArticle, flat: bool, issues: &mut Issues) -> SequenceArticle {
        let mut walk = Walk::new(self, article, flat);
        walk.run(issues);
        log::debug!(
            "sequenced article at line {}: {} iterations{}",
            article.line_number,
            walk.iterations.len(),
            if walk.overflow { ", overflowed" } else { "" }
        );
        SequenceArticle {
            overflow: walk.overflow,
            conflict: !walk.conflicts.is_empty(),
            conflicted_sections: walk.conflicts.into_iter().collect(),
            iterations: walk.iterations,
        }
    }
}

enum Step {
    Next,
    Goto(usize),
    Stop,
}

struct Walk<'a> {
    reader: &'a SequenceReader,
    article: &'a FlatArticle,
    flat: bool,
    cursor: usize,
    iterations: Vec<SequenceIteration>,
    overflow: bool,
    clock: f64,
    /// Pass numbers each section has been played on.
    passed: Vec<HashSet<u32>>,
    /// How often a marker at each section has been used.
    damage: Vec<u32>,
    /// Repeat jumps taken from each section.
    jumps: Vec<u32>,
    visited: Vec<bool>,
    conflicts: BTreeSet<usize>,
}

impl<'a> Walk<'a> {
    fn new(reader: &'a SequenceReader, article: &'a FlatArticle, flat: bool) -> Self {
        let n = article.section_count();
        Walk {
            reader,
            article,
            flat,
            cursor: 0,
            iterations: Vec::new(),
            overflow: false,
            clock: 0.0,
            passed: vec![HashSet::new(); n],
            damage: vec![0; n],
            jumps: vec![0; n],
            visited: vec![false; n],
            conflicts: BTreeSet::new(),
        }
    }

    fn number(&self) -> u32 {
        self.iterations.last().map_or(FLAT_ITERATION, |i| i.number)
    }

    /// Separators of a column, from the first voice that plays there.
    fn separators(&self, k: usize) -> Option<&'a SectionSeparators> {
        let parts = &self.article.parts;
        parts
            .iter()
            .filter_map(|p| p.notes.get(k))
            .find(|s| !s.is_nullish())
            .or_else(|| parts.first().and_then(|p| p.notes.get(k)))
            .map(|s| &s.separator)
    }

    fn open_iteration(&mut self, number: u32, issues: &mut Issues) -> bool {
        if self.iterations.len() >= self.reader.iteration_limit {
            self.overflow = true;
            let (line_number, index) = self.location(self.cursor);
            issues.error(line_number, index, "repeat_overflow", [self.reader.iteration_limit]);
            log::warn!(
                "article at line {}: repeat structure exceeds {} iterations",
                self.article.line_number,
                self.reader.iteration_limit
            );
            return false;
        }
        self.iterations.push(SequenceIteration {
            number,
            sections: Vec::new(),
        });
        true
    }

    fn location(&self, k: usize) -> (usize, usize) {
        self.article
            .parts
            .iter()
            .filter_map(|p| p.notes.get(k))
            .find(|s| !s.is_nullish())
            .map_or((self.article.line_number, 0), |s| (s.id_card.line_number, s.range.start))
    }

    fn run(&mut self, issues: &mut Issues) {
        let first = if self.flat { FLAT_ITERATION } else { 1 };
        if !self.open_iteration(first, issues) {
            return;
        }
        let n = self.article.section_count();
        while self.cursor < n {
            let Some(separators) = self.separators(self.cursor) else {
                break;
            };
            if !self.flat {
                if let Some(target) = self.skip_target(separators) {
                    self.cursor = target;
                    continue;
                }
                if separators.before.attrs.has_reset() && !self.reset(issues) {
                    return;
                }
            }

            self.play(issues);

            let step = if self.flat { Step::Next } else { self.after(separators) };
            match step {
                Step::Next => self.cursor += 1,
                Step::Stop => break,
                Step::Goto(target) => {
                    let number = self.number() + 1;
                    if !self.open_iteration(number, issues) {
                        return;
                    }
                    self.cursor = target;
                }
            }
        }
    }

    /// Where to go instead of playing the section at the cursor, if anywhere.
    fn skip_target(&self, separators: &SectionSeparators) -> Option<usize> {
        let k = self.cursor;
        let number = self.number();
        if let Some(jumper) = self
            .article
            .jumpers
            .iter()
            .find(|j| j.start == k && !j.accepts(number))
        {
            return Some(jumper.end.max(k + 1));
        }
        let voltas = separators.before.attrs.iterations();
        if !voltas.is_empty() && !voltas.contains(&number) {
            return Some(self.volta_end(k));
        }
        if separators.before.attrs.has_portal() && !self.passed[k].is_empty() && self.used_after(k) {
            let n = self.article.section_count();
            let next = (k + 1..n).find(|i| self.separators(*i).is_some_and(|s| s.before.attrs.has_portal()));
            return Some(next.unwrap_or(n));
        }
        None
    }

    /// End of the volta bracket opening at `k`.
    fn volta_end(&self, k: usize) -> usize {
        let n = self.article.section_count();
        for i in k..n {
            let Some(separators) = self.separators(i) else {
                break;
            };
            if i > k && !separators.before.attrs.iterations().is_empty() {
                return i;
            }
            if separators.after.char.is_repeat_end() || separators.after.char.is_terminal() {
                return i + 1;
            }
        }
        n
    }

    /// Some marker after `k` has been used.
    fn used_after(&self, k: usize) -> bool {
        self.damage.iter().skip(k + 1).any(|d| *d > 0)
    }

    fn reset(&mut self, issues: &mut Issues) -> bool {
        match self.iterations.last_mut() {
            Some(current) if current.sections.is_empty() => {
                current.number = 1;
                true
            }
            _ => self.open_iteration(1, issues),
        }
    }

    fn play(&mut self, issues: &mut Issues) {
        let k = self.cursor;
        let number = self.number();
        if !self.passed[k].insert(number) && self.conflicts.insert(k) {
            let (line_number, index) = self.location(k);
            issues.warn(line_number, index, "repeat_conflict", [(k + 1) as u64, u64::from(number)]);
        }

        let section = self.build_section(k, number);
        if !self.visited[k] {
            self.visited[k] = true;
            self.check_mismatch(&section, issues);
        }
        self.clock += section.length_millis;
        if let Some(current) = self.iterations.last_mut() {
            current.sections.push(section);
        }
    }

    fn build_section(&self, k: usize, number: u32) -> SequenceSection {
        let octave: f64 = if self.flat {
            0.0
        } else {
            self.article
                .jumpers
                .iter()
                .filter(|j| j.contains(k) && j.accepts(number))
                .map(|j| f64::from(j.octave))
                .sum()
        };
        let parts: Vec<SequencePartInfo> = self
            .article
            .parts
            .iter()
            .filter_map(|part| {
                let substitute = if self.flat {
                    None
                } else {
                    part.lyric_lines
                        .iter()
                        .filter(|l| l.passes.contains(&number))
                        .filter_map(|l| l.substitute.as_ref().and_then(|s| s.get(k)))
                        .find(|s| !s.is_nullish())
                };
                let section = substitute.or_else(|| part.notes.get(k)).filter(|s| !s.is_nullish())?;
                let mut props = section.musical_props.clone();
                props.transpose += 12.0 * octave;
                Some(SequencePartInfo {
                    signature: part.signature.clone(),
                    section: section.clone(),
                    props,
                })
            })
            .collect();

        let qpm = parts
            .iter()
            .filter_map(|p| p.props.qpm.as_ref().map(|q| q.quarters_per_minute()))
            .fold(None, |acc: Option<f64>, q| Some(acc.map_or(q, |a| a.min(q))))
            .unwrap_or(self.reader.default_qpm);
        let column = &self.article.columns[k];
        let length_quarters = column.quarters.to_f64();
        SequenceSection {
            index: k,
            measure_number: column.measure_number,
            beats: parts.first().and_then(|p| p.props.beats.clone()),
            parts,
            qpm,
            length_quarters,
            length_millis: length_quarters * 60_000.0 / qpm,
            start_millis: self.clock,
        }
    }

    fn check_mismatch(&self, section: &SequenceSection, issues: &mut Issues) {
        let (line_number, index) = self.location(section.index);
        if self.flat {
            let mut beats = section.parts.iter().filter_map(|p| p.props.beats.as_ref());
            if let Some(first) = beats.next() {
                if beats.any(|b| b != first) {
                    issues.warn(line_number, index, "beats_mismatch", [section.measure_number]);
                }
            }
        } else {
            let mut speeds = section
                .parts
                .iter()
                .filter_map(|p| p.props.qpm.as_ref().map(|q| q.quarters_per_minute()));
            if let Some(first) = speeds.next() {
                if speeds.any(|q| (q - first).abs() > 1e-9) {
                    issues.warn(line_number, index, "qpm_mismatch", [section.measure_number]);
                }
            }
        }
    }

    /// What the separator after the cursor asks for.
    fn after(&mut self, separators: &SectionSeparators) -> Step {
        let k = self.cursor;
        let after = &separators.after;

        match after.attrs.jump() {
            Some(JumpKind::DalSegno | JumpKind::DaCapo) if self.damage[k] == 0 => {
                self.damage[k] += 1;
                let target = match after.attrs.jump() {
                    Some(JumpKind::DalSegno) => self.segno_before(k),
                    _ => 0,
                };
                return Step::Goto(target);
            }
            Some(JumpKind::Fine) if self.used_after(k) => return Step::Stop,
            _ => {}
        }

        if after.char.is_repeat_end() {
            let go = after.attrs.times().map_or(true, |times| self.jumps[k] + 1 < times);
            if go {
                self.jumps[k] += 1;
                self.damage[k] += 1;
                return Step::Goto(self.repeat_start_before(k));
            }
        }
        if after.char.is_terminal() {
            return Step::Stop;
        }
        Step::Next
    }

    fn segno_before(&self, k: usize) -> usize {
        (0..=k)
            .rev()
            .find(|i| self.separators(*i).is_some_and(|s| s.before.attrs.has_segno()))
            .unwrap_or(0)
    }

    /// Nearest `||:` at or before `k` whose section plays on the next pass.
    fn repeat_start_before(&self, k: usize) -> usize {
        let next = self.number() + 1;
        (0..=k)
            .rev()
            .filter(|i| self.separators(*i).is_some_and(|s| s.before.char.is_repeat_start()))
            .find(|i| self.admits(*i, next))
            .unwrap_or(0)
    }

    /// Neither a volta bracket nor a jumper keeps section `k` out of pass `number`.
    fn admits(&self, k: usize, number: u32) -> bool {
        let Some(separators) = self.separators(k) else {
            return false;
        };
        let voltas = separators.before.attrs.iterations();
        (voltas.is_empty() || voltas.contains(&number))
            && !self.article.jumpers.iter().any(|j| j.contains(k) && !j.accepts(number))
    }
}
