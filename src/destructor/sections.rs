//! # Sections Parser
//!
//! Cuts a note row into sections at its separators.
//!
//! A separator is a run of touching `|`, `/` and `:` symbols. Its attributes
//! sit in three slots around it: `{pre}` right before the run, `[own]` touching
//! the end of the run, `{post}` after that. Between two separators lies exactly
//! one section; a row that does not open or close with a separator gets a
//! zero-width `/` there.
//!
//! Rows that accept variation let `beats`, `qpm` and shift attributes change
//! the props of every later section in the row.

use super::note_eater::{CharReader, NoteEater};
use super::props::{clamp_transpose, parse_prop_item, PropItem};
use super::{group_span, Source};
use crate::frac::Frac;
use crate::issue::{Issues, NO_ARGS};
use crate::model::props::{MusicProps, MusicPropsPatch};
use crate::model::section::{
    constrained_length, AttrSlot, IdCard, JumpKind, MusicSection, SectionBody, SectionContent, SectionSeparator,
    SectionSeparators, SectionValidation, SeparatorAttr, SeparatorAttrs, SeparatorChar, Shift,
};
use crate::sparse::{Bracket, BracketPair, SparseItem};
use crate::tokenizer::{Span, TokenKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// Most sections one `...N` may stand for.
const MAX_OMIT: usize = 4096;

static TIMES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^x(\d+)$").unwrap());
static ITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.?$").unwrap());

/// Where each section's props come from.
pub enum PropsSource<'a> {
    /// Start from this context and follow the row's own separators.
    Running(MusicProps),
    /// Follow another row section by section (the part's `N` row).
    Track {
        track: &'a [MusicProps],
        fallback: &'a MusicProps,
    },
}

pub struct ParsedSections<T> {
    pub sections: Vec<MusicSection<T>>,
    pub final_props: MusicProps,
    pub variation: MusicPropsPatch,
}

/// A separator run found in the row, with its attribute pairs.
struct Run<'a> {
    glyph: String,
    range: Span,
    pre: Option<&'a BracketPair>,
    own: Option<&'a BracketPair>,
    post: Option<&'a BracketPair>,
    /// First item belonging to the run, `pre` included.
    attr_start: usize,
    /// One past the last item belonging to the run, `post` included.
    attr_end: usize,
}

fn is_separator_symbol(item: &SparseItem) -> bool {
    item.token()
        .is_some_and(|t| t.kind == TokenKind::Symbol && matches!(t.content.as_str(), "|" | "/" | ":"))
}

fn find_runs<'a>(items: &[&'a SparseItem]) -> Vec<Run<'a>> {
    let mut runs: Vec<Run<'a>> = Vec::new();
    let mut i = 0;
    while i < items.len() {
        if !is_separator_symbol(items[i]) {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i + 1;
        while end < items.len()
            && is_separator_symbol(items[end])
            && items[end].range().start == items[end - 1].range().end
        {
            end += 1;
        }
        let run_end = items[end - 1].range().end;
        let glyph: String = items[start..end]
            .iter()
            .filter_map(|it| it.token())
            .map(|t| t.content.as_str())
            .collect();

        let mut cursor = end;
        let own = items
            .get(cursor)
            .and_then(|it| it.pair())
            .filter(|p| p.is(Bracket::Square) && p.range.start == run_end);
        if own.is_some() {
            cursor += 1;
        }
        let post = items.get(cursor).and_then(|it| it.pair()).filter(|p| p.is(Bracket::Curly));
        if post.is_some() {
            cursor += 1;
        }
        let taken = runs.last().map_or(0, |r| r.attr_end);
        let pre = if start > taken {
            items[start - 1].pair().filter(|p| p.is(Bracket::Curly))
        } else {
            None
        };

        runs.push(Run {
            glyph,
            range: items[start].range().join(&items[end - 1].range()),
            pre,
            own,
            post,
            attr_start: if pre.is_some() { start - 1 } else { start },
            attr_end: cursor,
        });
        i = cursor;
    }
    runs
}

/// Separator slots of a row and the item spans of the sections between
/// them. A `None` slot stands for a virtual separator at a row edge.
fn slots_of<'r, 'a>(runs: &'r [Run<'a>], len: usize) -> (Vec<Option<&'r Run<'a>>>, Vec<(usize, usize)>) {
    let mut slots = Vec::new();
    let mut spans = Vec::new();
    if runs.is_empty() {
        if len > 0 {
            slots.extend([None, None]);
            spans.push((0, len));
        }
        return (slots, spans);
    }
    if runs[0].attr_start > 0 {
        slots.push(None);
        spans.push((0, runs[0].attr_start));
    }
    for (k, run) in runs.iter().enumerate() {
        slots.push(Some(run));
        if let Some(next) = runs.get(k + 1) {
            spans.push((run.attr_end, next.attr_start));
        }
    }
    if let Some(last) = runs.last().filter(|r| r.attr_end < len) {
        spans.push((last.attr_end, len));
        slots.push(None);
    }
    (slots, spans)
}

/// Character range each section of a row reaches: from the end of the
/// separator before it to the start of the separator after it.
pub fn section_reach(items: &[&SparseItem]) -> Vec<Span> {
    let runs = find_runs(items);
    let (slots, spans) = slots_of(&runs, items.len());
    let edge_start = items.first().map_or(0, |i| i.range().start);
    let edge_end = items.last().map_or(0, |i| i.range().end);
    spans
        .iter()
        .enumerate()
        .map(|(k, _)| {
            let start = slots[k].map_or(edge_start, |r| r.range.end);
            let end = slots[k + 1].map_or(edge_end, |r| r.range.start);
            Span::new(start, end.max(start))
        })
        .collect()
}

pub struct SectionsParser<'s, R> {
    reader: R,
    source: &'s Source,
    line_number: usize,
}

impl<'s, R: CharReader> SectionsParser<'s, R> {
    pub fn new(reader: R, source: &'s Source, line_number: usize) -> Self {
        SectionsParser {
            reader,
            source,
            line_number,
        }
    }

    pub fn parse(&self, items: &[&SparseItem], props: PropsSource<'_>, issues: &mut Issues) -> ParsedSections<R::Char> {
        let runs = find_runs(items);
        let (slots, spans) = slots_of(&runs, items.len());

        let edge_start = items.first().map_or(0, |i| i.range().start);
        let edge_end = items.last().map_or(0, |i| i.range().end);
        let count = slots.len();
        let separators: Vec<SectionSeparator> = slots
            .iter()
            .enumerate()
            .map(|(k, slot)| match slot {
                Some(run) => self.separator(run, k == 0, k + 1 == count, issues),
                None if k == 0 => SectionSeparator::virtual_at(edge_start),
                None => SectionSeparator::virtual_at(edge_end),
            })
            .collect();

        let (mut ctx, fixed) = match props {
            PropsSource::Running(ctx) => (ctx, None),
            PropsSource::Track { track, fallback } => (fallback.clone(), Some((track, fallback))),
        };
        let mut variation = MusicPropsPatch::default();
        let mut sections = Vec::with_capacity(spans.len());

        for (k, (a, b)) in spans.iter().copied().enumerate() {
            let before = &separators[k];
            let after = &separators[k + 1];
            let section_props = match fixed {
                Some((track, fallback)) => track.get(k).or(track.last()).unwrap_or(fallback).clone(),
                None => {
                    let patch = self.variation_of(before, &ctx, issues);
                    if !patch.is_empty() {
                        ctx = ctx.apply(&patch);
                        variation = variation.merge(&patch);
                    }
                    ctx.clone()
                }
            };

            let content = &items[a..b];
            let range = match (content.first(), content.last()) {
                (Some(first), Some(last)) => first.range().join(&last.range()),
                _ => Span::empty_at(before.range.end),
            };
            let body = self.body(content, range, &section_props, after.char, issues);
            sections.push(MusicSection {
                id_card: IdCard::new(self.line_number, k),
                range,
                ordinal: 0,
                start_pos: Frac::zero(),
                separator: SectionSeparators {
                    before: before.clone(),
                    after: after.clone(),
                    next: after.char.before(),
                },
                musical_props: section_props,
                structure_validation: None,
                body,
            });
        }

        let final_props = match fixed {
            Some((track, fallback)) => track.last().unwrap_or(fallback).clone(),
            None => ctx,
        };
        log::trace!("line {}: {} sections", self.line_number, sections.len());
        ParsedSections {
            sections,
            final_props,
            variation,
        }
    }

    fn separator(&self, run: &Run<'_>, is_begin: bool, is_end: bool, issues: &mut Issues) -> SectionSeparator {
        let char = match SeparatorChar::parse(&run.glyph) {
            Some(c) => c,
            None => {
                issues.error(self.line_number, run.range.start, "unknown_section_separator", [&run.glyph]);
                SeparatorChar::SlashBar
            }
        };
        if is_begin && !is_end && !char.begin_ok() {
            issues.warn(self.line_number, run.range.start, "separator_begin", [char.glyph()]);
        }
        if is_end && !is_begin && !char.end_ok() {
            issues.warn(self.line_number, run.range.start, "separator_end", [char.glyph()]);
        }
        let mut attrs = SeparatorAttrs::default();
        let slots = [
            (run.pre, AttrSlot::Pre),
            (run.own, AttrSlot::Own),
            (run.post, AttrSlot::Post),
        ];
        for (pair, slot) in slots {
            let Some(pair) = pair else {
                continue;
            };
            let parsed = self.attrs(pair, slot, is_begin, is_end, issues);
            match slot {
                AttrSlot::Pre => attrs.pre = parsed,
                AttrSlot::Own => attrs.own = parsed,
                AttrSlot::Post => attrs.post = parsed,
            }
        }
        SectionSeparator {
            char,
            attrs,
            range: run.range,
        }
    }

    fn attrs(
        &self,
        pair: &BracketPair,
        slot: AttrSlot,
        is_begin: bool,
        is_end: bool,
        issues: &mut Issues,
    ) -> Vec<SeparatorAttr> {
        let mut out = Vec::new();
        for group in pair.non_empty_groups() {
            let Some(span) = group_span(group) else {
                continue;
            };
            let attr = match group {
                [SparseItem::Token(t)] if t.kind == TokenKind::StringLiteral => Some(SeparatorAttr::Label {
                    text: t.content.clone(),
                }),
                _ => parse_separator_attr(&self.source.slice(span), self.line_number, span.start, issues),
            };
            let Some(attr) = attr else {
                continue;
            };
            let misplaced = !attr.allowed_in(slot)
                || (slot == AttrSlot::Own && is_begin && attr.forbidden_at_begin())
                || (slot == AttrSlot::Own && is_end && attr.forbidden_at_end());
            if misplaced {
                issues.warn(self.line_number, span.start, "separator_attr_position", [attr.name()]);
                continue;
            }
            out.push(attr);
        }
        out
    }

    /// Props changes carried by the separator before a section.
    fn variation_of(&self, sep: &SectionSeparator, ctx: &MusicProps, issues: &mut Issues) -> MusicPropsPatch {
        let mut patch = MusicPropsPatch::default();
        for attr in &sep.attrs.own {
            match attr {
                SeparatorAttr::Beats { beats } => patch.beats = Some(beats.clone()),
                SeparatorAttr::Qpm { qpm } => patch.qpm = Some(qpm.clone()),
                SeparatorAttr::Shift {
                    shift: Shift::Transpose { semitones },
                } => {
                    let base = patch.transpose.unwrap_or(ctx.transpose);
                    patch.transpose = Some(clamp_transpose(
                        base + semitones,
                        self.line_number,
                        sep.range.start,
                        issues,
                    ));
                }
                SeparatorAttr::Shift {
                    shift: Shift::Tuning { base },
                } => patch.base = Some(base.clone()),
                _ => {}
            }
        }
        patch
    }

    fn body(
        &self,
        content: &[&SparseItem],
        range: Span,
        props: &MusicProps,
        after: SeparatorChar,
        issues: &mut Issues,
    ) -> SectionBody<R::Char> {
        if content.is_empty() {
            issues.error(self.line_number, range.start, "empty_section", NO_ARGS);
            return SectionBody::Empty;
        }
        let text = self.source.slice(range);
        if let Some(rest) = text.strip_prefix("...") {
            if rest.is_empty() {
                return SectionBody::Omit { count: None };
            }
            return match rest.parse::<usize>() {
                Ok(n) if (1..=MAX_OMIT).contains(&n) && rest.chars().all(|c| c.is_ascii_digit()) => SectionBody::Omit { count: Some(n) },
                _ => {
                    issues.error(self.line_number, range.start, "bad_omit", [&text]);
                    SectionBody::Empty
                }
            };
        }

        let eaten = NoteEater::new(&self.reader, self.source, props, self.line_number).eat(content, issues);
        let validation = match constrained_length(props, after).map(|len| eaten.total.cmp(&len)) {
            Some(Ordering::Less) => SectionValidation::Less,
            Some(Ordering::Greater) => SectionValidation::More,
            _ => SectionValidation::Ok,
        };
        SectionBody::Section(SectionContent {
            notes: eaten.notes,
            decoration: eaten.decorations,
            total_quarters: eaten.total,
            validation,
            left_split: false,
            left_split_void: false,
            right_split: false,
        })
    }
}

/// One item of a separator attribute bracket.
pub fn parse_separator_attr(text: &str, line_number: usize, index: usize, issues: &mut Issues) -> Option<SeparatorAttr> {
    let fixed = match text {
        "reset" => Some(SeparatorAttr::Reset),
        "$" => Some(SeparatorAttr::Segno),
        "@" => Some(SeparatorAttr::Portal),
        "D.S." | "D.S" => Some(SeparatorAttr::Jump { jump: JumpKind::DalSegno }),
        "D.C." | "D.C" => Some(SeparatorAttr::Jump { jump: JumpKind::DaCapo }),
        "Fine." | "Fine" => Some(SeparatorAttr::Jump { jump: JumpKind::Fine }),
        _ => None,
    };
    if fixed.is_some() {
        return fixed;
    }
    let positive = |s: &str| s.parse::<u32>().ok().filter(|n| *n > 0);
    if let Some(count) = TIMES.captures(text).and_then(|c| positive(&c[1])) {
        return Some(SeparatorAttr::Times { count });
    }
    if let Some(number) = ITER.captures(text).and_then(|c| positive(&c[1])) {
        return Some(SeparatorAttr::Iter { number });
    }
    if let Some(w) = text.strip_prefix("w=") {
        return match w.parse::<f64>().ok().filter(|w| w.is_finite() && *w > 0.0) {
            Some(weight) => Some(SeparatorAttr::Weight { weight }),
            None => {
                issues.warn(line_number, index, "unknown_separator_attr", [text]);
                None
            }
        };
    }
    match parse_prop_item(text, line_number, index, issues)? {
        PropItem::Transpose(semitones) => Some(SeparatorAttr::Shift {
            shift: Shift::Transpose { semitones },
        }),
        PropItem::Base(base) => Some(SeparatorAttr::Shift {
            shift: Shift::Tuning { base },
        }),
        PropItem::Qpm(qpm) => Some(SeparatorAttr::Qpm { qpm }),
        PropItem::Beats(beats) => Some(SeparatorAttr::Beats { beats }),
        PropItem::Reduction(_) | PropItem::Extra(_) => {
            issues.warn(line_number, index, "unknown_separator_attr", [text]);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(text: &str) -> Option<SeparatorAttr> {
        parse_separator_attr(text, 0, 0, &mut Issues::new())
    }

    #[test]
    fn test_separator_attr_forms() {
        assert_eq!(attr("2."), Some(SeparatorAttr::Iter { number: 2 }));
        assert_eq!(attr("x3"), Some(SeparatorAttr::Times { count: 3 }));
        assert_eq!(attr("D.C."), Some(SeparatorAttr::Jump { jump: JumpKind::DaCapo }));
        assert_eq!(attr("w=2"), Some(SeparatorAttr::Weight { weight: 2.0 }));
        assert!(matches!(attr("3/4"), Some(SeparatorAttr::Beats { .. })));
        assert!(matches!(
            attr("-2"),
            Some(SeparatorAttr::Shift {
                shift: Shift::Transpose { .. }
            })
        ));
        assert!(matches!(
            attr("1=G"),
            Some(SeparatorAttr::Shift {
                shift: Shift::Tuning { .. }
            })
        ));
        let mut issues = Issues::new();
        assert_eq!(parse_separator_attr("wobble", 0, 0, &mut issues), None);
        assert_eq!(issues.keys(), vec!["unknown_separator_attr"]);
    }
}
