//! `J:` lines: `3-4[1.] 5[2.,+1]` picks section ranges of the fragment that
//! only play on some passes, optionally an octave off.

use super::{chunks, group_span, Chunk, Source};
use crate::issue::Issues;
use crate::model::jumper::Jumper;
use crate::sparse::{Bracket, SparseItem};
use crate::tokenizer::Span;
use once_cell::sync::Lazy;
use regex::Regex;

static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());
static PASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.?$").unwrap());
static OCTAVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]\d+$").unwrap());

pub fn parse_jumpers(items: &[&SparseItem], source: &Source, line_number: usize, issues: &mut Issues) -> Vec<Jumper> {
    chunks(items.iter().copied(), source)
        .iter()
        .filter_map(|chunk| parse_jumper(chunk, source, line_number, issues))
        .collect()
}

fn parse_jumper(chunk: &Chunk<'_>, source: &Source, line_number: usize, issues: &mut Issues) -> Option<Jumper> {
    let attrs = chunk
        .items
        .last()
        .and_then(|i| i.pair())
        .filter(|p| p.is(Bracket::Square) && chunk.items.len() > 1);
    let head = match attrs {
        Some(pair) => source.slice(Span::new(chunk.range.start, pair.range.start)),
        None => chunk.text.clone(),
    };

    let Some(caps) = RANGE.captures(&head) else {
        issues.warn(line_number, chunk.range.start, "bad_jumper", [&chunk.text]);
        return None;
    };
    let start: usize = caps[1].parse().ok()?;
    let end: usize = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => start,
    };
    if start == 0 || end < start {
        issues.warn(line_number, chunk.range.start, "bad_jumper", [&chunk.text]);
        return None;
    }

    let mut jumper = Jumper {
        start: start - 1,
        end,
        iterations: Vec::new(),
        octave: 0,
        range: chunk.range,
    };
    for group in attrs.into_iter().flat_map(|p| p.non_empty_groups()) {
        let Some(span) = group_span(group) else {
            continue;
        };
        let text = source.slice(span);
        if let Some(n) = PASS.captures(&text).and_then(|c| c[1].parse::<u32>().ok()).filter(|n| *n > 0) {
            jumper.iterations.push(n);
        } else if let Some(octave) = octave_of(&text) {
            jumper.octave = octave;
        } else {
            issues.warn(line_number, span.start, "bad_jumper", [&text]);
        }
    }
    Some(jumper)
}

fn octave_of(text: &str) -> Option<i32> {
    if !OCTAVE.is_match(text) {
        return None;
    }
    text.trim_start_matches('+').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, ClassifiedLine};
    use crate::sparse::SparseBuilder;

    fn jumpers(code: &str) -> (Vec<Jumper>, Issues) {
        let mut issues = Issues::new();
        let line = classify(code, &mut issues)
            .into_iter()
            .find_map(|l| match l {
                ClassifiedLine::Command(c) => Some(c),
                _ => None,
            })
            .unwrap();
        let sparse = SparseBuilder::parse(&line, &mut issues);
        let source = Source::of(&sparse);
        let items: Vec<&SparseItem> = sparse.content.items().collect();
        let out = parse_jumpers(&items, &source, 0, &mut issues);
        (out, issues)
    }

    #[test]
    fn test_ranges_and_attrs() {
        let (js, issues) = jumpers("J: 3-4[1.] 5[2, -1]");
        assert!(issues.is_empty(), "{:?}", issues.keys());
        assert_eq!(js.len(), 2);
        assert_eq!((js[0].start, js[0].end), (2, 4));
        assert_eq!(js[0].iterations, vec![1]);
        assert_eq!((js[1].start, js[1].end), (4, 5));
        assert_eq!(js[1].iterations, vec![2]);
        assert_eq!(js[1].octave, -1);
    }

    #[test]
    fn test_bad_items() {
        let (js, issues) = jumpers("J: 4-2 x 2[zz]");
        assert_eq!(js.len(), 1);
        assert_eq!(issues.keys(), vec!["bad_jumper", "bad_jumper", "bad_jumper"]);
    }
}
