use super::*;
use crate::classifier::classify;
use crate::columns::{ColumnStater, FlatEntry};
use crate::destructor::Destructor;
use crate::line_tree::LineTreeBuilder;
use crate::model::render::RenderProps;
use crate::model::section::StructureValidation;

fn article(text: &str) -> (FlatArticle, Issues) {
    let mut issues = Issues::new();
    let lines = classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    let tree = Destructor::destruct(tree, &mut issues);
    let flat = ColumnStater::flatten(&tree, &RenderProps::new(), &mut issues).unwrap();
    let article = flat
        .articles
        .into_iter()
        .find_map(|a| match a {
            FlatEntry::Music(m) => Some(m),
            FlatEntry::Text(_) => None,
        })
        .unwrap();
    (article, issues)
}

fn reader() -> SequenceReader {
    SequenceReader::new(64, 120.0)
}

fn performed(text: &str) -> (SequenceArticle, Issues) {
    let (article, _) = article(text);
    let mut issues = Issues::new();
    let seq = reader().read(&article, false, &mut issues);
    (seq, issues)
}

/// Iteration numbers and section indices, 1-based for readability.
fn walk_of(seq: &SequenceArticle) -> Vec<(u32, Vec<usize>)> {
    seq.iterations
        .iter()
        .map(|i| (i.number, i.sections.iter().map(|s| s.index + 1).collect()))
        .collect()
}

#[test]
fn test_straight_through() {
    let (seq, issues) = performed("P: 4/4 qpm=120\nN: 1 2 3 4|5 6 7 1'|");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2])]);
    let second = &seq.iterations[0].sections[1];
    assert!((second.length_millis - 2000.0).abs() < 1e-9);
    assert!((second.start_millis - 2000.0).abs() < 1e-9);
    assert!((seq.total_millis() - 4000.0).abs() < 1e-9);
}

#[test]
fn test_repeat_times() {
    let (seq, issues) = performed("P: 4/4\nN: 1 1 1 1||:2 2 2 2:||[x3] 3 3 3 3|||");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2]), (2, vec![2]), (3, vec![2, 3])]);
    assert!(!seq.overflow);
}

#[test]
fn test_volta_brackets() {
    let (seq, _) = performed("P: 4/4\nN: ||: 1 1 1 1|[1.] 2 2 2 2:||[2.] 3 3 3 3|||");
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2]), (2, vec![1, 3])]);
}

#[test]
fn test_jumper_ranges() {
    let (seq, _) = performed("P: 4/4\nJ: 2[1.] 3[2.,+1]\nN: ||: 1 1 1 1|2 2 2 2|3 3 3 3|4 4 4 4:||[x2] 5 5 5 5|");
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2, 4]), (2, vec![1, 3, 4, 5])]);
    let shifted = &seq.iterations[1].sections[1].parts[0].props;
    assert!((shifted.transpose - 12.0).abs() < 1e-9);
}

#[test]
fn test_da_capo_al_fine() {
    let (seq, _) = performed("P: 4/4\nN: 1 1 1 1|2 2 2 2|[Fine.] 3 3 3 3|[D.C.] 4 4 4 4");
    // `Fine.` on the separator after section 2, `D.C.` after section 3.
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2, 3]), (2, vec![1, 2])]);
}

#[test]
fn test_dal_segno() {
    let (seq, _) = performed("P: 4/4\nN: 1 1 1 1|[$] 2 2 2 2|[D.S.] 3 3 3 3|");
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2]), (2, vec![2, 3])]);
}

#[test]
fn test_portal_skips_to_next_portal() {
    let (seq, issues) =
        performed("P: 4/4\nN: 1 1 1 1|[$] 2 2 2 2|[@] 3 3 3 3|4 4 4 4|[D.S.] 5 5 5 5|[@] 6 6 6 6|||");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2, 3, 4]), (2, vec![2, 6])]);
}

#[test]
fn test_repeat_start_gated_by_jumper() {
    // The inner `||:` only plays on pass 1, so the repeat goes back to the outer one.
    let (seq, _) = performed("P: 4/4\nJ: 2[1.]\nN: ||: 1 1 1 1||: 2 2 2 2|3 3 3 3:||[x2] 4 4 4 4|||");
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2, 3]), (2, vec![1, 3, 4])]);
}

#[test]
fn test_repeat_start_gated_by_volta() {
    // Section 2 opens both a repeat and a first-pass bracket.
    let (seq, _) = performed("P: 4/4\nN: ||: 1 1 1 1||:[1.] 2 2 2 2|3 3 3 3:||[x2] 4 4 4 4|||");
    assert_eq!(walk_of(&seq), vec![(1, vec![1, 2, 3]), (2, vec![1, 4])]);
}

#[test]
fn test_bare_repeat_overflows() {
    let (seq, issues) = performed("N: ||: 1 2 3 4 :||");
    assert!(seq.overflow);
    assert_eq!(seq.iterations.len(), 64);
    assert_eq!(issues.keys(), vec!["repeat_overflow"]);
}

#[test]
fn test_reset_conflict() {
    let (mut flat, _) = article("P: 4/4\nN: ||: 1 1 1 1|[reset] 2 2 2 2:||[x2] 3 3 3 3|");
    let mut issues = Issues::new();
    let seq = reader().sequence(&mut flat, &mut issues);
    // The reset puts the second pass back to 1, so section 2 plays twice as 1.
    assert!(seq.conflict);
    assert_eq!(seq.conflicted_sections, vec![1]);
    assert_eq!(issues.keys(), vec!["repeat_conflict"]);
    assert_eq!(flat.parts[0].notes[1].structure_validation, Some(StructureValidation::Conflict));
    assert_eq!(flat.parts[0].notes[0].structure_validation, None);
}

#[test]
fn test_flat_pass_first() {
    let (mut flat, _) = article("P: 4/4\nN: ||: 1 1 1 1:||[x2] 2 2 2 2|");
    let mut issues = Issues::new();
    let seq = reader().sequence(&mut flat, &mut issues);
    assert_eq!(walk_of(&seq), vec![(0, vec![1, 2]), (1, vec![1]), (2, vec![1, 2])]);
    // The flat pass does not count towards the performance.
    assert!((seq.total_millis() - 6000.0).abs() < 1e-9);
}

#[test]
fn test_flat_pass_repeatable() {
    let (flat, _) = article("P: 4/4\nN: ||: 1 2 3 4:||[x2] 5 6 7 1|[D.S.] 1 1 1 1|||");
    let mut issues = Issues::new();
    let a = reader().read(&flat, true, &mut issues);
    let b = reader().read(&flat, true, &mut issues);
    assert_eq!(a, b);
    assert_eq!(walk_of(&a), vec![(0, vec![1, 2, 3])]);
}

#[test]
fn test_slowest_voice_sets_speed() {
    let (seq, _) = performed("P: 4/4\nPi: qpm=120\nN: 1 2 3 4|\nPi: qpm=60\nN: 1 2 3 4|");
    assert_eq!(seq.iterations[0].sections[0].qpm, 60.0);
    assert!((seq.total_millis() - 4000.0).abs() < 1e-9);
}

#[test]
fn test_qpm_mismatch_warns_once() {
    let (seq, issues) = performed("P: 4/4\nPi: qpm=120\nN: ||: 1 2 3 4:||[x2]\nPi: qpm=60\nN: ||: 1 2 3 4:||[x2]");
    assert_eq!(seq.iterations.len(), 2);
    assert_eq!(issues.keys(), vec!["qpm_mismatch"]);
}

#[test]
fn test_notes_merge_ties() {
    let (seq, _) = performed("P: 4/4 qpm=60\nN: 1 2 - 3~|3 0 X 5|");
    let notes = seq.notes();
    let summary: Vec<(f64, f64, f64)> = notes.iter().map(|n| (n.pitch, n.start_millis, n.length_millis)).collect();
    assert_eq!(
        summary,
        vec![
            (60.0, 0.0, 1000.0),
            (62.0, 1000.0, 2000.0),
            (64.0, 3000.0, 2000.0),
            (67.0, 7000.0, 1000.0),
        ]
    );
    assert_eq!(seq.iterations[0].sections[0].notes().len(), 3);
}

#[test]
fn test_dash_lengthens_across_sections() {
    let (seq, _) = performed("P: 4/4 qpm=60\nN: 1 2 3 4|- - 5 6|");
    let summary: Vec<(f64, f64, f64)> = seq
        .notes()
        .iter()
        .map(|n| (n.pitch, n.start_millis, n.length_millis))
        .collect();
    assert_eq!(summary[3], (65.0, 3000.0, 3000.0));
    assert_eq!(summary.len(), 6);
}
