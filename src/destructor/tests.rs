use super::*;
use crate::classifier::classify;
use crate::frac::Frac;
use crate::line_tree::LineTreeBuilder;
use crate::model::note::{DecorationKind, NoteKind};
use crate::model::section::{SectionBody, SectionValidation, SeparatorAttr, SeparatorChar};

fn destruct(text: &str) -> (LineTree<DestructedLine>, Issues) {
    let mut issues = Issues::new();
    let lines = classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    let out = Destructor::destruct(tree, &mut issues);
    (out, issues)
}

fn note_rows(tree: &LineTree<DestructedLine>) -> Vec<NoteRow<NoteCharMusic>> {
    let mut rows = Vec::new();
    tree.walk(&mut |node| {
        for line in &node.lines {
            if let LineContent::Notes(row) = &line.content {
                if line.command == Command::Notes {
                    rows.push(row.clone());
                }
            }
        }
    });
    rows
}

fn first_row(text: &str) -> (NoteRow<NoteCharMusic>, Issues) {
    let (tree, issues) = destruct(text);
    let row = note_rows(&tree).into_iter().next().unwrap();
    (row, issues)
}

fn chars(section: &MusicSection<NoteCharMusic>) -> String {
    section
        .notes()
        .iter()
        .map(|n| match &n.kind {
            NoteKind::Note { char } => char.char,
            NoteKind::Extend => '-',
        })
        .collect()
}

#[test]
fn test_basic_sections() {
    let (row, issues) = first_row("P: 4/4 qpm=120\nN: 1 2 3 4|5 6 7 1'");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    assert_eq!(row.sections.len(), 2);
    let first = &row.sections[0];
    assert_eq!(chars(first), "1234");
    assert_eq!(first.content().unwrap().total_quarters, Frac::from_int(4));
    assert_eq!(first.content().unwrap().validation, SectionValidation::Ok);
    assert_eq!(first.separator.before.char, SeparatorChar::Slash);
    assert!(first.separator.before.range.is_empty());
    assert_eq!(first.separator.after.char, SeparatorChar::Bar);
    let second = &row.sections[1];
    assert_eq!(second.notes()[3].start_pos, Frac::from_int(3));
    assert!(second.separator.after.range.is_empty());
}

#[test]
fn test_length_validation() {
    let (row, _) = first_row("P: 4/4\nN: 1 2 3|1 2 3 4 5|1 2/");
    let v: Vec<_> = row.sections.iter().map(|s| s.content().unwrap().validation).collect();
    assert_eq!(v, vec![SectionValidation::Less, SectionValidation::More, SectionValidation::Ok]);
}

#[test]
fn test_reduction_and_dots() {
    let (row, _) = first_row("P: 4/4\nN: (1 2) 3. 4 |");
    let notes = row.sections[0].notes();
    assert_eq!(notes[0].length, Frac::new(1, 2));
    assert_eq!(notes[1].start_pos, Frac::new(1, 2));
    assert_eq!(notes[2].length, Frac::new(3, 2));
    assert_eq!(row.sections[0].content().unwrap().total_quarters, Frac::new(7, 2));
}

#[test]
fn test_separator_attrs_and_variation() {
    let (row, issues) = first_row("P: 4/4\nN: 1 2 3 4 |[3/4, qpm=90] 1 2 3 || 1 2 3");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    let sections = &row.sections;
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[0].musical_props.beats.as_ref().unwrap().value, 4);
    assert_eq!(sections[1].musical_props.beats.as_ref().unwrap().value, 3);
    assert_eq!(sections[2].musical_props.beats.as_ref().unwrap().value, 3);
    assert_eq!(sections[1].content().unwrap().validation, SectionValidation::Ok);
    assert!(row.variation.beats.is_some());
    assert!(row.variation.qpm.is_some());
    assert!(matches!(
        sections[1].separator.before.attrs.own[0],
        SeparatorAttr::Beats { .. }
    ));
}

#[test]
fn test_attr_position_checks() {
    let (_, issues) = first_row("N: 1 2 |[x2] 3 4 |[3/4]");
    assert_eq!(issues.keys(), vec!["separator_attr_position"]);

    let (_, issues) = first_row("N: |[2.] 1 2 3 4 |");
    assert_eq!(issues.keys(), vec!["separator_attr_position"]);
}

#[test]
fn test_begin_end_legality() {
    let (_, issues) = first_row("N: :|| 1 2 |");
    assert_eq!(issues.keys(), vec!["separator_begin"]);
    let (_, issues) = first_row("N: 1 2 ||:");
    assert_eq!(issues.keys(), vec!["separator_end"]);
}

#[test]
fn test_omit_and_empty() {
    let (row, issues) = first_row("N: 1 2 | ... | ...3 | |");
    assert!(matches!(row.sections[1].body, SectionBody::Omit { count: None }));
    assert!(matches!(row.sections[2].body, SectionBody::Omit { count: Some(3) }));
    assert!(matches!(row.sections[3].body, SectionBody::Empty));
    assert_eq!(issues.keys(), vec!["empty_section"]);

    let (row, issues) = first_row("N: 1 2 | ...99999999999999999999 |");
    assert!(matches!(row.sections[1].body, SectionBody::Empty));
    assert_eq!(issues.keys(), vec!["bad_omit"]);
}

#[test]
fn test_fragments_inherit_variation() {
    let text = "P: 4/4\nN: 1 2 3 4 |[3/4] 1 2 3 |\n-\nN: 1 2 3 |";
    let (tree, _) = destruct(text);
    let rows = note_rows(&tree);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].sections[0].musical_props.beats.as_ref().unwrap().value, 3);
}

#[test]
fn test_chord_row_follows_note_row() {
    let text = "P: 4/4\nN: 1 2 3 4 |[3/4] 1 2 3 |\nC: C 0 G 0 | Am |";
    let (tree, issues) = destruct(text);
    assert!(issues.is_empty(), "{:?}", issues.keys());
    let mut chords = None;
    tree.walk(&mut |node| {
        for line in &node.lines {
            if let LineContent::Chords(row) = &line.content {
                chords = Some(row.clone());
            }
        }
    });
    let chords = chords.unwrap();
    assert_eq!(chords.sections[1].musical_props.beats.as_ref().unwrap().value, 3);
    assert_eq!(chords.sections[0].notes().len(), 4);
}

#[test]
fn test_part_props_and_tags() {
    let (row, _) = first_row("Sp: 1=D\nPi: -12\nN[alto]: 1");
    assert_eq!(row.tags, vec!["alto".to_string()]);
    assert_eq!(row.sections[0].musical_props.transpose, -12.0);
    assert!(row.sections[0].musical_props.base.is_some());
}

#[test]
fn test_lyric_passes() {
    let (tree, _) = destruct("N: 1 2 3\nL[1, 2., verse]: a b c");
    let mut row = None;
    tree.walk(&mut |node| {
        for line in &node.lines {
            if let LineContent::Lyrics(r) = &line.content {
                row = Some(r.clone());
            }
        }
    });
    let row = row.unwrap();
    assert_eq!(row.passes, vec![1, 2]);
    assert_eq!(row.tags, vec!["verse".to_string()]);
    assert_eq!(row.tokens.len(), 3);
}

fn tuplet_labels(section: &MusicSection<NoteCharMusic>) -> Vec<String> {
    section
        .content()
        .unwrap()
        .decoration
        .iter()
        .filter(|d| d.kind == DecorationKind::Tuplet)
        .filter_map(|d| d.label.clone())
        .collect()
}

#[test]
fn test_tuplets() {
    let (row, issues) = first_row("P: 4/4\nN: T(1 2 3) 4 5 | T[3,4](1 2 3 4) D(1) | T(1 2) 3 4 |");
    assert!(issues.is_empty(), "{:?}", issues.keys());

    let first = &row.sections[0];
    let notes = first.notes();
    assert_eq!(notes[0].length, Frac::new(2, 3));
    assert_eq!(notes[2].start_pos, Frac::new(4, 3));
    assert_eq!(notes[3].start_pos, Frac::from_int(2));
    assert_eq!(first.content().unwrap().validation, SectionValidation::Ok);
    assert_eq!(tuplet_labels(first), vec!["3".to_string()]);
    let tuplet = &first.content().unwrap().decoration[0];
    assert_eq!(tuplet.start_pos, Some(Frac::zero()));
    assert_eq!(tuplet.end_pos, Some(Frac::from_int(2)));

    let second = &row.sections[1];
    assert_eq!(second.notes()[0].length, Frac::new(3, 4));
    assert_eq!(second.notes()[4].length, Frac::one());
    assert_eq!(second.content().unwrap().total_quarters, Frac::from_int(4));
    assert_eq!(tuplet_labels(second), vec!["4".to_string()]);

    // Fewer written slots than the tuplet count spell out the ratio.
    assert_eq!(tuplet_labels(&row.sections[2]), vec!["3:2".to_string()]);
}

#[test]
fn test_bad_tuplet_descriptors() {
    let (row, issues) = first_row("P: 4/4\nN: T[2](1 2 3) 4 5 |");
    assert_eq!(issues.keys(), vec!["bad_triplet"]);
    assert_eq!(row.sections[0].notes()[0].length, Frac::new(2, 3));

    let (row, issues) = first_row(
        "P: 4/4\nN: T[1000000007,1000000009](T[1000000021,1000000033](T[999999937,999999929](1 2)))",
    );
    assert_eq!(issues.keys(), vec!["bad_triplet"; 3]);
    assert_eq!(row.sections[0].notes()[0].length, Frac::new(8, 27));
}

#[test]
fn test_deep_reduction_is_skipped() {
    let text = format!("P: 4/4\nN: {}1{} 2", "(".repeat(68), ")".repeat(68));
    let (row, issues) = first_row(&text);
    assert_eq!(issues.keys().iter().filter(|k| **k == "bad_nesting").count(), 1);
    let notes = row.sections[0].notes();
    assert_eq!(chars(&row.sections[0]), "2");
    assert_eq!(notes[0].length, Frac::one());
}

#[test]
fn test_swing_warps_positions() {
    let (row, issues) = first_row("P: 2/4T\nN: (1 2) (3 4) |");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    let notes = row.sections[0].notes();
    let starts: Vec<Frac> = notes.iter().map(|n| n.start_pos).collect();
    assert_eq!(
        starts,
        vec![Frac::zero(), Frac::new(2, 3), Frac::one(), Frac::new(5, 3)]
    );
    assert_eq!(notes[0].length, Frac::new(2, 3));
    assert_eq!(notes[1].length, Frac::new(1, 3));
}

#[test]
fn test_render_prop_errors() {
    let (tree, issues) = destruct("Rp: n=2 colour=red n=999\nN: 1 2 3 4");
    let rp_keys: Vec<&str> = issues.keys().into_iter().filter(|k| k.starts_with("rp_")).collect();
    assert_eq!(rp_keys, vec!["rp_unknown_key", "rp_unknown_value"]);
    let mut props = None;
    tree.walk(&mut |node| {
        for line in &node.lines {
            if let LineContent::RenderProps(p) = &line.content {
                props = Some(p.clone());
            }
        }
    });
    let props = props.unwrap();
    assert_eq!(props.int("n"), Some(2));
    assert!(props.get("colour").is_none());
}
