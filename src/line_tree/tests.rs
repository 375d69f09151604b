use super::*;
use crate::classifier::classify;
use crate::commands::Command;

fn build(text: &str) -> (LineTree<CommandLine>, Issues) {
    let mut issues = Issues::new();
    let lines = classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    (tree, issues)
}

fn commands_of(tree: &LineTree<CommandLine>) -> Vec<Command> {
    tree.lines.iter().map(|l| l.command).collect()
}

#[test]
fn test_implicit_levels() {
    let (root, issues) = build("Dt: Song\nP: 4/4\nN: 1 2 3 4");
    assert!(issues.is_empty(), "{:?}", issues);
    assert_eq!(commands_of(&root), vec![Command::Title]);
    let article = &root.children[0];
    assert_eq!(article.level, 1);
    assert_eq!(commands_of(article), vec![Command::Props]);
    let fragment = &article.children[0];
    assert_eq!(fragment.level, 2);
    let part = &fragment.children[0];
    assert_eq!(part.level, 3);
    assert_eq!(commands_of(part), vec![Command::Notes]);
    assert!(part.unique("N").is_some());
}

#[test]
fn test_delimiters_open_siblings() {
    let (root, _) = build("N: 1\n-\nN: 2\n=\nN: 3");
    assert_eq!(root.children.len(), 2);
    assert_eq!(root.children[0].children.len(), 2);
    assert_eq!(root.children[1].children.len(), 1);
}

#[test]
fn test_unique_reuse_opens_new_part() {
    let (root, _) = build("N: 1\nC: C\nN: 2\nL: a");
    let fragment = &root.children[0].children[0];
    assert_eq!(fragment.children.len(), 2);
    assert_eq!(commands_of(&fragment.children[0]), vec![Command::Notes, Command::Chords]);
    assert_eq!(fragment.children[1].children.len(), 1);
    assert_eq!(fragment.children[1].children[0].level, 4);
}

#[test]
fn test_duplicate_unique_at_document_level() {
    let (root, issues) = build("Dt: A\nDt: B");
    assert_eq!(issues.keys(), vec!["duplicate_unique"]);
    assert_eq!(root.lines.len(), 1);
    assert_eq!(root.unique("Dt").unwrap().text, "A");
}

#[test]
fn test_lack_required_discards_part() {
    let (root, issues) = build("N: 1\n-\nC: C D");
    let keys = issues.keys();
    assert!(keys.contains(&"lack_required"), "{:?}", keys);
    // The pruned fragment disappears without a second report.
    assert!(!keys.contains(&"empty_tree"), "{:?}", keys);
    assert_eq!(root.children[0].children.len(), 1);
    assert!(satisfies_required(&root));
}

#[test]
fn test_lyric_line_requires_lyrics() {
    let (root, issues) = build("N: 1 2\nLa: 1.");
    assert!(issues.keys().contains(&"lack_required"));
    let part = &root.children[0].children[0].children[0];
    assert!(part.children.is_empty());
}

#[test]
fn test_wrong_speciality() {
    let (root, issues) = build("T: some words\nP: 4/4");
    assert_eq!(issues.keys(), vec!["wrong_speciality"]);
    assert!(root.children.is_empty());
}

#[test]
fn test_special_children_dropped() {
    let (root, issues) = build("S: Notes\nT: paragraph\nN: 1 2");
    assert_eq!(issues.keys(), vec!["special_children"]);
    let article = &root.children[0];
    assert_eq!(commands_of(article), vec![Command::Article, Command::Text]);
    assert!(article.children.is_empty());
}

#[test]
fn test_empty_fragment_warns() {
    let (_, issues) = build("N: 1\n-\n-\nN: 2");
    assert_eq!(issues.keys(), vec!["empty_tree"]);
}

#[test]
fn test_props_presence() {
    let (_, issues) = build("P[x]: 4/4\nN: 1");
    assert_eq!(issues.keys(), vec!["redundant_props"]);
}

#[test]
fn test_required_invariant_on_messy_input() {
    let inputs = [
        "",
        "L: a b",
        "N: 1\nL: a\nL: b\nLn: 1 2",
        "=\n=\n-\nC: x\nN: 1\nA: y",
        "Dt: x\nRp: n=2\nS: a\nP: 3/4\nJ: 1\nPi: +1\nF: >",
    ];
    for text in inputs {
        let (root, _) = build(text);
        assert!(satisfies_required(&root), "violated for {:?}", text);
    }
}
