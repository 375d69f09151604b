use super::*;
use crate::classifier::classify;
use crate::destructor::Destructor;
use crate::layout::{DispatchStatus, GlyphEstimator};
use crate::line_tree::LineTreeBuilder;
use crate::model::lyric::LyricNoteContent;
use crate::model::section::{SectionBody, SeparatorChar};

fn flatten_text(text: &str) -> (FlatDocument, Issues) {
    let mut issues = Issues::new();
    let lines = classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    let tree = Destructor::destruct(tree, &mut issues);
    let flat = ColumnStater::flatten(&tree, &RenderProps::new(), &mut issues).unwrap();
    (flat, issues)
}

fn first_article(text: &str) -> (FlatArticle, Issues) {
    let (flat, issues) = flatten_text(text);
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

fn state(text: &str) -> (ScoreDocument, Issues) {
    let mut issues = Issues::new();
    let lines = classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    let tree = Destructor::destruct(tree, &mut issues);
    let doc = ColumnStater::state(&tree, &RenderProps::new(), &GlyphEstimator::default(), &mut issues).unwrap();
    (doc, issues)
}

fn music(doc: &ScoreDocument, i: usize) -> &MusicArticle {
    match &doc.articles[i] {
        Article::Music(m) => m,
        Article::Text(_) => panic!("article {} is text", i),
    }
}

#[test]
fn test_voices_across_fragments() {
    let (article, issues) = first_article("P: 4/4\nN: 1 2 3 4|\nN[bass]: 5 5 5 5|\n-\nN: 1 1 1 1|2 2 2 2|");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    assert_eq!(article.section_count(), 3);
    let signatures: Vec<_> = article.parts.iter().map(|p| p.signature.as_str()).collect();
    assert_eq!(signatures, vec!["#0", "bass#0"]);
    let bass = &article.parts[1];
    assert!(!bass.notes[0].is_nullish());
    assert!(bass.notes[1].is_nullish());
    assert!(bass.notes[2].is_nullish());
    // Placeholders borrow the props of a voice that plays there.
    assert!(bass.notes[1].musical_props.beats.is_some());
    assert_eq!(article.fragments.len(), 2);
    assert_eq!((article.fragments[1].start, article.fragments[1].end), (1, 3));
}

#[test]
fn test_allocate_columns() {
    let (article, _) = first_article("P: 4/4\nN: 1 2 3 4|1 2/ 3 4|[3/4] 1 2 3|");
    let quarters: Vec<_> = article.columns.iter().map(|c| c.quarters).collect();
    assert_eq!(quarters, vec![Frac::from_int(4), Frac::from_int(2), Frac::from_int(4), Frac::from_int(3)]);
    let starts: Vec<_> = article.columns.iter().map(|c| c.start_pos).collect();
    assert_eq!(starts[3], Frac::from_int(10));
    let numbers: Vec<_> = article.columns.iter().map(|c| c.measure_number).collect();
    assert_eq!(numbers, vec![1, 2, 2, 3]);
    assert_eq!(article.parts[0].notes[2].start_pos, Frac::from_int(6));
    assert_eq!(article.parts[0].notes[3].ordinal, 3);
}

#[test]
fn test_measure_number_start() {
    let (article, _) = first_article("Rp: measure_number_start=5\nP: 4/4\nN: 1 2 3 4|1 2 3 4|");
    assert_eq!(article.columns[0].measure_number, 5);
    assert_eq!(article.columns[1].measure_number, 6);
}

#[test]
fn test_omit_expands() {
    let (article, _) = first_article("P: 4/4\nN: 1 2 3 4|1 2 3 4|1 2 3 4|1 2 3 4|\nC: C|...2|G|");
    let chords = &article.parts[0].chords[0];
    assert_eq!(chords.len(), 4);
    assert!(matches!(chords[1].body, SectionBody::Omit { .. }));
    assert!(matches!(chords[2].body, SectionBody::Omit { .. }));
    assert!(matches!(chords[3].body, SectionBody::Section(_)));
}

#[test]
fn test_tie_voids_across_sections() {
    let (article, issues) = first_article("P: 4/4\nN: 1 2 3 5~|5 6 7 1'|");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    let notes = &article.parts[0].notes;
    assert!(notes[1].notes()[0].voided);
    assert!(!notes[1].notes()[0].is_sounding());
    let first = notes[0].content().unwrap();
    let second = notes[1].content().unwrap();
    assert!(first.right_split);
    assert!(second.left_split && second.left_split_void);
    assert_eq!(first.decoration[0].end_pos, None);
    assert_eq!(second.decoration[0].start_pos, None);
}

#[test]
fn test_tie_to_other_pitch_does_not_void() {
    let (article, _) = first_article("P: 4/4\nN: 1 2 3 5~|6 6 7 1'|");
    assert!(!article.parts[0].notes[1].notes()[0].voided);
}

#[test]
fn test_unclosed_slur() {
    let (_, issues) = first_article("P: 4/4\nN: 1* 2 3 4|");
    assert_eq!(issues.keys(), vec!["unclosed_decoration"]);
}

#[test]
fn test_lyrics_skip_rests_and_voids() {
    let (article, issues) = first_article("P: 4/4\nN: 1 0 2~ 2|3 4 - 5|\nL: a b c d e");
    assert!(issues.is_empty(), "{:?}", issues.keys());
    let lyrics = &article.parts[0].lyric_lines[0].lyrics;
    let starts: Vec<_> = lyrics[0].iter().map(|n| n.start_pos).collect();
    assert_eq!(starts, vec![Frac::zero(), Frac::from_int(2)]);
    assert_eq!(lyrics[1].len(), 3);
    assert_eq!(lyrics[1][2].start_pos, Frac::from_int(3));
}

#[test]
fn test_lyrics_exceed_notes() {
    let (article, issues) = first_article("P: 4/4\nN: 1 2 3 4|\nL: a b c d e f");
    assert_eq!(issues.keys(), vec!["lyrics_exceed_notes"]);
    assert_eq!(article.parts[0].lyric_lines[0].lyrics[0].len(), 4);
}

#[test]
fn test_lyrics_follow_substitute() {
    let (article, _) = first_article("P: 4/4\nN: 1 2 3 4|\nL: a b\nLn: 1 - 2 -|");
    let line = &article.parts[0].lyric_lines[0];
    assert!(line.substitute.is_some());
    let starts: Vec<_> = line.lyrics[0].iter().map(|n| n.start_pos).collect();
    assert_eq!(starts, vec![Frac::zero(), Frac::from_int(2)]);
    assert!(matches!(line.lyrics[0][0].content, LyricNoteContent::Chars { .. }));
}

#[test]
fn test_jumper_clamped() {
    let (article, issues) = first_article("P: 4/4\nJ: 2-5[1.]\nN: 1 2 3 4|1 2 3 4|1 2 3 4|");
    assert_eq!(issues.keys(), vec!["jumper_range"]);
    assert_eq!((article.jumpers[0].start, article.jumpers[0].end), (1, 3));
}

#[test]
fn test_text_article() {
    let (doc, _) = state("Dt: Song\nDa: Me\n=\nS: Notes\nT: First\nT: Second");
    assert_eq!(doc.title.as_deref(), Some("Song"));
    assert_eq!(doc.authors, vec!["Me".to_string()]);
    match &doc.articles[0] {
        Article::Text(text) => {
            assert_eq!(text.title.as_deref(), Some("Notes"));
            assert_eq!(text.paragraphs.len(), 2);
        }
        Article::Music(_) => panic!("expected a text article"),
    }
}

#[test]
fn test_linify_breaks() {
    let (doc, _) = state("Rp: n=2\nP: 4/4\nN: 1 2 3 4|1 2 3 4||1 2 3 4:||1 2 3 4|1 2 3 4|\n-\nN: 1 2 3 4|");
    let article = music(&doc, 0);
    let ranges: Vec<_> = article.lines.iter().map(|l| (l.start, l.end)).collect();
    assert_eq!(ranges, vec![(0, 2), (2, 4), (4, 5), (5, 6)]);
    // A double bar reopens as a plain start.
    let second = &article.lines[1].parts[0].notes;
    assert_eq!(second[0].separator.before.char, SeparatorChar::Slash);
    assert_eq!(second[0].separator.after.char, SeparatorChar::RepeatEnd);
    assert_eq!(second[1].separator.after.char, SeparatorChar::Bar);
    for line in &article.lines {
        assert_eq!(line.layout.len(), line.end - line.start);
        assert!(line.layout.iter().all(|l| l.status == DispatchStatus::Pass));
    }
}

#[test]
fn test_linify_repeat_start_carries_over() {
    let (doc, _) = state("Rp: n=1\nP: 4/4\nN: 1 2 3 4||:1 2 3 4:||");
    let article = music(&doc, 0);
    let first = &article.lines[0].parts[0].notes[0];
    assert_eq!(first.separator.after.char, SeparatorChar::Double);
    let second = &article.lines[1].parts[0].notes[0];
    assert_eq!(second.separator.before.char, SeparatorChar::RepeatStart);
}

#[test]
fn test_linify_drops_silent_voices() {
    let (doc, _) = state("Rp: n=1\nP: 4/4\nN: 1 2 3 4|1 2 3 4|\nN[alt]: 5 5 5 5|");
    let article = music(&doc, 0);
    assert_eq!(article.lines[0].parts.len(), 2);
    assert_eq!(article.lines[1].parts.len(), 1);
}

#[test]
fn test_layout_positions_ordered() {
    let (doc, _) = state("P: 4/4\nN: 1 2 3 4|5 6 7 1'|\nL: do re mi fa sol la ti do");
    let line = &music(&doc, 0).lines[0];
    for section in &line.layout {
        let xs: Vec<f64> = section.positions.iter().map(|p| p.x).collect();
        assert!(xs.windows(2).all(|w| w[0] < w[1]), "{:?}", xs);
        assert!(xs.iter().all(|x| *x >= section.x && *x <= section.x + section.width));
    }
    assert!(line.layout[1].x > line.layout[0].x);
}
