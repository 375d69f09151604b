//! # nmn
//!
//! Compiler for numbered musical notation (jianpu) scores.
//!
//! A score is plain text, one command per line:
//!
//! ```text
//! Dt: Twinkle
//! P: 4/4 qpm=100
//! N: 1 1 5 5|6 6 5 -|
//! L: twin-kle twin-kle lit-tle star
//! ```
//!
//! [`parse`] turns it into a positioned, render-ready [`ScoreDocument`],
//! a performed timeline per music article, and every [`Issue`] found on
//! the way. Problems in the text never abort the parse.
//!
//! ## Pipeline
//! 1. [`linifier`] / [`tokenizer`] / [`classifier`]: text to command lines
//! 2. [`line_tree`]: command lines to the document/article/fragment/part tree
//! 3. [`sparse`]: bracket groups of every line
//! 4. [`destructor`]: typed content per line
//! 5. [`columns`]: voices on one section axis, cut into laid-out lines
//! 6. [`sequence`]: repeats and jumps expanded into a linear performance
//!
//! ## Example
//! ```rust
//! let output = nmn::parse("P: 4/4 qpm=120\nN: 1 2 3 4|5 6 7 1'").unwrap();
//! assert!(output.issues.iter().all(|i| i.severity < nmn::Severity::Warning));
//! let sequence = output.sequenced.sequence[0].as_ref().unwrap();
//! assert_eq!(sequence.total_millis(), 4000.0);
//! ```

pub mod classifier;
pub mod columns;
pub mod commands;
pub mod config;
pub mod destructor;
pub mod error;
pub mod frac;
pub mod highlight;
pub mod issue;
pub mod layout;
pub mod line_tree;
pub mod linifier;
pub mod model;
pub mod sequence;
pub mod sparse;
pub mod tokenizer;

pub use columns::{Article, MusicArticle, ScoreDocument};
pub use config::ParserConfig;
pub use error::NmnError;
pub use highlight::{get_highlighted_section, SectionPosition, SectionPositions};
pub use issue::{Issue, Severity};
pub use sequence::{SequenceArticle, SequenceReader};

use columns::{ColumnStater, FlatEntry};
use destructor::Destructor;
use issue::Issues;
use layout::{GlyphEstimator, MeasureCache};
use line_tree::LineTreeBuilder;
use serde::Serialize;

/// Performed timelines, one slot per article.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequenced {
    /// Document title.
    pub score: Option<String>,
    /// `None` for text articles.
    pub sequence: Vec<Option<SequenceArticle>>,
}

/// Everything one parse produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutput {
    pub result: ScoreDocument,
    pub sequenced: Sequenced,
    pub issues: Vec<Issue>,
    pub section_positions: SectionPositions,
}

/// Parse with the default configuration.
pub fn parse(text: &str) -> Result<ParseOutput, NmnError> {
    parse_with_config(text, &ParserConfig::default())
}

/// Parse a document.
///
/// Only internal stage mismatches are returned as errors; everything wrong
/// with the text ends up in [`ParseOutput::issues`].
pub fn parse_with_config(text: &str, config: &ParserConfig) -> Result<ParseOutput, NmnError> {
    let mut issues = Issues::new();
    let lines = classifier::classify(text, &mut issues);
    let tree = LineTreeBuilder::new(lines).parse(&mut issues);
    let tree = Destructor::destruct(tree, &mut issues);

    let mut flat = ColumnStater::flatten(&tree, &config.render_props()?, &mut issues)?;
    let reader = SequenceReader::new(config.iteration_limit, config.default_qpm);
    let sequence = flat
        .articles
        .iter_mut()
        .map(|entry| match entry {
            FlatEntry::Music(article) => Some(reader.sequence(article, &mut issues)),
            FlatEntry::Text(_) => None,
        })
        .collect();
    let sequenced = Sequenced {
        score: flat.title.clone(),
        sequence,
    };

    let measure = MeasureCache::new(GlyphEstimator::new(config.measure.clone()));
    let result = ColumnStater::linify(flat, &measure);
    let section_positions = highlight::section_positions(&result);

    let issues = issues.into_vec();
    log::info!(
        "parsed {} articles with {} issues",
        result.articles.len(),
        issues.len()
    );
    Ok(ParseOutput {
        result,
        sequenced,
        issues,
        section_positions,
    })
}
