//! # Commands
//!
//! The fixed table of command heads a score line may start with, and what each
//! one is allowed to do.
//!
//! ## Levels
//! A document is a five-level tree:
//!
//! | level | name | opened by |
//! |---|---|---|
//! | 0 | document | start of text |
//! | 1 | article | `=` delimiter line |
//! | 2 | fragment | `-` delimiter line |
//! | 3 | part | a new `N` line |
//! | 4 | lyric line | a new `L` line |
//!
//! Every command declares the levels it may appear at. A command's levels are
//! contiguous, so the nearest legal level from any position is unambiguous.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Command {
    Title,
    Subtitle,
    Prescript,
    Author,
    Footnote,
    ScoreProps,
    RenderProps,
    Article,
    Text,
    Props,
    Jumpers,
    PartProps,
    Notes,
    Chords,
    Annotations,
    Force,
    Lyrics,
    LyricAnnotation,
    LyricNotes,
}

/// Text commands exclude music commands within one node and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speciality {
    Special,
    Normal,
    Neutral,
}

/// Whether a command takes a `[...]` props group after its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropsPolicy {
    None,
    Optional,
    Required,
}

/// Where commas split content into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Always,
    Never,
    /// Only inside brackets, never at the top level.
    Others,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    pub command: Command,
    pub head: &'static str,
    pub alias: &'static str,
    pub levels: &'static [usize],
    pub unique: bool,
    pub required: bool,
    pub speciality: Speciality,
    pub props: PropsPolicy,
    pub split: SplitMode,
}

pub const LEVEL_NAMES: [&str; 5] = ["document", "article", "fragment", "part", "lyric line"];

pub fn level_name(level: usize) -> &'static str {
    LEVEL_NAMES.get(level).copied().unwrap_or("node")
}

/// Delimiter characters and the level each one opens.
pub const DELIMITERS: &[(char, usize)] = &[('=', 1), ('-', 2)];

pub fn delimiter_level(c: char) -> Option<usize> {
    DELIMITERS.iter().find(|(d, _)| *d == c).map(|(_, l)| *l)
}

macro_rules! def {
    ($cmd:ident, $head:literal, $alias:literal, $levels:expr, unique: $u:literal, required: $r:literal, $spec:ident, $props:ident, $split:ident) => {
        CommandDef {
            command: Command::$cmd,
            head: $head,
            alias: $alias,
            levels: $levels,
            unique: $u,
            required: $r,
            speciality: Speciality::$spec,
            props: PropsPolicy::$props,
            split: SplitMode::$split,
        }
    };
}

pub static COMMANDS: &[CommandDef] = &[
    def!(Title, "Dt", "Title", &[0], unique: true, required: false, Neutral, None, Never),
    def!(Subtitle, "Ds", "Subtitle", &[0], unique: true, required: false, Neutral, None, Never),
    def!(Prescript, "Dp", "Prescript", &[0], unique: false, required: false, Neutral, None, Never),
    def!(Author, "Da", "Author", &[0], unique: false, required: false, Neutral, None, Never),
    def!(Footnote, "Df", "Footnote", &[0], unique: false, required: false, Neutral, None, Never),
    def!(ScoreProps, "Sp", "ScoreProps", &[0], unique: true, required: false, Neutral, None, Never),
    def!(RenderProps, "Rp", "RenderProps", &[0, 1, 2], unique: true, required: false, Neutral, None, Never),
    def!(Article, "S", "Article", &[1], unique: true, required: false, Neutral, None, Never),
    def!(Text, "T", "Text", &[1], unique: false, required: false, Special, None, Never),
    def!(Props, "P", "Props", &[1, 2], unique: true, required: false, Normal, None, Never),
    def!(Jumpers, "J", "Jumpers", &[2], unique: true, required: false, Normal, None, Others),
    def!(PartProps, "Pi", "PartProps", &[3], unique: true, required: false, Normal, None, Never),
    def!(Notes, "N", "Notes", &[3], unique: true, required: true, Normal, Optional, Others),
    def!(Chords, "C", "Chords", &[3], unique: false, required: false, Normal, None, Others),
    def!(Annotations, "A", "Annotations", &[3], unique: false, required: false, Normal, None, Others),
    def!(Force, "F", "Force", &[3], unique: false, required: false, Normal, None, Others),
    def!(Lyrics, "L", "Lyrics", &[4], unique: true, required: true, Normal, Optional, Never),
    def!(LyricAnnotation, "La", "LyricAnnotation", &[4], unique: false, required: false, Normal, None, Never),
    def!(LyricNotes, "Ln", "LyricNotes", &[4], unique: true, required: false, Normal, None, Others),
];

/// Look a command up by head or alias.
pub fn lookup(head: &str) -> Option<&'static CommandDef> {
    let found = COMMANDS.iter().find(|d| d.head == head || d.alias == head);
    debug_assert!(found.map_or(true, |d| levels_contiguous(d.levels)));
    found
}

pub fn definition(command: Command) -> &'static CommandDef {
    // The table has one entry per variant, in declaration order.
    &COMMANDS[command as usize]
}

pub fn levels_contiguous(levels: &[usize]) -> bool {
    levels.windows(2).all(|w| w[1] == w[0] + 1)
}

impl CommandDef {
    /// Legal level closest to `level`. Ties go to the lower level.
    pub fn nearest_level(&self, level: usize) -> usize {
        self.levels
            .iter()
            .copied()
            .min_by_key(|l| (l.abs_diff(level), *l))
            .unwrap_or(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_contiguous() {
        for def in COMMANDS {
            assert!(!def.levels.is_empty(), "{} has no levels", def.head);
            assert!(levels_contiguous(def.levels), "{} levels are not contiguous", def.head);
        }
    }

    #[test]
    fn test_definition_matches_variant() {
        for def in COMMANDS {
            assert_eq!(definition(def.command).head, def.head);
        }
    }

    #[test]
    fn test_lookup_by_alias() {
        assert_eq!(lookup("N").unwrap().command, Command::Notes);
        assert_eq!(lookup("Lyrics").unwrap().command, Command::Lyrics);
        assert!(lookup("n").is_none());
    }

    #[test]
    fn test_nearest_level() {
        let rp = lookup("Rp").unwrap();
        assert_eq!(rp.nearest_level(0), 0);
        assert_eq!(rp.nearest_level(3), 2);
        let n = lookup("N").unwrap();
        assert_eq!(n.nearest_level(0), 3);
        assert_eq!(n.nearest_level(4), 3);
    }
}
