//! # Issues
//!
//! Every diagnostic raised anywhere in the pipeline is an [`Issue`]. Stages push
//! issues into one shared, ordered [`Issues`] list threaded through the whole
//! parse as `&mut Issues`; no stage stops because of an issue.
//!
//! Each issue carries a stable machine-readable `key` (for i18n lookup), the
//! English fallback template for that key, the positional arguments, and the
//! template rendered with those arguments (`${0}`, `${1}`, ...).
//!
//! ## Severities
//! `notice < unstd < warning < error < fatal`. The ordering is the user-facing
//! alarm level only; the pipeline treats all of them the same way.

use serde::Serialize;
use std::fmt;

/// Issue severity, ordered by alarm level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Notice,
    /// Accepted, but not standard notation.
    Unstd,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Notice => "notice",
            Severity::Unstd => "unstd",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Zero-based source line (first physical line of the logical line).
    pub line_number: usize,
    /// Zero-based character index within the logical line.
    pub index: usize,
    pub severity: Severity,
    pub key: &'static str,
    pub default_translation: &'static str,
    pub args: Vec<String>,
    pub rendered: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.line_number + 1,
            self.index + 1,
            self.severity,
            self.key,
            self.rendered
        )
    }
}

/// Use as the `args` of an issue that takes no arguments.
pub const NO_ARGS: [&str; 0] = [];

/// Default English templates, keyed by issue key.
const TRANSLATIONS: &[(&str, &str)] = &[
    // tokenizer
    ("unclosed_string", "String literal is not closed"),
    ("invalid_escape", "Invalid escape sequence '${0}'"),
    ("unclosed_comment", "Block comment is not closed"),
    // classifier
    ("wtf_line", "Cannot understand this line; it is ignored"),
    ("bad_command_format", "Command properties must be enclosed in '[...]' right after the command head"),
    ("unknown_command", "Unknown command '${0}'"),
    // line tree
    ("duplicate_unique", "Command '${0}' may only appear once here; this line is ignored"),
    ("lack_required", "Required command '${0}' is missing in this ${1}; the ${1} is discarded"),
    ("empty_tree", "This ${0} is empty and is discarded"),
    ("wrong_speciality", "Text commands cannot be mixed with music commands in one ${0}"),
    ("special_children", "A text ${0} cannot contain nested blocks; they are discarded"),
    ("redundant_props", "Command '${0}' does not take properties"),
    ("lack_props", "Command '${0}' requires properties"),
    // sparse builder
    ("unclosed_bracket", "Bracket '${0}' is not closed"),
    ("unpaired_bracket", "Bracket '${0}' has no opening partner and is ignored"),
    // music / render props
    ("transpose_range", "Transposition ${0} is out of range and was clamped to ${1}"),
    ("unequal_beats", "Beat components add up to ${0}, but the time signature says ${1}"),
    ("bad_beats", "Invalid time signature '${0}'"),
    ("bad_qpm", "Invalid speed '${0}'"),
    ("bad_tuning", "Invalid tuning '${0}'"),
    ("bad_reduction", "Invalid reduction '${0}'"),
    ("rp_unknown_key", "Unknown render property '${0}'"),
    ("rp_unknown_value", "Invalid value '${1}' for render property '${0}'"),
    ("rp_bad_format", "Render properties must be written as key=value, got '${0}'"),
    // sections
    ("unknown_section_separator", "Unknown section separator '${0}'"),
    ("separator_begin", "Separator '${0}' cannot open a row"),
    ("separator_end", "Separator '${0}' cannot close a row"),
    ("separator_attr_position", "Separator attribute '${0}' is not allowed in this position"),
    ("unknown_separator_attr", "Unknown separator attribute '${0}'"),
    ("empty_section", "Empty section"),
    // notes
    ("unknown_note_char", "Unknown note character '${0}'"),
    ("unknown_note_token", "Unexpected '${0}' in note row"),
    ("dangling_accidental", "Accidental '${0}' is not followed by a note"),
    ("dangling_suffix", "'${0}' must follow a note"),
    ("bad_triplet", "Invalid tuplet descriptor '${0}'; default ratio used"),
    ("bad_nesting", "Group '${0}' is nested too deeply and is ignored"),
    ("unknown_note_attr", "Unknown note attribute '${0}'"),
    ("bad_omit", "Invalid omission '${0}'"),
    // jumpers
    ("bad_jumper", "Invalid jumper '${0}'"),
    ("jumper_range", "Jumper range ${0}-${1} is outside the ${2} sections of this fragment"),
    // lyrics
    ("bad_lyric_token", "Unexpected '${0}' in lyrics"),
    ("lyrics_exceed_notes", "${0} lyric syllables have no note to attach to"),
    // column stater
    ("unclosed_decoration", "${0} started here is never closed"),
    // sequencer
    ("repeat_conflict", "Section ${0} is played twice in iteration ${1}"),
    ("repeat_overflow", "Repeat structure expands beyond ${0} iterations; playback is truncated"),
    ("beats_mismatch", "Voices disagree on the time signature in section ${0}"),
    ("qpm_mismatch", "Voices disagree on the speed in section ${0}"),
];

/// Look up the default English template of an issue key.
pub fn default_translation(key: &str) -> &'static str {
    TRANSLATIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or("Unknown issue")
}

/// Interpolate `${N}` placeholders with positional arguments.
pub fn render_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let arg = after[..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| args.get(i));
                match arg {
                    Some(a) => out.push_str(a),
                    None => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Ordered issue accumulator shared by all pipeline stages.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Issues {
    list: Vec<Issue>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<A: ToString>(
        &mut self,
        line_number: usize,
        index: usize,
        severity: Severity,
        key: &'static str,
        args: impl IntoIterator<Item = A>,
    ) {
        let args: Vec<String> = args.into_iter().map(|a| a.to_string()).collect();
        let template = default_translation(key);
        let rendered = render_template(template, &args);
        log::trace!("issue {} at {}:{}: {}", key, line_number, index, rendered);
        self.list.push(Issue {
            line_number,
            index,
            severity,
            key,
            default_translation: template,
            args,
            rendered,
        });
    }

    pub fn notice<A: ToString>(
        &mut self,
        line_number: usize,
        index: usize,
        key: &'static str,
        args: impl IntoIterator<Item = A>,
    ) {
        self.push(line_number, index, Severity::Notice, key, args)
    }

    pub fn warn<A: ToString>(
        &mut self,
        line_number: usize,
        index: usize,
        key: &'static str,
        args: impl IntoIterator<Item = A>,
    ) {
        self.push(line_number, index, Severity::Warning, key, args)
    }

    pub fn error<A: ToString>(
        &mut self,
        line_number: usize,
        index: usize,
        key: &'static str,
        args: impl IntoIterator<Item = A>,
    ) {
        self.push(line_number, index, Severity::Error, key, args)
    }

    pub fn extend(&mut self, other: Issues) {
        self.list.extend(other.list);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.list.iter()
    }

    /// Highest severity seen so far.
    pub fn max_severity(&self) -> Option<Severity> {
        self.list.iter().map(|i| i.severity).max()
    }

    /// Whether any issue reaches `severity`.
    pub fn has_at_least(&self, severity: Severity) -> bool {
        self.list.iter().any(|i| i.severity >= severity)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.list.iter().map(|i| i.key).collect()
    }

    pub fn into_vec(self) -> Vec<Issue> {
        self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let args = vec!["N".to_string(), "part".to_string()];
        assert_eq!(
            render_template("Required command '${0}' is missing in this ${1}", &args),
            "Required command 'N' is missing in this part"
        );
        assert_eq!(render_template("no args", &[]), "no args");
        assert_eq!(render_template("missing ${3}", &args), "missing ${3}");
    }

    #[test]
    fn test_push_renders_default_translation() {
        let mut issues = Issues::new();
        issues.error(3, 7, "unknown_command", ["Q"]);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.key, "unknown_command");
        assert_eq!(issue.rendered, "Unknown command 'Q'");
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.to_string(), "4:8: error [unknown_command] Unknown command 'Q'");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Notice < Severity::Unstd);
        assert!(Severity::Unstd < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);

        let mut issues = Issues::new();
        issues.notice(0, 0, "empty_tree", ["part"]);
        assert!(!issues.has_at_least(Severity::Warning));
        issues.warn(0, 0, "empty_tree", ["part"]);
        assert_eq!(issues.max_severity(), Some(Severity::Warning));
    }

    #[test]
    fn test_every_key_has_translation() {
        for (key, template) in TRANSLATIONS {
            assert_eq!(default_translation(key), *template);
        }
        assert_eq!(default_translation("nope"), "Unknown issue");
    }
}
