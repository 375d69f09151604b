//! # Parser Configuration
//!
//! Knobs a host may set before parsing, loaded from YAML:
//!
//! ```yaml
//! iteration_limit: 512
//! default_qpm: 96
//! render:
//!   n: "3"
//!   page_width: "640"
//! measure:
//!   char_width: 0.55
//! ```
//!
//! Every field is optional. `render` entries use the same keys and value
//! syntax as an `Rp:` line and sit underneath the document's own `Rp`.

use crate::error::NmnError;
use crate::model::render::{RenderPropError, RenderProps};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Glyph metrics for the text width estimator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Width of a narrow (ASCII) character as a fraction of the font size.
    pub char_width: f64,
    /// Width of a wide (CJK) character as a fraction of the font size.
    pub wide_char_width: f64,
    /// Width of an accidental glyph as a fraction of the note size.
    pub accidental_width: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        MeasureConfig {
            char_width: 0.55,
            wide_char_width: 1.0,
            accidental_width: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Most iterations the sequencer may open per article.
    pub iteration_limit: usize,
    /// Speed used where no `qpm` is set.
    pub default_qpm: f64,
    pub render: BTreeMap<String, String>,
    pub measure: MeasureConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            iteration_limit: 2048,
            default_qpm: 120.0,
            render: BTreeMap::new(),
            measure: MeasureConfig::default(),
        }
    }
}

impl ParserConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, NmnError> {
        let config: ParserConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, NmnError> {
        let text = std::fs::read_to_string(path).map_err(|source| NmnError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("loaded parser config from {}", path.display());
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), NmnError> {
        if self.iteration_limit == 0 {
            return Err(NmnError::Config("iteration_limit must be positive".to_string()));
        }
        if !(self.default_qpm.is_finite() && self.default_qpm > 0.0) {
            return Err(NmnError::Config(format!(
                "default_qpm must be a positive number, got {}",
                self.default_qpm
            )));
        }
        let m = &self.measure;
        if [m.char_width, m.wide_char_width, m.accidental_width]
            .iter()
            .any(|w| !(w.is_finite() && *w > 0.0))
        {
            return Err(NmnError::Config("glyph widths must be positive".to_string()));
        }
        self.render_props().map(|_| ())
    }

    /// Host render defaults as typed properties.
    pub fn render_props(&self) -> Result<RenderProps, NmnError> {
        let mut props = RenderProps::new();
        for (key, value) in &self.render {
            props.set(key, value).map_err(|e| match e {
                RenderPropError::UnknownKey => NmnError::Config(format!("unknown render property '{}'", key)),
                RenderPropError::BadValue => {
                    NmnError::Config(format!("invalid value '{}' for render property '{}'", value, key))
                }
            })?;
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ParserConfig::default());
        assert_eq!(config.iteration_limit, 2048);
    }

    #[test]
    fn test_partial_yaml() {
        let config = ParserConfig::from_yaml_str("iteration_limit: 16\nrender:\n  n: \"2\"\n").unwrap();
        assert_eq!(config.iteration_limit, 16);
        assert_eq!(config.default_qpm, 120.0);
        assert_eq!(config.render_props().unwrap().sections_per_line(), 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ParserConfig::from_yaml_str("iteration_limit: 0"),
            Err(NmnError::Config(_))
        ));
        assert!(matches!(
            ParserConfig::from_yaml_str("render:\n  nope: \"1\"\n"),
            Err(NmnError::Config(_))
        ));
        assert!(matches!(
            ParserConfig::from_yaml_str("iteration_limit: ["),
            Err(NmnError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_qpm: 90").unwrap();
        let config = ParserConfig::load(file.path()).unwrap();
        assert_eq!(config.default_qpm, 90.0);

        let missing = ParserConfig::load(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(missing, Err(NmnError::Io { .. })));
    }
}
