use crate::tokenizer::Span;
use serde::Serialize;

/// A volta-like range of sections (`J: 3-4[1.] 5[2.]`).
///
/// The walk skips the range on passes not listed in `iterations`, and plays
/// it `octave` octaves off.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Jumper {
    /// First section, 0-based; fragment-local until flattened.
    pub start: usize,
    /// One past the last section.
    pub end: usize,
    pub iterations: Vec<u32>,
    pub octave: i32,
    pub range: Span,
}

impl Jumper {
    pub fn contains(&self, section: usize) -> bool {
        (self.start..self.end).contains(&section)
    }

    /// Applies on the given pass. No listed pass means every pass.
    pub fn accepts(&self, iteration: u32) -> bool {
        self.iterations.is_empty() || self.iterations.contains(&iteration)
    }

    pub fn shifted(&self, by: usize) -> Jumper {
        Jumper {
            start: self.start + by,
            end: self.end + by,
            ..self.clone()
        }
    }
}
