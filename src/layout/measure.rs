//! Text width estimation.
//!
//! The compiler never paints glyphs; it only needs to know how much room
//! they take. [`GlyphEstimator`] guesses from character classes, and a host
//! with real font metrics can plug in its own [`TextMeasure`].

use crate::config::MeasureConfig;
use std::collections::HashMap;
use std::sync::Mutex;

pub trait TextMeasure {
    /// Width of `text` set at font size `size`.
    fn measure(&self, text: &str, size: f64) -> f64;

    /// Width of one accidental glyph next to a note of size `size`.
    fn accidental(&self, size: f64) -> f64 {
        0.4 * size
    }
}

impl<M: TextMeasure + ?Sized> TextMeasure for &M {
    fn measure(&self, text: &str, size: f64) -> f64 {
        (**self).measure(text, size)
    }

    fn accidental(&self, size: f64) -> f64 {
        (**self).accidental(size)
    }
}

/// Width from character classes: narrow for ASCII, wide for everything else.
#[derive(Debug, Clone, Default)]
pub struct GlyphEstimator {
    config: MeasureConfig,
}

impl GlyphEstimator {
    pub fn new(config: MeasureConfig) -> Self {
        GlyphEstimator { config }
    }
}

impl TextMeasure for GlyphEstimator {
    fn measure(&self, text: &str, size: f64) -> f64 {
        text.chars()
            .map(|c| {
                if c.is_ascii() {
                    self.config.char_width
                } else {
                    self.config.wide_char_width
                }
            })
            .sum::<f64>()
            * size
    }

    fn accidental(&self, size: f64) -> f64 {
        self.config.accidental_width * size
    }
}

/// Remembers every width it was asked for.
///
/// Entries depend only on the text and size, so one cache can serve any
/// number of documents, also from several threads.
pub struct MeasureCache<M> {
    inner: M,
    widths: Mutex<HashMap<(String, u64), f64>>,
}

impl<M: TextMeasure> MeasureCache<M> {
    pub fn new(inner: M) -> Self {
        MeasureCache {
            inner,
            widths: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.widths.lock().map_or(0, |w| w.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: TextMeasure> TextMeasure for MeasureCache<M> {
    fn measure(&self, text: &str, size: f64) -> f64 {
        let key = (text.to_string(), size.to_bits());
        if let Ok(widths) = self.widths.lock() {
            if let Some(w) = widths.get(&key) {
                return *w;
            }
        }
        let width = self.inner.measure(text, size);
        if let Ok(mut widths) = self.widths.lock() {
            widths.insert(key, width);
        }
        width
    }

    fn accidental(&self, size: f64) -> f64 {
        self.inner.accidental(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_classes() {
        let m = GlyphEstimator::default();
        assert!((m.measure("ab", 10.0) - 11.0).abs() < 1e-9);
        assert!((m.measure("我", 10.0) - 10.0).abs() < 1e-9);
        assert!((m.accidental(10.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_memoizes() {
        let cache = MeasureCache::new(GlyphEstimator::default());
        assert!(cache.is_empty());
        let a = cache.measure("la", 16.0);
        let b = cache.measure("la", 16.0);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        cache.measure("la", 12.0);
        assert_eq!(cache.len(), 2);
    }
}
