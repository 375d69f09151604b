//! Horizontal layout of rendered lines.
//!
//! [`measure`] answers how wide a piece of text is, [`dispatcher`] turns
//! those widths into x coordinates for every time position of a line.

pub mod dispatcher;
pub mod measure;

pub use dispatcher::{dispatch_compute, DispatchStatus, Footprint, PositionDispatcher, SectionLayout, SectionRequest};
pub use measure::{GlyphEstimator, MeasureCache, TextMeasure};
