//! Label placement inside polygons.
//!
//! `label_point` finds an interior anchor for a text label, `pack_circles`
//! covers a polygon with a few large inscribed circles that carry glyphs.

mod grid;
mod label;
mod packing;
mod polylabel;

pub use label::label_point;
pub use packing::{annotate_glyphs, pack_circles, PackingCircle, PackingParams};
