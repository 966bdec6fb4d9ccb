//! Key image rendering
//!
//! Every key is a square RGB bitmap: background color, an optional icon and
//! a one-line label.

pub mod button;
pub mod font;
pub mod icons;

pub use button::{ButtonRenderer, ICON_SIZE, LABEL_MARGIN};
pub use font::TextRenderer;
pub use icons::IconCache;
