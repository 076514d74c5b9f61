//! Text extraction for filing analysis.
//!
//! - [`plain_text`] renders filing markup as the text a reader sees.
//! - [`extract`] turns that text into the context windows sent to the
//!   classifier, merging windows whose context overlaps.
//!
//! Everything here is pure and synchronous.

mod plain_text;
mod window;

pub use plain_text::{looks_like_markup, plain_text};
pub use window::{
    ContextWindow, DISCONTINUATION_PATTERN, InvalidWindow, WindowOptions, Windows, extract,
};
