//! Parsing of the free-text fields carried by import rows.

mod text;
mod title;

pub use text::{normalize_text, parse_barcodes, search_fragment};
pub use title::{parse_title, Measure, ParsedTitle, UNKNOWN_LAB};
