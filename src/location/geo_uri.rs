//! `geo:` URI construction.
//!
//! Rust's float formatting never consults the process locale, so the
//! decimal separator is always `.` and `,` only ever separates the pair.

use super::types::LocationFix;

/// Build `geo:<lat>,<lon>` with six fixed decimals.
pub fn geo_uri(fix: &LocationFix) -> String {
    format!("geo:{:.6},{:.6}", fix.latitude(), fix.longitude())
}

/// Text rendered next to the buttons after a successful fetch.
pub fn fix_text(fix: &LocationFix) -> String {
    fix.to_string()
}
