//! core-sauce: SAUCE 00 metadata record, wire codec and CP437 mapping.
//!
//! Reused across:
//! - import: detect/strip SAUCE and apply metadata (dimensions, author/title, flags),
//! - export: append SAUCE (+ optional EOF 0x1A and comment block) to a byte stream,
//! - project persistence: SAUCE metadata is stored in the project record even
//!   though the project file is not a SAUCE-appended format.
//!
//! Fixed fields travel as CP437 on the wire and as UTF-8 in the engine.

pub mod cp437;
mod wire;

pub use wire::{
    Parsed, SauceError, WriteOptions, append_to_bytes, encode_char_field, parse_from_bytes,
    payload_size, strip,
};

use serde::{Deserialize, Serialize};

/// A SAUCE 00 record is always 128 bytes.
pub const RECORD_SIZE: usize = 128;
/// "COMNT" comment-block header length.
pub const COMMENT_HEADER_SIZE: usize = 5;
/// Each comment line is 64 bytes on the wire.
pub const COMMENT_LINE_WIDTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    None = 0,
    Character = 1,
    Bitmap = 2,
    Vector = 3,
    Audio = 4,
    BinaryText = 5,
    XBin = 6,
    Archive = 7,
    Executable = 8,
}

/// SAUCE 00 record with strings held as UTF-8.
///
/// Raw numeric fields are preserved verbatim for round-tripping; `file_size`
/// in particular is often unreliable in the wild and is never trusted for
/// payload boundaries (structure wins, see [`parse_from_bytes`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Whether a SAUCE record was found / should be written.
    pub present: bool,
    pub title: String,
    pub author: String,
    pub group: String,
    /// "CCYYMMDD"; kept as a string to preserve unknown/invalid dates.
    pub date: String,
    pub file_size: u32,
    pub data_type: u8,
    pub file_type: u8,
    pub tinfo1: u16,
    pub tinfo2: u16,
    pub tinfo3: u16,
    pub tinfo4: u16,
    pub comments_count: u8,
    pub tflags: u8,
    /// 22-byte ZString, usually a font-name hint.
    pub tinfos: String,
    /// Comment lines, each at most 64 codepoints when written.
    pub comments: Vec<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            present: false,
            title: String::new(),
            author: String::new(),
            group: String::new(),
            date: String::new(),
            file_size: 0,
            data_type: DataType::Character as u8,
            file_type: 1,
            tinfo1: 0,
            tinfo2: 0,
            tinfo3: 0,
            tinfo4: 0,
            comments_count: 0,
            tflags: 0,
            tinfos: String::new(),
            comments: Vec::new(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Field helpers (shared by the codec and the editor UI layer)
// -------------------------------------------------------------------------------------------------

/// Drop ASCII control characters (including newlines/tabs) from a string.
pub fn filter_control_chars(s: &str) -> String {
    s.chars().filter(|&c| c >= ' ' && c != '\u{7F}').collect()
}

/// Keep only ASCII digits.
pub fn keep_only_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Truncate to at most `max_codepoints` Unicode codepoints. Used to enforce
/// SAUCE fixed-width field limits without cutting UTF-8 sequences.
pub fn trim_to_codepoints(s: &str, max_codepoints: usize) -> &str {
    match s.char_indices().nth(max_codepoints) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse an exactly-8-digit "CCYYMMDD" date and validate it as a calendar day.
pub fn parse_date_yyyymmdd(s: &str) -> Option<(i32, u32, u32)> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let y: i32 = s[0..4].parse().ok()?;
    let m: u32 = s[4..6].parse().ok()?;
    let d: u32 = s[6..8].parse().ok()?;
    if !(1900..=9999).contains(&y) || !(1..=12).contains(&m) || d == 0 {
        return None;
    }
    let leap = (y % 400 == 0) || (y % 4 == 0 && y % 100 != 0);
    let mdays = [31, if leap { 29 } else { 28 }, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    (d <= mdays[(m - 1) as usize]).then_some((y, m, d))
}

/// Format a calendar day as "CCYYMMDD".
pub fn format_date_yyyymmdd(y: i32, m: u32, d: u32) -> String {
    format!("{y:04}{m:02}{d:02}")
}

/// Today's local date as "CCYYMMDD" (the SAUCE default for new canvases).
pub fn today_yyyymmdd() -> String {
    use chrono::Datelike;
    let now = chrono::Local::now();
    format_date_yyyymmdd(now.year(), now.month(), now.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn trims_by_codepoints_not_bytes() {
        let s = "a\u{00E9}\u{2565}xyz";
        assert_eq!(trim_to_codepoints(s, 3), "a\u{00E9}\u{2565}");
        assert_eq!(trim_to_codepoints(s, 0), "");
        assert_eq!(trim_to_codepoints("ab", 10), "ab");
    }

    #[test]
    fn date_validation_rejects_bad_days() {
        assert_eq!(parse_date_yyyymmdd("20240229"), Some((2024, 2, 29)));
        assert_eq!(parse_date_yyyymmdd("20230229"), None);
        assert_eq!(parse_date_yyyymmdd("2024011"), None);
        assert_eq!(parse_date_yyyymmdd("2024O101"), None);
    }

    #[test]
    fn control_chars_are_stripped() {
        assert_eq!(filter_control_chars("a\tb\nc\u{7F}d"), "abcd");
    }

    #[test]
    fn today_is_eight_digits() {
        let t = today_yyyymmdd();
        assert_eq!(t.len(), 8);
        assert!(parse_date_yyyymmdd(&t).is_some());
    }
}
