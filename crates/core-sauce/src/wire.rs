//! SAUCE 00 wire codec: parse from / append to a byte stream.

use crate::{COMMENT_HEADER_SIZE, COMMENT_LINE_WIDTH, RECORD_SIZE, Record, cp437};
use thiserror::Error;
use tracing::debug;

/// EOF marker (Ctrl+Z) conventionally written before SAUCE metadata.
const SUB: u8 = 0x1A;

// Field offsets inside the 128-byte record.
const OFF_TITLE: usize = 7;
const OFF_AUTHOR: usize = 42;
const OFF_GROUP: usize = 62;
const OFF_DATE: usize = 82;
const OFF_FILESIZE: usize = 90;
const OFF_DATATYPE: usize = 94;
const OFF_FILETYPE: usize = 95;
const OFF_TINFO1: usize = 96;
const OFF_TINFO2: usize = 98;
const OFF_TINFO3: usize = 100;
const OFF_TINFO4: usize = 102;
const OFF_COMMENTS: usize = 104;
const OFF_TFLAGS: usize = 105;
const OFF_TINFOS: usize = 106;

#[derive(Debug, Error)]
pub enum SauceError {
    #[error("too many SAUCE comment lines (max 255)")]
    TooManyComments,
}

/// Result of scanning a byte stream for SAUCE metadata.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub record: Record,
    /// Where the art payload ends, derived from structure:
    /// `payload [+ 0x1A] [+ COMNT block] + SAUCE record`. Preferred over
    /// trusting `Record::file_size`.
    pub payload_size: usize,
    pub has_eof_byte: bool,
    pub has_comment_block: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Append 0x1A before COMNT/SAUCE.
    pub include_eof_byte: bool,
    /// Write the COMNT block when the record has comments.
    pub include_comments: bool,
    /// Encode fixed fields as CP437 bytes ('?' when not representable).
    pub encode_cp437: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { include_eof_byte: true, include_comments: true, encode_cp437: true }
    }
}

fn read_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn read_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Decode a fixed-width character field, trimming trailing spaces and NULs.
fn decode_char_field(bytes: &[u8], decode_cp437: bool) -> String {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b' ' || bytes[end - 1] == 0) {
        end -= 1;
    }
    bytes[..end]
        .iter()
        .map(|&b| {
            if decode_cp437 {
                cp437::byte_to_unicode(b)
            } else if b < 0x80 {
                b as char
            } else {
                '\u{FFFD}'
            }
        })
        .collect()
}

/// Encode a string into a fixed-width field: space padded, truncated to
/// `width` codepoints, CP437 (or ASCII) encoded with '?' fallback.
pub fn encode_char_field(s: &str, width: usize, encode_cp437: bool) -> Vec<u8> {
    let mut out = vec![b' '; width];
    for (slot, cp) in out.iter_mut().zip(s.chars()) {
        *slot = if encode_cp437 {
            cp437::unicode_to_byte_lossy(cp)
        } else if (cp as u32) < 0x80 {
            cp as u8
        } else {
            b'?'
        };
    }
    out
}

/// Split comment strings into <= 64-codepoint lines, never mid-sequence,
/// capped at 255 lines total.
fn chunk_comments(input: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for s in input {
        if s.is_empty() {
            out.push(String::new());
            continue;
        }
        let mut rest = s.as_str();
        while !rest.is_empty() {
            let line = crate::trim_to_codepoints(rest, COMMENT_LINE_WIDTH);
            out.push(line.to_string());
            rest = &rest[line.len()..];
        }
    }
    out.truncate(255);
    out
}

/// Parse SAUCE (and an optional COMNT block) from the end of `bytes`.
///
/// A stream without SAUCE parses successfully with `record.present == false`
/// and `payload_size == bytes.len()`.
pub fn parse_from_bytes(bytes: &[u8], decode_cp437: bool) -> Parsed {
    let mut out = Parsed { payload_size: bytes.len(), ..Parsed::default() };
    if bytes.len() < RECORD_SIZE {
        return out;
    }

    let sauce_off = bytes.len() - RECORD_SIZE;
    let rec = &bytes[sauce_off..];
    if &rec[0..7] != b"SAUCE00" {
        return out;
    }

    let mut r = Record { present: true, ..Record::default() };
    r.title = decode_char_field(&rec[OFF_TITLE..OFF_TITLE + 35], decode_cp437);
    r.author = decode_char_field(&rec[OFF_AUTHOR..OFF_AUTHOR + 20], decode_cp437);
    r.group = decode_char_field(&rec[OFF_GROUP..OFF_GROUP + 20], decode_cp437);
    // Date is always ASCII digits.
    r.date = decode_char_field(&rec[OFF_DATE..OFF_DATE + 8], false);
    r.file_size = read_u32_le(&rec[OFF_FILESIZE..]);
    r.data_type = rec[OFF_DATATYPE];
    r.file_type = rec[OFF_FILETYPE];
    r.tinfo1 = read_u16_le(&rec[OFF_TINFO1..]);
    r.tinfo2 = read_u16_le(&rec[OFF_TINFO2..]);
    r.tinfo3 = read_u16_le(&rec[OFF_TINFO3..]);
    r.tinfo4 = read_u16_le(&rec[OFF_TINFO4..]);
    r.comments_count = rec[OFF_COMMENTS];
    r.tflags = rec[OFF_TFLAGS];

    // TInfoS is a ZString within 22 bytes.
    let tinfos = &rec[OFF_TINFOS..OFF_TINFOS + 22];
    let z = tinfos.iter().position(|&b| b == 0).unwrap_or(22);
    r.tinfos = decode_char_field(&tinfos[..z], decode_cp437);

    let mut payload_end = sauce_off;

    if r.comments_count > 0 {
        let need = COMMENT_HEADER_SIZE + r.comments_count as usize * COMMENT_LINE_WIDTH;
        if payload_end >= need {
            let comnt_off = payload_end - need;
            if &bytes[comnt_off..comnt_off + COMMENT_HEADER_SIZE] == b"COMNT" {
                out.has_comment_block = true;
                let lines = &bytes[comnt_off + COMMENT_HEADER_SIZE..payload_end];
                r.comments = lines
                    .chunks_exact(COMMENT_LINE_WIDTH)
                    .map(|line| decode_char_field(line, decode_cp437))
                    .collect();
                payload_end = comnt_off;
            }
        }
    }

    if payload_end > 0 && bytes[payload_end - 1] == SUB {
        out.has_eof_byte = true;
        payload_end -= 1;
    }

    debug!(
        target: "sauce",
        payload = payload_end,
        comments = r.comments.len(),
        data_type = r.data_type,
        "sauce_parsed"
    );
    out.record = r;
    out.payload_size = payload_end;
    out
}

/// Payload size after stripping SAUCE/COMNT/EOF, or the whole stream when no
/// SAUCE record is present.
pub fn payload_size(bytes: &[u8]) -> usize {
    let p = parse_from_bytes(bytes, true);
    if p.record.present { p.payload_size } else { bytes.len() }
}

/// Copy payload bytes without SAUCE/COMNT/EOF.
pub fn strip(bytes: &[u8]) -> Vec<u8> {
    bytes[..payload_size(bytes)].to_vec()
}

fn sanitize_for_write(r: &Record) -> Record {
    let mut out = r.clone();
    out.title = crate::filter_control_chars(&out.title);
    out.author = crate::filter_control_chars(&out.author);
    out.group = crate::filter_control_chars(&out.group);
    out.tinfos = crate::filter_control_chars(&out.tinfos);
    for line in &mut out.comments {
        *line = crate::filter_control_chars(line);
    }
    // Date must be exactly 8 digits CCYYMMDD, otherwise write empty.
    out.date = crate::keep_only_digits(&out.date);
    if crate::parse_date_yyyymmdd(&out.date).is_none() {
        out.date.clear();
    }
    out
}

/// Append SAUCE/COMNT/EOF to an existing payload stream.
///
/// Records with `present == false` return the payload unchanged.
pub fn append_to_bytes(
    payload: &[u8],
    record: &Record,
    opt: &WriteOptions,
) -> Result<Vec<u8>, SauceError> {
    if !record.present {
        return Ok(payload.to_vec());
    }

    let r = sanitize_for_write(record);

    let comment_lines = if opt.include_comments && !r.comments.is_empty() {
        chunk_comments(&r.comments)
    } else {
        Vec::new()
    };
    if comment_lines.len() > 255 {
        return Err(SauceError::TooManyComments);
    }

    let mut out = Vec::with_capacity(
        payload.len()
            + 1
            + COMMENT_HEADER_SIZE
            + comment_lines.len() * COMMENT_LINE_WIDTH
            + RECORD_SIZE,
    );
    out.extend_from_slice(payload);

    if opt.include_eof_byte {
        out.push(SUB);
    }

    if !comment_lines.is_empty() {
        out.extend_from_slice(b"COMNT");
        for line in &comment_lines {
            out.extend_from_slice(&encode_char_field(line, COMMENT_LINE_WIDTH, opt.encode_cp437));
        }
    }

    let mut rec = [b' '; RECORD_SIZE];
    rec[0..7].copy_from_slice(b"SAUCE00");

    rec[OFF_TITLE..OFF_TITLE + 35]
        .copy_from_slice(&encode_char_field(&r.title, 35, opt.encode_cp437));
    rec[OFF_AUTHOR..OFF_AUTHOR + 20]
        .copy_from_slice(&encode_char_field(&r.author, 20, opt.encode_cp437));
    rec[OFF_GROUP..OFF_GROUP + 20]
        .copy_from_slice(&encode_char_field(&r.group, 20, opt.encode_cp437));
    rec[OFF_DATE..OFF_DATE + 8].copy_from_slice(&encode_char_field(&r.date, 8, false));

    let file_size = if r.file_size != 0 { r.file_size } else { payload.len() as u32 };
    rec[OFF_FILESIZE..OFF_FILESIZE + 4].copy_from_slice(&file_size.to_le_bytes());
    rec[OFF_DATATYPE] = r.data_type;
    rec[OFF_FILETYPE] = r.file_type;
    rec[OFF_TINFO1..OFF_TINFO1 + 2].copy_from_slice(&r.tinfo1.to_le_bytes());
    rec[OFF_TINFO2..OFF_TINFO2 + 2].copy_from_slice(&r.tinfo2.to_le_bytes());
    rec[OFF_TINFO3..OFF_TINFO3 + 2].copy_from_slice(&r.tinfo3.to_le_bytes());
    rec[OFF_TINFO4..OFF_TINFO4 + 2].copy_from_slice(&r.tinfo4.to_le_bytes());
    rec[OFF_COMMENTS] = comment_lines.len() as u8;
    rec[OFF_TFLAGS] = r.tflags;

    // TInfoS: ZString, NUL padded within 22 bytes.
    let mut tinfos = [0u8; 22];
    let encoded = encode_char_field(&r.tinfos, 22, opt.encode_cp437);
    let mut n = encoded.len();
    while n > 0 && encoded[n - 1] == b' ' {
        n -= 1;
    }
    tinfos[..n].copy_from_slice(&encoded[..n]);
    rec[OFF_TINFOS..OFF_TINFOS + 22].copy_from_slice(&tinfos);

    out.extend_from_slice(&rec);
    Ok(out)
}
