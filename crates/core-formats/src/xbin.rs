//! XBin (.xb) import/export.
//!
//! Header: `XBIN` + 0x1A, width/height (u16 LE), font height (1..=32),
//! flags (bit0 palette, bit1 font, bit2 compressed, bit3 nonblink,
//! bit4 mode-512). Optional 48-byte 6-bit RGB palette, optional
//! `glyphs * font_height` bitmap font, then raw `(char, attr)` pairs or
//! row-wise RLE.

use crate::FormatError;
use core_canvas::{Canvas, CellWrite, EmbeddedBitmapFont};
use core_palette::{BuiltinPalette, Color32, MatchPolicy, PaletteRef, color32_to_index,
    index_to_color32, pack_rgb, unpack_rgb};
use core_sauce::cp437;
use std::path::Path;
use tracing::debug;

const MAGIC: &[u8; 4] = b"XBIN";

const FLAG_PALETTE: u8 = 0x01;
const FLAG_FONT: u8 = 0x02;
const FLAG_COMPRESS: u8 = 0x04;
const FLAG_NONBLINK: u8 = 0x08;
const FLAG_512: u8 = 0x10;

/// Parsed XBin header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub width: u16,
    pub height: u16,
    pub font_height: u8,
    pub has_palette: bool,
    pub has_font: bool,
    pub compressed: bool,
    pub nonblink: bool,
    pub mode_512: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Decode the character byte as CP437 (classic XBin semantics). When
    /// false, bytes >= 0x80 map to U+FFFD.
    pub decode_cp437: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { decode_cp437: true }
    }
}

/// Which cells an export reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportSource {
    /// The composited "what you see" result.
    #[default]
    Composite,
    /// Only the active layer.
    ActiveLayer,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub source: ExportSource,
    /// Write a 16-color palette chunk (6-bit VGA components).
    pub include_palette: bool,
    /// Embed the canvas' bitmap font; fails when the canvas has none.
    pub include_font: bool,
    /// Row-wise RLE instead of raw pairs.
    pub compress: bool,
    /// Attribute bit 7 is background intensity (16 background colors).
    pub nonblink: bool,
    /// Append a SAUCE trailer.
    pub write_sauce: bool,
    pub sauce_write_options: core_sauce::WriteOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            source: ExportSource::Composite,
            include_palette: true,
            include_font: false,
            compress: true,
            nonblink: true,
            write_sauce: false,
            sauce_write_options: core_sauce::WriteOptions::default(),
        }
    }
}

fn read_u16_le(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

/// Parse the 11-byte header. Returns the header and the offset past it.
pub fn parse_header(payload: &[u8]) -> Result<(Header, usize), FormatError> {
    if payload.len() < 11 {
        return Err(FormatError::malformed("file too small to be an XBin"));
    }
    if &payload[0..4] != MAGIC {
        return Err(FormatError::malformed("not an XBin file (missing XBIN header)"));
    }
    if payload[4] != 0x1A {
        return Err(FormatError::malformed("not an XBin file (missing Ctrl-Z byte after XBIN)"));
    }

    let width = read_u16_le(payload, 5);
    let height = read_u16_le(payload, 7);
    let mut font_height = payload[9];
    let flags = payload[10];

    if width == 0 || height == 0 {
        return Err(FormatError::malformed("invalid XBin dimensions (width/height must be > 0)"));
    }
    if font_height == 0 {
        font_height = 16; // common convention
    }
    if font_height > 32 {
        return Err(FormatError::malformed("invalid XBin font height (must be 1..32)"));
    }

    let header = Header {
        width,
        height,
        font_height,
        has_palette: flags & FLAG_PALETTE != 0,
        has_font: flags & FLAG_FONT != 0,
        compressed: flags & FLAG_COMPRESS != 0,
        nonblink: flags & FLAG_NONBLINK != 0,
        mode_512: flags & FLAG_512 != 0,
    };
    if header.mode_512 && !header.has_font {
        return Err(FormatError::malformed("XBin 512-character mode requires an embedded font"));
    }
    Ok((header, 11))
}

fn default_palette32() -> [Color32; 16] {
    std::array::from_fn(|i| index_to_color32(PaletteRef::Builtin(BuiltinPalette::Xterm16), i as u16))
}

fn read_palette(payload: &[u8], off: &mut usize) -> Result<[Color32; 16], FormatError> {
    if *off + 48 > payload.len() {
        return Err(FormatError::malformed("truncated XBin palette"));
    }
    let mut pal = [0u32; 16];
    for (i, slot) in pal.iter_mut().enumerate() {
        let r6 = payload[*off + i * 3];
        let g6 = payload[*off + i * 3 + 1];
        let b6 = payload[*off + i * 3 + 2];
        // 6-bit VGA -> 8-bit expansion.
        *slot = pack_rgb((r6 << 2) | (r6 >> 4), (g6 << 2) | (g6 >> 4), (b6 << 2) | (b6 >> 4));
    }
    *off += 48;
    Ok(pal)
}

fn decode_compressed_row(
    payload: &[u8],
    off: &mut usize,
    width: usize,
    chars: &mut Vec<u8>,
    attrs: &mut Vec<u8>,
) -> Result<(), FormatError> {
    chars.clear();
    attrs.clear();
    while chars.len() < width {
        let tag = *payload
            .get(*off)
            .ok_or_else(|| FormatError::malformed("truncated XBin compressed image data"))?;
        *off += 1;
        let run_type = (tag >> 6) & 0x03;
        let count = (tag & 0x3F) as usize + 1;
        if chars.len() + count > width {
            return Err(FormatError::malformed("invalid XBin compressed row (run exceeds row width)"));
        }
        let need = match run_type {
            0 => count * 2,
            1 | 2 => 1 + count,
            _ => 2,
        };
        if *off + need > payload.len() {
            return Err(FormatError::malformed("truncated XBin compressed image data"));
        }
        match run_type {
            0 => {
                for _ in 0..count {
                    chars.push(payload[*off]);
                    attrs.push(payload[*off + 1]);
                    *off += 2;
                }
            }
            1 => {
                let ch = payload[*off];
                *off += 1;
                for _ in 0..count {
                    chars.push(ch);
                    attrs.push(payload[*off]);
                    *off += 1;
                }
            }
            2 => {
                let at = payload[*off];
                *off += 1;
                for _ in 0..count {
                    chars.push(payload[*off]);
                    attrs.push(at);
                    *off += 1;
                }
            }
            _ => {
                let ch = payload[*off];
                let at = payload[*off + 1];
                *off += 2;
                for _ in 0..count {
                    chars.push(ch);
                    attrs.push(at);
                }
            }
        }
    }
    Ok(())
}

/// Build a canvas from XBin bytes (SAUCE trailer stripped and applied when
/// present).
pub fn import_bytes(bytes: &[u8], options: &ImportOptions) -> Result<Canvas, FormatError> {
    let parsed = core_sauce::parse_from_bytes(bytes, true);
    let payload =
        if parsed.record.present { &bytes[..parsed.payload_size.min(bytes.len())] } else { bytes };

    let (hdr, mut off) = parse_header(payload)?;

    let mut pal32 = default_palette32();
    if hdr.has_palette {
        pal32 = read_palette(payload, &mut off)?;
    }

    let glyph_count: usize = if hdr.mode_512 { 512 } else { 256 };
    let mut font_bitmap = Vec::new();
    if hdr.has_font {
        let need = hdr.font_height as usize * glyph_count;
        if off + need > payload.len() {
            return Err(FormatError::malformed("truncated XBin font data"));
        }
        font_bitmap = payload[off..off + need].to_vec();
        off += need;
    }

    let cols = hdr.width as i32;
    let rows = hdr.height as i32;
    let mut canvas = Canvas::new(cols);
    canvas.set_rows(rows)?;
    canvas.set_palette_ref(PaletteRef::Builtin(BuiltinPalette::Xterm16));

    let font = hdr.has_font.then(|| EmbeddedBitmapFont {
        cell_w: 8,
        cell_h: hdr.font_height,
        glyph_count: glyph_count as u16,
        vga_9col_dup: false,
        bitmap: font_bitmap,
    });

    let decode_cp = |b: u8| -> char {
        if options.decode_cp437 {
            cp437::byte_to_unicode(b)
        } else if b < 0x80 {
            b as char
        } else {
            '\u{FFFD}'
        }
    };

    let apply_row = |canvas: &mut Canvas, y: i32, ch: &[u8], at: &[u8]| {
        for x in 0..cols {
            let c = ch[x as usize];
            let a = at[x as usize];

            let fg_idx = if hdr.mode_512 { a & 0x07 } else { a & 0x0F } as usize;
            let bg_idx = if hdr.nonblink { (a >> 4) & 0x0F } else { (a >> 4) & 0x07 } as usize;

            let cp = match &font {
                Some(f) => {
                    let mut gi = c as u16;
                    if hdr.mode_512 && a & 0x08 != 0 {
                        gi += 256;
                    }
                    if gi >= f.glyph_count {
                        gi = 0;
                    }
                    f.codepoint_for_glyph(gi).unwrap_or(' ')
                }
                None => decode_cp(c),
            };

            let _ = canvas.set_layer_cell(
                0,
                y,
                x,
                CellWrite::colored(cp, pal32[fg_idx.min(15)], pal32[bg_idx.min(15)]),
            );
        }
    };

    let width = cols as usize;
    let mut row_ch = Vec::with_capacity(width);
    let mut row_at = Vec::with_capacity(width);
    if hdr.compressed {
        for y in 0..rows {
            decode_compressed_row(payload, &mut off, width, &mut row_ch, &mut row_at)?;
            apply_row(&mut canvas, y, &row_ch, &row_at);
        }
    } else {
        let need = width * rows as usize * 2;
        if off + need > payload.len() {
            return Err(FormatError::malformed("truncated XBin image data"));
        }
        for y in 0..rows {
            row_ch.clear();
            row_at.clear();
            for _ in 0..width {
                row_ch.push(payload[off]);
                row_at.push(payload[off + 1]);
                off += 2;
            }
            apply_row(&mut canvas, y, &row_ch, &row_at);
        }
    }

    canvas.set_embedded_font(font);
    if parsed.record.present {
        let mut record = parsed.record;
        record.data_type = core_sauce::DataType::XBin as u8;
        canvas.set_sauce(record);
    }
    canvas.set_caret(0, 0);

    debug!(
        target: "formats.xbin",
        cols,
        rows,
        compressed = hdr.compressed,
        nonblink = hdr.nonblink,
        font = hdr.has_font,
        "xbin_imported"
    );
    Ok(canvas)
}

pub fn import_file(path: &Path, options: &ImportOptions) -> Result<Canvas, FormatError> {
    let bytes = std::fs::read(path)?;
    import_bytes(&bytes, options)
}

// -------------------------------------------------------------------------------------------------
// Export
// -------------------------------------------------------------------------------------------------

fn run_both(ch: &[u8], at: &[u8], x: usize) -> usize {
    let (c0, a0) = (ch[x], at[x]);
    let mut n = 1;
    while x + n < ch.len() && n < 64 && ch[x + n] == c0 && at[x + n] == a0 {
        n += 1;
    }
    n
}

fn run_char(ch: &[u8], x: usize) -> usize {
    let c0 = ch[x];
    let mut n = 1;
    while x + n < ch.len() && n < 64 && ch[x + n] == c0 {
        n += 1;
    }
    n
}

fn run_attr(at: &[u8], x: usize) -> usize {
    let a0 = at[x];
    let mut n = 1;
    while x + n < at.len() && n < 64 && at[x + n] == a0 {
        n += 1;
    }
    n
}

/// Encode one row with the XBin RLE: pick the run form with the best
/// savings, and keep raw chunks from swallowing upcoming profitable runs.
fn encode_row_rle(ch: &[u8], at: &[u8], out: &mut Vec<u8>) {
    let width = ch.len();
    let profitable_at = |x: usize| -> bool {
        run_both(ch, at, x) >= 2 || run_char(ch, x) >= 3 || run_attr(at, x) >= 3
    };

    let mut x = 0usize;
    while x < width {
        let rb = run_both(ch, at, x);
        let rc = run_char(ch, x);
        let ra = run_attr(at, x);

        // 0 = raw, 1 = char run, 2 = attr run, 3 = both.
        let mut kind = 0u8;
        let mut len = 1usize;

        if rb >= 2 {
            kind = 3;
            len = rb;
        }
        if rc >= 3 {
            let save = 2 * rc as i32 - (2 + rc as i32);
            let cur_save = if kind == 3 { 2 * len as i32 - 3 } else { i32::MIN };
            if save > cur_save {
                kind = 1;
                len = rc;
            }
        }
        if ra >= 3 {
            let save = 2 * ra as i32 - (2 + ra as i32);
            let cur_save = match kind {
                3 => 2 * len as i32 - 3,
                1 => 2 * len as i32 - (2 + len as i32),
                _ => i32::MIN,
            };
            if save > cur_save {
                kind = 2;
                len = ra;
            }
        }

        if kind == 0 {
            let mut n = 1;
            while x + n < width && n < 64 && !profitable_at(x + n) {
                n += 1;
            }
            len = n;
        }

        out.push((kind << 6) | ((len - 1) as u8 & 0x3F));
        match kind {
            0 => {
                for i in 0..len {
                    out.push(ch[x + i]);
                    out.push(at[x + i]);
                }
            }
            1 => {
                out.push(ch[x]);
                out.extend_from_slice(&at[x..x + len]);
            }
            2 => {
                out.push(at[x]);
                out.extend_from_slice(&ch[x..x + len]);
            }
            _ => {
                out.push(ch[x]);
                out.push(at[x]);
            }
        }
        x += len;
    }
}

/// Serialize a canvas to XBin bytes.
pub fn export_bytes(canvas: &Canvas, options: &ExportOptions) -> Result<Vec<u8>, FormatError> {
    let cols = canvas.columns().max(1);
    let rows = canvas.rows().max(1);
    if cols > u16::MAX as i32 || rows > u16::MAX as i32 {
        return Err(FormatError::unsupported("XBin export: canvas dimensions exceed XBin limits"));
    }

    let pal16 = PaletteRef::Builtin(BuiltinPalette::Xterm16);
    let pal32 = default_palette32();

    let font = canvas.embedded_font().filter(|f| f.is_valid());
    if options.include_font {
        let Some(f) = font else {
            return Err(FormatError::unsupported(
                "XBin export: include_font requested but canvas has no embedded font",
            ));
        };
        if f.glyph_count != 256 {
            return Err(FormatError::unsupported(
                "XBin export: only 256-glyph embedded fonts are supported for export",
            ));
        }
        if f.cell_w != 8 || f.cell_h < 1 || f.cell_h > 32 {
            return Err(FormatError::unsupported("XBin export: embedded font must be 8x(1..32)"));
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(0x1A);
    out.extend_from_slice(&(cols as u16).to_le_bytes());
    out.extend_from_slice(&(rows as u16).to_le_bytes());
    out.push(match (options.include_font, font) {
        (true, Some(f)) => f.cell_h,
        _ => 16,
    });

    let mut flags = 0u8;
    if options.include_palette {
        flags |= FLAG_PALETTE;
    }
    if options.include_font {
        flags |= FLAG_FONT;
    }
    if options.compress {
        flags |= FLAG_COMPRESS;
    }
    if options.nonblink {
        flags |= FLAG_NONBLINK;
    }
    out.push(flags);

    if options.include_palette {
        for c in pal32 {
            let (r, g, b) = unpack_rgb(c).unwrap_or((0, 0, 0));
            out.push(r >> 2);
            out.push(g >> 2);
            out.push(b >> 2);
        }
    }
    if options.include_font
        && let Some(f) = font
    {
        out.extend_from_slice(&f.bitmap[..f.glyph_count as usize * f.cell_h as usize]);
    }

    // Gather cells and quantize to 16-color indices.
    let n = cols as usize * rows as usize;
    let mut ch = vec![0u8; n];
    let mut at = vec![0u8; n];
    for y in 0..rows {
        for x in 0..cols {
            let (cp, mut fg32, mut bg32) = match options.source {
                ExportSource::Composite => {
                    let c = canvas.composite_cell(y, x);
                    (c.cp, c.fg, c.bg)
                }
                ExportSource::ActiveLayer => {
                    match canvas.layer_cell_value(canvas.active_layer(), y, x) {
                        Some(v) => (v.cp, v.fg, v.bg),
                        None => (' ', 0, 0),
                    }
                }
            };
            if fg32 == 0 {
                fg32 = pal32[7];
            }
            if bg32 == 0 {
                bg32 = pal32[0];
            }
            let fg_i = match color32_to_index(pal16, fg32, MatchPolicy::Nearest) {
                core_palette::UNSET_INDEX => 7,
                i => i.min(15) as u8,
            };
            let bg_i = match color32_to_index(pal16, bg32, MatchPolicy::Nearest) {
                core_palette::UNSET_INDEX => 0,
                i => i.min(15) as u8,
            };

            let idx = (y * cols + x) as usize;
            ch[idx] = match font.and_then(|f| f.glyph_for_codepoint(cp)) {
                Some(gi) if gi < 256 => gi as u8,
                _ => cp437::unicode_to_byte_lossy(cp),
            };
            at[idx] = if options.nonblink {
                (bg_i & 0x0F) << 4 | (fg_i & 0x0F)
            } else {
                (bg_i & 0x07) << 4 | (fg_i & 0x0F)
            };
        }
    }

    if options.compress {
        for y in 0..rows as usize {
            let start = y * cols as usize;
            encode_row_rle(&ch[start..start + cols as usize], &at[start..start + cols as usize], &mut out);
        }
    } else {
        out.reserve(n * 2);
        for i in 0..n {
            out.push(ch[i]);
            out.push(at[i]);
        }
    }

    if options.write_sauce {
        let meta = canvas.sauce();
        let record = core_sauce::Record {
            present: true,
            title: meta.title.clone(),
            author: meta.author.clone(),
            group: meta.group.clone(),
            date: meta.date.clone(),
            file_size: out.len() as u32,
            data_type: core_sauce::DataType::XBin as u8,
            file_type: 0,
            tinfo1: cols.clamp(0, u16::MAX as i32) as u16,
            tinfo2: rows.clamp(0, u16::MAX as i32) as u16,
            tinfo3: meta.tinfo3,
            tinfo4: meta.tinfo4,
            comments_count: 0,
            tflags: meta.tflags,
            tinfos: meta.tinfos.clone(),
            comments: meta.comments.clone(),
        };
        out = core_sauce::append_to_bytes(&out, &record, &options.sauce_write_options)?;
    }

    debug!(
        target: "formats.xbin",
        cols,
        rows,
        bytes = out.len(),
        compressed = options.compress,
        "xbin_exported"
    );
    Ok(out)
}

pub fn export_file(path: &Path, canvas: &Canvas, options: &ExportOptions) -> Result<(), FormatError> {
    let bytes = export_bytes(canvas, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn canvas_ab_cd() -> Canvas {
        // 3x2: "AB " / "CD " with fg 7/9 and bg 0/4.
        let mut c = Canvas::new(3);
        c.set_rows(2).unwrap();
        let pal = default_palette32();
        let cells = [
            (0, 0, 'A', pal[7], 0),
            (0, 1, 'B', pal[9], 0),
            (1, 0, 'C', pal[7], pal[4]),
            (1, 1, 'D', pal[9], pal[4]),
        ];
        for (y, x, cp, fg, bg) in cells {
            c.set_layer_cell(0, y, x, CellWrite::colored(cp, fg, bg)).unwrap();
        }
        c
    }

    #[test]
    fn header_round_trips() {
        let c = canvas_ab_cd();
        let opts = ExportOptions { include_palette: false, compress: false, ..Default::default() };
        let bytes = export_bytes(&c, &opts).unwrap();
        let (hdr, off) = parse_header(&bytes).unwrap();
        assert_eq!(off, 11);
        assert_eq!(hdr.width, 3);
        assert_eq!(hdr.height, 2);
        assert!(hdr.nonblink);
        assert!(!hdr.has_palette);
        assert!(!hdr.compressed);
        assert!(!hdr.has_font);
    }

    #[test]
    fn raw_round_trip_preserves_glyphs_and_indices() {
        let c = canvas_ab_cd();
        let opts = ExportOptions { include_palette: false, compress: false, ..Default::default() };
        let bytes = export_bytes(&c, &opts).unwrap();
        let restored = import_bytes(&bytes, &ImportOptions::default()).unwrap();

        assert_eq!(restored.columns(), 3);
        assert_eq!(restored.rows(), 2);
        assert_eq!(restored.palette_ref(), PaletteRef::Builtin(BuiltinPalette::Xterm16));
        for (y, x, cp) in [(0, 0, 'A'), (0, 1, 'B'), (1, 0, 'C'), (1, 1, 'D')] {
            assert_eq!(restored.layer_cell(0, y, x), cp, "glyph at ({y},{x})");
        }
        let pal = default_palette32();
        let v = restored.layer_cell_value(0, 0, 1).unwrap();
        assert_eq!(v.fg, pal[9]);
        let v = restored.layer_cell_value(0, 1, 1).unwrap();
        assert_eq!(v.bg, pal[4]);
    }

    #[test]
    fn compressed_round_trip_matches_raw() {
        let mut c = Canvas::new(70);
        c.set_rows(3).unwrap();
        let pal = default_palette32();
        // Long runs exercise every RLE form.
        for x in 0..70 {
            c.set_layer_cell(0, 0, x, CellWrite::colored('\u{2588}', pal[7], 0)).unwrap();
            c.set_layer_cell(0, 1, x, CellWrite::colored('\u{2588}', pal[(x % 16) as usize], 0))
                .unwrap();
            c.set_layer_cell(
                0,
                2,
                x,
                CellWrite::colored(if x % 2 == 0 { '/' } else { '\\' }, pal[7], 0),
            )
            .unwrap();
        }
        let raw =
            export_bytes(&c, &ExportOptions { compress: false, ..Default::default() }).unwrap();
        let rle = export_bytes(&c, &ExportOptions { compress: true, ..Default::default() }).unwrap();
        assert!(rle.len() < raw.len());

        let a = import_bytes(&raw, &ImportOptions::default()).unwrap();
        let b = import_bytes(&rle, &ImportOptions::default()).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn embedded_font_glyph_indices_round_trip() {
        let mut c = Canvas::new(4);
        let font = EmbeddedBitmapFont {
            cell_w: 8,
            cell_h: 16,
            glyph_count: 256,
            vga_9col_dup: false,
            bitmap: vec![0xAA; 256 * 16],
        };
        c.set_embedded_font(Some(font.clone()));
        for (x, gi) in [(0i32, 3u16), (1, 200), (2, 255)] {
            let cp = font.codepoint_for_glyph(gi).unwrap();
            c.set_layer_cell(0, 0, x, CellWrite::glyph(cp)).unwrap();
        }

        let opts = ExportOptions { include_font: true, ..Default::default() };
        let bytes = export_bytes(&c, &opts).unwrap();
        let restored = import_bytes(&bytes, &ImportOptions::default()).unwrap();

        let rf = restored.embedded_font().unwrap();
        assert_eq!(rf.glyph_count, 256);
        assert_eq!(rf.bitmap, font.bitmap);
        for (x, gi) in [(0i32, 3u16), (1, 200), (2, 255)] {
            let cp = restored.layer_cell(0, 0, x);
            assert_eq!(rf.glyph_for_codepoint(cp), Some(gi));
        }
    }

    #[test]
    fn font_export_requires_embedded_font() {
        let c = Canvas::new(4);
        let opts = ExportOptions { include_font: true, ..Default::default() };
        assert!(matches!(export_bytes(&c, &opts), Err(FormatError::Unsupported(_))));
    }

    #[test]
    fn sauce_trailer_is_stripped_on_import() {
        let c = canvas_ab_cd();
        let opts = ExportOptions { write_sauce: true, ..Default::default() };
        let bytes = export_bytes(&c, &opts).unwrap();
        let parsed = core_sauce::parse_from_bytes(&bytes, true);
        assert!(parsed.record.present);
        assert_eq!(parsed.record.data_type, core_sauce::DataType::XBin as u8);
        assert_eq!(parsed.record.tinfo1, 3);
        assert_eq!(parsed.record.tinfo2, 2);

        let restored = import_bytes(&bytes, &ImportOptions::default()).unwrap();
        assert_eq!(restored.layer_cell(0, 0, 0), 'A');
        assert_eq!(restored.sauce().data_type, core_sauce::DataType::XBin as u8);
    }

    #[test]
    fn truncated_data_is_rejected() {
        let c = canvas_ab_cd();
        let bytes =
            export_bytes(&c, &ExportOptions { compress: false, ..Default::default() }).unwrap();
        assert!(matches!(
            import_bytes(&bytes[..bytes.len() - 3], &ImportOptions::default()),
            Err(FormatError::Malformed(_))
        ));
        assert!(matches!(import_bytes(b"BOGUS", &ImportOptions::default()), Err(FormatError::Malformed(_))));
    }

    #[test]
    fn rle_decoder_handles_all_run_types() {
        // Hand-build: width 8 row using all four run kinds.
        let mut payload = Vec::new();
        // type 3 (both), count 3: 'A' attr 7
        payload.push(0b1100_0010);
        payload.extend_from_slice(&[b'A', 0x07]);
        // type 1 (char run), count 2: 'B' attrs 1,2
        payload.push(0b0100_0001);
        payload.extend_from_slice(&[b'B', 0x01, 0x02]);
        // type 2 (attr run), count 2: attr 5, chars C D
        payload.push(0b1000_0001);
        payload.extend_from_slice(&[0x05, b'C', b'D']);
        // type 0 (raw), count 1
        payload.push(0b0000_0000);
        payload.extend_from_slice(&[b'E', 0x0F]);

        let mut ch = Vec::new();
        let mut at = Vec::new();
        let mut off = 0;
        decode_compressed_row(&payload, &mut off, 8, &mut ch, &mut at).unwrap();
        assert_eq!(ch, b"AAABBCDE".to_vec());
        assert_eq!(at, vec![7, 7, 7, 1, 2, 5, 5, 0x0F]);
        assert_eq!(off, payload.len());
    }
}
