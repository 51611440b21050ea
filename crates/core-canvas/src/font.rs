//! Embedded 1-bpp bitmap font binding.
//!
//! Some source formats (XBin in particular) carry their own glyph bitmaps.
//! The document addresses those glyphs through a private-use codepoint range
//! starting at [`EMBEDDED_GLYPH_BASE`]; every "is this a bitmap glyph?" test
//! goes through the helpers here.

use serde::{Deserialize, Serialize};

/// First codepoint of the embedded-glyph range (BMP private use area).
pub const EMBEDDED_GLYPH_BASE: u32 = 0xF000;

/// Upper bound on glyphs an embedded font may carry (XBin mode-512).
pub const EMBEDDED_GLYPH_MAX: u32 = 512;

/// A 1-bpp bitmap font attached to the document. Each glyph occupies
/// `cell_h` consecutive bytes in `bitmap`; bit 7 of each byte is the
/// leftmost pixel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedBitmapFont {
    pub cell_w: u8,
    pub cell_h: u8,
    pub glyph_count: u16,
    /// VGA 9-column text mode: column 7 duplicates into column 8 for glyph
    /// indices 192..=223 when `cell_w == 9`.
    pub vga_9col_dup: bool,
    pub bitmap: Vec<u8>,
}

impl EmbeddedBitmapFont {
    /// Structural validity: planes sized consistently and glyph count in range.
    pub fn is_valid(&self) -> bool {
        self.cell_w >= 1
            && self.cell_h >= 1
            && self.glyph_count >= 1
            && (self.glyph_count as u32) <= EMBEDDED_GLYPH_MAX
            && self.bitmap.len() >= self.glyph_count as usize * self.cell_h as usize
    }

    /// The `cell_h` bitmap rows of glyph `g`, or `None` when out of range.
    pub fn glyph_rows(&self, g: u16) -> Option<&[u8]> {
        if g >= self.glyph_count {
            return None;
        }
        let start = g as usize * self.cell_h as usize;
        self.bitmap.get(start..start + self.cell_h as usize)
    }

    /// Whether pixel `(x, y)` of glyph `g` is set, honoring the VGA
    /// ninth-column duplication rule.
    pub fn pixel(&self, g: u16, x: u8, y: u8) -> bool {
        if x >= self.cell_w || y >= self.cell_h {
            return false;
        }
        let Some(rows) = self.glyph_rows(g) else {
            return false;
        };
        let row = rows[y as usize];
        let col = if x == 8 && self.cell_w == 9 {
            if self.vga_9col_dup && (192..=223).contains(&g) { 7 } else { return false }
        } else {
            x
        };
        if col >= 8 {
            return false;
        }
        (row >> (7 - col)) & 1 != 0
    }

    /// Codepoint that addresses glyph `g` through the document planes.
    pub fn codepoint_for_glyph(&self, g: u16) -> Option<char> {
        if g >= self.glyph_count {
            return None;
        }
        char::from_u32(EMBEDDED_GLYPH_BASE + g as u32)
    }

    /// Glyph index for a codepoint inside this font's range.
    pub fn glyph_for_codepoint(&self, cp: char) -> Option<u16> {
        let v = cp as u32;
        if v < EMBEDDED_GLYPH_BASE {
            return None;
        }
        let g = v - EMBEDDED_GLYPH_BASE;
        (g < self.glyph_count as u32).then_some(g as u16)
    }
}

/// Whether a codepoint lies anywhere in the embedded-glyph range,
/// independent of a particular font's glyph count.
#[inline]
pub fn is_embedded_glyph_codepoint(cp: char) -> bool {
    let v = cp as u32;
    (EMBEDDED_GLYPH_BASE..EMBEDDED_GLYPH_BASE + EMBEDDED_GLYPH_MAX).contains(&v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font_8x2() -> EmbeddedBitmapFont {
        // Two glyphs, 2 rows each: glyph 0 = left half set, glyph 1 = all set.
        EmbeddedBitmapFont {
            cell_w: 8,
            cell_h: 2,
            glyph_count: 2,
            vga_9col_dup: false,
            bitmap: vec![0xF0, 0xF0, 0xFF, 0xFF],
        }
    }

    #[test]
    fn pixel_addressing_is_msb_first() {
        let f = font_8x2();
        assert!(f.pixel(0, 0, 0));
        assert!(f.pixel(0, 3, 1));
        assert!(!f.pixel(0, 4, 0));
        assert!(f.pixel(1, 7, 1));
        assert!(!f.pixel(1, 0, 2));
    }

    #[test]
    fn codepoint_round_trip() {
        let f = font_8x2();
        let cp = f.codepoint_for_glyph(1).unwrap();
        assert_eq!(f.glyph_for_codepoint(cp), Some(1));
        assert!(is_embedded_glyph_codepoint(cp));
        assert_eq!(f.glyph_for_codepoint('A'), None);
        assert!(f.codepoint_for_glyph(2).is_none());
    }

    #[test]
    fn ninth_column_duplicates_only_in_line_draw_range() {
        let mut f = EmbeddedBitmapFont {
            cell_w: 9,
            cell_h: 1,
            glyph_count: 256,
            vga_9col_dup: true,
            bitmap: vec![0b0000_0001; 256],
        };
        // Glyph 192 is in the duplication range: column 8 mirrors column 7.
        assert!(f.pixel(192, 8, 0));
        // Glyph 10 is not.
        assert!(!f.pixel(10, 8, 0));
        f.vga_9col_dup = false;
        assert!(!f.pixel(192, 8, 0));
    }
}
