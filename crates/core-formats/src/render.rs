//! Text-mode art font backend: FIGlet (.flf) and TheDraw (.tdf) parsing
//! plus the text -> cell-grid render pipeline shared by both.
//!
//! Glyphs decode lazily into an intermediate part stream; rendering walks
//! the parts and either decodes placeholders (display mode) or emits them
//! raw (edit mode, used by the font editor surface).

use crate::FormatError;
use core_palette::{Color32, xterm256_color32};
use core_sauce::cp437;
use std::cell::OnceCell;
use tracing::debug;

/// 19 outline styles x 17 decoded glyphs for TheDraw outline fonts.
/// Placeholder bytes 'A'..='Q' index a row; styles outside the table fall
/// back to the CP437 mapping of the raw placeholder byte.
const OUTLINE_STYLES: [[char; 17]; 19] = [
    ['─', '─', '│', '│', '┌', '┐', '┌', '┐', '└', '┘', '└', '┘', '┤', '├', ' ', ' ', ' '],
    ['═', '─', '│', '│', '╒', '╕', '┌', '┐', '╘', '╛', '└', '┘', '╡', '├', ' ', ' ', ' '],
    ['─', '═', '│', '│', '┌', '┐', '╒', '╕', '└', '┘', '╘', '╛', '┤', '╞', ' ', ' ', ' '],
    ['═', '═', '│', '│', '╒', '╕', '╒', '╕', '╘', '╛', '╘', '╛', '╡', '╞', ' ', ' ', ' '],
    ['─', '─', '║', '│', '╓', '┐', '┌', '╖', '└', '╜', '╙', '┘', '╢', '├', ' ', ' ', ' '],
    ['═', '─', '║', '│', '╔', '╕', '┌', '╖', '╘', '╝', '╙', '┘', '╣', '├', ' ', ' ', ' '],
    ['─', '═', '║', '│', '╓', '┐', '╒', '╗', '└', '╜', '╚', '╛', '╢', '╞', ' ', ' ', ' '],
    ['═', '═', '║', '│', '╔', '╕', '╒', '╗', '╘', '╝', '╚', '╛', '╣', '╞', ' ', ' ', ' '],
    ['─', '─', '│', '║', '┌', '╖', '╓', '┐', '╙', '┘', '└', '╜', '┤', '╟', ' ', ' ', ' '],
    ['═', '─', '│', '║', '╒', '╗', '╓', '┐', '╚', '╛', '└', '╜', '╡', '╟', ' ', ' ', ' '],
    ['─', '═', '│', '║', '┌', '╖', '╔', '╕', '╙', '┘', '╘', '╝', '┤', '╠', ' ', ' ', ' '],
    ['═', '═', '│', '║', '╒', '╗', '╔', '╕', '╚', '╛', '╘', '╝', '╡', '╠', ' ', ' ', ' '],
    ['─', '─', '║', '║', '╓', '╖', '╓', '╖', '╙', '╜', '╙', '╜', '╢', '╟', ' ', ' ', ' '],
    ['═', '─', '║', '║', '╔', '╗', '╓', '╖', '╚', '╝', '╙', '╜', '╣', '╟', ' ', ' ', ' '],
    ['─', '═', '║', '║', '╓', '╖', '╔', '╗', '╙', '╜', '╚', '╝', '╢', '╠', ' ', ' ', ' '],
    ['═', '═', '║', '║', '╔', '╗', '╔', '╗', '╚', '╝', '╚', '╝', '╣', '╠', ' ', ' ', ' '],
    ['▄', '▄', '█', '█', '▄', '▄', '▄', '▄', '█', '█', '█', '█', '█', '█', ' ', ' ', ' '],
    ['▀', '▀', '█', '█', '█', '█', '█', '█', '▀', '▀', '▀', '▀', '█', '█', ' ', ' ', ' '],
    ['▀', '▄', '▐', '▌', '▐', '▌', '▄', '▄', '▀', '▀', '▐', '▌', '█', '█', ' ', ' ', ' '],
];

fn transform_outline(outline_style: i32, placeholder: u8) -> char {
    if placeholder > 64 && placeholder - 64 <= 17 {
        match usize::try_from(outline_style).ok().and_then(|s| OUTLINE_STYLES.get(s)) {
            Some(style) => style[(placeholder - 65) as usize],
            None => cp437::byte_to_unicode(placeholder),
        }
    } else {
        ' '
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Decode placeholders (hard blanks become spaces, outline bytes go
    /// through the style table).
    #[default]
    Display,
    /// Emit raw placeholder bytes for editing.
    Edit,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// 0..=18; out of range falls back to CP437 placeholder bytes.
    pub outline_style: i32,
    /// Emit per-cell colors from TDF Color glyph streams. When false,
    /// colors stay unset so callers can stamp their own.
    pub use_font_colors: bool,
    /// Treat the TDF blink bit as bright background (ICE colors).
    pub icecolors: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { mode: RenderMode::Display, outline_style: 0, use_font_colors: true, icecolors: true }
    }
}

/// A rendered cell grid. Colors are packed [`Color32`]; 0 means unset,
/// matching the canvas planes.
#[derive(Debug, Clone, Default)]
pub struct CellBitmap {
    pub w: i32,
    pub h: i32,
    pub cp: Vec<char>,
    pub fg: Vec<Color32>,
    pub bg: Vec<Color32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontKind {
    #[default]
    Figlet,
    Tdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TdfFontType {
    Outline,
    #[default]
    Block,
    Color,
}

#[derive(Debug, Clone, Default)]
pub struct FontMeta {
    pub kind: FontKind,
    pub name: String,
    /// Only meaningful when `kind == Tdf`.
    pub tdf_type: TdfFontType,
    /// TDF letter spacing; also the space-fallback width hint.
    pub spacing: i32,
}

// -------------------------------------------------------------------------------------------------
// Glyph intermediate representation
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlyphPart {
    NewLine,
    EndMarker,
    HardBlank,
    FillMarker,
    OutlineHole,
    OutlinePlaceholder(u8),
    Char(char),
    AnsiChar { ch: char, fg: u8, bg: u8, blink: bool },
}

#[derive(Debug, Clone, Default)]
struct Glyph {
    width: i32,
    height: i32,
    parts: Vec<GlyphPart>,
}

#[derive(Debug, Clone, Copy, Default)]
struct TmpCell {
    cp: char,
    fg: Color32,
    bg: Color32,
}

impl TmpCell {
    fn blank() -> Self {
        Self { cp: ' ', fg: 0, bg: 0 }
    }
}

fn render_glyph(g: &Glyph, opt: &RenderOptions) -> (Vec<TmpCell>, i32, i32) {
    let w = g.width.max(0);
    let h = g.height.max(0);
    if w == 0 || h == 0 {
        return (Vec::new(), 0, 0);
    }
    let mut out = vec![TmpCell::blank(); w as usize * h as usize];
    let mut x = 0i32;
    let mut y = 0i32;

    let put = |x: &mut i32, y: i32, cp: char, fg: Option<Color32>, bg: Option<Color32>,
               out: &mut Vec<TmpCell>| {
        if *x >= 0 && *x < w && y >= 0 && y < h {
            let idx = (y * w + *x) as usize;
            out[idx].cp = cp;
            if let Some(fg) = fg {
                out[idx].fg = fg;
            }
            if let Some(bg) = bg {
                out[idx].bg = bg;
            }
        }
        *x += 1;
    };

    for part in &g.parts {
        match *part {
            GlyphPart::NewLine => {
                y += 1;
                x = 0;
            }
            GlyphPart::EndMarker => {
                if opt.mode == RenderMode::Edit {
                    put(&mut x, y, '&', None, None, &mut out);
                }
            }
            GlyphPart::HardBlank => {
                let cp = if opt.mode == RenderMode::Edit { cp437::byte_to_unicode(0xFF) } else { ' ' };
                put(&mut x, y, cp, None, None, &mut out);
            }
            GlyphPart::FillMarker => {
                let cp = if opt.mode == RenderMode::Edit { '@' } else { ' ' };
                put(&mut x, y, cp, None, None, &mut out);
            }
            GlyphPart::OutlineHole => {
                let cp = if opt.mode == RenderMode::Edit { 'O' } else { ' ' };
                put(&mut x, y, cp, None, None, &mut out);
            }
            GlyphPart::OutlinePlaceholder(b) => {
                let cp = if opt.mode == RenderMode::Edit {
                    b as char
                } else {
                    transform_outline(opt.outline_style, b)
                };
                put(&mut x, y, cp, None, None, &mut out);
            }
            GlyphPart::Char(ch) => put(&mut x, y, ch, None, None, &mut out),
            GlyphPart::AnsiChar { ch, fg, bg, blink } => {
                if opt.use_font_colors {
                    let fg_idx = fg.min(15);
                    let mut bg_idx = bg.min(7);
                    if blink && opt.icecolors {
                        bg_idx = (bg_idx + 8).min(15);
                    }
                    put(
                        &mut x,
                        y,
                        ch,
                        Some(xterm256_color32(fg_idx)),
                        Some(xterm256_color32(bg_idx)),
                        &mut out,
                    );
                } else {
                    put(&mut x, y, ch, None, None, &mut out);
                }
            }
        }
        if y >= h {
            break;
        }
    }

    (out, w, h)
}

// -------------------------------------------------------------------------------------------------
// FIGlet
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FigletFont {
    name: String,
    hard_blank: char,
    height: i32,
    comments: Vec<String>,
    /// Glyph line text for codepoints 0..=255 (index = codepoint).
    glyph_lines: Vec<Option<Vec<String>>>,
    cache: Vec<OnceCell<Glyph>>,
    /// Average glyph width, used as the space fallback.
    avg_width: Option<i32>,
}

impl FigletFont {
    fn glyph(&self, ch: char) -> Option<&Glyph> {
        let idx = ch as u32;
        if idx > 255 {
            return None;
        }
        let lines = self.glyph_lines.get(idx as usize)?.as_ref()?;
        Some(self.cache[idx as usize].get_or_init(|| self.decode(lines)))
    }

    fn decode(&self, lines: &[String]) -> Glyph {
        let mut g = Glyph { width: 0, height: lines.len() as i32, parts: Vec::new() };
        for (row, line) in lines.iter().enumerate() {
            if row > 0 {
                g.parts.push(GlyphPart::NewLine);
            }
            let mut line_width = 0;
            for cp in line.chars() {
                if cp == self.hard_blank {
                    g.parts.push(GlyphPart::HardBlank);
                } else {
                    g.parts.push(GlyphPart::Char(cp));
                }
                line_width += 1;
            }
            g.width = g.width.max(line_width);
        }
        g
    }
}

/// Strip the trailing `@` markers of a FIGlet character line. The final
/// line of a glyph ends `@@`.
fn strip_figlet_markers(line: &str) -> Option<(&str, bool)> {
    if let Some(body) = line.strip_suffix("@@") {
        return Some((body, true));
    }
    if let Some(body) = line.strip_suffix('@') {
        return Some((body, false));
    }
    None
}

fn parse_figlet(bytes: &[u8]) -> Result<FigletFont, FormatError> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.lines();

    let header = lines.next().ok_or_else(|| FormatError::malformed("FIGlet: missing header"))?;
    if !header.starts_with("flf2a") {
        return Err(FormatError::malformed("FIGlet: not a flf2a header"));
    }
    let hard_blank = header.chars().nth(5).unwrap_or('$');

    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(FormatError::malformed("FIGlet: incomplete header"));
    }
    let height: i32 = fields[1]
        .parse()
        .ok()
        .filter(|h| *h > 0)
        .ok_or_else(|| FormatError::malformed("FIGlet: missing height in header"))?;
    let comment_count: usize = fields[5].parse().unwrap_or(0);

    let mut font = FigletFont {
        name: "figlet".to_string(),
        hard_blank,
        height,
        comments: Vec::new(),
        glyph_lines: vec![None; 256],
        cache: (0..256).map(|_| OnceCell::new()).collect(),
        avg_width: None,
    };

    for _ in 0..comment_count {
        match lines.next() {
            Some(line) => font.comments.push(line.to_string()),
            None => break,
        }
    }

    // Required ASCII glyphs 32..=126 plus a best-effort 127.
    let rest: Vec<&str> = lines.collect();
    let mut cursor = 0usize;
    let mut sum_width = 0i32;
    let mut count = 0i32;

    let read_glyph = |cursor: &mut usize| -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(height as usize);
        for _ in 0..height {
            let line = rest.get(*cursor)?;
            *cursor += 1;
            let (body, last) = strip_figlet_markers(line)?;
            out.push(body.to_string());
            if last {
                break;
            }
        }
        Some(out)
    };

    for ch in 32u32..=127 {
        let Some(glyph) = read_glyph(&mut cursor) else {
            if ch <= 126 && ch > 32 {
                // Incomplete required range; keep what decoded so far.
                debug!(target: "formats.figlet", last = ch - 1, "incomplete_glyph_range");
            }
            break;
        };
        let max_w = glyph.iter().map(|l| l.chars().count() as i32).max().unwrap_or(0);
        sum_width += max_w;
        count += 1;
        font.glyph_lines[ch as usize] = Some(glyph);
    }

    font.avg_width = (count > 0).then(|| sum_width / count);
    Ok(font)
}

// -------------------------------------------------------------------------------------------------
// TheDraw (.tdf)
// -------------------------------------------------------------------------------------------------

const TDF_FONT_INDICATOR: u32 = 0xFF00_AA55;
const TDF_INVALID_GLYPH: u16 = 0xFFFF;
const TDF_CHAR_TABLE_SIZE: usize = 94; // '!'..='~'
const TDF_ID: &[u8] = b"TheDraw FONTS file";

#[derive(Debug)]
struct TdfFont {
    name: String,
    font_type: TdfFontType,
    spacing: i32,
    glyph_block: Vec<u8>,
    lookup: [u16; TDF_CHAR_TABLE_SIZE],
    cache: Vec<OnceCell<Glyph>>,
}

fn tdf_index(ch: char) -> Option<usize> {
    let v = ch as u32;
    if !(0x21..=0x7E).contains(&v) {
        return None;
    }
    Some((v - 0x21) as usize)
}

impl TdfFont {
    fn glyph(&self, ch: char) -> Option<&Glyph> {
        let idx = tdf_index(ch)?;
        if self.lookup[idx] == TDF_INVALID_GLYPH {
            return None;
        }
        Some(self.cache[idx].get_or_init(|| self.decode(self.lookup[idx] as usize)))
    }

    fn decode(&self, off: usize) -> Glyph {
        let mut g = Glyph::default();
        let block = &self.glyph_block;
        if off + 2 > block.len() {
            return g;
        }
        g.width = block[off] as i32;
        g.height = block[off + 1] as i32;

        let mut p = off + 2;
        while p < block.len() {
            let chb = block[p];
            p += 1;
            match chb {
                0 => break,
                13 => {
                    g.parts.push(GlyphPart::NewLine);
                    continue;
                }
                b'&' => {
                    g.parts.push(GlyphPart::EndMarker);
                    continue;
                }
                _ => {}
            }

            match self.font_type {
                TdfFontType::Color => {
                    if p >= block.len() {
                        break;
                    }
                    let attr = block[p];
                    p += 1;
                    let fg = attr & 0x0F;
                    let bg = (attr >> 4) & 0x07;
                    let blink = attr & 0x80 != 0;
                    if chb == 0xFF {
                        g.parts.push(GlyphPart::HardBlank);
                    } else {
                        g.parts.push(GlyphPart::AnsiChar {
                            ch: cp437::byte_to_unicode(chb),
                            fg,
                            bg,
                            blink,
                        });
                    }
                }
                TdfFontType::Block => {
                    if chb == 0xFF {
                        g.parts.push(GlyphPart::HardBlank);
                    } else {
                        g.parts.push(GlyphPart::Char(cp437::byte_to_unicode(chb)));
                    }
                }
                TdfFontType::Outline => match chb {
                    b'@' => g.parts.push(GlyphPart::FillMarker),
                    b'O' => g.parts.push(GlyphPart::OutlineHole),
                    b'A'..=b'R' => g.parts.push(GlyphPart::OutlinePlaceholder(chb)),
                    b' ' => g.parts.push(GlyphPart::Char(' ')),
                    _ => g.parts.push(GlyphPart::Char(cp437::byte_to_unicode(chb))),
                },
            }
        }
        g
    }
}

fn read_u16_le(bytes: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*bytes.get(off)?, *bytes.get(off + 1)?]))
}

fn read_u32_le(bytes: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes([
        *bytes.get(off)?,
        *bytes.get(off + 1)?,
        *bytes.get(off + 2)?,
        *bytes.get(off + 3)?,
    ]))
}

fn parse_tdf_bundle(bytes: &[u8]) -> Result<Vec<TdfFont>, FormatError> {
    if bytes.len() < 20 {
        return Err(FormatError::malformed("TDF: file too short"));
    }
    let mut o = 0usize;
    if bytes[o] != 0x13 {
        return Err(FormatError::malformed("TDF: invalid header length"));
    }
    o += 1;
    if bytes.len() < o + TDF_ID.len() || &bytes[o..o + TDF_ID.len()] != TDF_ID {
        return Err(FormatError::malformed("TDF: header ID mismatch"));
    }
    o += TDF_ID.len();
    // Some variants include a NUL between the header string and CTRL-Z.
    if bytes.get(o) == Some(&0) {
        o += 1;
    }
    if bytes.get(o) != Some(&0x1A) {
        return Err(FormatError::malformed("TDF: missing CTRL-Z marker"));
    }
    o += 1;

    let sauce_pos = (bytes.len() >= 128
        && &bytes[bytes.len() - 128..bytes.len() - 121] == b"SAUCE00")
        .then(|| bytes.len() - 128);
    let all_zero_from =
        |start: usize| -> bool { bytes[start.min(bytes.len())..].iter().all(|&b| b == 0) };

    let mut fonts = Vec::new();
    while o < bytes.len() {
        if sauce_pos.is_some_and(|p| o == p || o + 1 == p) {
            break;
        }
        if bytes[o] == 0 {
            break; // bundle terminator
        }

        let indicator =
            read_u32_le(bytes, o).ok_or_else(|| FormatError::malformed("TDF: truncated data at indicator"))?;
        if indicator != TDF_FONT_INDICATOR {
            // Tolerate trailer-then-zero-padding variants once at least one
            // font decoded.
            if !fonts.is_empty() && (all_zero_from(o) || (o + 4 <= bytes.len() && all_zero_from(o + 4))) {
                break;
            }
            return Err(FormatError::malformed("TDF: font indicator mismatch"));
        }
        o += 4;

        let name_len_raw =
            *bytes.get(o).ok_or_else(|| FormatError::malformed("TDF: truncated data at name length"))? as usize;
        o += 1;
        if o + 12 > bytes.len() {
            return Err(FormatError::malformed("TDF: truncated data at name"));
        }
        let mut name_len = name_len_raw.min(12);
        if let Some(z) = bytes[o..o + name_len].iter().position(|&b| b == 0) {
            name_len = z;
        }
        let name = String::from_utf8_lossy(&bytes[o..o + name_len]).into_owned();
        o += 12;

        if o + 4 > bytes.len() {
            return Err(FormatError::malformed("TDF: truncated data at reserved bytes"));
        }
        o += 4;

        let type_b =
            *bytes.get(o).ok_or_else(|| FormatError::malformed("TDF: truncated data at font type"))?;
        o += 1;
        let font_type = match type_b {
            0 => TdfFontType::Outline,
            1 => TdfFontType::Block,
            2 => TdfFontType::Color,
            _ => return Err(FormatError::unsupported("TDF: unsupported font type")),
        };

        let spacing =
            *bytes.get(o).ok_or_else(|| FormatError::malformed("TDF: truncated data at spacing"))? as i32;
        o += 1;
        let block_size = read_u16_le(bytes, o)
            .ok_or_else(|| FormatError::malformed("TDF: truncated data at block size"))?
            as usize;
        o += 2;

        if o + TDF_CHAR_TABLE_SIZE * 2 > bytes.len() {
            return Err(FormatError::malformed("TDF: truncated data at char table"));
        }
        let mut lookup = [0u16; TDF_CHAR_TABLE_SIZE];
        for slot in lookup.iter_mut() {
            *slot = read_u16_le(bytes, o).unwrap_or(TDF_INVALID_GLYPH);
            o += 2;
        }

        if o + block_size > bytes.len() {
            return Err(FormatError::malformed("TDF: truncated data at glyph block"));
        }
        for &off16 in &lookup {
            if off16 != TDF_INVALID_GLYPH && off16 as usize >= block_size.max(1) {
                return Err(FormatError::malformed("TDF: glyph offset exceeds block size"));
            }
        }

        fonts.push(TdfFont {
            name: if name.is_empty() { "tdf".to_string() } else { name },
            font_type,
            spacing,
            glyph_block: bytes[o..o + block_size].to_vec(),
            lookup,
            cache: (0..TDF_CHAR_TABLE_SIZE).map(|_| OnceCell::new()).collect(),
        });
        o += block_size;
    }

    if fonts.is_empty() {
        return Err(FormatError::malformed("TDF: bundle contains no fonts"));
    }
    debug!(target: "formats.tdf", fonts = fonts.len(), "tdf_bundle_parsed");
    Ok(fonts)
}

// -------------------------------------------------------------------------------------------------
// Public font handle
// -------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum FontImpl {
    Figlet(FigletFont),
    Tdf(TdfFont),
}

/// A loaded text-mode art font.
#[derive(Debug)]
pub struct Font {
    inner: FontImpl,
}

impl Font {
    pub fn meta(&self) -> FontMeta {
        match &self.inner {
            FontImpl::Figlet(f) => FontMeta {
                kind: FontKind::Figlet,
                name: f.name.clone(),
                tdf_type: TdfFontType::default(),
                spacing: f.avg_width.unwrap_or(1),
            },
            FontImpl::Tdf(f) => FontMeta {
                kind: FontKind::Tdf,
                name: f.name.clone(),
                tdf_type: f.font_type,
                spacing: f.spacing,
            },
        }
    }

    fn glyph(&self, ch: char) -> Option<&Glyph> {
        match &self.inner {
            FontImpl::Figlet(f) => f.glyph(ch),
            FontImpl::Tdf(f) => f.glyph(ch),
        }
    }

    fn has_char(&self, ch: char) -> bool {
        self.glyph(ch).is_some()
    }

    fn space_fallback_width(&self) -> i32 {
        match &self.inner {
            FontImpl::Tdf(f) => f.spacing.max(1),
            FontImpl::Figlet(f) => f.avg_width.unwrap_or(1).max(1),
        }
    }

    /// Opposite-case fallback for ASCII letters (typical FIGlet/TDF usage).
    fn case_fallback(&self, ch: char) -> char {
        if ch.is_ascii_lowercase() {
            let up = ch.to_ascii_uppercase();
            if self.has_char(up) && !self.has_char(ch) {
                return up;
            }
        }
        if ch.is_ascii_uppercase() {
            let lo = ch.to_ascii_lowercase();
            if self.has_char(lo) && !self.has_char(ch) {
                return lo;
            }
        }
        ch
    }
}

/// Load a FIGlet font (exactly one) or a TDF bundle (one or more fonts),
/// detected by magic bytes.
pub fn load_fonts(bytes: &[u8]) -> Result<Vec<Font>, FormatError> {
    if bytes.len() >= 5 && &bytes[..5] == b"flf2a" {
        return Ok(vec![Font { inner: FontImpl::Figlet(parse_figlet(bytes)?) }]);
    }
    if bytes.len() >= 19 && bytes[0] == 0x13 && &bytes[1..19] == TDF_ID {
        return Ok(parse_tdf_bundle(bytes)?
            .into_iter()
            .map(|f| Font { inner: FontImpl::Tdf(f) })
            .collect());
    }
    Err(FormatError::malformed("not a FIGlet or TheDraw font"))
}

/// Render UTF-8 text to a tightly sized cell grid. Per input line, glyphs
/// compose horizontally; the line height is the max glyph height; lines
/// stack vertically.
pub fn render_text(font: &Font, text: &str, opt: &RenderOptions) -> Result<CellBitmap, FormatError> {
    let mut line_grids: Vec<(Vec<Vec<TmpCell>>, i32)> = Vec::new();

    for line_text in text.split('\n') {
        let line_text = line_text.trim_end_matches('\r');

        let mut line_h = 1;
        for ch in line_text.chars() {
            if let Some(g) = font.glyph(font.case_fallback(ch))
                && g.height > 0
            {
                line_h = line_h.max(g.height);
            }
        }

        let mut rows: Vec<Vec<TmpCell>> = vec![Vec::new(); line_h as usize];
        for ch in line_text.chars() {
            if ch == ' ' && !font.has_char(' ') {
                let sw = font.space_fallback_width();
                for row in rows.iter_mut() {
                    row.extend(std::iter::repeat_n(TmpCell::blank(), sw as usize));
                }
                continue;
            }

            let ch = font.case_fallback(ch);
            let glyph = match font.glyph(ch) {
                Some(g) if g.width > 0 && g.height > 0 => Some(g),
                _ => match font.glyph('?') {
                    Some(g) if g.width > 0 && g.height > 0 => Some(g),
                    _ => None,
                },
            };
            let Some(glyph) = glyph else {
                for row in rows.iter_mut() {
                    row.push(TmpCell::blank());
                }
                continue;
            };

            let (cells, gw, gh) = render_glyph(glyph, opt);
            if gw <= 0 || gh <= 0 {
                continue;
            }
            for (y, row) in rows.iter_mut().enumerate() {
                if (y as i32) < gh {
                    let src = &cells[y * gw as usize..(y + 1) * gw as usize];
                    row.extend_from_slice(src);
                } else {
                    row.extend(std::iter::repeat_n(TmpCell::blank(), gw as usize));
                }
            }
        }

        let w = rows.iter().map(|r| r.len()).max().unwrap_or(0) as i32;
        line_grids.push((rows, w));
    }

    let total_w = line_grids.iter().map(|(_, w)| *w).max().unwrap_or(0);
    let total_h: i32 = line_grids.iter().map(|(rows, _)| rows.len() as i32).sum();
    let mut out = CellBitmap {
        w: total_w,
        h: total_h,
        cp: vec![' '; (total_w * total_h).max(0) as usize],
        fg: vec![0; (total_w * total_h).max(0) as usize],
        bg: vec![0; (total_w * total_h).max(0) as usize],
    };

    let mut y = 0usize;
    for (rows, _) in &line_grids {
        for row in rows {
            for (x, cell) in row.iter().enumerate() {
                let idx = y * total_w as usize + x;
                out.cp[idx] = cell.cp;
                out.fg[idx] = cell.fg;
                out.bg[idx] = cell.bg;
            }
            y += 1;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Minimal two-glyph FIGlet font: 'A' and 'B', height 2, hard blank '$'.
    fn tiny_flf() -> Vec<u8> {
        let mut s = String::from("flf2a$ 2 1 8 0 1\nlittle test font\n");
        // Glyphs for codepoints 32..=126; make them all "##"/"##" except
        // space which uses hard blanks.
        for ch in 32u8..=126 {
            if ch == b' ' {
                s.push_str("$@\n$@@\n");
            } else {
                s.push_str(&format!("{}#@\n{}#@@\n", ch as char, ch as char));
            }
        }
        s.into_bytes()
    }

    #[test]
    fn figlet_parses_and_renders() {
        let fonts = load_fonts(&tiny_flf()).unwrap();
        assert_eq!(fonts.len(), 1);
        let bm = render_text(&fonts[0], "AB", &RenderOptions::default()).unwrap();
        assert_eq!((bm.w, bm.h), (4, 2));
        let row0: String = bm.cp[0..4].iter().collect();
        assert_eq!(row0, "A#B#");
    }

    #[test]
    fn figlet_hard_blanks_become_spaces_in_display_mode() {
        let fonts = load_fonts(&tiny_flf()).unwrap();
        let bm = render_text(&fonts[0], " ", &RenderOptions::default()).unwrap();
        assert_eq!((bm.w, bm.h), (1, 2));
        assert_eq!(bm.cp[0], ' ');

        let edit = RenderOptions { mode: RenderMode::Edit, ..RenderOptions::default() };
        let bm = render_text(&fonts[0], " ", &edit).unwrap();
        // Edit mode shows the CP437 0xFF placeholder (NBSP).
        assert_eq!(bm.cp[0], '\u{00A0}');
    }

    #[test]
    fn multiline_text_stacks_lines() {
        let fonts = load_fonts(&tiny_flf()).unwrap();
        let bm = render_text(&fonts[0], "A\nB", &RenderOptions::default()).unwrap();
        assert_eq!((bm.w, bm.h), (2, 4));
    }

    /// Build a single-font TDF bundle with one Color glyph for '!'.
    fn tiny_tdf(font_type: u8) -> Vec<u8> {
        let mut b: Vec<u8> = Vec::new();
        b.push(0x13);
        b.extend_from_slice(b"TheDraw FONTS file");
        b.push(0x1A);
        b.extend_from_slice(&0xFF00_AA55u32.to_le_bytes());
        b.push(4); // name length
        let mut name = [0u8; 12];
        name[..4].copy_from_slice(b"MINI");
        b.extend_from_slice(&name);
        b.extend_from_slice(&[0; 4]); // reserved
        b.push(font_type);
        b.push(2); // spacing

        // Glyph block: '!' -> width 2, height 1, two cells, terminator.
        let glyph: Vec<u8> = match font_type {
            2 => vec![2, 1, b'X', 0x4E, b'Y', 0x1F, 0],
            _ => vec![2, 1, 0xDB, 0xDB, 0],
        };
        b.extend_from_slice(&(glyph.len() as u16).to_le_bytes());
        let mut lookup = [0xFFFFu16; 94];
        lookup[0] = 0; // '!' at offset 0
        for v in lookup {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b.extend_from_slice(&glyph);
        b.push(0); // bundle terminator
        b
    }

    #[test]
    fn tdf_color_glyph_carries_colors() {
        let fonts = load_fonts(&tiny_tdf(2)).unwrap();
        assert_eq!(fonts.len(), 1);
        let meta = fonts[0].meta();
        assert_eq!(meta.kind, FontKind::Tdf);
        assert_eq!(meta.tdf_type, TdfFontType::Color);
        assert_eq!(meta.name, "MINI");

        let bm = render_text(&fonts[0], "!", &RenderOptions::default()).unwrap();
        assert_eq!((bm.w, bm.h), (2, 1));
        assert_eq!(bm.cp[0], 'X');
        // attr 0x4E: fg 14, bg 4.
        assert_eq!(bm.fg[0], xterm256_color32(14));
        assert_eq!(bm.bg[0], xterm256_color32(4));
        // attr 0x1F: fg 15, bg 1.
        assert_eq!(bm.fg[1], xterm256_color32(15));
        assert_eq!(bm.bg[1], xterm256_color32(1));
    }

    #[test]
    fn tdf_blink_bit_brightens_background_with_icecolors() {
        let mut bundle = tiny_tdf(2);
        // Patch the attr byte to set blink (0x4E -> 0xCE); rposition skips
        // the 'N' of the font name.
        let pos = bundle.iter().rposition(|&b| b == 0x4E).unwrap();
        bundle[pos] = 0xCE;
        let fonts = load_fonts(&bundle).unwrap();

        let bm = render_text(&fonts[0], "!", &RenderOptions::default()).unwrap();
        assert_eq!(bm.bg[0], xterm256_color32(12)); // 4 + 8

        let no_ice = RenderOptions { icecolors: false, ..RenderOptions::default() };
        let bm = render_text(&fonts[0], "!", &no_ice).unwrap();
        assert_eq!(bm.bg[0], xterm256_color32(4));
    }

    #[test]
    fn tdf_block_glyph_decodes_cp437() {
        let fonts = load_fonts(&tiny_tdf(1)).unwrap();
        let bm = render_text(&fonts[0], "!", &RenderOptions::default()).unwrap();
        assert_eq!(bm.cp[0], '\u{2588}'); // 0xDB full block
        assert_eq!(bm.fg[0], 0);
    }

    #[test]
    fn missing_glyphs_fall_back_to_question_mark() {
        let fonts = load_fonts(&tiny_flf()).unwrap();
        // U+00E9 has no glyph; '?' does.
        let bm = render_text(&fonts[0], "\u{00E9}", &RenderOptions::default()).unwrap();
        let row0: String = bm.cp[0..2].iter().collect();
        assert_eq!(row0, "?#");
    }

    #[test]
    fn outline_transform_uses_style_table() {
        assert_eq!(transform_outline(0, b'A'), '─');
        assert_eq!(transform_outline(18, b'C'), '▐');
        // Out-of-range style falls back to CP437 of the placeholder.
        assert_eq!(transform_outline(99, b'A'), 'A');
        // Non-placeholder bytes render as space.
        assert_eq!(transform_outline(0, b'z'), ' ');
    }

    #[test]
    fn unknown_magic_is_rejected() {
        assert!(load_fonts(b"garbage").is_err());
    }
}
