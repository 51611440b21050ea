//! TheDraw (.tdf) import: pick a font from the bundle and render text.

use crate::FormatError;
use crate::figlet::{bitmap_to_canvas, render_options};
use crate::render::{self, FontMeta};
use core_canvas::Canvas;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Which font to use when the TDF is a bundle.
    pub bundle_index: usize,
    /// Text to render into the canvas.
    pub text: String,
    pub edit_mode: bool,
    pub outline_style: i32,
    /// Honor per-cell colors of Color-type fonts. When false, fg/bg stay
    /// unset so callers can stamp their own colors.
    pub use_font_colors: bool,
    /// Treat the blink bit as bright background (ICE colors).
    pub icecolors: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            bundle_index: 0,
            text: "PHOSPHOR".to_string(),
            edit_mode: false,
            outline_style: 0,
            use_font_colors: true,
            icecolors: true,
        }
    }
}

/// Metadata for every font in a bundle, for pickers.
pub fn bundle_fonts(bytes: &[u8]) -> Result<Vec<FontMeta>, FormatError> {
    Ok(render::load_fonts(bytes)?.iter().map(|f| f.meta()).collect())
}

/// Render `options.text` with the selected bundle font into a canvas.
pub fn import_bytes(bytes: &[u8], options: &ImportOptions) -> Result<Canvas, FormatError> {
    let fonts = render::load_fonts(bytes)?;
    let font = fonts.get(options.bundle_index).ok_or_else(|| {
        FormatError::malformed(format!(
            "TDF bundle index {} out of range ({} fonts)",
            options.bundle_index,
            fonts.len()
        ))
    })?;

    let opt = render_options(
        options.edit_mode,
        options.outline_style,
        options.use_font_colors,
        options.icecolors,
    );
    let bitmap = render::render_text(font, &options.text, &opt)?;
    debug!(
        target: "formats.tdf",
        font = %font.meta().name,
        w = bitmap.w,
        h = bitmap.h,
        "tdf_rendered"
    );
    bitmap_to_canvas(&bitmap)
}

pub fn import_file(path: &Path, options: &ImportOptions) -> Result<Canvas, FormatError> {
    let bytes = std::fs::read(path)?;
    import_bytes(&bytes, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TdfFontType;
    use core_palette::xterm256_color32;

    /// Two-font bundle: a Block font and a Color font, each defining '!'.
    fn two_font_bundle() -> Vec<u8> {
        let mut b: Vec<u8> = Vec::new();
        b.push(0x13);
        b.extend_from_slice(b"TheDraw FONTS file");
        b.push(0x1A);

        let mut push_font = |name: &[u8], font_type: u8, glyph: &[u8]| {
            b.extend_from_slice(&0xFF00_AA55u32.to_le_bytes());
            b.push(name.len() as u8);
            let mut padded = [0u8; 12];
            padded[..name.len()].copy_from_slice(name);
            b.extend_from_slice(&padded);
            b.extend_from_slice(&[0; 4]);
            b.push(font_type);
            b.push(1);
            b.extend_from_slice(&(glyph.len() as u16).to_le_bytes());
            let mut lookup = [0xFFFFu16; 94];
            lookup[0] = 0;
            for v in lookup {
                b.extend_from_slice(&v.to_le_bytes());
            }
            b.extend_from_slice(glyph);
        };

        push_font(b"BLOCKY", 1, &[1, 1, 0xB0, 0]);
        push_font(b"HUED", 2, &[1, 1, b'#', 0x17, 0]);
        b.push(0);
        b
    }

    #[test]
    fn bundle_lists_every_font() {
        let metas = bundle_fonts(&two_font_bundle()).unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].name, "BLOCKY");
        assert_eq!(metas[0].tdf_type, TdfFontType::Block);
        assert_eq!(metas[1].name, "HUED");
        assert_eq!(metas[1].tdf_type, TdfFontType::Color);
    }

    #[test]
    fn bundle_index_selects_the_font() {
        let bundle = two_font_bundle();
        let opts = ImportOptions { text: "!".to_string(), ..Default::default() };
        let canvas = import_bytes(&bundle, &opts).unwrap();
        assert_eq!(canvas.layer_cell(0, 0, 0), '\u{2591}'); // 0xB0 light shade

        let opts = ImportOptions { bundle_index: 1, text: "!".to_string(), ..Default::default() };
        let canvas = import_bytes(&bundle, &opts).unwrap();
        assert_eq!(canvas.layer_cell(0, 0, 0), '#');
        let v = canvas.layer_cell_value(0, 0, 0).unwrap();
        assert_eq!(v.fg, xterm256_color32(7));
        assert_eq!(v.bg, xterm256_color32(1));
    }

    #[test]
    fn out_of_range_bundle_index_errors() {
        let opts = ImportOptions { bundle_index: 5, ..Default::default() };
        assert!(import_bytes(&two_font_bundle(), &opts).is_err());
    }

    #[test]
    fn font_colors_can_be_suppressed() {
        let opts = ImportOptions {
            bundle_index: 1,
            text: "!".to_string(),
            use_font_colors: false,
            ..Default::default()
        };
        let canvas = import_bytes(&two_font_bundle(), &opts).unwrap();
        let v = canvas.layer_cell_value(0, 0, 0).unwrap();
        assert_eq!((v.fg, v.bg), (0, 0));
    }
}
