//! FIGlet (.flf) import: render text with a FIGlet font into a canvas.

use crate::render::{self, Font, FontKind, RenderMode, RenderOptions};
use crate::FormatError;
use core_canvas::{Canvas, CellWrite, MAX_COLUMNS};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Text to render into the canvas.
    pub text: String,
    pub edit_mode: bool,
    pub outline_style: i32,
    /// FIGlet is usually monochrome, so this is typically unused.
    pub use_font_colors: bool,
    pub icecolors: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            text: "PHOSPHOR".to_string(),
            edit_mode: false,
            outline_style: 0,
            use_font_colors: false,
            icecolors: true,
        }
    }
}

pub(crate) fn render_options(edit_mode: bool, outline_style: i32, use_font_colors: bool, icecolors: bool)
-> RenderOptions {
    RenderOptions {
        mode: if edit_mode { RenderMode::Edit } else { RenderMode::Display },
        outline_style,
        use_font_colors,
        icecolors,
    }
}

/// Stamp a rendered bitmap into a fresh canvas sized to the content.
pub(crate) fn bitmap_to_canvas(bitmap: &render::CellBitmap) -> Result<Canvas, FormatError> {
    let cols = bitmap.w.clamp(1, MAX_COLUMNS);
    let mut canvas = Canvas::new(cols);
    if bitmap.h > 1 {
        canvas.set_rows(bitmap.h)?;
    }
    for y in 0..bitmap.h.min(canvas.rows()) {
        for x in 0..bitmap.w.min(cols) {
            let idx = (y * bitmap.w + x) as usize;
            let cp = bitmap.cp[idx];
            let (fg, bg) = (bitmap.fg[idx], bitmap.bg[idx]);
            if cp == ' ' && fg == 0 && bg == 0 {
                continue;
            }
            canvas.set_layer_cell(
                0,
                y,
                x,
                CellWrite {
                    cp: Some(cp),
                    fg: (fg != 0).then_some(fg),
                    bg: (bg != 0).then_some(bg),
                    attrs: None,
                },
            )?;
        }
    }
    canvas.set_caret(0, 0);
    Ok(canvas)
}

/// Load a FIGlet font from bytes and render `options.text` into a canvas.
pub fn import_bytes(bytes: &[u8], options: &ImportOptions) -> Result<Canvas, FormatError> {
    let fonts = render::load_fonts(bytes)?;
    let font: &Font = fonts
        .iter()
        .find(|f| f.meta().kind == FontKind::Figlet)
        .ok_or_else(|| FormatError::malformed("not a FIGlet font"))?;

    let opt = render_options(
        options.edit_mode,
        options.outline_style,
        options.use_font_colors,
        options.icecolors,
    );
    let bitmap = render::render_text(font, &options.text, &opt)?;
    debug!(target: "formats.figlet", w = bitmap.w, h = bitmap.h, "figlet_rendered");
    bitmap_to_canvas(&bitmap)
}

pub fn import_file(path: &Path, options: &ImportOptions) -> Result<Canvas, FormatError> {
    let bytes = std::fs::read(path)?;
    import_bytes(&bytes, options)
}
