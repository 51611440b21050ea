//! Read-only composition of the layer stack.
//!
//! Background and glyph resolve independently: the topmost visible non-zero
//! background wins, and the topmost visible non-space glyph supplies
//! codepoint, foreground and attributes. A space cell never contributes to
//! the foreground plane even when it carries attributes, so style-only
//! overlays cannot occlude glyphs from lower layers.

use crate::Canvas;
use crate::layer::Attrs;
use core_palette::Color32;

/// The observable cell at a canvas position. Field value `0` / space means
/// "no contribution" (paper shows through).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeCell {
    pub cp: char,
    pub fg: Color32,
    pub bg: Color32,
    pub attrs: Attrs,
}

impl Default for CompositeCell {
    fn default() -> Self {
        Self { cp: ' ', fg: 0, bg: 0, attrs: Attrs::empty() }
    }
}

impl Canvas {
    /// Composite the visible cell at `(row, col)`. Positions outside the
    /// document bounds are transparent.
    pub fn composite_cell(&self, row: i32, col: i32) -> CompositeCell {
        let mut out = CompositeCell::default();
        if self.columns <= 0 || self.rows <= 0 || self.layers.is_empty() {
            return out;
        }
        if row < 0 || row >= self.rows || col < 0 || col >= self.columns {
            return out;
        }

        let cols = self.columns as usize;

        for (i, layer) in self.layers.iter().enumerate().rev() {
            if !layer.visible {
                continue;
            }
            let Some((lr, lc)) = self.canvas_to_layer_local_for_read(i, row, col) else {
                continue;
            };
            let idx = lr as usize * cols + lc as usize;
            let bg = layer.bg.get(idx).copied().unwrap_or(0);
            if bg != 0 {
                out.bg = bg;
                break;
            }
        }

        for (i, layer) in self.layers.iter().enumerate().rev() {
            if !layer.visible {
                continue;
            }
            let Some((lr, lc)) = self.canvas_to_layer_local_for_read(i, row, col) else {
                continue;
            };
            let idx = lr as usize * cols + lc as usize;
            let cp = layer.cells.get(idx).copied().unwrap_or(' ');
            if cp == ' ' {
                continue;
            }
            out.cp = cp;
            out.fg = layer.fg.get(idx).copied().unwrap_or(0);
            out.attrs = layer.attrs.get(idx).copied().unwrap_or_default();
            break;
        }

        out
    }

    /// Bounds-checked composite read: `None` outside the document.
    pub fn composite_cell_checked(&self, row: i32, col: i32) -> Option<CompositeCell> {
        if row < 0 || row >= self.rows || col < 0 || col >= self.columns {
            return None;
        }
        Some(self.composite_cell(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellWrite;
    use pretty_assertions::assert_eq;

    #[test]
    fn topmost_non_space_glyph_wins() {
        let mut c = Canvas::new(10);
        c.set_cell(0, 0, CellWrite::colored('a', 1, 0));
        c.add_layer("top");
        c.set_cell(0, 0, CellWrite::colored('b', 2, 0));
        let cell = c.composite_cell(0, 0);
        assert_eq!((cell.cp, cell.fg), ('b', 2));
    }

    #[test]
    fn background_resolves_independently_of_glyph() {
        let mut c = Canvas::new(10);
        // Bottom layer: glyph with no background.
        c.set_cell(0, 0, CellWrite::colored('g', 5, 0));
        // Top layer: background fill only (space glyph).
        c.add_layer("wash");
        c.set_cell(0, 0, CellWrite { cp: None, fg: None, bg: Some(9), attrs: None });
        let cell = c.composite_cell(0, 0);
        assert_eq!(cell.cp, 'g');
        assert_eq!(cell.fg, 5);
        assert_eq!(cell.bg, 9);
    }

    #[test]
    fn space_with_attrs_never_contributes_foreground() {
        let mut c = Canvas::new(10);
        c.set_cell(0, 0, CellWrite::colored('x', 3, 0));
        c.add_layer("style-overlay");
        c.set_layer_cell(
            1,
            0,
            0,
            CellWrite { cp: Some(' '), fg: None, bg: None, attrs: Some(Attrs::UNDERLINE) },
        )
        .unwrap();
        let cell = c.composite_cell(0, 0);
        assert_eq!(cell.cp, 'x');
        assert_eq!(cell.attrs, Attrs::empty());
    }

    #[test]
    fn hidden_layers_do_not_contribute() {
        let mut c = Canvas::new(10);
        c.set_cell(0, 0, CellWrite::glyph('u'));
        c.add_layer("top");
        c.set_cell(0, 0, CellWrite::glyph('v'));
        c.set_layer_visible(1, false).unwrap();
        assert_eq!(c.composite_cell(0, 0).cp, 'u');
    }

    #[test]
    fn layer_offsets_translate_composition() {
        let mut c = Canvas::new(10);
        c.add_layer("shifted");
        c.set_layer_cell(1, 0, 3, CellWrite::glyph('s')).unwrap();
        c.set_layer_offset(1, 2, 0).unwrap();
        // The cell written at canvas col 3 now composites at col 5.
        assert_eq!(c.composite_cell(0, 5).cp, 's');
        assert_eq!(c.composite_cell(0, 3).cp, ' ');
    }

    #[test]
    fn raising_a_layer_cannot_reveal_lower_glyphs() {
        // Monotone in layer order: after moving a layer up, every cell that
        // previously composited from the moved layer or above still shows a
        // non-space glyph; nothing previously hidden from below appears.
        let mut c = Canvas::new(10);
        for x in 0..10 {
            c.set_cell(0, x, CellWrite::glyph('l'));
        }
        c.add_layer("mid");
        for x in 0..5 {
            c.set_cell(0, x, CellWrite::glyph('m'));
        }
        let before: Vec<char> = (0..10).map(|x| c.composite_cell(0, x).cp).collect();
        c.move_layer(0, 1).unwrap();
        let after: Vec<char> = (0..10).map(|x| c.composite_cell(0, x).cp).collect();
        for (b, a) in before.iter().zip(&after) {
            assert_ne!(*b, ' ');
            assert_ne!(*a, ' ');
        }
        // The lower layer now sits on top and wins everywhere it is opaque.
        assert_eq!(after, vec!['l'; 10]);
    }

    #[test]
    fn out_of_bounds_reads_are_transparent() {
        let c = Canvas::new(10);
        assert_eq!(c.composite_cell(-1, 0), CompositeCell::default());
        assert_eq!(c.composite_cell(0, 10), CompositeCell::default());
        assert!(c.composite_cell_checked(0, 10).is_none());
        assert!(c.composite_cell_checked(0, 9).is_some());
    }
}
