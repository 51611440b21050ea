//! Selection rectangle, process-global clipboard, floating move.
//!
//! The clipboard is shared across all documents in the process; last writer
//! wins and readers must check presence. A floating move holds its payload
//! outside any layer until Commit writes it at the destination or Cancel
//! restores the source (for cut moves).

use crate::layer::{CellValue, CellWrite};
use crate::{Canvas, CanvasError};
use core_palette::Color32;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// An axis-aligned cell rectangle, `w`/`h` always positive when active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.w && y < self.y + self.h
    }
}

/// What a paste applies from the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasteMode {
    CharOnly,
    ColorOnly,
    #[default]
    Both,
}

/// Which source a selection copy reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Raw cells of one layer.
    #[default]
    Layer,
    /// Cells as seen through the compositor.
    Composite,
}

/// In-progress floating move of the selection.
#[derive(Debug, Clone)]
pub struct MoveState {
    /// Whether the source was cleared when the move began.
    pub cut: bool,
    pub src_x: i32,
    pub src_y: i32,
    pub w: i32,
    pub h: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    /// Grab offset inside the payload, clamped to the rectangle.
    pub grab_dx: i32,
    pub grab_dy: i32,
    pub(crate) cells: Vec<MoveCell>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MoveCell {
    cp: char,
    fg: Color32,
    bg: Color32,
}

impl Default for MoveCell {
    fn default() -> Self {
        Self { cp: ' ', fg: 0, bg: 0 }
    }
}

// -------------------------------------------------------------------------------------------------
// Process-global clipboard
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Clipboard {
    w: i32,
    h: i32,
    cp: Vec<char>,
    fg: Vec<Color32>,
    bg: Vec<Color32>,
}

impl Clipboard {
    fn has(&self) -> bool {
        if self.w <= 0 || self.h <= 0 {
            return false;
        }
        let n = self.w as usize * self.h as usize;
        self.cp.len() == n && self.fg.len() == n && self.bg.len() == n
    }
}

fn clipboard() -> &'static Mutex<Clipboard> {
    static CLIPBOARD: OnceLock<Mutex<Clipboard>> = OnceLock::new();
    CLIPBOARD.get_or_init(|| Mutex::new(Clipboard::default()))
}

/// Whether the process clipboard holds a well-formed scratch grid.
pub fn clipboard_has() -> bool {
    clipboard().lock().unwrap_or_else(|p| p.into_inner()).has()
}

/// `(w, h)` of the clipboard content, if present.
pub fn clipboard_size() -> Option<(i32, i32)> {
    let c = clipboard().lock().unwrap_or_else(|p| p.into_inner());
    c.has().then_some((c.w, c.h))
}

/// Drop the clipboard content (used by tests and the host on shutdown).
pub fn clipboard_reset() {
    *clipboard().lock().unwrap_or_else(|p| p.into_inner()) = Clipboard::default();
}

// -------------------------------------------------------------------------------------------------
// Selection
// -------------------------------------------------------------------------------------------------

impl Canvas {
    pub fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    pub fn selection_rect(&self) -> Option<Rect> {
        self.selection
    }

    /// Normalize two corners into a min/max rectangle, clamped to the
    /// column range; negative rows clamp to zero.
    pub fn set_selection_corners(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        self.ensure_document();
        if self.columns <= 0 {
            self.selection = None;
            return;
        }
        let x0 = x0.clamp(0, self.columns - 1);
        let x1 = x1.clamp(0, self.columns - 1);
        let y0 = y0.max(0);
        let y1 = y1.max(0);
        let (minx, maxx) = (x0.min(x1), x0.max(x1));
        let (miny, maxy) = (y0.min(y1), y0.max(y1));
        self.selection = Some(Rect { x: minx, y: miny, w: maxx - minx + 1, h: maxy - miny + 1 });
    }

    /// Clearing the selection also cancels any floating move state without
    /// restoring cells (host-driven cancel goes through
    /// [`Canvas::cancel_move_selection`]).
    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.move_state = None;
    }

    pub fn selection_contains(&self, x: i32, y: i32) -> bool {
        self.selection.map(|r| r.contains(x, y)).unwrap_or(false)
    }

    // ---------------------------------------------------------------------------------------------
    // Clipboard operations
    // ---------------------------------------------------------------------------------------------

    fn resolve_layer(&self, layer_index: Option<usize>) -> Result<usize, CanvasError> {
        let idx = layer_index.unwrap_or(self.active_layer);
        if idx >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(idx));
        }
        Ok(idx)
    }

    /// Copy the selection into the process clipboard. `Layer` mode reads
    /// one layer's translated cells (absent cells copy as transparent);
    /// `Composite` reads through the compositor.
    pub fn copy_selection(
        &mut self,
        mode: CopyMode,
        layer_index: Option<usize>,
    ) -> Result<(), CanvasError> {
        self.ensure_document();
        let sel = self.selection.ok_or(CanvasError::NoSelection)?;
        let layer_index = self.resolve_layer(layer_index)?;

        let n = sel.w as usize * sel.h as usize;
        let mut out = Clipboard {
            w: sel.w,
            h: sel.h,
            cp: vec![' '; n],
            fg: vec![0; n],
            bg: vec![0; n],
        };

        for j in 0..sel.h {
            for i in 0..sel.w {
                let x = sel.x + i;
                let y = sel.y + j;
                if x < 0 || x >= self.columns || y < 0 || y >= self.rows {
                    continue;
                }
                let slot = (j * sel.w + i) as usize;
                match mode {
                    CopyMode::Layer => {
                        if let Some(v) = self.layer_cell_value(layer_index, y, x) {
                            out.cp[slot] = v.cp;
                            out.fg[slot] = v.fg;
                            out.bg[slot] = v.bg;
                        }
                    }
                    CopyMode::Composite => {
                        let c = self.composite_cell(y, x);
                        out.cp[slot] = c.cp;
                        out.fg[slot] = c.fg;
                        out.bg[slot] = c.bg;
                    }
                }
            }
        }

        debug!(target: "canvas.select", w = sel.w, h = sel.h, ?mode, "selection_copied");
        *clipboard().lock().unwrap_or_else(|p| p.into_inner()) = out;
        Ok(())
    }

    /// Write the transparent cell across the selection, honoring
    /// transparency locks per cell. Returns whether anything changed.
    pub fn delete_selection(&mut self, layer_index: Option<usize>) -> Result<bool, CanvasError> {
        self.ensure_document();
        let sel = self.selection.ok_or(CanvasError::NoSelection)?;
        let layer_index = self.resolve_layer(layer_index)?;

        let mut did_anything = false;
        for j in 0..sel.h {
            for i in 0..sel.w {
                let x = sel.x + i;
                let y = sel.y + j;
                if x < 0 || x >= self.columns || y < 0 {
                    continue;
                }
                did_anything |= self.write_cell_raw(layer_index, y, x, &CellWrite::transparent());
            }
        }
        Ok(did_anything)
    }

    /// Copy, then delete.
    pub fn cut_selection(&mut self, layer_index: Option<usize>) -> Result<bool, CanvasError> {
        self.copy_selection(CopyMode::Layer, layer_index)?;
        self.delete_selection(layer_index)
    }

    /// Paste the clipboard with its top-left at `(x, y)` (clamped at zero).
    /// `transparent_spaces` skips source cells whose glyph is a space. The
    /// selection becomes the pasted rectangle.
    pub fn paste_clipboard(
        &mut self,
        x: i32,
        y: i32,
        layer_index: Option<usize>,
        mode: PasteMode,
        transparent_spaces: bool,
    ) -> Result<bool, CanvasError> {
        self.ensure_document();
        let layer_index = self.resolve_layer(layer_index)?;

        let src = {
            let c = clipboard().lock().unwrap_or_else(|p| p.into_inner());
            if !c.has() {
                return Err(CanvasError::ClipboardEmpty);
            }
            Clipboard { w: c.w, h: c.h, cp: c.cp.clone(), fg: c.fg.clone(), bg: c.bg.clone() }
        };

        let x = x.max(0);
        let y = y.max(0);
        let mut did_anything = false;

        for j in 0..src.h {
            for i in 0..src.w {
                let px = x + i;
                let py = y + j;
                if px < 0 || px >= self.columns || py < 0 {
                    continue;
                }
                let slot = (j * src.w + i) as usize;
                let cp = src.cp[slot];
                if transparent_spaces && cp == ' ' {
                    continue;
                }
                let write = match mode {
                    PasteMode::CharOnly => CellWrite::glyph(cp),
                    PasteMode::ColorOnly => CellWrite {
                        cp: None,
                        fg: Some(src.fg[slot]),
                        bg: Some(src.bg[slot]),
                        attrs: None,
                    },
                    PasteMode::Both => CellWrite {
                        cp: Some(cp),
                        fg: Some(src.fg[slot]),
                        bg: Some(src.bg[slot]),
                        attrs: None,
                    },
                };
                did_anything |= self.write_cell_raw(layer_index, py, px, &write);
            }
        }

        self.set_selection_corners(x, y, x + src.w - 1, y + src.h - 1);
        debug!(target: "canvas.select", x, y, w = src.w, h = src.h, "clipboard_pasted");
        Ok(did_anything)
    }

    // ---------------------------------------------------------------------------------------------
    // Floating move
    // ---------------------------------------------------------------------------------------------

    pub fn is_moving_selection(&self) -> bool {
        self.move_state.is_some()
    }

    pub fn move_state(&self) -> Option<&MoveState> {
        self.move_state.as_ref()
    }

    /// Start a floating move. The grab position must lie inside the current
    /// selection. A transparency-locked source layer forces `copy`: its
    /// alpha cannot change, so the source is never cleared.
    pub fn begin_move_selection(
        &mut self,
        grab_x: i32,
        grab_y: i32,
        copy: bool,
        layer_index: Option<usize>,
    ) -> Result<(), CanvasError> {
        self.ensure_document();
        let sel = self.selection.ok_or(CanvasError::NoSelection)?;
        if !sel.contains(grab_x, grab_y) {
            return Err(CanvasError::GrabOutsideSelection);
        }
        if self.move_state.is_some() {
            return Err(CanvasError::MoveActive);
        }
        let layer_index = self.resolve_layer(layer_index)?;

        let copy = copy || self.layers[layer_index].lock_transparency;

        let mut mv = MoveState {
            cut: !copy,
            src_x: sel.x,
            src_y: sel.y,
            w: sel.w,
            h: sel.h,
            dst_x: sel.x,
            dst_y: sel.y,
            grab_dx: (grab_x - sel.x).clamp(0, (sel.w - 1).max(0)),
            grab_dy: (grab_y - sel.y).clamp(0, (sel.h - 1).max(0)),
            cells: vec![MoveCell::default(); sel.w as usize * sel.h as usize],
        };

        for j in 0..sel.h {
            for i in 0..sel.w {
                let sx = sel.x + i;
                let sy = sel.y + j;
                if sx < 0 || sx >= self.columns || sy < 0 || sy >= self.rows {
                    continue;
                }
                if let Some(v) = self.layer_cell_value(layer_index, sy, sx) {
                    mv.cells[(j * sel.w + i) as usize] = MoveCell { cp: v.cp, fg: v.fg, bg: v.bg };
                }
            }
        }

        if mv.cut {
            for j in 0..sel.h {
                for i in 0..sel.w {
                    let sx = sel.x + i;
                    let sy = sel.y + j;
                    if sx < 0 || sx >= self.columns || sy < 0 {
                        continue;
                    }
                    self.write_cell_raw(layer_index, sy, sx, &CellWrite::transparent());
                }
            }
        }

        debug!(target: "canvas.select", cut = mv.cut, w = mv.w, h = mv.h, "move_begun");
        self.move_state = Some(mv);
        Ok(())
    }

    /// Track the cursor: the destination origin follows `(x, y)` minus the
    /// grab offset, clamped on X; the selection follows the destination.
    pub fn update_move_selection(&mut self, cursor_x: i32, cursor_y: i32) {
        let Some(mv) = self.move_state.as_mut() else {
            return;
        };
        let nx = cursor_x.max(0) - mv.grab_dx;
        let ny = cursor_y.max(0) - mv.grab_dy;
        mv.dst_x = nx.clamp(0, (self.columns - 1).max(0));
        mv.dst_y = ny.max(0);
        let (x, y, w, h) = (mv.dst_x, mv.dst_y, mv.w, mv.h);
        self.set_selection_corners(x, y, x + w - 1, y + h - 1);
    }

    /// Write the payload at the destination (transparency locks honored
    /// per cell), set the selection to the destination rectangle, end the
    /// move.
    pub fn commit_move_selection(&mut self, layer_index: Option<usize>) -> Result<bool, CanvasError> {
        self.ensure_document();
        if self.move_state.is_none() {
            return Err(CanvasError::NoMoveActive);
        }
        let layer_index = self.resolve_layer(layer_index)?;
        let Some(mv) = self.move_state.take() else {
            return Err(CanvasError::NoMoveActive);
        };

        let mut did_anything = false;
        for j in 0..mv.h {
            for i in 0..mv.w {
                let px = mv.dst_x + i;
                let py = mv.dst_y + j;
                if px < 0 || px >= self.columns || py < 0 {
                    continue;
                }
                let src = mv.cells[(j * mv.w + i) as usize];
                let write = CellWrite { cp: Some(src.cp), fg: Some(src.fg), bg: Some(src.bg), attrs: None };
                did_anything |= self.write_cell_raw(layer_index, py, px, &write);
            }
        }

        self.set_selection_corners(mv.dst_x, mv.dst_y, mv.dst_x + mv.w - 1, mv.dst_y + mv.h - 1);
        debug!(target: "canvas.select", x = mv.dst_x, y = mv.dst_y, "move_committed");
        Ok(did_anything)
    }

    /// Abort the move: cut moves restore the payload at the source origin;
    /// the selection returns to the source rectangle.
    pub fn cancel_move_selection(&mut self, layer_index: Option<usize>) -> Result<(), CanvasError> {
        self.ensure_document();
        if self.move_state.is_none() {
            return Err(CanvasError::NoMoveActive);
        }
        let layer_index = self.resolve_layer(layer_index)?;
        let Some(mv) = self.move_state.take() else {
            return Err(CanvasError::NoMoveActive);
        };

        if mv.cut {
            for j in 0..mv.h {
                for i in 0..mv.w {
                    let px = mv.src_x + i;
                    let py = mv.src_y + j;
                    if px < 0 || px >= self.columns || py < 0 {
                        continue;
                    }
                    let src = mv.cells[(j * mv.w + i) as usize];
                    let write =
                        CellWrite { cp: Some(src.cp), fg: Some(src.fg), bg: Some(src.bg), attrs: None };
                    self.write_cell_raw(layer_index, py, px, &write);
                }
            }
        }

        self.set_selection_corners(mv.src_x, mv.src_y, mv.src_x + mv.w - 1, mv.src_y + mv.h - 1);
        debug!(target: "canvas.select", cut = mv.cut, "move_cancelled");
        Ok(())
    }

    /// Peek one clipboard cell (used by the paste preview path).
    pub fn clipboard_cell(x: i32, y: i32) -> Option<CellValue> {
        let c = clipboard().lock().unwrap_or_else(|p| p.into_inner());
        if !c.has() || x < 0 || y < 0 || x >= c.w || y >= c.h {
            return None;
        }
        let idx = (y * c.w + x) as usize;
        Some(CellValue {
            cp: c.cp[idx],
            fg: c.fg[idx],
            bg: c.bg[idx],
            attrs: crate::Attrs::empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellWrite;
    use core_palette::pack_rgb;
    use std::sync::{Mutex as TestMutex, OnceLock as TestOnce};

    // The clipboard is process-global; serialize tests that touch it.
    fn clipboard_guard() -> std::sync::MutexGuard<'static, ()> {
        static GUARD: TestOnce<TestMutex<()>> = TestOnce::new();
        GUARD.get_or_init(|| TestMutex::new(())).lock().unwrap_or_else(|p| p.into_inner())
    }

    #[test]
    fn corners_normalize_clip_and_clear() {
        let mut c = Canvas::new(10);
        c.set_selection_corners(8, 5, 2, -3);
        assert_eq!(c.selection_rect(), Some(Rect { x: 2, y: 0, w: 7, h: 6 }));
        c.set_selection_corners(50, 0, 70, 0);
        assert_eq!(c.selection_rect(), Some(Rect { x: 9, y: 0, w: 1, h: 1 }));
        c.clear_selection();
        assert!(!c.has_selection());
    }

    #[test]
    fn cut_and_paste_across_layers() {
        let _guard = clipboard_guard();
        clipboard_reset();

        let red = pack_rgb(255, 0, 0);
        let mut c = Canvas::new(80);
        c.set_cell(0, 0, CellWrite { cp: Some('A'), fg: Some(red), bg: None, attrs: None });
        c.add_layer("two");
        c.set_selection_corners(0, 0, 0, 0);

        assert!(c.cut_selection(Some(0)).unwrap());
        assert_eq!(c.layer_cell(0, 0, 0), ' ');
        assert_eq!(clipboard_size(), Some((1, 1)));

        assert!(c.paste_clipboard(5, 5, Some(1), PasteMode::Both, false).unwrap());
        let v = c.layer_cell_value(1, 5, 5).unwrap();
        assert_eq!((v.cp, v.fg), ('A', red));
        let comp = c.composite_cell(5, 5);
        assert_eq!((comp.cp, comp.fg), ('A', red));
        assert_eq!(c.selection_rect(), Some(Rect { x: 5, y: 5, w: 1, h: 1 }));
    }

    #[test]
    fn transparent_spaces_paste_preserves_destination() {
        let _guard = clipboard_guard();
        clipboard_reset();

        let mut c = Canvas::new(20);
        // Source: "a b" (space in the middle).
        c.set_cell(0, 0, CellWrite::glyph('a'));
        c.set_cell(0, 2, CellWrite::glyph('b'));
        c.set_selection_corners(0, 0, 2, 0);
        c.copy_selection(CopyMode::Layer, None).unwrap();

        // Destination row 2 pre-filled with dots.
        for x in 0..3 {
            c.set_cell(2, 5 + x, CellWrite::glyph('.'));
        }
        c.paste_clipboard(5, 2, None, PasteMode::Both, true).unwrap();
        assert_eq!(c.layer_cell(0, 2, 5), 'a');
        assert_eq!(c.layer_cell(0, 2, 6), '.'); // space skipped
        assert_eq!(c.layer_cell(0, 2, 7), 'b');
    }

    #[test]
    fn composite_copy_reads_through_layers() {
        let _guard = clipboard_guard();
        clipboard_reset();

        let mut c = Canvas::new(10);
        c.set_cell(0, 0, CellWrite::glyph('x'));
        c.add_layer("top");
        c.set_cell(0, 1, CellWrite::glyph('y'));
        c.set_selection_corners(0, 0, 1, 0);
        c.copy_selection(CopyMode::Composite, None).unwrap();
        c.paste_clipboard(0, 3, Some(0), PasteMode::Both, false).unwrap();
        assert_eq!(c.layer_cell(0, 3, 0), 'x');
        assert_eq!(c.layer_cell(0, 3, 1), 'y');
    }

    #[test]
    fn floating_move_cut_commit() {
        let mut c = Canvas::new(40);
        for (i, ch) in "word".chars().enumerate() {
            c.set_cell(10, 10 + i as i32, CellWrite::glyph(ch));
        }
        c.set_selection_corners(10, 10, 13, 10);
        c.begin_move_selection(10, 10, false, None).unwrap();
        // Source cleared immediately for a cut move.
        assert_eq!(c.layer_cell(0, 10, 10), ' ');
        c.update_move_selection(14, 10);
        assert!(c.commit_move_selection(None).unwrap());
        let row: String = (14..18).map(|x| c.layer_cell(0, 10, x)).collect();
        assert_eq!(row, "word");
        assert_eq!(c.selection_rect(), Some(Rect { x: 14, y: 10, w: 4, h: 1 }));
        assert!(!c.is_moving_selection());
    }

    #[test]
    fn floating_move_cancel_restores_cut_source() {
        let mut c = Canvas::new(40);
        c.set_cell(0, 3, CellWrite::glyph('k'));
        c.set_selection_corners(3, 0, 3, 0);
        c.begin_move_selection(3, 0, false, None).unwrap();
        assert_eq!(c.layer_cell(0, 0, 3), ' ');
        c.update_move_selection(20, 5);
        c.cancel_move_selection(None).unwrap();
        assert_eq!(c.layer_cell(0, 0, 3), 'k');
        assert_eq!(c.selection_rect(), Some(Rect { x: 3, y: 0, w: 1, h: 1 }));
    }

    #[test]
    fn transparency_lock_forces_copy_move() {
        let mut c = Canvas::new(40);
        for (i, ch) in "lock".chars().enumerate() {
            c.set_cell(10, 10 + i as i32, CellWrite::glyph(ch));
        }
        // Opaque destination cells, so the locked layer accepts the commit.
        for x in 14..18 {
            c.set_cell(10, x, CellWrite::glyph('.'));
        }
        c.set_layer_transparency_locked(0, true).unwrap();
        c.set_selection_corners(10, 10, 13, 10);
        c.begin_move_selection(10, 10, false, None).unwrap();
        // Forced copy: source survives.
        assert_eq!(c.layer_cell(0, 10, 10), 'l');
        assert!(c.move_state().map(|m| !m.cut).unwrap());
        c.update_move_selection(14, 10);
        c.commit_move_selection(None).unwrap();
        let src: String = (10..14).map(|x| c.layer_cell(0, 10, x)).collect();
        assert_eq!(src, "lock");
        let dst: String = (14..18).map(|x| c.layer_cell(0, 10, x)).collect();
        assert_eq!(dst, "lock");
        assert_eq!(c.selection_rect(), Some(Rect { x: 14, y: 10, w: 4, h: 1 }));
    }

    #[test]
    fn locked_layer_rejects_moves_onto_transparent_cells() {
        let mut c = Canvas::new(40);
        c.set_cell(0, 0, CellWrite::glyph('q'));
        c.set_layer_transparency_locked(0, true).unwrap();
        c.set_selection_corners(0, 0, 0, 0);
        c.begin_move_selection(0, 0, false, None).unwrap();
        c.update_move_selection(5, 0);
        // Destination is transparent: the per-cell lock check skips it.
        assert!(!c.commit_move_selection(None).unwrap());
        assert_eq!(c.layer_cell(0, 0, 5), ' ');
        assert_eq!(c.layer_cell(0, 0, 0), 'q');
    }

    #[test]
    fn grab_outside_selection_is_rejected() {
        let mut c = Canvas::new(10);
        c.set_selection_corners(0, 0, 1, 1);
        assert_eq!(
            c.begin_move_selection(5, 5, false, None),
            Err(CanvasError::GrabOutsideSelection)
        );
    }

    #[test]
    fn move_spanning_frames_is_one_undo_step() {
        let mut c = Canvas::new(40);
        c.set_cell(0, 0, CellWrite::glyph('z'));
        let before = c.content_hash();

        c.begin_undo_capture();
        c.set_selection_corners(0, 0, 0, 0);
        c.begin_move_selection(0, 0, false, None).unwrap();
        c.update_move_selection(5, 0);
        c.commit_move_selection(None).unwrap();
        c.end_undo_capture();

        assert_eq!(c.layer_cell(0, 0, 5), 'z');
        assert!(c.undo());
        assert_eq!(c.content_hash(), before);
    }
}
