//! core-canvas: the layered cell-grid document engine.
//!
//! Owns the ordered layer stack (parallel codepoint/fg/bg/attrs planes),
//! cell-level mutation under the transparency-lock policy, the read-only
//! compositor, selection/clipboard/floating-move, the page-granular
//! undo/redo engine, per-frame input capture, the embedded bitmap font
//! binding and the persistent project-state model.
//!
//! The engine is single-threaded with respect to any one document; a
//! `Canvas` must not be shared across threads. The process-global clipboard
//! and palette registry are the only shared resources.

mod compositor;
mod font;
mod input;
mod layer;
mod project;
mod selection;
mod undo;

pub use compositor::CompositeCell;
pub use font::{EMBEDDED_GLYPH_BASE, EmbeddedBitmapFont, is_embedded_glyph_codepoint};
pub use input::{CursorState, FrameInput, Hotkeys, KeyEvents, Mods};
pub use layer::{Attrs, CellValue, CellWrite, Layer, is_transparent_cell};
pub use project::{
    PROJECT_VERSION, ProjectLayer, ProjectLayerMeta, ProjectPatch, ProjectPatchPage,
    ProjectSnapshot, ProjectState, ProjectUndoEntry,
};
pub use selection::{
    CopyMode, MoveState, PasteMode, Rect, clipboard_has, clipboard_reset, clipboard_size,
};
pub use undo::PAGE_ROWS;

use core_palette::{Color32, PaletteRef};
use layer::{CellValue as Cell, transparency_transition_allowed};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::{debug, trace};
use undo::UndoState;

/// Engine-wide column cap.
pub const MAX_COLUMNS: i32 = 4096;

/// Default column count for new documents.
pub const DEFAULT_COLUMNS: i32 = 80;

/// Default SAUCE font-name hint for new canvases.
pub const DEFAULT_FONT_NAME: &str = "IBM VGA";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("layer index {0} out of range")]
    InvalidLayer(usize),
    #[error("a document keeps at least one layer")]
    LastLayer,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("no selection")]
    NoSelection,
    #[error("clipboard is empty")]
    ClipboardEmpty,
    #[error("a floating move is already active")]
    MoveActive,
    #[error("no floating move is active")]
    NoMoveActive,
    #[error("grab position outside the selection")]
    GrabOutsideSelection,
    #[error("malformed project state: {0}")]
    MalformedProject(String),
}

/// The layered cell-grid document.
pub struct Canvas {
    pub(crate) columns: i32,
    pub(crate) rows: i32,
    pub(crate) layers: Vec<Layer>,
    pub(crate) active_layer: usize,
    pub(crate) caret_row: i32,
    pub(crate) caret_col: i32,
    pub(crate) selection: Option<Rect>,
    pub(crate) move_state: Option<MoveState>,
    pub(crate) palette: PaletteRef,
    pub(crate) embedded_font: Option<EmbeddedBitmapFont>,
    pub(crate) sauce: core_sauce::Record,
    /// Monotonic content version; 0 is reserved for "uninitialized".
    pub(crate) state_token: u64,
    /// Bumped on every visible-content change; dependent caches poll it.
    pub(crate) content_revision: u64,
    pub(crate) input: FrameInput,
    pub(crate) mirror_mode: bool,
    pub(crate) tool_running: bool,
    pub(crate) undo: UndoState,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS)
    }
}

impl Canvas {
    /// A fresh document: `columns` wide (clamped to the engine cap), one
    /// row, one empty layer named "Base".
    pub fn new(columns: i32) -> Self {
        let columns = columns.clamp(1, MAX_COLUMNS);
        let mut canvas = Self {
            columns,
            rows: 1,
            layers: vec![Layer::blank("Base", columns, 1)],
            active_layer: 0,
            caret_row: 0,
            caret_col: 0,
            selection: None,
            move_state: None,
            palette: PaletteRef::default(),
            embedded_font: None,
            sauce: core_sauce::Record::default(),
            state_token: 1,
            content_revision: 1,
            input: FrameInput::default(),
            mirror_mode: false,
            tool_running: false,
            undo: UndoState::default(),
        };
        canvas.sync_sauce_geometry();
        canvas
    }

    // ---------------------------------------------------------------------------------------------
    // Geometry and identity
    // ---------------------------------------------------------------------------------------------

    pub fn columns(&self) -> i32 {
        self.columns
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn state_token(&self) -> u64 {
        self.state_token
    }

    pub fn content_revision(&self) -> u64 {
        self.content_revision
    }

    pub fn palette_ref(&self) -> PaletteRef {
        self.palette
    }

    pub fn set_palette_ref(&mut self, palette: PaletteRef) {
        self.palette = palette;
    }

    pub fn sauce(&self) -> &core_sauce::Record {
        &self.sauce
    }

    /// Replace the SAUCE record and re-establish defaults and geometry sync.
    /// SAUCE is document metadata, not undoable content.
    pub fn set_sauce(&mut self, record: core_sauce::Record) {
        self.sauce = record;
        self.sync_sauce_geometry();
    }

    pub fn embedded_font(&self) -> Option<&EmbeddedBitmapFont> {
        self.embedded_font.as_ref()
    }

    pub fn set_embedded_font(&mut self, font: Option<EmbeddedBitmapFont>) {
        self.embedded_font = font.filter(EmbeddedBitmapFont::is_valid);
        self.touch_content();
    }

    pub fn input(&self) -> &FrameInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut FrameInput {
        &mut self.input
    }

    pub fn mirror_mode(&self) -> bool {
        self.mirror_mode
    }

    pub fn set_mirror_mode(&mut self, enabled: bool) {
        self.mirror_mode = enabled;
    }

    /// Marks a tool invocation in progress; mirror replication only applies
    /// while set.
    pub fn set_tool_running(&mut self, running: bool) {
        self.tool_running = running;
    }

    pub(crate) fn touch_content(&mut self) {
        self.content_revision = self.content_revision.wrapping_add(1).max(1);
    }

    pub(crate) fn bump_state_token(&mut self) {
        self.state_token = self.state_token.wrapping_add(1);
        if self.state_token == 0 {
            self.state_token = 1;
        }
    }

    /// Hash of the document content excluding the state token. Two
    /// documents with equal hash are content-identical (undo/redo
    /// round-trip checks rely on this).
    pub fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.columns.hash(&mut h);
        self.rows.hash(&mut h);
        self.active_layer.hash(&mut h);
        self.caret_row.hash(&mut h);
        self.caret_col.hash(&mut h);
        for layer in &self.layers {
            layer.name.hash(&mut h);
            layer.visible.hash(&mut h);
            layer.lock_transparency.hash(&mut h);
            layer.offset_x.hash(&mut h);
            layer.offset_y.hash(&mut h);
            layer.cells.hash(&mut h);
            layer.fg.hash(&mut h);
            layer.bg.hash(&mut h);
            for a in &layer.attrs {
                a.bits().hash(&mut h);
            }
        }
        h.finish()
    }

    // ---------------------------------------------------------------------------------------------
    // Document invariants
    // ---------------------------------------------------------------------------------------------

    /// Re-establish the structural invariants: positive geometry, at least
    /// one layer, planes sized `cols * rows`, active layer in range.
    pub(crate) fn ensure_document(&mut self) {
        if self.columns <= 0 {
            self.columns = DEFAULT_COLUMNS;
        }
        if self.rows <= 0 {
            self.rows = 1;
        }
        if self.layers.is_empty() {
            self.layers.push(Layer::blank("Base", self.columns, self.rows));
            self.active_layer = 0;
        }
        let need = self.columns as usize * self.rows as usize;
        for layer in &mut self.layers {
            if layer.cells.len() != need {
                layer.resize_planes(need);
            } else {
                layer.fg.resize(need, 0);
                layer.bg.resize(need, 0);
                layer.attrs.resize(need, Attrs::empty());
            }
        }
        if self.active_layer >= self.layers.len() {
            self.active_layer = self.layers.len() - 1;
        }
        self.sync_sauce_geometry();
    }

    /// Grow `rows` so that `rows >= rows_needed`. The only code site
    /// allowed to grow planes; reserves slack capacity (~12.5%, at least 64
    /// rows worth) so row-by-row growth during a paint drag amortizes.
    pub(crate) fn ensure_rows(&mut self, rows_needed: i32) {
        let rows_needed = rows_needed.max(1);
        self.ensure_document();
        if rows_needed <= self.rows {
            return;
        }

        self.prepare_undo_for_mutation();
        self.ensure_capture_patch();
        self.rows = rows_needed;
        let need = self.columns as usize * self.rows as usize;
        let row_chunk = self.columns.max(1) as usize * 64;
        for layer in &mut self.layers {
            if need > layer.cells.capacity() {
                let slack = row_chunk.max(need / 8);
                let want = need.saturating_add(slack);
                layer.cells.reserve(want - layer.cells.len());
                layer.fg.reserve(want - layer.fg.len());
                layer.bg.reserve(want - layer.bg.len());
                layer.attrs.reserve(want - layer.attrs.len());
            }
            layer.resize_planes(need);
        }
        self.sync_sauce_geometry();
    }

    /// Keep SAUCE metadata consistent with the document: sane
    /// data_type/file_type defaults, a creation date, a font-name hint, and
    /// tinfo1/tinfo2 mirroring cols/rows for character-based content.
    pub(crate) fn sync_sauce_geometry(&mut self) {
        let s = &mut self.sauce;
        if s.data_type == 0 {
            s.data_type = core_sauce::DataType::Character as u8;
        }
        if s.data_type == core_sauce::DataType::Character as u8 && s.file_type == 0 {
            s.file_type = 1; // ANSi
        }
        if s.date.is_empty() {
            s.date = core_sauce::today_yyyymmdd();
        }
        if s.tinfos.is_empty() {
            s.tinfos = DEFAULT_FONT_NAME.to_string();
        }
        if matches!(s.data_type, 0 | 1 | 6) {
            s.tinfo1 = self.columns.clamp(0, u16::MAX as i32) as u16;
            s.tinfo2 = self.rows.clamp(0, u16::MAX as i32) as u16;
        }
        if !s.present && (s.tinfo1 != 0 || s.tinfo2 != 0 || !s.date.is_empty() || !s.tinfos.is_empty())
        {
            s.present = true;
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Layer management
    // ---------------------------------------------------------------------------------------------

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn active_layer(&self) -> usize {
        self.active_layer
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn set_active_layer(&mut self, index: usize) -> Result<(), CanvasError> {
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        self.active_layer = index;
        Ok(())
    }

    /// Append a new empty layer sized to the document and make it active.
    /// An empty name becomes "Layer N".
    pub fn add_layer(&mut self, name: &str) -> usize {
        self.ensure_document();
        self.snapshot_for_structural_change();

        let name = if name.is_empty() {
            format!("Layer {}", self.layers.len() + 1)
        } else {
            name.to_string()
        };
        debug!(target: "canvas.layers", name = %name, count = self.layers.len() + 1, "layer_added");
        self.layers.push(Layer::blank(&name, self.columns, self.rows));
        self.active_layer = self.layers.len() - 1;
        self.active_layer
    }

    pub fn remove_layer(&mut self, index: usize) -> Result<(), CanvasError> {
        self.ensure_document();
        if self.layers.len() <= 1 {
            return Err(CanvasError::LastLayer);
        }
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        self.snapshot_for_structural_change();
        self.layers.remove(index);
        if self.active_layer >= self.layers.len() {
            self.active_layer = self.layers.len() - 1;
        }
        Ok(())
    }

    /// Stable reorder that keeps the same logical layer active.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<(), CanvasError> {
        self.ensure_document();
        let n = self.layers.len();
        if from >= n {
            return Err(CanvasError::InvalidLayer(from));
        }
        if to >= n {
            return Err(CanvasError::InvalidLayer(to));
        }
        if from == to {
            return Ok(());
        }
        self.snapshot_for_structural_change();

        let moving = self.layers.remove(from);
        self.layers.insert(to, moving);

        if self.active_layer == from {
            self.active_layer = to;
        } else if from < to {
            if self.active_layer > from && self.active_layer <= to {
                self.active_layer -= 1;
            }
        } else if self.active_layer >= to && self.active_layer < from {
            self.active_layer += 1;
        }
        Ok(())
    }

    pub fn move_layer_up(&mut self, index: usize) -> Result<(), CanvasError> {
        self.move_layer(index, index + 1)
    }

    pub fn move_layer_down(&mut self, index: usize) -> Result<(), CanvasError> {
        if index == 0 {
            return Err(CanvasError::InvalidLayer(index));
        }
        self.move_layer(index, index - 1)
    }

    pub fn set_layer_name(&mut self, index: usize, name: &str) -> Result<(), CanvasError> {
        self.ensure_document();
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        if self.layers[index].name == name {
            return Ok(());
        }
        self.snapshot_for_structural_change();
        self.layers[index].name = name.to_string();
        Ok(())
    }

    /// Visibility is a view toggle: content-revision bump only, no undo.
    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<(), CanvasError> {
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        if self.layers[index].visible != visible {
            self.layers[index].visible = visible;
            self.touch_content();
        }
        Ok(())
    }

    pub fn set_layer_transparency_locked(
        &mut self,
        index: usize,
        locked: bool,
    ) -> Result<(), CanvasError> {
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        self.layers[index].lock_transparency = locked;
        Ok(())
    }

    pub fn layer_offset(&self, index: usize) -> Option<(i32, i32)> {
        self.layers.get(index).map(|l| (l.offset_x, l.offset_y))
    }

    /// Offsets are arbitrary signed integers; restored by patch entries.
    pub fn set_layer_offset(&mut self, index: usize, x: i32, y: i32) -> Result<(), CanvasError> {
        self.ensure_document();
        if index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(index));
        }
        if self.layers[index].offset_x == x && self.layers[index].offset_y == y {
            return Ok(());
        }
        self.prepare_undo_for_mutation();
        self.ensure_capture_patch();
        self.layers[index].offset_x = x;
        self.layers[index].offset_y = y;
        Ok(())
    }

    pub fn nudge_layer_offset(&mut self, index: usize, dx: i32, dy: i32) -> Result<(), CanvasError> {
        let (x, y) = self.layer_offset(index).ok_or(CanvasError::InvalidLayer(index))?;
        self.set_layer_offset(index, x + dx, y + dy)
    }

    /// Structural changes invoked outside an active capture still become
    /// undoable through a direct snapshot push.
    fn snapshot_for_structural_change(&mut self) {
        if !self.is_undo_capture_active() {
            self.push_undo_snapshot();
        }
        self.prepare_undo_for_mutation();
        self.ensure_capture_snapshot();
    }

    // ---------------------------------------------------------------------------------------------
    // Coordinate translation
    // ---------------------------------------------------------------------------------------------

    /// Canvas position -> layer-local under the layer offset, for writes:
    /// negative results and out-of-range columns reject; rows may exceed
    /// the current height (the document grows on demand).
    pub(crate) fn canvas_to_layer_local_for_write(
        &self,
        layer_index: usize,
        canvas_row: i32,
        canvas_col: i32,
    ) -> Option<(i32, i32)> {
        let layer = self.layers.get(layer_index)?;
        if self.columns <= 0 {
            return None;
        }
        let lr = i64::from(canvas_row) - i64::from(layer.offset_y);
        let lc = i64::from(canvas_col) - i64::from(layer.offset_x);
        if lr < 0 || lc < 0 || lc >= i64::from(self.columns) {
            return None;
        }
        if lr > i64::from(i32::MAX) || lc > i64::from(i32::MAX) {
            return None;
        }
        Some((lr as i32, lc as i32))
    }

    /// Same as the write translation, additionally requiring the row to be
    /// inside the current height.
    pub(crate) fn canvas_to_layer_local_for_read(
        &self,
        layer_index: usize,
        canvas_row: i32,
        canvas_col: i32,
    ) -> Option<(i32, i32)> {
        let (lr, lc) = self.canvas_to_layer_local_for_write(layer_index, canvas_row, canvas_col)?;
        (lr < self.rows).then_some((lr, lc))
    }

    // ---------------------------------------------------------------------------------------------
    // Cell writes
    // ---------------------------------------------------------------------------------------------

    /// The one write path every mutation funnels through: translate,
    /// transparency-lock check, no-op skip, undo page capture, grow, write.
    /// Returns whether the cell actually changed.
    pub(crate) fn write_cell_raw(
        &mut self,
        layer_index: usize,
        canvas_row: i32,
        canvas_col: i32,
        write: &CellWrite,
    ) -> bool {
        let Some((lr, lc)) = self.canvas_to_layer_local_for_write(layer_index, canvas_row, canvas_col)
        else {
            return false;
        };
        let cols = self.columns as usize;
        let idx = lr as usize * cols + lc as usize;
        let in_bounds = lr < self.rows;

        let layer = &self.layers[layer_index];
        let old = if in_bounds { layer.value_at(idx) } else { Cell::empty() };
        let new = Cell {
            cp: write.cp.unwrap_or(old.cp),
            fg: write.fg.unwrap_or(old.fg),
            bg: write.bg.unwrap_or(old.bg),
            attrs: write.attrs.unwrap_or(old.attrs),
        };

        if !transparency_transition_allowed(layer.lock_transparency, &old, &new) {
            trace!(target: "canvas.cells", layer = layer_index, row = lr, col = lc, "lock_rejected");
            return false;
        }
        if in_bounds && old == new {
            return false; // undo-inert, no capture consumed
        }

        self.prepare_undo_for_mutation();
        self.ensure_capture_patch();
        self.capture_undo_page_if_needed(layer_index, lr);
        if lr >= self.rows {
            self.ensure_rows(lr + 1);
        }

        let idx = lr as usize * self.columns as usize + lc as usize;
        let layer = &mut self.layers[layer_index];
        if idx < layer.cells.len() {
            layer.cells[idx] = new.cp;
            layer.fg[idx] = new.fg;
            layer.bg[idx] = new.bg;
            layer.attrs[idx] = new.attrs;
        }
        true
    }

    /// Write to an explicit layer. The canvas column clamps into range;
    /// negative rows clamp to zero. During an active tool invocation with
    /// mirror mode on, the write replicates at the mirrored column (skipped
    /// when it coincides with the primary column on odd widths); the mirror
    /// write goes through the same checks and never recurses.
    pub fn set_layer_cell(
        &mut self,
        layer_index: usize,
        row: i32,
        col: i32,
        write: CellWrite,
    ) -> Result<bool, CanvasError> {
        self.ensure_document();
        if layer_index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(layer_index));
        }
        let row = row.max(0);
        let col = col.clamp(0, self.columns - 1);

        let wrote = self.write_cell_raw(layer_index, row, col, &write);

        if self.mirror_mode && self.tool_running && self.columns > 1 {
            let mirror_col = (self.columns - 1) - col;
            if mirror_col != col {
                let _ = self.write_cell_raw(layer_index, row, mirror_col, &write);
            }
        }
        Ok(wrote)
    }

    /// Write to the active layer.
    pub fn set_cell(&mut self, row: i32, col: i32, write: CellWrite) -> bool {
        let active = self.active_layer;
        self.set_layer_cell(active, row, col, write).unwrap_or(false)
    }

    /// Reset fg/bg/attrs of a cell, keeping the glyph.
    pub fn clear_cell_style(
        &mut self,
        layer_index: usize,
        row: i32,
        col: i32,
    ) -> Result<bool, CanvasError> {
        self.set_layer_cell(
            layer_index,
            row,
            col,
            CellWrite { cp: None, fg: Some(0), bg: Some(0), attrs: Some(Attrs::empty()) },
        )
    }

    // ---------------------------------------------------------------------------------------------
    // Cell reads
    // ---------------------------------------------------------------------------------------------

    /// Raw glyph at a canvas position on one layer; space outside bounds.
    pub fn layer_cell(&self, layer_index: usize, row: i32, col: i32) -> char {
        self.layer_cell_value(layer_index, row, col).map(|v| v.cp).unwrap_or(' ')
    }

    /// All four planes at a canvas position on one layer.
    pub fn layer_cell_value(&self, layer_index: usize, row: i32, col: i32) -> Option<CellValue> {
        let (lr, lc) = self.canvas_to_layer_local_for_read(layer_index, row, col)?;
        let layer = self.layers.get(layer_index)?;
        let idx = lr as usize * self.columns as usize + lc as usize;
        Some(layer.value_at(idx))
    }

    // ---------------------------------------------------------------------------------------------
    // Bulk layer content
    // ---------------------------------------------------------------------------------------------

    /// Overwrite every cell of a layer with `fill_cp` and cleared colors and
    /// attributes; transparency-locked cells that would flip are skipped.
    pub fn clear_layer(&mut self, layer_index: usize, fill_cp: char) -> Result<bool, CanvasError> {
        self.fill_layer_planes(layer_index, Some(fill_cp), Some(0), Some(0), Some(Attrs::empty()))
    }

    /// Fill only the provided planes across the whole layer.
    pub fn fill_layer(
        &mut self,
        layer_index: usize,
        cp: Option<char>,
        fg: Option<Color32>,
        bg: Option<Color32>,
    ) -> Result<bool, CanvasError> {
        self.fill_layer_planes(layer_index, cp, fg, bg, None)
    }

    fn fill_layer_planes(
        &mut self,
        layer_index: usize,
        cp: Option<char>,
        fg: Option<Color32>,
        bg: Option<Color32>,
        attrs: Option<Attrs>,
    ) -> Result<bool, CanvasError> {
        self.ensure_document();
        if layer_index >= self.layers.len() {
            return Err(CanvasError::InvalidLayer(layer_index));
        }
        let cols = self.columns.max(1);
        let n = self.layers[layer_index].cells.len();
        let mut did_anything = false;
        for idx in 0..n {
            let old = self.layers[layer_index].value_at(idx);
            let new = Cell {
                cp: cp.unwrap_or(old.cp),
                fg: fg.unwrap_or(old.fg),
                bg: bg.unwrap_or(old.bg),
                attrs: attrs.unwrap_or(old.attrs),
            };
            let lock = self.layers[layer_index].lock_transparency;
            if !transparency_transition_allowed(lock, &old, &new) || old == new {
                continue;
            }
            self.prepare_undo_for_mutation();
            self.ensure_capture_patch();
            self.capture_undo_page_if_needed(layer_index, (idx / cols as usize) as i32);
            let layer = &mut self.layers[layer_index];
            layer.cells[idx] = new.cp;
            layer.fg[idx] = new.fg;
            layer.bg[idx] = new.bg;
            layer.attrs[idx] = new.attrs;
            did_anything = true;
        }
        Ok(did_anything)
    }

    // ---------------------------------------------------------------------------------------------
    // Resizing
    // ---------------------------------------------------------------------------------------------

    /// Change the column count, preserving cells at `col < min(old, new)`.
    /// Clamps the caret, clamps or clears the selection, cancels a floating
    /// move, and records a snapshot undo entry.
    pub fn set_columns(&mut self, columns: i32) -> Result<(), CanvasError> {
        if columns <= 0 {
            return Err(CanvasError::InvalidGeometry(format!("columns must be positive, got {columns}")));
        }
        let columns = columns.min(MAX_COLUMNS);
        self.ensure_document();
        if columns == self.columns {
            return Ok(());
        }

        self.prepare_undo_for_mutation();
        self.ensure_capture_snapshot();
        let old_cols = self.columns as usize;
        let rows = self.rows as usize;
        self.columns = columns;
        let new_cols = columns as usize;

        for layer in &mut self.layers {
            let mut cells = vec![' '; rows * new_cols];
            let mut fg = vec![0; rows * new_cols];
            let mut bg = vec![0; rows * new_cols];
            let mut attrs = vec![Attrs::empty(); rows * new_cols];
            let copy = old_cols.min(new_cols);
            for r in 0..rows {
                let src = r * old_cols;
                let dst = r * new_cols;
                cells[dst..dst + copy].copy_from_slice(&layer.cells[src..src + copy]);
                fg[dst..dst + copy].copy_from_slice(&layer.fg[src..src + copy]);
                bg[dst..dst + copy].copy_from_slice(&layer.bg[src..src + copy]);
                attrs[dst..dst + copy].copy_from_slice(&layer.attrs[src..src + copy]);
            }
            layer.cells = cells;
            layer.fg = fg;
            layer.bg = bg;
            layer.attrs = attrs;
        }

        self.caret_col = self.caret_col.clamp(0, self.columns - 1);
        self.clamp_selection_after_resize();
        self.sync_sauce_geometry();
        debug!(target: "canvas.layers", columns, "columns_resized");
        Ok(())
    }

    /// Change the row count (grow pads with spaces, shrink truncates).
    /// Same clamping rules as [`Canvas::set_columns`].
    pub fn set_rows(&mut self, rows: i32) -> Result<(), CanvasError> {
        if rows <= 0 {
            return Err(CanvasError::InvalidGeometry(format!("rows must be positive, got {rows}")));
        }
        self.ensure_document();
        if rows == self.rows {
            return Ok(());
        }

        self.prepare_undo_for_mutation();
        self.ensure_capture_snapshot();
        self.rows = rows;
        let need = self.columns as usize * self.rows as usize;
        for layer in &mut self.layers {
            layer.resize_planes(need);
        }

        self.caret_row = self.caret_row.clamp(0, self.rows - 1);
        self.clamp_selection_after_resize();
        self.sync_sauce_geometry();
        debug!(target: "canvas.layers", rows, "rows_resized");
        Ok(())
    }

    fn clamp_selection_after_resize(&mut self) {
        if self.move_state.is_some() {
            // Remapping an in-flight payload across a resize is not worth
            // the complexity; the move and selection are dropped.
            self.move_state = None;
            self.selection = None;
            return;
        }
        if let Some(sel) = self.selection {
            let max_x = self.columns - 1;
            let max_y = self.rows - 1;
            if max_x < 0 || max_y < 0 {
                self.selection = None;
                return;
            }
            let x0 = sel.x.clamp(0, max_x);
            let y0 = sel.y.clamp(0, max_y);
            let x1 = (sel.x + sel.w - 1).clamp(0, max_x);
            let y1 = (sel.y + sel.h - 1).clamp(0, max_y);
            if x1 < x0 || y1 < y0 {
                self.selection = None;
            } else {
                self.set_selection_corners(x0, y0, x1, y1);
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Caret
    // ---------------------------------------------------------------------------------------------

    /// `(row, col)` of the caret.
    pub fn caret(&self) -> (i32, i32) {
        (self.caret_row, self.caret_col)
    }

    /// Move the caret: x clamps into `[0, cols)`, y clamps at zero and the
    /// document grows so the caret row exists.
    pub fn set_caret(&mut self, x: i32, y: i32) {
        self.ensure_document();
        self.caret_col = x.clamp(0, self.columns - 1);
        self.caret_row = y.max(0);
        self.ensure_rows(self.caret_row + 1);
    }

    // ---------------------------------------------------------------------------------------------
    // Plain-text load
    // ---------------------------------------------------------------------------------------------

    /// Replace the document content with decoded plain text: CRLF
    /// normalized, TAB mapped to space, other control codepoints dropped,
    /// lines wrapped at the column count. Records a snapshot undo entry.
    pub fn load_plain_text(&mut self, text: &str) {
        self.ensure_document();
        self.prepare_undo_for_mutation();
        self.ensure_capture_snapshot();

        self.rows = 1;
        let count = self.columns as usize;
        for layer in &mut self.layers {
            layer.cells = vec![' '; count];
            layer.fg = vec![0; count];
            layer.bg = vec![0; count];
            layer.attrs = vec![Attrs::empty(); count];
        }

        let mut row = 0;
        let mut col = 0;
        let mut last_was_cr = false;
        for cp in text.chars() {
            if cp == '\r' {
                last_was_cr = true;
                row += 1;
                col = 0;
                self.ensure_rows(row + 1);
                continue;
            }
            if cp == '\n' {
                if last_was_cr {
                    last_was_cr = false;
                    continue;
                }
                row += 1;
                col = 0;
                self.ensure_rows(row + 1);
                continue;
            }
            last_was_cr = false;

            let cp = if cp == '\t' { ' ' } else { cp };
            if (cp as u32) < 0x20 {
                continue;
            }

            self.set_cell(row, col, CellWrite::glyph(cp));
            col += 1;
            if col >= self.columns {
                row += 1;
                col = 0;
                self.ensure_rows(row + 1);
            }
        }

        self.caret_row = 0;
        self.caret_col = 0;
        self.sync_sauce_geometry();
    }
}
