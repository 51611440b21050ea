//! Undo/redo: page-granular delta capture with snapshot fallback.
//!
//! A capture scope spans one or more frames (a mouse drag is a single undo
//! step). Inside a scope the engine accumulates exactly one entry:
//! - cell-level writes produce a *patch* entry holding only the modified
//!   64-row pages per layer,
//! - structural operations (layer add/remove/move/rename, resize, bulk
//!   loads) produce a full *snapshot* entry.
//! Once classified, an entry is never downgraded. Undo and redo are
//! symmetric: applying an entry first captures a same-shaped counterpart of
//! the current state onto the opposite stack.

use crate::layer::{Attrs, Layer};
use core_palette::Color32;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Rows per patch page (engine constant).
pub const PAGE_ROWS: i32 = 64;

/// Full-document pre-image.
#[derive(Debug, Clone)]
pub(crate) struct DocSnapshot {
    pub columns: i32,
    pub rows: i32,
    pub active_layer: usize,
    pub caret_row: i32,
    pub caret_col: i32,
    pub state_token: u64,
    pub layers: Vec<Layer>,
}

/// Per-layer metadata restored by patch entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatchLayerMeta {
    pub name: String,
    pub visible: bool,
    pub lock_transparency: bool,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl PatchLayerMeta {
    pub(crate) fn of(layer: &Layer) -> Self {
        Self {
            name: layer.name.clone(),
            visible: layer.visible,
            lock_transparency: layer.lock_transparency,
            offset_x: layer.offset_x,
            offset_y: layer.offset_y,
        }
    }
}

/// One captured 64-row strip of a layer's planes.
#[derive(Debug, Clone)]
pub(crate) struct PatchPage {
    pub layer: usize,
    pub page: i32,
    pub page_rows: i32,
    pub row_count: i32,
    pub cells: Vec<char>,
    pub fg: Vec<Color32>,
    pub bg: Vec<Color32>,
    pub attrs: Vec<Attrs>,
}

#[derive(Debug, Clone)]
pub(crate) struct DocPatch {
    pub columns: i32,
    pub rows: i32,
    pub active_layer: usize,
    pub caret_row: i32,
    pub caret_col: i32,
    pub state_token: u64,
    pub page_rows: i32,
    pub layers: Vec<PatchLayerMeta>,
    pub pages: Vec<PatchPage>,
}

#[derive(Debug, Clone)]
pub(crate) enum UndoEntry {
    Snapshot(DocSnapshot),
    Patch(DocPatch),
}

#[derive(Debug, Default)]
struct CaptureState {
    modified: bool,
    entry: Option<UndoEntry>,
    /// Pages already captured (or decided skippable) this scope, keyed by
    /// `(layer, page)`. Subsequent writes in a visited page are free.
    visited_pages: HashSet<(usize, i32)>,
}

#[derive(Debug, Default)]
pub(crate) struct UndoState {
    pub(crate) undo_stack: Vec<UndoEntry>,
    pub(crate) redo_stack: Vec<UndoEntry>,
    /// 0 = unlimited.
    pub(crate) limit: usize,
    capture: Option<CaptureState>,
    /// Set while an entry is being applied; mutation hooks become no-ops.
    pub(crate) applying: bool,
    external_depth: u32,
    external_bumped: bool,
}

impl UndoState {
    fn trim_to_limit(&mut self) {
        if self.limit == 0 {
            return;
        }
        if self.undo_stack.len() > self.limit {
            let excess = self.undo_stack.len() - self.limit;
            self.undo_stack.drain(..excess);
        }
        if self.redo_stack.len() > self.limit {
            let excess = self.redo_stack.len() - self.limit;
            self.redo_stack.drain(..excess);
        }
    }
}

impl crate::Canvas {
    // ---------------------------------------------------------------------------------------------
    // Capture scope
    // ---------------------------------------------------------------------------------------------

    /// Open a capture scope. Stores no entry until the first mutation.
    pub fn begin_undo_capture(&mut self) {
        if self.undo.applying {
            return;
        }
        self.undo.capture = Some(CaptureState::default());
    }

    /// Close the scope: push the captured entry (if any mutation happened)
    /// and clear redo; otherwise discard.
    pub fn end_undo_capture(&mut self) {
        let Some(capture) = self.undo.capture.take() else {
            return;
        };
        if capture.modified
            && let Some(entry) = capture.entry
        {
            let (kind, pages) = match &entry {
                UndoEntry::Snapshot(_) => ("snapshot", 0),
                UndoEntry::Patch(p) => ("patch", p.pages.len()),
            };
            debug!(
                target: "canvas.undo",
                kind,
                pages,
                depth = self.undo.undo_stack.len() + 1,
                "undo_entry_pushed"
            );
            self.undo.undo_stack.push(entry);
            self.undo.trim_to_limit();
            self.undo.redo_stack.clear();
        }
    }

    pub fn is_undo_capture_active(&self) -> bool {
        self.undo.capture.is_some()
    }

    /// Open a non-undoable external-mutation scope: while active (and no
    /// undo capture is open) the state token and content revision bump at
    /// most once, which keeps high-frequency script writes cheap.
    pub fn begin_external_mutation(&mut self) {
        if self.undo.external_depth == 0 {
            self.undo.external_bumped = false;
        }
        self.undo.external_depth += 1;
    }

    pub fn end_external_mutation(&mut self) {
        self.undo.external_depth = self.undo.external_depth.saturating_sub(1);
        if self.undo.external_depth == 0 {
            self.undo.external_bumped = false;
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Mutation hooks (called by every content mutation site)
    // ---------------------------------------------------------------------------------------------

    /// Bump the state token / content revision and mark the capture scope
    /// modified. Must run before the mutation itself.
    pub(crate) fn prepare_undo_for_mutation(&mut self) {
        if self.undo.applying {
            return;
        }

        if self.undo.capture.is_none() && self.undo.external_depth > 0 {
            if !self.undo.external_bumped {
                self.bump_state_token();
                self.touch_content();
                self.undo.external_bumped = true;
            }
            return;
        }

        self.bump_state_token();
        let Some(capture) = self.undo.capture.as_mut() else {
            self.touch_content();
            return;
        };
        capture.modified = true;
        self.touch_content();
    }

    /// Classify the scope's entry as a patch (cell-level deltas). A scope
    /// already holding a snapshot keeps it.
    pub(crate) fn ensure_capture_patch(&mut self) {
        let columns = self.columns;
        let rows = self.rows;
        let active_layer = self.active_layer;
        let caret_row = self.caret_row;
        let caret_col = self.caret_col;
        let state_token = self.state_token;
        let metas: Vec<PatchLayerMeta> = self.layers.iter().map(PatchLayerMeta::of).collect();

        let Some(capture) = self.undo.capture.as_mut() else {
            return;
        };
        if capture.entry.is_some() {
            return;
        }
        capture.entry = Some(UndoEntry::Patch(DocPatch {
            columns,
            rows,
            active_layer,
            caret_row,
            caret_col,
            state_token,
            page_rows: PAGE_ROWS,
            layers: metas,
            pages: Vec::new(),
        }));
        capture.visited_pages.clear();
    }

    /// Classify the scope's entry as a full snapshot (structural change).
    /// A scope that already started capturing deltas keeps the patch; a
    /// promotion would need the full pre-image, which is gone.
    pub(crate) fn ensure_capture_snapshot(&mut self) {
        if self.undo.capture.as_ref().is_none_or(|c| c.entry.is_some()) {
            return;
        }
        let snapshot = self.make_snapshot();
        if let Some(capture) = self.undo.capture.as_mut() {
            capture.entry = Some(UndoEntry::Snapshot(snapshot));
            capture.visited_pages.clear();
        }
    }

    /// Before modifying `row` on `layer_index`, copy that page's current
    /// planes into the patch entry unless it was already captured.
    pub(crate) fn capture_undo_page_if_needed(&mut self, layer_index: usize, row: i32) {
        let needs_entry = match self.undo.capture.as_ref() {
            None => return,
            Some(c) => c.entry.is_none(),
        };
        if needs_entry {
            // First mutation in the scope and it is cell-level.
            self.ensure_capture_patch();
        }
        let layers = &self.layers;
        let Some(capture) = self.undo.capture.as_mut() else {
            return;
        };
        let Some(UndoEntry::Patch(patch)) = capture.entry.as_mut() else {
            return;
        };
        if layer_index >= layers.len() {
            return;
        }

        let page_rows = if patch.page_rows > 0 { patch.page_rows } else { PAGE_ROWS };
        let page = row.max(0) / page_rows;
        let key = (layer_index, page);
        if !capture.visited_pages.insert(key) {
            return;
        }

        // Only rows that existed at the start of the capture carry data;
        // pages entirely beyond the old height still record their key (with
        // zero rows) so the redo counterpart captures what grew there.
        let start_row = page * page_rows;
        let row_count = if patch.columns <= 0 || start_row >= patch.rows {
            0
        } else {
            page_rows.min(patch.rows - start_row)
        };
        if row_count <= 0 {
            patch.pages.push(PatchPage {
                layer: layer_index,
                page,
                page_rows,
                row_count: 0,
                cells: Vec::new(),
                fg: Vec::new(),
                bg: Vec::new(),
                attrs: Vec::new(),
            });
            return;
        }

        let cols = patch.columns as usize;
        let layer = &layers[layer_index];
        let mut data = PatchPage {
            layer: layer_index,
            page,
            page_rows,
            row_count,
            cells: vec![' '; row_count as usize * cols],
            fg: vec![0; row_count as usize * cols],
            bg: vec![0; row_count as usize * cols],
            attrs: vec![Attrs::empty(); row_count as usize * cols],
        };
        copy_page_from_layer(&mut data, layer, start_row, cols);
        trace!(
            target: "canvas.undo",
            layer = layer_index,
            page,
            rows = row_count,
            "page_captured"
        );
        patch.pages.push(data);
    }

    // ---------------------------------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------------------------------

    pub(crate) fn make_snapshot(&self) -> DocSnapshot {
        DocSnapshot {
            columns: self.columns,
            rows: self.rows,
            active_layer: self.active_layer,
            caret_row: self.caret_row,
            caret_col: self.caret_col,
            state_token: self.state_token,
            layers: self.layers.clone(),
        }
    }

    pub(crate) fn apply_snapshot(&mut self, s: DocSnapshot) {
        self.undo.applying = true;

        self.columns = s.columns.clamp(1, crate::MAX_COLUMNS);
        self.rows = s.rows.max(1);
        self.layers = s.layers;
        self.active_layer = s.active_layer;
        self.caret_row = s.caret_row.max(0);
        self.caret_col = s.caret_col;
        self.state_token = if s.state_token != 0 { s.state_token } else { 1 };

        self.ensure_document();
        self.caret_col = self.caret_col.clamp(0, self.columns - 1);

        self.undo.applying = false;
        self.sync_sauce_geometry();
        self.touch_content();
    }

    /// Push a full snapshot directly (structural ops invoked outside an
    /// active capture stay undoable through this).
    pub fn push_undo_snapshot(&mut self) {
        if self.undo.applying {
            return;
        }
        let snap = self.make_snapshot();
        self.undo.undo_stack.push(UndoEntry::Snapshot(snap));
        self.undo.trim_to_limit();
        self.undo.redo_stack.clear();
    }

    // ---------------------------------------------------------------------------------------------
    // Undo / redo application
    // ---------------------------------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        !self.undo.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undo.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.undo.redo_stack.len()
    }

    pub fn undo(&mut self) -> bool {
        if self.undo.applying {
            return false;
        }
        let Some(prev) = self.undo.undo_stack.pop() else {
            return false;
        };
        let current = self.capture_counterpart(&prev);
        self.apply_entry(prev);
        self.undo.redo_stack.push(current);
        debug!(target: "canvas.undo", undo_depth = self.undo.undo_stack.len(), redo_depth = self.undo.redo_stack.len(), "undo_applied");
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.undo.applying {
            return false;
        }
        let Some(next) = self.undo.redo_stack.pop() else {
            return false;
        };
        let current = self.capture_counterpart(&next);
        self.undo.undo_stack.push(current);
        self.undo.trim_to_limit();
        self.apply_entry(next);
        debug!(target: "canvas.undo", undo_depth = self.undo.undo_stack.len(), redo_depth = self.undo.redo_stack.len(), "redo_applied");
        true
    }

    /// Capture the current state in the same shape as `entry`
    /// (snapshot<->snapshot, patch<->patch with the same page keys).
    fn capture_counterpart(&self, entry: &UndoEntry) -> UndoEntry {
        match entry {
            UndoEntry::Snapshot(_) => UndoEntry::Snapshot(self.make_snapshot()),
            UndoEntry::Patch(prev) => {
                let cols = self.columns.max(0) as usize;
                let mut cur = DocPatch {
                    columns: self.columns,
                    rows: self.rows,
                    active_layer: self.active_layer,
                    caret_row: self.caret_row,
                    caret_col: self.caret_col,
                    state_token: self.state_token,
                    page_rows: prev.page_rows,
                    layers: self.layers.iter().map(PatchLayerMeta::of).collect(),
                    pages: Vec::with_capacity(prev.pages.len()),
                };
                for pg in &prev.pages {
                    let start_row = pg.page * pg.page_rows;
                    // Size from the current document, not the prior capture:
                    // a page that grew during the gesture has zero rows in
                    // the pre-image but real content now.
                    let row_count = pg.page_rows.min((self.rows - start_row).max(0)).max(0);
                    let mut out = PatchPage {
                        layer: pg.layer,
                        page: pg.page,
                        page_rows: pg.page_rows,
                        row_count,
                        cells: vec![' '; row_count as usize * cols],
                        fg: vec![0; row_count as usize * cols],
                        bg: vec![0; row_count as usize * cols],
                        attrs: vec![Attrs::empty(); row_count as usize * cols],
                    };
                    if let Some(layer) = self.layers.get(pg.layer) {
                        copy_page_from_layer(&mut out, layer, start_row, cols);
                    }
                    cur.pages.push(out);
                }
                UndoEntry::Patch(cur)
            }
        }
    }

    fn apply_entry(&mut self, entry: UndoEntry) {
        match entry {
            UndoEntry::Snapshot(s) => self.apply_snapshot(s),
            UndoEntry::Patch(p) => self.apply_patch(p),
        }
    }

    pub(crate) fn apply_patch(&mut self, p: DocPatch) {
        self.undo.applying = true;

        if p.columns > 0 {
            self.columns = p.columns.min(crate::MAX_COLUMNS);
        }
        self.rows = p.rows.max(1);
        self.active_layer = p.active_layer;
        self.caret_row = p.caret_row;
        self.caret_col = p.caret_col;
        self.state_token = if p.state_token != 0 { p.state_token } else { 1 };

        // Restore layer metadata and count, then re-establish plane shapes.
        if self.layers.len() != p.layers.len() {
            self.layers.resize_with(p.layers.len(), || Layer::blank("", 0, 0));
        }
        for (layer, meta) in self.layers.iter_mut().zip(&p.layers) {
            layer.name = meta.name.clone();
            layer.visible = meta.visible;
            layer.lock_transparency = meta.lock_transparency;
            layer.offset_x = meta.offset_x;
            layer.offset_y = meta.offset_y;
        }
        self.ensure_document();

        // Overwrite the captured pages.
        let cols = self.columns.max(0) as usize;
        let rows = self.rows;
        for pg in &p.pages {
            let Some(layer) = self.layers.get_mut(pg.layer) else {
                continue;
            };
            let start_row = pg.page * pg.page_rows;
            if pg.row_count <= 0 || cols == 0 || start_row >= rows {
                continue;
            }
            let expected = pg.row_count as usize * cols;
            if pg.cells.len() != expected
                || pg.fg.len() != expected
                || pg.bg.len() != expected
                || pg.attrs.len() != expected
            {
                continue;
            }
            let max_rows = pg.row_count.min(rows - start_row);
            for r in 0..max_rows as usize {
                let src = r * cols;
                let dst = (start_row as usize + r) * cols;
                if dst + cols > layer.cells.len() {
                    break;
                }
                layer.cells[dst..dst + cols].copy_from_slice(&pg.cells[src..src + cols]);
                layer.fg[dst..dst + cols].copy_from_slice(&pg.fg[src..src + cols]);
                layer.bg[dst..dst + cols].copy_from_slice(&pg.bg[src..src + cols]);
                layer.attrs[dst..dst + cols].copy_from_slice(&pg.attrs[src..src + cols]);
            }
        }

        self.undo.applying = false;
        self.sync_sauce_geometry();
        self.touch_content();
    }

    // ---------------------------------------------------------------------------------------------
    // Limit
    // ---------------------------------------------------------------------------------------------

    /// Positive cap on retained entries (oldest dropped first), or 0 for
    /// unlimited.
    pub fn set_undo_limit(&mut self, limit: usize) {
        self.undo.limit = limit;
        self.undo.trim_to_limit();
    }

    pub fn undo_limit(&self) -> usize {
        self.undo.limit
    }
}

fn copy_page_from_layer(out: &mut PatchPage, layer: &Layer, start_row: i32, cols: usize) {
    for r in 0..out.row_count as usize {
        let src = (start_row as usize + r) * cols;
        let dst = r * cols;
        if src + cols > layer.cells.len() {
            break;
        }
        out.cells[dst..dst + cols].copy_from_slice(&layer.cells[src..src + cols]);
        out.fg[dst..dst + cols].copy_from_slice(&layer.fg[src..src + cols]);
        out.bg[dst..dst + cols].copy_from_slice(&layer.bg[src..src + cols]);
        out.attrs[dst..dst + cols].copy_from_slice(&layer.attrs[src..src + cols]);
    }
}
