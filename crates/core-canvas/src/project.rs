//! Persistent project-state model.
//!
//! A self-describing record: schema version, palette identity, SAUCE
//! metadata, the current snapshot, the undo limit and both undo stacks.
//! Codepoint planes serialize as strings (one char per cell); attribute
//! planes default to zero when absent so older saves stay loadable. State
//! tokens are runtime-only and are re-assigned on load.

use crate::layer::{Attrs, Layer};
use crate::undo::{DocPatch, DocSnapshot, PatchLayerMeta, PatchPage, UndoEntry};
use crate::{Canvas, CanvasError, EmbeddedBitmapFont, FrameInput, MAX_COLUMNS};
use core_palette::PaletteRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current project schema version.
pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLayer {
    pub name: String,
    pub visible: bool,
    pub lock_transparency: bool,
    pub offset_x: i32,
    pub offset_y: i32,
    /// One char per cell, row-major.
    pub cells: String,
    pub fg: Vec<u32>,
    pub bg: Vec<u32>,
    #[serde(default)]
    pub attrs: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub columns: i32,
    pub rows: i32,
    pub active_layer: usize,
    pub caret_row: i32,
    pub caret_col: i32,
    pub layers: Vec<ProjectLayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLayerMeta {
    pub name: String,
    pub visible: bool,
    pub lock_transparency: bool,
    pub offset_x: i32,
    pub offset_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPatchPage {
    pub layer: usize,
    pub page: i32,
    pub page_rows: i32,
    pub row_count: i32,
    pub cells: String,
    pub fg: Vec<u32>,
    pub bg: Vec<u32>,
    #[serde(default)]
    pub attrs: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub columns: i32,
    pub rows: i32,
    pub active_layer: usize,
    pub caret_row: i32,
    pub caret_col: i32,
    pub page_rows: i32,
    pub layers: Vec<ProjectLayerMeta>,
    pub pages: Vec<ProjectPatchPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectUndoEntry {
    Snapshot { snapshot: ProjectSnapshot },
    Patch { patch: ProjectPatch },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub version: u32,
    pub palette: PaletteRef,
    pub sauce: core_sauce::Record,
    /// 0 = unlimited.
    pub undo_limit: usize,
    pub current: ProjectSnapshot,
    #[serde(default)]
    pub undo: Vec<ProjectUndoEntry>,
    #[serde(default)]
    pub redo: Vec<ProjectUndoEntry>,
    #[serde(default)]
    pub embedded_font: Option<EmbeddedBitmapFont>,
}

// -------------------------------------------------------------------------------------------------
// Canvas -> project
// -------------------------------------------------------------------------------------------------

fn to_project_layer(l: &Layer) -> ProjectLayer {
    ProjectLayer {
        name: l.name.clone(),
        visible: l.visible,
        lock_transparency: l.lock_transparency,
        offset_x: l.offset_x,
        offset_y: l.offset_y,
        cells: l.cells.iter().collect(),
        fg: l.fg.clone(),
        bg: l.bg.clone(),
        attrs: l.attrs.iter().map(|a| a.bits()).collect(),
    }
}

fn to_project_snapshot(s: &DocSnapshot) -> ProjectSnapshot {
    ProjectSnapshot {
        columns: s.columns,
        rows: s.rows,
        active_layer: s.active_layer,
        caret_row: s.caret_row,
        caret_col: s.caret_col,
        layers: s.layers.iter().map(to_project_layer).collect(),
    }
}

fn to_project_entry(e: &UndoEntry) -> ProjectUndoEntry {
    match e {
        UndoEntry::Snapshot(s) => ProjectUndoEntry::Snapshot { snapshot: to_project_snapshot(s) },
        UndoEntry::Patch(p) => ProjectUndoEntry::Patch {
            patch: ProjectPatch {
                columns: p.columns,
                rows: p.rows,
                active_layer: p.active_layer,
                caret_row: p.caret_row,
                caret_col: p.caret_col,
                page_rows: p.page_rows,
                layers: p
                    .layers
                    .iter()
                    .map(|m| ProjectLayerMeta {
                        name: m.name.clone(),
                        visible: m.visible,
                        lock_transparency: m.lock_transparency,
                        offset_x: m.offset_x,
                        offset_y: m.offset_y,
                    })
                    .collect(),
                pages: p
                    .pages
                    .iter()
                    .map(|pg| ProjectPatchPage {
                        layer: pg.layer,
                        page: pg.page,
                        page_rows: pg.page_rows,
                        row_count: pg.row_count,
                        cells: pg.cells.iter().collect(),
                        fg: pg.fg.clone(),
                        bg: pg.bg.clone(),
                        attrs: pg.attrs.iter().map(|a| a.bits()).collect(),
                    })
                    .collect(),
            },
        },
    }
}

// -------------------------------------------------------------------------------------------------
// Project -> canvas
// -------------------------------------------------------------------------------------------------

fn to_internal_layer(l: &ProjectLayer) -> Result<Layer, CanvasError> {
    let cells: Vec<char> = l.cells.chars().collect();
    if !l.fg.is_empty() && l.fg.len() != cells.len() {
        return Err(CanvasError::MalformedProject("layer fg size does not match cells".into()));
    }
    if !l.bg.is_empty() && l.bg.len() != cells.len() {
        return Err(CanvasError::MalformedProject("layer bg size does not match cells".into()));
    }
    if !l.attrs.is_empty() && l.attrs.len() != cells.len() {
        return Err(CanvasError::MalformedProject("layer attrs size does not match cells".into()));
    }
    let n = cells.len();
    Ok(Layer {
        name: l.name.clone(),
        visible: l.visible,
        lock_transparency: l.lock_transparency,
        offset_x: l.offset_x,
        offset_y: l.offset_y,
        fg: if l.fg.is_empty() { vec![0; n] } else { l.fg.clone() },
        bg: if l.bg.is_empty() { vec![0; n] } else { l.bg.clone() },
        attrs: if l.attrs.is_empty() {
            vec![Attrs::empty(); n]
        } else {
            l.attrs.iter().map(|&b| Attrs::from_bits_truncate(b)).collect()
        },
        cells,
    })
}

fn to_internal_snapshot(s: &ProjectSnapshot) -> Result<DocSnapshot, CanvasError> {
    let columns = if s.columns > 0 { s.columns.min(MAX_COLUMNS) } else { crate::DEFAULT_COLUMNS };
    let rows = s.rows.max(1);
    let layers = s.layers.iter().map(to_internal_layer).collect::<Result<Vec<_>, _>>()?;
    Ok(DocSnapshot {
        columns,
        rows,
        active_layer: s.active_layer,
        caret_row: s.caret_row,
        caret_col: s.caret_col,
        state_token: 0, // assigned at load
        layers,
    })
}

fn to_internal_entry(e: &ProjectUndoEntry) -> Result<UndoEntry, CanvasError> {
    match e {
        ProjectUndoEntry::Snapshot { snapshot } => {
            Ok(UndoEntry::Snapshot(to_internal_snapshot(snapshot)?))
        }
        ProjectUndoEntry::Patch { patch } => {
            let layers = patch
                .layers
                .iter()
                .map(|m| PatchLayerMeta {
                    name: m.name.clone(),
                    visible: m.visible,
                    lock_transparency: m.lock_transparency,
                    offset_x: m.offset_x,
                    offset_y: m.offset_y,
                })
                .collect();
            let pages = patch
                .pages
                .iter()
                .map(|pg| PatchPage {
                    layer: pg.layer,
                    page: pg.page,
                    page_rows: pg.page_rows,
                    row_count: pg.row_count,
                    cells: pg.cells.chars().collect(),
                    fg: pg.fg.clone(),
                    bg: pg.bg.clone(),
                    attrs: if pg.attrs.is_empty() {
                        vec![Attrs::empty(); pg.cells.chars().count()]
                    } else {
                        pg.attrs.iter().map(|&b| Attrs::from_bits_truncate(b)).collect()
                    },
                })
                .collect();
            Ok(UndoEntry::Patch(DocPatch {
                columns: patch.columns,
                rows: patch.rows,
                active_layer: patch.active_layer,
                caret_row: patch.caret_row,
                caret_col: patch.caret_col,
                state_token: 0, // assigned at load
                page_rows: patch.page_rows,
                layers,
                pages,
            }))
        }
    }
}

impl Canvas {
    /// Snapshot the whole durable document state.
    pub fn project_state(&self) -> ProjectState {
        ProjectState {
            version: PROJECT_VERSION,
            palette: self.palette,
            sauce: self.sauce.clone(),
            undo_limit: self.undo.limit,
            current: to_project_snapshot(&self.make_snapshot()),
            undo: self.undo.undo_stack.iter().map(to_project_entry).collect(),
            redo: self.undo.redo_stack.iter().map(to_project_entry).collect(),
            embedded_font: self.embedded_font.clone(),
        }
    }

    /// Replace the document from a project record. Everything converts and
    /// validates up front, so a malformed record fails without mutating
    /// `self`. Every entry receives a fresh state token so the dirty
    /// indicator works after load.
    pub fn apply_project_state(&mut self, state: &ProjectState) -> Result<(), CanvasError> {
        let mut current = to_internal_snapshot(&state.current)?;
        let mut undo_internal =
            state.undo.iter().map(to_internal_entry).collect::<Result<Vec<_>, _>>()?;
        let mut redo_internal =
            state.redo.iter().map(to_internal_entry).collect::<Result<Vec<_>, _>>()?;

        let mut next_token: u64 = 1;
        let mut bump = move || {
            let v = next_token;
            next_token += 1;
            v
        };
        for e in undo_internal.iter_mut().chain(redo_internal.iter_mut()) {
            let t = bump();
            match e {
                UndoEntry::Snapshot(s) => s.state_token = t,
                UndoEntry::Patch(p) => p.state_token = t,
            }
        }
        current.state_token = bump();

        // Transient interaction state resets wholesale.
        self.input = FrameInput::default();
        self.selection = None;
        self.move_state = None;
        self.undo = crate::undo::UndoState::default();

        self.sauce = state.sauce.clone();
        self.palette = state.palette;
        self.embedded_font = state.embedded_font.clone().filter(EmbeddedBitmapFont::is_valid);

        self.undo.undo_stack = undo_internal;
        self.undo.redo_stack = redo_internal;
        self.set_undo_limit(state.undo_limit);

        self.apply_snapshot(current);
        self.ensure_document();
        debug!(
            target: "canvas.project",
            version = state.version,
            layers = self.layers.len(),
            undo = self.undo.undo_stack.len(),
            redo = self.undo.redo_stack.len(),
            "project_state_applied"
        );
        Ok(())
    }
}
