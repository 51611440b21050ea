//! core-project: project file persistence.
//!
//! Serializes [`core_canvas::ProjectState`] as self-describing JSON and
//! loads it back with validation. Loading never mutates a document on
//! failure; state tokens are re-assigned by the canvas on apply.

use core_canvas::{Canvas, CanvasError, PROJECT_VERSION, ProjectState};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed project file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported project version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Serialize a document's durable state to JSON bytes.
pub fn to_bytes(canvas: &Canvas) -> Result<Vec<u8>, ProjectError> {
    let state = canvas.project_state();
    Ok(serde_json::to_vec(&state)?)
}

/// Parse project bytes into a state record, checking the schema version.
pub fn from_bytes(bytes: &[u8]) -> Result<ProjectState, ProjectError> {
    let state: ProjectState = serde_json::from_slice(bytes)?;
    if state.version > PROJECT_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            found: state.version,
            supported: PROJECT_VERSION,
        });
    }
    Ok(state)
}

/// Write a document to a project file.
pub fn save_file(path: &Path, canvas: &Canvas) -> Result<(), ProjectError> {
    let bytes = to_bytes(canvas)?;
    fs::write(path, &bytes)?;
    info!(target: "project", path = %path.display(), bytes = bytes.len(), "project_saved");
    Ok(())
}

/// Load a project file into a fresh document.
pub fn load_file(path: &Path) -> Result<Canvas, ProjectError> {
    let bytes = fs::read(path)?;
    let state = from_bytes(&bytes)?;
    let mut canvas = Canvas::default();
    canvas.apply_project_state(&state)?;
    info!(
        target: "project",
        path = %path.display(),
        columns = canvas.columns(),
        rows = canvas.rows(),
        layers = canvas.layer_count(),
        "project_loaded"
    );
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_canvas::{Attrs, CellWrite};
    use core_palette::{BuiltinPalette, PaletteRef, pack_rgb};
    use pretty_assertions::assert_eq;

    fn sample_canvas() -> Canvas {
        let mut c = Canvas::new(40);
        c.set_palette_ref(PaletteRef::Builtin(BuiltinPalette::Xterm16));
        c.set_cell(
            0,
            0,
            CellWrite {
                cp: Some('\u{2588}'),
                fg: Some(pack_rgb(255, 85, 85)),
                bg: Some(pack_rgb(0, 0, 170)),
                attrs: Some(Attrs::BOLD | Attrs::UNDERLINE),
            },
        );
        c.add_layer("shade");
        c.set_layer_offset(1, -3, 7).unwrap();
        c.begin_undo_capture();
        c.set_cell(2, 2, CellWrite::glyph('z'));
        c.end_undo_capture();
        c.set_undo_limit(10);
        let mut sauce = c.sauce().clone();
        sauce.title = "sample".into();
        sauce.comments = vec!["made for tests".into()];
        c.set_sauce(sauce);
        c
    }

    #[test]
    fn save_load_preserves_document_content() {
        let c = sample_canvas();
        let bytes = to_bytes(&c).unwrap();
        let state = from_bytes(&bytes).unwrap();
        let mut restored = Canvas::default();
        restored.apply_project_state(&state).unwrap();

        assert_eq!(restored.content_hash(), c.content_hash());
        assert_eq!(restored.palette_ref(), c.palette_ref());
        assert_eq!(restored.undo_limit(), 10);
        assert_eq!(restored.sauce().title, "sample");
        assert_eq!(restored.sauce().comments, vec!["made for tests".to_string()]);
        assert_eq!(restored.undo_depth(), c.undo_depth());
    }

    #[test]
    fn file_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("art.phos");
        let c = sample_canvas();
        save_file(&path, &c)?;
        let restored = load_file(&path)?;
        assert_eq!(restored.content_hash(), c.content_hash());
        Ok(())
    }

    #[test]
    fn future_versions_are_rejected() {
        let c = Canvas::new(10);
        let mut state = c.project_state();
        state.version = PROJECT_VERSION + 1;
        let bytes = serde_json::to_vec(&state).unwrap();
        assert!(matches!(
            from_bytes(&bytes),
            Err(ProjectError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        assert!(matches!(from_bytes(b"not json"), Err(ProjectError::Malformed(_))));
    }
}
