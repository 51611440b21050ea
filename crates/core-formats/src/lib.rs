//! core-formats: wire codecs and text-mode font importers.
//!
//! - XBin (.xb): bit-exact import/export with palette, embedded font and
//!   row-wise RLE.
//! - FIGlet (.flf) and TheDraw (.tdf): font parsing and text rendering
//!   into a canvas.
//!
//! Every importer builds a fresh document; on error nothing is produced.

pub mod figlet;
pub mod render;
pub mod tdf;
pub mod xbin;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Unsupported(String),
    #[error(transparent)]
    Canvas(#[from] core_canvas::CanvasError),
    #[error(transparent)]
    Sauce(#[from] core_sauce::SauceError),
}

impl FormatError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        FormatError::Malformed(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        FormatError::Unsupported(msg.into())
    }
}
