//! See [`Error`].

use miette::Diagnostic;
use thiserror::Error;

/// Error types for this crate.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("`{name}` must have 4 columns per box, got {columns}")]
    MalformedBoxes {
        name: &'static str,
        columns: usize,
    },

    #[error("`pos_ratio` must lie in [0, 1], got {pos_ratio}")]
    InvalidPosRatio { pos_ratio: f32 },

    #[error("`pos_iou_thresh` ({pos}) must not be below `neg_iou_thresh` ({neg})")]
    InvalidIouThresholds { pos: f32, neg: f32 },
}

/// Type alias for [`Result<T, Error>`].
pub type Result<T> = std::result::Result<T, Error>;
