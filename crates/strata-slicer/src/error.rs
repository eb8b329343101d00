//! Error types for the slicer.

use thiserror::Error;

use crate::slice::Stage;

/// Errors that can occur while slicing a widget.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlicerError {
    /// Invalid slice settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Widget produced no printable layers.
    #[error("widget has no printable layers")]
    EmptyWidget,

    /// Request was cancelled before completion.
    #[error("cancelled slicing")]
    Cancelled,

    /// A slice was advanced out of pipeline order.
    #[error("slice stage out of order: expected {expected:?}, found {found:?}")]
    StageOrder {
        /// Stage the slice had to be in.
        expected: Stage,
        /// Stage the slice was actually in.
        found: Stage,
    },

    /// The raw cross-sectioning collaborator failed.
    #[error("raw slicing failed: {0}")]
    RawSlice(String),
}

/// Result type for slicer operations.
pub type Result<T> = std::result::Result<T, SlicerError>;
