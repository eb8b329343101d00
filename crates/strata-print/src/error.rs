//! Error types for print assembly.

use strata_slicer::SlicerError;
use thiserror::Error;

/// Errors that can occur while assembling a print.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrintError {
    /// No widget has any slices.
    #[error("nothing to print")]
    NoWidgets,

    /// A widget failed to slice.
    #[error(transparent)]
    Slicer(#[from] SlicerError),
}

/// Result type for print operations.
pub type Result<T> = std::result::Result<T, PrintError>;
