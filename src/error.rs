//! Error types for pack merging

use std::path::PathBuf;
use thiserror::Error;

use crate::xml::XmlError;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to load source pack {path}: {reason}")]
    SourceLoad { path: String, reason: String },

    #[error("Need at least 2 readable source packs, got {0}")]
    InsufficientSources(usize),

    #[error("Output {0} already exists; pass --force to overwrite")]
    OutputExists(PathBuf),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Failed to parse {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    OutputWrite { path: String, reason: String },

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Configuration errors come from how the tool was invoked; everything
    /// else is a data error in the source packs. The CLI maps the two
    /// classes to different exit codes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MergeError::OutputExists(_)
                | MergeError::InvalidPath(_)
                | MergeError::InsufficientSources(_)
        )
    }
}
