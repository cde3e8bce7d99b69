// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::naming::NameParseError;

pub type Result<T> = std::result::Result<T, ChvError>;

#[derive(Debug, Error)]
pub enum ChvError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    NameParse(#[from] NameParseError),

    #[error("catalog is not uniform: {0}")]
    CatalogInconsistent(String),

    #[error(
        "layer {path} is {found_width}x{found_height}, expected {width}x{height}"
    )]
    ShapeMismatch {
        path: PathBuf,
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("block at row {got} written out of order, next row is {expected}")]
    BlockOrder { expected: usize, got: usize },

    #[error("block of {rows} rows at row {row_offset} runs past the raster height {height}")]
    BlockOutOfBounds {
        row_offset: usize,
        rows: usize,
        height: usize,
    },

    #[error("output {path} closed after {written} of {height} rows")]
    IncompleteOutput {
        path: PathBuf,
        written: usize,
        height: usize,
    },

    #[error("output {0} is empty after finalization")]
    EmptyOutput(PathBuf),

    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl ChvError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChvError::Io {
            path: path.into(),
            source,
        }
    }
}
