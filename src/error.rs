use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GazeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dataset at line {line}: {reason}")]
    MalformedDataset { line: usize, reason: String },

    #[error(
        "Insufficient data: {rows} rows cannot give a non-empty split (train {train}, test {test})"
    )]
    InsufficientData {
        rows: usize,
        train: usize,
        test: usize,
    },

    #[error(
        "Dimension mismatch: {rows}x{cols} feature matrix (expected {expected} columns) with {targets} targets"
    )]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        targets: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Target {target} did not collect its dwell quota within {polls} polls")]
    DwellTimeout { target: usize, polls: usize },

    #[error("Model serialization error: {0}")]
    ModelEncode(#[from] rmp_serde::encode::Error),

    #[error("Model deserialization error: {0}")]
    ModelDecode(#[from] rmp_serde::decode::Error),

    #[error("Model artifact {path:?} has no entry for \"{axis}\"")]
    MissingModelAxis { path: PathBuf, axis: String },

    #[error("Failed to parse config data: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GazeError>;
