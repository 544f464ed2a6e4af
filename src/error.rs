use thiserror::Error;

use crate::topology::Violation;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A block, reading list or correction input has the wrong shape
    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    /// The sign check disagrees between the real and imaginary channels
    #[error("inconsistent polarity: real trend gives {real:+}, imaginary trend gives {imag:+}")]
    InconsistentPolarity { real: f64, imag: f64 },

    #[error("invalid transformer kind `{0}`, expected `voltage` or `current`")]
    InvalidTransformerKind(String),

    #[error("sections of winding group `{group}` must have identical turns in parallel, found {turns:?}")]
    InconsistentWindingTurns { group: String, turns: Vec<u32> },

    #[error("invalid transformer topology: {0}")]
    InvalidTopology(String),

    /// Every violation found in a calibration record, not just the first
    #[error("calibration record is incomplete: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    MissingCalibrationField(Vec<Violation>),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid uncertainty for `{label}`: u = {u}, df = {df}")]
    InvalidUncertainty { label: String, u: f64, df: f64 },

    #[error("correlation coefficient {0} is outside [-1, 1]")]
    InvalidCorrelation(f64),

    #[error("`{0}` is not an elementary uncertain number")]
    NotElementary(String),

    #[error("no buildup state for `{0}`")]
    UnknownState(String),

    #[error("no cell at row {row}, column {column}")]
    MissingCell { row: usize, column: usize },

    #[error("expected a number at row {row}, column {column}, found `{found}`")]
    NonNumericCell {
        row: usize,
        column: usize,
        found: String,
    },

    #[error("statistics error: {0}")]
    Statistics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn dimension(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}
