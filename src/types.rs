use serde::{Deserialize, Serialize};

/// Closed set of geophysical model functions supported by this crate.
///
/// CMOD4, CMOD5, CMOD5.N and CMOD_IFR2 are closed-form regressions inverted
/// by the iterative step-halving solver; CMOD7 has no closed form and is
/// inverted directly against its lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GmfModel {
    Cmod4,
    Cmod5,
    /// CMOD5.N, the neutral-wind recalibration of CMOD5
    Cmod5N,
    CmodIfr2,
    Cmod7,
}

impl GmfModel {
    /// The variants handled by the iterative inversion engine.
    pub const ITERATIVE: [GmfModel; 4] = [
        GmfModel::Cmod4,
        GmfModel::Cmod5,
        GmfModel::Cmod5N,
        GmfModel::CmodIfr2,
    ];
}

impl std::fmt::Display for GmfModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GmfModel::Cmod4 => write!(f, "CMOD4"),
            GmfModel::Cmod5 => write!(f, "CMOD5"),
            GmfModel::Cmod5N => write!(f, "CMOD5.N"),
            GmfModel::CmodIfr2 => write!(f, "CMOD_IFR2"),
            GmfModel::Cmod7 => write!(f, "CMOD7"),
        }
    }
}

/// Error types for wind retrieval
#[derive(Debug, thiserror::Error)]
pub enum WindError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Grid shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("GMF table error: {0}")]
    TableFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for wind retrieval operations
pub type WindResult<T> = Result<T, WindError>;
