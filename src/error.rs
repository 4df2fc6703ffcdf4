//! Error handling for Aliquot
//!
//! Planning is fail-fast: the first error aborts the run at the call site.
//! There is no partial-failure recovery, matching the physical reality that
//! a robot cannot retry a spilled pipetting step.

use thiserror::Error;

/// Result type alias for Aliquot operations
pub type Result<T> = std::result::Result<T, AliquotError>;

/// Main error type for Aliquot operations
#[derive(Error, Debug)]
pub enum AliquotError {
    // Configuration Errors
    #[error("Unknown container shape: {shape}")]
    UnknownShape { shape: String },

    #[error("Unknown container: {container}")]
    UnknownContainer { container: String },

    #[error("Container already registered: {container}")]
    DuplicateContainer { container: String },

    // Planning Errors
    #[error(
        "Insufficient volume in {container}: requested {requested_ul:.1} ul, \
         {available_ul:.1} ul available"
    )]
    InsufficientVolume {
        container: String,
        requested_ul: f64,
        available_ul: f64,
    },

    #[error("Cannot split {total_ul} ul into aspirations of at most {max_ul} ul")]
    SplitInfeasible { total_ul: f64, max_ul: f64 },

    #[error("Invalid parameter {param}: got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // I/O Errors (catalog files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AliquotError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AliquotError::UnknownShape { .. } => "CONFIGURATION_ERROR",
            AliquotError::UnknownContainer { .. } => "CONFIGURATION_ERROR",
            AliquotError::DuplicateContainer { .. } => "CONFIGURATION_ERROR",
            AliquotError::InsufficientVolume { .. } => "INSUFFICIENT_VOLUME",
            AliquotError::SplitInfeasible { .. } => "SPLIT_INFEASIBLE",
            AliquotError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AliquotError::Io(_) => "IO_ERROR",
            AliquotError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error indicates a miscalibrated or incomplete catalog
    /// rather than a planning-time condition
    pub fn is_configuration(&self) -> bool {
        matches!(self.error_code(), "CONFIGURATION_ERROR")
    }
}
