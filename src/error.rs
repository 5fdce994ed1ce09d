//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! All model-setup errors are raised synchronously at the point of the
//! violated precondition and are never retried internally; they represent
//! configuration mistakes, not transient conditions. Status codes returned by
//! an external likelihood engine are *not* translated into these variants --
//! they are surfaced verbatim by the push operations in [`crate::engine`].

use thiserror::Error;

/// Main error type for Petrel operations
#[derive(Error, Debug)]
pub enum PetrelError {
    /// A subset was configured with a data type the model cannot use
    #[error("only nucleotide or codon data allowed in this version, you specified data type \"{name}\" for subset {subset}")]
    UnsupportedDataType { name: String, subset: usize },

    /// Out-of-domain scalar or vector parameter value
    #[error("invalid parameter value: {message}")]
    InvalidParameterValue { message: String },

    /// Number of among-site rate variation categories must be positive
    #[error("number of categories used for among-site rate variation must be greater than zero but the value {0} was supplied")]
    InvalidCategoryCount(usize),

    /// Shape or length mismatches, bad subset indices
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Non-positive or empty input to the log-ratio codec
    #[error("domain error: {message}")]
    Domain { message: String },

    /// Flat parameter vector too short during decode
    #[error("parameter vector exhausted: needed {needed} entries but only {available} were supplied")]
    BufferUnderflow { needed: usize, available: usize },

    /// I/O errors (model description file missing, read failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (invalid CLI arguments, malformed model files)
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Type alias for Results using PetrelError
pub type Result<T> = std::result::Result<T, PetrelError>;

impl PetrelError {
    /// Create an invalid parameter value error
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidParameterValue {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a domain error
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for PetrelError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
