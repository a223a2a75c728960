use std::{fmt, io};

use crate::error::mongo::classify;

/// Crate-wide `Result` type using [`CatalogError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Top-level error type for catalog operations.
///
/// The first four variants are the kinds callers are expected to map onto
/// their own presentation layer. The rest cover the ambient concerns of the
/// crate (configuration, I/O, decoding stored documents).
#[derive(Debug)]
pub enum CatalogError {
    /// Backend connection or transport failure. Never retried here.
    StoreUnavailable(String),

    /// Constraint violation on write, or a document/value that fails the
    /// domain invariants before it reaches the store.
    Validation(String),

    /// A targeted update matched zero documents.
    NotFound(String),

    /// Malformed aggregation request, detected at build time.
    InvalidPipeline(String),

    /// Configuration errors.
    Config(ConfigError),

    /// A stored document does not fit the typed model.
    Decode(String),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors that are neither transport nor constraint failures.
    Store(mongodb::error::Error),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Free-form configuration problem.
    Generic(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::StoreUnavailable(msg) => write!(f, "Store unavailable: {msg}"),
            CatalogError::Validation(msg) => write!(f, "Validation error: {msg}"),
            CatalogError::NotFound(msg) => write!(f, "Not found: {msg}"),
            CatalogError::InvalidPipeline(msg) => write!(f, "Invalid pipeline: {msg}"),
            CatalogError::Config(e) => write!(f, "Configuration error: {e}"),
            CatalogError::Decode(msg) => write!(f, "Decode error: {msg}"),
            CatalogError::Io(e) => write!(f, "I/O error: {e}"),
            CatalogError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Config(e) => Some(e),
            CatalogError::Io(e) => Some(e),
            CatalogError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

impl CatalogError {
    /// Short machine-readable name of the error kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CatalogError::StoreUnavailable(_) => "StoreUnavailable",
            CatalogError::Validation(_) => "ValidationError",
            CatalogError::NotFound(_) => "NotFound",
            CatalogError::InvalidPipeline(_) => "InvalidPipeline",
            CatalogError::Config(_) => "ConfigError",
            CatalogError::Decode(_) => "DecodeError",
            CatalogError::Io(_) => "IoError",
            CatalogError::Store(_) => "StoreError",
        }
    }
}

/* ========================= Conversions to CatalogError ========================= */

impl From<io::Error> for CatalogError {
    fn from(err: io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<mongodb::error::Error> for CatalogError {
    fn from(err: mongodb::error::Error) -> Self {
        classify(err)
    }
}

impl From<bson::de::Error> for CatalogError {
    fn from(err: bson::de::Error) -> Self {
        CatalogError::Decode(err.to_string())
    }
}

impl From<bson::ser::Error> for CatalogError {
    fn from(err: bson::ser::Error) -> Self {
        CatalogError::Validation(format!("document cannot be encoded: {err}"))
    }
}

impl From<ConfigError> for CatalogError {
    fn from(err: ConfigError) -> Self {
        CatalogError::Config(err)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = CatalogError::NotFound("no content titled 'Up'".to_string());
        assert_eq!(err.to_string(), "Not found: no content titled 'Up'");

        let err = CatalogError::Config(ConfigError::InvalidValue {
            field: "connection.uri".to_string(),
            value: String::new(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value '' for field 'connection.uri'"
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            CatalogError::StoreUnavailable(String::new()).kind_name(),
            "StoreUnavailable"
        );
        assert_eq!(
            CatalogError::Validation(String::new()).kind_name(),
            "ValidationError"
        );
        assert_eq!(
            CatalogError::InvalidPipeline(String::new()).kind_name(),
            "InvalidPipeline"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;

        let err = CatalogError::from(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(err.source().is_some());
    }
}
