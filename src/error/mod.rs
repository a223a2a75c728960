//! Error handling for the catalog engine.
//!
//! This module provides:
//! - The catalog error taxonomy (`StoreUnavailable`, `Validation`, `NotFound`,
//!   `InvalidPipeline`) plus ambient kinds for configuration, I/O and decoding
//! - Classification of MongoDB driver errors into that taxonomy
//! - Structured error information for logging driver failures
//!
//! # Example
//!
//! ```rust,no_run
//! use streamhub::error::{CatalogError, Result};
//!
//! fn check_rating(rating: f64) -> Result<f64> {
//!     if (0.0..=5.0).contains(&rating) {
//!         Ok(rating)
//!     } else {
//!         Err(CatalogError::Validation(format!("rating {rating} out of range")))
//!     }
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{CatalogError, ConfigError, Result};
pub use mongo::{ErrorInfo, classify, extract_error_info};
