//! movieapp Common - Shared types for every movieapp service
//!
//! This crate provides:
//! - `Code`: the failure classification that crosses service boundaries
//! - `MovieAppError`: the application error carrying a classification
//! - `CancelSignal`: cooperative cancellation forwarded through call chains

pub mod cancel;
pub mod error;

pub use cancel::{CancelSignal, run_until_cancelled};
pub use error::{Code, MovieAppError, Result};

/// Logical service names used for registration and resolution
pub const METADATA_SERVICE: &str = "metadata";
pub const RATING_SERVICE: &str = "rating";
pub const MOVIE_SERVICE: &str = "movie";
pub const AUTH_SERVICE: &str = "auth";
