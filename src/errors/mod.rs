//! Centralized error handling for the channel player core
//!
//! # Error Categories
//!
//! - **Content errors**: playlist text that cannot be read at ingestion
//! - **Catalog errors**: selections that reference unknown channels
//! - **Probe errors**: liveness check failures, resolved locally by policy
//! - **Playback errors**: engine failures that survive recovery and fallback
//!
//! # Usage
//!
//! ```rust
//! use m3u_player::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::content_read("empty upload"))
//! }
//! assert!(example_function().is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for playback Results
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Convenience type alias for probe Results
pub type ProbeResult<T> = Result<T, ProbeError>;
