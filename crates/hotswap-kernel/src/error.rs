//! Crate-level error types for `hotswap-kernel`.
//!
//! [`HotswapError`] composes the errors of every sub-module and is carried in an
//! [`error_stack::Report`] so callers can attach context while propagating.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hotswap_kernel::config::ReloadSettings;
//! use error_stack::ResultExt;
//!
//! let settings = ReloadSettings::load(path.as_ref()).attach("starting reload host")?;
//! ```

use crate::config::ConfigError;
use crate::plugin::ComponentError;
use thiserror::Error;

/// Crate-level error type for `hotswap-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HotswapError {
    /// A settings loading error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// An error raised by a reloadable component.
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type HotswapResult<T> = Result<T, error_stack::Report<HotswapError>>;
