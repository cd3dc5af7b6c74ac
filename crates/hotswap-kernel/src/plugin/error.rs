//! Typed errors raised by reloadable components.

use thiserror::Error;

/// Errors that can occur while a component is built or woken up.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComponentError {
    /// A dependent type name has no synthesized counterpart in the module.
    #[error("Type {0} does not resolve to a synthesized type of this module")]
    UnresolvedType(String),

    /// The component's `awake` hook rejected construction.
    #[error("Component awake failed: {0}")]
    AwakeFailed(String),

    /// Catch-all for errors that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}
