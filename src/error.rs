//! Error types for the component runtime.
//!
//! Every failure is raised synchronously at the call that violates a
//! contract. Nothing is retried or swallowed, and shape validation always
//! runs before any state or signal bookkeeping is touched.

use thiserror::Error;

use crate::tree::Address;

/// Errors returned by the engine and the runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An init function, reducer, method or signal call got a payload of the
    /// wrong shape (not a mapping, or missing a required key).
    #[error("{context}: {message}")]
    ArgumentShape {
        /// What was being called.
        context: String,
        /// What was wrong with the argument.
        message: String,
    },

    /// New state disagrees with the model's container kinds.
    #[error("Shape of the new state does not match the model at {address}")]
    StateShapeMismatch {
        /// Absolute address of the first mismatch.
        address: Address,
    },

    /// Invalid component declaration or tag helper input.
    #[error("Declaration error: {0}")]
    Declaration(String),

    /// No arm matched a tagged value and no default was supplied.
    #[error("Unrecognized type in pattern matching: {0}")]
    PatternMatch(String),

    /// A reducer, method or signal name that the component never declared.
    #[error("Unknown {kind} '{name}'")]
    UnknownName {
        /// "reducer", "method" or "signal".
        kind: &'static str,
        /// The name that was looked up.
        name: String,
    },

    /// A callback outlived the runtime that created it.
    #[error("Runtime has been dropped")]
    Detached,
}

impl Error {
    pub(crate) fn argument(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArgumentShape {
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownName {
            kind,
            name: name.into(),
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
