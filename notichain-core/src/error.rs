//! Error types for chain configuration.
//!
//! Only call-site mistakes are errors: a blank name, an empty path, a path
//! step that cannot reach the next object, or a malformed pattern. Configuring
//! a chain that is already finished or disposed is never an error; those calls
//! are silently ignored so getters can redeclare their dependencies on every
//! read.

use thiserror::Error;

/// Errors raised when a chain or manager is configured incorrectly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// A required name argument was empty or whitespace.
    #[error("argument `{argument}` must not be blank")]
    BlankArgument {
        /// Name of the offending argument.
        argument: &'static str,
    },

    /// A property path was built from zero steps.
    #[error("property path must contain at least one step")]
    EmptyPath,

    /// A step in the middle of a path has no way to read the next object.
    #[error("path step `{step}` is followed by further steps but cannot read a notifying object")]
    MissingAccessor {
        /// Name of the step missing an accessor.
        step: String,
    },

    /// A property pattern failed to compile.
    #[error("invalid property pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Fail with [`ChainError::BlankArgument`] if `value` is empty or whitespace.
pub(crate) fn require(value: &str, argument: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ChainError::BlankArgument { argument });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_blank_values() {
        assert_eq!(
            require("", "property"),
            Err(ChainError::BlankArgument { argument: "property" })
        );
        assert_eq!(
            require("  \t", "property"),
            Err(ChainError::BlankArgument { argument: "property" })
        );
        assert!(require("quantity", "property").is_ok());
    }

    #[test]
    fn errors_render_their_argument() {
        let err = ChainError::BlankArgument { argument: "dependent_property" };
        assert_eq!(err.to_string(), "argument `dependent_property` must not be blank");

        let err = ChainError::MissingAccessor { step: "line_item".into() };
        assert!(err.to_string().contains("line_item"));
    }
}
