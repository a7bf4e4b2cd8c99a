#![forbid(unsafe_code)]

//! Construction-time errors.
//!
//! Both error types are fatal for the value being built: a failed
//! [`Field`](crate::Field) or [`Composite`](crate::Composite) construction
//! leaves nothing behind. Validation failures are not errors; they are
//! reported as data through [`ValidationReport`](crate::ValidationReport).

use std::fmt;

/// Failure to resolve a bind target to exactly one live element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The selector matched no element.
    NotFound { selector: String },
    /// The selector matched more than one element.
    Ambiguous { selector: String, matches: usize },
    /// The element handle is no longer attached to the presentation layer.
    Detached,
    /// The selector matched an element carrying a different value type.
    TypeMismatch {
        selector: String,
        expected: &'static str,
    },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { selector } => write!(f, "no element matches `{selector}`"),
            Self::Ambiguous { selector, matches } => {
                write!(f, "`{selector}` matches {matches} elements, expected exactly one")
            }
            Self::Detached => write!(f, "element handle is detached"),
            Self::TypeMismatch { selector, expected } => {
                write!(f, "element `{selector}` does not hold values of type {expected}")
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// Failure to build a [`Composite`](crate::Composite).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// A member declared as a construction tuple could not be bound.
    Binding {
        member: String,
        source: BindingError,
    },
    /// Two members share a name.
    DuplicateMember(String),
}

impl FormError {
    /// Name of the member that caused the failure.
    #[must_use]
    pub fn member(&self) -> &str {
        match self {
            Self::Binding { member, .. } | Self::DuplicateMember(member) => member,
        }
    }
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binding { member, source } => write!(f, "member `{member}`: {source}"),
            Self::DuplicateMember(member) => write!(f, "duplicate member `{member}`"),
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Binding { source, .. } => Some(source),
            Self::DuplicateMember(_) => None,
        }
    }
}
