#![forbid(unsafe_code)]

//! Built-in validators.
//!
//! Each validator has a stable name (the `NAME_*` constants) used as its
//! report key, and a structured payload describing the violation.

use serde::Serialize;
use serde_json::json;

use super::pipeline::{FieldState, Outcome, Validator, ValidatorExecutionError};

/// Report key of [`Required`].
pub const NAME_REQUIRED: &str = "required";
/// Report key of [`MinLength`].
pub const NAME_MIN_LENGTH: &str = "minLength";
/// Report key of [`MaxLength`].
pub const NAME_MAX_LENGTH: &str = "maxLength";
/// Report key of [`Pattern`].
pub const NAME_PATTERN: &str = "pattern";
/// Report key of [`Email`].
pub const NAME_EMAIL: &str = "email";
/// Report key of [`Range`].
pub const NAME_RANGE: &str = "range";

// ---------------------------------------------------------------------------
// Blank
// ---------------------------------------------------------------------------

/// Values that can be "not provided".
pub trait Blank {
    fn is_blank(&self) -> bool;

    /// Stricter emptiness used when whitespace counts as a value.
    fn is_absent(&self) -> bool {
        self.is_blank()
    }
}

impl Blank for str {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }

    fn is_absent(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.as_str().is_blank()
    }

    fn is_absent(&self) -> bool {
        self.as_str().is_absent()
    }
}

impl Blank for bool {
    fn is_blank(&self) -> bool {
        !*self
    }
}

impl<T> Blank for Option<T> {
    fn is_blank(&self) -> bool {
        self.is_none()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Required
// ---------------------------------------------------------------------------

/// Fails with `true` when the value is blank.
///
/// Whitespace-only strings count as blank unless
/// [`allow_whitespace`](Self::allow_whitespace) is set. An unchecked
/// checkbox, `None`, and an empty list are blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required {
    pub allow_whitespace: bool,
}

impl Required {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat whitespace-only strings as provided.
    #[must_use]
    pub fn allow_whitespace(mut self) -> Self {
        self.allow_whitespace = true;
        self
    }
}

impl<T: Blank> Validator<T> for Required {
    fn name(&self) -> &str {
        NAME_REQUIRED
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let blank = if self.allow_whitespace {
            state.value.is_absent()
        } else {
            state.value.is_blank()
        };
        Ok(if blank { Outcome::flag() } else { Outcome::Success })
    }
}

// ---------------------------------------------------------------------------
// Length
// ---------------------------------------------------------------------------

/// Fails when a string has fewer than `min` characters.
///
/// Payload: `{"mustBe": min, "currentLength": len}`.
#[derive(Debug, Clone, Copy)]
pub struct MinLength {
    pub min: usize,
}

impl MinLength {
    #[must_use]
    pub fn new(min: usize) -> Self {
        Self { min }
    }
}

impl<T: AsRef<str>> Validator<T> for MinLength {
    fn name(&self) -> &str {
        NAME_MIN_LENGTH
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let len = state.value.as_ref().chars().count();
        Ok(if len < self.min {
            Outcome::failure(json!({ "mustBe": self.min, "currentLength": len }))
        } else {
            Outcome::Success
        })
    }
}

/// Fails when a string has more than `max` characters.
///
/// Payload: `{"mustBe": max, "currentLength": len}`.
#[derive(Debug, Clone, Copy)]
pub struct MaxLength {
    pub max: usize,
}

impl MaxLength {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl<T: AsRef<str>> Validator<T> for MaxLength {
    fn name(&self) -> &str {
        NAME_MAX_LENGTH
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let len = state.value.as_ref().chars().count();
        Ok(if len > self.max {
            Outcome::failure(json!({ "mustBe": self.max, "currentLength": len }))
        } else {
            Outcome::Success
        })
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// Substring or exact-match check without a regex engine.
///
/// Payload: `{"pattern": pattern, "exact": bool}`.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub pattern: String,
    pub exact: bool,
}

impl Pattern {
    /// Value must contain `pattern`.
    #[must_use]
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exact: false,
        }
    }

    /// Value must equal `pattern`.
    #[must_use]
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exact: true,
        }
    }
}

impl<T: AsRef<str>> Validator<T> for Pattern {
    fn name(&self) -> &str {
        NAME_PATTERN
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let value = state.value.as_ref();
        let matches = if self.exact {
            value == self.pattern
        } else {
            value.contains(&self.pattern)
        };
        Ok(if matches {
            Outcome::Success
        } else {
            Outcome::failure(json!({ "pattern": self.pattern, "exact": self.exact }))
        })
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// Heuristic address check: `local@domain.tld`, TLD of two or more chars.
///
/// Empty input passes; combine with [`Required`] to demand a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Email;

impl Email {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return false;
    }
    labels.last().is_some_and(|tld| tld.len() >= 2)
}

impl<T: AsRef<str>> Validator<T> for Email {
    fn name(&self) -> &str {
        NAME_EMAIL
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let trimmed = state.value.as_ref().trim();
        Ok(if trimmed.is_empty() || looks_like_email(trimmed) {
            Outcome::Success
        } else {
            Outcome::flag()
        })
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// Inclusive bounds check.
///
/// Payload: `{"min": min, "max": max, "actual": value}`.
#[derive(Debug, Clone, Copy)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy> Range<T> {
    #[must_use]
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T> Validator<T> for Range<T>
where
    T: PartialOrd + Serialize + Copy,
{
    fn name(&self) -> &str {
        NAME_RANGE
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        let value = *state.value;
        if value >= self.min && value <= self.max {
            return Ok(Outcome::Success);
        }
        let detail = (
            serde_json::to_value(self.min),
            serde_json::to_value(self.max),
            serde_json::to_value(value),
        );
        match detail {
            (Ok(min), Ok(max), Ok(actual)) => Ok(Outcome::failure(json!({
                "min": min,
                "max": max,
                "actual": actual,
            }))),
            _ => Err(ValidatorExecutionError::new("range bounds are not serializable")),
        }
    }
}

/// Shorthand constructors.
#[must_use]
pub fn required() -> Required {
    Required::new()
}

#[must_use]
pub fn min_length(min: usize) -> MinLength {
    MinLength::new(min)
}

#[must_use]
pub fn max_length(max: usize) -> MaxLength {
    MaxLength::new(max)
}

#[must_use]
pub fn email() -> Email {
    Email::new()
}

#[must_use]
pub fn range<T: Copy>(min: T, max: T) -> Range<T> {
    Range::new(min, max)
}
