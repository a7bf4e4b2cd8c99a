#![forbid(unsafe_code)]

//! Validator pipelines.
//!
//! A [`Pipeline`] runs an ordered list of [`Validator`]s against a field's
//! state and returns a [`ValidationReport`] holding only the failures, in
//! declaration order. Evaluation is exhaustive (no short-circuit) and free of
//! side effects, so it can be re-run on every value change.
//!
//! # Example
//!
//! ```rust
//! use formwire::validation::{FieldState, MinLength, Pipeline, Required, ValidatorSpec};
//! use serde_json::json;
//!
//! let pipeline = Pipeline::new(vec![
//!     ValidatorSpec::new(Required::new()),
//!     ValidatorSpec::factory(|| MinLength::new(8)),
//! ]);
//!
//! let empty = String::new();
//! let report = pipeline.evaluate(&FieldState::new(&empty, &empty));
//! assert_eq!(
//!     report.to_json(),
//!     json!([{ "required": true }, { "minLength": { "mustBe": 8, "currentLength": 0 } }])
//! );
//! ```

mod pipeline;
mod validators;

pub use pipeline::{
    FieldState, FnValidator, IntoOutcome, Outcome, Pipeline, ValidationFailure, ValidationReport,
    Validator, ValidatorExecutionError, ValidatorSpec, try_validator_fn, validator_fn,
};
pub use validators::{
    Blank, Email, MaxLength, MinLength, NAME_EMAIL, NAME_MAX_LENGTH, NAME_MIN_LENGTH,
    NAME_PATTERN, NAME_RANGE, NAME_REQUIRED, Pattern, Range, Required, email, max_length,
    min_length, range, required,
};
