#![forbid(unsafe_code)]

//! Validator trait, outcome types, and the ordered evaluation pipeline.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use serde::Serialize;
use serde_json::{Map, Value, json};

// ---------------------------------------------------------------------------
// Outcome / failures / report
// ---------------------------------------------------------------------------

/// Result of a single validator.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    #[default]
    Success,
    /// Failure payload: `true` or a structured detail value.
    Failure(Value),
}

impl Outcome {
    /// Failure carrying the bare `true` marker.
    #[must_use]
    pub fn flag() -> Self {
        Self::Failure(Value::Bool(true))
    }

    #[must_use]
    pub fn failure(payload: impl Into<Value>) -> Self {
        Self::Failure(payload.into())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One failing entry of a [`ValidationReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    /// Declared name of the validator that failed.
    pub name: String,
    pub payload: Value,
}

impl ValidationFailure {
    /// Whether this entry records a validator that could not run.
    #[must_use]
    pub fn is_execution_error(&self) -> bool {
        self.payload
            .as_object()
            .is_some_and(|map| map.contains_key(EXECUTION_ERROR_KEY))
    }
}

const EXECUTION_ERROR_KEY: &str = "executionError";

/// Ordered failing entries from one pipeline run.
///
/// Order is pipeline declaration order. Entries are never merged, even when
/// two validators share a name.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationFailure> {
        self.failures.iter()
    }

    /// Payload of the first failure with `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.failures
            .iter()
            .find(|failure| failure.name == name)
            .map(|failure| &failure.payload)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.name.as_str())
    }

    /// Render as `[{name: payload}, ...]`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.failures
                .iter()
                .map(|failure| {
                    let mut entry = Map::new();
                    entry.insert(failure.name.clone(), failure.payload.clone());
                    Value::Object(entry)
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn into_failures(self) -> Vec<ValidationFailure> {
        self.failures
    }
}

impl<'a> IntoIterator for &'a ValidationReport {
    type Item = &'a ValidationFailure;
    type IntoIter = std::slice::Iter<'a, ValidationFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}

impl FromIterator<ValidationFailure> for ValidationReport {
    fn from_iter<I: IntoIterator<Item = ValidationFailure>>(iter: I) -> Self {
        Self {
            failures: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

/// A validator could not produce an outcome.
///
/// The pipeline records it as a failure named after the validator, with
/// `{"executionError": message}` as payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorExecutionError {
    pub message: String,
}

impl ValidatorExecutionError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "validator panicked".to_string()
        };
        Self { message }
    }
}

impl fmt::Display for ValidatorExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validator failed to execute: {}", self.message)
    }
}

impl std::error::Error for ValidatorExecutionError {}

// ---------------------------------------------------------------------------
// Validator trait
// ---------------------------------------------------------------------------

/// Observable state of the owning field, as seen by validators.
#[derive(Debug)]
pub struct FieldState<'a, T> {
    /// Candidate value being validated.
    pub value: &'a T,
    pub initial: &'a T,
}

impl<'a, T> FieldState<'a, T> {
    #[must_use]
    pub fn new(value: &'a T, initial: &'a T) -> Self {
        Self { value, initial }
    }
}

impl<T: PartialEq> FieldState<'_, T> {
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.value != self.initial
    }
}

/// A named, pure check over a field's state.
///
/// Implementations must be deterministic: the same state yields the same
/// outcome, since the pipeline re-runs on every value change.
pub trait Validator<T> {
    /// Unique name used as the report key.
    fn name(&self) -> &str;

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError>;
}

/// Return types accepted from closure validators.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Outcome, ValidatorExecutionError>;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Result<Outcome, ValidatorExecutionError> {
        Ok(self)
    }
}

impl IntoOutcome for Result<Outcome, ValidatorExecutionError> {
    fn into_outcome(self) -> Result<Outcome, ValidatorExecutionError> {
        self
    }
}

/// Closure-backed validator, see [`validator_fn`] and [`try_validator_fn`].
pub struct FnValidator<F> {
    name: String,
    check: F,
}

impl<T, F, R> Validator<T> for FnValidator<F>
where
    F: Fn(&FieldState<'_, T>) -> R,
    R: IntoOutcome,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, state: &FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError> {
        (self.check)(state).into_outcome()
    }
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("name", &self.name)
            .finish()
    }
}

/// Build an infallible validator from a closure.
pub fn validator_fn<T, F>(name: impl Into<String>, check: F) -> FnValidator<F>
where
    F: Fn(&FieldState<'_, T>) -> Outcome,
{
    FnValidator {
        name: name.into(),
        check,
    }
}

/// Build a validator from a closure that may fail to execute.
pub fn try_validator_fn<T, F>(name: impl Into<String>, check: F) -> FnValidator<F>
where
    F: Fn(&FieldState<'_, T>) -> Result<Outcome, ValidatorExecutionError>,
{
    FnValidator {
        name: name.into(),
        check,
    }
}

// ---------------------------------------------------------------------------
// Pipeline construction
// ---------------------------------------------------------------------------

type Factory<T> = Box<dyn FnOnce() -> Box<dyn Validator<T>>>;

/// A pipeline entry: a ready validator or a factory producing one.
///
/// Factories run exactly once, when the pipeline is built.
pub enum ValidatorSpec<T> {
    Ready(Box<dyn Validator<T>>),
    Factory(Factory<T>),
}

impl<T> ValidatorSpec<T> {
    pub fn new<V: Validator<T> + 'static>(validator: V) -> Self {
        Self::Ready(Box::new(validator))
    }

    pub fn factory<V, F>(make: F) -> Self
    where
        V: Validator<T> + 'static,
        F: FnOnce() -> V + 'static,
    {
        Self::Factory(Box::new(move || Box::new(make()) as Box<dyn Validator<T>>))
    }

    fn into_validator(self) -> Box<dyn Validator<T>> {
        match self {
            Self::Ready(validator) => validator,
            Self::Factory(make) => make(),
        }
    }
}

impl<T> fmt::Debug for ValidatorSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(validator) => f
                .debug_tuple("ValidatorSpec::Ready")
                .field(&validator.name())
                .finish(),
            Self::Factory(_) => f.write_str("ValidatorSpec::Factory"),
        }
    }
}

/// Build a `Vec<ValidatorSpec<_>>` from validators of mixed types.
///
/// ```rust
/// use formwire::validators;
/// use formwire::validation::{MinLength, Required, ValidatorSpec};
///
/// let specs: Vec<ValidatorSpec<String>> = validators![Required::new(), MinLength::new(8)];
/// assert_eq!(specs.len(), 2);
/// ```
#[macro_export]
macro_rules! validators {
    () => {
        ::std::vec::Vec::new()
    };
    ($($v:expr),+ $(,)?) => {
        ::std::vec![$($crate::validation::ValidatorSpec::new($v)),+]
    };
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered validators evaluated exhaustively against a field state.
pub struct Pipeline<T> {
    validators: Vec<Box<dyn Validator<T>>>,
    catch_panics: bool,
}

impl<T> Pipeline<T> {
    /// Build a pipeline, invoking any factories once.
    pub fn new(specs: impl IntoIterator<Item = ValidatorSpec<T>>) -> Self {
        Self {
            validators: specs
                .into_iter()
                .map(ValidatorSpec::into_validator)
                .collect(),
            catch_panics: true,
        }
    }

    /// Contain panicking validators (default) or let them unwind.
    #[must_use]
    pub fn catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.validators.iter().map(|validator| validator.name())
    }

    /// Run every validator in order and collect the failures.
    ///
    /// With panic containment off, a panicking validator unwinds out of
    /// this call.
    pub fn evaluate(&self, state: &FieldState<'_, T>) -> ValidationReport {
        let (report, unwound) = self.evaluate_recording(state);
        if let Some(payload) = unwound {
            resume_unwind(payload);
        }
        report
    }

    /// Like [`evaluate`](Self::evaluate), but an uncontained panic is handed
    /// back instead of unwinding. The report already carries the panicking
    /// validator's execution error, so the caller can store it first.
    pub(crate) fn evaluate_recording(
        &self,
        state: &FieldState<'_, T>,
    ) -> (ValidationReport, Option<Box<dyn Any + Send>>) {
        let mut failures = Vec::new();
        for validator in &self.validators {
            let result = match catch_unwind(AssertUnwindSafe(|| validator.validate(state))) {
                Ok(result) => result,
                Err(payload) => {
                    let err = ValidatorExecutionError::from_panic(payload.as_ref());
                    failures.push(execution_failure(validator.name(), &err));
                    if self.catch_panics {
                        continue;
                    }
                    return (failures.into_iter().collect(), Some(payload));
                }
            };
            match result {
                Ok(Outcome::Success) => {}
                Ok(Outcome::Failure(payload)) => failures.push(ValidationFailure {
                    name: validator.name().to_string(),
                    payload,
                }),
                Err(err) => failures.push(execution_failure(validator.name(), &err)),
            }
        }
        (failures.into_iter().collect(), None)
    }
}

fn execution_failure(name: &str, err: &ValidatorExecutionError) -> ValidationFailure {
    tracing::warn!(
        validator = name,
        error = %err.message,
        "validator failed to execute"
    );
    ValidationFailure {
        name: name.to_string(),
        payload: json!({ EXECUTION_ERROR_KEY: err.message }),
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("validators", &self.names().collect::<Vec<_>>())
            .field("catch_panics", &self.catch_panics)
            .finish()
    }
}
