#![forbid(unsafe_code)]

//! Atomic reactive cell bound to one presentation element.
//!
//! A [`Field<T>`] owns one value, one adapter binding, and one validator
//! pipeline. Handles are cheap to clone and share the same cell.
//!
//! # Mutation path
//!
//! Programmatic [`set_value`](Field::set_value) and adapter-originated edits
//! go through the same steps:
//!
//! 1. Equal to the current value: stop (no write, no validation, no event).
//! 2. Commit the new value.
//! 3. Programmatic sets only: write the value into the adapter. Edits that
//!    came from the adapter are never written back, which rules out echo
//!    loops between model and element.
//! 4. Re-run the pipeline.
//! 5. Dispatch [`ChangeEvent`] to listeners in registration order, on the
//!    caller's stack.
//!
//! Construction writes the initial value into the adapter and computes the
//! initial report without dispatching anything.
//!
//! # Re-entrancy
//!
//! No internal borrow is held while the adapter is written or listeners run,
//! so listeners may freely read or mutate this or other fields. Two fields
//! whose listeners update each other with ever-changing values recurse
//! without bound; breaking such cycles is up to the caller. Nesting deeper
//! than [`EngineConfig::max_dispatch_depth`] is logged.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::adapter::{Adapter, BindTarget};
use crate::config::EngineConfig;
use crate::error::BindingError;
use crate::subscription::{DispatchGuard, Listeners, Subscription};
use crate::validation::{FieldState, Pipeline, ValidationReport, ValidatorSpec};

/// A value transition, delivered only when `prev != value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub prev: T,
    pub value: T,
}

/// Whether a field holds its initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Clean,
    Dirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Program,
    Adapter,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Self::Program => "program",
            Self::Adapter => "adapter",
        }
    }
}

struct State<T> {
    current: T,
    initial: T,
    report: ValidationReport,
    pipeline: Pipeline<T>,
    adapter: Option<Rc<dyn Adapter<T>>>,
    adapter_subscription: Option<Subscription>,
    touched: bool,
}

struct Shared<T> {
    state: RefCell<State<T>>,
    listeners: Listeners<ChangeEvent<T>>,
    max_dispatch_depth: usize,
}

/// Reactive cell bound to one adapter.
pub struct Field<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Field<T> {
    /// Bind to the element `target` refers to, using the global config.
    ///
    /// Fails with [`BindingError`] unless the target resolves to exactly one
    /// attached element; nothing is written to any element in that case.
    pub fn new<'a>(
        target: impl Into<BindTarget<'a, T>>,
        initial: T,
        validators: impl IntoIterator<Item = ValidatorSpec<T>>,
    ) -> Result<Self, BindingError> {
        Self::with_config(target, initial, validators, EngineConfig::global())
    }

    /// Bind with an explicit config.
    pub fn with_config<'a>(
        target: impl Into<BindTarget<'a, T>>,
        initial: T,
        validators: impl IntoIterator<Item = ValidatorSpec<T>>,
        config: &EngineConfig,
    ) -> Result<Self, BindingError> {
        let target = target.into();
        let described = target.describe();
        let adapter = target.resolve().inspect_err(|err| {
            tracing::debug!(selector = %described, error = %err, "field binding failed");
        })?;
        let field = Self::from_adapter(adapter, initial, validators, config);
        tracing::debug!(
            selector = %described,
            validators = field.shared.state.borrow().pipeline.len(),
            valid = field.valid(),
            "field bound"
        );
        Ok(field)
    }

    /// Build around an already resolved adapter.
    pub(crate) fn from_adapter(
        adapter: Rc<dyn Adapter<T>>,
        initial: T,
        validators: impl IntoIterator<Item = ValidatorSpec<T>>,
        config: &EngineConfig,
    ) -> Self {
        let pipeline = Pipeline::new(validators).catch_panics(config.catch_validator_panics);
        adapter.write_value(&initial);
        let report = pipeline.evaluate(&FieldState::new(&initial, &initial));

        let shared = Rc::new(Shared {
            state: RefCell::new(State {
                current: initial.clone(),
                initial,
                report,
                pipeline,
                adapter: Some(Rc::clone(&adapter)),
                adapter_subscription: None,
                touched: false,
            }),
            listeners: Listeners::new(),
            max_dispatch_depth: config.max_dispatch_depth,
        });

        let weak: Weak<Shared<T>> = Rc::downgrade(&shared);
        let subscription = adapter.subscribe(Rc::new(move |value: T| {
            if let Some(shared) = weak.upgrade() {
                Field { shared }.commit(value, Source::Adapter);
            }
        }));
        shared.state.borrow_mut().adapter_subscription = Some(subscription);

        Self { shared }
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.shared.state.borrow().current.clone()
    }

    /// Borrow the current value without cloning.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.state.borrow().current)
    }

    /// Value the field was constructed with.
    #[must_use]
    pub fn initial_value(&self) -> T {
        self.shared.state.borrow().initial.clone()
    }

    /// Assign a new value, syncing the bound element.
    pub fn set_value(&self, next: T) {
        self.commit(next, Source::Program);
    }

    /// Restore the initial value through the normal mutation path and clear
    /// the touched flag.
    pub fn reset(&self) {
        let initial = {
            let mut state = self.shared.state.borrow_mut();
            state.touched = false;
            state.initial.clone()
        };
        self.set_value(initial);
    }

    /// `true` iff the last report is empty.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.shared.state.borrow().report.is_empty()
    }

    /// `None` when valid, otherwise the failing entries in pipeline order.
    #[must_use]
    pub fn errors(&self) -> Option<ValidationReport> {
        let state = self.shared.state.borrow();
        if state.report.is_empty() {
            None
        } else {
            Some(state.report.clone())
        }
    }

    /// Re-run the pipeline against the current value without notifying.
    ///
    /// For validators that read state outside the field (for example a
    /// confirmation field comparing against another field).
    ///
    /// When validator panics are not contained, the panicking validator's
    /// execution error is stored before the panic resumes.
    pub fn revalidate(&self) -> bool {
        let (report, unwound) = {
            let state = self.shared.state.borrow();
            state
                .pipeline
                .evaluate_recording(&FieldState::new(&state.current, &state.initial))
        };
        let valid = report.is_empty();
        self.shared.state.borrow_mut().report = report;
        if let Some(payload) = unwound {
            panic::resume_unwind(payload);
        }
        valid
    }

    /// Register a listener for value transitions.
    ///
    /// Never called for the construction-time value. Drop or
    /// [`unsubscribe`](Subscription::unsubscribe) the handle to stop.
    pub fn on_value_change(&self, listener: impl Fn(&ChangeEvent<T>) + 'static) -> Subscription {
        self.shared.listeners.add(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    #[must_use]
    pub fn status(&self) -> FieldStatus {
        let state = self.shared.state.borrow();
        if state.current == state.initial {
            FieldStatus::Clean
        } else {
            FieldStatus::Dirty
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.status() == FieldStatus::Dirty
    }

    /// Whether the element has reported an edit since construction or the
    /// last [`reset`](Self::reset).
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.shared.state.borrow().touched
    }

    /// Whether the field is still synced with its element.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.shared.state.borrow().adapter.is_some()
    }

    /// Drop the adapter binding. The field keeps working as a model-only
    /// cell; nothing flows to or from the element afterwards.
    pub fn release(&self) {
        let (adapter, subscription) = {
            let mut state = self.shared.state.borrow_mut();
            (state.adapter.take(), state.adapter_subscription.take())
        };
        if adapter.is_some() {
            tracing::debug!("field released");
        }
        drop(subscription);
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    fn commit(&self, next: T, source: Source) {
        let (prev, adapter) = {
            let mut state = self.shared.state.borrow_mut();
            if state.current == next {
                return;
            }
            let prev = std::mem::replace(&mut state.current, next.clone());
            let adapter = match source {
                Source::Program => state.adapter.clone(),
                Source::Adapter => {
                    state.touched = true;
                    None
                }
            };
            (prev, adapter)
        };

        if let Some(adapter) = adapter {
            adapter.write_value(&next);
        }

        let valid = self.revalidate();

        let event = ChangeEvent { prev, value: next };
        let guard = DispatchGuard::enter(self.shared.max_dispatch_depth);
        let listeners = self.shared.listeners.emit(&event);
        tracing::trace!(
            source = source.as_str(),
            listeners,
            valid,
            depth = guard.depth(),
            "field value changed"
        );
    }
}

impl<T: fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Field")
            .field("value", &state.current)
            .field("initial", &state.initial)
            .field("errors", &state.report)
            .field("bound", &state.adapter.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Type-erased view used by composites
// ---------------------------------------------------------------------------

pub(crate) type JsonListener = Rc<dyn Fn(&Value, &Value)>;

/// Object-safe view of a `Field<T>` whose value serializes to JSON.
pub(crate) trait ErasedField {
    fn json_value(&self) -> Value;
    fn valid(&self) -> bool;
    fn errors(&self) -> Option<ValidationReport>;
    fn is_dirty(&self) -> bool;
    fn is_touched(&self) -> bool;
    fn reset(&self);
    fn release(&self);
    fn subscribe_json(&self, listener: JsonListener) -> Subscription;
    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "field value is not representable as JSON");
        Value::Null
    })
}

impl<T> ErasedField for Field<T>
where
    T: Clone + PartialEq + Serialize + 'static,
{
    fn json_value(&self) -> Value {
        self.with_value(to_json)
    }

    fn valid(&self) -> bool {
        Field::valid(self)
    }

    fn errors(&self) -> Option<ValidationReport> {
        Field::errors(self)
    }

    fn is_dirty(&self) -> bool {
        Field::is_dirty(self)
    }

    fn is_touched(&self) -> bool {
        Field::is_touched(self)
    }

    fn reset(&self) {
        Field::reset(self);
    }

    fn release(&self) {
        Field::release(self);
    }

    fn subscribe_json(&self, listener: JsonListener) -> Subscription {
        self.on_value_change(move |event| listener(&to_json(&event.prev), &to_json(&event.value)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDom, TextInput};
    use crate::validation::{Outcome, Required, ValidatorExecutionError, try_validator_fn};
    use crate::validators;
    use std::cell::Cell;

    fn text_field(initial: &str) -> (Rc<TextInput>, Field<String>) {
        let input = TextInput::new("");
        let field = Field::new(Rc::clone(&input), initial.to_string(), Vec::new()).unwrap();
        (input, field)
    }

    fn record(field: &Field<String>) -> (Rc<RefCell<Vec<ChangeEvent<String>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = field.on_value_change(move |e| sink.borrow_mut().push(e.clone()));
        (log, sub)
    }

    #[test]
    fn construction_pushes_initial_value_silently() {
        let (input, field) = text_field("John");
        assert_eq!(input.text(), "John");
        assert_eq!(input.write_count(), 1);
        assert_eq!(field.value(), "John");
        assert_eq!(field.status(), FieldStatus::Clean);
        assert!(!field.is_touched());
    }

    #[test]
    fn set_value_writes_validates_then_notifies() {
        let input = TextInput::new("");
        let field = Field::new(
            Rc::clone(&input),
            "x".to_string(),
            validators![Required::new()],
        )
        .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (sink, element, inner) = (Rc::clone(&seen), Rc::clone(&input), field.clone());
        let _sub = field.on_value_change(move |e| {
            // Adapter write and validation are complete before dispatch.
            sink.borrow_mut().push((e.clone(), element.text(), inner.valid()));
        });

        field.set_value(String::new());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            ChangeEvent {
                prev: "x".to_string(),
                value: String::new()
            }
        );
        assert_eq!(seen[0].1, "");
        assert!(!seen[0].2);
    }

    #[test]
    fn equal_assignment_is_noop() {
        let (input, field) = text_field("same");
        let (log, _sub) = record(&field);
        let writes = input.write_count();

        field.set_value(field.value());

        assert_eq!(input.write_count(), writes);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn external_edit_updates_model_without_echo() {
        let (input, field) = text_field("a");
        let (log, _sub) = record(&field);
        let writes = input.write_count();

        input.simulate_input("b");

        assert_eq!(field.value(), "b");
        assert_eq!(input.write_count(), writes);
        assert!(field.is_touched());
        assert_eq!(
            *log.borrow(),
            vec![ChangeEvent {
                prev: "a".to_string(),
                value: "b".to_string()
            }]
        );
    }

    #[test]
    fn reset_is_idempotent() {
        let (_input, field) = text_field("init");
        let (log, _sub) = record(&field);

        field.set_value("changed".to_string());
        field.reset();
        field.reset();

        assert_eq!(field.value(), "init");
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(field.status(), FieldStatus::Clean);
    }

    #[test]
    fn reset_clears_touched() {
        let (input, field) = text_field("");
        input.simulate_input("typed");
        assert!(field.is_touched());
        field.reset();
        assert!(!field.is_touched());
        assert_eq!(input.text(), "");
    }

    #[test]
    fn reset_listeners_see_untouched_field() {
        let (input, field) = text_field("");
        input.simulate_input("typed");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let observer = field.clone();
        let s = Rc::clone(&seen);
        let _sub = field.on_value_change(move |_| s.borrow_mut().push(observer.is_touched()));

        field.reset();
        assert_eq!(*seen.borrow(), vec![false]);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let (_input, field) = text_field("");
        let order = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|i| {
                let o = Rc::clone(&order);
                field.on_value_change(move |_| o.borrow_mut().push(i))
            })
            .collect();

        field.set_value("go".to_string());
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        drop(subs);
        assert_eq!(field.listener_count(), 0);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let (_input, field) = text_field("");
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let sub = field.on_value_change(move |_| c.set(c.get() + 1));

        field.set_value("1".to_string());
        sub.unsubscribe();
        field.set_value("2".to_string());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn listener_may_mutate_same_field() {
        let (input, field) = text_field("");
        let inner = field.clone();
        let _sub = field.on_value_change(move |e| {
            if e.value.len() > 3 {
                inner.set_value(e.value[..3].to_string());
            }
        });

        field.set_value("abcdef".to_string());
        assert_eq!(field.value(), "abc");
        assert_eq!(input.text(), "abc");
    }

    #[test]
    fn failing_validator_still_commits_value() {
        let input = TextInput::new("");
        let field = Field::new(
            Rc::clone(&input),
            String::new(),
            vec![ValidatorSpec::new(try_validator_fn(
                "broken",
                |_: &FieldState<'_, String>| -> Result<Outcome, ValidatorExecutionError> {
                    Err(ValidatorExecutionError::new("no backing data"))
                },
            ))],
        )
        .unwrap();

        field.set_value("v".to_string());
        assert_eq!(field.value(), "v");
        assert!(!field.valid());
        let errors = field.errors().unwrap();
        assert!(errors.iter().all(|f| f.is_execution_error()));
    }

    #[test]
    fn release_stops_sync_both_ways() {
        let (input, field) = text_field("a");
        field.release();
        assert!(!field.is_bound());
        assert_eq!(input.subscriber_count(), 0);

        field.set_value("model".to_string());
        assert_eq!(input.text(), "a");

        input.simulate_input("view");
        assert_eq!(field.value(), "model");
    }

    #[test]
    fn dropping_last_handle_unsubscribes_from_adapter() {
        let (input, field) = text_field("a");
        assert_eq!(input.subscriber_count(), 1);
        drop(field);
        assert_eq!(input.subscriber_count(), 0);
    }

    #[test]
    fn query_binding_resolves_through_dom() {
        let dom = MemoryDom::new();
        let input = dom.insert_text("u", &["name"], "");
        let field = Field::new(
            BindTarget::<String>::query(&dom, "#u"),
            "John".to_string(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(input.text(), "John");
        assert!(field.valid());
        assert!(field.errors().is_none());
    }

    #[test]
    fn revalidate_picks_up_external_state() {
        let limit = Rc::new(Cell::new(10_usize));
        let l = Rc::clone(&limit);
        let (_input, field) = {
            let input = TextInput::new("");
            let field = Field::new(
                Rc::clone(&input),
                "hello".to_string(),
                vec![ValidatorSpec::new(crate::validation::validator_fn(
                    "limit",
                    move |s: &FieldState<'_, String>| {
                        if s.value.len() > l.get() {
                            Outcome::flag()
                        } else {
                            Outcome::Success
                        }
                    },
                ))],
            )
            .unwrap();
            (input, field)
        };
        assert!(field.valid());
        limit.set(2);
        assert!(field.valid());
        assert!(!field.revalidate());
        assert!(!field.valid());
    }

    #[test]
    fn debug_shows_value() {
        let (_input, field) = text_field("dbg");
        let out = format!("{field:?}");
        assert!(out.contains("\"dbg\""));
    }
}
