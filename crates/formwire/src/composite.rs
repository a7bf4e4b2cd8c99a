#![forbid(unsafe_code)]

//! Named groups of fields.
//!
//! A [`Composite`] holds a fixed, ordered set of members, each either a
//! [`Field`] or a nested `Composite`. Its value is derived on demand as a JSON
//! object (member order preserved), its validity is the AND of its members,
//! and every member change is re-broadcast as a whole-object
//! [`ChangeEvent<Value>`].
//!
//! The member set is fixed at [`build`](CompositeBuilder::build) time.
//! Members keep working on their own; the composite only listens.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::adapter::BindTarget;
use crate::config::EngineConfig;
use crate::error::{BindingError, FormError};
use crate::field::{ChangeEvent, ErasedField, Field};
use crate::subscription::{DispatchGuard, Listeners, Subscription};
use crate::validation::{ValidationReport, ValidatorSpec};

#[derive(Clone)]
enum ControlKind {
    Field(Rc<dyn ErasedField>),
    Group(Composite),
}

/// One member of a [`Composite`].
#[derive(Clone)]
pub struct Control {
    kind: ControlKind,
    owned: bool,
}

impl Control {
    fn field<T>(field: Field<T>) -> Self
    where
        T: Clone + PartialEq + Serialize + 'static,
    {
        Self {
            kind: ControlKind::Field(Rc::new(field)),
            owned: false,
        }
    }

    fn group(group: Composite) -> Self {
        Self {
            kind: ControlKind::Group(group),
            owned: false,
        }
    }

    fn owned(self) -> Self {
        Self {
            owned: true,
            ..self
        }
    }

    /// Current value as JSON.
    #[must_use]
    pub fn value(&self) -> Value {
        match &self.kind {
            ControlKind::Field(field) => field.json_value(),
            ControlKind::Group(group) => group.value(),
        }
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        match &self.kind {
            ControlKind::Field(field) => field.valid(),
            ControlKind::Group(group) => group.valid(),
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match &self.kind {
            ControlKind::Field(field) => field.is_dirty(),
            ControlKind::Group(group) => group.is_dirty(),
        }
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        match &self.kind {
            ControlKind::Field(field) => field.is_touched(),
            ControlKind::Group(group) => group.is_touched(),
        }
    }

    pub fn reset(&self) {
        match &self.kind {
            ControlKind::Field(field) => field.reset(),
            ControlKind::Group(group) => group.reset(),
        }
    }

    /// Release this member's adapter binding, or every binding a group
    /// owns.
    pub fn release(&self) {
        match &self.kind {
            ControlKind::Field(field) => field.release(),
            ControlKind::Group(group) => group.release(),
        }
    }

    /// `true` for fields the enclosing composite constructed itself.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Typed handle to the underlying field; `None` for groups or when `T`
    /// is not the field's value type.
    #[must_use]
    pub fn as_field<T: 'static>(&self) -> Option<Field<T>> {
        match &self.kind {
            ControlKind::Field(field) => field.as_any().downcast_ref::<Field<T>>().cloned(),
            ControlKind::Group(_) => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&Composite> {
        match &self.kind {
            ControlKind::Group(group) => Some(group),
            ControlKind::Field(_) => None,
        }
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, ControlKind::Group(_))
    }

    fn subscribe(&self, listener: impl Fn(&Value, &Value) + 'static) -> Subscription {
        match &self.kind {
            ControlKind::Field(field) => field.subscribe_json(Rc::new(listener)),
            ControlKind::Group(group) => {
                group.on_value_change(move |event| listener(&event.prev, &event.value))
            }
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_group() { "group" } else { "field" };
        f.debug_struct("Control")
            .field("kind", &kind)
            .field("value", &self.value())
            .field("valid", &self.valid())
            .finish()
    }
}

/// Ordered `name -> Control` mapping of a composite.
#[derive(Clone, Default)]
pub struct Controls {
    members: Vec<(String, Control)>,
}

impl Controls {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Control> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, control)| control)
    }

    /// Typed field handle; mutating it drives the owning composite.
    #[must_use]
    pub fn field<T: 'static>(&self, name: &str) -> Option<Field<T>> {
        self.get(name).and_then(Control::as_field)
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Composite> {
        self.get(name).and_then(Control::as_group)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Control)> {
        self.members
            .iter()
            .map(|(name, control)| (name.as_str(), control))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Fresh JSON object of every member value, in member order.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.members
            .iter()
            .map(|(name, control)| (name.clone(), control.value()))
            .collect()
    }
}

impl fmt::Debug for Controls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

struct CompositeShared {
    controls: Controls,
    listeners: Listeners<ChangeEvent<Value>>,
    member_subscriptions: RefCell<Vec<Subscription>>,
    max_dispatch_depth: usize,
}

/// Fixed, ordered group of fields and nested composites.
#[derive(Clone)]
pub struct Composite {
    shared: Rc<CompositeShared>,
}

impl Composite {
    #[must_use]
    pub fn builder() -> CompositeBuilder {
        CompositeBuilder::default()
    }

    fn assemble(controls: Controls, config: &EngineConfig) -> Self {
        let shared = Rc::new(CompositeShared {
            controls,
            listeners: Listeners::new(),
            member_subscriptions: RefCell::new(Vec::new()),
            max_dispatch_depth: config.max_dispatch_depth,
        });

        let subscriptions: Vec<Subscription> = shared
            .controls
            .members
            .iter()
            .map(|(name, control)| {
                let weak: Weak<CompositeShared> = Rc::downgrade(&shared);
                let name = name.clone();
                control.subscribe(move |prev, value| {
                    if let Some(shared) = weak.upgrade() {
                        Composite { shared }.member_changed(&name, prev, value);
                    }
                })
            })
            .collect();
        *shared.member_subscriptions.borrow_mut() = subscriptions;

        Self { shared }
    }

    /// Freshly derived object of member values.
    #[must_use]
    pub fn value(&self) -> Value {
        Value::Object(self.shared.controls.snapshot())
    }

    /// AND over all members; an empty composite is valid.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.shared.controls.members.iter().all(|(_, c)| c.valid())
    }

    /// Live member mapping.
    #[must_use]
    pub fn controls(&self) -> &Controls {
        &self.shared.controls
    }

    /// Shorthand for `controls().field::<T>(name)`.
    #[must_use]
    pub fn field<T: 'static>(&self, name: &str) -> Option<Field<T>> {
        self.shared.controls.field(name)
    }

    /// Shorthand for `controls().group(name)`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Composite> {
        self.shared.controls.group(name)
    }

    /// Register a listener for whole-object snapshots.
    ///
    /// Fires once per member change, with `prev` holding the object just
    /// before that change and `value` just after.
    pub fn on_value_change(
        &self,
        listener: impl Fn(&ChangeEvent<Value>) + 'static,
    ) -> Subscription {
        self.shared.listeners.add(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Reports of every invalid leaf field, keyed by dotted path.
    #[must_use]
    pub fn errors(&self) -> Vec<(String, ValidationReport)> {
        let mut out = Vec::new();
        for (name, control) in &self.shared.controls.members {
            match &control.kind {
                ControlKind::Field(field) => {
                    if let Some(report) = field.errors() {
                        out.push((name.clone(), report));
                    }
                }
                ControlKind::Group(group) => {
                    out.extend(
                        group
                            .errors()
                            .into_iter()
                            .map(|(path, report)| (format!("{name}.{path}"), report)),
                    );
                }
            }
        }
        out
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.controls.members.iter().any(|(_, c)| c.is_dirty())
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.shared.controls.members.iter().any(|(_, c)| c.is_touched())
    }

    /// Reset every member in order. Each member that actually changes
    /// produces its own change event.
    pub fn reset(&self) {
        for (_, control) in &self.shared.controls.members {
            control.reset();
        }
    }

    /// Release the adapter bindings of the fields this composite
    /// constructed, recursing into nested groups.
    ///
    /// Fields added with [`CompositeBuilder::field`] stay bound; they may
    /// be shared with other composites.
    pub fn release(&self) {
        for (_, control) in &self.shared.controls.members {
            match &control.kind {
                ControlKind::Field(field) if control.owned => field.release(),
                ControlKind::Field(_) => {}
                ControlKind::Group(group) => group.release(),
            }
        }
        tracing::debug!(members = self.len(), "composite released");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.controls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.controls.is_empty()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    fn member_changed(&self, name: &str, member_prev: &Value, member_value: &Value) {
        let mut value = self.shared.controls.snapshot();
        value.insert(name.to_string(), member_value.clone());
        let mut prev = value.clone();
        prev.insert(name.to_string(), member_prev.clone());
        if prev == value {
            return;
        }

        let event = ChangeEvent {
            prev: Value::Object(prev),
            value: Value::Object(value),
        };
        let guard = DispatchGuard::enter(self.shared.max_dispatch_depth);
        let listeners = self.shared.listeners.emit(&event);
        tracing::trace!(
            member = name,
            listeners,
            depth = guard.depth(),
            "composite value changed"
        );
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("controls", &self.shared.controls)
            .finish()
    }
}

type Bind = Box<dyn FnOnce(&EngineConfig) -> Control>;

enum Pending {
    Ready(Control),
    Bind(Result<Bind, BindingError>),
}

/// Declares the members of a [`Composite`].
///
/// Selector resolution happens as members are declared; nothing touches an
/// element until [`build`](Self::build) has checked every member, so a failed
/// build leaves all elements untouched.
#[derive(Default)]
pub struct CompositeBuilder {
    members: Vec<(String, Pending)>,
    config: Option<EngineConfig>,
}

impl CompositeBuilder {
    /// Add an existing field. The field may be shared with other composites.
    #[must_use]
    pub fn field<T>(mut self, name: impl Into<String>, field: Field<T>) -> Self
    where
        T: Clone + PartialEq + Serialize + 'static,
    {
        self.members
            .push((name.into(), Pending::Ready(Control::field(field))));
        self
    }

    /// Declare a field to be constructed and owned by the composite.
    #[must_use]
    pub fn bind<'a, T>(
        mut self,
        name: impl Into<String>,
        target: impl Into<BindTarget<'a, T>>,
        initial: T,
        validators: impl IntoIterator<Item = ValidatorSpec<T>>,
    ) -> Self
    where
        T: Clone + PartialEq + Serialize + 'static,
    {
        let validators: Vec<ValidatorSpec<T>> = validators.into_iter().collect();
        let resolved = target.into().resolve().map(|adapter| {
            let bind: Bind = Box::new(move |config: &EngineConfig| {
                Control::field(Field::from_adapter(adapter, initial, validators, config))
                    .owned()
            });
            bind
        });
        self.members.push((name.into(), Pending::Bind(resolved)));
        self
    }

    /// Nest a composite.
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, group: Composite) -> Self {
        self.members
            .push((name.into(), Pending::Ready(Control::group(group))));
        self
    }

    /// Use `config` instead of [`EngineConfig::global`] for owned fields and
    /// the composite's own dispatch.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Check every member, then construct owned fields in declaration order.
    ///
    /// The first duplicate name or unresolvable target, in declaration
    /// order, is reported.
    pub fn build(self) -> Result<Composite, FormError> {
        let Self { members, config } = self;

        let mut seen = HashSet::new();
        for (name, pending) in &members {
            if !seen.insert(name.as_str()) {
                tracing::debug!(member = %name, "composite build rejected duplicate member");
                return Err(FormError::DuplicateMember(name.clone()));
            }
            if let Pending::Bind(Err(source)) = pending {
                tracing::debug!(member = %name, error = %source, "composite member binding failed");
                return Err(FormError::Binding {
                    member: name.clone(),
                    source: source.clone(),
                });
            }
        }

        let config = match config.as_ref() {
            Some(config) => config,
            None => EngineConfig::global(),
        };
        let members = members
            .into_iter()
            .filter_map(|(name, pending)| {
                let control = match pending {
                    Pending::Ready(control) => control,
                    Pending::Bind(Ok(bind)) => bind(config),
                    Pending::Bind(Err(_)) => return None,
                };
                Some((name, control))
            })
            .collect();
        let composite = Composite::assemble(Controls { members }, config);
        tracing::debug!(
            members = composite.len(),
            valid = composite.valid(),
            "composite built"
        );
        Ok(composite)
    }
}

impl fmt::Debug for CompositeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBuilder")
            .field(
                "members",
                &self.members.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}
