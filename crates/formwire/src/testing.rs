#![forbid(unsafe_code)]

//! In-memory presentation layer for tests.
//!
//! [`MemoryElement`] plays the role of a live input element: it stores a
//! native representation, converts it to and from the field's value type via
//! a [`Codec`], counts programmatic writes, and lets tests inject user edits
//! with [`simulate_input`](MemoryElement::simulate_input). [`MemoryDom`] is a
//! selector registry (`#id`, `.class`, `*`) implementing [`Resolve`].
//!
//! Enabled for unit tests and behind the `test-helpers` feature.

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::adapter::{Adapter, Resolve};
use crate::error::BindingError;
use crate::subscription::{Listeners, Subscription};

/// Translation between an element's native state and a field value.
pub trait Codec: 'static {
    type Native: Clone + 'static;
    type Value: Clone + 'static;

    fn decode(native: &Self::Native) -> Self::Value;
    fn encode(value: &Self::Value) -> Self::Native;
}

/// Raw text to `String`.
#[derive(Debug)]
pub struct TextCodec;

impl Codec for TextCodec {
    type Native = String;
    type Value = String;

    fn decode(native: &String) -> String {
        native.clone()
    }

    fn encode(value: &String) -> String {
        value.clone()
    }
}

/// Checked state to `bool`.
#[derive(Debug)]
pub struct CheckCodec;

impl Codec for CheckCodec {
    type Native = bool;
    type Value = bool;

    fn decode(native: &bool) -> bool {
        *native
    }

    fn encode(value: &bool) -> bool {
        *value
    }
}

/// Raw text to `Option<i64>`; unparseable or empty text decodes to `None`.
#[derive(Debug)]
pub struct NumberCodec;

impl Codec for NumberCodec {
    type Native = String;
    type Value = Option<i64>;

    fn decode(native: &String) -> Option<i64> {
        native.trim().parse().ok()
    }

    fn encode(value: &Option<i64>) -> String {
        value.map(|n| n.to_string()).unwrap_or_default()
    }
}

pub type TextInput = MemoryElement<TextCodec>;
pub type Checkbox = MemoryElement<CheckCodec>;
pub type NumberInput = MemoryElement<NumberCodec>;

/// Simulated input element.
pub struct MemoryElement<C: Codec> {
    native: RefCell<C::Native>,
    listeners: Listeners<C::Value>,
    writes: Cell<usize>,
    attached: Cell<bool>,
    echo_writes: Cell<bool>,
}

impl<C: Codec> MemoryElement<C> {
    pub fn new(native: impl Into<C::Native>) -> Rc<Self> {
        Rc::new(Self {
            native: RefCell::new(native.into()),
            listeners: Listeners::new(),
            writes: Cell::new(0),
            attached: Cell::new(true),
            echo_writes: Cell::new(false),
        })
    }

    /// Native state as the user would see it.
    pub fn native(&self) -> C::Native {
        self.native.borrow().clone()
    }

    /// Replace the native state as a user edit and notify subscribers.
    pub fn simulate_input(&self, native: impl Into<C::Native>) {
        let value = {
            let mut slot = self.native.borrow_mut();
            *slot = native.into();
            C::decode(&slot)
        };
        self.listeners.emit(&value);
    }

    /// Number of programmatic writes received.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Mark the element as removed from the presentation layer.
    pub fn detach(&self) {
        self.attached.set(false);
    }

    /// Misbehave by reporting programmatic writes as external edits.
    pub fn set_echo_writes(&self, echo: bool) {
        self.echo_writes.set(echo);
    }
}

impl MemoryElement<TextCodec> {
    pub fn text(&self) -> String {
        self.native()
    }
}

impl MemoryElement<CheckCodec> {
    pub fn is_checked(&self) -> bool {
        self.native()
    }
}

impl<C: Codec> Adapter<C::Value> for MemoryElement<C> {
    fn read_value(&self) -> C::Value {
        C::decode(&self.native.borrow())
    }

    fn write_value(&self, value: &C::Value) {
        *self.native.borrow_mut() = C::encode(value);
        self.writes.set(self.writes.get() + 1);
        if self.echo_writes.get() {
            self.listeners.emit(value);
        }
    }

    fn subscribe(&self, on_external_change: Rc<dyn Fn(C::Value)>) -> Subscription {
        self.listeners
            .add(move |value: &C::Value| on_external_change(value.clone()))
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }
}

impl<C: Codec> fmt::Debug for MemoryElement<C>
where
    C::Native: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement")
            .field("native", &*self.native.borrow())
            .field("writes", &self.writes.get())
            .field("attached", &self.attached.get())
            .finish()
    }
}

struct Entry {
    id: String,
    classes: Vec<String>,
    /// `Rc<dyn Adapter<T>>` for the element's value type.
    adapter: Box<dyn Any>,
}

impl Entry {
    fn matches(&self, selector: &str) -> bool {
        if selector == "*" {
            true
        } else if let Some(class) = selector.strip_prefix('.') {
            self.classes.iter().any(|c| c == class)
        } else {
            self.id == selector.strip_prefix('#').unwrap_or(selector)
        }
    }
}

/// Selector registry over in-memory elements.
#[derive(Default)]
pub struct MemoryDom {
    entries: RefCell<Vec<Entry>>,
}

impl MemoryDom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element under `id` with the given classes.
    pub fn insert<T: 'static>(&self, id: &str, classes: &[&str], adapter: Rc<dyn Adapter<T>>) {
        self.entries.borrow_mut().push(Entry {
            id: id.to_string(),
            classes: classes.iter().map(|c| (*c).to_string()).collect(),
            adapter: Box::new(adapter),
        });
    }

    pub fn insert_text(&self, id: &str, classes: &[&str], text: &str) -> Rc<TextInput> {
        let element = TextInput::new(text);
        self.insert::<String>(id, classes, Rc::clone(&element) as Rc<dyn Adapter<String>>);
        element
    }

    pub fn insert_checkbox(&self, id: &str, classes: &[&str], checked: bool) -> Rc<Checkbox> {
        let element = Checkbox::new(checked);
        self.insert::<bool>(id, classes, Rc::clone(&element) as Rc<dyn Adapter<bool>>);
        element
    }

    pub fn insert_number(&self, id: &str, classes: &[&str], raw: &str) -> Rc<NumberInput> {
        let element = NumberInput::new(raw);
        self.insert::<Option<i64>>(
            id,
            classes,
            Rc::clone(&element) as Rc<dyn Adapter<Option<i64>>>,
        );
        element
    }

    /// Remove every element registered under `id`.
    pub fn remove(&self, id: &str) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<T: 'static> Resolve<T> for MemoryDom {
    fn query_all(&self, selector: &str) -> Result<Vec<Rc<dyn Adapter<T>>>, BindingError> {
        let entries = self.entries.borrow();
        let mut found = Vec::new();
        for entry in entries.iter().filter(|entry| entry.matches(selector)) {
            match entry.adapter.downcast_ref::<Rc<dyn Adapter<T>>>() {
                Some(adapter) => found.push(Rc::clone(adapter)),
                None => {
                    return Err(BindingError::TypeMismatch {
                        selector: selector.to_string(),
                        expected: type_name::<T>(),
                    });
                }
            }
        }
        Ok(found)
    }
}

impl fmt::Debug for MemoryDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_struct("MemoryDom")
            .field(
                "ids",
                &entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_codec_coerces_raw_text() {
        let input = NumberInput::new("42");
        assert_eq!(input.read_value(), Some(42));
        input.write_value(&None);
        assert_eq!(input.native(), "");
        input.write_value(&Some(-7));
        assert_eq!(input.native(), "-7");
        assert_eq!(input.write_count(), 2);
    }

    #[test]
    fn simulate_input_notifies_decoded_value() {
        let input = NumberInput::new("");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = input.subscribe(Rc::new(move |v: Option<i64>| sink.borrow_mut().push(v)));

        input.simulate_input("12");
        input.simulate_input("abc");
        assert_eq!(*seen.borrow(), vec![Some(12), None]);
    }

    #[test]
    fn programmatic_writes_are_silent_by_default() {
        let input = TextInput::new("a");
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _sub = input.subscribe(Rc::new(move |_: String| c.set(c.get() + 1)));

        input.write_value(&"b".to_string());
        assert_eq!(count.get(), 0);
        input.set_echo_writes(true);
        input.write_value(&"c".to_string());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dom_selectors() {
        let dom = MemoryDom::new();
        dom.insert_text("u", &["field"], "");
        dom.insert_text("p", &["field", "secret"], "");
        dom.insert_checkbox("agree", &[], false);

        let q = |s: &str| Resolve::<String>::query_all(&dom, s).map(|v| v.len());
        assert_eq!(q("#u"), Ok(1));
        assert_eq!(q("p"), Ok(1));
        assert_eq!(q(".field"), Ok(2));
        assert_eq!(q(".secret"), Ok(1));
        assert_eq!(q("#missing"), Ok(0));
        assert!(matches!(
            q("#agree"),
            Err(BindingError::TypeMismatch { .. })
        ));
        assert_eq!(
            Resolve::<bool>::query_all(&dom, "#agree").map(|v| v.len()),
            Ok(1)
        );

        assert_eq!(dom.remove("u"), 1);
        assert_eq!(q("#u"), Ok(0));
        assert_eq!(dom.len(), 2);
    }
}
