#![forbid(unsafe_code)]

//! Boundary contract with the presentation layer.
//!
//! The engine never renders or looks elements up itself. It talks to an
//! element only through [`Adapter`], and turns a reference into an adapter
//! only through [`BindTarget::resolve`], which delegates selector queries to
//! a [`Resolve`] implementation supplied by the presentation layer.
//!
//! Adapters own coercion between their native representation (raw text,
//! checked state, selected index) and the field's value type `T`.

use std::rc::Rc;

use crate::error::BindingError;
use crate::subscription::Subscription;

/// A live presentation element holding a value of type `T`.
///
/// `write_value` is a programmatic write and must not be reported back
/// through `subscribe`; only edits that originate outside the engine (user
/// input) are. Adapters that do echo writes are tolerated: the echoed value
/// equals the field's value and is dropped as a no-op.
pub trait Adapter<T> {
    /// Current externally visible value.
    fn read_value(&self) -> T;

    /// Replace the externally visible value.
    fn write_value(&self, value: &T);

    /// Register for externally sourced edits.
    fn subscribe(&self, on_external_change: Rc<dyn Fn(T)>) -> Subscription;

    /// Whether the element is still part of the presentation layer.
    fn is_attached(&self) -> bool {
        true
    }
}

/// Selector lookup provided by the presentation layer.
pub trait Resolve<T> {
    /// Every element matching `selector` that carries `T` values.
    ///
    /// Implementations report a matching element of another value type as
    /// [`BindingError::TypeMismatch`].
    fn query_all(&self, selector: &str) -> Result<Vec<Rc<dyn Adapter<T>>>, BindingError>;
}

/// Reference to the element a field binds to.
pub enum BindTarget<'a, T> {
    /// An already resolved element.
    Handle(Rc<dyn Adapter<T>>),
    /// A selector to resolve through the presentation layer.
    Query {
        resolver: &'a dyn Resolve<T>,
        selector: String,
    },
}

impl<'a, T> BindTarget<'a, T> {
    pub fn handle(adapter: Rc<dyn Adapter<T>>) -> Self {
        Self::Handle(adapter)
    }

    pub fn query(resolver: &'a dyn Resolve<T>, selector: impl Into<String>) -> Self {
        Self::Query {
            resolver,
            selector: selector.into(),
        }
    }

    /// Resolve to exactly one attached element.
    ///
    /// Detached query matches are not counted. A query whose only matches
    /// are detached fails with [`BindingError::Detached`].
    pub fn resolve(self) -> Result<Rc<dyn Adapter<T>>, BindingError> {
        match self {
            Self::Handle(adapter) => {
                if adapter.is_attached() {
                    Ok(adapter)
                } else {
                    Err(BindingError::Detached)
                }
            }
            Self::Query { resolver, selector } => {
                let found = resolver.query_all(&selector)?;
                let any_found = !found.is_empty();
                let mut matches: Vec<_> = found
                    .into_iter()
                    .filter(|adapter| adapter.is_attached())
                    .collect();
                match matches.len() {
                    0 if any_found => Err(BindingError::Detached),
                    0 => Err(BindingError::NotFound { selector }),
                    1 => Ok(matches.remove(0)),
                    n => Err(BindingError::Ambiguous {
                        selector,
                        matches: n,
                    }),
                }
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Handle(_) => "<handle>".to_string(),
            Self::Query { selector, .. } => selector.clone(),
        }
    }
}

impl<T, A> From<Rc<A>> for BindTarget<'_, T>
where
    A: Adapter<T> + 'static,
{
    fn from(adapter: Rc<A>) -> Self {
        Self::Handle(adapter)
    }
}

impl<T> std::fmt::Debug for BindTarget<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle(_) => f.write_str("BindTarget::Handle"),
            Self::Query { selector, .. } => f
                .debug_struct("BindTarget::Query")
                .field("selector", selector)
                .finish(),
        }
    }
}
