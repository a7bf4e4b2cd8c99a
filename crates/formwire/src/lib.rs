#![forbid(unsafe_code)]

//! Formwire: reactive value binding, validation pipelines, and form
//! aggregation.
//!
//! - [`Field<T>`] keeps one value in sync with one presentation element
//!   through an [`Adapter`], re-validates on every change, and notifies
//!   listeners.
//! - [`Pipeline`](validation::Pipeline) runs validators in declaration order
//!   and reports every failure as data.
//! - [`Composite`] groups fields and nested composites under names, derives
//!   a JSON object value and an AND validity, and re-broadcasts member
//!   changes.
//!
//! Everything is single-threaded and synchronous: handles are `Rc`-based and
//! listeners run on the caller's stack.
//!
//! # Example
//!
//! ```rust
//! use formwire::testing::MemoryDom;
//! use formwire::validation::Required;
//! use formwire::{BindTarget, Composite, validators};
//! use serde_json::json;
//!
//! let dom = MemoryDom::new();
//! dom.insert_text("u", &[], "");
//! let password = dom.insert_text("p", &[], "");
//!
//! let form = Composite::builder()
//!     .bind("username", BindTarget::<String>::query(&dom, "#u"), "John".to_string(), Vec::new())
//!     .bind("password", BindTarget::<String>::query(&dom, "#p"), String::new(), validators![Required::new()])
//!     .build()?;
//! assert!(!form.valid());
//!
//! password.simulate_input("hunter2");
//! assert!(form.valid());
//! assert_eq!(form.value(), json!({ "username": "John", "password": "hunter2" }));
//! # Ok::<(), formwire::FormError>(())
//! ```

pub mod adapter;
pub mod composite;
pub mod config;
pub mod error;
pub mod field;
pub mod logging;
pub mod subscription;
pub mod validation;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use adapter::{Adapter, BindTarget, Resolve};
pub use composite::{Composite, CompositeBuilder, Control, Controls};
pub use config::{EngineConfig, EngineConfigError};
pub use error::{BindingError, FormError};
pub use field::{ChangeEvent, Field, FieldStatus};
pub use subscription::Subscription;
pub use validation::{
    FieldState, Outcome, ValidationFailure, ValidationReport, Validator, ValidatorExecutionError,
    ValidatorSpec,
};
