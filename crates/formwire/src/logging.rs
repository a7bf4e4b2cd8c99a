#![forbid(unsafe_code)]

//! Logging support.
//!
//! The engine emits `tracing` events under the `formwire` target:
//!
//! | Level   | Event                                                        |
//! |---------|--------------------------------------------------------------|
//! | `debug` | field bound or released, composite built or rejected         |
//! | `trace` | every committed change (`source`, `listeners`, `valid`)      |
//! | `warn`  | validator execution error, unserializable value, deep nesting |
//!
//! Applications install their own subscriber. With the `tracing-json`
//! feature, [`init`] installs a JSON formatter filtered by `RUST_LOG`
//! (default `formwire=info`).

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "formwire=info";

/// Install a global JSON subscriber.
///
/// Fails if a global subscriber is already set.
#[cfg(feature = "tracing-json")]
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    init_with_filter(None)
}

/// Install a global JSON subscriber with explicit filter directives,
/// falling back to `RUST_LOG` and then [`DEFAULT_FILTER`].
#[cfg(feature = "tracing-json")]
pub fn init_with_filter(
    directives: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use tracing_subscriber::EnvFilter;

    let filter = match directives {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}
