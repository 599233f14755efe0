//! JSON log lines enriched with linking metadata.
//!
//! Every event becomes one line of JSON with a fixed set of well-known fields (`timestamp`,
//! `log.level`, `message`, `thread.id`, ...), the user-supplied properties of the event under a
//! `Message.Properties` namespace, and the linking metadata supplied by a monitoring agent on the
//! top level so that log lines can be correlated with distributed traces.
//!
//! The formatting itself is done by [`EventFormatter`], which reads events through the
//! [`LogEventView`] trait. Two adapters are provided: [`JsonLayer`] for `tracing` and
//! [`LogRecord`] for events built in code.
//!
//! ```rust
//! use linking_json_subscriber::{BoxError, LinkingMetadata};
//!
//! linking_json_subscriber::fmt()
//!     .with_linking_metadata(|| -> Result<Option<LinkingMetadata>, BoxError> {
//!         let mut metadata = LinkingMetadata::new();
//!         metadata.insert("trace.id".to_owned(), Some("0af7651916cd43dd".to_owned()));
//!         Ok(Some(metadata))
//!     })
//!     .init();
//!
//! tracing::info!(order = 42, "order shipped");
//! ```
//!
//! # Feature flags
//!
//! - `tracing-log`: events from the `log` crate get their original target and location.
//! - `env-filter`: [`SubscriberBuilder::with_env_filter`] and `RUST_LOG` directives in
//!   [`init`].

mod builder;
mod cursor;
mod diagnostics;
mod error;
mod fmt;
mod formatter;
pub mod layer;
mod metadata;
mod property;
mod record;
mod value;
mod view;
mod visitor;

#[cfg(test)]
mod tests;

pub use builder::SubscriberBuilder;
pub use diagnostics::{Diagnostic, DiagnosticSink, Silent, Stderr};
pub use error::{BoxError, ConfigError, MetadataError};
pub use fmt::{fmt, init, layer, try_init};
pub use formatter::{
    EventFormatter,
    PropertiesLayout,
    DEFAULT_MAX_DEPTH,
    USER_PROPERTIES_KEY,
    USER_PROPERTY_PREFIX,
};
pub use layer::JsonLayer;
pub use metadata::{LazyAgent, LinkingMetadata, LinkingMetadataProvider};
pub use property::LoggingProperty;
pub use record::{ExceptionRecord, LogRecord};
pub use value::{PropertyValue, Structured, Visit};
pub use view::{current_thread_id, ExceptionInfo, Identity, LogEventView, Severity, SourceLocation};
