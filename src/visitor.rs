use std::{borrow::Cow, error::Error, fmt};

use serde_json::Value;
use tracing_core::field;

use crate::view::{error_chain, error_class, ExceptionInfo};

const MESSAGE_FIELD: &str = "message";

/// Collects the fields of a `tracing` event.
///
/// The `message` field becomes the message and the first field recorded as an error becomes
/// the exception. Everything else is a user property.
#[derive(Debug, Default)]
pub(crate) struct EventVisitor {
    pub(crate) message: Option<String>,
    pub(crate) exception: Option<ExceptionInfo<'static>>,
    pub(crate) properties: Vec<(&'static str, Value)>,
}

impl EventVisitor {
    fn insert(&mut self, field: &field::Field, value: impl FnOnce() -> Value) {
        match field.name() {
            // Skip fields that are actually log metadata that have already been handled
            #[cfg(feature = "tracing-log")]
            name if name.starts_with("log.") => (),
            name => {
                let name = name.strip_prefix("r#").unwrap_or(name);
                self.properties.push((name, value()));
            },
        }
    }
}

impl field::Visit for EventVisitor {
    fn record_f64(&mut self, field: &field::Field, value: f64) {
        self.insert(field, || Value::from(value));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.insert(field, || Value::from(value));
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.insert(field, || Value::from(value));
    }

    fn record_i128(&mut self, field: &field::Field, value: i128) {
        self.insert(field, || {
            i64::try_from(value).map_or_else(|_| Value::from(value.to_string()), Value::from)
        });
    }

    fn record_u128(&mut self, field: &field::Field, value: u128) {
        self.insert(field, || {
            u64::try_from(value).map_or_else(|_| Value::from(value.to_string()), Value::from)
        });
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.insert(field, || Value::from(value));
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_owned());
        } else {
            self.insert(field, || Value::from(value));
        }
    }

    fn record_error(&mut self, field: &field::Field, value: &(dyn Error + 'static)) {
        if self.exception.is_none() {
            self.exception = Some(ExceptionInfo {
                class: Cow::Owned(error_class(value)),
                message: Some(Cow::Owned(value.to_string())),
                stack: error_chain(value).map(Cow::Owned),
            });
        } else {
            self.insert(field, || Value::from(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field, || Value::from(format!("{value:?}")));
        }
    }
}
