//! An owned log event for hosts that have no event type of their own.

use std::{borrow::Cow, error::Error, fmt, sync::Arc, thread, time::SystemTime};

use serde_json::Value;

use crate::{
    value::{PropertyValue, Structured, Visit},
    view::{
        current_thread_id,
        error_chain,
        Identity,
        ExceptionInfo,
        LogEventView,
        Severity,
        SourceLocation,
    },
};

/// A log event built in code.
///
/// [`LogRecord::new`] captures the current time, thread and process; everything else is
/// optional.
///
/// # Examples
///
/// ```rust
/// use linking_json_subscriber::{EventFormatter, LogRecord, Severity, Silent};
///
/// let record = LogRecord::new(Severity::Info, "order 42 shipped")
///     .with_template("order {id} shipped")
///     .with_logger_name("shop::orders")
///     .with_property("id", 42);
///
/// let line = EventFormatter::new()
///     .format_to_string(&record, None, &Silent)
///     .unwrap();
/// assert!(line.contains(r#""Message.Properties.id":42"#));
/// ```
#[derive(Clone)]
pub struct LogRecord {
    timestamp: SystemTime,
    severity: Severity,
    message: String,
    template: Option<String>,
    thread_id: Identity<'static>,
    thread_name: Option<String>,
    process_id: u32,
    logger_name: Option<String>,
    correlation_id: Option<String>,
    file: Option<String>,
    line: Option<u32>,
    namespace: Option<String>,
    class: Option<String>,
    method: Option<String>,
    exception: Option<ExceptionRecord>,
    properties: Vec<(String, RecordValue)>,
}

#[derive(Clone)]
enum RecordValue {
    Json(Value),
    Structured(Arc<dyn Structured + Send + Sync>),
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            severity,
            message: message.into(),
            template: None,
            thread_id: current_thread_id(),
            thread_name: thread::current().name().map(str::to_owned),
            process_id: std::process::id(),
            logger_name: None,
            correlation_id: None,
            file: None,
            line: None,
            namespace: None,
            class: None,
            method: None,
            exception: None,
            properties: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_class_name(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_method_name(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionRecord) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Adds a user property. A later property with the same key replaces the earlier one.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push_property(key.into(), RecordValue::Json(value.into()));
        self
    }

    /// Adds a user property that is expanded member by member.
    pub fn with_structured_property(
        mut self,
        key: impl Into<String>,
        value: Arc<dyn Structured + Send + Sync>,
    ) -> Self {
        self.push_property(key.into(), RecordValue::Structured(value));
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    fn push_property(&mut self, key: String, value: RecordValue) {
        match self.properties.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key, value)),
        }
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("timestamp", &self.timestamp)
            .field("severity", &self.severity)
            .field("message", &self.message)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

impl LogEventView for LogRecord {
    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn level(&self) -> &str {
        self.severity.as_str()
    }

    fn message(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.message)
    }

    fn message_template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    fn thread_id(&self) -> Identity<'_> {
        self.thread_id.clone()
    }

    fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.process_id)
    }

    fn logger_name(&self) -> Option<&str> {
        self.logger_name.as_deref()
    }

    fn correlation_id(&self) -> Option<Cow<'_, str>> {
        self.correlation_id.as_deref().map(Cow::Borrowed)
    }

    fn location(&self) -> Option<SourceLocation<'_>> {
        let location = SourceLocation {
            file: self.file.as_deref(),
            line: self.line,
            namespace: self.namespace.as_deref(),
            class: self.class.as_deref(),
            method: self.method.as_deref(),
        };
        (location != SourceLocation::default()).then_some(location)
    }

    fn exception(&self) -> Option<ExceptionInfo<'_>> {
        self.exception.as_ref().map(|exception| {
            ExceptionInfo {
                class: Cow::Borrowed(&exception.class),
                message: exception.message.as_deref().map(Cow::Borrowed),
                stack: exception.stack.as_deref().map(Cow::Borrowed),
            }
        })
    }

    fn record_properties(&self, visitor: &mut dyn Visit) {
        for (key, value) in &self.properties {
            match value {
                RecordValue::Json(value) => visitor.record(key, PropertyValue::Json(value)),
                RecordValue::Structured(value) => {
                    visitor.record(key, PropertyValue::Structured(&**value))
                },
            }
        }
    }
}

/// The exception attached to a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord {
    class: String,
    message: Option<String>,
    stack: Option<String>,
}

impl ExceptionRecord {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: None,
            stack: None,
        }
    }

    /// Describes `error` by its type name, its `Display` text and its chain of sources.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: Error + 'static,
    {
        Self {
            class: std::any::type_name::<E>().to_owned(),
            message: Some(error.to_string()),
            stack: error_chain(error),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt, io, sync::Arc};

    use serde_json::json;

    use super::{ExceptionRecord, LogRecord};
    use crate::{
        formatter::EventFormatter,
        value::{Structured, Visit},
        view::{LogEventView, Severity},
        Silent,
    };

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn exception_from_error() {
        let error = Wrapped(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        let exception = ExceptionRecord::from_error(&error);

        assert!(exception.class.ends_with("Wrapped"));
        assert_eq!(exception.message.as_deref(), Some("request failed"));
        assert_eq!(exception.stack.as_deref(), Some("caused by: timed out"));
    }

    #[test]
    fn later_property_replaces_earlier() {
        let record = LogRecord::new(Severity::Debug, "twice")
            .with_property("key", 1)
            .with_property("key", 2);

        let line = EventFormatter::new()
            .format_to_string(&record, None, &Silent)
            .unwrap();
        assert_eq!(line.matches("Message.Properties.key").count(), 1);
        assert!(line.contains(r#""Message.Properties.key":2"#));
    }

    #[test]
    fn no_location_without_source_data() {
        let record = LogRecord::new(Severity::Info, "plain");
        assert!(record.location().is_none());
        assert!(record.exception().is_none());
        assert_eq!(record.level(), "INFO");

        let record = record.with_method_name("main");
        assert_eq!(record.location().unwrap().method, Some("main"));
    }

    struct Point {
        x: i64,
        y: i64,
    }

    impl fmt::Display for Point {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({}, {})", self.x, self.y)
        }
    }

    impl Structured for Point {
        fn record(&self, visitor: &mut dyn Visit) {
            visitor.record("x", self.x.into());
            visitor.record("y", self.y.into());
        }
    }

    #[test]
    fn structured_property() {
        let record = LogRecord::new(Severity::Info, "moved")
            .with_structured_property("to", Arc::new(Point { x: 1, y: -2 }));

        let line = EventFormatter::new()
            .with_max_depth(0)
            .format_to_string(&record, None, &Silent)
            .unwrap();
        let output: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(output["Message.Properties.to"], json!("(1, -2)"));

        let line = EventFormatter::new()
            .format_to_string(&record, None, &Silent)
            .unwrap();
        let output: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(output["Message.Properties.to"], json!({"x": 1, "y": -2}));
    }
}
