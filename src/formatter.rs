use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    fmt,
    panic::{self, AssertUnwindSafe},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use crate::{
    cursor::Cursor,
    diagnostics::{Diagnostic, DiagnosticSink},
    error::{ConfigError, MetadataError},
    metadata::LinkingMetadataProvider,
    property::LoggingProperty,
    value::{to_flat_string, to_json, PropertyValue, Visit},
    view::{ExceptionInfo, LogEventView},
};

/// Prefix of user property keys in the [`PropertiesLayout::Prefixed`] layout.
pub const USER_PROPERTY_PREFIX: &str = "Message.Properties.";

/// Key of the user property object in the [`PropertiesLayout::Nested`] layout.
pub const USER_PROPERTIES_KEY: &str = "Message.Properties";

/// How many levels of a structured property value are expanded by default.
pub const DEFAULT_MAX_DEPTH: usize = 1;

/// Where user properties go in the output. In both layouts they cannot clash with intrinsic
/// fields or linking metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropertiesLayout {
    /// `"Message.Properties.<key>": <value>` on the top level.
    #[default]
    Prefixed,
    /// `"Message.Properties": {"<key>": <value>, ...}`, left out if there are no properties.
    Nested,
}

/// Turns a [`LogEventView`] into one line of JSON.
///
/// Fields are written in this order, so a later field wins over an earlier one with the same
/// key for readers that keep the last duplicate:
///
/// 1. intrinsic fields of the event (`timestamp`, `log.level`, `message`, `thread.id`, ...),
/// 2. `error.*` fields if the event carries an exception,
/// 3. user properties, namespaced per [`PropertiesLayout`], and mapped properties,
/// 4. linking metadata, on the top level.
///
/// Formatting a user property or fetching linking metadata may fail; the failure is sent to
/// the [`DiagnosticSink`] and the rest of the line is written as usual.
#[derive(Debug, Clone)]
pub struct EventFormatter {
    layout: PropertiesLayout,
    max_depth: usize,
    mappings: HashMap<String, LoggingProperty>,
    excluded: HashSet<String>,
}

impl Default for EventFormatter {
    fn default() -> Self {
        Self {
            layout: PropertiesLayout::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            mappings: HashMap::new(),
            excluded: HashSet::new(),
        }
    }
}

impl EventFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties_layout(mut self, layout: PropertiesLayout) -> Self {
        self.set_properties_layout(layout);
        self
    }

    /// Sets how many levels of a structured property value are expanded. Deeper values are
    /// written as their string form.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.set_max_depth(max_depth);
        self
    }

    /// Writes the user property `name` to the key of `property` instead of the user property
    /// namespace. The value is written as a string.
    ///
    /// # Errors
    ///
    /// Fails if `property` is [reserved](LoggingProperty::is_reserved) or `name` is blank.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use linking_json_subscriber::{EventFormatter, LoggingProperty};
    ///
    /// let formatter = EventFormatter::new()
    ///     .with_property_mapping("caller", LoggingProperty::MethodName)
    ///     .unwrap();
    ///
    /// assert!(EventFormatter::new()
    ///     .with_property_mapping("text", LoggingProperty::MessageText)
    ///     .is_err());
    /// # drop(formatter);
    /// ```
    pub fn with_property_mapping(
        mut self,
        name: impl Into<String>,
        property: LoggingProperty,
    ) -> Result<Self, ConfigError> {
        self.add_property_mapping(name, property)?;
        Ok(self)
    }

    /// Leaves the user property `name` out of the output altogether, in either layout and even
    /// if it is also mapped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use linking_json_subscriber::{EventFormatter, LogRecord, Severity, Silent};
    ///
    /// let formatter = EventFormatter::new().with_excluded_property("password");
    /// let record = LogRecord::new(Severity::Info, "signed in")
    ///     .with_property("user", "alice")
    ///     .with_property("password", "hunter2");
    ///
    /// let line = formatter.format_to_string(&record, None, &Silent).unwrap();
    /// assert!(line.contains("Message.Properties.user"));
    /// assert!(!line.contains("hunter2"));
    /// ```
    pub fn with_excluded_property(mut self, name: impl Into<String>) -> Self {
        self.add_excluded_property(name);
        self
    }

    pub fn properties_layout(&self) -> PropertiesLayout {
        self.layout
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub(crate) fn set_properties_layout(&mut self, layout: PropertiesLayout) {
        self.layout = layout;
    }

    pub(crate) fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    pub(crate) fn add_property_mapping(
        &mut self,
        name: impl Into<String>,
        property: LoggingProperty,
    ) -> Result<(), ConfigError> {
        if property.is_reserved() {
            return Err(ConfigError::ReservedProperty(property));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyPropertyName);
        }
        self.mappings.insert(name, property);
        Ok(())
    }

    pub(crate) fn add_excluded_property(&mut self, name: impl Into<String>) {
        self.excluded.insert(name.into());
    }

    /// Appends the JSON line for `event`, including the trailing newline, to `writer`.
    ///
    /// `provider` is asked for linking metadata exactly once. On error nothing is appended.
    pub fn format_event<E>(
        &self,
        event: &E,
        provider: Option<&dyn LinkingMetadataProvider>,
        diagnostics: &dyn DiagnosticSink,
        writer: &mut String,
    ) -> fmt::Result
    where
        E: LogEventView + ?Sized,
    {
        let cursor = Cursor::new(writer);

        if self
            .write_document(event, provider, diagnostics, &cursor)
            .is_err()
        {
            cursor.rollback();
            return Err(fmt::Error);
        }
        cursor.push('\n');
        drop(cursor);

        debug_assert!(
            serde_json::from_str::<Value>(writer.lines().last().unwrap_or_default()).is_ok(),
            "[linking-json-subscriber] serialized line is not valid json: {writer}",
        );

        Ok(())
    }

    /// Formats `event` into a new string. See [`format_event`](Self::format_event).
    ///
    /// # Errors
    ///
    /// Fails only if the serializer fails.
    pub fn format_to_string<E>(
        &self,
        event: &E,
        provider: Option<&dyn LinkingMetadataProvider>,
        diagnostics: &dyn DiagnosticSink,
    ) -> Result<String, fmt::Error>
    where
        E: LogEventView + ?Sized,
    {
        let mut line = String::with_capacity(256);
        self.format_event(event, provider, diagnostics, &mut line)?;
        Ok(line)
    }

    fn write_document<E>(
        &self,
        event: &E,
        provider: Option<&dyn LinkingMetadataProvider>,
        diagnostics: &dyn DiagnosticSink,
        cursor: &Cursor<'_>,
    ) -> Result<(), serde_json::Error>
    where
        E: LogEventView + ?Sized,
    {
        let mut serializer = serde_json::Serializer::new(cursor);
        let mut map = serializer.serialize_map(None)?;

        write_intrinsics(&mut map, event)?;
        if let Some(exception) = event.exception() {
            write_exception(&mut map, &exception)?;
        }
        self.write_user_properties(&mut map, event, diagnostics)?;
        if let Some(provider) = provider {
            write_linking_metadata(&mut map, provider, diagnostics)?;
        }

        map.end()
    }

    fn write_user_properties<M, E>(
        &self,
        map: &mut M,
        event: &E,
        diagnostics: &dyn DiagnosticSink,
    ) -> Result<(), M::Error>
    where
        M: SerializeMap,
        E: LogEventView + ?Sized,
    {
        let mut collector = PropertyCollector {
            formatter: self,
            properties: Vec::new(),
            mapped: Vec::new(),
            skipped: Vec::new(),
        };
        event.record_properties(&mut collector);

        match self.layout {
            PropertiesLayout::Prefixed => {
                let mut key = String::from(USER_PROPERTY_PREFIX);
                for (name, value) in &collector.properties {
                    key.truncate(USER_PROPERTY_PREFIX.len());
                    key.push_str(name);
                    map.serialize_entry(&key, value)?;
                }
            },
            PropertiesLayout::Nested => {
                if !collector.properties.is_empty() {
                    map.serialize_entry(
                        USER_PROPERTIES_KEY,
                        &NestedProperties(&collector.properties),
                    )?;
                }
            },
        }

        for (key, value) in &collector.mapped {
            map.serialize_entry(key, value)?;
        }

        for (key, reason) in collector.skipped {
            diagnostics.record(Diagnostic::PropertySkipped { key, reason });
        }

        Ok(())
    }
}

fn write_intrinsics<M, E>(map: &mut M, event: &E) -> Result<(), M::Error>
where
    M: SerializeMap,
    E: LogEventView + ?Sized,
{
    map.serialize_entry(
        LoggingProperty::Timestamp.output_name(),
        &unix_millis(event.timestamp()),
    )?;
    map.serialize_entry(
        LoggingProperty::LogLevel.output_name(),
        &upper_case(event.level()),
    )?;
    if let Some(template) = event.message_template() {
        map.serialize_entry(LoggingProperty::MessageTemplate.output_name(), template)?;
    }
    map.serialize_entry(LoggingProperty::MessageText.output_name(), &event.message())?;
    map.serialize_entry(LoggingProperty::ThreadId.output_name(), &event.thread_id())?;
    if let Some(name) = event.thread_name() {
        map.serialize_entry(LoggingProperty::ThreadName.output_name(), name)?;
    }
    if let Some(pid) = event.process_id() {
        map.serialize_entry(LoggingProperty::ProcessId.output_name(), &pid)?;
    }
    if let Some(logger) = event.logger_name() {
        map.serialize_entry(LoggingProperty::LoggerName.output_name(), logger)?;
    }
    if let Some(correlation_id) = event.correlation_id() {
        map.serialize_entry(
            LoggingProperty::CorrelationId.output_name(),
            &correlation_id,
        )?;
    }

    if let Some(location) = event.location() {
        if let Some(file) = location.file {
            map.serialize_entry(LoggingProperty::FileName.output_name(), file)?;
        }
        if let Some(line) = location.line {
            map.serialize_entry(LoggingProperty::LineNumber.output_name(), &line)?;
        }
        if let Some(namespace) = location.namespace {
            map.serialize_entry(LoggingProperty::Namespace.output_name(), namespace)?;
        }
        if let Some(class) = location.class {
            map.serialize_entry(LoggingProperty::ClassName.output_name(), class)?;
        }
        if let Some(method) = location.method {
            map.serialize_entry(LoggingProperty::MethodName.output_name(), method)?;
        }
    }

    Ok(())
}

fn write_exception<M: SerializeMap>(
    map: &mut M,
    exception: &ExceptionInfo<'_>,
) -> Result<(), M::Error> {
    let class = if exception.class.trim().is_empty() {
        "Error"
    } else {
        &*exception.class
    };
    map.serialize_entry(LoggingProperty::ErrorClass.output_name(), class)?;

    if let Some(message) = non_blank(exception.message.as_deref()) {
        map.serialize_entry(LoggingProperty::ErrorMessage.output_name(), message)?;
    }
    if let Some(stack) = non_blank(exception.stack.as_deref()) {
        map.serialize_entry(LoggingProperty::ErrorStack.output_name(), stack)?;
    }

    Ok(())
}

fn write_linking_metadata<M: SerializeMap>(
    map: &mut M,
    provider: &dyn LinkingMetadataProvider,
    diagnostics: &dyn DiagnosticSink,
) -> Result<(), M::Error> {
    let metadata = match panic::catch_unwind(AssertUnwindSafe(|| provider.linking_metadata())) {
        Ok(Ok(Some(metadata))) => metadata,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(error)) => {
            diagnostics.record(Diagnostic::MetadataFetch(error));
            return Ok(());
        },
        Err(_) => {
            diagnostics.record(Diagnostic::MetadataFetch(Box::new(MetadataError::Panicked)));
            return Ok(());
        },
    };

    for (key, value) in metadata.iter().filter(|(key, _)| !key.is_empty()) {
        map.serialize_entry(key, value)?;
    }

    Ok(())
}

fn unix_millis(timestamp: SystemTime) -> i64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
        Err(before) => {
            i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |millis| -millis)
        },
    }
}

fn upper_case(level: &str) -> Cow<'_, str> {
    if level.bytes().any(|b| b.is_ascii_lowercase()) {
        Cow::Owned(level.to_ascii_uppercase())
    } else {
        Cow::Borrowed(level)
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|text| !text.trim().is_empty())
}

/// Runs a conversion that calls into host code, turning both errors and panics into a reason
/// for skipping the property.
fn contain<T>(convert: impl FnOnce() -> Result<T, fmt::Error>) -> Result<T, &'static str> {
    match panic::catch_unwind(AssertUnwindSafe(convert)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(fmt::Error)) => Err("its value could not be formatted"),
        Err(_) => Err("formatting its value panicked"),
    }
}

struct PropertyCollector<'f> {
    formatter: &'f EventFormatter,
    properties: Vec<(String, Value)>,
    mapped: Vec<(&'static str, String)>,
    skipped: Vec<(String, &'static str)>,
}

impl Visit for PropertyCollector<'_> {
    fn record(&mut self, key: &str, value: PropertyValue<'_>) {
        if key.trim().is_empty() || self.formatter.excluded.contains(key) {
            return;
        }

        let converted = match self.formatter.mappings.get(key).copied() {
            Some(property) => {
                contain(|| to_flat_string(&value))
                    .map(|flat| self.mapped.push((property.output_name(), flat)))
            },
            None => {
                let max_depth = self.formatter.max_depth;
                contain(|| to_json(&value, max_depth))
                    .map(|json| self.properties.push((key.to_owned(), json)))
            },
        };

        if let Err(reason) = converted {
            self.skipped.push((key.to_owned(), reason));
        }
    }
}

struct NestedProperties<'a>(&'a [(String, Value)]);

impl Serialize for NestedProperties<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.0.iter().map(|(key, value)| (key, value)))
    }
}
