use std::{error::Error, io};

use tracing::Subscriber;
use tracing_core::LevelFilter;
#[cfg(feature = "env-filter")]
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{
    fmt::{MakeWriter, TestWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Registry,
};

use crate::{
    diagnostics::DiagnosticSink,
    error::{BoxError, ConfigError},
    formatter::PropertiesLayout,
    layer::JsonLayer,
    metadata::LinkingMetadataProvider,
    property::LoggingProperty,
};

/// Configures and constructs a [`Subscriber`] that writes JSON lines with linking metadata.
///
/// Every setting of [`JsonLayer`] is available here, plus the level filter.
pub struct SubscriberBuilder<W = fn() -> io::Stdout> {
    layer: JsonLayer<Registry, W>,
    max_level: LevelFilter,
    #[cfg(feature = "env-filter")]
    env_filter: Option<EnvFilter>,
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self {
            layer: JsonLayer::stdout(),
            max_level: LevelFilter::INFO,
            #[cfg(feature = "env-filter")]
            env_filter: None,
        }
    }
}

impl<W> SubscriberBuilder<W>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    /// Finish the builder, returning a new [`Subscriber`] which can be used to
    /// [lookup spans](LookupSpan).
    pub fn finish(self) -> impl Subscriber + for<'a> LookupSpan<'a> {
        let subscriber = tracing_subscriber::registry()
            .with(self.layer)
            .with(self.max_level);

        #[cfg(feature = "env-filter")]
        let subscriber = subscriber.with(self.env_filter);

        subscriber
    }

    /// Install this Subscriber as the global default if one is
    /// not already set.
    ///
    /// If the `tracing-log` feature is enabled, this will also install
    /// the `LogTracer` to convert `log` records into `tracing` `Event`s.
    ///
    /// # Errors
    /// Returns an Error if the initialization was unsuccessful, likely
    /// because a global subscriber was already installed by another
    /// call to `try_init`.
    pub fn try_init(self) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
        self.finish().try_init().map_err(Into::into)
    }

    /// Install this Subscriber as the global default.
    ///
    /// If the `tracing-log` feature is enabled, this will also install
    /// the `LogTracer` to convert `log` records into `tracing` `Event`s.
    ///
    /// # Panics
    /// Panics if the initialization was unsuccessful, likely because a
    /// global subscriber was already installed by another call to `try_init`.
    pub fn init(self) {
        self.try_init()
            .expect("Unable to install global subscriber");
    }
}

impl<W> SubscriberBuilder<W> {
    fn map_layer<W2>(
        self,
        f: impl FnOnce(JsonLayer<Registry, W>) -> JsonLayer<Registry, W2>,
    ) -> SubscriberBuilder<W2> {
        SubscriberBuilder {
            layer: f(self.layer),
            max_level: self.max_level,
            #[cfg(feature = "env-filter")]
            env_filter: self.env_filter,
        }
    }

    fn configure(self, f: impl FnOnce(JsonLayer<Registry, W>) -> JsonLayer<Registry, W>) -> Self {
        self.map_layer(f)
    }

    /// Sets the [`MakeWriter`] that the subscriber being built will use to write events.
    ///
    /// # Examples
    ///
    /// Using `stderr` rather than `stdout`:
    ///
    /// ```rust
    /// let subscriber = linking_json_subscriber::fmt()
    ///     .with_writer(std::io::stderr)
    ///     .finish();
    /// # drop(subscriber);
    /// ```
    pub fn with_writer<W2>(self, make_writer: W2) -> SubscriberBuilder<W2>
    where
        W2: for<'writer> MakeWriter<'writer> + 'static,
    {
        self.map_layer(|layer| layer.with_writer(make_writer))
    }

    /// Borrows the [writer] for this subscriber.
    ///
    /// [writer]: MakeWriter
    pub fn writer(&self) -> &W {
        self.layer.writer()
    }

    /// Mutably borrows the [writer] for this subscriber.
    ///
    /// [writer]: MakeWriter
    pub fn writer_mut(&mut self) -> &mut W {
        self.layer.writer_mut()
    }

    /// Configures the subscriber to support [`libtest`'s output capturing][capturing] when used
    /// in unit tests.
    ///
    /// [capturing]:
    /// https://doc.rust-lang.org/book/ch11-02-running-tests.html#showing-function-output
    pub fn with_test_writer(self) -> SubscriberBuilder<TestWriter> {
        self.map_layer(JsonLayer::with_test_writer)
    }

    /// Updates the [`MakeWriter`] by applying a function to the existing [`MakeWriter`].
    pub fn map_writer<W2>(self, f: impl FnOnce(W) -> W2) -> SubscriberBuilder<W2>
    where
        W2: for<'writer> MakeWriter<'writer> + 'static,
    {
        self.map_layer(|layer| layer.map_writer(f))
    }

    /// Sets the maximum [verbosity level] that will be enabled by the subscriber. Defaults to
    /// `INFO`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tracing::Level;
    ///
    /// let subscriber = linking_json_subscriber::fmt()
    ///     .with_max_level(Level::DEBUG)
    ///     .finish();
    /// # drop(subscriber);
    /// ```
    ///
    /// [verbosity level]: tracing_core::Level
    pub fn with_max_level(self, max_level: impl Into<LevelFilter>) -> Self {
        Self {
            max_level: max_level.into(),
            ..self
        }
    }

    /// Filters events with an [`EnvFilter`] on top of the maximum level.
    #[cfg(feature = "env-filter")]
    pub fn with_env_filter(self, filter: impl Into<EnvFilter>) -> Self {
        Self {
            env_filter: Some(filter.into()),
            ..self
        }
    }

    /// Sets whether problems contained while formatting or writing are printed to stderr.
    pub fn log_internal_errors(self, log_internal_errors: bool) -> Self {
        self.configure(|layer| layer.log_internal_errors(log_internal_errors))
    }

    /// See [`JsonLayer::with_diagnostics`].
    pub fn with_diagnostics(self, sink: impl DiagnosticSink + 'static) -> Self {
        self.configure(|layer| layer.with_diagnostics(sink))
    }

    /// See [`JsonLayer::with_linking_metadata`].
    pub fn with_linking_metadata(self, provider: impl LinkingMetadataProvider + 'static) -> Self {
        self.configure(|layer| layer.with_linking_metadata(provider))
    }

    /// See [`JsonLayer::with_agent`].
    pub fn with_agent<A, R>(self, resolve: R) -> Self
    where
        A: LinkingMetadataProvider + 'static,
        R: Fn() -> Result<Option<A>, BoxError> + Send + Sync + 'static,
    {
        self.configure(|layer| layer.with_agent(resolve))
    }

    /// See [`JsonLayer::with_property_mapping`].
    ///
    /// # Errors
    ///
    /// Fails if `property` is reserved or `name` is blank.
    pub fn with_property_mapping(
        self,
        name: impl Into<String>,
        property: LoggingProperty,
    ) -> Result<Self, ConfigError> {
        let layer = self.layer.with_property_mapping(name, property)?;
        Ok(SubscriberBuilder { layer, ..self })
    }

    /// Never writes the field `name`, neither as a user property nor through a mapping.
    pub fn with_excluded_property(self, name: impl Into<String>) -> Self {
        self.configure(|layer| layer.with_excluded_property(name))
    }

    pub fn with_properties_layout(self, layout: PropertiesLayout) -> Self {
        self.configure(|layer| layer.with_properties_layout(layout))
    }

    pub fn with_max_depth(self, max_depth: usize) -> Self {
        self.configure(|layer| layer.with_max_depth(max_depth))
    }

    /// Sets whether or not an event's target is written as `logger.name`.
    pub fn with_target(self, display_target: bool) -> Self {
        self.configure(|layer| layer.with_target(display_target))
    }

    /// Sets whether or not the name of the current thread is written as `thread.name`.
    pub fn with_thread_names(self, display_thread_names: bool) -> Self {
        self.configure(|layer| layer.with_thread_names(display_thread_names))
    }

    /// Sets whether or not an event's source code file path is written as `file.name`.
    pub fn with_file(self, display_filename: bool) -> Self {
        self.configure(|layer| layer.with_file(display_filename))
    }

    /// Sets whether or not an event's source code line number is written as `line.number`.
    pub fn with_line_number(self, display_line_number: bool) -> Self {
        self.configure(|layer| layer.with_line_number(display_line_number))
    }

    /// Sets whether or not an event's module path is written as `namespace`.
    pub fn with_module_path(self, display_module_path: bool) -> Self {
        self.configure(|layer| layer.with_module_path(display_module_path))
    }

    /// Sets whether or not the id of the span an event belongs to is written as
    /// `correlation.id`.
    pub fn with_correlation_id(self, display_correlation_id: bool) -> Self {
        self.configure(|layer| layer.with_correlation_id(display_correlation_id))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tracing::subscriber::with_default;

    use super::SubscriberBuilder;
    use crate::{
        property::LoggingProperty,
        tests::{CountingProvider, MockMakeWriter},
    };

    fn subscriber() -> SubscriberBuilder {
        SubscriberBuilder::default()
    }

    fn produce_log_lines(
        builder: SubscriberBuilder<MockMakeWriter>,
        make_writer: &MockMakeWriter,
        producer: impl FnOnce(),
    ) -> Vec<Value> {
        with_default(builder.finish(), producer);
        make_writer.lines()
    }

    #[test]
    fn max_level_filters_events() {
        let make_writer = MockMakeWriter::default();
        let builder = subscriber()
            .with_writer(make_writer.clone())
            .with_max_level(tracing::Level::WARN);

        let lines = produce_log_lines(builder, &make_writer, || {
            tracing::info!("dropped");
            tracing::warn!("kept");
            tracing::error!("kept too");
        });

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["log.level"], "WARN");
        assert_eq!(lines[1]["log.level"], "ERROR");
    }

    #[test]
    fn json_filename() {
        let make_writer = MockMakeWriter::default();
        let builder = subscriber()
            .with_writer(make_writer.clone())
            .with_file(true)
            .with_line_number(true);

        let lines = produce_log_lines(builder, &make_writer, || {
            tracing::info!("some json test");
        });

        assert_eq!(lines[0]["file.name"], file!());
        assert!(lines[0]["line.number"].is_u64());
        assert_eq!(lines[0]["logger.name"], "linking_json_subscriber::builder::tests");
    }

    #[test]
    fn json_with_metadata_and_mapping() {
        let make_writer = MockMakeWriter::default();
        let provider = CountingProvider::new([("trace.id", Some("abc"))]);
        let builder = subscriber()
            .with_writer(make_writer.clone())
            .with_target(false)
            .with_linking_metadata(provider.clone())
            .with_property_mapping("class", LoggingProperty::ClassName)
            .unwrap();

        let lines = produce_log_lines(builder, &make_writer, || {
            let span = tracing::info_span!("json_span", answer = 42);
            let _guard = span.enter();
            tracing::info!(class = "Checkout", "some json test");
        });

        assert_eq!(provider.calls(), 1);
        let line = &lines[0];
        assert_eq!(line["trace.id"], "abc");
        assert_eq!(line["class.name"], "Checkout");
        assert!(line["correlation.id"].is_string());
        assert!(line.get("logger.name").is_none());
    }

    #[test]
    fn excluded_field_is_dropped() {
        let make_writer = MockMakeWriter::default();
        let builder = subscriber()
            .with_writer(make_writer.clone())
            .with_excluded_property("session");

        let lines = produce_log_lines(builder, &make_writer, || {
            tracing::info!(session = "s-1", order = 7, "checkout");
        });

        let line = &lines[0];
        assert_eq!(line["Message.Properties.order"], 7);
        assert!(line.get("Message.Properties.session").is_none());
    }

    #[test]
    fn reserved_mapping_is_rejected() {
        assert!(subscriber()
            .with_property_mapping("level", LoggingProperty::LogLevel)
            .is_err());
    }

    #[cfg(feature = "env-filter")]
    #[test]
    fn env_filter_narrows_output() {
        let make_writer = MockMakeWriter::default();
        let builder = subscriber()
            .with_writer(make_writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_env_filter("linking_json_subscriber=debug");

        let lines = produce_log_lines(builder, &make_writer, || {
            tracing::trace!("dropped");
            tracing::debug!("kept");
        });

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "kept");
    }
}
