use std::{cell::RefCell, fmt, io, marker::PhantomData, sync::Arc};

use tracing_core::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{MakeWriter, TestWriter},
    layer::Context,
    registry::LookupSpan,
    Layer,
    Registry,
};

mod event;

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, Silent, Stderr},
    error::{BoxError, ConfigError},
    formatter::{EventFormatter, PropertiesLayout},
    metadata::{LazyAgent, LinkingMetadataProvider},
    property::LoggingProperty,
};

/// Layer that writes every `tracing` event as one line of JSON enriched with linking metadata.
///
/// The output always contains `timestamp`, `log.level`, `message`, `thread.id` and
/// `process.id`. The target is written as `logger.name` unless disabled, other source data only
/// when enabled. Event fields other than `message` are user properties; the first field
/// recorded as an error becomes `error.class`, `error.message` and `error.stack`.
///
/// # Examples
///
/// ```rust
/// use linking_json_subscriber::{BoxError, JsonLayer, LinkingMetadata};
/// use tracing_subscriber::prelude::*;
///
/// let layer = JsonLayer::stdout().with_linking_metadata(|| -> Result<_, BoxError> {
///     let mut metadata = LinkingMetadata::new();
///     metadata.insert("entity.name".to_owned(), Some("checkout".to_owned()));
///     Ok(Some(metadata))
/// });
/// # tracing_subscriber::registry().with(layer);
/// ```
pub struct JsonLayer<S = Registry, W = fn() -> io::Stdout> {
    make_writer: W,
    formatter: EventFormatter,
    provider: Option<Arc<dyn LinkingMetadataProvider>>,
    diagnostics: Arc<dyn DiagnosticSink>,

    display_target: bool,
    display_thread_names: bool,
    display_filename: bool,
    display_line_number: bool,
    display_module_path: bool,
    display_correlation_id: bool,

    _inner: PhantomData<fn(S)>,
}

impl<S, W> Layer<S> for JsonLayer<S, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        thread_local! {
            static BUF: RefCell<String> = const { RefCell::new(String::new()) };
        }

        BUF.with(|buf| {
            let borrow = buf.try_borrow_mut();
            let mut a;
            let mut b;
            let buf = if let Ok(buf) = borrow {
                a = buf;
                &mut *a
            } else {
                b = String::new();
                &mut b
            };

            if self.format_event(event, &ctx, buf).is_ok() {
                let mut writer = self.make_writer.make_writer_for(event.metadata());
                if let Err(error) = io::Write::write_all(&mut writer, buf.as_bytes()) {
                    self.diagnostics.record(Diagnostic::Write(error));
                }
            } else {
                self.diagnostics.record(Diagnostic::Format {
                    name: event.metadata().name().to_owned(),
                });
            }

            buf.clear();
        });
    }
}

impl<S> JsonLayer<S>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    /// Creates a [`JsonLayer`] which will output logs to stdout.
    pub fn stdout() -> JsonLayer<S, fn() -> io::Stdout> {
        JsonLayer::new(io::stdout)
    }

    /// Creates a [`JsonLayer`] which will output logs to stderr.
    pub fn stderr() -> JsonLayer<S, fn() -> io::Stderr> {
        JsonLayer::new(io::stderr)
    }

    /// Creates a [`JsonLayer`] which will output logs to the configured
    /// [`Writer`](io::Write).
    pub fn new<W>(make_writer: W) -> JsonLayer<S, W>
    where
        W: for<'writer> MakeWriter<'writer> + 'static,
    {
        JsonLayer::<S, W> {
            make_writer,
            formatter: EventFormatter::default(),
            provider: None,
            diagnostics: Arc::new(Stderr),
            display_target: true,
            display_thread_names: false,
            display_filename: false,
            display_line_number: false,
            display_module_path: false,
            display_correlation_id: true,
            _inner: PhantomData,
        }
    }
}

impl<S> Default for JsonLayer<S>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn default() -> Self {
        Self::stdout()
    }
}

impl<S, W> JsonLayer<S, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    /// Sets the [`MakeWriter`] that the [`JsonLayer`] being built will use to write events.
    ///
    /// # Examples
    ///
    /// Using `stderr` rather than `stdout`:
    ///
    /// ```rust
    /// # use tracing_subscriber::prelude::*;
    /// let layer = linking_json_subscriber::JsonLayer::stdout()
    ///     .with_writer(std::io::stderr);
    /// # tracing_subscriber::registry().with(layer);
    /// ```
    pub fn with_writer<W2>(self, make_writer: W2) -> JsonLayer<S, W2>
    where
        W2: for<'writer> MakeWriter<'writer> + 'static,
    {
        self.map_writer(|_| make_writer)
    }

    /// Borrows the [writer] for this layer.
    ///
    /// [writer]: MakeWriter
    pub fn writer(&self) -> &W {
        &self.make_writer
    }

    /// Mutably borrows the [writer] for this layer.
    ///
    /// This method is primarily expected to be used with the
    /// [`reload::Handle::modify`](tracing_subscriber::reload::Handle::modify) method.
    ///
    /// [writer]: MakeWriter
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.make_writer
    }

    /// Configures the layer to support [`libtest`'s output capturing][capturing] when used in
    /// unit tests.
    ///
    /// See [`TestWriter`] for additional details.
    ///
    /// [capturing]:
    /// https://doc.rust-lang.org/book/ch11-02-running-tests.html#showing-function-output
    pub fn with_test_writer(self) -> JsonLayer<S, TestWriter> {
        self.with_writer(TestWriter::default())
    }

    /// Updates the [`MakeWriter`] by applying a function to the existing [`MakeWriter`].
    ///
    /// # Examples
    ///
    /// Redirect output to stderr if level is <= WARN:
    ///
    /// ```rust
    /// # use tracing_subscriber::prelude::*;
    /// use tracing_subscriber::fmt::writer::MakeWriterExt;
    ///
    /// let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
    /// let layer = linking_json_subscriber::JsonLayer::stdout()
    ///     .map_writer(move |w| stderr.or_else(w));
    /// # tracing_subscriber::registry().with(layer);
    /// ```
    pub fn map_writer<W2>(self, f: impl FnOnce(W) -> W2) -> JsonLayer<S, W2>
    where
        W2: for<'writer> MakeWriter<'writer> + 'static,
    {
        JsonLayer {
            make_writer: f(self.make_writer),
            formatter: self.formatter,
            provider: self.provider,
            diagnostics: self.diagnostics,
            display_target: self.display_target,
            display_thread_names: self.display_thread_names,
            display_filename: self.display_filename,
            display_line_number: self.display_line_number,
            display_module_path: self.display_module_path,
            display_correlation_id: self.display_correlation_id,
            _inner: PhantomData,
        }
    }

    /// Sets whether problems contained while formatting or writing are printed to stderr.
    /// Defaults to true.
    ///
    /// This replaces any sink set with [`with_diagnostics`](Self::with_diagnostics).
    pub fn log_internal_errors(self, log_internal_errors: bool) -> Self {
        if log_internal_errors {
            self.with_diagnostics(Stderr)
        } else {
            self.with_diagnostics(Silent)
        }
    }

    /// Sends problems contained while formatting or writing to `sink`.
    pub fn with_diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Arc::new(sink);
        self
    }

    /// Adds the metadata returned by `provider` to every event.
    ///
    /// The provider is called once per event, on the thread that emitted it.
    pub fn with_linking_metadata(mut self, provider: impl LinkingMetadataProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Adds linking metadata from an agent that is located by `resolve` on the first event.
    ///
    /// See [`LazyAgent`].
    pub fn with_agent<A, R>(self, resolve: R) -> Self
    where
        A: LinkingMetadataProvider + 'static,
        R: Fn() -> Result<Option<A>, BoxError> + Send + Sync + 'static,
    {
        self.with_linking_metadata(LazyAgent::new(resolve))
    }

    /// Stops adding linking metadata.
    pub fn without_linking_metadata(mut self) -> Self {
        self.provider = None;
        self
    }

    /// Writes the event field `name` to the key of `property`.
    ///
    /// # Errors
    ///
    /// See [`EventFormatter::with_property_mapping`].
    pub fn with_property_mapping(
        mut self,
        name: impl Into<String>,
        property: LoggingProperty,
    ) -> Result<Self, ConfigError> {
        self.formatter.add_property_mapping(name, property)?;
        Ok(self)
    }

    /// Never writes the field `name`, neither as a user property nor through a mapping.
    pub fn with_excluded_property(mut self, name: impl Into<String>) -> Self {
        self.formatter.add_excluded_property(name);
        self
    }

    pub fn with_properties_layout(mut self, layout: PropertiesLayout) -> Self {
        self.formatter.set_properties_layout(layout);
        self
    }

    /// Sets how many levels of nested field values are expanded.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.formatter.set_max_depth(max_depth);
        self
    }

    /// Sets whether or not an event's target is written as `logger.name`. Defaults to true.
    pub fn with_target(mut self, display_target: bool) -> Self {
        self.display_target = display_target;
        self
    }

    /// Sets whether or not the name of the current thread is written as `thread.name`.
    pub fn with_thread_names(mut self, display_thread_names: bool) -> Self {
        self.display_thread_names = display_thread_names;
        self
    }

    /// Sets whether or not an event's source code file path is written as `file.name`.
    pub fn with_file(mut self, display_filename: bool) -> Self {
        self.display_filename = display_filename;
        self
    }

    /// Sets whether or not an event's source code line number is written as `line.number`.
    pub fn with_line_number(mut self, display_line_number: bool) -> Self {
        self.display_line_number = display_line_number;
        self
    }

    /// Sets whether or not an event's module path is written as `namespace`.
    pub fn with_module_path(mut self, display_module_path: bool) -> Self {
        self.display_module_path = display_module_path;
        self
    }

    /// Sets whether or not the id of the span an event belongs to is written as
    /// `correlation.id`. Defaults to true.
    pub fn with_correlation_id(mut self, display_correlation_id: bool) -> Self {
        self.display_correlation_id = display_correlation_id;
        self
    }
}

impl<S, W> fmt::Debug for JsonLayer<S, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLayer")
            .field("formatter", &self.formatter)
            .field("linking_metadata", &self.provider.is_some())
            .field("display_target", &self.display_target)
            .field("display_thread_names", &self.display_thread_names)
            .field("display_filename", &self.display_filename)
            .field("display_line_number", &self.display_line_number)
            .field("display_module_path", &self.display_module_path)
            .field("display_correlation_id", &self.display_correlation_id)
            .finish_non_exhaustive()
    }
}
