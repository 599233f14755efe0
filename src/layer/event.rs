use std::{borrow::Cow, fmt, thread, time::SystemTime};

use tracing_core::{Event, Metadata, Subscriber};
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;
use tracing_subscriber::{layer::Context, registry::LookupSpan};

use crate::{
    layer::JsonLayer,
    value::{PropertyValue, Visit},
    view::{current_thread_id, ExceptionInfo, Identity, LogEventView, SourceLocation},
    visitor::EventVisitor,
};

/// A `tracing` event as seen by the formatter.
pub(crate) struct TracingEvent<'a> {
    timestamp: SystemTime,
    metadata: &'a Metadata<'a>,
    fields: EventVisitor,
    thread_id: Identity<'static>,
    thread: Option<thread::Thread>,
    correlation_id: Option<String>,
    display_target: bool,
    location: Option<SourceLocation<'a>>,
}

impl LogEventView for TracingEvent<'_> {
    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn level(&self) -> &str {
        self.metadata.level().as_str()
    }

    fn message(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.fields.message.as_deref().unwrap_or_default())
    }

    fn thread_id(&self) -> Identity<'_> {
        self.thread_id.clone()
    }

    fn thread_name(&self) -> Option<&str> {
        self.thread.as_ref().and_then(thread::Thread::name)
    }

    fn process_id(&self) -> Option<u32> {
        Some(std::process::id())
    }

    fn logger_name(&self) -> Option<&str> {
        self.display_target.then(|| self.metadata.target())
    }

    fn correlation_id(&self) -> Option<Cow<'_, str>> {
        self.correlation_id.as_deref().map(Cow::Borrowed)
    }

    fn location(&self) -> Option<SourceLocation<'_>> {
        self.location
    }

    fn exception(&self) -> Option<ExceptionInfo<'_>> {
        self.fields.exception.clone()
    }

    fn record_properties(&self, visitor: &mut dyn Visit) {
        for (key, value) in &self.fields.properties {
            visitor.record(key, PropertyValue::Json(value));
        }
    }
}

impl<S, W> JsonLayer<S, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    pub(crate) fn format_event(
        &self,
        event: &Event<'_>,
        ctx: &Context<'_, S>,
        writer: &mut String,
    ) -> fmt::Result {
        #[cfg(feature = "tracing-log")]
        let normalized_metadata = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let metadata = normalized_metadata.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let metadata = event.metadata();

        let mut fields = EventVisitor::default();
        event.record(&mut fields);

        let correlation_id = if self.display_correlation_id {
            ctx.event_span(event)
                .map(|span| span.id().into_u64().to_string())
        } else {
            None
        };

        let event = TracingEvent {
            timestamp: SystemTime::now(),
            metadata,
            fields,
            thread_id: current_thread_id(),
            thread: self.display_thread_names.then(thread::current),
            correlation_id,
            display_target: self.display_target,
            location: self.location(metadata),
        };

        self.formatter.format_event(
            &event,
            self.provider.as_deref(),
            &*self.diagnostics,
            writer,
        )
    }

    fn location<'a>(&self, metadata: &'a Metadata<'a>) -> Option<SourceLocation<'a>> {
        let location = SourceLocation {
            file: metadata.file().filter(|_| self.display_filename),
            line: metadata.line().filter(|_| self.display_line_number),
            namespace: metadata.module_path().filter(|_| self.display_module_path),
            ..SourceLocation::default()
        };
        (location != SourceLocation::default()).then_some(location)
    }
}
