//! The interface host adapters implement to hand their events to the formatter.

use std::{borrow::Cow, fmt, time::SystemTime};

use serde::{Serialize, Serializer};

use crate::value::Visit;

/// Read-only projection of a host framework's log event.
///
/// The formatter only ever reads through this trait, so one formatter serves every host
/// integration. All methods are called at most once per formatted event.
pub trait LogEventView {
    /// The instant the event was emitted.
    fn timestamp(&self) -> SystemTime;

    /// Severity name. Written upper-cased.
    fn level(&self) -> &str;

    /// The message after template substitution.
    fn message(&self) -> Cow<'_, str>;

    /// The original, unrendered message template.
    fn message_template(&self) -> Option<&str> {
        None
    }

    fn thread_id(&self) -> Identity<'_>;

    fn thread_name(&self) -> Option<&str> {
        None
    }

    fn process_id(&self) -> Option<u32> {
        None
    }

    fn logger_name(&self) -> Option<&str> {
        None
    }

    fn correlation_id(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn location(&self) -> Option<SourceLocation<'_>> {
        None
    }

    fn exception(&self) -> Option<ExceptionInfo<'_>> {
        None
    }

    /// Visits the user-supplied properties of the event, in order.
    fn record_properties(&self, visitor: &mut dyn Visit);
}

/// Identifier of a thread or process, either numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity<'a> {
    Number(u64),
    Text(Cow<'a, str>),
}

impl Serialize for Identity<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Identity::Number(number) => serializer.serialize_u64(*number),
            Identity::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl From<u64> for Identity<'_> {
    fn from(value: u64) -> Self {
        Identity::Number(value)
    }
}

impl<'a> From<&'a str> for Identity<'a> {
    fn from(value: &'a str) -> Self {
        Identity::Text(Cow::Borrowed(value))
    }
}

/// The exception attached to an event. Blank message or stack are left out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo<'a> {
    pub class: Cow<'a, str>,
    pub message: Option<Cow<'a, str>>,
    pub stack: Option<Cow<'a, str>>,
}

/// Where in the source an event was emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: Option<&'a str>,
    pub line: Option<u32>,
    pub namespace: Option<&'a str>,
    pub class: Option<&'a str>,
    pub method: Option<&'a str>,
}

/// The closed set of severities understood by the [`LogRecord`](crate::LogRecord) adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<tracing_core::Level> for Severity {
    fn from(level: tracing_core::Level) -> Self {
        if level == tracing_core::Level::ERROR {
            Severity::Error
        } else if level == tracing_core::Level::WARN {
            Severity::Warn
        } else if level == tracing_core::Level::INFO {
            Severity::Info
        } else if level == tracing_core::Level::DEBUG {
            Severity::Debug
        } else {
            Severity::Trace
        }
    }
}

/// Identifier of the calling thread.
///
/// `ThreadId` only exposes its number through `Debug` on stable Rust, formatted as
/// `ThreadId(N)`. Falls back to the full `Debug` text if that ever changes.
pub fn current_thread_id() -> Identity<'static> {
    let id = format!("{:?}", std::thread::current().id());
    id.strip_prefix("ThreadId(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|number| number.parse().ok())
        .map_or_else(|| Identity::Text(Cow::Owned(id.clone())), Identity::Number)
}

/// Class name of an error known only as a trait object.
///
/// Common standard library errors are recognized by downcasting and reported by their full path.
/// Any other error is reported as `Error`; its `Display` text and source chain still end up in
/// `error.message` and `error.stack`.
pub(crate) fn error_class(error: &(dyn std::error::Error + 'static)) -> String {
    macro_rules! class_of {
        ($($ty:ty),+ $(,)?) => {
            $(
                if error.is::<$ty>() {
                    return stringify!($ty).to_owned();
                }
            )+
        };
    }

    class_of!(
        std::io::Error,
        std::fmt::Error,
        std::num::ParseIntError,
        std::num::ParseFloatError,
        std::num::TryFromIntError,
        std::str::ParseBoolError,
        std::str::Utf8Error,
        std::string::FromUtf8Error,
        std::char::ParseCharError,
        std::net::AddrParseError,
        std::env::VarError,
        std::time::SystemTimeError,
    );
    "Error".to_owned()
}

/// The `source()` chain of an error, one cause per line.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut chain = String::new();
    let mut source = error.source();
    while let Some(cause) = source {
        if !chain.is_empty() {
            chain.push('\n');
        }
        chain.push_str("caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    (!chain.is_empty()).then_some(chain)
}
