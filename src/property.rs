use std::{collections::HashMap, fmt, str::FromStr, sync::OnceLock};

use crate::error::ConfigError;

/// Semantic fields of an output document.
///
/// Every variant has exactly one JSON key, see [`LoggingProperty::output_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoggingProperty {
    Timestamp,
    LogLevel,
    MessageText,
    MessageTemplate,
    ThreadId,
    ThreadName,
    ProcessId,
    LoggerName,
    ErrorClass,
    ErrorMessage,
    ErrorStack,
    CorrelationId,
    LineNumber,
    FileName,
    Namespace,
    ClassName,
    MethodName,
}

impl LoggingProperty {
    /// All the properties, in declaration order.
    pub const ALL: [LoggingProperty; 17] = [
        LoggingProperty::Timestamp,
        LoggingProperty::LogLevel,
        LoggingProperty::MessageText,
        LoggingProperty::MessageTemplate,
        LoggingProperty::ThreadId,
        LoggingProperty::ThreadName,
        LoggingProperty::ProcessId,
        LoggingProperty::LoggerName,
        LoggingProperty::ErrorClass,
        LoggingProperty::ErrorMessage,
        LoggingProperty::ErrorStack,
        LoggingProperty::CorrelationId,
        LoggingProperty::LineNumber,
        LoggingProperty::FileName,
        LoggingProperty::Namespace,
        LoggingProperty::ClassName,
        LoggingProperty::MethodName,
    ];

    /// The key this property is written under.
    pub const fn output_name(self) -> &'static str {
        match self {
            LoggingProperty::Timestamp => "timestamp",
            LoggingProperty::LogLevel => "log.level",
            LoggingProperty::MessageText => "message",
            LoggingProperty::MessageTemplate => "message.template",
            LoggingProperty::ThreadId => "thread.id",
            LoggingProperty::ThreadName => "thread.name",
            LoggingProperty::ProcessId => "process.id",
            LoggingProperty::LoggerName => "logger.name",
            LoggingProperty::ErrorClass => "error.class",
            LoggingProperty::ErrorMessage => "error.message",
            LoggingProperty::ErrorStack => "error.stack",
            LoggingProperty::CorrelationId => "correlation.id",
            LoggingProperty::LineNumber => "line.number",
            LoggingProperty::FileName => "file.name",
            LoggingProperty::Namespace => "namespace",
            LoggingProperty::ClassName => "class.name",
            LoggingProperty::MethodName => "method.name",
        }
    }

    /// Whether the formatter owns this key. Reserved properties cannot be the target of a
    /// property mapping.
    pub const fn is_reserved(self) -> bool {
        matches!(
            self,
            LoggingProperty::Timestamp
                | LoggingProperty::LogLevel
                | LoggingProperty::MessageText
                | LoggingProperty::MessageTemplate
                | LoggingProperty::ErrorClass
                | LoggingProperty::ErrorMessage
                | LoggingProperty::ErrorStack
        )
    }

    /// Looks a property up by its output key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProperty`] if no property is written under `name`.
    pub fn from_output_name(name: &str) -> Result<Self, ConfigError> {
        static BY_NAME: OnceLock<HashMap<&'static str, LoggingProperty>> = OnceLock::new();

        BY_NAME
            .get_or_init(|| {
                LoggingProperty::ALL
                    .iter()
                    .map(|property| (property.output_name(), *property))
                    .collect()
            })
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownProperty(name.to_owned()))
    }
}

impl fmt::Display for LoggingProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.output_name())
    }
}

impl FromStr for LoggingProperty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_output_name(s)
    }
}
