use crate::property::LoggingProperty;

/// Type-erased error returned by linking metadata providers and agent resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Misuse of the configuration API. These are reported when the formatter is being set up,
/// never while an event is formatted.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("the output field `{0}` is reserved and cannot be used as a property mapping")]
    ReservedProperty(LoggingProperty),
    #[error("`{0}` is not a known output field")]
    UnknownProperty(String),
    #[error("the name of a mapped user property must not be empty")]
    EmptyPropertyName,
}

/// Failures of the external agent that supplies linking metadata.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetadataError {
    /// The agent handle could not be obtained. The agent is treated as absent from now on.
    #[error("unable to resolve the monitoring agent: {0}")]
    Resolution(#[source] BoxError),
    #[error("the linking metadata provider panicked")]
    Panicked,
}
