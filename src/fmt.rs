use std::error::Error;

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;

use crate::{builder::SubscriberBuilder, layer::JsonLayer};

/// Returns a new [`SubscriberBuilder`] for configuring a [formatting subscriber].
///
/// This is essentially shorthand for [`SubscriberBuilder::default()`].
///
/// # Examples
///
/// Using [`init`] to set the default subscriber:
///
/// ```rust
/// linking_json_subscriber::fmt().init();
/// ```
///
/// Configuring the output:
///
/// ```rust
/// use linking_json_subscriber::PropertiesLayout;
///
/// linking_json_subscriber::fmt()
///     .with_max_level(tracing::Level::DEBUG)
///     .with_file(true)
///     .with_line_number(true)
///     .with_properties_layout(PropertiesLayout::Nested)
///     .init();
/// ```
///
/// Rather than setting the subscriber as the default, [`finish`] _returns_ the
/// constructed subscriber, which may then be passed to other functions:
///
/// ```rust
/// let subscriber = linking_json_subscriber::fmt()
///     .with_max_level(tracing::Level::DEBUG)
///     .finish();
///
/// tracing::subscriber::with_default(subscriber, || {
///     // the subscriber will only be set as the default
///     // inside this closure...
/// })
/// ```
///
/// [formatting subscriber]: tracing::Subscriber
/// [`SubscriberBuilder::default()`]: SubscriberBuilder::default
/// [`init`]: SubscriberBuilder::init()
/// [`finish`]: SubscriberBuilder::finish()
pub fn fmt() -> SubscriberBuilder {
    SubscriberBuilder::default()
}

/// Returns a new [`JsonLayer`] writing to stdout that can be [composed] with other layers to
/// construct a [`Subscriber`].
///
/// [composed]: tracing_subscriber::layer
pub fn layer<S>() -> JsonLayer<S>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    JsonLayer::default()
}

/// Install a global tracing subscriber that listens for events and
/// filters based on the value of the `RUST_LOG` environment variable.
///
/// If the `tracing-log` feature is enabled, this will also install
/// the `LogTracer` to convert `log` records into `tracing` `Event`s.
///
/// # Errors
///
/// Returns an Error if the initialization was unsuccessful,
/// likely because a global subscriber was already installed by another
/// call to `try_init`.
pub fn try_init() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let builder = fmt();

    #[cfg(feature = "env-filter")]
    let builder = builder
        .with_max_level(tracing_core::LevelFilter::TRACE)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());

    // Without `env-filter`, `RUST_LOG` is read as a `Targets` filter instead. The builder's
    // own level filter is opened up so it does not hide what `RUST_LOG` enables.
    #[cfg(not(feature = "env-filter"))]
    let builder = builder.with_max_level(tracing_core::LevelFilter::TRACE);

    let subscriber = builder.finish();
    #[cfg(not(feature = "env-filter"))]
    let subscriber = {
        use std::{env, str::FromStr};

        use tracing_subscriber::{filter::Targets, layer::SubscriberExt};
        let targets = match env::var("RUST_LOG") {
            Ok(var) => {
                Targets::from_str(&var)
                    .map_err(|e| {
                        eprintln!("Ignoring `RUST_LOG={var:?}`: {e}");
                    })
                    .unwrap_or_default()
            },
            Err(env::VarError::NotPresent) => {
                Targets::new().with_default(tracing_core::LevelFilter::INFO)
            },
            Err(e) => {
                eprintln!("Ignoring `RUST_LOG`: {e}");
                Targets::new().with_default(tracing_core::LevelFilter::INFO)
            },
        };
        subscriber.with(targets)
    };

    tracing_subscriber::util::SubscriberInitExt::try_init(subscriber).map_err(Into::into)
}

/// Install a global tracing subscriber that listens for events and
/// filters based on the value of the `RUST_LOG` environment variable.
///
/// # Panics
/// Panics if the initialization was unsuccessful, likely because a
/// global subscriber was already installed by another call to `try_init`.
pub fn init() {
    try_init().expect("Unable to install global subscriber");
}
