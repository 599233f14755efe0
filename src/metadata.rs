use std::{
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::OnceLock,
};

use crate::error::{BoxError, MetadataError};

/// Key/value pairs correlating a log line with a distributed trace. Values may be null.
pub type LinkingMetadata = BTreeMap<String, Option<String>>;

/// Source of [`LinkingMetadata`], typically backed by a monitoring agent.
///
/// The formatter calls [`linking_metadata`](Self::linking_metadata) exactly once per event, on
/// the thread that formats it. Returning `Ok(None)` means there is nothing to add. Errors are
/// reported to the diagnostics sink and never reach the output.
pub trait LinkingMetadataProvider: Send + Sync {
    /// # Errors
    ///
    /// Any failure of the underlying agent.
    fn linking_metadata(&self) -> Result<Option<LinkingMetadata>, BoxError>;
}

impl<F> LinkingMetadataProvider for F
where
    F: Fn() -> Result<Option<LinkingMetadata>, BoxError> + Send + Sync,
{
    fn linking_metadata(&self) -> Result<Option<LinkingMetadata>, BoxError> {
        self()
    }
}

/// A provider that locates its agent on first use.
///
/// `resolve` runs at most once, even when several threads race on the first event. A resolver
/// returning `Ok(None)` means no agent is attached. A resolver error or panic is returned from
/// that first call and the agent is considered absent afterwards; it is never retried. Metadata
/// itself is fetched from the agent on every call.
///
/// # Examples
///
/// ```rust
/// use linking_json_subscriber::{BoxError, LazyAgent, LinkingMetadata, LinkingMetadataProvider};
///
/// let agent = LazyAgent::new(|| {
///     Ok(Some(|| -> Result<Option<LinkingMetadata>, BoxError> {
///         let mut metadata = LinkingMetadata::new();
///         metadata.insert("entity.name".to_owned(), Some("checkout".to_owned()));
///         Ok(Some(metadata))
///     }))
/// });
///
/// let metadata = agent.linking_metadata().unwrap().unwrap();
/// assert_eq!(metadata["entity.name"].as_deref(), Some("checkout"));
/// ```
pub struct LazyAgent<A, R> {
    resolve: R,
    agent: OnceLock<Option<A>>,
}

impl<A, R> LazyAgent<A, R>
where
    R: Fn() -> Result<Option<A>, BoxError>,
{
    pub fn new(resolve: R) -> Self {
        Self {
            resolve,
            agent: OnceLock::new(),
        }
    }

    /// Whether resolution has already happened, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.agent.get().is_some()
    }

    /// Whether an agent was found. Resolves the agent if that has not happened yet.
    pub fn is_attached(&self) -> bool {
        self.agent().0.is_some()
    }

    fn agent(&self) -> (Option<&A>, Option<BoxError>) {
        let mut resolution_error = None;
        let agent = self.agent.get_or_init(|| {
            match panic::catch_unwind(AssertUnwindSafe(|| (self.resolve)())) {
                Ok(Ok(agent)) => agent,
                Ok(Err(error)) => {
                    resolution_error = Some(error);
                    None
                },
                Err(_) => {
                    resolution_error = Some(Box::new(MetadataError::Panicked));
                    None
                },
            }
        });
        (agent.as_ref(), resolution_error)
    }
}

impl<A, R> LinkingMetadataProvider for LazyAgent<A, R>
where
    A: LinkingMetadataProvider,
    R: Fn() -> Result<Option<A>, BoxError> + Send + Sync,
{
    fn linking_metadata(&self) -> Result<Option<LinkingMetadata>, BoxError> {
        match self.agent() {
            (_, Some(error)) => Err(Box::new(MetadataError::Resolution(error))),
            (Some(agent), None) => agent.linking_metadata(),
            (None, None) => Ok(None),
        }
    }
}

impl<A, R> fmt::Debug for LazyAgent<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.agent.get() {
            None => "unresolved",
            Some(None) => "absent",
            Some(Some(_)) => "attached",
        };
        f.debug_struct("LazyAgent").field("agent", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::{LazyAgent, LinkingMetadata, LinkingMetadataProvider};
    use crate::error::{BoxError, MetadataError};

    type Agent = fn() -> Result<Option<LinkingMetadata>, BoxError>;

    fn metadata() -> Result<Option<LinkingMetadata>, BoxError> {
        Ok(Some(LinkingMetadata::from([(
            "trace.id".to_owned(),
            Some("12345".to_owned()),
        )])))
    }

    #[test]
    fn resolves_once_and_fetches_every_time() {
        let resolutions = Arc::new(AtomicUsize::new(0));
        let fetches = Arc::new(AtomicUsize::new(0));

        let agent = {
            let resolutions = Arc::clone(&resolutions);
            let fetches = Arc::clone(&fetches);
            LazyAgent::new(move || {
                resolutions.fetch_add(1, Ordering::SeqCst);
                let fetches = Arc::clone(&fetches);
                Ok(Some(move || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    metadata()
                }))
            })
        };

        assert!(!agent.is_resolved());
        for _ in 0..3 {
            let metadata = agent.linking_metadata().unwrap().unwrap();
            assert_eq!(metadata["trace.id"].as_deref(), Some("12345"));
        }
        assert!(agent.is_attached());
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_resolution_is_reported_once() {
        let resolutions = AtomicUsize::new(0);
        let agent = LazyAgent::new(|| -> Result<Option<Agent>, BoxError> {
            resolutions.fetch_add(1, Ordering::SeqCst);
            Err(Box::new(io::Error::new(io::ErrorKind::NotFound, "no agent")))
        });

        let error = agent.linking_metadata().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MetadataError>(),
            Some(MetadataError::Resolution(_)),
        ));
        assert!(agent.linking_metadata().unwrap().is_none());
        assert!(agent.linking_metadata().unwrap().is_none());
        assert!(agent.is_resolved());
        assert!(!agent.is_attached());
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_resolution_is_reported_once() {
        let resolutions = AtomicUsize::new(0);
        let agent = LazyAgent::new(|| -> Result<Option<Agent>, BoxError> {
            resolutions.fetch_add(1, Ordering::SeqCst);
            panic!("agent lookup exploded");
        });

        let error = agent.linking_metadata().unwrap_err();
        let Some(MetadataError::Resolution(source)) = error.downcast_ref::<MetadataError>() else {
            panic!("expected a resolution error, got {error}");
        };
        assert!(matches!(
            source.downcast_ref::<MetadataError>(),
            Some(MetadataError::Panicked),
        ));
        for _ in 0..3 {
            assert!(agent.linking_metadata().unwrap().is_none());
        }
        assert!(agent.is_resolved());
        assert!(!agent.is_attached());
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_agent_yields_no_metadata() {
        let agent = LazyAgent::new(|| Ok(None::<Agent>));
        assert!(agent.linking_metadata().unwrap().is_none());
        assert!(!agent.is_attached());
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        let resolutions = AtomicUsize::new(0);
        let agent = LazyAgent::new(|| {
            resolutions.fetch_add(1, Ordering::SeqCst);
            Ok(Some(metadata))
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert!(agent.linking_metadata().unwrap().is_some());
                });
            }
        });

        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }
}
