use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        TryLockError,
    },
};

use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink},
    error::BoxError,
    metadata::{LinkingMetadata, LinkingMetadataProvider},
};

pub(crate) struct MockWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MockWriter {
    pub(crate) fn new(buf: Arc<Mutex<Vec<u8>>>) -> Self {
        Self { buf }
    }

    #[allow(clippy::needless_pass_by_value)]
    pub(crate) fn map_error<Guard>(err: TryLockError<Guard>) -> io::Error {
        match err {
            TryLockError::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
            TryLockError::Poisoned(_) => io::Error::from(io::ErrorKind::Other),
        }
    }

    pub(crate) fn buf(&self) -> io::Result<MutexGuard<'_, Vec<u8>>> {
        self.buf.try_lock().map_err(Self::map_error)
    }
}

impl io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buf()?.flush()
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockMakeWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MockMakeWriter {
    pub(crate) fn buf(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap()
    }

    /// Every line written so far, parsed as JSON.
    pub(crate) fn lines(&self) -> Vec<Value> {
        let buf = self.buf();
        std::str::from_utf8(&buf)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// The only line written so far, parsed as JSON.
    pub(crate) fn line(&self) -> Value {
        let mut lines = self.lines();
        assert_eq!(lines.len(), 1, "expected exactly one line: {lines:?}");
        lines.remove(0)
    }
}

impl<'a> MakeWriter<'a> for MockMakeWriter {
    type Writer = MockWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MockWriter::new(self.buf.clone())
    }
}

/// Keeps the messages of all diagnostics it receives.
#[derive(Clone, Default)]
pub(crate) struct RecordingDiagnostics {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingDiagnostics {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn record(&self, diagnostic: Diagnostic) {
        self.messages.lock().unwrap().push(diagnostic.to_string());
    }
}

/// Returns the same metadata every time and counts how often it was asked.
#[derive(Clone, Default)]
pub(crate) struct CountingProvider {
    calls: Arc<AtomicUsize>,
    metadata: LinkingMetadata,
}

impl CountingProvider {
    pub(crate) fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        Self {
            calls: Arc::default(),
            metadata: entries
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value.map(str::to_owned)))
                .collect(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LinkingMetadataProvider for CountingProvider {
    fn linking_metadata(&self) -> Result<Option<LinkingMetadata>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.metadata.clone()))
    }
}
