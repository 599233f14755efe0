//! Side channel for failures that are contained while formatting.
//!
//! A layer cannot report its own problems through `tracing` without re-entering the dispatcher,
//! so they go to a [`DiagnosticSink`] instead. Nothing recorded here ends up in the output.

use std::io;

use crate::error::BoxError;

/// A contained failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Diagnostic {
    #[error("unable to fetch linking metadata: {0}")]
    MetadataFetch(#[source] BoxError),
    #[error("skipping user property `{key}`: {reason}")]
    PropertySkipped { key: String, reason: &'static str },
    #[error("unable to format the event `{name}`")]
    Format { name: String },
    #[error("unable to write an event to the writer: {0}")]
    Write(#[source] io::Error),
}

/// Receives [`Diagnostic`]s. Must not log through `tracing`.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(Diagnostic) + Send + Sync,
{
    fn record(&self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

/// Prints diagnostics to stderr. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stderr;

impl DiagnosticSink for Stderr {
    fn record(&self, diagnostic: Diagnostic) {
        eprintln!("[linking-json-subscriber] {diagnostic}");
    }
}

/// Drops all diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl DiagnosticSink for Silent {
    fn record(&self, _diagnostic: Diagnostic) {}
}
