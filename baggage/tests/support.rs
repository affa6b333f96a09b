#![allow(dead_code)]
//! Shared helpers for the integration tests.
use baggage_core::{Extraction, TraceContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Builds the context a tracer would mint from `extraction`: the extracted
/// identifiers when present, otherwise the given ones, with the extraction's
/// flags and extras either way.
pub fn adopt(extraction: Extraction, trace_id: u128, span_id: u64) -> TraceContext {
    if let Some(context) = extraction.context() {
        let context = context.clone();
        let mut builder = context.to_builder().flags(extraction.flags());
        for extra in extraction.extra() {
            builder = builder.add_extra(extra.clone());
        }
        return builder.build();
    }
    let mut builder = TraceContext::builder()
        .trace_id(trace_id)
        .span_id(span_id)
        .flags(extraction.flags());
    for extra in extraction.extra() {
        builder = builder.add_extra(extra.clone());
    }
    builder.build()
}

/// A subscriber counting `ERROR`-level diagnostics, for asserting that
/// failures reach the platform sink.
pub struct ErrorCount(Arc<AtomicUsize>);

impl ErrorCount {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (ErrorCount(count.clone()), count)
    }
}

impl tracing::Subscriber for ErrorCount {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        *metadata.level() == tracing::Level::ERROR
    }

    fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enter(&self, _: &tracing::span::Id) {}

    fn exit(&self, _: &tracing::span::Id) {}
}
