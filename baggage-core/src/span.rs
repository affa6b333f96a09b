//! Finished-span data and the handler contract invoked when spans complete.
use crate::context::TraceContext;

/// The role a span played in an interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Client,
    Server,
    Producer,
    Consumer,
}

/// The recorded data of a span, handed to [`FinishedSpanHandler`]s when the
/// tracer finalizes it.
///
/// Handlers may rewrite the record in place (retagging, renaming, scrubbing)
/// before later handlers and ultimately the reporter see it.
#[derive(Clone, Debug, Default)]
pub struct SpanRecord {
    name: Option<String>,
    kind: Option<Kind>,
    start_micros: u64,
    finish_micros: u64,
    tags: Vec<(String, String)>,
}

impl SpanRecord {
    pub fn new() -> Self {
        SpanRecord::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn kind(&self) -> Option<Kind> {
        self.kind
    }

    pub fn set_kind(&mut self, kind: Kind) {
        self.kind = Some(kind);
    }

    /// Start timestamp in epoch microseconds; zero when unset.
    pub fn start_micros(&self) -> u64 {
        self.start_micros
    }

    pub fn set_start_micros(&mut self, micros: u64) {
        self.start_micros = micros;
    }

    /// Finish timestamp in epoch microseconds; zero when unset.
    pub fn finish_micros(&self) -> u64 {
        self.finish_micros
    }

    pub fn set_finish_micros(&mut self, micros: u64) {
        self.finish_micros = micros;
    }

    /// Returns the value of the tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets the tag `key`, replacing any previous value.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.tags.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.tags.push((key, value));
        }
    }

    /// All tags in insertion order.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}

/// Observes (and may mutate) spans as the tracer finalizes them.
///
/// Handlers run synchronously on the thread finishing the span; they must not
/// block on I/O. Returning `false` drops the span from any handlers that
/// would have run after this one.
pub trait FinishedSpanHandler: Send + Sync + 'static {
    /// Handles one finished span. Returning `false` short-circuits the rest
    /// of the handler chain.
    fn handle(&self, context: &TraceContext, span: &mut SpanRecord) -> bool;

    /// When `true`, the tracer records spans for this process even when the
    /// primary decision says not to, so this handler always has data to see.
    fn always_sample_local(&self) -> bool {
        false
    }
}
