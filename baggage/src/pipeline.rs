//! Composition of finished-span handlers.
//!
//! The tracer invokes one handler as each span completes; this module builds
//! that handler out of the plugin-contributed and user-registered ones. Every
//! member is individually wrapped so that a shut-down tracing subsystem or a
//! panicking handler degrades to "drop" instead of crashing the request path.
use baggage_core::{FinishedSpanHandler, SpanRecord, TraceContext};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The composed finished-span handler of one factory.
pub struct FinishedSpanPipeline {
    handler: Arc<dyn FinishedSpanHandler>,
    noop: Arc<AtomicBool>,
    always_sample_local: bool,
}

impl FinishedSpanPipeline {
    /// Composes `handlers` in order, each wrapped with the noop gate and
    /// panic isolation.
    pub(crate) fn new(handlers: Vec<Arc<dyn FinishedSpanHandler>>, noop: Arc<AtomicBool>) -> Self {
        let always_sample_local = handlers.iter().any(|h| h.always_sample_local());
        let wrapped = handlers
            .into_iter()
            .map(|delegate| {
                Arc::new(Isolated {
                    delegate,
                    noop: noop.clone(),
                }) as Arc<dyn FinishedSpanHandler>
            })
            .collect();
        let handler = compose(wrapped).unwrap_or_else(|| Arc::new(Noop));
        FinishedSpanPipeline {
            handler,
            noop,
            always_sample_local,
        }
    }

    /// Runs the handlers in configured order; the first `false`
    /// short-circuits the rest.
    pub fn handle(&self, context: &TraceContext, span: &mut SpanRecord) -> bool {
        self.handler.handle(context, span)
    }

    /// `true` when any member wants spans recorded locally regardless of the
    /// primary decision. The tracer consults this to force local recording.
    pub fn always_sample_local(&self) -> bool {
        self.always_sample_local
    }

    /// Marks the tracing subsystem as shut down (or live again). While set,
    /// every handler returns `false` without delegating.
    pub fn set_noop(&self, noop: bool) {
        self.noop.store(noop, Ordering::Relaxed);
    }
}

/// Composes handlers: none → `None`, one → itself, many → an ordered
/// composite that short-circuits on `false`.
pub(crate) fn compose(
    mut handlers: Vec<Arc<dyn FinishedSpanHandler>>,
) -> Option<Arc<dyn FinishedSpanHandler>> {
    match handlers.len() {
        0 => None,
        1 => handlers.pop(),
        _ => Some(Arc::new(Composite { handlers })),
    }
}

struct Noop;

impl FinishedSpanHandler for Noop {
    fn handle(&self, _: &TraceContext, _: &mut SpanRecord) -> bool {
        true
    }
}

struct Composite {
    handlers: Vec<Arc<dyn FinishedSpanHandler>>,
}

impl FinishedSpanHandler for Composite {
    fn handle(&self, context: &TraceContext, span: &mut SpanRecord) -> bool {
        for handler in &self.handlers {
            if !handler.handle(context, span) {
                return false;
            }
        }
        true
    }

    fn always_sample_local(&self) -> bool {
        self.handlers.iter().any(|h| h.always_sample_local())
    }
}

/// Checks the shutdown flag, then shields the pipeline from a panicking
/// delegate: the failure is logged and counts as `false`.
struct Isolated {
    delegate: Arc<dyn FinishedSpanHandler>,
    noop: Arc<AtomicBool>,
}

impl FinishedSpanHandler for Isolated {
    fn handle(&self, context: &TraceContext, span: &mut SpanRecord) -> bool {
        if self.noop.load(Ordering::Relaxed) {
            return false;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.delegate.handle(context, span))) {
            Ok(keep) => keep,
            Err(_) => {
                tracing::error!("finished-span handler panicked; span dropped from it");
                false
            }
        }
    }

    fn always_sample_local(&self) -> bool {
        self.delegate.always_sample_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Recording {
        calls: AtomicUsize,
        keep: bool,
    }

    impl Recording {
        fn new(keep: bool) -> Arc<Self> {
            Arc::new(Recording {
                calls: AtomicUsize::new(0),
                keep,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FinishedSpanHandler for Recording {
        fn handle(&self, _: &TraceContext, _: &mut SpanRecord) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keep
        }
    }

    fn context() -> TraceContext {
        TraceContext::builder().trace_id(1).span_id(1).build()
    }

    fn pipeline(handlers: Vec<Arc<dyn FinishedSpanHandler>>) -> FinishedSpanPipeline {
        FinishedSpanPipeline::new(handlers, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn empty_pipeline_is_a_noop_that_keeps() {
        let pipeline = pipeline(vec![]);
        assert!(pipeline.handle(&context(), &mut SpanRecord::new()));
        assert!(!pipeline.always_sample_local());
    }

    #[test]
    fn first_false_short_circuits() {
        let first = Recording::new(false);
        let second = Recording::new(true);
        let pipeline = pipeline(vec![first.clone(), second.clone()]);
        assert!(!pipeline.handle(&context(), &mut SpanRecord::new()));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[test]
    fn noop_flag_drops_without_delegating() {
        let handler = Recording::new(true);
        let pipeline = pipeline(vec![handler.clone()]);
        pipeline.set_noop(true);
        assert!(!pipeline.handle(&context(), &mut SpanRecord::new()));
        assert_eq!(handler.calls(), 0);
        pipeline.set_noop(false);
        assert!(pipeline.handle(&context(), &mut SpanRecord::new()));
        assert_eq!(handler.calls(), 1);
    }

    #[test]
    fn panicking_handler_counts_as_drop() {
        struct Panicking;
        impl FinishedSpanHandler for Panicking {
            fn handle(&self, _: &TraceContext, _: &mut SpanRecord) -> bool {
                panic!("boom");
            }
        }
        let after = Recording::new(true);
        let pipeline = pipeline(vec![Arc::new(Panicking), after.clone()]);
        assert!(!pipeline.handle(&context(), &mut SpanRecord::new()));
        assert_eq!(after.calls(), 0);
    }

    #[test]
    fn always_sample_local_is_a_disjunction() {
        struct Always;
        impl FinishedSpanHandler for Always {
            fn handle(&self, _: &TraceContext, _: &mut SpanRecord) -> bool {
                true
            }
            fn always_sample_local(&self) -> bool {
                true
            }
        }
        let pipeline = pipeline(vec![Recording::new(true), Arc::new(Always)]);
        assert!(pipeline.always_sample_local());
    }
}
