//! Routes finished spans to the handlers of the systems that recorded them.
use crate::state::SamplingState;
use baggage_core::{FinishedSpanHandler, SpanRecord, TraceContext};
use std::panic::{self, AssertUnwindSafe};

/// The overlay's finished-span handler.
///
/// Reads the [`SamplingState`] off the context, tags the span with the
/// participants that sampled it, and dispatches it to the handler of every
/// system that recorded at this hop, through the policy snapshot captured at
/// extraction. Always lets the span continue down the pipeline.
pub(crate) struct RoutingHandler;

impl FinishedSpanHandler for RoutingHandler {
    fn handle(&self, context: &TraceContext, span: &mut SpanRecord) -> bool {
        let state = match context.find_extra::<SamplingState>() {
            Some(state) => state,
            None => return true,
        };

        let primary = context.is_sampled() == Some(true);
        let recorded = state.recorded();
        if primary || !recorded.is_empty() {
            // `sampled=zipkin[,<systems>]` lets a downstream router fan the
            // span out without rerunning any decision.
            let mut tag = String::new();
            if primary {
                tag.push_str("zipkin");
            }
            for name in recorded {
                if !tag.is_empty() {
                    tag.push(',');
                }
                tag.push_str(name);
            }
            span.set_tag("sampled", tag);
        }

        for name in recorded {
            if let Some(policy) = state.policy(name) {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    policy.handler.handle(context, span)
                }));
                if outcome.is_err() {
                    tracing::error!(
                        system = %name,
                        "secondary-sampling handler panicked; span dropped from it"
                    );
                }
            }
        }
        true
    }
}
