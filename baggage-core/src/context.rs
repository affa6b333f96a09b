//! The trace context: identifiers, sampling state, and attached extras.
//!
//! A [`TraceContext`] is the in-process handle for one node of a distributed
//! trace. It carries the trace/span identifiers and the sampling decision that
//! travel on the wire, plus a list of type-erased _extras_: state attached by
//! propagation components (such as a field store or an overlay's sampling
//! state) that rides along with the context for the lifetime of the trace.
//!
//! Contexts are immutable once built and cheap to clone; construct them with
//! [`TraceContext::builder`] and derive modified copies with
//! [`TraceContext::to_builder`].
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased state attached to a [`TraceContext`] or an extraction result.
pub type Extra = Arc<dyn Any + Send + Sync>;

/// The sampling decision carried by a context.
///
/// `sampled` is the decision propagated end-to-end by the primary wire format;
/// it is trace-scoped and immutable once set. `sampled_local` forces recording
/// for the current process only, regardless of the primary decision. `debug`
/// implies `sampled`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplingFlags {
    sampled: Option<bool>,
    debug: bool,
    sampled_local: bool,
}

impl SamplingFlags {
    /// Flags with no sampling decision.
    pub const EMPTY: SamplingFlags = SamplingFlags {
        sampled: None,
        debug: false,
        sampled_local: false,
    };

    /// Flags carrying an explicit primary decision.
    pub fn sampled(decision: bool) -> Self {
        SamplingFlags {
            sampled: Some(decision),
            ..Self::EMPTY
        }
    }

    /// Debug flags: sampled, and marked for forced reporting downstream.
    pub fn debug() -> Self {
        SamplingFlags {
            sampled: Some(true),
            debug: true,
            sampled_local: false,
        }
    }

    /// The primary sampling decision, if one has been made.
    ///
    /// Debug traces always report as sampled.
    pub fn is_sampled(&self) -> Option<bool> {
        if self.debug {
            return Some(true);
        }
        self.sampled
    }

    /// Whether this trace was marked for forced reporting.
    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Whether recording is forced for the current process.
    #[inline]
    pub fn is_sampled_local(&self) -> bool {
        self.sampled_local
    }

    /// Overrides the primary decision.
    pub fn set_sampled(&mut self, decision: bool) {
        self.sampled = Some(decision);
    }

    /// Forces recording for the current process without touching the primary
    /// decision.
    pub fn set_sampled_local(&mut self) {
        self.sampled_local = true;
    }
}

/// An in-process handle carrying the primary trace/span identifiers, the
/// sampling decision, and any attached extras.
#[derive(Clone)]
pub struct TraceContext {
    inner: Arc<Inner>,
}

struct Inner {
    trace_id: u128,
    parent_id: Option<u64>,
    span_id: u64,
    flags: SamplingFlags,
    extra: Vec<Extra>,
}

/// Constructs [`TraceContext`]s.
#[derive(Default)]
pub struct Builder {
    trace_id: u128,
    parent_id: Option<u64>,
    span_id: u64,
    flags: SamplingFlags,
    extra: Vec<Extra>,
}

// === impl TraceContext ===

impl TraceContext {
    /// Returns a new context builder.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a builder initialized with this context's state, including its
    /// extras.
    pub fn to_builder(&self) -> Builder {
        Builder {
            trace_id: self.inner.trace_id,
            parent_id: self.inner.parent_id,
            span_id: self.inner.span_id,
            flags: self.inner.flags,
            extra: self.inner.extra.clone(),
        }
    }

    /// The 128-bit trace identifier.
    #[inline]
    pub fn trace_id(&self) -> u128 {
        self.inner.trace_id
    }

    /// The parent span identifier, if this is not a root span.
    #[inline]
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent_id
    }

    /// The span identifier.
    #[inline]
    pub fn span_id(&self) -> u64 {
        self.inner.span_id
    }

    /// The sampling state of this trace.
    #[inline]
    pub fn flags(&self) -> SamplingFlags {
        self.inner.flags
    }

    /// Shorthand for `flags().is_sampled()`.
    pub fn is_sampled(&self) -> Option<bool> {
        self.inner.flags.is_sampled()
    }

    /// Shorthand for `flags().is_sampled_local()`.
    pub fn is_sampled_local(&self) -> bool {
        self.inner.flags.is_sampled_local()
    }

    /// All extras attached to this context.
    pub fn extra(&self) -> &[Extra] {
        &self.inner.extra
    }

    /// Returns the first attached extra of type `T`, if any.
    pub fn find_extra<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner
            .extra
            .iter()
            .find_map(|e| (**e).downcast_ref::<T>())
    }

    /// Like [`find_extra`](Self::find_extra), but returns a shared handle.
    pub fn find_extra_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner
            .extra
            .iter()
            .find(|e| (***e).is::<T>())
            .and_then(|e| e.clone().downcast::<T>().ok())
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("trace_id", &format_args!("{:032x}", self.inner.trace_id))
            .field("parent_id", &self.inner.parent_id)
            .field("span_id", &format_args!("{:016x}", self.inner.span_id))
            .field("flags", &self.inner.flags)
            .field("extra", &format_args!("[{} extras]", self.inner.extra.len()))
            .finish()
    }
}

impl PartialEq for TraceContext {
    /// Contexts compare by identity: trace id and span id.
    fn eq(&self, other: &Self) -> bool {
        self.inner.trace_id == other.inner.trace_id && self.inner.span_id == other.inner.span_id
    }
}

impl Eq for TraceContext {}

// === impl Builder ===

impl Builder {
    /// Sets the 128-bit trace identifier.
    pub fn trace_id(mut self, trace_id: u128) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Sets the parent span identifier.
    pub fn parent_id(mut self, parent_id: impl Into<Option<u64>>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Sets the span identifier.
    pub fn span_id(mut self, span_id: u64) -> Self {
        self.span_id = span_id;
        self
    }

    /// Sets the sampling state.
    pub fn flags(mut self, flags: SamplingFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attaches an extra.
    pub fn add_extra(mut self, extra: Extra) -> Self {
        self.extra.push(extra);
        self
    }

    /// Attaches `extra`, first removing any existing extra of the same type.
    pub fn replace_extra<T: Any + Send + Sync>(mut self, extra: Arc<T>) -> Self {
        self.extra.retain(|e| !(**e).is::<T>());
        self.extra.push(extra);
        self
    }

    /// Builds the context.
    pub fn build(self) -> TraceContext {
        TraceContext {
            inner: Arc::new(Inner {
                trace_id: self.trace_id,
                parent_id: self.parent_id,
                span_id: self.span_id,
                flags: self.flags,
                extra: self.extra,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TraceContext {
        TraceContext::builder()
            .trace_id(1)
            .span_id(2)
            .flags(SamplingFlags::sampled(true))
            .build()
    }

    #[test]
    fn debug_implies_sampled() {
        assert_eq!(SamplingFlags::debug().is_sampled(), Some(true));
    }

    #[test]
    fn find_extra_by_type() {
        let ctx = context().to_builder().add_extra(Arc::new(31_u64)).build();
        assert_eq!(ctx.find_extra::<u64>(), Some(&31));
        assert_eq!(ctx.find_extra::<u32>(), None);
        assert_eq!(ctx.find_extra_arc::<u64>().as_deref(), Some(&31));
    }

    #[test]
    fn replace_extra_removes_same_type() {
        let ctx = context()
            .to_builder()
            .add_extra(Arc::new(1_u64))
            .replace_extra(Arc::new(2_u64))
            .build();
        assert_eq!(ctx.extra().len(), 1);
        assert_eq!(ctx.find_extra::<u64>(), Some(&2));
    }

    #[test]
    fn to_builder_round_trips() {
        let ctx = context();
        let copy = ctx.to_builder().build();
        assert_eq!(ctx, copy);
        assert_eq!(copy.is_sampled(), Some(true));
    }
}
