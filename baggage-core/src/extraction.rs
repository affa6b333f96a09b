//! The result of extracting trace state from a carrier.
use crate::context::{Extra, SamplingFlags, TraceContext};
use std::any::Any;
use std::fmt;

/// What a [`Propagation`](crate::Propagation) read out of a carrier.
///
/// An extraction may hold a complete upstream [`TraceContext`], or only bare
/// [`SamplingFlags`] when the carrier had a sampling hint but no identifiers,
/// or nothing at all (an empty, unsampled result). Extra-field components
/// append state to it while the extraction is in flight: attached extras, a
/// local-recording override, or a replacement primary decision.
pub struct Extraction {
    context: Option<TraceContext>,
    flags: SamplingFlags,
    extra: Vec<Extra>,
}

impl Extraction {
    /// An extraction with no identifiers and no sampling decision.
    pub fn empty() -> Self {
        Extraction {
            context: None,
            flags: SamplingFlags::EMPTY,
            extra: Vec::new(),
        }
    }

    /// An extraction carrying bare sampling flags.
    pub fn with_flags(flags: SamplingFlags) -> Self {
        Extraction {
            context: None,
            flags,
            extra: Vec::new(),
        }
    }

    /// An extraction carrying a complete upstream context.
    pub fn with_context(context: TraceContext) -> Self {
        let flags = context.flags();
        Extraction {
            context: Some(context),
            flags,
            extra: Vec::new(),
        }
    }

    /// The extracted upstream context, if the carrier had one.
    pub fn context(&self) -> Option<&TraceContext> {
        self.context.as_ref()
    }

    /// The sampling state of this extraction, including any overrides applied
    /// by extract-time updaters.
    pub fn flags(&self) -> SamplingFlags {
        self.flags
    }

    /// Forces recording for the current process without disturbing the
    /// upstream decision.
    pub fn sample_local(&mut self) {
        self.flags.set_sampled_local();
    }

    /// Overrides the primary decision for the rest of the trace.
    ///
    /// Reserved for overlays that intend to subsume the primary; most plugins
    /// should use [`sample_local`](Self::sample_local) instead.
    pub fn sample(&mut self, decision: bool) {
        self.flags.set_sampled(decision);
    }

    /// Attaches an extra to the extraction result.
    pub fn add_extra(&mut self, extra: Extra) {
        self.extra.push(extra);
    }

    /// Extras attached during extraction (not those already on the upstream
    /// context).
    pub fn extra(&self) -> &[Extra] {
        &self.extra
    }

    /// Returns the first attached extra of type `T`, searching extras attached
    /// during extraction and then the upstream context's.
    pub fn find_extra<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extra
            .iter()
            .find_map(|e| (**e).downcast_ref::<T>())
            .or_else(|| self.context.as_ref().and_then(TraceContext::find_extra))
    }

    /// Folds the extraction into a context, when one was extracted: the
    /// upstream identifiers with this extraction's sampling state and the
    /// union of both extra lists.
    ///
    /// Flags-only and empty extractions return `None`; minting identifiers
    /// for a new root is the tracer's job.
    pub fn into_context(self) -> Option<TraceContext> {
        let context = self.context?;
        let mut builder = context.to_builder().flags(self.flags);
        for extra in self.extra {
            builder = builder.add_extra(extra);
        }
        Some(builder.build())
    }
}

impl fmt::Debug for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extraction")
            .field("context", &self.context)
            .field("flags", &self.flags)
            .field("extra", &format_args!("[{} extras]", self.extra.len()))
            .finish()
    }
}
