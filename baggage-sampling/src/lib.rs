//! Participant-level secondary sampling, carried as a baggage field.
//!
//! The primary sampling decision is all-or-nothing for a trace. Secondary
//! sampling lets additional _systems_ (named consumers of tracing data such
//! as `edge` or `triage`) ride the same transport and decide independently,
//! without disturbing the primary decision or each other.
//!
//! The overlay is a [`Plugin`] on one configured field (by default
//! `sampling`) whose wire value lists the participating systems:
//!
//! ```text
//! sampling: edge:ttl=3;links:sampled=1;triage:tps=5
//! ```
//!
//! On extraction, every system configured in this process is put through a
//! small state machine: an explicit `sampled=1` (or a bare name) records, a
//! `ttl` budget is decremented per hop and the segment expires at 1, and a
//! `tps` rate is admitted through a per-system limiter. A system that records
//! forces local recording (`sampled_local`) and is remembered so the
//! finished span can be routed to that system's registered handler. Systems
//! not configured here pass through byte-identically.
//!
//! ```
//! use baggage_core::b3::B3SinglePropagation;
//! use baggage_core::{FinishedSpanHandler, SpanRecord, TraceContext};
//! use baggage_sampling::SecondarySampling;
//! use std::sync::Arc;
//!
//! struct Edge;
//! impl FinishedSpanHandler for Edge {
//!     fn handle(&self, _: &TraceContext, _: &mut SpanRecord) -> bool {
//!         true
//!     }
//! }
//!
//! let sampling = SecondarySampling::new();
//! sampling.register("edge", Arc::new(Edge)).unwrap();
//!
//! let factory = baggage::FactoryBuilder::new(B3SinglePropagation)
//!     .add_plugin(sampling.clone())
//!     .build()
//!     .unwrap();
//! ```
//!
//! Registration is dynamic: [`register`](SecondarySampling::register) and
//! [`deregister`](SecondarySampling::deregister) publish a new policy
//! snapshot that subsequent extractions pick up without locking on the hot
//! path. An extraction keeps the snapshot it decided with, so routing a span
//! finished later still reaches the handlers that were configured when its
//! context arrived.
mod format;
mod handler;
mod sampler;
mod state;

pub use self::state::SamplingState;

use crate::format::System;
use crate::handler::RoutingHandler;
use crate::sampler::RateLimiter;
use arc_swap::ArcSwap;
use baggage::{ExtractUpdater, FieldName, InjectUpdater, Plugin, Update};
use baggage_core::{Extraction, FinishedSpanHandler, TraceContext};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_FIELD: &str = "sampling";

/// A system name that does not match `[a-z][a-z0-9-]*`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("system names must match [a-z][a-z0-9-]*, got `{0}`")]
pub struct InvalidSystem(String);

/// What this process does for one registered system.
pub(crate) struct SystemPolicy {
    pub(crate) handler: Arc<dyn FinishedSpanHandler>,
    limiter: RateLimiter,
}

pub(crate) type Policies = HashMap<Box<str>, Arc<SystemPolicy>>;

/// The secondary-sampling overlay: a registry of locally configured systems
/// and the [`Plugin`] that applies their decisions on every hop.
///
/// Share one instance between the factory (as a plugin) and whatever code
/// registers systems at runtime.
pub struct SecondarySampling {
    field: FieldName,
    policies: ArcSwap<Policies>,
    router: Arc<RoutingHandler>,
}

/// Configures a [`SecondarySampling`] overlay.
pub struct Builder {
    field: String,
}

impl Builder {
    /// Sets the wire key the overlay parses and serializes. Defaults to
    /// `sampling`.
    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field = name.into();
        self
    }

    pub fn build(self) -> Result<Arc<SecondarySampling>, baggage::BuildError> {
        Ok(Arc::new(SecondarySampling {
            field: FieldName::new(&self.field)?,
            policies: ArcSwap::from_pointee(Policies::new()),
            router: Arc::new(RoutingHandler),
        }))
    }
}

impl SecondarySampling {
    /// An overlay on the default `sampling` field.
    pub fn new() -> Arc<Self> {
        Self::builder()
            .build()
            .expect("the default field name is non-empty")
    }

    pub fn builder() -> Builder {
        Builder {
            field: DEFAULT_FIELD.to_owned(),
        }
    }

    /// Configures `system` locally, routing its recorded spans to `handler`.
    ///
    /// Takes effect for subsequent extractions. Re-registering a system
    /// replaces its handler and resets its rate-limiter window.
    pub fn register(
        &self,
        system: &str,
        handler: Arc<dyn FinishedSpanHandler>,
    ) -> Result<(), InvalidSystem> {
        if !format::valid_name(system) {
            return Err(InvalidSystem(system.to_owned()));
        }
        let policy = Arc::new(SystemPolicy {
            handler,
            limiter: RateLimiter::new(),
        });
        self.update_policies(|map| {
            map.insert(system.into(), policy.clone());
        });
        Ok(())
    }

    /// Removes `system` from the local configuration. Subsequent extractions
    /// pass its wire state through untouched.
    pub fn deregister(&self, system: &str) -> bool {
        let mut removed = false;
        self.update_policies(|map| {
            removed = map.remove(system).is_some();
        });
        removed
    }

    /// Whether `system` is currently configured in this process.
    pub fn is_configured(&self, system: &str) -> bool {
        self.policies.load().contains_key(system)
    }

    fn update_policies(&self, mut apply: impl FnMut(&mut Policies)) {
        loop {
            let current = self.policies.load_full();
            let mut next = Policies::clone(&current);
            apply(&mut next);
            let previous = self.policies.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                return;
            }
        }
    }
}

impl Plugin for SecondarySampling {
    fn fields(&self) -> Vec<FieldName> {
        vec![self.field.clone()]
    }

    fn extract_updater(&self) -> Option<Box<dyn ExtractUpdater + '_>> {
        Some(Box::new(ExtractPass {
            field: &self.field,
            policies: self.policies.load_full(),
        }))
    }

    fn inject_updater(&self) -> Option<Box<dyn InjectUpdater + '_>> {
        Some(Box::new(InjectPass { field: &self.field }))
    }

    fn finished_span_handler(&self) -> Option<Arc<dyn FinishedSpanHandler>> {
        Some(self.router.clone())
    }
}

enum Verdict {
    /// The system sampled this hop.
    Record,
    /// Leave the segment as it arrived.
    Pass,
    /// The hop budget ran out; the segment is dropped without recording.
    Expired,
}

/// Applies the per-system state machine to one locally configured segment.
fn decide(system: &mut System, policy: &SystemPolicy) -> Verdict {
    let sampled = match system.param("sampled") {
        Some("1") => Some(true),
        Some("0") => Some(false),
        // Malformed decisions read as absent; recording rewrites them.
        _ => None,
    };
    if sampled == Some(false) {
        return Verdict::Pass;
    }
    if sampled.is_none() {
        // An explicit decision upstream wins over the rate; otherwise admit
        // through this system's limiter.
        let tps = system.param("tps").map(|v| v.parse::<u64>());
        match tps {
            Some(Ok(rate)) if rate > 0 => {
                if !policy.limiter.try_acquire(rate) {
                    return Verdict::Pass;
                }
            }
            Some(_) => system.remove_param("tps"),
            None => {}
        }
    }

    let ttl = system.param("ttl").map(|v| v.parse::<u64>());
    match ttl {
        Some(Ok(1)) => return Verdict::Expired,
        Some(Ok(n)) if n > 1 => system.set_param("ttl", &(n - 1).to_string()),
        Some(_) => system.remove_param("ttl"),
        None => {}
    }
    system.set_param_front("sampled", "1");
    Verdict::Record
}

struct ExtractPass<'a> {
    field: &'a FieldName,
    policies: Arc<Policies>,
}

impl ExtractUpdater for ExtractPass<'_> {
    fn update(
        &mut self,
        extraction: &mut Extraction,
        field: &FieldName,
        value: Option<&str>,
    ) -> Update {
        if field != self.field {
            return Update::Keep;
        }

        let mut kept = Vec::new();
        let mut recorded: Vec<Box<str>> = Vec::new();
        if let Some(value) = value {
            for mut system in format::parse(value) {
                match self.policies.get(&system.name) {
                    Some(policy) => match decide(&mut system, policy) {
                        Verdict::Record => {
                            if !recorded.contains(&system.name) {
                                recorded.push(system.name.clone());
                            }
                            extraction.sample_local();
                            kept.push(system);
                        }
                        Verdict::Pass => kept.push(system),
                        Verdict::Expired => {}
                    },
                    None => kept.push(system),
                }
            }
        }

        let state = SamplingState::new(kept, recorded, self.policies.clone());
        let serialized = state.serialize();
        extraction.add_extra(Arc::new(state));
        if serialized.is_empty() {
            Update::Clear
        } else {
            Update::Set(serialized)
        }
    }
}

struct InjectPass<'a> {
    field: &'a FieldName,
}

impl InjectUpdater for InjectPass<'_> {
    fn update(&mut self, context: &TraceContext, field: &FieldName, _: Option<&str>) -> Update {
        if field != self.field {
            return Update::Keep;
        }
        match context.find_extra::<SamplingState>() {
            Some(state) => {
                let serialized = state.serialize();
                if serialized.is_empty() {
                    Update::Clear
                } else {
                    Update::Set(serialized)
                }
            }
            None => Update::Keep,
        }
    }
}
