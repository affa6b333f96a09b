//! Named extra-field propagation over a primary trace format.
//!
//! Distributed traces carry more than identifiers: request-scoped fields such
//! as a request id, a country code, or an experiment name need to follow the
//! trace across process boundaries. This crate composes a primary
//! [`Propagation`] (B3 or equivalent) with a configured set of named string
//! fields, and lets plugins observe and rewrite those fields as they are
//! extracted from and injected into carriers.
//!
//! # Configuring fields
//!
//! A [`Factory`] is built once and shared for the life of the process:
//!
//! ```
//! use baggage_core::b3::B3SinglePropagation;
//!
//! let factory = baggage::FactoryBuilder::new(B3SinglePropagation)
//!     .add_field("x-vcap-request-id")
//!     .add_prefixed_fields("baggage-", ["country-code", "user-id"])
//!     .build()
//!     .unwrap();
//! ```
//!
//! `x-vcap-request-id` travels under its own name; `country-code` and
//! `user-id` travel as `baggage-country-code` and `baggage-user-id`. Several
//! wire keys may alias one logical field; in-process code always addresses
//! fields by their logical (lowercase) names.
//!
//! # Reading and writing fields
//!
//! Values live in a [`FieldStore`] attached to the trace context. The
//! accessors in this crate resolve against an explicit context, an extraction
//! result, or the current context published by the tracer:
//!
//! ```
//! # use baggage_core::b3::B3SinglePropagation;
//! # let factory = baggage::Factory::new(B3SinglePropagation, ["user-id"]).unwrap();
//! let context = factory.decorate(
//!     &baggage_core::TraceContext::builder().trace_id(1).span_id(1).build(),
//! );
//! baggage::set_in(&context, "User-Id", "romeo");
//! assert_eq!(baggage::get_in(&context, "user-id").as_deref(), Some("romeo"));
//! ```
//!
//! # Plugins
//!
//! A [`Plugin`] sees every configured field on every extraction and
//! injection, in configured order, and may keep, rewrite, or delete each
//! value. Plugins drive sampling overlays (see the `baggage-sampling` crate),
//! redaction, and similar policies. Fields declared with
//! [`FactoryBuilder::add_redacted_field`] are usable in-process but are
//! stripped by an always-last redaction stage on egress, no matter what other
//! plugins decide.
//!
//! A panicking plugin or finished-span handler never takes the host request
//! down with it: failures are logged through `tracing` and the value (or
//! span) in question is treated conservatively.
pub mod pipeline;
pub mod plan;
pub mod plugin;
pub mod propagation;
pub mod store;

pub use self::pipeline::FinishedSpanPipeline;
pub use self::plan::{BuildError, FieldName, KeyPlan};
pub use self::plugin::{ExtractUpdater, InjectUpdater, Plugin, PluginChain, Update};
pub use self::propagation::{ExtraFieldPropagation, Factory, FactoryBuilder};
pub use self::store::FieldStore;

use baggage_core::{current, Extraction, TraceContext};
use indexmap::IndexMap;

/// Returns the value of `name` in the current context, folding ASCII case.
pub fn get(name: &str) -> Option<String> {
    current::current().and_then(|ctx| get_in(&ctx, name))
}

/// Returns the value of `name` in `context`, folding ASCII case.
pub fn get_in(context: &TraceContext, name: &str) -> Option<String> {
    context
        .find_extra::<FieldStore>()?
        .get_by_name(name)
        .map(|v| v.to_string())
}

/// Sets `name` to `value` in the current context.
///
/// Does nothing when no context is current, or when the current context has
/// no field store or no such field configured.
pub fn set(name: &str, value: &str) {
    if let Some(ctx) = current::current() {
        set_in(&ctx, name, value);
    }
}

/// Sets `name` to `value` in `context`, folding ASCII case.
///
/// Contexts created by extraction or by [`Factory::decorate`] carry a field
/// store; on a context without one this is a no-op.
pub fn set_in(context: &TraceContext, name: &str, value: &str) {
    match context.find_extra::<FieldStore>() {
        Some(store) => {
            store.put_by_name(name, Some(value));
        }
        None => {
            tracing::debug!(field = name, "context has no field store; value dropped");
        }
    }
}

/// All set fields of the current context, in configured order.
pub fn get_all() -> IndexMap<String, String> {
    current::current().map(|ctx| get_all_in(&ctx)).unwrap_or_default()
}

/// All set fields of `context`, in configured order.
pub fn get_all_in(context: &TraceContext) -> IndexMap<String, String> {
    context
        .find_extra::<FieldStore>()
        .map(store_map)
        .unwrap_or_default()
}

/// All fields captured by an extraction, in configured order.
pub fn get_all_extracted(extraction: &Extraction) -> IndexMap<String, String> {
    extraction
        .find_extra::<FieldStore>()
        .map(store_map)
        .unwrap_or_default()
}

fn store_map(store: &FieldStore) -> IndexMap<String, String> {
    store
        .to_map()
        .into_iter()
        .map(|(k, v)| (k.as_str().to_owned(), v.to_string()))
        .collect()
}
