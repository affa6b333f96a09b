//! Core primitives for trace-context propagation.
//!
//! This crate defines the vocabulary shared by every component that moves
//! trace state across process boundaries:
//!
//! - [`TraceContext`] and [`SamplingFlags`]: the in-process handle for one
//!   node of a distributed trace, with type-erased extras attached by
//!   propagation components;
//! - [`Propagation`], [`Getter`] and [`Setter`]: the contract for reading
//!   and writing trace state through transport carriers;
//! - [`Extraction`]: the mutable result of one extraction, which plugins may
//!   decorate with extras and per-process sampling overrides;
//! - [`FinishedSpanHandler`] and [`SpanRecord`]: the hook invoked as the
//!   tracer finalizes each span;
//! - [`current`]: the per-thread current-context scope stack;
//! - [`b3`]: a single-header primary codec for the `b3` format.
//!
//! Like the tracer it serves, everything here is invoked synchronously on
//! application threads. Nothing in this crate blocks, spawns, or fails the
//! host request: carrier misses are `None`, malformed wire data extracts as
//! empty, and hot-path operations return nothing.
//!
//! Higher-level crates build on these primitives: `baggage` composes a
//! primary propagation with named extra fields, and `baggage-sampling` layers
//! participant-level sampling on top of that.
pub mod b3;
pub mod context;
pub mod current;
pub mod extraction;
pub mod propagation;
pub mod span;

pub use self::context::{Extra, SamplingFlags, TraceContext};
pub use self::extraction::Extraction;
pub use self::propagation::{Getter, Propagation, Setter};
pub use self::span::{FinishedSpanHandler, Kind, SpanRecord};
