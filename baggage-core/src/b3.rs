//! B3 single-header propagation.
//!
//! Encodes the primary trace state as one `b3` value:
//!
//! ```text
//! {trace_id}-{span_id}-{sampling}-{parent_id}
//! ```
//!
//! where `trace_id` is 16 or 32 lowercase hex characters, `span_id` and
//! `parent_id` are 16, and `sampling` is `0`, `1`, or `d` (debug). The value
//! may also be a bare sampling character when the upstream made a decision
//! without starting a trace. Sampling and parent segments are optional.
use crate::context::{SamplingFlags, TraceContext};
use crate::extraction::Extraction;
use crate::propagation::{Getter, Propagation, Setter};
use std::fmt::Write;

const KEY: &str = "b3";

/// [`Propagation`] for the single-value `b3` format.
#[derive(Clone, Copy, Debug, Default)]
pub struct B3SinglePropagation;

impl Propagation for B3SinglePropagation {
    fn keys(&self) -> Vec<String> {
        vec![KEY.to_owned()]
    }

    fn extract(&self, carrier: &dyn Getter) -> Extraction {
        match carrier.get(KEY) {
            Some(value) => parse(value),
            None => Extraction::empty(),
        }
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Setter) {
        let mut value = String::with_capacity(68);
        let _ = write!(value, "{:032x}-{:016x}", context.trace_id(), context.span_id());
        let flags = context.flags();
        let sampling = if flags.is_debug() {
            Some('d')
        } else {
            flags.is_sampled().map(|s| if s { '1' } else { '0' })
        };
        if let Some(ch) = sampling {
            value.push('-');
            value.push(ch);
            // The parent segment is only valid after a sampling segment.
            if let Some(parent_id) = context.parent_id() {
                let _ = write!(value, "-{:016x}", parent_id);
            }
        }
        carrier.set(KEY, &value);
    }
}

fn parse(value: &str) -> Extraction {
    match value {
        "0" => return Extraction::with_flags(SamplingFlags::sampled(false)),
        "1" => return Extraction::with_flags(SamplingFlags::sampled(true)),
        "d" => return Extraction::with_flags(SamplingFlags::debug()),
        _ => {}
    }

    let mut segments = value.split('-');
    let trace_id = match segments.next().and_then(parse_trace_id) {
        Some(id) => id,
        None => return Extraction::empty(),
    };
    let span_id = match segments.next().and_then(parse_span_id) {
        Some(id) => id,
        None => return Extraction::empty(),
    };

    let mut flags = SamplingFlags::EMPTY;
    let mut parent_id = None;
    if let Some(sampling) = segments.next() {
        flags = match sampling {
            "0" => SamplingFlags::sampled(false),
            "1" => SamplingFlags::sampled(true),
            "d" => SamplingFlags::debug(),
            _ => return Extraction::empty(),
        };
        if let Some(parent) = segments.next() {
            parent_id = match parse_span_id(parent) {
                Some(id) => Some(id),
                None => return Extraction::empty(),
            };
        }
    }
    if segments.next().is_some() {
        return Extraction::empty();
    }

    let context = TraceContext::builder()
        .trace_id(trace_id)
        .span_id(span_id)
        .parent_id(parent_id)
        .flags(flags)
        .build();
    Extraction::with_context(context)
}

fn parse_trace_id(hex: &str) -> Option<u128> {
    if hex.len() != 16 && hex.len() != 32 {
        return None;
    }
    match u128::from_str_radix(hex, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

fn parse_span_id(hex: &str) -> Option<u64> {
    if hex.len() != 16 {
        return None;
    }
    match u64::from_str_radix(hex, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}
