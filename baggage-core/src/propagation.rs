//! The propagation contract: how trace state crosses process boundaries.
//!
//! A [`Propagation`] reads trace state from, and writes it to, a transport
//! carrier: an HTTP header map, messaging headers, or anything else that can
//! answer string keys. Carriers are adapted through the [`Getter`] and
//! [`Setter`] traits so the propagation logic never depends on a transport.
use crate::context::TraceContext;
use crate::extraction::Extraction;
use std::collections::HashMap;

/// Reads wire keys from a carrier.
pub trait Getter {
    /// Returns the value for `key`, or `None` when the carrier has no such
    /// key. A miss is not an error.
    fn get(&self, key: &str) -> Option<&str>;
}

/// Writes wire keys to a carrier.
pub trait Setter {
    /// Writes `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str);
}

/// Injects and extracts trace state.
///
/// Implementations are shared process-wide and invoked synchronously on
/// application threads; they must never block or fail the host request.
pub trait Propagation: Send + Sync + 'static {
    /// The wire keys this propagation reads and writes, for instrumentation
    /// that needs to enumerate or clear them.
    fn keys(&self) -> Vec<String>;

    /// Reads trace state from `carrier`.
    ///
    /// Missing or malformed carrier state yields an empty, unsampled
    /// [`Extraction`]; extraction never fails.
    fn extract(&self, carrier: &dyn Getter) -> Extraction;

    /// Writes `context` to `carrier`.
    fn inject(&self, context: &TraceContext, carrier: &mut dyn Setter);
}

impl Getter for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

impl Setter for HashMap<String, String> {
    fn set(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }
}

impl<G: Getter + ?Sized> Getter for &G {
    fn get(&self, key: &str) -> Option<&str> {
        (**self).get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_carrier_round_trip() {
        let mut carrier = HashMap::new();
        Setter::set(&mut carrier, "b3", "1");
        assert_eq!(Getter::get(&carrier, "b3"), Some("1"));
        assert_eq!(Getter::get(&carrier, "other"), None);
    }
}
