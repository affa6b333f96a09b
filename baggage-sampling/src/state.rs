//! Per-trace sampling state, attached to the context as an extra.
use crate::format::{self, System};
use crate::{Policies, SystemPolicy};
use parking_lot::Mutex;
use std::sync::Arc;

/// What one extraction decided: the surviving per-system wire state, the
/// systems that recorded at this hop, and the policy snapshot the decision
/// was made with.
///
/// The state rides on the trace context. Injection re-serializes the system
/// map; finished-span routing dispatches through the captured snapshot, so
/// registry changes only affect subsequent extractions.
pub struct SamplingState {
    systems: Mutex<Vec<System>>,
    recorded: Vec<Box<str>>,
    policies: Arc<Policies>,
}

impl SamplingState {
    pub(crate) fn new(
        systems: Vec<System>,
        recorded: Vec<Box<str>>,
        policies: Arc<Policies>,
    ) -> Self {
        SamplingState {
            systems: Mutex::new(systems),
            recorded,
            policies,
        }
    }

    /// The current wire value: systems in arrival order, locally added ones
    /// at the end. Empty when no systems remain.
    pub fn serialize(&self) -> String {
        format::serialize(&self.systems.lock())
    }

    /// The systems that recorded at this hop, in wire order.
    pub fn recorded(&self) -> &[Box<str>] {
        &self.recorded
    }

    pub fn is_recorded(&self, name: &str) -> bool {
        self.recorded.iter().any(|r| &**r == name)
    }

    /// Appends a system to the outgoing wire state, marked sampled.
    ///
    /// Returns `false` when the name is invalid or the system is already
    /// present. Local additions do not record at this hop; they ask
    /// downstream hops to participate.
    pub fn add_system(&self, name: &str) -> bool {
        if !format::valid_name(name) {
            return false;
        }
        let mut systems = self.systems.lock();
        if systems.iter().any(|s| &*s.name == name) {
            return false;
        }
        let mut system = System::bare(name);
        system.set_param("sampled", "1");
        systems.push(system);
        true
    }

    pub(crate) fn policy(&self, name: &str) -> Option<Arc<SystemPolicy>> {
        self.policies.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn state(value: &str, recorded: &[&str]) -> SamplingState {
        SamplingState::new(
            format::parse(value),
            recorded.iter().map(|r| Box::from(*r)).collect(),
            Arc::new(HashMap::new()),
        )
    }

    #[test]
    fn serialize_preserves_arrival_order() {
        let state = state("links:sampled=1;triage:tps=5", &[]);
        assert_eq!(state.serialize(), "links:sampled=1;triage:tps=5");
    }

    #[test]
    fn local_additions_append_at_the_end() {
        let state = state("links:sampled=1", &[]);
        assert!(state.add_system("edge"));
        assert!(!state.add_system("edge"));
        assert!(!state.add_system("Bad"));
        assert_eq!(state.serialize(), "links:sampled=1;edge:sampled=1");
    }

    #[test]
    fn recorded_membership() {
        let state = state("links:sampled=1", &["links"]);
        assert!(state.is_recorded("links"));
        assert!(!state.is_recorded("edge"));
    }
}
