//! The wire format of the sampling field.
//!
//! A value encodes zero or more systems, semicolon-separated:
//!
//! ```text
//! <system>(:<k>=<v>(,<k>=<v>)*)?(;<system>...)*
//! ```
//!
//! System names match `[a-z][a-z0-9-]*`. Unparseable segments are dropped
//! while the rest of the value is kept; empty parameter parts are tolerated
//! on ingress and canonicalized away on egress. Parameters keep their arrival
//! order so a segment this process does not touch re-serializes
//! byte-identically.

/// One system segment: a name and its ordered parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct System {
    pub(crate) name: Box<str>,
    pub(crate) params: Vec<(Box<str>, Box<str>)>,
}

impl System {
    pub(crate) fn bare(name: &str) -> System {
        System {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, v)| &**v)
    }

    /// Replaces `key` in place, or appends it.
    pub(crate) fn set_param(&mut self, key: &str, value: &str) {
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| &**k == key) {
            slot.1 = value.into();
        } else {
            self.params.push((key.into(), value.into()));
        }
    }

    /// Removes any existing `key` and reinserts it first.
    pub(crate) fn set_param_front(&mut self, key: &str, value: &str) {
        self.remove_param(key);
        self.params.insert(0, (key.into(), value.into()));
    }

    pub(crate) fn remove_param(&mut self, key: &str) {
        self.params.retain(|(k, _)| &**k != key);
    }
}

pub(crate) fn valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b'a'..=b'z') => {}
        _ => return false,
    }
    bytes.all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-'))
}

pub(crate) fn parse(value: &str) -> Vec<System> {
    value.split(';').filter_map(parse_segment).collect()
}

fn parse_segment(segment: &str) -> Option<System> {
    let segment = segment.trim();
    let (name, params) = match segment.split_once(':') {
        Some((name, params)) => (name, Some(params)),
        None => (segment, None),
    };
    if !valid_name(name) {
        return None;
    }
    let mut system = System::bare(name);
    if let Some(params) = params {
        for pair in params.split(',') {
            let pair = pair.trim();
            if let Some((key, value)) = pair.split_once('=') {
                if !key.is_empty() && !value.is_empty() {
                    system.params.push((key.into(), value.into()));
                }
            }
        }
    }
    Some(system)
}

pub(crate) fn serialize(systems: &[System]) -> String {
    let mut out = String::new();
    for system in systems {
        if !out.is_empty() {
            out.push(';');
        }
        out.push_str(&system.name);
        for (i, (key, value)) in system.params.iter().enumerate() {
            out.push(if i == 0 { ':' } else { ',' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
    }
    out
}
