//! Field names, wire keys, and the immutable plan mapping one to the other.
//!
//! A [`KeyPlan`] is the frozen description a factory builds once and every
//! context created by that factory shares: the logical field names (the names
//! plugins and in-process code see), the wire keys (the names values travel
//! under on a carrier), and the mapping from each wire key to the field it
//! feeds. Several wire keys may alias one field; every field is reachable
//! from at least one wire key.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

/// An interned logical field name.
///
/// Names are non-empty and always lowercase; lookups by name fold ASCII case,
/// so `FieldName::new("X-User-Id")` and a runtime lookup of `"x-user-id"`
/// refer to the same field.
#[derive(Clone, Eq)]
pub struct FieldName(Arc<str>);

impl FieldName {
    /// Interns `name`, folding it to lowercase.
    pub fn new(name: &str) -> Result<Self, BuildError> {
        if name.is_empty() {
            return Err(BuildError::EmptyFieldName);
        }
        Ok(FieldName(name.to_ascii_lowercase().into()))
    }

    /// The interned (lowercase) name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded comparison against an arbitrary name.
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<str> for FieldName {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An error building a propagation factory.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// A field name was empty.
    #[error("field names must be non-empty")]
    EmptyFieldName,
    /// A wire-key prefix was empty.
    #[error("wire-key prefixes must be non-empty")]
    EmptyPrefix,
    /// The same field was declared redacted more than once.
    #[error("field `{0}` was declared redacted more than once")]
    DuplicateRedaction(String),
}

/// One wire key and the field it feeds.
#[derive(Clone, Debug)]
pub(crate) struct WireKey {
    pub(crate) name: Box<str>,
    pub(crate) field: usize,
    /// Ingress-only aliases are read on extraction but never written on
    /// injection.
    pub(crate) injected: bool,
}

/// The immutable field/wire-key mapping shared by all contexts a factory
/// creates.
#[derive(Debug)]
pub struct KeyPlan {
    fields: Vec<FieldName>,
    keys: Vec<WireKey>,
}

impl KeyPlan {
    /// The logical field names, in configured order.
    pub fn fields(&self) -> &[FieldName] {
        &self.fields
    }

    /// Resolves `name` to its field index, folding ASCII case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.matches(name))
    }

    /// The number of logical fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All wire keys, in configured order.
    pub(crate) fn keys(&self) -> &[WireKey] {
        &self.keys
    }

    /// All wire-key names, for `Propagation::keys`.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| &*k.name)
    }
}

/// Accumulates field declarations and freezes them into a [`KeyPlan`].
#[derive(Default)]
pub(crate) struct PlanBuilder {
    fields: Vec<FieldName>,
    keys: Vec<WireKey>,
}

impl PlanBuilder {
    /// Declares a field propagated under its own name.
    pub(crate) fn direct(&mut self, name: &str) -> Result<(), BuildError> {
        let field = FieldName::new(name)?;
        let index = self.field_index(&field);
        self.key(field.as_str(), index, true);
        Ok(())
    }

    /// Declares fields propagated under `prefix`-qualified wire keys.
    ///
    /// A name that already exists as a field gains the prefixed key as an
    /// alias. A new field keeps the prefixed key for both directions and
    /// additionally reads its bare name on ingress, so values sent by peers
    /// that do not prefix are still picked up.
    pub(crate) fn prefixed(&mut self, prefix: &str, name: &str) -> Result<(), BuildError> {
        if prefix.is_empty() {
            return Err(BuildError::EmptyPrefix);
        }
        let field = FieldName::new(name)?;
        let wire = {
            let mut wire = prefix.to_ascii_lowercase();
            wire.push_str(field.as_str());
            wire
        };
        match self.fields.iter().position(|f| *f == field) {
            Some(index) => self.key(&wire, index, true),
            None => {
                self.fields.push(field.clone());
                let index = self.fields.len() - 1;
                self.key(&wire, index, true);
                self.key(field.as_str(), index, false);
            }
        }
        Ok(())
    }

    pub(crate) fn build(self) -> KeyPlan {
        KeyPlan {
            fields: self.fields,
            keys: self.keys,
        }
    }

    fn field_index(&mut self, field: &FieldName) -> usize {
        if let Some(index) = self.fields.iter().position(|f| f == field) {
            return index;
        }
        self.fields.push(field.clone());
        self.fields.len() - 1
    }

    fn key(&mut self, name: &str, field: usize, injected: bool) {
        if let Some(existing) = self.keys.iter_mut().find(|k| *k.name == *name) {
            // A key declared both ingress-only and injectable is injectable.
            existing.injected |= injected;
            return;
        }
        self.keys.push(WireKey {
            name: name.into(),
            field,
            injected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_fold_to_lowercase() {
        let field = FieldName::new("X-User-Id").unwrap();
        assert_eq!(field.as_str(), "x-user-id");
        assert!(field.matches("X-USER-ID"));
    }

    #[test]
    fn empty_names_are_rejected() {
        assert_eq!(FieldName::new("").unwrap_err(), BuildError::EmptyFieldName);
    }

    #[test]
    fn direct_fields_map_identity_keys() {
        let mut builder = PlanBuilder::default();
        builder.direct("user-id").unwrap();
        builder.direct("user-id").unwrap();
        let plan = builder.build();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.keys().len(), 1);
        assert!(plan.keys()[0].injected);
        assert_eq!(plan.index_of("USER-ID"), Some(0));
    }

    #[test]
    fn prefixed_alias_on_existing_field() {
        let mut builder = PlanBuilder::default();
        builder.direct("user-id").unwrap();
        builder.prefixed("baggage-", "user-id").unwrap();
        let plan = builder.build();
        assert_eq!(plan.len(), 1);
        let keys: Vec<_> = plan.keys().iter().map(|k| (&*k.name, k.injected)).collect();
        assert_eq!(keys, vec![("user-id", true), ("baggage-user-id", true)]);
        assert_eq!(plan.keys()[1].field, 0);
    }

    #[test]
    fn prefixed_new_field_reads_bare_name_on_ingress_only() {
        let mut builder = PlanBuilder::default();
        builder.prefixed("baggage-", "country-code").unwrap();
        let plan = builder.build();
        assert_eq!(plan.len(), 1);
        let keys: Vec<_> = plan.keys().iter().map(|k| (&*k.name, k.injected)).collect();
        assert_eq!(
            keys,
            vec![("baggage-country-code", true), ("country-code", false)]
        );
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let mut builder = PlanBuilder::default();
        assert_eq!(
            builder.prefixed("", "country-code").unwrap_err(),
            BuildError::EmptyPrefix
        );
    }

    #[test]
    fn every_field_is_reachable_from_a_key() {
        let mut builder = PlanBuilder::default();
        builder.direct("a").unwrap();
        builder.prefixed("p-", "b").unwrap();
        builder.prefixed("q-", "a").unwrap();
        let plan = builder.build();
        for index in 0..plan.len() {
            assert!(
                plan.keys().iter().any(|k| k.field == index),
                "field {index} unreachable"
            );
        }
    }
}
