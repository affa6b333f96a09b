//! Per-context storage for extra-field values.
use crate::plan::{FieldName, KeyPlan};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// One slot per logical field, guarded independently so concurrent readers
/// never observe a partial write. No ordering is imposed across slots; the
/// later write to a slot wins.
enum Slot {
    /// Not written here; reads fall through to the parent store.
    Inherited,
    Set(Arc<str>),
    /// Written as absent, shadowing any parent value.
    Cleared,
}

/// Holds the extra-field values of one trace context.
///
/// A store is indexed by the [`KeyPlan`] it was created with and is attached
/// to a single context (as an extra); it lives as long as that context does.
/// A child store created by [`Factory::decorate`](crate::Factory::decorate)
/// inherits its parent's values lazily and shadows them on first write, so a
/// child scope sees parent fields but cannot corrupt them.
pub struct FieldStore {
    plan: Arc<KeyPlan>,
    parent: Option<Arc<FieldStore>>,
    slots: Vec<RwLock<Slot>>,
}

impl FieldStore {
    /// An empty store for `plan`.
    pub fn new(plan: Arc<KeyPlan>) -> Self {
        let slots = (0..plan.len()).map(|_| RwLock::new(Slot::Inherited)).collect();
        FieldStore {
            plan,
            parent: None,
            slots,
        }
    }

    /// A store that inherits unset slots from `parent`.
    pub fn child_of(parent: Arc<FieldStore>) -> Self {
        let plan = parent.plan.clone();
        let slots = (0..plan.len()).map(|_| RwLock::new(Slot::Inherited)).collect();
        FieldStore {
            plan,
            parent: Some(parent),
            slots,
        }
    }

    /// The plan this store is indexed by.
    pub fn plan(&self) -> &Arc<KeyPlan> {
        &self.plan
    }

    /// Reads the value at `index`, consulting the parent chain for slots not
    /// written here.
    pub fn get(&self, index: usize) -> Option<Arc<str>> {
        match *self.slots[index].read() {
            Slot::Set(ref value) => Some(value.clone()),
            Slot::Cleared => None,
            Slot::Inherited => self.parent.as_ref().and_then(|p| p.get(index)),
        }
    }

    /// Writes the value at `index`. Writing `None` clears the slot, shadowing
    /// any parent value.
    pub fn put(&self, index: usize, value: Option<&str>) {
        *self.slots[index].write() = match value {
            Some(value) => Slot::Set(value.into()),
            None => Slot::Cleared,
        };
    }

    /// Reads a field by name, folding ASCII case.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<str>> {
        self.get(self.plan.index_of(name)?)
    }

    /// Writes a field by name, folding ASCII case. Returns `false` when no
    /// such field is configured.
    pub fn put_by_name(&self, name: &str, value: Option<&str>) -> bool {
        match self.plan.index_of(name) {
            Some(index) => {
                self.put(index, value);
                true
            }
            None => false,
        }
    }

    /// A snapshot of all set fields, in plan order, resolved through the
    /// parent chain.
    pub fn to_map(&self) -> IndexMap<FieldName, Arc<str>> {
        let mut map = IndexMap::with_capacity(self.plan.len());
        for (index, field) in self.plan.fields().iter().enumerate() {
            if let Some(value) = self.get(index) {
                map.insert(field.clone(), value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanBuilder;

    fn plan(names: &[&str]) -> Arc<KeyPlan> {
        let mut builder = PlanBuilder::default();
        for name in names {
            builder.direct(name).unwrap();
        }
        Arc::new(builder.build())
    }

    #[test]
    fn put_then_get() {
        let store = FieldStore::new(plan(&["a", "b"]));
        store.put(0, Some("one"));
        assert_eq!(store.get(0).as_deref(), Some("one"));
        assert_eq!(store.get(1), None);
        store.put(0, None);
        assert_eq!(store.get(0), None);
    }

    #[test]
    fn lookups_fold_case() {
        let store = FieldStore::new(plan(&["user-id"]));
        assert!(store.put_by_name("User-Id", Some("romeo")));
        assert_eq!(store.get_by_name("USER-ID").as_deref(), Some("romeo"));
        assert!(!store.put_by_name("unknown", Some("x")));
    }

    #[test]
    fn child_inherits_until_written() {
        let parent = Arc::new(FieldStore::new(plan(&["a", "b"])));
        parent.put(0, Some("parent-a"));
        parent.put(1, Some("parent-b"));

        let child = FieldStore::child_of(parent.clone());
        assert_eq!(child.get(0).as_deref(), Some("parent-a"));

        child.put(0, Some("child-a"));
        child.put(1, None);
        assert_eq!(child.get(0).as_deref(), Some("child-a"));
        assert_eq!(child.get(1), None);

        // The parent is not corrupted by child writes.
        assert_eq!(parent.get(0).as_deref(), Some("parent-a"));
        assert_eq!(parent.get(1).as_deref(), Some("parent-b"));
    }

    #[test]
    fn parent_writes_visible_through_unwritten_child_slots() {
        let parent = Arc::new(FieldStore::new(plan(&["a"])));
        let child = FieldStore::child_of(parent.clone());
        parent.put(0, Some("late"));
        assert_eq!(child.get(0).as_deref(), Some("late"));
    }

    #[test]
    fn to_map_is_in_plan_order() {
        let store = FieldStore::new(plan(&["a", "b", "c"]));
        store.put(2, Some("three"));
        store.put(0, Some("one"));
        let map = store.to_map();
        let entries: Vec<_> = map
            .iter()
            .map(|(k, v)| (k.as_str().to_owned(), v.to_string()))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("a".to_owned(), "one".to_owned()),
                ("c".to_owned(), "three".to_owned()),
            ]
        );
    }
}
