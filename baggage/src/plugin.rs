//! The plugin contract and the chain that composes plugins.
//!
//! A [`Plugin`] observes and rewrites extra-field values as they cross a
//! process boundary. At build time it declares the logical fields it cares
//! about; at extract and inject time it produces a per-call [`ExtractUpdater`]
//! or [`InjectUpdater`] that is offered **every** configured field, in
//! configured order, whether or not a value is present. A plugin may also
//! contribute a [`FinishedSpanHandler`] that runs as spans complete.
//!
//! Plugins compose: a [`PluginChain`] is itself a plugin, so composition is
//! associative, and nested chains are flattened on construction to keep the
//! per-call updater array short.
use crate::plan::FieldName;
use baggage_core::{Extraction, FinishedSpanHandler, TraceContext};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What an updater decided about one field.
pub enum Update {
    /// Leave the value as the updater saw it.
    Keep,
    /// Replace the value.
    Set(String),
    /// Delete the value: it is neither stored nor written to the carrier.
    Clear,
}

/// A per-extraction updater.
///
/// The extraction is passed to every call so the updater can record
/// per-process sampling overrides or attach extras while values stream past.
pub trait ExtractUpdater {
    fn update(
        &mut self,
        extraction: &mut Extraction,
        field: &FieldName,
        value: Option<&str>,
    ) -> Update;
}

/// A per-injection updater, bound to the context being written out.
pub trait InjectUpdater {
    fn update(
        &mut self,
        context: &TraceContext,
        field: &FieldName,
        value: Option<&str>,
    ) -> Update;
}

/// A propagation plugin: declared fields plus per-call updater factories and
/// an optional finished-span hook.
pub trait Plugin: Send + Sync + 'static {
    /// The logical fields this plugin needs configured. Called once, at
    /// factory build time.
    fn fields(&self) -> Vec<FieldName>;

    /// Returns this call's extract-time updater, or `None` when the plugin
    /// does not participate in extraction.
    fn extract_updater(&self) -> Option<Box<dyn ExtractUpdater + '_>> {
        None
    }

    /// Returns this call's inject-time updater, or `None` when the plugin
    /// does not participate in injection.
    fn inject_updater(&self) -> Option<Box<dyn InjectUpdater + '_>> {
        None
    }

    /// A handler to run as spans finish, if this plugin wants one.
    fn finished_span_handler(&self) -> Option<Arc<dyn FinishedSpanHandler>> {
        None
    }

    /// The plugins composing this one, when this plugin is itself a
    /// composition. Used to flatten nested chains.
    fn members(&self) -> Option<&[Arc<dyn Plugin>]> {
        None
    }
}

pub(crate) type UpdaterVec<U> = SmallVec<[U; 4]>;

/// Folds `value` through the extract updaters in order.
///
/// A panicking updater is logged and treated as if it returned the value
/// unchanged; the remaining updaters still run.
pub(crate) fn fold_extract<'v>(
    updaters: &mut [Box<dyn ExtractUpdater + '_>],
    extraction: &mut Extraction,
    field: &FieldName,
    value: Option<&'v str>,
) -> Option<Cow<'v, str>> {
    let mut value: Option<Cow<'v, str>> = value.map(Cow::Borrowed);
    for updater in updaters {
        let update = panic::catch_unwind(AssertUnwindSafe(|| {
            updater.update(extraction, field, value.as_deref())
        }));
        apply(&mut value, update, field);
    }
    value
}

/// Folds `value` through the inject updaters in order, with the same
/// isolation as [`fold_extract`].
pub(crate) fn fold_inject<'v>(
    updaters: &mut [Box<dyn InjectUpdater + '_>],
    context: &TraceContext,
    field: &FieldName,
    value: Option<&'v str>,
) -> Option<Cow<'v, str>> {
    let mut value: Option<Cow<'v, str>> = value.map(Cow::Borrowed);
    for updater in updaters {
        let update = panic::catch_unwind(AssertUnwindSafe(|| {
            updater.update(context, field, value.as_deref())
        }));
        apply(&mut value, update, field);
    }
    value
}

fn apply(value: &mut Option<Cow<'_, str>>, update: Result<Update, Box<dyn std::any::Any + Send>>, field: &FieldName) {
    match update {
        Ok(Update::Keep) => {}
        Ok(Update::Set(new)) => *value = Some(Cow::Owned(new)),
        Ok(Update::Clear) => *value = None,
        Err(_) => {
            tracing::error!(field = %field, "extra-field updater panicked; value left unchanged");
        }
    }
}

/// An ordered, flattened list of plugins.
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    /// Composes `plugins` into a chain, recursively flattening members that
    /// are themselves compositions.
    pub fn new<I>(plugins: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        let mut flat = Vec::new();
        for plugin in plugins {
            flatten(plugin, &mut flat);
        }
        PluginChain { plugins: flat }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub(crate) fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub(crate) fn extract_updaters(&self) -> UpdaterVec<Box<dyn ExtractUpdater + '_>> {
        self.plugins
            .iter()
            .filter_map(|p| p.extract_updater())
            .collect()
    }

    pub(crate) fn inject_updaters(&self) -> UpdaterVec<Box<dyn InjectUpdater + '_>> {
        self.plugins
            .iter()
            .filter_map(|p| p.inject_updater())
            .collect()
    }

    /// The finished-span handlers contributed by members, in configured
    /// order.
    pub(crate) fn span_handlers(&self) -> Vec<Arc<dyn FinishedSpanHandler>> {
        self.plugins
            .iter()
            .filter_map(|p| p.finished_span_handler())
            .collect()
    }
}

fn flatten(plugin: Arc<dyn Plugin>, out: &mut Vec<Arc<dyn Plugin>>) {
    if let Some(members) = plugin.members() {
        for member in members {
            flatten(member.clone(), out);
        }
        return;
    }
    out.push(plugin);
}

impl Plugin for PluginChain {
    /// The insertion-ordered union of the members' field names.
    fn fields(&self) -> Vec<FieldName> {
        let mut fields: Vec<FieldName> = Vec::new();
        for plugin in &self.plugins {
            for field in plugin.fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    fn extract_updater(&self) -> Option<Box<dyn ExtractUpdater + '_>> {
        let updaters = self.extract_updaters();
        if updaters.is_empty() {
            return None;
        }
        Some(Box::new(ChainExtractUpdater { updaters }))
    }

    fn inject_updater(&self) -> Option<Box<dyn InjectUpdater + '_>> {
        let updaters = self.inject_updaters();
        if updaters.is_empty() {
            return None;
        }
        Some(Box::new(ChainInjectUpdater { updaters }))
    }

    fn finished_span_handler(&self) -> Option<Arc<dyn FinishedSpanHandler>> {
        crate::pipeline::compose(self.span_handlers())
    }

    fn members(&self) -> Option<&[Arc<dyn Plugin>]> {
        Some(&self.plugins)
    }
}

struct ChainExtractUpdater<'a> {
    updaters: UpdaterVec<Box<dyn ExtractUpdater + 'a>>,
}

impl ExtractUpdater for ChainExtractUpdater<'_> {
    fn update(
        &mut self,
        extraction: &mut Extraction,
        field: &FieldName,
        value: Option<&str>,
    ) -> Update {
        match fold_extract(&mut self.updaters, extraction, field, value) {
            Some(folded) => Update::Set(folded.into_owned()),
            None => Update::Clear,
        }
    }
}

struct ChainInjectUpdater<'a> {
    updaters: UpdaterVec<Box<dyn InjectUpdater + 'a>>,
}

impl InjectUpdater for ChainInjectUpdater<'_> {
    fn update(
        &mut self,
        context: &TraceContext,
        field: &FieldName,
        value: Option<&str>,
    ) -> Update {
        match fold_inject(&mut self.updaters, context, field, value) {
            Some(folded) => Update::Set(folded.into_owned()),
            None => Update::Clear,
        }
    }
}

/// Deletes configured fields on egress, unconditionally.
///
/// Appended as the last chain member when redacted fields are configured, so
/// no later updater can resurrect a redacted value.
pub(crate) struct Redactor {
    fields: Vec<FieldName>,
}

impl Redactor {
    pub(crate) fn new(fields: Vec<FieldName>) -> Self {
        Redactor { fields }
    }
}

impl Plugin for Redactor {
    fn fields(&self) -> Vec<FieldName> {
        self.fields.clone()
    }

    fn inject_updater(&self) -> Option<Box<dyn InjectUpdater + '_>> {
        Some(Box::new(RedactUpdater { fields: &self.fields }))
    }
}

struct RedactUpdater<'a> {
    fields: &'a [FieldName],
}

impl InjectUpdater for RedactUpdater<'_> {
    fn update(&mut self, _: &TraceContext, field: &FieldName, _: Option<&str>) -> Update {
        if self.fields.contains(field) {
            Update::Clear
        } else {
            Update::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagging {
        name: &'static str,
    }

    impl Plugin for Tagging {
        fn fields(&self) -> Vec<FieldName> {
            vec![FieldName::new(self.name).unwrap()]
        }

        fn extract_updater(&self) -> Option<Box<dyn ExtractUpdater + '_>> {
            struct Updater(&'static str);
            impl ExtractUpdater for Updater {
                fn update(
                    &mut self,
                    _: &mut Extraction,
                    _: &FieldName,
                    value: Option<&str>,
                ) -> Update {
                    match value {
                        Some(v) => Update::Set(format!("{v}+{}", self.0)),
                        None => Update::Keep,
                    }
                }
            }
            Some(Box::new(Updater(self.name)))
        }
    }

    fn chain_of(names: &[&'static str]) -> PluginChain {
        PluginChain::new(
            names
                .iter()
                .map(|&name| Arc::new(Tagging { name }) as Arc<dyn Plugin>),
        )
    }

    #[test]
    fn nested_chains_flatten() {
        let inner = chain_of(&["a", "b"]);
        let outer = PluginChain::new([
            Arc::new(inner) as Arc<dyn Plugin>,
            Arc::new(Tagging { name: "c" }) as Arc<dyn Plugin>,
        ]);
        assert_eq!(outer.len(), 3);
        let fields: Vec<_> = outer.fields().iter().map(|f| f.as_str().to_owned()).collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn fields_union_dedups_in_order() {
        let chain = PluginChain::new([
            Arc::new(Tagging { name: "x" }) as Arc<dyn Plugin>,
            Arc::new(Tagging { name: "x" }) as Arc<dyn Plugin>,
            Arc::new(Tagging { name: "y" }) as Arc<dyn Plugin>,
        ]);
        let fields: Vec<_> = chain.fields().iter().map(|f| f.as_str().to_owned()).collect();
        assert_eq!(fields, vec!["x", "y"]);
    }

    #[test]
    fn fold_runs_in_configured_order() {
        let chain = chain_of(&["a", "b"]);
        let mut updaters = chain.extract_updaters();
        let mut extraction = Extraction::empty();
        let field = FieldName::new("a").unwrap();
        let out = fold_extract(&mut updaters, &mut extraction, &field, Some("v"));
        assert_eq!(out.as_deref(), Some("v+a+b"));
    }

    #[test]
    fn panicking_updater_leaves_value_unchanged() {
        struct Panicking;
        impl Plugin for Panicking {
            fn fields(&self) -> Vec<FieldName> {
                vec![FieldName::new("a").unwrap()]
            }
            fn extract_updater(&self) -> Option<Box<dyn ExtractUpdater + '_>> {
                struct Updater;
                impl ExtractUpdater for Updater {
                    fn update(
                        &mut self,
                        _: &mut Extraction,
                        _: &FieldName,
                        _: Option<&str>,
                    ) -> Update {
                        panic!("boom");
                    }
                }
                Some(Box::new(Updater))
            }
        }

        let chain = PluginChain::new([
            Arc::new(Panicking) as Arc<dyn Plugin>,
            Arc::new(Tagging { name: "b" }) as Arc<dyn Plugin>,
        ]);
        let mut updaters = chain.extract_updaters();
        let mut extraction = Extraction::empty();
        let field = FieldName::new("a").unwrap();
        let out = fold_extract(&mut updaters, &mut extraction, &field, Some("v"));
        // The panicking member is skipped; the rest of the chain still runs.
        assert_eq!(out.as_deref(), Some("v+b"));
    }

    #[test]
    fn redactor_clears_only_its_fields() {
        let redactor = Redactor::new(vec![FieldName::new("secret").unwrap()]);
        let mut updaters = UpdaterVec::new();
        updaters.push(redactor.inject_updater().unwrap());
        let context = TraceContext::builder().trace_id(1).span_id(1).build();

        let secret = FieldName::new("secret").unwrap();
        let out = fold_inject(&mut updaters, &context, &secret, Some("abc"));
        assert_eq!(out, None);

        let public = FieldName::new("public").unwrap();
        let out = fold_inject(&mut updaters, &context, &public, Some("abc"));
        assert_eq!(out.as_deref(), Some("abc"));
    }
}
