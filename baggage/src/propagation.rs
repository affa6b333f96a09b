//! The extra-field propagation factory and its extract/inject pipelines.
use crate::pipeline::FinishedSpanPipeline;
use crate::plan::{BuildError, FieldName, KeyPlan, PlanBuilder};
use crate::plugin::{self, Plugin, PluginChain, Redactor};
use crate::store::FieldStore;
use baggage_core::{Extraction, FinishedSpanHandler, Getter, Propagation, Setter, TraceContext};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Configures a [`Factory`].
///
/// ```
/// use baggage::FactoryBuilder;
/// use baggage_core::b3::B3SinglePropagation;
///
/// let factory = FactoryBuilder::new(B3SinglePropagation)
///     .add_field("x-vcap-request-id")
///     .add_prefixed_fields("baggage-", ["country-code", "user-id"])
///     .add_redacted_field("internal-token")
///     .build()
///     .unwrap();
/// let propagation = factory.create();
/// ```
pub struct FactoryBuilder {
    primary: Arc<dyn Propagation>,
    directs: Vec<String>,
    groups: Vec<(String, Vec<String>)>,
    redacted: Vec<String>,
    plugins: Vec<Arc<dyn Plugin>>,
    handlers: Vec<Arc<dyn FinishedSpanHandler>>,
}

impl FactoryBuilder {
    /// Starts a builder delegating primary propagation to `primary`.
    pub fn new(primary: impl Propagation) -> Self {
        Self::with_primary(Arc::new(primary))
    }

    /// Like [`new`](Self::new), for an already-shared primary.
    pub fn with_primary(primary: Arc<dyn Propagation>) -> Self {
        FactoryBuilder {
            primary,
            directs: Vec::new(),
            groups: Vec::new(),
            redacted: Vec::new(),
            plugins: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Declares a field propagated under its own (lowercased) name.
    pub fn add_field(mut self, name: impl Into<String>) -> Self {
        self.directs.push(name.into());
        self
    }

    /// Declares fields propagated under `prefix`-qualified wire keys, e.g.
    /// `baggage-country-code` for the field `country-code`.
    pub fn add_prefixed_fields<I, S>(mut self, prefix: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .push((prefix.into(), names.into_iter().map(Into::into).collect()));
        self
    }

    /// Declares a field readable and settable in-process but never written to
    /// a carrier.
    pub fn add_redacted_field(mut self, name: impl Into<String>) -> Self {
        self.redacted.push(name.into());
        self
    }

    /// Appends a plugin to the chain. Plugins run in the order they are
    /// added; their declared fields are added to the plan.
    pub fn add_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Registers a handler to run as spans finish, after any
    /// plugin-contributed handlers.
    pub fn add_finished_span_handler(mut self, handler: Arc<dyn FinishedSpanHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Validates the configuration and freezes it into a [`Factory`].
    pub fn build(self) -> Result<Factory, BuildError> {
        let mut plan = PlanBuilder::default();
        for name in &self.directs {
            plan.direct(name)?;
        }
        for plugin in &self.plugins {
            for field in plugin.fields() {
                plan.direct(field.as_str())?;
            }
        }
        let mut redacted: Vec<FieldName> = Vec::with_capacity(self.redacted.len());
        for name in &self.redacted {
            plan.direct(name)?;
            let field = FieldName::new(name)?;
            if redacted.contains(&field) {
                return Err(BuildError::DuplicateRedaction(field.as_str().to_owned()));
            }
            redacted.push(field);
        }
        for (prefix, names) in &self.groups {
            for name in names {
                plan.prefixed(prefix, name)?;
            }
        }

        let mut plugins = self.plugins;
        if !redacted.is_empty() {
            plugins.push(Arc::new(Redactor::new(redacted)));
        }
        let chain = PluginChain::new(plugins);

        let noop = Arc::new(AtomicBool::new(false));
        let mut handlers = chain.span_handlers();
        handlers.extend(self.handlers);
        let finished_spans = FinishedSpanPipeline::new(handlers, noop);

        Ok(Factory {
            inner: Arc::new(Shared {
                primary: self.primary,
                plan: Arc::new(plan.build()),
                chain,
            }),
            finished_spans: Arc::new(finished_spans),
        })
    }
}

struct Shared {
    primary: Arc<dyn Propagation>,
    plan: Arc<KeyPlan>,
    chain: PluginChain,
}

/// Creates extra-field [`Propagation`]s and decorates contexts with their
/// field stores.
///
/// A factory is built once, lives for the process, and is shared by every
/// tracer using it. All contexts it creates share one immutable [`KeyPlan`].
#[derive(Clone)]
pub struct Factory {
    inner: Arc<Shared>,
    finished_spans: Arc<FinishedSpanPipeline>,
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory").finish_non_exhaustive()
    }
}

impl Factory {
    /// Shorthand for a factory propagating `fields` with no plugins.
    pub fn new<I, S>(primary: impl Propagation, fields: I) -> Result<Factory, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = FactoryBuilder::new(primary);
        for field in fields {
            builder = builder.add_field(field);
        }
        builder.build()
    }

    /// Returns a builder.
    pub fn builder(primary: impl Propagation) -> FactoryBuilder {
        FactoryBuilder::new(primary)
    }

    /// Returns the composed propagation.
    pub fn create(&self) -> ExtraFieldPropagation {
        ExtraFieldPropagation {
            inner: self.inner.clone(),
        }
    }

    /// The plan shared by all contexts this factory creates.
    pub fn plan(&self) -> &Arc<KeyPlan> {
        &self.inner.plan
    }

    /// Ensures `context` carries a [`FieldStore`].
    ///
    /// A context that already has one gets a child store chained to it, so
    /// the derived scope may shadow fields without corrupting the parent; a
    /// context without one gets a fresh empty store.
    pub fn decorate(&self, context: &TraceContext) -> TraceContext {
        let store = match context.find_extra_arc::<FieldStore>() {
            Some(parent) => FieldStore::child_of(parent),
            None => FieldStore::new(self.inner.plan.clone()),
        };
        context.to_builder().replace_extra(Arc::new(store)).build()
    }

    /// The composed finished-span pipeline: plugin-contributed handlers
    /// first, then user-registered ones, in configured order.
    pub fn finished_spans(&self) -> &FinishedSpanPipeline {
        &self.finished_spans
    }

    /// Marks the tracing subsystem as shut down (or live again).
    pub fn set_noop(&self, noop: bool) {
        self.finished_spans.set_noop(noop);
    }
}

/// A [`Propagation`] that composes a primary format with configured extra
/// fields.
///
/// On extraction the primary result is decorated with a fresh [`FieldStore`]
/// populated from the carrier's wire keys, each value folded through the
/// plugin chain. On injection the store attached to the context is written
/// back out, again folding each wire key's value through the chain, which
/// ends in the redactor when redacted fields are configured, so those never
/// reach a carrier.
#[derive(Clone)]
pub struct ExtraFieldPropagation {
    inner: Arc<Shared>,
}

impl Propagation for ExtraFieldPropagation {
    fn keys(&self) -> Vec<String> {
        let mut keys = self.inner.primary.keys();
        keys.extend(self.inner.plan.key_names().map(str::to_owned));
        keys
    }

    fn extract(&self, carrier: &dyn Getter) -> Extraction {
        let mut extraction = self.inner.primary.extract(carrier);
        let plan = &self.inner.plan;
        let store = FieldStore::new(plan.clone());

        let mut updaters = self.inner.chain.extract_updaters();
        for key in plan.keys() {
            let field = &plan.fields()[key.field];
            let value = carrier.get(&key.name);
            let folded =
                plugin::fold_extract(&mut updaters, &mut extraction, field, value);
            if let Some(value) = folded {
                store.put(key.field, Some(&value[..]));
            }
        }

        extraction.add_extra(Arc::new(store));
        extraction
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Setter) {
        self.inner.primary.inject(context, carrier);
        let store = match context.find_extra::<FieldStore>() {
            Some(store) => store,
            None => return,
        };

        let plan = &self.inner.plan;
        let mut updaters = self.inner.chain.inject_updaters();
        for key in plan.keys().iter().filter(|k| k.injected) {
            let field = &plan.fields()[key.field];
            let value = store.get(key.field);
            let folded =
                plugin::fold_inject(&mut updaters, context, field, value.as_deref());
            if let Some(value) = folded {
                carrier.set(&key.name, &value);
            }
        }
    }
}
