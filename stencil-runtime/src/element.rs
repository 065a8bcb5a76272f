use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use stencil_core::{SharedScope, Subscription, shared};
use stencil_dom::{Dom, NodeId};
use stencil_expr::type_name;
use stencil_template::from_dom;

use crate::context::Context;
use crate::instance::TemplateInstance;
use crate::Error;

pub const DEFAULT_ELEMENT_TAG: &str = "st-tpl";
const DEFINITION_SELECTOR: &str = "template";

/// Called when an element with a registered tag is found in loaded markup.
pub type Upgrade = Rc<dyn Fn(&Rc<Context>, NodeId) -> Result<(), Error>>;

/// Tag name to upgrade routine. Tags are matched case-insensitively.
#[derive(Clone, Default)]
pub struct ElementRegistry {
    defs: BTreeMap<String, Upgrade>,
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.defs.keys()).finish()
    }
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`TemplateElement`] under [`DEFAULT_ELEMENT_TAG`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.define(DEFAULT_ELEMENT_TAG, TemplateElement::upgrade);
        registry
    }

    pub fn define(
        &mut self,
        tag: &str,
        upgrade: impl Fn(&Rc<Context>, NodeId) -> Result<(), Error> + 'static,
    ) -> &mut Self {
        self.defs.insert(tag.to_ascii_lowercase(), Rc::new(upgrade));
        self
    }

    pub fn get(&self, tag: &str) -> Option<Upgrade> {
        self.defs.get(&tag.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.defs.contains_key(&tag.to_ascii_lowercase())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }
}

/// The expression-valued attributes a template element reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementAttrs {
    pub scope: Option<String>,
    pub bind: Option<String>,
    pub observe: Option<String>,
}

impl ElementAttrs {
    pub fn read<D: Dom + ?Sized>(dom: &D, node: NodeId) -> Self {
        Self {
            scope: dom.get_attribute(node, "scope"),
            bind: dom.get_attribute(node, "bind"),
            observe: dom.get_attribute(node, "observe"),
        }
    }
}

/// A declarative component: `<st-tpl observe="state"><template>...</template></st-tpl>`.
///
/// Once connected it owns an instance mounted at itself and, when observing,
/// the subscription that keeps it re-rendering.
pub struct TemplateElement {
    node: NodeId,
    attrs: ElementAttrs,
    instance: TemplateInstance,
    subscription: Option<Subscription>,
}

impl fmt::Debug for TemplateElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateElement")
            .field("node", &self.node)
            .field("attrs", &self.attrs)
            .field("observing", &self.is_observing())
            .finish()
    }
}

impl TemplateElement {
    /// Registry entry point: defers [`TemplateElement::connect`] to the ready event.
    pub fn upgrade(ctx: &Rc<Context>, node: NodeId) -> Result<(), Error> {
        let weak = Rc::downgrade(ctx);
        ctx.on_ready(move || {
            let Some(ctx) = weak.upgrade() else {
                return Ok(());
            };
            let element = TemplateElement::connect(&ctx, node)?;
            ctx.adopt(element);
            Ok(())
        })
    }

    /// Compile the nested definition, mount at `node` and apply the attributes.
    pub fn connect(ctx: &Context, node: NodeId) -> Result<Self, Error> {
        Self::try_connect(ctx, node).inspect_err(|e| {
            let element = ctx
                .document()
                .try_borrow()
                .map(|doc| describe(&*doc, node))
                .unwrap_or_else(|_| format!("{node:?}"));
            tracing::error!(%element, error = %e, "element setup failed");
        })
    }

    fn try_connect(ctx: &Context, node: NodeId) -> Result<Self, Error> {
        let (builder, attrs) = {
            let mut doc = ctx
                .document()
                .try_borrow_mut()
                .map_err(|_| Error::DocumentBusy)?;
            let definition = doc
                .query_selector(node, DEFINITION_SELECTOR)?
                .ok_or_else(|| Error::MissingTemplate {
                    element: describe(&*doc, node),
                })?;
            let markup = from_dom(&*doc, definition);
            let builder = ctx.compiler().compile(std::slice::from_ref(&markup))?;
            doc.discard(definition);
            (builder, ElementAttrs::read(&*doc, node))
        };

        let mut instance = TemplateInstance::from_parts(
            builder,
            ctx.document().clone(),
            ctx.functions().clone(),
            ctx.detector(),
        );
        instance.render_in(node)?;
        let mut element = Self {
            node,
            attrs,
            instance,
            subscription: None,
        };
        element.apply(ctx)?;
        tracing::debug!(?node, observing = element.is_observing(), "element connected");
        Ok(element)
    }

    fn apply(&mut self, ctx: &Context) -> Result<(), Error> {
        for src in [&self.attrs.scope, &self.attrs.bind].into_iter().flatten() {
            let value = ctx.evaluate(src)?;
            self.instance.render(&shared(value))?;
        }
        if let Some(src) = self.attrs.observe.as_deref().filter(|s| !s.trim().is_empty()) {
            let scope = observed_scope(ctx, src)?;
            self.subscription = Some(self.instance.observe(scope)?);
        }
        Ok(())
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn attrs(&self) -> &ElementAttrs {
        &self.attrs
    }

    pub fn instance(&self) -> &TemplateInstance {
        &self.instance
    }

    pub fn is_observing(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Stop re-rendering. The last fragment stays in place.
    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
    }
}

/// A global name observes the live cell; anything else is evaluated once and
/// wrapped into a fresh one.
fn observed_scope(ctx: &Context, src: &str) -> Result<SharedScope, Error> {
    let not_an_object = |found| Error::NotAnObject {
        expr: src.to_string(),
        found,
    };
    if let Some(live) = ctx.global(src.trim()) {
        let found = type_name(&live.borrow());
        return match found {
            "object" => Ok(live),
            other => Err(not_an_object(other)),
        };
    }
    let value = ctx.evaluate(src)?;
    if !value.is_object() {
        return Err(not_an_object(type_name(&value)));
    }
    Ok(shared(value))
}

fn describe<D: Dom + ?Sized>(dom: &D, node: NodeId) -> String {
    let tag = dom.tag_name(node).unwrap_or_default();
    match dom.get_attribute(node, "id") {
        Some(id) => format!("{tag}#{id}"),
        None => tag,
    }
}
