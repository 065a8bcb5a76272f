use std::cell::{Cell, RefCell};
use std::rc::Rc;

use stencil_core::{ChangeDetector, EventLoop, SharedScope, Subscription};
use stencil_dom::{Document, Dom, NodeId};
use stencil_expr::Functions;
use stencil_template::{CompiledBuilder, Compiler, from_dom};

use crate::Error;

/// A document shared between instances, handlers and the poll loop.
pub type SharedDom<D = Document> = Rc<RefCell<D>>;

/// Where an instance renders: a node, or a selector resolved against the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountTarget {
    Node(NodeId),
    Selector(String),
}

impl From<NodeId> for MountTarget {
    fn from(node: NodeId) -> Self {
        MountTarget::Node(node)
    }
}

impl From<&str> for MountTarget {
    fn from(selector: &str) -> Self {
        MountTarget::Selector(selector.to_string())
    }
}

impl From<String> for MountTarget {
    fn from(selector: String) -> Self {
        MountTarget::Selector(selector)
    }
}

/// Resolve `target` to an element of `dom`.
pub fn resolve<D: Dom + ?Sized>(dom: &D, target: &MountTarget) -> Result<NodeId, Error> {
    match target {
        MountTarget::Node(node) => match dom.tag_name(*node) {
            Some(_) => Ok(*node),
            None => Err(Error::NotFound(format!("{node:?}"))),
        },
        MountTarget::Selector(selector) => dom
            .query_selector(dom.root(), selector)?
            .ok_or_else(|| Error::NotFound(selector.clone())),
    }
}

/// A compiled builder bound to a mount point.
///
/// Every render replaces the mount's first child with a freshly built
/// fragment; [`TemplateInstance::observe`] keeps doing so whenever the
/// observed scope changes.
pub struct TemplateInstance<D: Dom + 'static = Document> {
    builder: CompiledBuilder,
    dom: SharedDom<D>,
    functions: Rc<Functions>,
    // shared with the re-render callback so a later render_in is honoured
    mount: Rc<Cell<Option<NodeId>>>,
    detector: ChangeDetector,
}

impl<D: Dom + 'static> TemplateInstance<D> {
    pub fn new(builder: CompiledBuilder, dom: SharedDom<D>, event_loop: EventLoop) -> Self {
        Self::from_parts(
            builder,
            dom,
            Rc::new(Functions::with_builtins()),
            ChangeDetector::new(event_loop),
        )
    }

    pub fn from_parts(
        builder: CompiledBuilder,
        dom: SharedDom<D>,
        functions: Rc<Functions>,
        detector: ChangeDetector,
    ) -> Self {
        Self {
            builder,
            dom,
            functions,
            mount: Rc::new(Cell::new(None)),
            detector,
        }
    }

    /// Compile the template definition found at `source` in `dom`.
    pub fn from_element(
        dom: SharedDom<D>,
        source: impl Into<MountTarget>,
        compiler: &Compiler,
        event_loop: EventLoop,
    ) -> Result<Self, Error> {
        let builder = {
            let doc = dom.try_borrow().map_err(|_| Error::DocumentBusy)?;
            let node = resolve(&*doc, &source.into())?;
            compiler.compile(std::slice::from_ref(&from_dom(&*doc, node)))?
        };
        Ok(Self::new(builder, dom, event_loop))
    }

    pub fn builder(&self) -> &CompiledBuilder {
        &self.builder
    }

    pub fn mount(&self) -> Option<NodeId> {
        self.mount.get()
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut ChangeDetector {
        &mut self.detector
    }

    pub fn render_in(&mut self, target: impl Into<MountTarget>) -> Result<&mut Self, Error> {
        let target = target.into();
        let node = {
            let doc = self.dom.try_borrow().map_err(|_| Error::DocumentBusy)?;
            resolve(&*doc, &target)?
        };
        self.mount.set(Some(node));
        tracing::debug!(?node, ?target, "mount resolved");
        Ok(self)
    }

    /// Build against `scope` and swap the result in. Returns the new fragment.
    pub fn render(&self, scope: &SharedScope) -> Result<NodeId, Error> {
        let mount = self.mount.get().ok_or(Error::NotMounted)?;
        render_into(&*self.dom, &self.builder, mount, scope, &self.functions)
    }

    /// Render now, then re-render whenever `scope` changes.
    ///
    /// Failures of the initial render are returned; failures of later
    /// re-renders are logged and leave the previous fragment in place.
    pub fn observe(&mut self, scope: SharedScope) -> Result<Subscription, Error> {
        self.render(&scope)?;
        self.detector.bind(scope)?.mark_clean()?;

        let dom = self.dom.clone();
        let builder = self.builder.clone();
        let functions = self.functions.clone();
        let mount = self.mount.clone();
        self.detector.set_on_change(move |scope| {
            let Some(node) = mount.get() else { return };
            if let Err(e) = render_into(&*dom, &builder, node, scope, &functions) {
                tracing::error!(error = %e, "re-render failed");
            }
        });
        Ok(self.detector.subscription())
    }
}

fn render_into<D: Dom + ?Sized>(
    dom: &RefCell<D>,
    builder: &CompiledBuilder,
    mount: NodeId,
    scope: &SharedScope,
    functions: &Rc<Functions>,
) -> Result<NodeId, Error> {
    let mut dom = dom.try_borrow_mut().map_err(|_| Error::DocumentBusy)?;
    let fragment = builder.build(&mut *dom, scope, functions)?;
    let previous = dom.first_child(mount);
    let swapped = match previous {
        Some(old) => dom.replace_child(mount, fragment, old),
        None => dom.append_child(mount, fragment),
    };
    if let Err(e) = swapped {
        dom.discard(fragment);
        return Err(e.into());
    }
    if let Some(old) = previous {
        dom.discard(old);
    }
    tracing::debug!(?mount, ?fragment, "rendered");
    Ok(fragment)
}
