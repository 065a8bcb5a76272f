use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use stencil_core::{
    ChangeDetector, DetectorConfig, EventLoop, Lifecycle, SharedScope, shared,
};
use stencil_dom::Document;
use stencil_expr::Functions;
use stencil_template::{Compiler, CompilerConfig};

use crate::element::{ElementRegistry, TemplateElement};
use crate::instance::SharedDom;
use crate::Error;

/// Everything declarative elements share: the document, the event loop, the
/// named global scopes their attributes refer to and the registry of tags.
pub struct Context {
    document: SharedDom,
    event_loop: EventLoop,
    functions: Rc<Functions>,
    compiler: Compiler,
    detector: DetectorConfig,
    registry: ElementRegistry,
    globals: RefCell<BTreeMap<String, SharedScope>>,
    lifecycle: RefCell<Lifecycle<Error>>,
    mounted: RefCell<Vec<TemplateElement>>,
}

impl Context {
    pub fn new(event_loop: EventLoop) -> Self {
        Self {
            document: Rc::new(RefCell::new(Document::new())),
            event_loop,
            functions: Rc::new(Functions::with_builtins()),
            compiler: Compiler::default(),
            detector: DetectorConfig::default(),
            registry: ElementRegistry::with_defaults(),
            globals: RefCell::new(BTreeMap::new()),
            lifecycle: RefCell::new(Lifecycle::new()),
            mounted: RefCell::new(Vec::new()),
        }
    }

    pub fn with_document(mut self, document: SharedDom) -> Self {
        self.document = document;
        self
    }

    pub fn with_functions(mut self, functions: Functions) -> Self {
        self.functions = Rc::new(functions);
        self
    }

    pub fn with_compiler_config(mut self, config: CompilerConfig) -> Self {
        self.compiler = Compiler::new(config);
        self
    }

    pub fn with_detector_config(mut self, config: DetectorConfig) -> Self {
        self.detector = config;
        self
    }

    pub fn with_registry(mut self, registry: ElementRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn document(&self) -> &SharedDom {
        &self.document
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn functions(&self) -> &Rc<Functions> {
        &self.functions
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// A fresh detector on this context's loop and poll interval.
    pub fn detector(&self) -> ChangeDetector {
        ChangeDetector::with_config(self.event_loop.clone(), self.detector)
    }

    /// Publish `value` under `name`, returning the live shared cell.
    pub fn set_global(&self, name: impl Into<String>, value: Value) -> SharedScope {
        let scope = shared(value);
        self.insert_global(name, scope.clone());
        scope
    }

    pub fn insert_global(&self, name: impl Into<String>, scope: SharedScope) {
        self.globals.borrow_mut().insert(name.into(), scope);
    }

    pub fn global(&self, name: &str) -> Option<SharedScope> {
        self.globals.borrow().get(name).cloned()
    }

    /// Evaluate `src` against a copy of the globals. Writes are discarded.
    pub fn evaluate(&self, src: &str) -> Result<Value, Error> {
        let mut ambient = {
            let globals = self.globals.borrow();
            let mut map = Map::new();
            for (name, scope) in globals.iter() {
                let value = scope
                    .try_borrow()
                    .map_err(|_| Error::GlobalBusy(name.clone()))?;
                map.insert(name.clone(), value.clone());
            }
            Value::Object(map)
        };
        Ok(stencil_expr::evaluate(src, &mut ambient, &self.functions)?)
    }

    /// Queue `hook` for the ready event, or run it now if that already fired.
    pub fn on_ready(&self, hook: impl FnOnce() -> Result<(), Error> + 'static) -> Result<(), Error> {
        let due = self.lifecycle.borrow_mut().defer(Box::new(hook));
        match due {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    /// Run the queued hooks with the lifecycle released, so a hook may register more.
    pub(crate) fn fire_ready(&self) -> Result<(), Error> {
        let queued = self.lifecycle.borrow_mut().take_ready();
        let mut queued = queued.into_iter();
        while let Some(hook) = queued.next() {
            if let Err(e) = hook() {
                self.lifecycle.borrow_mut().requeue(queued);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.borrow().is_ready()
    }

    /// Keep a connected element (and its observation) alive with the context.
    pub(crate) fn adopt(&self, element: TemplateElement) {
        self.mounted.borrow_mut().push(element);
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted.borrow().len()
    }

    /// Run `f` over the connected elements.
    pub fn with_mounted<R>(&self, f: impl FnOnce(&[TemplateElement]) -> R) -> R {
        f(&self.mounted.borrow())
    }
}
