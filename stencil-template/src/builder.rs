use std::fmt;
use std::rc::Rc;

use serde_json::{Value, json};
use stencil_core::SharedScope;
use stencil_dom::{Dom, DomError, Event, Listener, ListenerResult, NodeId};
use stencil_expr::{Env, EvalError, Functions, Locals, truthy};

use crate::compile::{ElementInstr, Handler, Instr};

/// Tag of the detached element every render builds into.
pub const WRAPPER_TAG: &str = "div";

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RenderCause {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("scope is already borrowed")]
    ScopeBusy,
}

/// A render-time failure, attributed to the last construction path.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
#[error("Error in {path}: {cause}")]
pub struct RenderError {
    pub path: String,
    #[source]
    pub cause: RenderCause,
}

/// Executable form of a template: run against a scope, it builds a fresh
/// detached fragment. Holds no state between builds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBuilder {
    instrs: Rc<[Instr]>,
}

impl CompiledBuilder {
    pub(crate) fn new(instrs: Vec<Instr>) -> Self {
        Self {
            instrs: instrs.into(),
        }
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    /// Build the whole template into a detached `div` and return it.
    ///
    /// On failure the partial fragment is discarded, so nothing reachable from
    /// the document changes.
    pub fn build<D: Dom + ?Sized>(
        &self,
        dom: &mut D,
        scope: &SharedScope,
        functions: &Rc<Functions>,
    ) -> Result<NodeId, RenderError> {
        let root_path = crate::walk::ROOT_LABEL;
        let Ok(mut value) = scope.try_borrow_mut() else {
            return Err(RenderError {
                path: root_path.to_string(),
                cause: RenderCause::ScopeBusy,
            });
        };
        let wrapper = dom.create_element(WRAPPER_TAG, None);
        let mut run = BuildRun {
            dom,
            scope,
            functions,
            env: Env::new(&mut value, functions),
            path: root_path,
        };
        match run.emit_all(&self.instrs, wrapper) {
            Ok(()) => {
                tracing::debug!(?wrapper, "fragment built");
                Ok(wrapper)
            }
            Err(cause) => {
                let path = run.path.to_string();
                run.dom.discard(wrapper);
                tracing::debug!(%path, %cause, "build failed");
                Err(RenderError { path, cause })
            }
        }
    }

    /// Indented outline of the instructions, one line per step.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for instr in self.instrs.iter() {
            write_outline(instr, 0, &mut out);
        }
        out
    }
}

impl fmt::Display for CompiledBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.outline())
    }
}

fn write_outline(instr: &Instr, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match instr {
        Instr::Text { text, .. } => {
            let kind = if text.is_static() { "text" } else { "text*" };
            out.push_str(&format!("{pad}{kind} ({} segments)\n", text.segments.len()));
        }
        Instr::Script { program, .. } => {
            out.push_str(&format!("{pad}script ({} statements)\n", program.stmts.len()));
        }
        Instr::Element(el) => {
            let mut line = format!("{pad}<{}>", el.tag);
            if let Some(is) = &el.is {
                line.push_str(&format!(" is={is}"));
            }
            if el.guard.is_some() {
                line.push_str(" if");
            }
            if el.each.is_some() {
                line.push_str(" for");
            }
            for (name, _) in &el.attrs {
                line.push_str(&format!(" @{name}"));
            }
            for h in &el.handlers {
                line.push_str(&format!(" on:{}", h.event));
            }
            out.push_str(&line);
            out.push('\n');
            for child in &el.children {
                write_outline(child, depth + 1, out);
            }
        }
    }
}

struct BuildRun<'r, 'v, D: Dom + ?Sized> {
    dom: &'r mut D,
    scope: &'r SharedScope,
    functions: &'r Rc<Functions>,
    env: Env<'v>,
    /// Last recorded construction path.
    path: &'r str,
}

impl<'r, D: Dom + ?Sized> BuildRun<'r, '_, D> {
    fn emit_all(&mut self, instrs: &'r [Instr], parent: NodeId) -> Result<(), RenderCause> {
        // script locals are visible to following siblings and their subtrees only
        let depth = self.env.depth();
        let result = instrs.iter().try_for_each(|i| self.emit(i, parent));
        self.env.truncate_locals(depth);
        result
    }

    fn emit(&mut self, instr: &'r Instr, parent: NodeId) -> Result<(), RenderCause> {
        match instr {
            Instr::Text { path, text } => {
                self.path = path.as_str();
                let s = self.env.render(text)?;
                let node = self.dom.create_text(&s);
                self.dom.append_child(parent, node)?;
            }
            Instr::Script { path, program } => {
                self.path = path.as_str();
                self.env.run(program)?;
            }
            Instr::Element(el) => {
                self.path = el.path.as_str();
                if let Some(guard) = &el.guard {
                    if !truthy(&self.env.eval(guard)?) {
                        return Ok(());
                    }
                }
                match &el.each {
                    None => self.construct(el, parent)?,
                    Some(clause) => {
                        for bindings in self.env.iterate(clause)? {
                            let depth = self.env.depth();
                            for local in bindings {
                                self.env.bind(local);
                            }
                            let result = self.construct(el, parent);
                            self.env.truncate_locals(depth);
                            result?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn construct(&mut self, el: &'r ElementInstr, parent: NodeId) -> Result<(), RenderCause> {
        self.path = el.path.as_str();
        let node = self.dom.create_element(&el.tag, el.is.as_deref());
        // attach first so a failure below is discarded together with the fragment
        self.dom.append_child(parent, node)?;
        for (name, value) in &el.attrs {
            let v = self.env.render(value)?;
            self.dom.set_attribute(node, name, &v)?;
        }
        for handler in &el.handlers {
            let listener = self.listener(handler, &el.path);
            self.dom.add_listener(node, &handler.event, listener)?;
        }
        self.emit_all(&el.children, node)
    }

    fn listener(&self, handler: &Handler, path: &str) -> Listener {
        make_listener(
            handler,
            path,
            self.scope.clone(),
            self.functions.clone(),
            self.env.locals().to_vec(),
        )
    }
}

/// Event object handlers see as `e` / `$event`.
pub fn event_value(event: &Event) -> Value {
    json!({
        "type": event.kind,
        "target": event.target.map(|t| t.index()),
        "detail": event.detail,
    })
}

fn make_listener(
    handler: &Handler,
    path: &str,
    scope: SharedScope,
    functions: Rc<Functions>,
    locals: Locals,
) -> Listener {
    let program = handler.program.clone();
    let path = path.to_string();
    Rc::new(move |event: &Event| -> ListenerResult {
        let fail = |cause: RenderCause| RenderError {
            path: path.clone(),
            cause,
        };
        let mut value = scope.try_borrow_mut().map_err(|_| fail(RenderCause::ScopeBusy))?;
        let mut env = Env::new(&mut value, &functions).with_locals(locals.clone());
        let ev = event_value(event);
        env.push_local("e", ev.clone());
        env.push_local("$event", ev);
        env.run(&program).map_err(|e| fail(e.into()))?;
        tracing::trace!(event = %event.kind, %path, "handler ran");
        Ok(())
    })
}
