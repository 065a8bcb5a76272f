use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use stencil_dom::{Dom, NodeId};
use stencil_template::{append_to_dom, parse_markup};

use crate::context::Context;
use crate::element::Upgrade;
use crate::{Error, events};

/// A document plus the declarative elements living in it.
///
/// ```text
/// load(markup) -> upgrade registered tags -> ready() -> elements connect
/// ```
pub struct Page {
    ctx: Rc<Context>,
}

impl Page {
    pub fn new(ctx: Context) -> Self {
        Self { ctx: Rc::new(ctx) }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// Parse `markup`, append it to the document root and upgrade the
    /// registered elements in it. Returns the new top-level nodes.
    pub fn load(&self, markup: &str) -> Result<Vec<NodeId>, Error> {
        let nodes = parse_markup(markup)?;
        let added = {
            let mut doc = self
                .ctx
                .document()
                .try_borrow_mut()
                .map_err(|_| Error::DocumentBusy)?;
            let root = doc.root();
            let before = doc.children(root).len();
            append_to_dom(&mut *doc, root, &nodes)?;
            doc.children(root).split_off(before)
        };
        let upgraded = self.upgrade(&added)?;
        tracing::debug!(nodes = added.len(), upgraded, "markup loaded");
        Ok(added)
    }

    /// Upgrade registered elements under `roots`, skipping template definitions.
    pub fn upgrade(&self, roots: &[NodeId]) -> Result<usize, Error> {
        let found: Vec<(NodeId, Upgrade)> = {
            let doc = self
                .ctx
                .document()
                .try_borrow()
                .map_err(|_| Error::DocumentBusy)?;
            let registry = self.ctx.registry();
            let mut found = Vec::new();
            let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
            while let Some(node) = stack.pop() {
                let Some(tag) = doc.tag_name(node) else {
                    continue;
                };
                if tag == "template" {
                    continue;
                }
                if let Some(upgrade) = registry.get(&tag) {
                    found.push((node, upgrade));
                }
                stack.extend(doc.children(node).into_iter().rev());
            }
            found
        };
        for (node, upgrade) in &found {
            upgrade(&self.ctx, *node)?;
        }
        Ok(found.len())
    }

    /// Fire the ready event; queued element setups run in document order.
    pub fn ready(&self) -> Result<(), Error> {
        self.ctx.fire_ready()
    }

    pub fn dispatch(&self, selector: &str, kind: &str) -> Result<usize, Error> {
        self.dispatch_with(selector, kind, Value::Null)
    }

    pub fn dispatch_with(&self, selector: &str, kind: &str, detail: Value) -> Result<usize, Error> {
        let doc = self
            .ctx
            .document()
            .try_borrow()
            .map_err(|_| Error::DocumentBusy)?;
        events::dispatch(&doc, doc.root(), selector, kind, detail)
    }

    /// Move the event loop's clock forward, running whatever falls due.
    pub fn advance(&self, by: Duration) -> usize {
        self.ctx.event_loop().advance(by)
    }

    pub fn html(&self) -> String {
        let doc = self.ctx.document().borrow();
        doc.inner_html(doc.root())
    }
}
