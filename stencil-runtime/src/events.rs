use serde_json::Value;
use stencil_dom::{Document, Dom, Event, NodeId};

use crate::Error;

/// Dispatches `kind` to every element under `scope` matching `selector`, in
/// document order. Returns the number of listeners invoked.
///
/// The first failing listener stops the run.
pub fn dispatch(
    doc: &Document,
    scope: NodeId,
    selector: &str,
    kind: &str,
    detail: Value,
) -> Result<usize, Error> {
    let targets = doc.query_selector_all(scope, selector)?;
    let mut invoked = 0;
    for target in targets {
        invoked += doc.dispatch(target, Event::new(kind).with_detail(detail.clone()))?;
    }
    tracing::debug!(selector, kind, invoked, "dispatched");
    Ok(invoked)
}

/// Like [`dispatch`] but for the first match only; a selector matching
/// nothing is a lookup error.
pub fn dispatch_first(
    doc: &Document,
    selector: &str,
    kind: &str,
    detail: Value,
) -> Result<usize, Error> {
    let target = doc
        .query_selector(doc.root(), selector)?
        .ok_or_else(|| Error::NotFound(selector.to_string()))?;
    Ok(doc.dispatch(target, Event::new(kind).with_detail(detail))?)
}
