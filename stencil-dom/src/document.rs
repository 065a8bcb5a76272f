use slotmap::SlotMap;

use crate::selector::SelectorList;
use crate::{Dom, DomError, Event, Listener, NodeId};

pub(crate) const DOCUMENT_TAG: &str = "#document";

pub(crate) enum NodeData {
    Element(ElementData),
    Text(String),
}

pub(crate) struct ElementData {
    pub tag: String,
    pub is: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub listeners: Vec<(String, Listener)>,
}

pub(crate) struct Slot {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena-backed in-memory document.
///
/// Discarded slots are reused by later nodes; the versioned `NodeId` keeps a
/// stale handle from aliasing the newcomer.
pub struct Document {
    nodes: SlotMap<NodeId, Slot>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: SlotMap::with_key(),
            root: NodeId::default(),
        };
        doc.root = doc.alloc(NodeData::Element(ElementData {
            tag: DOCUMENT_TAG.to_string(),
            is: None,
            attrs: Vec::new(),
            listeners: Vec::new(),
        }));
        doc
    }

    /// Live (not discarded) nodes, the document root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Slots allocated so far, live or free.
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.slot(node).is_some()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.nodes.insert(Slot {
            data,
            parent: None,
            children: Vec::new(),
        })
    }

    pub(crate) fn slot(&self, node: NodeId) -> Option<&Slot> {
        self.nodes.get(node)
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut Slot, DomError> {
        self.nodes.get_mut(node).ok_or(DomError::MissingNode(node))
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.slot_mut(node)?.data {
            NodeData::Element(el) => Ok(el),
            NodeData::Text(_) => Err(DomError::NotAnElement(node)),
        }
    }

    pub(crate) fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.slot(node)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == candidate {
                return true;
            }
            cur = self.slot(n).and_then(|s| s.parent);
        }
        false
    }

    fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let parent = self.slot_mut(node)?.parent.take();
        if let Some(p) = parent {
            self.slot_mut(p)?.children.retain(|c| *c != node);
        }
        Ok(())
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.element(parent).is_none() {
            return Err(if self.contains(parent) {
                DomError::NotAnElement(parent)
            } else {
                DomError::MissingNode(parent)
            });
        }
        if !self.contains(child) {
            return Err(DomError::MissingNode(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(DomError::HierarchyRequest { child });
        }
        Ok(())
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(slot) = self.slot(node) else { return };
        match &slot.data {
            NodeData::Text(t) => out.push_str(t),
            NodeData::Element(_) => {
                for c in &slot.children {
                    self.collect_text(*c, out);
                }
            }
        }
    }

    /// Descendants of `scope` in document order, `scope` excluded.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .slot(scope)
            .map(|s| s.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(n) = stack.pop() {
            out.push(n);
            if let Some(s) = self.slot(n) {
                stack.extend(s.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|n| list.matches(self, *n))
            .collect())
    }

    /// Deliver `event` to the listeners registered on `target` for its kind, in
    /// registration order. Stops at the first failing listener.
    pub fn dispatch(&self, target: NodeId, mut event: Event) -> Result<usize, DomError> {
        if !self.contains(target) {
            return Err(DomError::MissingNode(target));
        }
        event.target = Some(target);
        let listeners = self.listeners(target, &event.kind);
        tracing::debug!(?target, kind = %event.kind, count = listeners.len(), "dispatch");
        for listener in &listeners {
            listener(&event).map_err(|e| DomError::Listener {
                event: event.kind.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(listeners.len())
    }
}

impl Dom for Document {
    fn root(&self) -> NodeId {
        self.root
    }

    fn create_element(&mut self, tag: &str, is: Option<&str>) -> NodeId {
        self.alloc(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            is: is.map(str::to_string),
            attrs: Vec::new(),
            listeners: Vec::new(),
        }))
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|el| el.tag.clone())
    }

    fn is_value(&self, node: NodeId) -> Option<String> {
        self.element(node).and_then(|el| el.is.clone())
    }

    fn text(&self, node: NodeId) -> Option<String> {
        match &self.slot(node)?.data {
            NodeData::Text(t) => Some(t.clone()),
            NodeData::Element(_) => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(node)?;
        let name = name.to_ascii_lowercase();
        match el.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => el.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?
            .attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.element(node).map(|el| el.attrs.clone()).unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.slot(node).map(|s| s.children.clone()).unwrap_or_default()
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.slot_mut(parent)?.children.push(child);
        self.slot_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> Result<(), DomError> {
        if self.slot(old).and_then(|s| s.parent) != Some(parent) {
            return Err(DomError::NotAChild { parent, child: old });
        }
        if new == old {
            return Ok(());
        }
        self.check_insert(parent, new)?;
        self.detach(new)?;
        let slot = self.slot_mut(parent)?;
        let pos = slot
            .children
            .iter()
            .position(|c| *c == old)
            .ok_or(DomError::NotAChild { parent, child: old })?;
        slot.children[pos] = new;
        self.slot_mut(new)?.parent = Some(parent);
        self.slot_mut(old)?.parent = None;
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.slot(child).and_then(|s| s.parent) != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.detach(child)
    }

    fn add_listener(&mut self, node: NodeId, event: &str, listener: Listener) -> Result<(), DomError> {
        self.element_mut(node)?
            .listeners
            .push((event.to_ascii_lowercase(), listener));
        Ok(())
    }

    fn listeners(&self, node: NodeId, event: &str) -> Vec<Listener> {
        self.element(node)
            .map(|el| {
                el.listeners
                    .iter()
                    .filter(|(k, _)| k.eq_ignore_ascii_case(event))
                    .map(|(_, l)| l.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .find(|n| list.matches(self, *n)))
    }

    fn discard(&mut self, node: NodeId) {
        if node == self.root || !self.contains(node) {
            return;
        }
        let _ = self.detach(node);
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(slot) = self.nodes.remove(n) {
                stack.extend(slot.children);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_moves_node_between_parents() {
        let mut doc = Document::new();
        let a = doc.create_element("div", None);
        let b = doc.create_element("div", None);
        let t = doc.create_text("x");
        doc.append_child(a, t).unwrap();
        doc.append_child(b, t).unwrap();
        assert!(doc.children(a).is_empty());
        assert_eq!(doc.children(b), vec![t]);
        assert_eq!(doc.parent(t), Some(b));
    }

    #[test]
    fn cannot_append_into_own_subtree() {
        let mut doc = Document::new();
        let a = doc.create_element("div", None);
        let b = doc.create_element("span", None);
        doc.append_child(a, b).unwrap();
        assert_eq!(
            doc.append_child(b, a),
            Err(DomError::HierarchyRequest { child: a })
        );
    }

    #[test]
    fn discard_frees_the_subtree() {
        let mut doc = Document::new();
        let a = doc.create_element("div", None);
        let b = doc.create_element("span", None);
        let t = doc.create_text("x");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(b, t).unwrap();
        assert_eq!(doc.len(), 4);
        doc.discard(a);
        assert_eq!(doc.len(), 1);
        assert!(doc.children(doc.root()).is_empty());
        assert!(!doc.contains(t));
    }

    #[test]
    fn discarded_slots_are_reused_without_aliasing() {
        let mut doc = Document::new();
        let host = doc.create_element("main", None);
        doc.append_child(doc.root(), host).unwrap();
        let first = doc.create_text("0");
        doc.append_child(host, first).unwrap();

        let mut previous = first;
        for n in 1..10_000 {
            let p = doc.create_element("p", None);
            let t = doc.create_text(&n.to_string());
            doc.append_child(p, t).unwrap();
            doc.replace_child(host, p, previous).unwrap();
            doc.discard(previous);
            previous = p;
        }
        assert_eq!(doc.len(), 4);
        assert!(doc.capacity() < 16, "slots grew to {}", doc.capacity());
        assert!(!doc.contains(first));
        assert_eq!(doc.inner_html(host), "<p>9999</p>");
    }
}
