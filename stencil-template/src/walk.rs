use std::fmt;

use crate::markup::MarkupNode;

pub const ROOT_LABEL: &str = "(root)";

/// Human-readable chain of node labels from the root, e.g.
/// `(root) > DIV class="x" > SPAN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    labels: Vec<String>,
}

impl Default for NodePath {
    fn default() -> Self {
        Self {
            labels: vec![ROOT_LABEL.to_string()],
        }
    }
}

impl NodePath {
    pub fn depth(&self) -> usize {
        self.labels.len() - 1
    }

    fn push(&mut self, label: String) {
        self.labels.push(label);
    }

    fn pop(&mut self) {
        if self.labels.len() > 1 {
            self.labels.pop();
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join(" > "))
    }
}

/// Path label of one node: upper-cased tag followed by its attributes as written.
pub fn label(node: &MarkupNode) -> String {
    match node {
        MarkupNode::Element { tag, attrs, .. } => {
            let mut s = tag.to_ascii_uppercase();
            for a in attrs {
                s.push_str(&format!(" {}=\"{}\"", a.name, a.value));
            }
            s
        }
        MarkupNode::Text(_) => "(text)".to_string(),
        MarkupNode::Comment(_) => "(comment)".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend; `leave` is not called for this node either.
    Skip,
}

pub trait Visitor {
    type Error;

    /// Called before the children of `node`. `path` already ends with `node`.
    fn enter(&mut self, node: &MarkupNode, path: &NodePath) -> Result<Walk, Self::Error>;

    /// Called after the children of every node whose `enter` returned [`Walk::Continue`].
    fn leave(&mut self, _node: &MarkupNode, _path: &NodePath) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Depth-first, pre-order traversal in document order.
pub fn walk<V: Visitor>(nodes: &[MarkupNode], visitor: &mut V) -> Result<(), V::Error> {
    let mut path = NodePath::default();
    walk_level(nodes, visitor, &mut path)
}

fn walk_level<V: Visitor>(
    nodes: &[MarkupNode],
    visitor: &mut V,
    path: &mut NodePath,
) -> Result<(), V::Error> {
    for node in nodes {
        path.push(label(node));
        let result = match visitor.enter(node, path) {
            Ok(Walk::Continue) => walk_level(node.children(), visitor, path)
                .and_then(|()| visitor.leave(node, path)),
            Ok(Walk::Skip) => Ok(()),
            Err(e) => Err(e),
        };
        path.pop();
        result?;
    }
    Ok(())
}

/// First element named `tag`, searching depth-first.
pub fn find_element<'a>(nodes: &'a [MarkupNode], tag: &str) -> Option<&'a MarkupNode> {
    for node in nodes {
        if node.tag().is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
            return Some(node);
        }
        if let Some(found) = find_element(node.children(), tag) {
            return Some(found);
        }
    }
    None
}

/// Concatenated text below `node`, comments excluded.
pub fn text_content(node: &MarkupNode) -> String {
    match node {
        MarkupNode::Text(t) => t.clone(),
        MarkupNode::Comment(_) => String::new(),
        MarkupNode::Element { children, .. } => children.iter().map(text_content).collect(),
    }
}
