use stencil_dom::{Dom, DomError, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parsed template markup. Immutable once read by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attrs: Vec<Attr>,
        children: Vec<MarkupNode>,
    },
    Text(String),
    Comment(String),
}

impl MarkupNode {
    pub fn element(tag: impl Into<String>, attrs: Vec<Attr>, children: Vec<MarkupNode>) -> Self {
        MarkupNode::Element {
            tag: tag.into(),
            attrs,
            children,
        }
    }

    pub fn text(t: impl Into<String>) -> Self {
        MarkupNode::Text(t.into())
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            MarkupNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            MarkupNode::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn children(&self) -> &[MarkupNode] {
        match self {
            MarkupNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, MarkupNode::Text(t) if t.trim().is_empty())
    }
}

/// Roots a template renders: the children of a lone `<template>` wrapper, or
/// the nodes themselves.
pub fn template_roots(nodes: &[MarkupNode]) -> &[MarkupNode] {
    let mut significant = nodes
        .iter()
        .filter(|n| !n.is_blank_text() && !matches!(n, MarkupNode::Comment(_)));
    match (significant.next(), significant.next()) {
        (Some(only @ MarkupNode::Element { tag, .. }), None) if tag == "template" => {
            only.children()
        }
        _ => nodes,
    }
}

/// Read a live subtree back into markup.
pub fn from_dom<D: Dom + ?Sized>(dom: &D, node: NodeId) -> MarkupNode {
    if let Some(text) = dom.text(node) {
        return MarkupNode::Text(text);
    }
    let tag = dom.tag_name(node).unwrap_or_default();
    let attrs = dom
        .is_value(node)
        .map(|is| Attr::new("is", is))
        .into_iter()
        .chain(
            dom.attributes(node)
                .into_iter()
                .map(|(name, value)| Attr { name, value }),
        )
        .collect();
    let children = dom
        .children(node)
        .into_iter()
        .map(|c| from_dom(dom, c))
        .collect();
    MarkupNode::Element {
        tag,
        attrs,
        children,
    }
}

/// Create live nodes for `nodes` and append them to `parent`, verbatim:
/// directives and handler attributes stay plain attributes. Comments are skipped.
pub fn append_to_dom<D: Dom + ?Sized>(
    dom: &mut D,
    parent: NodeId,
    nodes: &[MarkupNode],
) -> Result<(), DomError> {
    for node in nodes {
        let id = match node {
            MarkupNode::Comment(_) => continue,
            MarkupNode::Text(t) => dom.create_text(t),
            MarkupNode::Element {
                tag,
                attrs,
                children,
            } => {
                let is = attrs.iter().find(|a| a.name == "is").map(|a| a.value.as_str());
                let el = dom.create_element(tag, is);
                for a in attrs.iter().filter(|a| a.name != "is") {
                    dom.set_attribute(el, &a.name, &a.value)?;
                }
                append_to_dom(dom, el, children)?;
                el
            }
        };
        dom.append_child(parent, id)?;
    }
    Ok(())
}
