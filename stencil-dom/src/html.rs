// stencil-dom/src/html.rs

use crate::document::{DOCUMENT_TAG, Document, NodeData};
use crate::NodeId;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

impl Document {
    /// Serialize `node` including its own tag.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    /// Serialize the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(slot) = self.slot(node) {
            for c in &slot.children {
                self.write_node(*c, &mut out);
            }
        }
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        let Some(slot) = self.slot(node) else { return };
        match &slot.data {
            NodeData::Text(t) => out.push_str(&escape_text(t)),
            NodeData::Element(el) if el.tag == DOCUMENT_TAG => {
                out.push_str(&self.inner_html(node));
            }
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                if let Some(is) = &el.is {
                    out.push_str(&format!(" is=\"{}\"", escape_attr(is)));
                }
                for (k, v) in &el.attrs {
                    out.push_str(&format!(" {}=\"{}\"", k, escape_attr(v)));
                }
                out.push('>');
                if is_void(&el.tag) && slot.children.is_empty() {
                    return;
                }
                for c in &slot.children {
                    self.write_node(*c, out);
                }
                out.push_str(&format!("</{}>", el.tag));
            }
        }
    }
}
