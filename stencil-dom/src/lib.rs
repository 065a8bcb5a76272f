//! Host DOM capability used by the stencil builders, plus an in-memory
//! [`Document`] implementing it.

use std::error::Error as StdError;
use std::rc::Rc;

use slotmap::Key;

pub mod document;
pub mod html;
pub mod selector;

pub use document::Document;
pub use selector::{Compound, Selector, SelectorList};

slotmap::new_key_type! {
    /// Handle to a node of a [`Document`]. Versioned, so a handle to a
    /// discarded node never resolves to a node allocated later in its slot.
    pub struct NodeId;
}

impl NodeId {
    /// Opaque numeric form, stable for the node's lifetime.
    pub fn index(self) -> u64 {
        self.data().as_ffi()
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    MissingNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("cannot insert {child:?} into its own subtree")]
    HierarchyRequest { child: NodeId },
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("'{event}' listener failed: {message}")]
    Listener { event: String, message: String },
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: String,
    pub target: Option<NodeId>,
    pub detail: serde_json::Value,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

pub type ListenerResult = Result<(), Box<dyn StdError>>;
pub type Listener = Rc<dyn Fn(&Event) -> ListenerResult>;

/// The DOM operations the builders and template instances need from a host.
pub trait Dom {
    /// Root of the document; `query_selector` from here searches everything.
    fn root(&self) -> NodeId;
    /// Create a detached element. `is` selects the customized built-in path.
    fn create_element(&mut self, tag: &str, is: Option<&str>) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;

    fn tag_name(&self, node: NodeId) -> Option<String>;
    /// `is` value a customized element was created with.
    fn is_value(&self, node: NodeId) -> Option<String>;
    /// Content of a text node; `None` for elements.
    fn text(&self, node: NodeId) -> Option<String>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> Result<(), DomError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;

    fn add_listener(&mut self, node: NodeId, event: &str, listener: Listener) -> Result<(), DomError>;
    fn listeners(&self, node: NodeId, event: &str) -> Vec<Listener>;

    /// First descendant of `scope` (document order) matching `selector`.
    fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError>;

    /// Detach `node` and release its whole subtree.
    fn discard(&mut self, node: NodeId);
}
