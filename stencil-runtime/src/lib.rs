//! Runtime side of stencil: template instances mounted in a document,
//! declarative `<st-tpl>` elements and the page that hosts them.

mod error;

pub mod context;
pub mod element;
pub mod events;
pub mod instance;
pub mod page;

pub use context::Context;
pub use element::{DEFAULT_ELEMENT_TAG, ElementAttrs, ElementRegistry, TemplateElement, Upgrade};
pub use error::{Error, ErrorKind};
pub use instance::{MountTarget, SharedDom, TemplateInstance, resolve};
pub use page::Page;
