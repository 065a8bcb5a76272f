//! Template compiler: markup in, [`CompiledBuilder`] out.
//!
//! ```text
//! <ul><li *for="item of items" onclick="picked = item">${item}</li></ul>
//! ```
//!
//! `*if` guards an element, `*for` repeats it (the guard is checked first),
//! `on<event>` attributes become listeners, `<script>` bodies run against the
//! scope, and text and attribute values are interpolated at render time.

pub mod builder;
pub mod compile;
pub mod markup;
pub mod parse;
pub mod walk;

pub use builder::{CompiledBuilder, RenderCause, RenderError, WRAPPER_TAG, event_value};
pub use compile::{
    CompileError, Compiler, CompilerConfig, ElementInstr, Handler, Instr, compile, compile_str,
};
pub use markup::{Attr, MarkupNode, append_to_dom, from_dom, template_roots};
pub use parse::{MarkupError, parse_markup};
pub use walk::{NodePath, Visitor, Walk, find_element, text_content, walk};
