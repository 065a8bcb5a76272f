use std::rc::Rc;

use stencil_expr::{
    Expr, ForClause, Interpolated, ParseError, Program, parse_expression, parse_for_clause,
    parse_interpolated, parse_program,
};

use crate::builder::CompiledBuilder;
use crate::markup::{MarkupNode, template_roots};
use crate::parse::{MarkupError, parse_markup};
use crate::walk::{NodePath, Visitor, Walk, walk};

pub const DEFAULT_ATTR_PREFIX: &str = "*";
pub const DEFAULT_EVENT_PREFIX: &str = "on";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Marks directive attributes: `<prefix>if`, `<prefix>for`.
    pub attr_prefix: String,
    /// Marks handler attributes: `<prefix><event>`.
    pub event_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            attr_prefix: DEFAULT_ATTR_PREFIX.to_string(),
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn with_attr_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attr_prefix = prefix.into();
        self
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("Error in {path}: {source}")]
    Expression { path: String, source: ParseError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub event: String,
    pub source: String,
    pub program: Rc<Program>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementInstr {
    pub path: String,
    pub tag: String,
    pub is: Option<String>,
    pub guard: Option<Expr>,
    pub each: Option<ForClause>,
    pub attrs: Vec<(String, Interpolated)>,
    pub handlers: Vec<Handler>,
    pub children: Vec<Instr>,
}

/// One step of a compiled builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Element(ElementInstr),
    Text { path: String, text: Interpolated },
    Script { path: String, program: Program },
}

/// Turns markup into a [`CompiledBuilder`]. The input tree is only read.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile_str(&self, src: &str) -> Result<CompiledBuilder, CompileError> {
        let nodes = parse_markup(src)?;
        self.compile(&nodes)
    }

    /// Compile `nodes`, unwrapping a lone `<template>` definition.
    pub fn compile(&self, nodes: &[MarkupNode]) -> Result<CompiledBuilder, CompileError> {
        let roots = template_roots(nodes);
        let mut pass = CompilePass {
            config: &self.config,
            frames: vec![Vec::new()],
            open: Vec::new(),
        };
        walk(roots, &mut pass)?;
        let instrs = pass.frames.pop().unwrap_or_default();
        tracing::debug!(roots = instrs.len(), "template compiled");
        Ok(CompiledBuilder::new(instrs))
    }
}

/// Compile with the default prefixes.
pub fn compile(nodes: &[MarkupNode]) -> Result<CompiledBuilder, CompileError> {
    Compiler::default().compile(nodes)
}

pub fn compile_str(src: &str) -> Result<CompiledBuilder, CompileError> {
    Compiler::default().compile_str(src)
}

struct CompilePass<'c> {
    config: &'c CompilerConfig,
    /// Finished instructions per open element, outermost first.
    frames: Vec<Vec<Instr>>,
    /// Elements whose children are still being compiled.
    open: Vec<ElementInstr>,
}

impl CompilePass<'_> {
    fn emit(&mut self, instr: Instr) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(instr);
        }
    }

    fn element(
        &self,
        tag: &str,
        attrs: &[crate::markup::Attr],
        path: &str,
    ) -> Result<ElementInstr, CompileError> {
        let err = |source| CompileError::Expression {
            path: path.to_string(),
            source,
        };
        let prefix = self.config.attr_prefix.as_str();
        let events = self.config.event_prefix.as_str();
        let mut instr = ElementInstr {
            path: path.to_string(),
            tag: tag.to_string(),
            is: None,
            guard: None,
            each: None,
            attrs: Vec::new(),
            handlers: Vec::new(),
            children: Vec::new(),
        };

        for attr in attrs {
            let name = attr.name.as_str();
            if let Some(directive) = name.strip_prefix(prefix).filter(|_| !prefix.is_empty()) {
                match directive {
                    "if" => instr.guard = Some(parse_expression(&attr.value).map_err(err)?),
                    "for" => instr.each = Some(parse_for_clause(&attr.value).map_err(err)?),
                    other => tracing::warn!(directive = other, path, "ignoring unknown directive"),
                }
            } else if let Some(event) = name.strip_prefix(events).filter(|e| !e.is_empty()) {
                instr.handlers.push(Handler {
                    event: event.to_string(),
                    source: attr.value.clone(),
                    program: Rc::new(parse_program(&attr.value).map_err(err)?),
                });
            } else if name == "is" {
                instr.is = Some(attr.value.clone());
            } else {
                let value = parse_interpolated(&attr.value).map_err(err)?;
                instr.attrs.push((attr.name.clone(), value));
            }
        }
        Ok(instr)
    }
}

impl Visitor for CompilePass<'_> {
    type Error = CompileError;

    fn enter(&mut self, node: &MarkupNode, path: &NodePath) -> Result<Walk, CompileError> {
        let path = path.to_string();
        match node {
            MarkupNode::Comment(_) => Ok(Walk::Skip),
            MarkupNode::Text(t) => {
                let text = parse_interpolated(t).map_err(|source| CompileError::Expression {
                    path: path.clone(),
                    source,
                })?;
                self.emit(Instr::Text { path, text });
                Ok(Walk::Skip)
            }
            MarkupNode::Element { tag, .. } if tag == "script" => {
                let src = crate::walk::text_content(node);
                let program = parse_program(&src).map_err(|source| CompileError::Expression {
                    path: path.clone(),
                    source,
                })?;
                self.emit(Instr::Script { path, program });
                Ok(Walk::Skip)
            }
            MarkupNode::Element { tag, attrs, .. } => {
                let instr = self.element(tag, attrs, &path)?;
                self.open.push(instr);
                self.frames.push(Vec::new());
                Ok(Walk::Continue)
            }
        }
    }

    fn leave(&mut self, _node: &MarkupNode, _path: &NodePath) -> Result<(), CompileError> {
        let children = self.frames.pop().unwrap_or_default();
        if let Some(mut instr) = self.open.pop() {
            instr.children = children;
            self.emit(Instr::Element(instr));
        }
        Ok(())
    }
}
