use stencil_core::BindError;
use stencil_dom::DomError;
use stencil_template::{CompileError, MarkupError, RenderError};

/// Coarse classification of runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mount point, selector or template definition could not be found.
    Lookup,
    /// A value required to be an object is not.
    Type,
    /// An expression failed at render or handler time.
    Evaluation,
    /// An operation was called out of order.
    State,
    /// Markup, an expression or a selector did not parse.
    Parse,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can't find element '{0}'")]
    NotFound(String),
    #[error("<{element}> requires <template> child")]
    MissingTemplate { element: String },
    #[error("observed variable '{expr}' is typeof {found} but object required")]
    NotAnObject { expr: String, found: &'static str },
    #[error("render() called before render_in()")]
    NotMounted,
    #[error("document is already borrowed")]
    DocumentBusy,
    #[error("global '{0}' is already borrowed")]
    GlobalBusy(String),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error(transparent)]
    Expression(#[from] stencil_expr::Error),
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::MissingTemplate { .. } => ErrorKind::Lookup,
            Error::NotAnObject { .. } | Error::Bind(BindError::NotAnObject(_)) => ErrorKind::Type,
            Error::NotMounted
            | Error::DocumentBusy
            | Error::GlobalBusy(_)
            | Error::Bind(BindError::Unbound) => ErrorKind::State,
            Error::Render(_) | Error::Expression(stencil_expr::Error::Eval(_)) => {
                ErrorKind::Evaluation
            }
            Error::Compile(_) | Error::Markup(_) | Error::Expression(stencil_expr::Error::Parse(_)) => {
                ErrorKind::Parse
            }
            Error::Dom(DomError::InvalidSelector { .. }) => ErrorKind::Parse,
            Error::Dom(DomError::Listener { .. }) => ErrorKind::Evaluation,
            Error::Dom(_) => ErrorKind::Lookup,
        }
    }
}
