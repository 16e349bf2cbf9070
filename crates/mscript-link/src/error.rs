use mscript_ast::ast::VarKind;
use mscript_ast::span::Span;

/// Expected child count for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtMost(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn admits(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtMost(k) => n <= k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "exactly {}", k),
            Arity::AtMost(k) => write!(f, "at most {}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

/// Structural errors found by the link pass. Any of these means the
/// mission cannot be loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Wrong number of children for a tag
    Arity {
        tag: String,
        expected: Arity,
        found: usize,
        span: Span,
    },
    /// Tag outside the recognized set
    UnknownTag { tag: String, span: Span },
    /// Known tag in a position where it has no meaning
    /// (e.g. `<test>` as a statement, `<while>` as an expression)
    Misplaced {
        tag: String,
        position: &'static str,
        span: Span,
    },
    /// Required attribute absent
    MissingAttr {
        tag: String,
        attr: &'static str,
        span: Span,
    },
    /// Attribute present but its value is not acceptable
    InvalidAttr {
        tag: String,
        attr: &'static str,
        value: String,
        span: Span,
    },
    /// Literal text does not parse as the declared kind
    BadLiteral {
        kind: VarKind,
        text: String,
        span: Span,
    },
    /// `<exec>` names a script that does not exist
    UnknownScript {
        module: String,
        name: String,
        span: Span,
    },
    /// `<exec>` passes the wrong number of arguments
    ArgCount {
        script: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    /// Two modules, scripts or parameters share a name
    Duplicate {
        what: &'static str,
        name: String,
        span: Span,
    },
}

impl LinkError {
    pub fn span(&self) -> Span {
        match self {
            LinkError::Arity { span, .. }
            | LinkError::UnknownTag { span, .. }
            | LinkError::Misplaced { span, .. }
            | LinkError::MissingAttr { span, .. }
            | LinkError::InvalidAttr { span, .. }
            | LinkError::BadLiteral { span, .. }
            | LinkError::UnknownScript { span, .. }
            | LinkError::ArgCount { span, .. }
            | LinkError::Duplicate { span, .. } => *span,
        }
    }
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LinkError::Arity {
                tag,
                expected,
                found,
                ..
            } => write!(
                f,
                "<{}> needs {} child nodes, found {}",
                tag, expected, found
            ),
            LinkError::UnknownTag { tag, .. } => write!(f, "unknown tag <{}>", tag),
            LinkError::Misplaced { tag, position, .. } => {
                write!(f, "<{}> cannot be used as {}", tag, position)
            }
            LinkError::MissingAttr { tag, attr, .. } => {
                write!(f, "<{}> is missing required attribute '{}'", tag, attr)
            }
            LinkError::InvalidAttr {
                tag, attr, value, ..
            } => write!(f, "<{}> has invalid {}=\"{}\"", tag, attr, value),
            LinkError::BadLiteral { kind, text, .. } => {
                write!(f, "\"{}\" is not a valid {} literal", text, kind)
            }
            LinkError::UnknownScript { module, name, .. } => {
                write!(f, "exec of unknown script '{}.{}'", module, name)
            }
            LinkError::ArgCount {
                script,
                expected,
                found,
                ..
            } => write!(
                f,
                "script '{}' takes {} arguments, exec passes {}",
                script, expected, found
            ),
            LinkError::Duplicate { what, name, .. } => {
                write!(f, "duplicate {} '{}'", what, name)
            }
        }
    }
}

impl std::error::Error for LinkError {}
