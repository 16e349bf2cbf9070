pub mod span {
    use serde::Serialize;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    pub struct Span {
        pub start: u32,
        pub end: u32,
    }
}

/// Raw markup tree, as produced by the parser. Tags and attributes are
/// uninterpreted strings; the link pass gives them meaning.
pub mod markup {
    use super::span::Span;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Attr {
        pub name: String,
        pub value: String,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Node {
        pub tag: String,
        pub attrs: Vec<Attr>,
        pub children: Vec<Node>,
        pub span: Span,
    }

    impl Node {
        pub fn new(tag: impl Into<String>) -> Self {
            Self {
                tag: tag.into(),
                attrs: Vec::new(),
                children: Vec::new(),
                span: Span::default(),
            }
        }

        /// Builder: append an attribute.
        pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.attrs.push(Attr {
                name: name.into(),
                value: value.into(),
                span: self.span,
            });
            self
        }

        /// Builder: append a child node.
        pub fn with_child(mut self, child: Node) -> Self {
            self.children.push(child);
            self
        }

        /// First attribute with the given name.
        pub fn attr(&self, name: &str) -> Option<&str> {
            self.attrs
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str())
        }
    }
}

pub mod ast {
    use super::span::Span;
    use serde::Serialize;

    /// Which traversal is running: the one-time structural link or a
    /// repeatable execution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum Mode {
        Link,
        Execute,
    }

    impl std::fmt::Display for Mode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Mode::Link => write!(f, "link"),
                Mode::Execute => write!(f, "execute"),
            }
        }
    }

    /// Declared kind of a variable, parameter or script result.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub enum VarKind {
        Void,
        Bool,
        Int,
        Float,
        String,
        Object,
    }

    impl VarKind {
        pub fn from_name(name: &str) -> Option<Self> {
            match name {
                "void" => Some(VarKind::Void),
                "bool" => Some(VarKind::Bool),
                "int" => Some(VarKind::Int),
                "float" => Some(VarKind::Float),
                "string" => Some(VarKind::String),
                "object" => Some(VarKind::Object),
                _ => None,
            }
        }

        pub fn name(self) -> &'static str {
            match self {
                VarKind::Void => "void",
                VarKind::Bool => "bool",
                VarKind::Int => "int",
                VarKind::Float => "float",
                VarKind::String => "string",
                VarKind::Object => "object",
            }
        }

        /// Whether a value of kind `found` may be stored where `self` is declared.
        /// Ints widen to floats; everything else must match exactly.
        pub fn accepts(self, found: VarKind) -> bool {
            self == found || (self == VarKind::Float && found == VarKind::Int)
        }
    }

    impl std::fmt::Display for VarKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.name())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }

    /// A linked mission: every module with its globals and scripts.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Program {
        pub name: Option<String>,
        pub modules: Vec<ModuleDecl>,
        pub span: Span,
    }

    impl Program {
        pub fn module(&self, name: &str) -> Option<&ModuleDecl> {
            self.modules.iter().find(|m| m.name.text == name)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ModuleDecl {
        pub name: Ident,
        pub globals: Vec<DefVar>,
        pub scripts: Vec<Script>,
        pub span: Span,
    }

    impl ModuleDecl {
        pub fn script(&self, name: &str) -> Option<&Script> {
            self.scripts.iter().find(|s| s.name.text == name)
        }
    }

    /// A mission procedure. Its body runs in one frame scope.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Script {
        pub name: Ident,
        pub ret: VarKind,
        pub params: Vec<Param>,
        pub body: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Param {
        pub name: Ident,
        pub kind: VarKind,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Stmt {
        If(Box<IfStmt>),
        While(Box<WhileStmt>),
        Block(Block),
        DefVar(DefVar),
        SetVar(SetVar),
        Exec(ExecCall),
        Call(HostCall),
        Return(Return),
    }

    impl Stmt {
        /// The markup tag this statement was linked from.
        pub fn tag(&self) -> &'static str {
            match self {
                Stmt::If(_) => "if",
                Stmt::While(_) => "while",
                Stmt::Block(_) => "block",
                Stmt::DefVar(_) => "defvar",
                Stmt::SetVar(_) => "setvar",
                Stmt::Exec(_) => "exec",
                Stmt::Call(_) => "call",
                Stmt::Return(_) => "return",
            }
        }

        pub fn span(&self) -> Span {
            match self {
                Stmt::If(s) => s.span,
                Stmt::While(s) => s.span,
                Stmt::Block(b) => b.span,
                Stmt::DefVar(d) => d.span,
                Stmt::SetVar(s) => s.span,
                Stmt::Exec(e) => e.span,
                Stmt::Call(c) => c.span,
                Stmt::Return(r) => r.span,
            }
        }
    }

    /// `<if>`: condition, then-branch, else-branch.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct IfStmt {
        pub cond: Expr,
        pub then_: Stmt,
        pub else_: Stmt,
        pub span: Span,
    }

    /// `<while>`: condition, body.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct WhileStmt {
        pub cond: Expr,
        pub body: Stmt,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct DefVar {
        pub name: Ident,
        pub kind: VarKind,
        pub init: Option<Expr>,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct SetVar {
        pub name: Ident,
        pub value: Expr,
        pub span: Span,
    }

    /// Invocation of a mission script. `module: None` means the module of
    /// the script currently running.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ExecCall {
        pub module: Option<String>,
        pub name: Ident,
        pub args: Vec<Expr>,
        pub span: Span,
    }

    /// Invocation of a host built-in, e.g. `_std.print`.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct HostCall {
        pub module: String,
        pub name: Ident,
        pub args: Vec<Expr>,
        pub span: Span,
    }

    impl HostCall {
        pub fn qualified_name(&self) -> String {
            format!("{}.{}", self.module, self.name.text)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Return {
        pub value: Option<Expr>,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Expr {
        Lit(Lit, Span),
        Var(Ident),
        Math {
            op: MathOp,
            lhs: Box<Expr>,
            rhs: Box<Expr>,
            span: Span,
        },
        Test {
            op: TestOp,
            lhs: Box<Expr>,
            rhs: Box<Expr>,
            span: Span,
        },
        And(Vec<Expr>, Span),
        Or(Vec<Expr>, Span),
        Not(Box<Expr>, Span),
        Exec(ExecCall),
        Call(HostCall),
    }

    impl Expr {
        pub fn span(&self) -> Span {
            match self {
                Expr::Lit(_, span)
                | Expr::And(_, span)
                | Expr::Or(_, span)
                | Expr::Not(_, span) => *span,
                Expr::Var(id) => id.span,
                Expr::Math { span, .. } | Expr::Test { span, .. } => *span,
                Expr::Exec(e) => e.span,
                Expr::Call(c) => c.span,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum Lit {
        Int(i64),
        Float(f64),
        Bool(bool),
        Str(String),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum MathOp {
        Add,
        Sub,
        Mul,
        Div,
        Rem,
    }

    impl MathOp {
        pub fn from_symbol(s: &str) -> Option<Self> {
            match s {
                "+" => Some(MathOp::Add),
                "-" => Some(MathOp::Sub),
                "*" => Some(MathOp::Mul),
                "/" => Some(MathOp::Div),
                "%" => Some(MathOp::Rem),
                _ => None,
            }
        }

        pub fn symbol(self) -> &'static str {
            match self {
                MathOp::Add => "+",
                MathOp::Sub => "-",
                MathOp::Mul => "*",
                MathOp::Div => "/",
                MathOp::Rem => "%",
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum TestOp {
        // equality
        Eq,
        Ne,
        // relational
        Lt,
        Le,
        Gt,
        Ge,
    }

    impl TestOp {
        pub fn from_name(s: &str) -> Option<Self> {
            match s {
                "eq" => Some(TestOp::Eq),
                "ne" => Some(TestOp::Ne),
                "lt" => Some(TestOp::Lt),
                "le" => Some(TestOp::Le),
                "gt" => Some(TestOp::Gt),
                "ge" => Some(TestOp::Ge),
                _ => None,
            }
        }

        pub fn name(self) -> &'static str {
            match self {
                TestOp::Eq => "eq",
                TestOp::Ne => "ne",
                TestOp::Lt => "lt",
                TestOp::Le => "le",
                TestOp::Gt => "gt",
                TestOp::Ge => "ge",
            }
        }
    }
}
