// crates/mscript-link/src/linker.rs
// Link pass: validates the shape of every raw node once and builds the
// linked program the interpreter executes.

use mscript_ast::ast::{
    Block, DefVar, ExecCall, Expr, HostCall, Ident, IfStmt, Lit, MathOp, Mode, ModuleDecl, Param,
    Program, Return, Script, SetVar, Stmt, TestOp, VarKind, WhileStmt,
};
use mscript_ast::markup::Node;
use mscript_ast::span::Span;

use crate::error::{Arity, LinkError};
use crate::resolve::check_exec_targets;

/// The closed set of tags the link pass understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Mission,
    Module,
    Script,
    Params,
    // statements
    If,
    Block,
    SetVar,
    DefVar,
    Exec,
    Call,
    Return,
    While,
    // expressions
    And,
    Or,
    Not,
    Test,
    Fmath,
    Const,
    Var,
}

impl Tag {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "mission" => Tag::Mission,
            "module" => Tag::Module,
            "script" => Tag::Script,
            "params" => Tag::Params,
            "if" => Tag::If,
            "block" => Tag::Block,
            "setvar" => Tag::SetVar,
            "defvar" => Tag::DefVar,
            "exec" => Tag::Exec,
            "call" => Tag::Call,
            "return" => Tag::Return,
            "while" => Tag::While,
            "and" => Tag::And,
            "or" => Tag::Or,
            "not" => Tag::Not,
            "test" => Tag::Test,
            "fmath" => Tag::Fmath,
            "const" => Tag::Const,
            "var" => Tag::Var,
            _ => return None,
        })
    }
}

fn tag_of(node: &Node) -> Result<Tag, LinkError> {
    Tag::from_name(&node.tag).ok_or_else(|| LinkError::UnknownTag {
        tag: node.tag.clone(),
        span: node.span,
    })
}

fn misplaced(node: &Node, position: &'static str) -> LinkError {
    LinkError::Misplaced {
        tag: node.tag.clone(),
        position,
        span: node.span,
    }
}

fn check_arity(node: &Node, expected: Arity) -> Result<(), LinkError> {
    let found = node.children.len();
    if expected.admits(found) {
        Ok(())
    } else {
        Err(LinkError::Arity {
            tag: node.tag.clone(),
            expected,
            found,
            span: node.span,
        })
    }
}

fn required_attr<'n>(node: &'n Node, attr: &'static str) -> Result<&'n str, LinkError> {
    node.attr(attr).ok_or_else(|| LinkError::MissingAttr {
        tag: node.tag.clone(),
        attr,
        span: node.span,
    })
}

fn invalid_attr(node: &Node, attr: &'static str, value: &str) -> LinkError {
    LinkError::InvalidAttr {
        tag: node.tag.clone(),
        attr,
        value: value.to_string(),
        span: node.span,
    }
}

fn name_ident(node: &Node) -> Result<Ident, LinkError> {
    let text = required_attr(node, "name")?;
    if text.is_empty() {
        return Err(invalid_attr(node, "name", text));
    }
    Ok(Ident {
        text: text.to_string(),
        span: node.span,
    })
}

fn kind_attr(node: &Node, attr: &'static str) -> Result<Option<VarKind>, LinkError> {
    match node.attr(attr) {
        None => Ok(None),
        Some(text) => VarKind::from_name(text)
            .map(Some)
            .ok_or_else(|| invalid_attr(node, attr, text)),
    }
}

/// Parse literal text as the given kind.
pub fn parse_literal(kind: VarKind, text: &str, span: Span) -> Result<Lit, LinkError> {
    let bad = || LinkError::BadLiteral {
        kind,
        text: text.to_string(),
        span,
    };
    match kind {
        VarKind::Int => text.trim().parse().map(Lit::Int).map_err(|_| bad()),
        VarKind::Float => text.trim().parse().map(Lit::Float).map_err(|_| bad()),
        VarKind::Bool => match text.trim() {
            "true" => Ok(Lit::Bool(true)),
            "false" => Ok(Lit::Bool(false)),
            _ => Err(bad()),
        },
        VarKind::String => Ok(Lit::Str(text.to_string())),
        // no literal syntax for these
        VarKind::Void | VarKind::Object => Err(bad()),
    }
}

// ======= statements =======

/// Link a single statement subtree. Linking is a pure function of the raw
/// node: running it twice yields equal results.
pub fn run_link(node: &Node) -> Result<Stmt, LinkError> {
    link_stmt(node)
}

pub fn link_stmt(node: &Node) -> Result<Stmt, LinkError> {
    let tag = tag_of(node)?;
    tracing::trace!(mode = %Mode::Link, tag = %node.tag, children = node.children.len(), "statement");
    match tag {
        Tag::If => link_if(node),
        Tag::Block => link_block(node).map(Stmt::Block),
        Tag::SetVar => link_setvar(node),
        Tag::DefVar => link_defvar(node).map(Stmt::DefVar),
        Tag::Exec => link_exec(node).map(Stmt::Exec),
        Tag::Return => link_return(node),
        Tag::Call => link_call(node).map(Stmt::Call),
        Tag::While => link_while(node),
        Tag::And
        | Tag::Or
        | Tag::Not
        | Tag::Test
        | Tag::Fmath
        | Tag::Const
        | Tag::Var
        | Tag::Mission
        | Tag::Module
        | Tag::Script
        | Tag::Params => Err(misplaced(node, "a statement")),
    }
}

fn link_if(node: &Node) -> Result<Stmt, LinkError> {
    check_arity(node, Arity::Exactly(3))?;
    // Both branches are linked regardless of which one will run.
    let cond = link_expr(&node.children[0])?;
    let then_ = link_stmt(&node.children[1])?;
    let else_ = link_stmt(&node.children[2])?;
    Ok(Stmt::If(Box::new(IfStmt {
        cond,
        then_,
        else_,
        span: node.span,
    })))
}

fn link_while(node: &Node) -> Result<Stmt, LinkError> {
    check_arity(node, Arity::Exactly(2))?;
    let cond = link_expr(&node.children[0])?;
    let body = link_stmt(&node.children[1])?;
    Ok(Stmt::While(Box::new(WhileStmt {
        cond,
        body,
        span: node.span,
    })))
}

fn link_block(node: &Node) -> Result<Block, LinkError> {
    let stmts = node
        .children
        .iter()
        .map(link_stmt)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Block {
        stmts,
        span: node.span,
    })
}

fn link_defvar(node: &Node) -> Result<DefVar, LinkError> {
    check_arity(node, Arity::AtMost(1))?;
    let name = name_ident(node)?;
    let kind = kind_attr(node, "type")?.ok_or_else(|| LinkError::MissingAttr {
        tag: node.tag.clone(),
        attr: "type",
        span: node.span,
    })?;
    if kind == VarKind::Void {
        return Err(invalid_attr(node, "type", kind.name()));
    }

    let init = match (node.attr("value"), node.children.first()) {
        (Some(text), Some(_)) => return Err(invalid_attr(node, "value", text)),
        (Some(text), None) => Some(Expr::Lit(parse_literal(kind, text, node.span)?, node.span)),
        (None, Some(child)) => Some(link_expr(child)?),
        (None, None) => None,
    };

    Ok(DefVar {
        name,
        kind,
        init,
        span: node.span,
    })
}

fn link_setvar(node: &Node) -> Result<Stmt, LinkError> {
    check_arity(node, Arity::Exactly(1))?;
    let name = name_ident(node)?;
    let value = link_expr(&node.children[0])?;
    Ok(Stmt::SetVar(SetVar {
        name,
        value,
        span: node.span,
    }))
}

fn link_args(node: &Node) -> Result<Vec<Expr>, LinkError> {
    node.children.iter().map(link_expr).collect()
}

fn link_exec(node: &Node) -> Result<ExecCall, LinkError> {
    let name = name_ident(node)?;
    let module = node.attr("module").map(str::to_string);
    Ok(ExecCall {
        module,
        name,
        args: link_args(node)?,
        span: node.span,
    })
}

fn link_call(node: &Node) -> Result<HostCall, LinkError> {
    let module = required_attr(node, "module")?.to_string();
    let name = name_ident(node)?;
    Ok(HostCall {
        module,
        name,
        args: link_args(node)?,
        span: node.span,
    })
}

fn link_return(node: &Node) -> Result<Stmt, LinkError> {
    check_arity(node, Arity::AtMost(1))?;
    let value = node.children.first().map(link_expr).transpose()?;
    Ok(Stmt::Return(Return {
        value,
        span: node.span,
    }))
}

// ======= expressions =======

pub fn link_expr(node: &Node) -> Result<Expr, LinkError> {
    let tag = tag_of(node)?;
    tracing::trace!(mode = %Mode::Link, tag = %node.tag, children = node.children.len(), "expression");
    match tag {
        Tag::Const => {
            check_arity(node, Arity::Exactly(0))?;
            let kind = kind_attr(node, "type")?.ok_or_else(|| LinkError::MissingAttr {
                tag: node.tag.clone(),
                attr: "type",
                span: node.span,
            })?;
            let text = required_attr(node, "value")?;
            Ok(Expr::Lit(parse_literal(kind, text, node.span)?, node.span))
        }
        Tag::Var => {
            check_arity(node, Arity::Exactly(0))?;
            Ok(Expr::Var(name_ident(node)?))
        }
        Tag::Fmath => {
            let symbol = required_attr(node, "math")?;
            let op = MathOp::from_symbol(symbol).ok_or_else(|| invalid_attr(node, "math", symbol))?;
            let (lhs, rhs) = link_pair(node)?;
            Ok(Expr::Math {
                op,
                lhs,
                rhs,
                span: node.span,
            })
        }
        Tag::Test => {
            let name = required_attr(node, "test")?;
            let op = TestOp::from_name(name).ok_or_else(|| invalid_attr(node, "test", name))?;
            let (lhs, rhs) = link_pair(node)?;
            Ok(Expr::Test {
                op,
                lhs,
                rhs,
                span: node.span,
            })
        }
        Tag::And => {
            check_arity(node, Arity::AtLeast(1))?;
            Ok(Expr::And(link_args(node)?, node.span))
        }
        Tag::Or => {
            check_arity(node, Arity::AtLeast(1))?;
            Ok(Expr::Or(link_args(node)?, node.span))
        }
        Tag::Not => {
            check_arity(node, Arity::Exactly(1))?;
            Ok(Expr::Not(Box::new(link_expr(&node.children[0])?), node.span))
        }
        Tag::Exec => link_exec(node).map(Expr::Exec),
        Tag::Call => link_call(node).map(Expr::Call),
        Tag::If
        | Tag::Block
        | Tag::SetVar
        | Tag::DefVar
        | Tag::Return
        | Tag::While
        | Tag::Mission
        | Tag::Module
        | Tag::Script
        | Tag::Params => Err(misplaced(node, "an expression")),
    }
}

fn link_pair(node: &Node) -> Result<(Box<Expr>, Box<Expr>), LinkError> {
    check_arity(node, Arity::Exactly(2))?;
    let lhs = link_expr(&node.children[0])?;
    let rhs = link_expr(&node.children[1])?;
    Ok((Box::new(lhs), Box::new(rhs)))
}

// ======= missions / modules / scripts =======

/// Link a whole mission. The root may be `<mission>` holding modules, or a
/// single `<module>`. Exec targets are resolved once every module is linked.
pub fn link_mission(root: &Node) -> Result<Program, LinkError> {
    let (name, module_nodes): (Option<String>, Vec<&Node>) = match tag_of(root)? {
        Tag::Mission => {
            let mut modules = Vec::new();
            for child in &root.children {
                match tag_of(child)? {
                    Tag::Module => modules.push(child),
                    _ => return Err(misplaced(child, "a mission element")),
                }
            }
            (root.attr("name").map(str::to_string), modules)
        }
        Tag::Module => (None, vec![root]),
        _ => return Err(misplaced(root, "a mission root")),
    };

    let mut modules: Vec<ModuleDecl> = Vec::new();
    for node in module_nodes {
        let module = link_module(node)?;
        if modules.iter().any(|m| m.name.text == module.name.text) {
            return Err(LinkError::Duplicate {
                what: "module",
                name: module.name.text,
                span: node.span,
            });
        }
        modules.push(module);
    }

    let program = Program {
        name,
        modules,
        span: root.span,
    };
    check_exec_targets(&program)?;
    tracing::debug!(
        mode = %Mode::Link,
        modules = program.modules.len(),
        "mission linked"
    );
    Ok(program)
}

fn link_module(node: &Node) -> Result<ModuleDecl, LinkError> {
    let name = name_ident(node)?;
    let mut globals = Vec::new();
    let mut scripts: Vec<Script> = Vec::new();

    for child in &node.children {
        match tag_of(child)? {
            Tag::DefVar => globals.push(link_defvar(child)?),
            Tag::Script => {
                let script = link_script(child)?;
                if scripts.iter().any(|s| s.name.text == script.name.text) {
                    return Err(LinkError::Duplicate {
                        what: "script",
                        name: script.name.text,
                        span: child.span,
                    });
                }
                scripts.push(script);
            }
            _ => return Err(misplaced(child, "a module element")),
        }
    }

    tracing::debug!(
        mode = %Mode::Link,
        module = %name.text,
        globals = globals.len(),
        scripts = scripts.len(),
        "module linked"
    );
    Ok(ModuleDecl {
        name,
        globals,
        scripts,
        span: node.span,
    })
}

fn link_script(node: &Node) -> Result<Script, LinkError> {
    let name = name_ident(node)?;
    let ret = kind_attr(node, "type")?.unwrap_or(VarKind::Void);

    let mut children = node.children.as_slice();
    let mut params = Vec::new();
    if let Some(first) = children.first() {
        if tag_of(first)? == Tag::Params {
            params = link_params(first)?;
            children = &children[1..];
        }
    }

    let body = children
        .iter()
        .map(|child| match tag_of(child)? {
            Tag::Params => Err(misplaced(child, "a statement")),
            _ => link_stmt(child),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Script {
        name,
        ret,
        params,
        body,
        span: node.span,
    })
}

fn link_params(node: &Node) -> Result<Vec<Param>, LinkError> {
    let mut params: Vec<Param> = Vec::new();
    for child in &node.children {
        if tag_of(child)? != Tag::DefVar {
            return Err(misplaced(child, "a parameter"));
        }
        let decl = link_defvar(child)?;
        if decl.init.is_some() {
            return Err(invalid_attr(child, "value", "parameters take no initializer"));
        }
        if params.iter().any(|p| p.name.text == decl.name.text) {
            return Err(LinkError::Duplicate {
                what: "parameter",
                name: decl.name.text,
                span: child.span,
            });
        }
        params.push(Param {
            name: decl.name,
            kind: decl.kind,
            span: decl.span,
        });
    }
    Ok(params)
}
