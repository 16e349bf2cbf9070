//! Exec target resolution over a linked program.
//!
//! Runs after every module is linked, so scripts may exec scripts declared
//! later in the document or in other modules.

use mscript_ast::ast::{ExecCall, Expr, Program, Stmt};

use crate::error::LinkError;

pub(crate) fn check_exec_targets(program: &Program) -> Result<(), LinkError> {
    for module in &program.modules {
        let mut check = |call: &ExecCall| check_exec(program, &module.name.text, call);
        for global in &module.globals {
            if let Some(init) = &global.init {
                walk_expr(init, &mut check)?;
            }
        }
        for script in &module.scripts {
            for stmt in &script.body {
                walk_stmt(stmt, &mut check)?;
            }
        }
    }
    Ok(())
}

fn check_exec(program: &Program, current: &str, call: &ExecCall) -> Result<(), LinkError> {
    let module_name = call.module.as_deref().unwrap_or(current);
    let script = program
        .module(module_name)
        .and_then(|m| m.script(&call.name.text))
        .ok_or_else(|| LinkError::UnknownScript {
            module: module_name.to_string(),
            name: call.name.text.clone(),
            span: call.span,
        })?;
    if script.params.len() != call.args.len() {
        return Err(LinkError::ArgCount {
            script: format!("{}.{}", module_name, script.name.text),
            expected: script.params.len(),
            found: call.args.len(),
            span: call.span,
        });
    }
    Ok(())
}

fn walk_stmt<F>(stmt: &Stmt, f: &mut F) -> Result<(), LinkError>
where
    F: FnMut(&ExecCall) -> Result<(), LinkError>,
{
    match stmt {
        Stmt::If(s) => {
            walk_expr(&s.cond, f)?;
            walk_stmt(&s.then_, f)?;
            walk_stmt(&s.else_, f)
        }
        Stmt::While(s) => {
            walk_expr(&s.cond, f)?;
            walk_stmt(&s.body, f)
        }
        Stmt::Block(b) => b.stmts.iter().try_for_each(|s| walk_stmt(s, f)),
        Stmt::DefVar(d) => match &d.init {
            Some(init) => walk_expr(init, f),
            None => Ok(()),
        },
        Stmt::SetVar(s) => walk_expr(&s.value, f),
        Stmt::Exec(call) => {
            f(call)?;
            call.args.iter().try_for_each(|a| walk_expr(a, f))
        }
        Stmt::Call(call) => call.args.iter().try_for_each(|a| walk_expr(a, f)),
        Stmt::Return(r) => match &r.value {
            Some(v) => walk_expr(v, f),
            None => Ok(()),
        },
    }
}

fn walk_expr<F>(expr: &Expr, f: &mut F) -> Result<(), LinkError>
where
    F: FnMut(&ExecCall) -> Result<(), LinkError>,
{
    match expr {
        Expr::Lit(..) | Expr::Var(_) => Ok(()),
        Expr::Math { lhs, rhs, .. } | Expr::Test { lhs, rhs, .. } => {
            walk_expr(lhs, f)?;
            walk_expr(rhs, f)
        }
        Expr::And(items, _) | Expr::Or(items, _) => {
            items.iter().try_for_each(|e| walk_expr(e, f))
        }
        Expr::Not(inner, _) => walk_expr(inner, f),
        Expr::Exec(call) => {
            f(call)?;
            call.args.iter().try_for_each(|a| walk_expr(a, f))
        }
        Expr::Call(call) => call.args.iter().try_for_each(|a| walk_expr(a, f)),
    }
}
