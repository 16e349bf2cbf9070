//! Execute pass for linked mission scripts
//!
//! A tree-walking interpreter over the linked program. Each statement kind
//! has one handler; `return` travels back up as [`Flow::Return`] until a
//! script frame (or the root of [`run_execute`]) absorbs it.

use std::collections::HashMap;

use mscript_ast::ast::{
    Block, DefVar, ExecCall, Expr, HostCall, IfStmt, MathOp, Mode, Program, Return, Script,
    SetVar, Stmt, TestOp, VarKind, WhileStmt,
};
use mscript_ast::span::Span;
use tracing::{debug_span, trace};

use crate::host::{HostError, HostRegistry, TraceEmitter};
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// Maximum nesting of script calls before execution is aborted.
pub const MAX_CALL_DEPTH: u32 = 1000;

/// Completion of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Normal completion: run the next statement.
    Continue,
    /// A `return` was executed; unwinds to the procedure boundary.
    Return(Value),
}

/// Errors raised while executing a linked program.
#[derive(Debug)]
pub enum RuntimeError {
    TypeMismatch {
        context: String,
        expected: VarKind,
        found: VarKind,
        span: Span,
    },
    /// A `call` used as a statement produced a value.
    NonVoidCall {
        function: String,
        found: VarKind,
        span: Span,
    },
    InvalidOperands {
        op: &'static str,
        lhs: VarKind,
        rhs: VarKind,
        span: Span,
    },
    UndefinedVariable {
        name: String,
        span: Span,
    },
    Redefined {
        name: String,
        span: Span,
    },
    UnknownScript {
        module: String,
        name: String,
        span: Span,
    },
    ArgCount {
        script: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    ReturnKind {
        script: String,
        expected: VarKind,
        found: VarKind,
        span: Span,
    },
    DivisionByZero {
        span: Span,
    },
    CallDepthExceeded {
        limit: u32,
        span: Span,
    },
    Host {
        function: String,
        error: HostError,
        span: Span,
    },
    /// Mission entry point used out of order (e.g. `tick` before `start`).
    InvalidState {
        op: &'static str,
        state: &'static str,
    },
    /// The mission failed earlier and refuses to run further.
    MissionHalted,
}

impl RuntimeError {
    /// Source location of the failing node, if the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            RuntimeError::TypeMismatch { span, .. }
            | RuntimeError::NonVoidCall { span, .. }
            | RuntimeError::InvalidOperands { span, .. }
            | RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::Redefined { span, .. }
            | RuntimeError::UnknownScript { span, .. }
            | RuntimeError::ArgCount { span, .. }
            | RuntimeError::ReturnKind { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::CallDepthExceeded { span, .. }
            | RuntimeError::Host { span, .. } => Some(*span),
            RuntimeError::InvalidState { .. } | RuntimeError::MissionHalted => None,
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::TypeMismatch {
                context,
                expected,
                found,
                ..
            } => write!(f, "{}: expected {}, found {}", context, expected, found),
            RuntimeError::NonVoidCall {
                function, found, ..
            } => write!(
                f,
                "call to `{}` used as a statement returned {}, expected void",
                function, found
            ),
            RuntimeError::InvalidOperands { op, lhs, rhs, .. } => {
                write!(f, "operator `{}` cannot be applied to {} and {}", op, lhs, rhs)
            }
            RuntimeError::UndefinedVariable { name, .. } => {
                write!(f, "undefined variable `{}`", name)
            }
            RuntimeError::Redefined { name, .. } => {
                write!(f, "variable `{}` is already defined in this scope", name)
            }
            RuntimeError::UnknownScript { module, name, .. } => {
                write!(f, "unknown script `{}.{}`", module, name)
            }
            RuntimeError::ArgCount {
                script,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{}` takes {} argument(s), {} given",
                script, expected, found
            ),
            RuntimeError::ReturnKind {
                script,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{}` is declared to return {}, returned {}",
                script, expected, found
            ),
            RuntimeError::DivisionByZero { .. } => write!(f, "integer division by zero"),
            RuntimeError::CallDepthExceeded { limit, .. } => {
                write!(f, "maximum call depth exceeded (limit: {} calls)", limit)
            }
            RuntimeError::Host {
                function, error, ..
            } => write!(f, "host call `{}` failed: {}", function, error),
            RuntimeError::InvalidState { op, state } => {
                write!(f, "cannot {} a mission that is {}", op, state)
            }
            RuntimeError::MissionHalted => write!(f, "mission halted after an earlier error"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Host { error, .. } => Some(error),
            _ => None,
        }
    }
}

type Scope = HashMap<String, Value>;

/// One script activation: its module (for globals and unqualified `exec`)
/// and a stack of block scopes.
#[derive(Debug)]
struct Frame {
    module: Option<String>,
    scopes: Vec<Scope>,
}

impl Frame {
    fn new(module: Option<String>) -> Self {
        Self {
            module,
            scopes: vec![Scope::new()],
        }
    }
}

/// Variable environment: per-module globals plus a stack of call frames.
///
/// Lookups see the current frame's scopes (innermost first), then the
/// globals of the frame's module. Frames never see their callers' locals.
#[derive(Debug)]
pub struct Env {
    globals: HashMap<String, Scope>,
    frames: Vec<Frame>,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            globals: HashMap::new(),
            frames: vec![Frame::new(None)],
        }
    }
}

impl Env {
    /// Create an environment with a single root frame belonging to no module.
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    fn frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Module of the running script, `None` at the root.
    pub fn current_module(&self) -> Option<&str> {
        self.frame().and_then(|f| f.module.as_deref())
    }

    /// Run `f` inside a fresh block scope, popped even if `f` fails.
    pub fn with_scope<T, E>(&mut self, f: impl FnOnce(&mut Env) -> Result<T, E>) -> Result<T, E> {
        if let Some(frame) = self.frame_mut() {
            frame.scopes.push(Scope::new());
        }
        let result = f(self);
        if let Some(frame) = self.frame_mut() {
            if frame.scopes.len() > 1 {
                frame.scopes.pop();
            }
        }
        result
    }

    /// Run `f` inside a new call frame bound to `module`, popped even if `f` fails.
    pub fn with_frame<T, E>(
        &mut self,
        module: &str,
        f: impl FnOnce(&mut Env) -> Result<T, E>,
    ) -> Result<T, E> {
        self.frames.push(Frame::new(Some(module.to_string())));
        let result = f(self);
        if self.frames.len() > 1 {
            self.frames.pop();
        }
        result
    }

    /// Bind `name` in the innermost scope. Returns false if that scope
    /// already holds the name; the existing binding is left untouched.
    pub fn define(&mut self, name: &str, value: Value) -> bool {
        let Some(scope) = self.frame_mut().and_then(|f| f.scopes.last_mut()) else {
            return false;
        };
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), value);
        true
    }

    /// Bind a module global. Returns false on redefinition.
    pub fn define_global(&mut self, module: &str, name: &str, value: Value) -> bool {
        let scope = self.globals.entry(module.to_string()).or_default();
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), value);
        true
    }

    /// Look up a variable visible from the current frame.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let frame = self.frame()?;
        frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| {
                let module = frame.module.as_deref()?;
                self.globals.get(module)?.get(name)
            })
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let frame = self.frames.last_mut()?;
        if let Some(i) = frame.scopes.iter().rposition(|s| s.contains_key(name)) {
            return frame.scopes[i].get_mut(name);
        }
        let module = frame.module.as_deref()?;
        self.globals.get_mut(module)?.get_mut(name)
    }

    /// Read a module global directly, regardless of the current frame.
    pub fn global(&self, module: &str, name: &str) -> Option<&Value> {
        self.globals.get(module)?.get(name)
    }

    /// Number of active call frames, the root included.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }
}

/// Execute a linked statement root against `env`.
///
/// A root `<block>` runs in the environment's current scope, so variables it
/// declares stay visible to the caller afterwards. A `return` at the root
/// yields its value; otherwise the result is `Void`. Without a linked
/// program, `exec` statements fail with `UnknownScript`.
pub fn run_execute(root: &Stmt, env: &mut Env, host: &HostRegistry) -> Result<Value, RuntimeError> {
    let mut tracer = TraceEmitter::disabled();
    Interpreter::new(host, &mut tracer).run(env, root)
}

/// Executes statements and expressions of a linked program.
pub struct Interpreter<'a> {
    program: Option<&'a Program>,
    host: &'a HostRegistry,
    tracer: &'a mut TraceEmitter,
    depth: u32,
}

impl<'a> Interpreter<'a> {
    pub fn new(host: &'a HostRegistry, tracer: &'a mut TraceEmitter) -> Self {
        Self {
            program: None,
            host,
            tracer,
            depth: 0,
        }
    }

    /// Resolve `exec` targets against `program`.
    pub fn with_program(mut self, program: &'a Program) -> Self {
        self.program = Some(program);
        self
    }

    pub fn run(&mut self, env: &mut Env, root: &Stmt) -> Result<Value, RuntimeError> {
        let flow = match root {
            Stmt::Block(block) => self.exec_stmts(env, &block.stmts)?,
            other => self.exec_stmt(env, other)?,
        };
        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Continue => Value::Void,
        })
    }

    /// Evaluate every module's globals in declaration order.
    pub fn init_globals(&mut self, env: &mut Env) -> Result<(), RuntimeError> {
        let Some(program) = self.program else {
            return Ok(());
        };
        for module in &program.modules {
            let name = module.name.text.as_str();
            env.with_frame(name, |env| {
                for global in &module.globals {
                    let value = self.defvar_value(env, global)?;
                    if !env.define_global(name, &global.name.text, value) {
                        return Err(RuntimeError::Redefined {
                            name: global.name.text.clone(),
                            span: global.span,
                        });
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, env: &mut Env, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        ensure_sufficient_stack(|| self.exec_stmt_inner(env, stmt))
    }

    fn exec_stmt_inner(&mut self, env: &mut Env, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        trace!(mode = %Mode::Execute, tag = stmt.tag(), "statement");
        match stmt {
            Stmt::If(s) => self.exec_if(env, s),
            Stmt::While(s) => self.exec_while(env, s),
            Stmt::Block(b) => self.exec_block(env, b),
            Stmt::DefVar(d) => self.exec_defvar(env, d),
            Stmt::SetVar(s) => self.exec_setvar(env, s),
            Stmt::Exec(call) => {
                self.exec_script(env, call)?;
                Ok(Flow::Continue)
            }
            Stmt::Call(call) => self.exec_call_stmt(env, call),
            Stmt::Return(r) => self.exec_return(env, r),
        }
    }

    fn exec_stmts(&mut self, env: &mut Env, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let ret @ Flow::Return(_) = self.exec_stmt(env, stmt)? {
                return Ok(ret);
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_if(&mut self, env: &mut Env, s: &IfStmt) -> Result<Flow, RuntimeError> {
        if self.eval_bool(env, &s.cond, "if condition")? {
            self.exec_stmt(env, &s.then_)
        } else {
            self.exec_stmt(env, &s.else_)
        }
    }

    fn exec_while(&mut self, env: &mut Env, s: &WhileStmt) -> Result<Flow, RuntimeError> {
        while self.eval_bool(env, &s.cond, "while condition")? {
            if let ret @ Flow::Return(_) = self.exec_stmt(env, &s.body)? {
                return Ok(ret);
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_block(&mut self, env: &mut Env, b: &Block) -> Result<Flow, RuntimeError> {
        env.with_scope(|env| self.exec_stmts(env, &b.stmts))
    }

    fn defvar_value(&mut self, env: &mut Env, d: &DefVar) -> Result<Value, RuntimeError> {
        let value = match &d.init {
            Some(init) => self.eval_expr(env, init)?,
            None => Value::default_for(d.kind),
        };
        value
            .coerce_to(d.kind)
            .map_err(|found| RuntimeError::TypeMismatch {
                context: format!("initializer of `{}`", d.name.text),
                expected: d.kind,
                found: found.kind(),
                span: d.span,
            })
    }

    fn exec_defvar(&mut self, env: &mut Env, d: &DefVar) -> Result<Flow, RuntimeError> {
        let value = self.defvar_value(env, d)?;
        if !env.define(&d.name.text, value) {
            return Err(RuntimeError::Redefined {
                name: d.name.text.clone(),
                span: d.span,
            });
        }
        Ok(Flow::Continue)
    }

    fn exec_setvar(&mut self, env: &mut Env, s: &SetVar) -> Result<Flow, RuntimeError> {
        let value = self.eval_expr(env, &s.value)?;
        let slot = env
            .get_mut(&s.name.text)
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: s.name.text.clone(),
                span: s.name.span,
            })?;
        let kind = slot.kind();
        *slot = value
            .coerce_to(kind)
            .map_err(|found| RuntimeError::TypeMismatch {
                context: format!("assignment to `{}`", s.name.text),
                expected: kind,
                found: found.kind(),
                span: s.span,
            })?;
        Ok(Flow::Continue)
    }

    fn exec_call_stmt(&mut self, env: &mut Env, call: &HostCall) -> Result<Flow, RuntimeError> {
        let value = self.call_host(env, call)?;
        if value != Value::Void {
            return Err(RuntimeError::NonVoidCall {
                function: call.qualified_name(),
                found: value.kind(),
                span: call.span,
            });
        }
        Ok(Flow::Continue)
    }

    fn exec_return(&mut self, env: &mut Env, r: &Return) -> Result<Flow, RuntimeError> {
        let value = match &r.value {
            Some(expr) => self.eval_expr(env, expr)?,
            None => Value::Void,
        };
        Ok(Flow::Return(value))
    }

    /// Evaluate a condition; anything but a bool is a type error.
    pub fn eval_bool(
        &mut self,
        env: &mut Env,
        expr: &Expr,
        context: &str,
    ) -> Result<bool, RuntimeError> {
        match self.eval_expr(env, expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::TypeMismatch {
                context: context.to_string(),
                expected: VarKind::Bool,
                found: other.kind(),
                span: expr.span(),
            }),
        }
    }

    pub fn eval_expr(&mut self, env: &mut Env, expr: &Expr) -> Result<Value, RuntimeError> {
        ensure_sufficient_stack(|| self.eval_expr_inner(env, expr))
    }

    fn eval_expr_inner(&mut self, env: &mut Env, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Lit(lit, _) => Ok(Value::from_lit(lit)),
            Expr::Var(id) => env
                .get(&id.text)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: id.text.clone(),
                    span: id.span,
                }),
            Expr::Math { op, lhs, rhs, span } => {
                let l = self.eval_expr(env, lhs)?;
                let r = self.eval_expr(env, rhs)?;
                arith(*op, &l, &r, *span)
            }
            Expr::Test { op, lhs, rhs, span } => {
                let l = self.eval_expr(env, lhs)?;
                let r = self.eval_expr(env, rhs)?;
                compare(*op, &l, &r, *span).map(Value::Bool)
            }
            Expr::And(items, _) => {
                for item in items {
                    if !self.eval_bool(env, item, "and operand")? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(items, _) => {
                for item in items {
                    if self.eval_bool(env, item, "or operand")? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Not(inner, _) => Ok(Value::Bool(!self.eval_bool(env, inner, "not operand")?)),
            Expr::Exec(call) => self.exec_script(env, call),
            Expr::Call(call) => self.call_host(env, call),
        }
    }

    fn eval_args(&mut self, env: &mut Env, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|a| self.eval_expr(env, a)).collect()
    }

    fn call_host(&mut self, env: &mut Env, call: &HostCall) -> Result<Value, RuntimeError> {
        let args = self.eval_args(env, &call.args)?;
        self.host
            .dispatch_traced(&call.module, &call.name.text, &args, self.tracer)
            .map_err(|error| RuntimeError::Host {
                function: call.qualified_name(),
                error,
                span: call.span,
            })
    }

    fn exec_script(&mut self, env: &mut Env, call: &ExecCall) -> Result<Value, RuntimeError> {
        let module = match (&call.module, env.current_module()) {
            (Some(m), _) => m.clone(),
            (None, Some(m)) => m.to_string(),
            (None, None) => String::new(),
        };
        let args = self.eval_args(env, &call.args)?;
        self.call_script_at(env, &module, &call.name.text, args, call.span)
    }

    /// Run script `module.name` with already evaluated arguments.
    pub fn call_script(
        &mut self,
        env: &mut Env,
        module: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let span = self
            .lookup(module, name)
            .map(|s| s.span)
            .unwrap_or_default();
        self.call_script_at(env, module, name, args, span)
    }

    fn lookup(&self, module: &str, name: &str) -> Option<&'a Script> {
        self.program?.module(module)?.script(name)
    }

    fn call_script_at(
        &mut self,
        env: &mut Env,
        module: &str,
        name: &str,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let script = self
            .lookup(module, name)
            .ok_or_else(|| RuntimeError::UnknownScript {
                module: module.to_string(),
                name: name.to_string(),
                span,
            })?;
        let qualified = format!("{}.{}", module, name);
        if script.params.len() != args.len() {
            return Err(RuntimeError::ArgCount {
                script: qualified,
                expected: script.params.len(),
                found: args.len(),
                span,
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded {
                limit: MAX_CALL_DEPTH,
                span,
            });
        }

        let _frame = debug_span!("script", name = %qualified, depth = self.depth).entered();
        self.depth += 1;
        let result = env.with_frame(module, |env| {
            for (param, arg) in script.params.iter().zip(args) {
                let value = arg
                    .coerce_to(param.kind)
                    .map_err(|found| RuntimeError::TypeMismatch {
                        context: format!("argument `{}` of `{}`", param.name.text, qualified),
                        expected: param.kind,
                        found: found.kind(),
                        span,
                    })?;
                if !env.define(&param.name.text, value) {
                    return Err(RuntimeError::Redefined {
                        name: param.name.text.clone(),
                        span: param.span,
                    });
                }
            }
            self.exec_stmts(env, &script.body)
        });
        self.depth -= 1;

        let value = match result? {
            Flow::Return(value) => value,
            Flow::Continue => Value::Void,
        };
        value
            .coerce_to(script.ret)
            .map_err(|found| RuntimeError::ReturnKind {
                script: qualified,
                expected: script.ret,
                found: found.kind(),
                span,
            })
    }
}

fn arith(op: MathOp, lhs: &Value, rhs: &Value, span: Span) -> Result<Value, RuntimeError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let (a, b) = (*a, *b);
        if b == 0 && matches!(op, MathOp::Div | MathOp::Rem) {
            return Err(RuntimeError::DivisionByZero { span });
        }
        return Ok(Value::Int(match op {
            MathOp::Add => a.wrapping_add(b),
            MathOp::Sub => a.wrapping_sub(b),
            MathOp::Mul => a.wrapping_mul(b),
            MathOp::Div => a.wrapping_div(b),
            MathOp::Rem => a.wrapping_rem(b),
        }));
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(match op {
            MathOp::Add => a + b,
            MathOp::Sub => a - b,
            MathOp::Mul => a * b,
            MathOp::Div => a / b,
            MathOp::Rem => a % b,
        })),
        _ => Err(RuntimeError::InvalidOperands {
            op: op.symbol(),
            lhs: lhs.kind(),
            rhs: rhs.kind(),
            span,
        }),
    }
}

fn compare(op: TestOp, lhs: &Value, rhs: &Value, span: Span) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering;

    let invalid = || RuntimeError::InvalidOperands {
        op: op.name(),
        lhs: lhs.kind(),
        rhs: rhs.kind(),
        span,
    };
    let ordering: Option<Ordering> = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        // bools and objects only compare for equality
        (Value::Bool(_), Value::Bool(_)) | (Value::Object(_), Value::Object(_)) => {
            return match op {
                TestOp::Eq => Ok(lhs == rhs),
                TestOp::Ne => Ok(lhs != rhs),
                _ => Err(invalid()),
            };
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(invalid()),
        },
    };
    Ok(match ordering {
        // NaN is unordered: only `ne` holds
        None => op == TestOp::Ne,
        Some(o) => match op {
            TestOp::Eq => o.is_eq(),
            TestOp::Ne => o.is_ne(),
            TestOp::Lt => o.is_lt(),
            TestOp::Le => o.is_le(),
            TestOp::Gt => o.is_gt(),
            TestOp::Ge => o.is_ge(),
        },
    })
}
