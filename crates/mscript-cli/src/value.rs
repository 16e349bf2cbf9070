//! Runtime values (variable instances) of mission scripts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mscript_ast::ast::{Lit, VarKind};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ObjectData {
    id: u64,
    class: String,
}

/// Opaque handle to a simulation object owned by the host. The default
/// handle is null.
#[derive(Debug, Clone, Default)]
pub struct ObjectRef(Option<Arc<ObjectData>>);

impl ObjectRef {
    pub fn new(class: impl Into<String>) -> Self {
        Self(Some(Arc::new(ObjectData {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class: class.into(),
        })))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn class(&self) -> Option<&str> {
        self.0.as_ref().map(|o| o.class.as_str())
    }

    /// Number of live handles to the same object (0 for null).
    pub fn handles(&self) -> usize {
        self.0.as_ref().map_or(0, Arc::strong_count)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// A variable instance: a value tagged with its kind. `Void` carries no
/// payload. Each value has exactly one owner (a binding, a frame or a
/// temporary) and is released when that owner goes away.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(ObjectRef),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Object(o) => match &o.0 {
                Some(obj) => write!(f, "<{}#{}>", obj.class, obj.id),
                None => write!(f, "<null>"),
            },
        }
    }
}

impl Value {
    pub fn kind(&self) -> VarKind {
        match self {
            Value::Void => VarKind::Void,
            Value::Bool(_) => VarKind::Bool,
            Value::Int(_) => VarKind::Int,
            Value::Float(_) => VarKind::Float,
            Value::Str(_) => VarKind::String,
            Value::Object(_) => VarKind::Object,
        }
    }

    /// Value of a variable declared without an initializer.
    pub fn default_for(kind: VarKind) -> Value {
        match kind {
            VarKind::Void => Value::Void,
            VarKind::Bool => Value::Bool(false),
            VarKind::Int => Value::Int(0),
            VarKind::Float => Value::Float(0.0),
            VarKind::String => Value::Str(String::new()),
            VarKind::Object => Value::Object(ObjectRef::null()),
        }
    }

    pub fn from_lit(lit: &Lit) -> Value {
        match lit {
            Lit::Int(v) => Value::Int(*v),
            Lit::Float(v) => Value::Float(*v),
            Lit::Bool(v) => Value::Bool(*v),
            Lit::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Convert for storage into a slot of `kind`: exact kinds pass through,
    /// ints widen to floats, anything else is refused.
    pub fn coerce_to(self, kind: VarKind) -> Result<Value, Value> {
        if !kind.accepts(self.kind()) {
            return Err(self);
        }
        Ok(match (kind, self) {
            (VarKind::Float, Value::Int(i)) => Value::Float(i as f64),
            (_, v) => v,
        })
    }

    /// Text form used by `print` and string concatenation (no quotes).
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}
