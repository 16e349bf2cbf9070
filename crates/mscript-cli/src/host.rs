//! Host built-in registry and call tracing.
//!
//! `<call module="_std" name="print">` dispatches to a Rust closure
//! registered here. These are the interpreter's only way to reach
//! simulation state, so every dispatch can be recorded as one JSONL trace
//! record (inputs, output kind, SHA-256 of the output, duration).

use std::collections::HashMap;
use std::io::Write;

use crate::value::{ObjectRef, Value};

/// Errors from host function execution.
#[derive(Debug)]
pub enum HostError {
    /// `module.name` not registered
    UnknownFunction(String),
    /// Argument count or kind not accepted by the built-in
    TypeError(String),
    /// General runtime error
    RuntimeError(String),
    /// Trace write failure: the mission must halt
    TraceWriteError(String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::UnknownFunction(name) => write!(f, "unknown host function: {}", name),
            HostError::TypeError(msg) => write!(f, "type error: {}", msg),
            HostError::RuntimeError(msg) => write!(f, "runtime error: {}", msg),
            HostError::TraceWriteError(msg) => {
                write!(f, "trace write error (mission halted): {}", msg)
            }
        }
    }
}

impl std::error::Error for HostError {}

// ---------------------------------------------------------------------------
// Trace data types
// ---------------------------------------------------------------------------

/// Tagged trace value, so `Int(42)` and `Str("42")` stay distinct in JSON.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "t", content = "v")]
pub enum TraceValue {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Object class name, or `None` for a null handle.
    Object(Option<String>),
}

impl TraceValue {
    pub fn from_value(val: &Value) -> Self {
        match val {
            Value::Void => TraceValue::Void,
            Value::Bool(b) => TraceValue::Bool(*b),
            Value::Int(n) => TraceValue::Int(*n),
            Value::Float(f) => TraceValue::Float(*f),
            Value::Str(s) => TraceValue::Str(s.clone()),
            Value::Object(o) => TraceValue::Object(o.class().map(str::to_string)),
        }
    }

    fn to_hash_string(&self) -> String {
        match self {
            TraceValue::Void => "void".to_string(),
            TraceValue::Bool(b) => b.to_string(),
            TraceValue::Int(n) => n.to_string(),
            TraceValue::Float(f) => f.to_string(),
            TraceValue::Str(s) => s.clone(),
            TraceValue::Object(class) => format!("<{}>", class.as_deref().unwrap_or("null")),
        }
    }
}

/// One host call.
#[derive(Debug, serde::Serialize)]
pub struct TraceEntry {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub module: String,
    pub function: String,
    pub inputs: Vec<TraceValue>,
    pub output: TraceOutput,
    pub duration_ms: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct TraceOutput {
    pub status: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TraceValue>,
    pub value_hash: String,
    pub value_size: usize,
}

pub const TRACE_SCHEMA_VERSION: &str = "0.1";

/// Values whose text form exceeds this many bytes are hashed in audit mode.
const AUDIT_VALUE_LIMIT: usize = 1024;

/// A record in the JSONL stream: header, one entry per call, footer.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "record")]
pub enum TraceRecord {
    #[serde(rename = "header")]
    Header(TraceHeader),
    #[serde(rename = "call")]
    Call(TraceEntry),
    #[serde(rename = "footer")]
    Footer(TraceFooter),
}

#[derive(Debug, serde::Serialize)]
pub struct TraceHeader {
    pub schema_version: String,
    pub timestamp_ms: u64,
    pub mission: Option<String>,
    pub full_values: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct TraceFooter {
    pub timestamp_ms: u64,
    pub call_count: u64,
    /// "finished" or "failed".
    pub mission_status: String,
}

// ---------------------------------------------------------------------------
// TraceEmitter
// ---------------------------------------------------------------------------

/// Writes the JSONL call trace. A disabled emitter writes nothing.
pub struct TraceEmitter {
    seq: u64,
    writer: Option<Box<dyn Write + Send>>,
    full_values: bool,
}

impl std::fmt::Debug for TraceEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEmitter")
            .field("seq", &self.seq)
            .field("enabled", &self.writer.is_some())
            .finish()
    }
}

impl Default for TraceEmitter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TraceEmitter {
    /// Start a trace on `writer`, emitting the header immediately.
    /// With `full_values` false, values over 1 KiB are replaced by their hash.
    pub fn new(
        mut writer: Box<dyn Write + Send>,
        mission: Option<&str>,
        full_values: bool,
    ) -> Result<Self, HostError> {
        let header = TraceRecord::Header(TraceHeader {
            schema_version: TRACE_SCHEMA_VERSION.to_string(),
            timestamp_ms: now_ms(),
            mission: mission.map(str::to_string),
            full_values,
        });
        write_record(&mut writer, &header)?;
        Ok(Self {
            seq: 0,
            writer: Some(writer),
            full_values,
        })
    }

    pub fn disabled() -> Self {
        Self {
            seq: 0,
            writer: None,
            full_values: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    fn emit(&mut self, entry: TraceEntry) -> Result<(), HostError> {
        if let Some(w) = self.writer.as_mut() {
            write_record(w, &TraceRecord::Call(entry))?;
        }
        Ok(())
    }

    /// Write the footer and flush. `mission_status` is "finished" or "failed".
    pub fn finalize(&mut self, mission_status: &str) -> Result<(), HostError> {
        if let Some(w) = self.writer.as_mut() {
            let footer = TraceRecord::Footer(TraceFooter {
                timestamp_ms: now_ms(),
                call_count: self.seq,
                mission_status: mission_status.to_string(),
            });
            write_record(w, &footer)?;
            w.flush()
                .map_err(|e| HostError::TraceWriteError(format!("flush trace: {}", e)))?;
        }
        // nothing may follow the footer
        self.writer = None;
        Ok(())
    }

    fn record_value(&self, tv: TraceValue) -> (Option<TraceValue>, String, usize) {
        let text = tv.to_hash_string();
        let hash = sha256_hex(&text);
        let size = text.len();
        let value = if self.full_values || size <= AUDIT_VALUE_LIMIT {
            Some(tv)
        } else {
            None
        };
        (value, hash, size)
    }
}

fn write_record(w: &mut Box<dyn Write + Send>, record: &TraceRecord) -> Result<(), HostError> {
    let json = serde_json::to_string(record)
        .map_err(|e| HostError::TraceWriteError(format!("serialize record: {}", e)))?;
    writeln!(w, "{}", json).map_err(|e| HostError::TraceWriteError(format!("write record: {}", e)))
}

// ---------------------------------------------------------------------------
// HostRegistry
// ---------------------------------------------------------------------------

pub type HostFnImpl = Box<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

/// Registry mapping `module.name` to host implementations.
pub struct HostRegistry {
    functions: HashMap<String, HostFnImpl>,
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("HostRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HostRegistry {
    /// Registry with the standard built-ins.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("_std", "print", host_print);
        reg.register("_string", "concat", host_concat);
        reg.register("_object", "new", host_object_new);
        reg.register("_object", "class", host_object_class);
        reg.register("_object", "isNull", host_object_is_null);
        reg
    }

    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, module: &str, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.functions
            .insert(format!("{}.{}", module, name), Box::new(f));
    }

    pub fn contains(&self, module: &str, name: &str) -> bool {
        self.functions.contains_key(&format!("{}.{}", module, name))
    }

    /// Call `module.name`, recording the call on `tracer`.
    pub fn dispatch_traced(
        &self,
        module: &str,
        name: &str,
        args: &[Value],
        tracer: &mut TraceEmitter,
    ) -> Result<Value, HostError> {
        let qualified = format!("{}.{}", module, name);
        let f = self
            .functions
            .get(&qualified)
            .ok_or_else(|| HostError::UnknownFunction(qualified.clone()))?;

        let start = std::time::Instant::now();
        let result = f(args);
        let duration = start.elapsed();

        if !tracer.is_enabled() {
            return result;
        }

        let (status, kind, recorded) = match &result {
            Ok(val) => (
                "ok",
                val.kind().name().to_string(),
                TraceValue::from_value(val),
            ),
            Err(e) => ("error", "void".to_string(), TraceValue::Str(e.to_string())),
        };
        let (value, value_hash, value_size) = tracer.record_value(recorded);

        let inputs = args
            .iter()
            .map(|a| {
                let tv = TraceValue::from_value(a);
                let text = tv.to_hash_string();
                if tracer.full_values || text.len() <= AUDIT_VALUE_LIMIT {
                    tv
                } else {
                    TraceValue::Str(sha256_hex(&text))
                }
            })
            .collect();

        let seq = tracer.seq;
        tracer.seq += 1;
        tracer.emit(TraceEntry {
            seq,
            timestamp_ms: now_ms(),
            module: module.to_string(),
            function: name.to_string(),
            inputs,
            output: TraceOutput {
                status: status.to_string(),
                kind,
                value,
                value_hash,
                value_size,
            },
            duration_ms: duration.as_millis() as u64,
        })?;

        result
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 hex digest, prefixed with "sha256:".
fn sha256_hex(data: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn now_ms() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

fn host_print(args: &[Value]) -> Result<Value, HostError> {
    let line: Vec<String> = args.iter().map(Value::to_text).collect();
    println!("{}", line.join(" "));
    Ok(Value::Void)
}

fn host_concat(args: &[Value]) -> Result<Value, HostError> {
    Ok(Value::Str(args.iter().map(Value::to_text).collect()))
}

fn host_object_new(args: &[Value]) -> Result<Value, HostError> {
    match args {
        [Value::Str(class)] => Ok(Value::Object(ObjectRef::new(class.clone()))),
        _ => Err(HostError::TypeError(
            "_object.new: expected one string class name".into(),
        )),
    }
}

fn host_object_class(args: &[Value]) -> Result<Value, HostError> {
    match args {
        [Value::Object(o)] => o
            .class()
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| HostError::RuntimeError("_object.class: null object".into())),
        _ => Err(HostError::TypeError(
            "_object.class: expected one object".into(),
        )),
    }
}

fn host_object_is_null(args: &[Value]) -> Result<Value, HostError> {
    match args {
        [Value::Object(o)] => Ok(Value::Bool(o.is_null())),
        _ => Err(HostError::TypeError(
            "_object.isNull: expected one object".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer that appends into a shared buffer so tests can read it back.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[test]
    fn unknown_function_is_reported() {
        let reg = HostRegistry::new();
        let err = reg
            .dispatch_traced("_std", "nope", &[], &mut TraceEmitter::disabled())
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownFunction(ref n) if n == "_std.nope"));
    }

    #[test]
    fn builtins_are_registered() {
        let reg = HostRegistry::with_builtins();
        assert!(reg.contains("_std", "print"));
        assert!(reg.contains("_object", "isNull"));
        assert!(!reg.contains("_std", "explode"));
    }

    #[test]
    fn concat_and_objects() {
        let reg = HostRegistry::with_builtins();
        let mut t = TraceEmitter::disabled();
        let s = reg
            .dispatch_traced(
                "_string",
                "concat",
                &[Value::Str("wing ".into()), Value::Int(3)],
                &mut t,
            )
            .unwrap();
        assert_eq!(s, Value::Str("wing 3".into()));

        let obj = reg
            .dispatch_traced("_object", "new", &[Value::Str("fighter".into())], &mut t)
            .unwrap();
        let class = reg
            .dispatch_traced("_object", "class", &[obj.clone()], &mut t)
            .unwrap();
        assert_eq!(class, Value::Str("fighter".into()));
        let null = reg
            .dispatch_traced("_object", "isNull", &[obj], &mut t)
            .unwrap();
        assert_eq!(null, Value::Bool(false));
    }

    #[test]
    fn trace_records_header_calls_and_footer() {
        let buf = SharedBuf::default();
        let mut reg = HostRegistry::new();
        reg.register("_test", "twice", |args: &[Value]| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err(HostError::TypeError("twice: expected int".into())),
        });
        let mut tracer = TraceEmitter::new(Box::new(buf.clone()), Some("demo"), false).unwrap();

        reg.dispatch_traced("_test", "twice", &[Value::Int(21)], &mut tracer)
            .unwrap();
        reg.dispatch_traced("_test", "twice", &[], &mut tracer)
            .unwrap_err();
        tracer.finalize("finished").unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["record"], "header");
        assert_eq!(lines[0]["mission"], "demo");
        assert_eq!(lines[1]["record"], "call");
        assert_eq!(lines[1]["function"], "twice");
        assert_eq!(lines[1]["output"]["kind"], "int");
        assert_eq!(lines[1]["output"]["value"]["v"], 42);
        assert_eq!(lines[2]["output"]["status"], "error");
        assert_eq!(lines[3]["record"], "footer");
        assert_eq!(lines[3]["call_count"], 2);
    }

    #[test]
    fn audit_mode_hashes_large_values() {
        let buf = SharedBuf::default();
        let mut reg = HostRegistry::new();
        reg.register("_test", "big", |_: &[Value]| Ok(Value::Str("x".repeat(2048))));
        let mut tracer = TraceEmitter::new(Box::new(buf.clone()), None, false).unwrap();
        reg.dispatch_traced("_test", "big", &[], &mut tracer).unwrap();

        let lines = buf.lines();
        let output = &lines[1]["output"];
        assert!(output.get("value").is_none());
        assert!(output["value_hash"].as_str().unwrap().starts_with("sha256:"));
        assert_eq!(output["value_size"], 2048);
    }
}
