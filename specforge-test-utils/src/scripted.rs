//! In-process stand-ins for the schema checker and the query tool.
//!
//! `ScriptedToolRunner` answers `vet`/`export` calls with a toy checker that
//! understands one `key: value` field per line (dotted keys nest, values are
//! JSON literals) and reports conflicting values the way the real checker
//! does. Query calls are answered from a small table of known queries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use specforge_core::ToolError;
use specforge_validate::{ToolInvocation, ToolOutput, ToolRunner, UNRESOLVED_TOKEN_QUERY};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[^}]*\}").expect("Invalid token regex"));

type QueryFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

// ============================================================================
// TOY CHECKER
// ============================================================================

/// One `key: value` line of a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ToyField {
    pub key: String,
    pub value: Value,
    pub file: String,
    pub line: u32,
}

/// Parse a fragment written in the toy syntax. Returns diagnostics text on
/// failure.
pub fn parse_toy_fragment(file: &str, content: &str) -> Result<Vec<ToyField>, String> {
    let mut fields = Vec::new();
    let mut errors = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with("package ") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            errors.push(format!("expected 'key: value':\n    ./{file}:{line_no}:1"));
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            errors.push(format!("missing field name:\n    ./{file}:{line_no}:1"));
            continue;
        }
        match serde_json::from_str::<Value>(value.trim()) {
            Ok(value) => fields.push(ToyField {
                key: key.to_string(),
                value,
                file: file.to_string(),
                line: line_no,
            }),
            Err(_) => errors.push(format!(
                "{key}: reference \"{}\" not found:\n    ./{file}:{line_no}:{}",
                value.trim(),
                key.len() + 3
            )),
        }
    }
    if errors.is_empty() {
        Ok(fields)
    } else {
        Err(errors.join("\n"))
    }
}

/// Unify fields into one document. Returns diagnostics text on conflicts.
pub fn unify_toy_fields(fields: &[ToyField]) -> Result<Value, String> {
    let mut root = Map::new();
    let mut origins: HashMap<&str, &ToyField> = HashMap::new();
    let mut errors = Vec::new();

    for field in fields {
        if let Some(first) = origins.get(field.key.as_str()) {
            if first.value != field.value {
                errors.push(format!(
                    "{}: conflicting values {} and {}:\n    ./{}:{}:1\n    ./{}:{}:1",
                    field.key, field.value, first.value, first.file, first.line, field.file,
                    field.line
                ));
            }
            continue;
        }
        origins.insert(field.key.as_str(), field);

        if let Err(prefix) = insert_path(&mut root, &field.key, field.value.clone()) {
            errors.push(format!(
                "{prefix}: conflicting struct and value:\n    ./{}:{}:1",
                field.file, field.line
            ));
        }
    }

    if errors.is_empty() {
        Ok(Value::Object(root))
    } else {
        Err(errors.join("\n"))
    }
}

fn insert_path(root: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), String> {
    let segments: Vec<&str> = key.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| key.to_string())?;

    let mut node = root;
    let mut walked = Vec::new();
    for segment in parents {
        walked.push(*segment);
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match entry {
            Value::Object(map) => map,
            _ => return Err(walked.join(".")),
        };
    }
    match node.get_mut(*last) {
        Some(Value::Object(existing)) => match value {
            Value::Object(incoming) => {
                for (k, v) in incoming {
                    existing.entry(k).or_insert(v);
                }
                Ok(())
            }
            _ => Err(key.to_string()),
        },
        Some(_) => Err(key.to_string()),
        None => {
            node.insert(last.to_string(), value);
            Ok(())
        }
    }
}

/// Number of string leaves containing a `${...}` token.
pub fn count_unresolved_tokens(value: &Value) -> usize {
    match value {
        Value::String(s) => usize::from(TOKEN.is_match(s)),
        Value::Array(items) => items.iter().map(count_unresolved_tokens).sum(),
        Value::Object(map) => map.values().map(count_unresolved_tokens).sum(),
        _ => 0,
    }
}

// ============================================================================
// SCRIPTED RUNNER
// ============================================================================

/// Fake [`ToolRunner`] that never spawns a process.
pub struct ScriptedToolRunner {
    checker: String,
    query_tool: String,
    queries: HashMap<String, QueryFn>,
    delays: HashMap<String, Duration>,
    missing: HashSet<String>,
    calls: Mutex<Vec<ToolInvocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedToolRunner {
    fn default() -> Self {
        Self::new("cue", "jq")
    }
}

impl std::fmt::Debug for ScriptedToolRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedToolRunner")
            .field("checker", &self.checker)
            .field("query_tool", &self.query_tool)
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}

impl ScriptedToolRunner {
    pub fn new(checker: impl Into<String>, query_tool: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
            query_tool: query_tool.into(),
            queries: HashMap::new(),
            delays: HashMap::new(),
            missing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer `query` with `f` applied to the document.
    pub fn with_query<F>(mut self, query: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.queries.insert(query.into(), Arc::new(f));
        self
    }

    /// Make every call to `program` take `delay`.
    pub fn with_delay(mut self, program: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(program.into(), delay);
        self
    }

    /// Pretend `program` is not installed.
    pub fn without_program(mut self, program: impl Into<String>) -> Self {
        self.missing.insert(program.into());
        self
    }

    /// Every invocation seen so far, in arrival order.
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run_checker(&self, invocation: &ToolInvocation) -> ToolOutput {
        let mode = invocation.args.first().map(String::as_str).unwrap_or("");
        let cwd = invocation.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
        let files: Vec<&String> = invocation
            .args
            .iter()
            .skip(1)
            .filter(|a| a.ends_with(".cue"))
            .collect();

        let mut fields = Vec::new();
        let mut errors = Vec::new();
        for file in files {
            match tokio::fs::read_to_string(cwd.join(file)).await {
                Ok(content) => match parse_toy_fragment(file, &content) {
                    Ok(parsed) => fields.extend(parsed),
                    Err(diag) => errors.push(diag),
                },
                Err(e) => errors.push(format!("open {file}: {e}")),
            }
        }
        if !errors.is_empty() {
            return failure(1, errors.join("\n"));
        }

        match (unify_toy_fields(&fields), mode) {
            (Err(diag), _) => failure(1, diag),
            (Ok(_), "vet") => success(String::new()),
            (Ok(doc), "export") => {
                success(serde_json::to_string_pretty(&doc).unwrap_or_default())
            }
            (Ok(_), other) => failure(2, format!("unknown command \"{other}\"")),
        }
    }

    async fn run_query(&self, invocation: &ToolInvocation) -> ToolOutput {
        let n = invocation.args.len();
        if n < 2 {
            return failure(2, "Usage: jq [OPTIONS] FILTER [FILES...]".to_string());
        }
        let query = invocation.args[n - 2].as_str();
        let path = Path::new(&invocation.args[n - 1]);

        let document = match tokio::fs::read_to_string(path).await {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(doc) => doc,
                Err(e) => return failure(2, format!("jq: error: {e}")),
            },
            Err(e) => return failure(2, format!("jq: error: Could not open {}: {e}", path.display())),
        };

        match self.evaluate(query, &document) {
            Ok(value) => success(format!("{value}\n")),
            Err(message) => failure(3, format!("jq: error: {message}")),
        }
    }

    fn evaluate(&self, query: &str, document: &Value) -> Result<Value, String> {
        if let Some(f) = self.queries.get(query) {
            return f(document);
        }
        if query == UNRESOLVED_TOKEN_QUERY {
            return Ok(Value::from(count_unresolved_tokens(document)));
        }
        if query == "." {
            return Ok(document.clone());
        }
        if let Some(path) = query.strip_prefix('.') {
            let mut node = document;
            for segment in path.split('.') {
                if segment.is_empty() || !segment.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(format!("syntax error in {query}"));
                }
                match node.get(segment) {
                    Some(next) => node = next,
                    None => return Ok(Value::Null),
                }
            }
            return Ok(node.clone());
        }
        Err(format!("unsupported query {query}"))
    }
}

fn success(stdout: String) -> ToolOutput {
    ToolOutput {
        stdout,
        stderr: String::new(),
        exit_code: Some(0),
        duration: Duration::ZERO,
    }
}

fn failure(code: i32, stderr: String) -> ToolOutput {
    ToolOutput {
        stdout: String::new(),
        stderr: format!("{stderr}\n"),
        exit_code: Some(code),
        duration: Duration::ZERO,
    }
}

#[async_trait]
impl ToolRunner for ScriptedToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        if self.missing.contains(&invocation.program) {
            return Err(ToolError::SpawnFailed {
                program: invocation.program.clone(),
                reason: "No such file or directory (os error 2)".to_string(),
            });
        }

        let started = Instant::now();
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delays.get(&invocation.program).copied();
        let timed_out = match delay {
            Some(delay) if delay > invocation.timeout => {
                tokio::time::sleep(invocation.timeout).await;
                true
            }
            Some(delay) => {
                tokio::time::sleep(delay).await;
                false
            }
            None => false,
        };

        let result = if timed_out {
            Err(ToolError::TimedOut {
                program: invocation.program.clone(),
                timeout_ms: invocation.timeout.as_millis() as u64,
            })
        } else if invocation.program == self.checker {
            Ok(self.run_checker(invocation).await)
        } else if invocation.program == self.query_tool {
            Ok(self.run_query(invocation).await)
        } else {
            Err(ToolError::SpawnFailed {
                program: invocation.program.clone(),
                reason: "not scripted".to_string(),
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|mut output| {
            output.duration = started.elapsed();
            output
        })
    }
}
