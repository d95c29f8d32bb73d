//! Result envelopes written by an executor, one per task attempted in a run.
//!
//! Envelopes are loosely typed: any field may be absent or carry an unexpected
//! type. Accessors return `None` (or skip entries) instead of failing, so that a
//! single odd record only drops the affected value from the summary.

use serde_json::{Map, Value};

/// File operation recorded in an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Create,
    Update,
    Delete,
    Rename,
}

impl FileOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(FileOp::Create),
            "update" => Some(FileOp::Update),
            "delete" => Some(FileOp::Delete),
            "rename" => Some(FileOp::Rename),
            _ => None,
        }
    }
}

/// A single entry of an envelope's `files` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub op: FileOp,
    pub path: String,
    pub prev_path: Option<String>,
}

/// Read-only view over one parsed envelope object.
#[derive(Debug, Clone)]
pub struct RunEnvelope {
    fields: Map<String, Value>,
}

impl RunEnvelope {
    /// Wrap a parsed JSON value; only objects are envelopes.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<&Value> {
        self.non_null("task_id")
    }

    pub fn status(&self) -> Option<&Value> {
        self.non_null("status")
    }

    /// Lower-cased status string used for bucketing.
    pub fn status_key(&self) -> String {
        match self.fields.get("status") {
            Some(Value::String(s)) => s.to_lowercase(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string().to_lowercase(),
        }
    }

    /// Non-empty `run_id`, numbers rendered as strings.
    pub fn run_id(&self) -> Option<String> {
        match self.fields.get("run_id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The `tests` block, when present and truthy.
    pub fn tests(&self) -> Option<&Value> {
        self.fields.get("tests").filter(|v| is_truthy(v))
    }

    /// `tests.passed`, only when it is a real boolean.
    pub fn tests_passed(&self) -> Option<bool> {
        self.tests()?.get("passed")?.as_bool()
    }

    /// The `costs` block, when present and truthy.
    pub fn costs(&self) -> Option<&Value> {
        self.fields.get("costs").filter(|v| is_truthy(v))
    }

    /// Model name of the `costs` block, when a non-empty string.
    pub fn cost_model(&self) -> Option<&str> {
        self.costs()?
            .get("model")?
            .as_str()
            .filter(|m| !m.is_empty())
    }

    /// Numeric cost field; absent or non-numeric values read as zero.
    pub fn cost_number(&self, field: &str) -> f64 {
        self.costs()
            .and_then(|c| c.get(field))
            .map(number_or_zero)
            .unwrap_or(0.0)
    }

    /// Recognised `files` entries. Unknown ops and entries without a path are skipped.
    pub fn files(&self) -> Vec<FileChange> {
        let Some(Value::Array(entries)) = self.fields.get("files") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let op = FileOp::parse(entry.get("op")?.as_str()?)?;
                let path = entry.get("path")?.as_str()?.to_string();
                let prev_path = entry
                    .get("prev_path")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(FileChange {
                    op,
                    path,
                    prev_path,
                })
            })
            .collect()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.nested_str("metadata", "created_at")
    }

    pub fn plan_ref(&self) -> Option<&str> {
        self.nested_str("metadata", "plan_ref")
    }

    pub fn commit_branch(&self) -> Option<&str> {
        self.nested_str("commit", "branch")
    }

    pub fn commit_message(&self) -> Option<&Value> {
        self.fields
            .get("commit")?
            .get("message")
            .filter(|v| !v.is_null())
    }

    fn non_null(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    fn nested_str(&self, outer: &str, inner: &str) -> Option<&str> {
        self.fields
            .get(outer)?
            .get(inner)?
            .as_str()
            .filter(|s| !s.is_empty())
    }
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numbers and numeric strings; everything else is zero.
fn number_or_zero(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite()).unwrap_or(0.0)
}
