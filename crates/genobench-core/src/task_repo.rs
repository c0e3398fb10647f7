//! Task repository: loads and validates task documents.
//!
//! Task documents are JSON:
//!
//! ```json
//! {
//!   "category": "variant_interpretation",
//!   "question": "Classify BRCA1 c.68_69delAG ...",
//!   "output_format": { "pathogenicity": "...", "evidence_codes": ["..."] },
//!   "mcp_servers": [{ "name": "clinvar" }, "pubmed"],
//!   "evaluators": [
//!     { "func": "json", "op": "clinical_genomics.validate_variant_classification",
//!       "op_args": { "expected_tier": "Pathogenic", "expected_codes": ["PVS1"] } }
//!   ]
//! }
//! ```
//!
//! Every field is optional at the serde level so that a missing field can be
//! reported by name rather than as a generic parse failure.

use serde::Deserialize;
use tracing::warn;

use crate::domain::config::TaskRef;
use crate::domain::error::TaskLoadError;
use crate::domain::task::{EvaluatorSpec, OutputFormat, ResponseExtractor, Task, TaskCategory};
use crate::obs;

#[derive(Debug, Deserialize)]
struct TaskDocument {
    category: Option<String>,
    question: Option<String>,
    #[serde(default)]
    output_format: Option<OutputFormat>,
    #[serde(default)]
    mcp_servers: Vec<ToolEntry>,
    evaluators: Option<Vec<EvaluatorEntry>>,
    #[serde(default)]
    pass_threshold: Option<f64>,
}

/// A tool manifest entry: either a bare name or `{ "name": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolEntry {
    Name(String),
    Named { name: String },
}

impl ToolEntry {
    fn into_name(self) -> String {
        match self {
            ToolEntry::Name(name) | ToolEntry::Named { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EvaluatorEntry {
    #[serde(default)]
    func: Option<String>,
    op: Option<String>,
    #[serde(default)]
    op_args: Option<serde_json::Value>,
    #[serde(default)]
    authoritative: bool,
}

/// Loads task documents for one resolved domain.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskRepository;

impl TaskRepository {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate one task.
    pub fn load(&self, task_ref: &TaskRef) -> Result<Task, TaskLoadError> {
        let text = std::fs::read_to_string(&task_ref.location).map_err(|source| {
            TaskLoadError::Io {
                path: task_ref.path.clone(),
                source,
            }
        })?;
        parse_task(task_ref, &text)
    }

    /// Load every task, keeping failures apart so the rest of the domain can run.
    pub fn load_all(&self, refs: &[TaskRef]) -> (Vec<Task>, Vec<(TaskRef, TaskLoadError)>) {
        let mut tasks = Vec::with_capacity(refs.len());
        let mut failures = Vec::new();
        for task_ref in refs {
            match self.load(task_ref) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    obs::emit_task_load_failed(&task_ref.id, &e);
                    failures.push((task_ref.clone(), e));
                }
            }
        }
        (tasks, failures)
    }
}

/// Parse and validate a task document's text.
pub fn parse_task(task_ref: &TaskRef, text: &str) -> Result<Task, TaskLoadError> {
    let path = &task_ref.path;
    let doc: TaskDocument = serde_json::from_str(text).map_err(|e| TaskLoadError::Parse {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let missing = |field: &str| TaskLoadError::MissingField {
        path: path.clone(),
        field: field.to_string(),
    };
    let malformed = |field: &str, reason: String| TaskLoadError::Malformed {
        path: path.clone(),
        field: field.to_string(),
        reason,
    };

    let category: TaskCategory = doc
        .category
        .ok_or_else(|| missing("category"))?
        .parse()
        .map_err(|reason| malformed("category", reason))?;

    let question = doc.question.ok_or_else(|| missing("question"))?;
    if question.trim().is_empty() {
        return Err(malformed("question", "must not be empty".to_string()));
    }

    let entries = doc.evaluators.ok_or_else(|| missing("evaluators"))?;
    if entries.is_empty() {
        return Err(malformed(
            "evaluators",
            "at least one evaluator is required".to_string(),
        ));
    }

    let mut evaluators = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let name = entry
            .op
            .filter(|op| !op.trim().is_empty())
            .ok_or_else(|| missing(&format!("evaluators[{}].op", i)))?;
        let extractor: ResponseExtractor = entry
            .func
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|reason| malformed(&format!("evaluators[{}].func", i), reason))?;
        let args = match entry.op_args {
            None | Some(serde_json::Value::Null) => serde_json::json!({}),
            Some(args @ serde_json::Value::Object(_)) => args,
            Some(_) => {
                return Err(malformed(
                    &format!("evaluators[{}].op_args", i),
                    "must be an object".to_string(),
                ))
            }
        };
        evaluators.push(EvaluatorSpec {
            name,
            extractor,
            args,
            authoritative: entry.authoritative,
        });
    }

    if let Some(threshold) = doc.pass_threshold {
        if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
            return Err(malformed(
                "pass_threshold",
                format!("{} is not within [0, 1]", threshold),
            ));
        }
    }

    let tool_manifest: Vec<String> = doc.mcp_servers.into_iter().map(ToolEntry::into_name).collect();
    if tool_manifest.is_empty() {
        warn!(task_id = %task_ref.id, "task declares no tools");
    }

    Ok(Task {
        id: task_ref.id.clone(),
        path: path.clone(),
        category,
        question,
        output_format: doc.output_format,
        tool_manifest,
        evaluators,
        pass_threshold: doc.pass_threshold,
    })
}
