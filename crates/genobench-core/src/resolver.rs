//! Domain configuration resolver.
//!
//! Reads `<domains-root>/<domain>/config.yaml`, indexes the `llm` and `agent`
//! declarations by name and binds the single `benchmark` declaration to a
//! runnable [`DomainConfig`]. Resolution touches the filesystem only to read the
//! config and to check that task paths exist; it never loads task documents.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::config::{
    AgentDeclaration, BenchmarkDeclaration, Declaration, DomainConfig, LlmDeclaration, ScoringPolicy,
    TaskRef, DEFAULT_PASS_THRESHOLD,
};
use crate::domain::error::ConfigError;

/// File name of a domain's configuration document.
pub const CONFIG_FILE: &str = "config.yaml";

/// Resolve `domain` under `domains_root`.
pub fn resolve_domain(domains_root: &Path, domain: &str) -> Result<DomainConfig, ConfigError> {
    let domain_dir = domains_root.join(domain);
    let path = domain_dir.join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let declarations = parse_declarations(&path, &text)?;
    bind(domain, &domain_dir, &path, declarations)
}

/// Parse the YAML declaration stream. Empty documents are skipped.
pub fn parse_declarations(path: &Path, text: &str) -> Result<Vec<Declaration>, ConfigError> {
    let parse_err = |e: serde_yaml::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut declarations = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).map_err(parse_err)?;
        if value.is_null() {
            continue;
        }
        declarations.push(serde_yaml::from_value(value).map_err(parse_err)?);
    }
    Ok(declarations)
}

/// Bind parsed declarations: LLMs by name, then agents (each naming one LLM),
/// then the benchmark (naming one agent and the ordered task paths).
pub fn bind(
    domain: &str,
    domain_dir: &Path,
    path: &Path,
    declarations: Vec<Declaration>,
) -> Result<DomainConfig, ConfigError> {
    let mut llms: BTreeMap<String, LlmDeclaration> = BTreeMap::new();
    let mut agents: BTreeMap<String, AgentDeclaration> = BTreeMap::new();
    let mut benchmarks: Vec<BenchmarkDeclaration> = Vec::new();

    for declaration in declarations {
        match declaration {
            Declaration::Llm(llm) => {
                require_name(path, "llm.name", &llm.name)?;
                if llms.contains_key(&llm.name) {
                    return Err(duplicate(path, "llm", &llm.name));
                }
                llms.insert(llm.name.clone(), llm);
            }
            Declaration::Agent(agent) => {
                require_name(path, "agent.name", &agent.name)?;
                if agents.contains_key(&agent.name) {
                    return Err(duplicate(path, "agent", &agent.name));
                }
                agents.insert(agent.name.clone(), agent);
            }
            Declaration::Benchmark(benchmark) => benchmarks.push(benchmark),
        }
    }

    // Dangling LLM references are errors even on agents the benchmark never uses.
    for agent in agents.values() {
        if agent.max_iterations == 0 {
            return Err(ConfigError::InvalidField {
                path: path.to_path_buf(),
                field: format!("agent '{}'.max_iterations", agent.name),
                reason: "must be at least 1".to_string(),
            });
        }
        if !llms.contains_key(&agent.llm) {
            return Err(ConfigError::UnknownLlm {
                path: path.to_path_buf(),
                agent: agent.name.clone(),
                llm: agent.llm.clone(),
            });
        }
    }

    let benchmark = match benchmarks.len() {
        0 => {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "benchmark declaration".to_string(),
            })
        }
        1 => benchmarks.remove(0),
        _ => return Err(duplicate(path, "benchmark", &benchmarks[1].description)),
    };

    let agent = agents
        .remove(&benchmark.agent)
        .ok_or_else(|| ConfigError::UnknownAgent {
            path: path.to_path_buf(),
            agent: benchmark.agent.clone(),
        })?;
    let llm = llms
        .remove(&agent.llm)
        .ok_or_else(|| ConfigError::UnknownLlm {
            path: path.to_path_buf(),
            agent: agent.name.clone(),
            llm: agent.llm.clone(),
        })?;

    let scoring = scoring_policy(path, &benchmark)?;
    let tasks = resolve_tasks(path, domain_dir, &benchmark.tasks)?;

    debug!(
        domain = %domain,
        agent = %agent.name,
        llm = %llm.name,
        tasks = tasks.len(),
        "domain configuration resolved"
    );

    Ok(DomainConfig {
        domain: domain.to_string(),
        domain_dir: domain_dir.to_path_buf(),
        description: benchmark.description,
        llm,
        agent,
        tasks,
        scoring,
    })
}

fn scoring_policy(path: &Path, benchmark: &BenchmarkDeclaration) -> Result<ScoringPolicy, ConfigError> {
    let pass_threshold = benchmark.pass_threshold.unwrap_or(DEFAULT_PASS_THRESHOLD);
    if !is_fraction(pass_threshold) {
        return Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "benchmark.pass_threshold".to_string(),
            reason: format!("{} is not within [0, 1]", pass_threshold),
        });
    }

    let band = benchmark.acceptable_pass_at_1.unwrap_or_default();
    if !is_fraction(band.low) || !is_fraction(band.high) || band.low > band.high {
        return Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "benchmark.acceptable_pass_at_1".to_string(),
            reason: format!(
                "need 0 <= low <= high <= 1, got [{}, {}]",
                band.low, band.high
            ),
        });
    }

    Ok(ScoringPolicy {
        pass_threshold,
        aggregation: benchmark.score_aggregation,
        band,
    })
}

fn resolve_tasks(
    path: &Path,
    domain_dir: &Path,
    task_paths: &[String],
) -> Result<Vec<TaskRef>, ConfigError> {
    if task_paths.is_empty() {
        return Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "benchmark.tasks".to_string(),
            reason: "at least one task path is required".to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    let mut tasks = Vec::with_capacity(task_paths.len());
    for raw in task_paths {
        let location = domain_dir.join(raw);
        if !location.is_file() {
            return Err(ConfigError::UnresolvedTask {
                path: path.to_path_buf(),
                task: raw.clone(),
            });
        }
        let id = task_id(raw);
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateTask {
                path: path.to_path_buf(),
                id,
            });
        }
        tasks.push(TaskRef {
            id,
            path: PathBuf::from(raw),
            location,
        });
    }
    Ok(tasks)
}

/// Stable task identifier: the domain-relative path with `.` segments
/// dropped, `/` separators and no extension.
pub fn task_id(raw: &str) -> String {
    let without_ext = Path::new(raw).with_extension("");
    without_ext
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_fraction(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn require_name(path: &Path, field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::MissingField {
            path: path.to_path_buf(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn duplicate(path: &Path, kind: &str, name: &str) -> ConfigError {
    ConfigError::DuplicateDeclaration {
        path: path.to_path_buf(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_normalization() {
        assert_eq!(task_id("tasks/variant/t1.json"), "tasks/variant/t1");
        assert_eq!(task_id("./tasks/variant/t1.json"), "tasks/variant/t1");
        assert_eq!(task_id("t1"), "t1");
    }

    #[test]
    fn test_parse_skips_empty_documents() {
        let yaml = "---\nkind: llm\nspec:\n  name: l\n  model: gpt-4o\n---\n";
        let decls = parse_declarations(Path::new("config.yaml"), yaml).expect("parse");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].kind(), "llm");
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let yaml = "kind: evaluator\nspec:\n  name: x\n";
        let err = parse_declarations(Path::new("config.yaml"), yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_bind_rejects_dangling_llm_before_benchmark() {
        let yaml = "kind: agent\nspec:\n  name: a\n  llm: missing\n";
        let decls = parse_declarations(Path::new("config.yaml"), yaml).expect("parse");
        let err = bind("d", Path::new("."), Path::new("config.yaml"), decls).unwrap_err();
        match err {
            ConfigError::UnknownLlm { agent, llm, .. } => {
                assert_eq!(agent, "a");
                assert_eq!(llm, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bind_requires_benchmark() {
        let yaml = "kind: llm\nspec:\n  name: l\n  model: m\n";
        let decls = parse_declarations(Path::new("config.yaml"), yaml).expect("parse");
        let err = bind("d", Path::new("."), Path::new("config.yaml"), decls).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    const HEADER: &str = "kind: llm\nspec:\n  name: l\n  model: m\n---\nkind: agent\nspec:\n  name: a\n  llm: l\n---\n";

    fn domain_with(benchmark: &str, files: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("d");
        for file in files {
            let path = dir.join(file);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, "{}").expect("write task");
        }
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(CONFIG_FILE), format!("{HEADER}{benchmark}")).expect("write config");
        root
    }

    #[test]
    fn test_resolve_rejects_unknown_agent() {
        let root = domain_with(
            "kind: benchmark\nspec:\n  agent: ghost\n  tasks: [tasks/a.json]\n",
            &["tasks/a.json"],
        );
        let err = resolve_domain(root.path(), "d").unwrap_err();
        match err {
            ConfigError::UnknownAgent { agent, .. } => assert_eq!(agent, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_rejects_missing_task_file() {
        let root = domain_with(
            "kind: benchmark\nspec:\n  agent: a\n  tasks: [tasks/a.json, tasks/missing.json]\n",
            &["tasks/a.json"],
        );
        let err = resolve_domain(root.path(), "d").unwrap_err();
        match err {
            ConfigError::UnresolvedTask { task, .. } => assert_eq!(task, "tasks/missing.json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_rejects_duplicate_task_ids() {
        let root = domain_with(
            "kind: benchmark\nspec:\n  agent: a\n  tasks: [tasks/a.json, ./tasks/a.json]\n",
            &["tasks/a.json"],
        );
        let err = resolve_domain(root.path(), "d").unwrap_err();
        match err {
            ConfigError::DuplicateTask { id, .. } => assert_eq!(id, "tasks/a"),
            other => panic!("unexpected error: {other}"),
        }

        let root = domain_with(
            "kind: benchmark\nspec:\n  agent: a\n  tasks: [tasks/a.json, tasks/a.yaml]\n",
            &["tasks/a.json", "tasks/a.yaml"],
        );
        let err = resolve_domain(root.path(), "d").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTask { .. }));
    }

    #[test]
    fn test_resolve_binds_agent_and_tasks() {
        let root = domain_with(
            "kind: benchmark\nspec:\n  agent: a\n  tasks: [tasks/x/a.json]\n",
            &["tasks/x/a.json"],
        );
        let config = resolve_domain(root.path(), "d").expect("resolve");
        assert_eq!(config.agent.name, "a");
        assert_eq!(config.llm.name, "l");
        assert_eq!(config.tasks[0].id, "tasks/x/a");
    }
}
