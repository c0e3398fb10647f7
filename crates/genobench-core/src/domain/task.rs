//! Task definitions: the immutable unit of evaluation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Clinical decision category a task belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    VariantInterpretation,
    TreatmentRecommendation,
    ClinicalTrialMatching,
    DrugGeneInteraction,
    EvidenceSynthesis,
    CohortAnalysis,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 6] = [
        TaskCategory::VariantInterpretation,
        TaskCategory::TreatmentRecommendation,
        TaskCategory::ClinicalTrialMatching,
        TaskCategory::DrugGeneInteraction,
        TaskCategory::EvidenceSynthesis,
        TaskCategory::CohortAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::VariantInterpretation => "variant_interpretation",
            TaskCategory::TreatmentRecommendation => "treatment_recommendation",
            TaskCategory::ClinicalTrialMatching => "clinical_trial_matching",
            TaskCategory::DrugGeneInteraction => "drug_gene_interaction",
            TaskCategory::EvidenceSynthesis => "evidence_synthesis",
            TaskCategory::CohortAnalysis => "cohort_analysis",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown category '{}' (expected one of: {})",
                    s,
                    TaskCategory::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// How the agent response is handed to an evaluator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseExtractor {
    /// Pass the response through untouched.
    #[default]
    Raw,
    /// The response must parse as JSON; a non-JSON response fails the evaluator.
    Json,
}

impl FromStr for ResponseExtractor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "raw" => Ok(ResponseExtractor::Raw),
            "json" => Ok(ResponseExtractor::Json),
            other => Err(format!("unknown func '{}' (expected 'raw' or 'json')", other)),
        }
    }
}

/// One evaluator invocation bound to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatorSpec {
    /// Dotted registry name, e.g. `clinical_genomics.validate_variant_classification`.
    pub name: String,
    pub extractor: ResponseExtractor,
    /// Evaluator-specific arguments (always a JSON object).
    pub args: serde_json::Value,
    /// When any spec of a task is authoritative, only authoritative scores count.
    #[serde(default)]
    pub authoritative: bool,
}

/// Advisory sketch of the expected response shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OutputFormat {
    /// Field name → informal value constraint.
    Fields(BTreeMap<String, serde_json::Value>),
    /// Free-form description.
    Description(String),
}

impl OutputFormat {
    /// Field names the sketch expects at the top level of a JSON response.
    pub fn expected_fields(&self) -> Vec<&str> {
        match self {
            OutputFormat::Fields(fields) => fields.keys().map(String::as_str).collect(),
            OutputFormat::Description(_) => Vec::new(),
        }
    }

    /// Expected fields absent from `response`. Non-object responses miss all of them.
    pub fn missing_fields(&self, response: &serde_json::Value) -> Vec<String> {
        let object = response.as_object();
        self.expected_fields()
            .into_iter()
            .filter(|f| object.map_or(true, |o| !o.contains_key(*f)))
            .map(str::to_string)
            .collect()
    }
}

/// A validated task, immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Stable identifier used in reports (domain-relative path without extension).
    pub id: String,
    /// Domain-relative document path as written in the benchmark declaration.
    pub path: PathBuf,
    pub category: TaskCategory,
    pub question: String,
    pub output_format: Option<OutputFormat>,
    /// Names of the external capabilities the agent may use.
    pub tool_manifest: Vec<String>,
    /// Never empty.
    pub evaluators: Vec<EvaluatorSpec>,
    /// Overrides the benchmark-level pass threshold.
    pub pass_threshold: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_parse_and_display() {
        for category in TaskCategory::ALL {
            let parsed: TaskCategory = category.as_str().parse().expect("parse");
            assert_eq!(parsed, category);
            assert_eq!(parsed.to_string(), category.as_str());
        }
        let err = "oncology".parse::<TaskCategory>().unwrap_err();
        assert!(err.contains("oncology"));
        assert!(err.contains("cohort_analysis"));
    }

    #[test]
    fn test_category_serde_matches_display() {
        let json = serde_json::to_string(&TaskCategory::DrugGeneInteraction).expect("serialize");
        assert_eq!(json, "\"drug_gene_interaction\"");
    }

    #[test]
    fn test_extractor_parse() {
        assert_eq!("".parse::<ResponseExtractor>(), Ok(ResponseExtractor::Raw));
        assert_eq!("raw".parse::<ResponseExtractor>(), Ok(ResponseExtractor::Raw));
        assert_eq!("json".parse::<ResponseExtractor>(), Ok(ResponseExtractor::Json));
        assert!("get(x)".parse::<ResponseExtractor>().is_err());
    }

    #[test]
    fn test_output_format_missing_fields() {
        let format: OutputFormat = serde_json::from_value(json!({
            "pathogenicity": "Pathogenic | Likely Pathogenic | VUS",
            "evidence_codes": ["PVS1", "PM2"],
            "confidence": "0.0-1.0"
        }))
        .expect("fields");

        let missing = format.missing_fields(&json!({"pathogenicity": "Pathogenic"}));
        assert_eq!(missing, vec!["confidence", "evidence_codes"]);

        let missing = format.missing_fields(&json!("free text"));
        assert_eq!(missing.len(), 3);
    }

    #[test]
    fn test_output_format_description_expects_nothing() {
        let format: OutputFormat =
            serde_json::from_value(json!("a short paragraph")).expect("description");
        assert!(format.expected_fields().is_empty());
        assert!(format.missing_fields(&json!({})).is_empty());
    }
}
