//! Grading evaluator: retrieval → prompt → oracle → validated grade.
//!
//! The oracle's reply is untrusted. It is parsed in three stages (strict
//! JSON, then the outermost `{...}` span, then a canonical fallback), every
//! numeric field is coerced and clamped into the evaluator's [`Scale`], and
//! the letter grade is derived from the clamped total. Only transport errors
//! from the oracle escape [`GradeEvaluator::grade`].
//!
//! The evaluator does no I/O of its own; callers persist or render the
//! returned [`GradeOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::index::VectorIndex;
use crate::models::{CriterionScore, GradeResult, ModelReport, RetrievalHit};
use crate::oracle::{OracleClient, OracleError};
use crate::prompt::{build_context_block, build_messages};
use crate::retrieve::Retriever;

/// Retrieval query used when no assignment hint is supplied.
pub const DEFAULT_QUERY: &str = "grading rubric and question and answer key";
/// Feedback attached to the canonical fallback result.
pub const PARSE_FAILURE_FEEDBACK: &str = "The grader could not parse model output as JSON.";
/// Policy flag attached to the canonical fallback result.
pub const JSON_PARSE_ERROR: &str = "JSON_PARSE_ERROR";

/// Letter cut points on the 0–100 scale, highest first.
const LETTER_CUTS: [(f64, &str); 9] = [
    (93.0, "A"),
    (90.0, "A-"),
    (87.0, "B+"),
    (83.0, "B"),
    (80.0, "B-"),
    (77.0, "C+"),
    (73.0, "C"),
    (70.0, "C-"),
    (60.0, "D"),
];

/// Numeric scale of an evaluator. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// 0–100
    #[default]
    Percent,
    /// 0–1
    Unit,
}

impl Scale {
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Scale::Percent => (0.0, 100.0),
            Scale::Unit => (0.0, 1.0),
        }
    }

    /// Clamp into the scale; NaN maps to the minimum.
    pub fn clamp(&self, value: f64) -> f64 {
        let (min, max) = self.bounds();
        if value.is_nan() {
            return min;
        }
        value.clamp(min, max)
    }

    /// Letter grade for an in-scale score. Unit-scale cut points are the
    /// percent cut points divided by 100.
    pub fn letter(&self, score: f64) -> &'static str {
        let (_, max) = self.bounds();
        let score = self.clamp(score);
        LETTER_CUTS
            .iter()
            .find(|(cut, _)| score >= cut * max / 100.0)
            .map(|(_, letter)| *letter)
            .unwrap_or("F")
    }
}

/// Which parsing stage produced the model report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// The whole reply was a JSON object.
    Strict,
    /// A JSON object was recovered from the first `{` to the last `}`.
    Extracted,
    /// Nothing parsed; the canonical fallback was used.
    Fallback,
}

/// Everything one grading call produced.
#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub raw_model_text: String,
    pub result: GradeResult,
    pub report: ModelReport,
    pub parse_status: ParseStatus,
    pub retrieved: Vec<RetrievalHit>,
    pub used_fallback_retrieval: bool,
    pub model: String,
}

/// Parse the oracle's reply into a JSON object, defensively.
pub fn parse_model_output(text: &str) -> (Option<Map<String, Value>>, ParseStatus) {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return (Some(map), ParseStatus::Strict);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return (Some(map), ParseStatus::Extracted);
            }
        }
    }
    (None, ParseStatus::Fallback)
}

/// Canonical result used when the reply cannot be parsed.
pub fn fallback_report(scale: Scale) -> ModelReport {
    ModelReport {
        total_score: scale.bounds().0,
        criteria: Vec::new(),
        overall_feedback: Some(PARSE_FAILURE_FEEDBACK.to_string()),
        improvable_sections: Vec::new(),
        policy_flags: vec![JSON_PARSE_ERROR.to_string()],
    }
}

/// Numbers and numeric strings become `f64`; anything else is 0.
fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_nan() {
        0.0
    } else {
        n
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Coerce and clamp every field of a parsed reply.
pub fn validate_report(map: &Map<String, Value>, scale: Scale) -> ModelReport {
    let criteria = map
        .get("criteria")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|c| CriterionScore {
                    name: string_field(c, "name").unwrap_or_default(),
                    score: scale.clamp(coerce_number(c.get("score"))),
                    rationale: string_field(c, "rationale").unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let flags = map
        .get("plagiarism_or_policy_flags")
        .or_else(|| map.get("policy_flags"));

    ModelReport {
        total_score: scale.clamp(coerce_number(map.get("total_score"))),
        criteria,
        overall_feedback: string_field(map, "overall_feedback"),
        improvable_sections: string_list(map.get("improvable_sections")),
        policy_flags: string_list(flags),
    }
}

/// Parse and validate a raw reply in one step.
pub fn interpret_model_output(text: &str, scale: Scale) -> (ModelReport, ParseStatus) {
    match parse_model_output(text) {
        (Some(map), status) => (validate_report(&map, scale), status),
        (None, status) => (fallback_report(scale), status),
    }
}

/// Turns submissions into validated grades.
pub struct GradeEvaluator {
    retriever: Retriever,
    oracle: Arc<dyn OracleClient>,
    scale: Scale,
    k_rubric: usize,
    k_question: usize,
    call_timeout: Option<Duration>,
}

impl GradeEvaluator {
    pub fn new(index: Arc<VectorIndex>, oracle: Arc<dyn OracleClient>, scale: Scale) -> Self {
        Self {
            retriever: Retriever::new(index),
            oracle,
            scale,
            k_rubric: 4,
            k_question: 2,
            call_timeout: None,
        }
    }

    pub fn from_config(
        index: Arc<VectorIndex>,
        oracle: Arc<dyn OracleClient>,
        config: &Config,
    ) -> Self {
        Self::new(index, oracle, config.grading.scale).with_retrieval_sizes(
            config.retrieval.k_rubric,
            config.retrieval.k_question,
        )
    }

    pub fn with_retrieval_sizes(mut self, k_rubric: usize, k_question: usize) -> Self {
        self.k_rubric = k_rubric;
        self.k_question = k_question;
        self
    }

    /// Bound the oracle call; expiry surfaces as [`OracleError::Timeout`].
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn letter_grade(&self, score: f64) -> &'static str {
        self.scale.letter(score)
    }

    #[tracing::instrument(
        skip(self, submission_text, rubric_allowlist, question_allowlist),
        fields(submission_len = submission_text.len(), scale = ?self.scale)
    )]
    pub async fn grade(
        &self,
        submission_text: &str,
        assignment_hint: Option<&str>,
        rubric_allowlist: &[String],
        question_allowlist: &[String],
    ) -> Result<GradeOutcome, OracleError> {
        let query = assignment_hint
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_QUERY);

        let retrieval = self.retriever.retrieve_for_grading(
            query,
            rubric_allowlist,
            question_allowlist,
            self.k_rubric,
            self.k_question,
        );

        let context = build_context_block(&retrieval.hits);
        let messages = build_messages(self.scale, &context, submission_text);

        let raw = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.oracle.chat(&messages))
                .await
                .map_err(|_| OracleError::Timeout(limit))??,
            None => self.oracle.chat(&messages).await?,
        };

        let (report, parse_status) = interpret_model_output(&raw, self.scale);
        if parse_status == ParseStatus::Fallback {
            tracing::warn!(raw_len = raw.len(), "oracle output was not JSON, using fallback result");
        }

        let result = GradeResult {
            grade: Some(self.scale.letter(report.total_score).to_string()),
            score: Some(report.total_score),
            feedback: report.overall_feedback.clone(),
            evidence: retrieval.hits.iter().map(RetrievalHit::evidence_line).collect(),
        };

        tracing::info!(
            score = report.total_score,
            grade = result.grade.as_deref().unwrap_or("-"),
            evidence = result.evidence.len(),
            parse = ?parse_status,
            "submission graded"
        );

        Ok(GradeOutcome {
            raw_model_text: raw,
            result,
            report,
            parse_status,
            retrieved: retrieval.hits,
            used_fallback_retrieval: retrieval.used_fallback,
            model: self.oracle.model_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_table_matches_cut_points() {
        let s = Scale::Percent;
        let cases = [
            (100.0, "A"),
            (93.0, "A"),
            (92.99, "A-"),
            (90.0, "A-"),
            (88.0, "B+"),
            (87.0, "B+"),
            (83.0, "B"),
            (80.0, "B-"),
            (77.0, "C+"),
            (73.0, "C"),
            (70.0, "C-"),
            (69.9, "D"),
            (60.0, "D"),
            (59.99, "F"),
            (0.0, "F"),
        ];
        for (score, letter) in cases {
            assert_eq!(s.letter(score), letter, "score {}", score);
        }
    }

    #[test]
    fn unit_scale_uses_scaled_cut_points() {
        let s = Scale::Unit;
        assert_eq!(s.letter(0.93), "A");
        assert_eq!(s.letter(0.88), "B+");
        assert_eq!(s.letter(0.5), "F");
        assert_eq!(s.letter(1.0), "A");
    }

    #[test]
    fn letter_mapping_is_total_and_monotonic() {
        let rank = |l: &str| {
            ["F", "D", "C-", "C", "C+", "B-", "B", "B+", "A-", "A"]
                .iter()
                .position(|x| *x == l)
                .unwrap()
        };
        for scale in [Scale::Percent, Scale::Unit] {
            let (min, max) = scale.bounds();
            let mut prev = 0;
            for step in 0..=10_000 {
                let score = min + (max - min) * step as f64 / 10_000.0;
                let r = rank(scale.letter(score));
                assert!(r >= prev, "{:?} not monotonic at {}", scale, score);
                prev = r;
            }
        }
    }

    #[test]
    fn clamp_handles_out_of_range_and_nan() {
        assert_eq!(Scale::Percent.clamp(-5.0), 0.0);
        assert_eq!(Scale::Percent.clamp(150.0), 100.0);
        assert_eq!(Scale::Unit.clamp(88.0), 1.0);
        assert_eq!(Scale::Percent.clamp(f64::NAN), 0.0);
    }

    #[test]
    fn strict_json_parses() {
        let (map, status) = parse_model_output(r#"  {"total_score": 70}  "#);
        assert_eq!(status, ParseStatus::Strict);
        assert_eq!(map.unwrap()["total_score"], 70);
    }

    #[test]
    fn json_wrapped_in_prose_is_extracted() {
        let text = "Here is the grade:\n```json\n{\"total_score\": 81, \"criteria\": []}\n```\nThanks!";
        let (map, status) = parse_model_output(text);
        assert_eq!(status, ParseStatus::Extracted);
        assert_eq!(map.unwrap()["total_score"], 81);
    }

    #[test]
    fn non_object_json_falls_back() {
        assert_eq!(parse_model_output("[1, 2, 3]").1, ParseStatus::Fallback);
        assert_eq!(parse_model_output("42").1, ParseStatus::Fallback);
        assert_eq!(parse_model_output("} backwards {").1, ParseStatus::Fallback);
    }

    #[test]
    fn garbage_yields_canonical_fallback() {
        let (report, status) = interpret_model_output("not json at all", Scale::Percent);
        assert_eq!(status, ParseStatus::Fallback);
        assert_eq!(report.total_score, 0.0);
        assert!(report.criteria.is_empty());
        assert_eq!(report.overall_feedback.as_deref(), Some(PARSE_FAILURE_FEEDBACK));
        assert_eq!(report.policy_flags, vec![JSON_PARSE_ERROR.to_string()]);
    }

    #[test]
    fn scores_are_coerced_and_clamped() {
        let text = r#"{
            "total_score": "250",
            "criteria": [
                {"name": "Clarity", "score": -3, "rationale": "r"},
                {"name": "Depth", "score": "42.5"},
                {"name": "Style", "score": "excellent"},
                "not an object"
            ],
            "overall_feedback": "ok",
            "improvable_sections": ["intro", 7],
            "policy_flags": ["LATE"]
        }"#;
        let (report, status) = interpret_model_output(text, Scale::Percent);
        assert_eq!(status, ParseStatus::Strict);
        assert_eq!(report.total_score, 100.0);
        let scores: Vec<f64> = report.criteria.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.0, 42.5, 0.0]);
        assert_eq!(report.criteria[1].rationale, "");
        assert_eq!(report.improvable_sections, vec!["intro".to_string()]);
        assert_eq!(report.policy_flags, vec!["LATE".to_string()]);
    }

    #[test]
    fn numeric_total_scores_always_land_in_scale() {
        for raw in ["-1e9", "-0.5", "0", "55.5", "100", "100.01", "1e300", "\"-7\"", "\"93%\"", "null", "true"] {
            let text = format!("{{\"total_score\": {}}}", raw);
            for scale in [Scale::Percent, Scale::Unit] {
                let (report, _) = interpret_model_output(&text, scale);
                let (min, max) = scale.bounds();
                assert!(
                    report.total_score >= min && report.total_score <= max,
                    "{} on {:?} gave {}",
                    raw,
                    scale,
                    report.total_score
                );
            }
        }
    }

    #[test]
    fn percent_strings_are_understood() {
        let (report, _) = interpret_model_output(r#"{"total_score": " 93% "}"#, Scale::Percent);
        assert_eq!(report.total_score, 93.0);
    }

    #[test]
    fn missing_feedback_is_none() {
        let (report, _) = interpret_model_output(r#"{"total_score": 50}"#, Scale::Percent);
        assert_eq!(report.overall_feedback, None);
        assert!(report.policy_flags.is_empty());
    }
}
