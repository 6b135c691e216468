//! `grader grade`: grade one submission file against the persisted index.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, OracleConfig};
use crate::extract::read_document_text;
use crate::grader::GradeEvaluator;
use crate::oracle::{retry_budget, ChatCompletionsClient};
use crate::search::open_index;

pub async fn run_grade(
    config: &Config,
    submission: &Path,
    hint: Option<&str>,
    rubric_allowlist: &[String],
    question_allowlist: &[String],
) -> Result<()> {
    let text = read_document_text(submission)
        .with_context(|| format!("Failed to read submission: {}", submission.display()))?;
    if text.trim().is_empty() {
        tracing::warn!(path = %submission.display(), "submission has no extractable text");
    }

    let index = Arc::new(open_index(config)?);
    let oracle = Arc::new(ChatCompletionsClient::from_config(&config.oracle)?);

    // Retries happen inside the client; this bounds the whole call.
    let evaluator = GradeEvaluator::from_config(index, oracle, config)
        .with_call_timeout(call_timeout(&config.oracle));

    let outcome = evaluator
        .grade(&text, hint, rubric_allowlist, question_allowlist)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Slack on top of the client's own retry budget.
const CALL_TIMEOUT_SLACK: Duration = Duration::from_secs(60);

fn call_timeout(oracle: &OracleConfig) -> Duration {
    retry_budget(oracle).saturating_add(CALL_TIMEOUT_SLACK)
}
