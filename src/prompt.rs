//! Prompt assembly: instruction header, evidence context, submission.

use crate::grader::Scale;
use crate::models::RetrievalHit;
use crate::oracle::ChatMessage;

/// Separator between rendered evidence passages.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Fixed grading policy plus the JSON contract, with the scale bounds filled in.
pub fn instruction_header(scale: Scale) -> String {
    let (min, max) = scale.bounds();
    format!(
        r#"You are an impartial grading assistant. Evaluate the student's submission using the provided rubric and reference materials.
Follow these rules:
- Be strict but fair and consistent.
- Justify each criterion score with short, specific evidence.
- If references contradict the student, explain why.
- If a criterion is not evidenced, score it low and state what was missing.
- Return ONLY valid JSON as specified below (no extra prose).

All scores are numbers between {min} and {max}.

JSON schema:
{{
  "total_score": float,
  "criteria": [
    {{
      "name": str,
      "score": float,
      "rationale": str
    }}
  ],
  "overall_feedback": str,
  "improvable_sections": [str],
  "plagiarism_or_policy_flags": [str]
}}"#,
        min = min,
        max = max
    )
}

/// `[score=0.1234] path:p2 :: text` per hit, in the order given.
pub fn build_context_block(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[score={:.4}] {} :: {}",
                hit.score,
                hit.chunk.provenance(),
                hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// System + user messages for one grading call.
pub fn build_messages(scale: Scale, context: &str, submission: &str) -> Vec<ChatMessage> {
    let user = format!(
        "Reference Materials (Top Passages):\n{context}\n\nRubric:\n[see rubric chunks above]\n\n\
         Student Submission:\n{submission}\n\n\
         If the rubric defines weights, respect them. If not, split weights evenly across criteria you infer from the rubric.\n\
         Important: respond with JSON only.\n",
        context = context,
        submission = submission
    );
    vec![
        ChatMessage::system(instruction_header(scale)),
        ChatMessage::user(user),
    ]
}
