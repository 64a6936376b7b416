use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::domain::entities::grounded_answer::{Citation, GroundedAnswer, RagSearchResult};
use crate::helper::error_chain_fmt;
use crate::ports::completions_provider::{
    ChatMessage, CompletionsProviderError, CompletionsProviderPort,
};

/// Fixed advisory disclaimer every grounded answer must end with
pub const ADVISORY_DISCLAIMER: &str = "This analysis is for informational purposes only and does \
    not constitute financial advice. Please consult with a qualified insurance professional for \
    specific guidance.";

/// Answer returned without calling the model when retrieval found nothing
pub const NO_CONTEXT_ANSWER: &str =
    "This information is not available in the provided policy documents.";

/// Confidence used when the model did not report a parsable one
const DEFAULT_CONFIDENCE: f32 = 0.7;

static CITATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());
static CONFIDENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)confidence:\s*([0-9]*\.?[0-9]+)").unwrap());

/// Turns a query and its retrieved context into a grounded answer with
/// citations and a confidence score.
pub struct AnswerComposer {
    completions: Arc<dyn CompletionsProviderPort>,
}

impl AnswerComposer {
    pub fn new(completions: Arc<dyn CompletionsProviderPort>) -> Self {
        Self { completions }
    }

    /// # Failure
    /// A provider failure surfaces as an error: the caller never receives a
    /// fabricated answer in place of a failed one.
    #[tracing::instrument(name = "Composing grounded answer", skip(self, results, request_context))]
    pub async fn compose(
        &self,
        query: &str,
        results: &[RagSearchResult],
        request_context: &JsonValue,
    ) -> Result<GroundedAnswer, AnswerComposerError> {
        // Nothing retrieved: there is nothing to ground an answer on, and
        // calling the model anyway is how dollar figures get invented.
        if results.is_empty() {
            return Ok(GroundedAnswer {
                content: format!("{} {}", NO_CONTEXT_ANSWER, ADVISORY_DISCLAIMER),
                citations: Vec::new(),
                confidence: 0.0,
            });
        }

        let messages = vec![
            ChatMessage::system(build_system_prompt(request_context)),
            ChatMessage::user(build_user_prompt(query, results)),
        ];

        let raw_answer = self.completions.complete(&messages).await?;

        Ok(parse_model_output(&raw_answer, results))
    }
}

#[derive(thiserror::Error)]
pub enum AnswerComposerError {
    #[error(transparent)]
    Completions(#[from] CompletionsProviderError),
}

impl std::fmt::Debug for AnswerComposerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

fn build_system_prompt(request_context: &JsonValue) -> String {
    format!(
        "You are an expert insurance policy analyst. Your role is to provide accurate, helpful \
         information about insurance policies based on the provided context.\n\
         \n\
         IMPORTANT RULES:\n\
         1. NEVER fabricate or guess prices, premiums, or specific monetary amounts unless they \
         are explicitly stated in the context\n\
         2. If information is not available in the context, say \"{}\"\n\
         3. Always cite the numbered context entries supporting your claims, like [1]\n\
         4. Include a confidence score between 0 and 1 at the end of your response, as \
         \"Confidence: <score>\"\n\
         5. Always include this disclaimer: \"{}\"\n\
         \n\
         Current request context: {}\n\
         \n\
         Respond in a helpful, professional manner with clear explanations.",
        NO_CONTEXT_ANSWER, ADVISORY_DISCLAIMER, request_context
    )
}

fn build_user_prompt(query: &str, results: &[RagSearchResult]) -> String {
    let numbered_context = results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("[{}] {}", i + 1, result.content))
        .collect::<Vec<String>>()
        .join("\n\n");

    format!(
        "Query: {}\n\
         \n\
         Context from policy documents:\n\
         {}\n\
         \n\
         Please provide a comprehensive answer based on the context above. Include specific \
         citations and a confidence score.",
        query, numbered_context
    )
}

/// Splits the raw model output into the visible answer, the resolved
/// citations and the confidence score.
fn parse_model_output(raw_answer: &str, results: &[RagSearchResult]) -> GroundedAnswer {
    let confidence = CONFIDENCE_RE
        .captures(raw_answer)
        .and_then(|cap| cap[1].parse::<f32>().ok())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    // The confidence annotation is metadata, not part of the answer
    let mut content = CONFIDENCE_RE.replace_all(raw_answer, "").trim().to_string();

    if !content.contains(ADVISORY_DISCLAIMER) {
        if !content.is_empty() {
            content.push(' ');
        }
        content.push_str(ADVISORY_DISCLAIMER);
    }

    let mut citations: Vec<Citation> = Vec::new();
    for capture in CITATION_RE.captures_iter(&content) {
        let marker = capture[0].to_string();
        // Markers are 1-based in the prompt
        let Some(index) = capture[1].parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
            continue;
        };
        // Out-of-range markers point at nothing retrievable: dropped
        let Some(result) = results.get(index) else {
            continue;
        };
        if citations.iter().any(|citation| citation.index == index) {
            continue;
        }
        citations.push(Citation {
            index,
            marker,
            content: result.content.clone(),
            provenance: result.provenance.clone(),
        });
    }

    GroundedAnswer {
        content,
        citations,
        confidence,
    }
}
