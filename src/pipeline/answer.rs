//! Answer: one question against the full document text, one model call.
//!
//! There is no retrieval step. The whole context goes into the system
//! message, so the document must fit in the model's context window.

use crate::error::DocQaError;
use crate::output::QaExchange;
use crate::pipeline::llm::ChatModel;
use crate::prompts::answer_system_message;
use tracing::info;

/// Answer `question` from `context`.
///
/// Blank context or question is rejected with [`DocQaError::InvalidInput`]
/// without calling the model.
pub async fn answer(
    chat: &dyn ChatModel,
    instruction: &str,
    context: &str,
    question: &str,
) -> Result<QaExchange, DocQaError> {
    if context.trim().is_empty() {
        return Err(DocQaError::invalid_input("context is empty"));
    }
    let question = question.trim();
    if question.is_empty() {
        return Err(DocQaError::invalid_input("question is empty"));
    }

    info!("Answering question against {} chars of context", context.len());
    let completion = chat
        .complete(&answer_system_message(instruction, context), question)
        .await?;

    let answer = completion.content.trim().to_string();
    if answer.is_empty() {
        return Err(DocQaError::external("llm", "empty completion for answer"));
    }

    Ok(QaExchange {
        question: question.to_string(),
        answer,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms: completion.duration_ms,
    })
}
