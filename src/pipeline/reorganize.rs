//! Reorganize: raw extracted text → Markdown, content unchanged.

use crate::error::DocQaError;
use crate::output::OrganizedText;
use crate::pipeline::llm::ChatModel;
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::reorganize_user_message;
use tracing::{debug, info};

/// Ask the model to reformat `raw` as Markdown.
///
/// Blank input is rejected with [`DocQaError::InvalidInput`] before any model
/// call. A model failure or a blank reply is an error; the raw text is never
/// silently substituted for the result.
pub async fn reorganize(
    chat: &dyn ChatModel,
    system_prompt: &str,
    raw: &str,
) -> Result<OrganizedText, DocQaError> {
    if raw.trim().is_empty() {
        return Err(DocQaError::invalid_input(
            "nothing to reorganize: extracted text is empty",
        ));
    }

    info!("Reorganizing {} chars of extracted text", raw.len());
    let completion = chat
        .complete(system_prompt, &reorganize_user_message(raw))
        .await?;

    let markdown = clean_markdown(&completion.content);
    if markdown.trim().is_empty() {
        return Err(DocQaError::external("llm", "empty completion for reorganize"));
    }
    debug!(
        "Reorganized into {} chars of Markdown ({} tokens out)",
        markdown.len(),
        completion.output_tokens
    );

    Ok(OrganizedText {
        markdown,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms: completion.duration_ms,
    })
}
