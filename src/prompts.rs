//! Prompts for the reorganize, answer and vision-OCR calls.
//!
//! Callers can override the first two via
//! [`crate::config::PipelineConfig::reorganize_prompt`] and
//! [`crate::config::PipelineConfig::answer_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for the reorganize call.
pub const DEFAULT_REORGANIZE_PROMPT: &str = r#"You reorganize extracted document text into clean Markdown.

Follow these rules precisely:

1. CONTENT
   - Keep ALL content. Do not add, remove, summarise or reword anything
   - Keep the original reading order

2. STRUCTURE
   - Use #, ##, ### for headings that are evident in the text
   - Use - for unordered lists and 1. 2. 3. for ordered lists
   - Convert tabular text to GFM pipe tables
   - Rejoin words and sentences broken across lines by extraction

3. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary or explanations"#;

/// Default instruction for the answer call; the document text follows it.
pub const DEFAULT_ANSWER_PROMPT: &str = "Answer the user's question directly, using only the content below. \
If the content does not contain the answer, say so.";

/// System prompt for the vision OCR backend.
pub const VISION_OCR_PROMPT: &str = r#"Transcribe all text visible in the image exactly as written.
Keep the reading order and line breaks. Output only the transcribed text,
with no commentary. If the image contains no text, output nothing."#;

/// Build the user message for the reorganize call.
pub fn reorganize_user_message(raw: &str) -> String {
    format!("reorganize:\n{}", raw)
}

/// Build the system message for the answer call.
///
/// The whole document is stuffed into the prompt; there is no retrieval step.
pub fn answer_system_message(instruction: &str, context: &str) -> String {
    format!(
        "{}\n\nAnswer from this content:\n\"\"\"\n{}\n\"\"\"",
        instruction, context
    )
}

/// Build the user message for the vision OCR call.
pub fn vision_ocr_user_message(language: &str) -> String {
    format!("Transcribe this page. Expected language (tesseract code): {language}")
}
