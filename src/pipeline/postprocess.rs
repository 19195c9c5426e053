//! Post-processing: deterministic cleanup of extracted text and LLM Markdown.
//!
//! Two entry points share the same small rules:
//!
//! - [`clean_extracted_text`] runs on every extraction result. pdfium's text
//!   layer and tesseract both emit CRLF, form feeds, trailing spaces and
//!   zero-width characters that only waste prompt tokens later.
//! - [`clean_markdown`] runs on the reorganize reply. Models wrap their output
//!   in ```` ```markdown ```` fences despite being told not to, and pad it
//!   with runs of blank lines.
//!
//! None of the rules touch words; they only change whitespace and wrappers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise raw extracted text.
///
/// 1. Normalise line endings (CRLF / CR / form feed → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Trim leading and trailing blank lines
pub fn clean_extracted_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Clean the Markdown returned by the reorganize call.
///
/// 1. Strip outer markdown fences
/// 2. Normalise line endings
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode
/// 6. Ensure the document ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Outer markdown fences ────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").expect("valid regex")
});

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Line endings ─────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
}

// ── Trailing whitespace ──────────────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Blank-line runs ──────────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Invisible characters ─────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Final newline ────────────────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
