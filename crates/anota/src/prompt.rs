//! Deterministic assembly of the annotation prompt.
//!
//! Pure string building, no I/O: the same record, code, and digest always
//! produce the same prompt. The output-format instruction is strict because
//! downstream parsing is a single-character check; ambiguous
//! natural-language answers must be rejected systematically rather than
//! heuristically parsed.

/// The record text block embedded in the prompt. Fields arrive already
/// sanitized.
pub fn record_text(description: &str, embedded_content: &str) -> String {
    format!(
        "Learning activity:\n\
         Activity description: {description}.\n\
         Embedded media content description: {embedded_content}.\n"
    )
}

/// Assemble the full annotation prompt for one (record, code) pair.
pub fn build(
    code_name: &str,
    definition: &str,
    example: &str,
    context_digest: &str,
    record_text: &str,
) -> String {
    format!(
        "You are a qualitative coding expert. You are assessing the student engagement of \
         learning activities created by teachers in a inquiry-based learning digital platform. \n\
         These activities may have different media content including text and embedded artifacts \
         (e.g., images, videos, apps, labs). Please review the provided activity description and \
         code it based on the construct: `{code_name}`. \n\
         The definition of this construct is `{definition}`.  \n\
         Here you have some examples: `{example}`. \n\
         For additional context, here is a summary of the 3 previous items: `{context_digest}`. \n\
         After reviewing the text, assign a code of '1' if you believe the text exemplifies \
         `{code_name}`, or a '0' if it does not.\n\
         Your response should only be '1' or '0', without the quotes. Do NOT provide any \
         explanation or text after the 0 or 1. It is very important that your response is only \
         a 0 or 1.\n\n\
         Text: `{record_text}`"
    )
}
