/// Characters of document text sent on a normal attempt.
pub const PRIMARY_CHAR_LIMIT: usize = 12_000;
/// Characters sent on the reduced fallback attempt.
pub const FALLBACK_CHAR_LIMIT: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Full,
    Partial,
}

const ANALYSIS_INSTRUCTIONS: &str = r#"You analyze legal documents.
Read the document text below and answer with a single JSON object of this shape:

{
  "summary": "Plain-language summary of the document's purpose, the main obligations of each party and the risks a non-lawyer should know about.",
  "key_clauses": [
    {
      "type": "Clause type, e.g. Payment Terms, Termination, Confidentiality",
      "content": "The clause text, shortened to about 200 characters when long",
      "importance": "high | medium | low",
      "classification": "Contractual | Compliance | Financial | Termination | Confidentiality | Miscellaneous",
      "risk_score": "Number from 1 to 10, 10 being the highest risk",
      "page": "Page number when it can be told from the page markers, otherwise null"
    }
  ],
  "document_type": "Kind of document: contract, agreement, policy, notice, ...",
  "confidence": "Number between 0.5 and 0.98"
}

Rules:
- Return only the JSON object. No prose, no markdown fences.
- Every key above must be present.
- If the text looks cut off, concentrate on the most important clauses."#;

const PARTIAL_NOTE: &str =
    "NOTE: only the beginning of the document is included because of size limits.";

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the user prompt for one analysis call.
pub fn analysis_prompt(text: &str, mode: PromptMode) -> String {
    let mut prompt = String::with_capacity(ANALYSIS_INSTRUCTIONS.len() + text.len() + 128);
    prompt.push_str(ANALYSIS_INSTRUCTIONS);
    if mode == PromptMode::Partial {
        prompt.push_str("\n\n");
        prompt.push_str(PARTIAL_NOTE);
    }
    prompt.push_str("\n\nDocument text:\n");
    prompt.push_str(text);
    prompt
}
