//! Turns the provider's raw reply into an `AnalysisResult`.
//!
//! Models wrap JSON in markdown fences or chat around it, and send
//! numbers as strings. Parsing is lenient about all of that but strict
//! about the four top-level keys on a normal attempt.

use serde_json::{Map, Value};

use crate::models::{AnalysisResult, Importance, KeyClause};

const REQUIRED_FIELDS: [&str; 4] = ["summary", "key_clauses", "document_type", "confidence"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response from AI provider")]
    Empty,
    #[error("response is not valid JSON: {0}")]
    Json(String),
    #[error("response JSON is not an object")]
    NotAnObject,
    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<String>),
}

/// Which limits apply when building the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Primary,
    Fallback,
}

impl ParseMode {
    fn clause_content_limit(self) -> usize {
        match self {
            Self::Primary => 500,
            Self::Fallback => 200,
        }
    }

    fn clause_confidence(self) -> f32 {
        match self {
            Self::Primary => 0.9,
            Self::Fallback => 0.6,
        }
    }

    fn default_confidence(self) -> f32 {
        match self {
            Self::Primary => 0.8,
            Self::Fallback => 0.6,
        }
    }

    fn confidence_cap(self) -> f32 {
        match self {
            Self::Primary => 0.98,
            Self::Fallback => 0.7,
        }
    }
}

/// Strip markdown fences and surrounding prose, keeping the outermost `{...}`.
pub fn clean_json_response(raw: &str) -> Result<&str, ParseError> {
    let mut body = raw.trim();
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let fence = body
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| body.find("```").map(|i| i + 3));
    if let Some(start) = fence {
        if let Some(len) = body[start..].find("```") {
            body = body[start..start + len].trim();
        }
    }

    if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) {
        if open < close {
            body = &body[open..=close];
        }
    }
    Ok(body.trim())
}

/// Parse a provider reply into a result.
///
/// `default_document_type` is used when the model omits or blanks the type.
pub fn parse_analysis(
    raw: &str,
    default_document_type: &str,
    mode: ParseMode,
) -> Result<AnalysisResult, ParseError> {
    let cleaned = clean_json_response(raw)?;
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| ParseError::Json(e.to_string()))?;
    let data = value.as_object().ok_or(ParseError::NotAnObject)?;

    if mode == ParseMode::Primary {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !data.contains_key(**f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingFields(missing));
        }
    }

    let key_clauses = data
        .get("key_clauses")
        .and_then(Value::as_array)
        .map(|clauses| {
            clauses
                .iter()
                .filter_map(Value::as_object)
                .map(|c| build_clause(c, mode))
                .collect()
        })
        .unwrap_or_default();

    let summary = str_field(data, "summary");
    let summary = match mode {
        ParseMode::Primary => summary.unwrap_or("No summary provided.").to_string(),
        ParseMode::Fallback => format!(
            "[Partial Analysis] {}",
            summary.unwrap_or("Limited analysis completed.")
        ),
    };

    let document_type = str_field(data, "document_type")
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback_document_type(default_document_type));

    let confidence = data
        .get("confidence")
        .and_then(number)
        .unwrap_or(mode.default_confidence())
        .clamp(0.0, mode.confidence_cap());

    Ok(AnalysisResult {
        summary,
        key_clauses,
        document_type,
        confidence,
        partial: mode == ParseMode::Fallback,
    })
}

/// Minimal result when even the fallback reply could not be parsed.
pub fn limited_analysis(excerpt: &str, default_document_type: &str) -> AnalysisResult {
    let content = if excerpt.chars().count() > 200 {
        format!("{}...", super::prompt::truncate_chars(excerpt, 200))
    } else {
        excerpt.to_string()
    };
    AnalysisResult {
        summary: "Document processed with limited analysis due to processing constraints.".into(),
        key_clauses: vec![KeyClause {
            clause_type: "General Content".into(),
            content,
            importance: Importance::Medium,
            classification: "Miscellaneous".into(),
            risk_score: 5.0,
            page: Some(1),
            confidence: 0.5,
        }],
        document_type: fallback_document_type(default_document_type),
        confidence: 0.5,
        partial: true,
    }
}

fn build_clause(c: &Map<String, Value>, mode: ParseMode) -> KeyClause {
    let content = str_field(c, "content").unwrap_or_default();
    KeyClause {
        clause_type: str_field(c, "type").unwrap_or("Unknown").to_string(),
        content: super::prompt::truncate_chars(content, mode.clause_content_limit()).to_string(),
        importance: Importance::from_label(str_field(c, "importance").unwrap_or("low")),
        classification: str_field(c, "classification")
            .unwrap_or("Miscellaneous")
            .to_string(),
        risk_score: c
            .get("risk_score")
            .and_then(number)
            .unwrap_or(0.0)
            .clamp(0.0, 10.0),
        page: c.get("page").and_then(number).and_then(|p| {
            (p >= 1.0 && p.fract() == 0.0).then_some(p as u32)
        }),
        confidence: mode.clause_confidence(),
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Accepts JSON numbers and numeric strings.
fn number(v: &Value) -> Option<f32> {
    let parsed = match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn fallback_document_type(default_document_type: &str) -> String {
    if default_document_type.trim().is_empty() {
        "Legal Document".to_string()
    } else {
        default_document_type.to_string()
    }
}
