//! Decoding of free-form model output into an [`AnalysisPayload`].

use serde_json::{Map, Value};
use tars_models::analysis::{AgentType, Analysis, AnalysisPayload};

use crate::error::AgentError;

/// Extract the first JSON object from text that may wrap it in prose or a
/// markdown fence.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    let candidates = [
        trimmed.starts_with('{').then(|| trimmed.to_string()),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];
    for candidate in candidates.into_iter().flatten() {
        if serde_json::from_str::<Value>(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Contents of the first ```json or bare ``` fence.
fn fenced_block(text: &str) -> Option<String> {
    const OPENERS: [&str; 4] = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    OPENERS.iter().find_map(|opener| {
        let start = text.find(opener)? + opener.len();
        let end = text[start..].find("```")?;
        Some(text[start..start + end].trim().to_string())
    })
}

/// The first brace-balanced `{ ... }`, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(object: &Map<String, Value>, key: &str) -> Option<f64> {
    match object.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode model output. Anything without a JSON object carrying numeric
/// `score` and `confidence` is returned as `Raw`.
pub fn parse_payload(raw: &str) -> AnalysisPayload {
    let structured = extract_json(raw)
        .ok()
        .and_then(|json| serde_json::from_str::<Value>(&json).ok())
        .and_then(|value| match value {
            Value::Object(object) => Some(object),
            _ => None,
        })
        .and_then(|object| {
            let score = number(&object, "score")?;
            let confidence = number(&object, "confidence")?;
            let reasoning = object
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let factors = object
                .get("factors")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|f| f.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            Some(AnalysisPayload::Structured {
                score,
                confidence,
                reasoning,
                factors,
            })
        });

    structured.unwrap_or_else(|| AnalysisPayload::Raw {
        text: raw.trim().to_string(),
    })
}

/// Turn a payload into an [`Analysis`]. A `Raw` payload is a failure.
pub fn into_analysis(
    payload: AnalysisPayload,
    symbol: &str,
    agent_type: AgentType,
) -> Result<Analysis, AgentError> {
    match payload {
        AnalysisPayload::Structured {
            score,
            confidence,
            reasoning,
            factors,
        } => Ok(Analysis::new(symbol, agent_type, score, confidence, &reasoning)
            .with_data("factors", Value::from(factors))),
        AnalysisPayload::Raw { text } => Err(AgentError::Unstructured(text)),
    }
}
