use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::EcoError;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

lazy_static! {
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",(\s*[}\]])").unwrap();
    static ref OBJECT_RE: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),
    #[error("oracle returned HTTP {0}")]
    Status(u16),
    #[error("oracle answer had no text")]
    EmptyAnswer,
    #[error("oracle call timed out")]
    Timeout,
}

/// One classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub response_schema: Option<Value>,
    pub temperature: f64,
}

/// External classifier that answers a prompt with (hopefully) JSON text.
#[async_trait]
pub trait RatingOracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

pub struct GeminiOracle {
    client: wreq::Client,
    api_key: String,
    model: String,
}

impl GeminiOracle {
    pub fn new(client: wreq::Client, api_key: Option<String>, model: String) -> Result<Self, EcoError> {
        let api_key = api_key.ok_or_else(|| EcoError::config("Missing GEMINI_API_KEY env var"))?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    fn payload(request: &OracleRequest) -> Value {
        let mut contents = Vec::new();
        if let Some(system) = &request.system {
            contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": system }] }));
        }
        contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": request.prompt }] }));

        let mut generation_config = serde_json::json!({ "temperature": request.temperature });
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = Value::String("application/json".to_string());
            generation_config["responseSchema"] = schema.clone();
        }
        serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl RatingOracle for GeminiOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_ENDPOINT, self.model, self.api_key
        );
        let resp = self
            .client
            .post(&url)
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OracleError::Status(resp.status().as_u16()));
        }
        let result: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        answer_text(&result).ok_or(OracleError::EmptyAnswer)
    }
}

/// `candidates[0].content.parts[0].text` of a generateContent response.
pub fn answer_text(result: &Value) -> Option<String> {
    result
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses answer text as a JSON object, repairing trailing commas once.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let text = strip_code_fence(text);
    let parsed = match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "oracle JSON parse error, attempting repair");
            let fixed = TRAILING_COMMA_RE.replace_all(text, "$1");
            serde_json::from_str::<Value>(&fixed).ok()?
        }
    };
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Like [`parse_object`] but tolerates prose around the first `{…}` block.
pub fn parse_embedded_object(text: &str) -> Option<Map<String, Value>> {
    parse_object(text).or_else(|| OBJECT_RE.find(text).and_then(|m| parse_object(m.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn trailing_commas_are_repaired() {
        let map = parse_object("{\"materials\": [\"glass\",], \"eco_score\": 5,}").unwrap();
        assert_eq!(map["eco_score"], 5);
        assert_eq!(map["materials"][0], "glass");
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(parse_object("[1,2]").is_none());
        assert!(parse_object("I cannot rate this product.").is_none());
    }

    #[test]
    fn embedded_object_is_found_in_prose() {
        let map = parse_embedded_object("Sure! Here you go:\n{\"score\": 4.6}\nHope it helps.").unwrap();
        assert_eq!(map["score"], 4.6);
    }

    #[test]
    fn answer_text_is_read_from_first_candidate() {
        let result = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"eco_score\": 3}" }] } }]
        });
        assert_eq!(answer_text(&result).as_deref(), Some("{\"eco_score\": 3}"));
        assert_eq!(answer_text(&serde_json::json!({ "candidates": [] })), None);
    }

    #[test]
    fn payload_carries_schema_only_when_given() {
        let request = OracleRequest {
            system: Some("be strict".to_string()),
            prompt: "rate it".to_string(),
            response_schema: Some(serde_json::json!({ "type": "object" })),
            temperature: 0.2,
        };
        let payload = GeminiOracle::payload(&request);
        assert_eq!(payload["contents"].as_array().unwrap().len(), 2);
        assert_eq!(payload["generationConfig"]["responseMimeType"], "application/json");

        let bare = GeminiOracle::payload(&OracleRequest {
            system: None,
            response_schema: None,
            ..request
        });
        assert_eq!(bare["contents"].as_array().unwrap().len(), 1);
        assert!(bare["generationConfig"].get("responseSchema").is_none());
    }
}
