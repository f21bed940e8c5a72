use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::EcoError;
use crate::model::{Degree, EcoBucket, ProductDescriptor, RatingResult, BUCKET_NAMES};
use crate::oracle::{parse_embedded_object, parse_object, OracleError, OracleRequest, RatingOracle};

/// Score used when a well-formed primary answer has no numeric `eco_score`.
const PRIMARY_DEFAULT_SCORE: f64 = 3.0;

const PRIMARY_SYSTEM: &str = "You are an environmental impact rater. Respond ONLY as strict JSON \
following the response schema. Estimate values conservatively when unknown.";

/// What is known about an alternative before it is rated.
#[derive(Debug, Clone, Copy)]
pub struct CandidateHints<'a> {
    pub name: &'a str,
    pub is_renewed: bool,
    pub materials_hint: Option<&'a str>,
    pub product_type: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryRating {
    pub bucket: EcoBucket,
    /// The oracle's parsed answer, passed through untouched.
    pub breakdown: Value,
}

pub fn primary_schema() -> Value {
    let bucket = serde_json::json!({ "type": "string", "enum": BUCKET_NAMES });
    let degree = serde_json::json!({ "type": "string", "enum": ["No", "Yes", "Partial"] });
    serde_json::json!({
        "type": "object",
        "properties": {
            "materials": { "type": "array", "items": { "type": "string" } },
            "recyclability": degree,
            "biodegradability": degree,
            "energy_consumption": bucket,
            "electricity_usage": bucket,
            "gasoline_usage": bucket,
            "water_usage": bucket,
            "emission_levels": bucket,
            "recycled_materials_percentage": { "type": "string" },
            "toxicity": bucket,
            "eco_score": { "type": "number" }
        },
        "required": [
            "materials",
            "recyclability",
            "biodegradability",
            "recycled_materials_percentage",
            "eco_score"
        ]
    })
}

fn primary_prompt(descriptor: &ProductDescriptor, name: &str, grounding: Option<&str>) -> String {
    let mut prompt = format!(
        "Rate the environmental friendliness of this product and return eco_score on a 0-6 scale \
         (0 Very Low ... 6 Very High).\nProduct name: {name}\nHints: isRenewed={}; productType={}; materialsHint={}",
        descriptor.is_renewed,
        descriptor.product_type.as_deref().unwrap_or("unknown"),
        descriptor.materials_hint.as_deref().unwrap_or("unknown"),
    );
    if let Some(grounding) = grounding.filter(|g| !g.is_empty()) {
        prompt.push_str("\nCatalog summary of similar highly rated items: ");
        prompt.push_str(grounding);
    }
    prompt
}

fn candidate_prompt(hints: &CandidateHints<'_>) -> String {
    format!(
        "Rate the environmental impact of this product on a 0-6 scale \
         (0 = Very Low, bad for the environment; 6 = Very High, good for the environment).\n\n\
         Product: {}\n\
         Is Renewed/Refurbished: {}\n\
         Materials hint: {}\n\
         Product type: {}\n\n\
         Consider:\n\
         - share of recycled materials (higher is better)\n\
         - new vs renewed/refurbished (renewed is better)\n\
         - sustainability of the materials (organic cotton over polyester, bamboo over plastic)\n\
         - energy used in production\n\
         - recyclability and biodegradability\n\n\
         Return JSON with: eco_score (0-6), materials (array), recyclability (No/Yes/Partial), \
         recycled_materials_percentage (string like \"0%\", \"50%\"), biodegradability (No/Yes/Partial)",
        hints.name,
        if hints.is_renewed { "Yes" } else { "No" },
        hints.materials_hint.unwrap_or("unknown"),
        hints.product_type.unwrap_or("unknown"),
    )
}

fn raw_score(answer: &Map<String, Value>) -> Option<f64> {
    answer
        .get("eco_score")
        .or_else(|| answer.get("score"))
        .and_then(Value::as_f64)
}

fn degree_field(answer: &Map<String, Value>, key: &str) -> Option<Degree> {
    answer.get(key).and_then(Value::as_str).and_then(Degree::parse)
}

/// Normalizes a candidate answer. `None` when there is no numeric score.
pub fn rating_from_answer(answer: &Map<String, Value>, hints: &CandidateHints<'_>) -> Option<RatingResult> {
    let score = raw_score(answer)?;
    let fallback = RatingResult::fallback(hints.is_renewed, hints.materials_hint);

    let materials: Vec<String> = answer
        .get("materials")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .filter(|m: &Vec<String>| !m.is_empty())
        .unwrap_or(fallback.materials);

    let recycled_percentage = answer
        .get("recycled_materials_percentage")
        .or_else(|| answer.get("recycled_percentage"))
        .and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(format!("{n}%")),
            _ => None,
        })
        .unwrap_or(fallback.recycled_percentage);

    Some(RatingResult {
        bucket: EcoBucket::from_score(score),
        materials,
        recyclability: degree_field(answer, "recyclability").unwrap_or(fallback.recyclability),
        recycled_percentage,
        biodegradability: degree_field(answer, "biodegradability").unwrap_or(fallback.biodegradability),
    })
}

/// Wraps the oracle with prompts, time bounds and answer normalization.
#[derive(Clone)]
pub struct RatingClient {
    oracle: Arc<dyn RatingOracle>,
    timeout: Duration,
}

impl RatingClient {
    pub fn new(oracle: Arc<dyn RatingOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    async fn ask(&self, request: &OracleRequest) -> Result<String, OracleError> {
        match tokio::time::timeout(self.timeout, self.oracle.generate(request)).await {
            Ok(answer) => answer,
            Err(_) => Err(OracleError::Timeout),
        }
    }

    /// Rates the product the caller asked about. Any failure here fails the
    /// request.
    pub async fn rate_primary(
        &self,
        descriptor: &ProductDescriptor,
        name: &str,
        grounding: Option<&str>,
    ) -> Result<PrimaryRating, EcoError> {
        let start = Instant::now();
        let request = OracleRequest {
            system: Some(PRIMARY_SYSTEM.to_string()),
            prompt: primary_prompt(descriptor, name, grounding),
            response_schema: Some(primary_schema()),
            temperature: 0.2,
        };

        let text = match self.ask(&request).await {
            Ok(text) => text,
            Err(OracleError::EmptyAnswer) => {
                return Err(EcoError::OracleMalformed("empty answer".to_string()));
            }
            Err(e) => return Err(EcoError::OracleUnavailable(e.to_string())),
        };
        let answer = parse_object(&text).ok_or_else(|| {
            let snippet: String = text.chars().take(200).collect();
            EcoError::OracleMalformed(snippet)
        })?;

        let score = raw_score(&answer).unwrap_or(PRIMARY_DEFAULT_SCORE);
        let bucket = EcoBucket::from_score(score);
        info!(
            product = name,
            raw_score = score,
            score = bucket.index(),
            label = bucket.label(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "primary product rated"
        );
        Ok(PrimaryRating {
            bucket,
            breakdown: Value::Object(answer),
        })
    }

    /// Rates an alternative. Never fails: transport errors, timeouts and
    /// unusable answers all produce the deterministic fallback.
    pub async fn rate_candidate(&self, hints: &CandidateHints<'_>) -> RatingResult {
        let request = OracleRequest {
            system: None,
            prompt: candidate_prompt(hints),
            response_schema: None,
            temperature: 0.3,
        };

        let rating = match self.ask(&request).await {
            Ok(text) => parse_embedded_object(&text).and_then(|answer| rating_from_answer(&answer, hints)),
            Err(e) => {
                warn!(candidate = hints.name, error = %e, "candidate rating failed, using fallback");
                None
            }
        };
        rating.unwrap_or_else(|| RatingResult::fallback(hints.is_renewed, hints.materials_hint))
    }
}
