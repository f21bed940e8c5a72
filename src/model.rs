use serde::{Deserialize, Serialize, Serializer};

// ==================== BUCKETS ====================

pub const BUCKET_NAMES: [&str; 7] = [
    "Very Low",
    "Low",
    "Medium-Low",
    "Medium",
    "Medium-High",
    "High",
    "Very High",
];

/// One of the seven ordered environmental levels.
///
/// Scores and catalog rankings are both stored as a bucket, so the numeric
/// score and its label can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EcoBucket {
    VeryLow,
    Low,
    MediumLow,
    Medium,
    MediumHigh,
    High,
    VeryHigh,
}

impl EcoBucket {
    pub const ALL: [EcoBucket; 7] = [
        EcoBucket::VeryLow,
        EcoBucket::Low,
        EcoBucket::MediumLow,
        EcoBucket::Medium,
        EcoBucket::MediumHigh,
        EcoBucket::High,
        EcoBucket::VeryHigh,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// `clamp(round(raw), 0, 6)`. NaN lands in the lowest bucket.
    pub fn from_score(raw: f64) -> Self {
        let rounded = raw.round();
        let index = if rounded.is_nan() || rounded <= 0.0 {
            0
        } else if rounded >= 6.0 {
            6
        } else {
            rounded as usize
        };
        Self::ALL[index]
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        BUCKET_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(label))
            .and_then(Self::from_index)
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        BUCKET_NAMES[self as usize]
    }
}

impl Serialize for EcoBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Answer set shared by recyclability and biodegradability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degree {
    No,
    Yes,
    Partial,
}

impl Degree {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "no" => Some(Degree::No),
            "yes" => Some(Degree::Yes),
            "partial" => Some(Degree::Partial),
            _ => None,
        }
    }
}

// ==================== PRODUCTS ====================

/// Best-effort summary of a product page. Any field may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDescriptor {
    pub title: Option<String>,
    pub is_renewed: bool,
    pub product_type: Option<String>,
    pub materials_hint: Option<String>,
    pub source_url: String,
}

impl ProductDescriptor {
    pub fn empty(source_url: &str) -> Self {
        Self {
            title: None,
            is_renewed: false,
            product_type: None,
            materials_hint: None,
            source_url: source_url.to_string(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or("Amazon product")
    }
}

/// Unrated product surfaced by a search query. `url` is canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub is_renewed_hint: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingResult {
    pub bucket: EcoBucket,
    pub materials: Vec<String>,
    pub recyclability: Degree,
    pub recycled_percentage: String,
    pub biodegradability: Degree,
}

impl RatingResult {
    /// Values used when the oracle gives no usable answer for a candidate.
    pub fn fallback(is_renewed: bool, materials_hint: Option<&str>) -> Self {
        Self {
            bucket: if is_renewed {
                EcoBucket::MediumHigh
            } else {
                EcoBucket::MediumLow
            },
            materials: vec![materials_hint.unwrap_or("unknown").to_string()],
            recyclability: Degree::Partial,
            recycled_percentage: "0%".to_string(),
            biodegradability: Degree::No,
        }
    }

    pub fn score(&self) -> u8 {
        self.bucket.index()
    }

    pub fn label(&self) -> &'static str {
        self.bucket.label()
    }
}

// ==================== OUTPUT ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlternativeOrigin {
    Live,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub score: u8,
    pub score_label: EcoBucket,
    pub materials: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recyclability: Option<Degree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recycled_percentage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biodegradability: Option<Degree>,
    pub is_renewed: bool,
    pub source: AlternativeOrigin,
}

impl Alternative {
    pub fn from_rated(candidate: Candidate, rating: RatingResult) -> Self {
        Self {
            name: candidate.title,
            link: Some(candidate.url),
            score: rating.score(),
            score_label: rating.bucket,
            materials: rating.materials.join(", "),
            recyclability: Some(rating.recyclability),
            recycled_percentage: Some(rating.recycled_percentage),
            biodegradability: Some(rating.biodegradability),
            is_renewed: candidate.is_renewed_hint,
            source: AlternativeOrigin::Live,
        }
    }

    /// URL for live results, name for catalog entries (which have no URL).
    pub fn identity_key(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcoSummary {
    pub score: u8,
    pub label: EcoBucket,
    pub breakdown: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    pub product_name: String,
    pub is_renewed: bool,
    pub product_type: Option<String>,
    pub eco: EcoSummary,
    pub alternatives: Vec<Alternative>,
}

/// Body returned to the caller: either the full response or `{ "error": .. }`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RateOutcome {
    Rated(RateResponse),
    Failed { error: String },
}

impl RateOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, RateOutcome::Failed { .. })
    }
}
