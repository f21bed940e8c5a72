use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::model::EcoBucket;

pub const ITEM_COLUMN: &str = "Item";
pub const MATERIALS_COLUMN: &str = "Materials";
pub const RANKING_COLUMN: &str = "Overall environmental ranking";

/// Rank floor for anything the catalog recommends.
pub const GREEN_FLOOR: EcoBucket = EcoBucket::High;
pub const GROUNDING_ENTRIES: usize = 20;
pub const GROUNDING_CHAR_BUDGET: usize = 4000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed catalog: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog is missing column {0:?}")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub materials: String,
    pub rank: EcoBucket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch<'a> {
    pub entry: &'a CatalogEntry,
    pub similarity: f64,
}

/// Read-only curated dataset.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parses the tabular dataset. Rows with an unknown ranking label are
    /// skipped.
    pub fn from_csv(data: &[u8]) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or(CatalogError::MissingColumn(name))
        };
        let item_idx = column(ITEM_COLUMN)?;
        let materials_idx = column(MATERIALS_COLUMN)?;
        let ranking_idx = column(RANKING_COLUMN)?;

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for record in reader.records() {
            let record = record?;
            let name = record.get(item_idx).unwrap_or("").to_string();
            let rank = record.get(ranking_idx).and_then(EcoBucket::from_label);
            match rank {
                Some(rank) if !name.is_empty() => entries.push(CatalogEntry {
                    name,
                    materials: record.get(materials_idx).unwrap_or("").to_string(),
                    rank,
                }),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "catalog rows without a usable name or ranking");
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `count` entries ranked High or better, by Jaccard similarity of
    /// names then by rank. Ties keep catalog order.
    pub fn suggest(&self, target_name: &str, count: usize) -> Vec<CatalogMatch<'_>> {
        let target = tokenize(target_name);
        let mut scored: Vec<CatalogMatch<'_>> = self
            .entries
            .iter()
            .filter(|entry| entry.rank >= GREEN_FLOOR)
            .map(|entry| CatalogMatch {
                similarity: jaccard(&tokenize(&entry.name), &target),
                entry,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.entry.rank.cmp(&a.entry.rank))
        });
        scored.truncate(count);
        scored
    }

    /// JSON excerpt of green entries used to ground the primary rating.
    pub fn grounding_excerpt(&self) -> String {
        #[derive(Serialize)]
        struct Excerpt<'a> {
            name: &'a str,
            ranking: &'static str,
            materials: &'a str,
        }

        let top: Vec<Excerpt<'_>> = self
            .entries
            .iter()
            .filter(|entry| entry.rank >= GREEN_FLOOR)
            .take(GROUNDING_ENTRIES)
            .map(|entry| Excerpt {
                name: &entry.name,
                ranking: entry.rank.label(),
                materials: &entry.materials,
            })
            .collect();
        let json = serde_json::to_string(&top).unwrap_or_default();
        json.chars().take(GROUNDING_CHAR_BUDGET).collect()
    }
}

/// Lower-cased alphanumeric word set.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Load-once holder for the catalog, owned by the pipeline.
pub struct CatalogCache {
    path: PathBuf,
    cell: OnceCell<Arc<Catalog>>,
}

impl CatalogCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    pub fn preloaded(catalog: Catalog) -> Self {
        Self {
            path: PathBuf::new(),
            cell: OnceCell::new_with(Some(Arc::new(catalog))),
        }
    }

    /// Loads on first use. A failed load is not cached, so a later call
    /// retries.
    pub async fn get(&self) -> Result<Arc<Catalog>, CatalogError> {
        let catalog = self
            .cell
            .get_or_try_init(|| async {
                let data = tokio::fs::read(&self.path).await.map_err(|source| CatalogError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                let catalog = Catalog::from_csv(&data)?;
                info!(path = %self.path.display(), entries = catalog.len(), "catalog loaded");
                Ok::<_, CatalogError>(Arc::new(catalog))
            })
            .await?;
        Ok(Arc::clone(catalog))
    }
}
