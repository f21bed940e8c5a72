use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::acceptance::AcceptanceFilter;
use crate::catalog::{CatalogCache, CatalogEntry};
use crate::fetch::PageFetcher;
use crate::html_extractor::DescriptorExtractor;
use crate::model::{Alternative, AlternativeOrigin, Candidate, ProductDescriptor, RatingResult};
use crate::query_planner::plan_queries;
use crate::rating::{CandidateHints, RatingClient};
use crate::search::{CandidateRetriever, SearchProvider};

/// What a source knows about the product it is replacing.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryContext<'a> {
    pub descriptor: &'a ProductDescriptor,
    pub product_name: &'a str,
    pub current_score: u8,
}

/// A way of finding greener substitutes, best first.
#[async_trait]
pub trait AlternativeSource: Send + Sync {
    fn origin(&self) -> AlternativeOrigin;

    /// At most `max` alternatives. Failures shrink the list, never error.
    async fn find(&self, ctx: &DiscoveryContext<'_>, max: usize) -> Vec<Alternative>;
}

// ==================== LIVE SEARCH ====================

/// Planned queries → search → per-candidate page read and rating → filter.
pub struct LiveSearchSource {
    provider: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    rating: RatingClient,
    extractor: Arc<DescriptorExtractor>,
    results_per_query: usize,
    workers: usize,
    search_timeout: Duration,
}

impl LiveSearchSource {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        rating: RatingClient,
        extractor: Arc<DescriptorExtractor>,
    ) -> Self {
        Self {
            provider,
            fetcher,
            rating,
            extractor,
            results_per_query: 4,
            workers: 1,
            search_timeout: Duration::from_secs(10),
        }
    }

    pub fn results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = n;
        self
    }

    /// Candidate ratings in flight per query; results still arrive in
    /// provider order.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    async fn rate(&self, candidate: Candidate) -> (Candidate, RatingResult) {
        let html = self.fetcher.fetch(&candidate.url).await;
        let details = self.extractor.extract(&candidate.url, html.as_deref());
        let hints = CandidateHints {
            name: &candidate.title,
            is_renewed: candidate.is_renewed_hint,
            materials_hint: details.materials_hint.as_deref(),
            product_type: details.product_type.as_deref(),
        };
        let rating = self.rating.rate_candidate(&hints).await;
        debug!(
            candidate = %candidate.title,
            score = rating.score(),
            recycled = %rating.recycled_percentage,
            "candidate rated"
        );
        (candidate, rating)
    }
}

#[async_trait]
impl AlternativeSource for LiveSearchSource {
    fn origin(&self) -> AlternativeOrigin {
        AlternativeOrigin::Live
    }

    async fn find(&self, ctx: &DiscoveryContext<'_>, max: usize) -> Vec<Alternative> {
        let start = Instant::now();
        let filter = AcceptanceFilter::for_current_score(ctx.current_score);
        let queries = plan_queries(ctx.descriptor.product_type.as_deref(), ctx.product_name);
        info!(
            product = ctx.product_name,
            current_score = ctx.current_score,
            target = filter.target(),
            "live search for alternatives"
        );

        let mut retriever = CandidateRetriever::new(self.provider.as_ref(), self.search_timeout);
        let mut accepted: Vec<Alternative> = Vec::new();

        for query in &queries {
            if accepted.len() >= max {
                break;
            }
            let candidates = retriever.retrieve(query, self.results_per_query).await;
            let mut rated = stream::iter(candidates)
                .map(|candidate| self.rate(candidate))
                .buffered(self.workers);

            let mut rejected = 0usize;
            let before = accepted.len();
            while let Some((candidate, rating)) = rated.next().await {
                if !filter.accepts(&rating) {
                    rejected += 1;
                    continue;
                }
                accepted.push(Alternative::from_rated(candidate, rating));
                if accepted.len() >= max {
                    break;
                }
            }
            info!(
                query = %query,
                accepted = accepted.len() - before,
                rejected,
                "query evaluated"
            );
        }

        info!(
            found = accepted.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "live search finished"
        );
        accepted
    }
}

// ==================== CATALOG ====================

pub fn catalog_alternative(entry: &CatalogEntry) -> Alternative {
    Alternative {
        name: entry.name.clone(),
        link: None,
        score: entry.rank.index(),
        score_label: entry.rank,
        materials: entry.materials.clone(),
        recyclability: None,
        recycled_percentage: None,
        biodegradability: None,
        is_renewed: false,
        source: AlternativeOrigin::Catalog,
    }
}

/// Nearest green entries of the curated dataset.
pub struct CatalogSource {
    cache: Arc<CatalogCache>,
}

impl CatalogSource {
    pub fn new(cache: Arc<CatalogCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl AlternativeSource for CatalogSource {
    fn origin(&self) -> AlternativeOrigin {
        AlternativeOrigin::Catalog
    }

    async fn find(&self, ctx: &DiscoveryContext<'_>, max: usize) -> Vec<Alternative> {
        let catalog = match self.cache.get().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "catalog unavailable, no catalog alternatives");
                return Vec::new();
            }
        };
        let found: Vec<Alternative> = catalog
            .suggest(ctx.product_name, max)
            .into_iter()
            .map(|m| catalog_alternative(m.entry))
            .collect();
        info!(product = ctx.product_name, found = found.len(), "catalog matches");
        found
    }
}
