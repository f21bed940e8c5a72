use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::assembler::Assembler;
use crate::catalog::CatalogCache;
use crate::config::{SearchBackend, Settings, Strategy};
use crate::error::EcoError;
use crate::fetch::{browser_client, BrowserFetcher, PageFetcher};
use crate::html_extractor::DescriptorExtractor;
use crate::model::{EcoSummary, RateOutcome, RateRequest, RateResponse};
use crate::oracle::{GeminiOracle, RatingOracle};
use crate::rating::RatingClient;
use crate::search::{AmazonSearch, SearchProvider, SerpApiShopping};
use crate::sources::{AlternativeSource, CatalogSource, DiscoveryContext, LiveSearchSource};

/// External collaborators the pipeline talks to.
pub struct Components {
    pub fetcher: Arc<dyn PageFetcher>,
    pub search: Arc<dyn SearchProvider>,
    pub oracle: Arc<dyn RatingOracle>,
    pub catalog: Arc<CatalogCache>,
}

impl Components {
    /// Real network clients built from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, EcoError> {
        let api_client = wreq::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| EcoError::Http(e.to_string()))?;
        let browser = browser_client()?;

        let search: Arc<dyn SearchProvider> = match settings.search_backend {
            SearchBackend::Amazon => Arc::new(AmazonSearch::new(browser.clone())),
            SearchBackend::SerpApi => {
                let key = settings
                    .serpapi_key
                    .clone()
                    .ok_or_else(|| EcoError::config("Missing SERPAPI_KEY env var"))?;
                Arc::new(SerpApiShopping::new(api_client.clone(), key))
            }
        };
        let oracle = GeminiOracle::new(
            api_client,
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        )?;

        Ok(Self {
            fetcher: Arc::new(BrowserFetcher::new(browser, settings.fetch_timeout)),
            search,
            oracle: Arc::new(oracle),
            catalog: Arc::new(CatalogCache::new(settings.catalog_path.clone())),
        })
    }
}

/// Composition root: extract → rate primary → discover → assemble.
pub struct EcoPipeline {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<DescriptorExtractor>,
    rating: RatingClient,
    catalog: Arc<CatalogCache>,
    sources: Vec<Box<dyn AlternativeSource>>,
    max_alternatives: usize,
}

impl EcoPipeline {
    pub fn from_settings(settings: &Settings) -> Result<Self, EcoError> {
        Ok(Self::with_components(settings, Components::from_settings(settings)?))
    }

    pub fn with_components(settings: &Settings, components: Components) -> Self {
        let extractor = Arc::new(DescriptorExtractor::default());
        let rating = RatingClient::new(components.oracle, settings.oracle_timeout);

        let live = || -> Box<dyn AlternativeSource> {
            Box::new(
                LiveSearchSource::new(
                    Arc::clone(&components.search),
                    Arc::clone(&components.fetcher),
                    rating.clone(),
                    Arc::clone(&extractor),
                )
                .results_per_query(settings.results_per_query)
                .workers(settings.rating_workers)
                .search_timeout(settings.search_timeout),
            )
        };
        let catalog = || -> Box<dyn AlternativeSource> {
            Box::new(CatalogSource::new(Arc::clone(&components.catalog)))
        };
        let sources = match settings.strategy {
            Strategy::Live => vec![live()],
            Strategy::Catalog => vec![catalog()],
            Strategy::Chained => vec![live(), catalog()],
        };

        Self {
            fetcher: components.fetcher,
            extractor,
            rating,
            catalog: components.catalog,
            sources,
            max_alternatives: settings.max_alternatives,
        }
    }

    /// Rates one product URL and finds greener alternatives for it.
    pub async fn rate(&self, url: &str) -> Result<RateResponse, EcoError> {
        let start = Instant::now();
        let url = url.trim();
        if url.is_empty() {
            return Err(EcoError::InvalidRequest("Missing url".to_string()));
        }
        info!(url, "rating request");

        let html = self.fetcher.fetch(url).await;
        let descriptor = self.extractor.extract(url, html.as_deref());
        let product_name = descriptor.display_name().to_string();
        info!(
            product = %product_name,
            is_renewed = descriptor.is_renewed,
            product_type = ?descriptor.product_type,
            materials_hint = ?descriptor.materials_hint,
            "descriptor extracted"
        );

        let grounding = match self.catalog.get().await {
            Ok(catalog) => Some(catalog.grounding_excerpt()),
            Err(e) => {
                warn!(error = %e, "catalog unavailable, rating without grounding");
                None
            }
        };
        let primary = self
            .rating
            .rate_primary(&descriptor, &product_name, grounding.as_deref())
            .await?;

        let ctx = DiscoveryContext {
            descriptor: &descriptor,
            product_name: &product_name,
            current_score: primary.bucket.index(),
        };
        let mut assembler = Assembler::new(self.max_alternatives);
        for source in &self.sources {
            if assembler.is_full() {
                break;
            }
            let found = source.find(&ctx, assembler.remaining()).await;
            let offered = found.len();
            let kept = assembler.extend(found);
            info!(source = ?source.origin(), offered, kept, "alternatives merged");
        }
        let alternatives = assembler.finish();

        info!(
            product = %product_name,
            score = primary.bucket.index(),
            alternatives = alternatives.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rating request finished"
        );
        Ok(RateResponse {
            product_name,
            is_renewed: descriptor.is_renewed,
            product_type: descriptor.product_type.clone(),
            eco: EcoSummary {
                score: primary.bucket.index(),
                label: primary.bucket,
                breakdown: primary.breakdown,
            },
            alternatives,
        })
    }

    /// Request surface: a response body or an error object.
    pub async fn handle(&self, request: RateRequest) -> RateOutcome {
        match self.rate(&request.url).await {
            Ok(response) => RateOutcome::Rated(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "rating request failed");
                RateOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Like [`handle`](Self::handle), but the whole request must finish
    /// within `deadline`.
    pub async fn handle_with_deadline(&self, request: RateRequest, deadline: Duration) -> RateOutcome {
        let url = request.url.clone();
        match tokio::time::timeout(deadline, self.handle(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let e = EcoError::Timeout(deadline);
                warn!(url = %url, error = %e, "rating request hit its deadline");
                RateOutcome::Failed { error: e.to_string() }
            }
        }
    }
}

/// Converts a caller-supplied deadline in seconds. Negative and NaN values
/// mean "no time at all"; values too large for a `Duration` are rejected.
pub fn deadline_from_secs(secs: f64) -> Result<Duration, EcoError> {
    let secs = if secs.is_nan() { 0.0 } else { secs.max(0.0) };
    Duration::try_from_secs_f64(secs).map_err(|e| EcoError::InvalidRequest(format!("timeout_secs {secs}: {e}")))
}
