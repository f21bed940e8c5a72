use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::DESKTOP_LANGUAGE;
use crate::html_extractor::mentions_renewed;
use crate::model::Candidate;

pub const AMAZON_ORIGIN: &str = "https://www.amazon.com";

/// Body fragments that mean the storefront served a captcha, not results.
pub const BOT_MARKERS: [&str; 3] = [
    "api-services-support@amazon.com",
    "Robot Check",
    "/errors/validateCaptcha",
];

const ID_PARAMS: [&str; 9] = [
    "pid", "productid", "product_id", "id", "item", "itemid", "product_no", "products_id", "main_page",
];

lazy_static! {
    static ref RESULT_SEL: Selector =
        Selector::parse("div[data-component-type='s-search-result']").unwrap();
    static ref RESULT_TITLE_SEL: Selector = Selector::parse("h2").unwrap();
    static ref RESULT_TITLE_LINK_SEL: Selector = Selector::parse("h2 a[href]").unwrap();
    static ref RESULT_ANY_LINK_SEL: Selector = Selector::parse("a[href*='/dp/']").unwrap();
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search returned HTTP {0}")]
    Status(u16),
    #[error("bot detection page returned")]
    BotBlocked,
    #[error("unexpected search payload: {0}")]
    Payload(String),
}

/// Raw provider result, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

pub fn is_bot_blocked(body: &str) -> bool {
    BOT_MARKERS.iter().any(|marker| body.contains(marker))
}

// ==================== URL IDENTITY ====================

fn is_asin(segment: &str) -> bool {
    segment.len() == 10 && segment.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_amazon_host(host: &str) -> bool {
    host.split('.').any(|label| label == "amazon")
}

/// `/dp/<ASIN>` anywhere, `/gp/product/<ASIN>` on storefront hosts only.
fn asin_path(host: &str, segments: &[&str]) -> Option<String> {
    let storefront = is_amazon_host(host);
    segments.iter().enumerate().find_map(|(i, segment)| {
        let asin = *segments.get(i + 1)?;
        let marker = *segment == "dp" || (storefront && *segment == "product" && i > 0 && segments[i - 1] == "gp");
        if marker && is_asin(asin) {
            Some(format!("/dp/{}", asin.to_ascii_uppercase()))
        } else {
            None
        }
    })
}

/// Canonical identity URL for a search result link.
///
/// Relative links are joined to `base`, sponsored redirects are unwrapped,
/// `/dp/<ASIN>` style paths collapse to `/dp/<ASIN>`, fragments are dropped
/// and only product-id query parameters survive.
pub fn canonical_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut parsed = Url::parse(base).ok()?.join(href).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    if parsed.path().starts_with("/sspa/click") {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned());
        if let Some(target) = target {
            parsed = parsed.join(&target).ok()?;
        }
    }

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if let Some(path) = asin_path(&host, &segments) {
        parsed.set_path(&path);
        parsed.set_query(None);
    } else {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| ID_PARAMS.contains(&k.to_lowercase().as_str()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        parsed.set_query(None);
        if !kept.is_empty() {
            let query = kept
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            parsed.set_query(Some(&query));
        }
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

// ==================== AMAZON ====================

/// Reads result cards from a storefront search page.
pub fn parse_search_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let mut hits: Vec<SearchHit> = Vec::new();

    for card in document.select(&RESULT_SEL) {
        if hits.len() >= limit {
            break;
        }
        let title = card
            .select(&RESULT_TITLE_SEL)
            .next()
            .map(|h| h.text().collect::<Vec<_>>().join(" "))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let href = card
            .select(&RESULT_TITLE_LINK_SEL)
            .next()
            .or_else(|| card.select(&RESULT_ANY_LINK_SEL).next())
            .and_then(|a| a.value().attr("href"))
            .unwrap_or("");
        if title.is_empty() || href.is_empty() {
            continue;
        }
        if hits.iter().any(|h| h.url == href) {
            continue;
        }
        hits.push(SearchHit {
            title,
            url: href.to_string(),
        });
    }
    hits
}

pub struct AmazonSearch {
    client: wreq::Client,
    origin: String,
}

impl AmazonSearch {
    pub fn new(client: wreq::Client) -> Self {
        Self {
            client,
            origin: AMAZON_ORIGIN.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for AmazonSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!("{}/s?k={}", self.origin, urlencoding::encode(query));
        let resp = self
            .client
            .get(&url)
            .header("accept-language", DESKTOP_LANGUAGE)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if is_bot_blocked(&html) {
            return Err(SearchError::BotBlocked);
        }

        let hits = parse_search_results(&html, limit);
        if hits.is_empty() {
            warn!(query, bytes = html.len(), "no result cards found, selectors may be stale");
        }
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let url = canonical_url(&self.origin, &h.url)?;
                Some(SearchHit { title: h.title, url })
            })
            .collect())
    }
}

// ==================== SERPAPI ====================

pub fn parse_shopping_results(payload: &serde_json::Value, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
    if let Some(err) = payload.get("error").and_then(|v| v.as_str()) {
        return Err(SearchError::Payload(err.to_string()));
    }
    let results = match payload.get("shopping_results").and_then(|v| v.as_array()) {
        Some(results) => results,
        None => return Ok(Vec::new()),
    };
    Ok(results
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(|v| v.as_str())?.trim();
            let link = item
                .get("product_link")
                .or_else(|| item.get("link"))
                .and_then(|v| v.as_str())?;
            if title.is_empty() {
                return None;
            }
            Some(SearchHit {
                title: title.to_string(),
                url: canonical_url(link, link)?,
            })
        })
        .take(limit)
        .collect())
}

/// Google Shopping results through SerpAPI.
pub struct SerpApiShopping {
    client: wreq::Client,
    api_key: String,
}

impl SerpApiShopping {
    pub fn new(client: wreq::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for SerpApiShopping {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let mut url = Url::parse("https://serpapi.com/search").map_err(|e| SearchError::Transport(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("engine", "google_shopping_light")
            .append_pair("q", query)
            .append_pair("gl", "us")
            .append_pair("hl", "en")
            .append_pair("api_key", &self.api_key);

        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SearchError::Payload(e.to_string()))?;
        parse_shopping_results(&payload, limit)
    }
}

// ==================== RETRIEVER ====================

/// Per-request candidate source. Remembers every URL it has handed out so
/// later queries never repeat a candidate.
pub struct CandidateRetriever<'a> {
    provider: &'a dyn SearchProvider,
    timeout: Duration,
    seen: HashSet<String>,
}

impl<'a> CandidateRetriever<'a> {
    pub fn new(provider: &'a dyn SearchProvider, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            seen: HashSet::new(),
        }
    }

    /// At most `cap` unseen candidates for `query`. Never fails; each query
    /// is tried once.
    pub async fn retrieve(&mut self, query: &str, cap: usize) -> Vec<Candidate> {
        let start = Instant::now();
        // Over-fetch so duplicates from earlier queries don't eat the cap.
        let limit = cap + self.seen.len();
        let hits = match tokio::time::timeout(self.timeout, self.provider.search(query, limit)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(SearchError::BotBlocked)) => {
                warn!(query, "bot detection triggered, treating as no results");
                return Vec::new();
            }
            Ok(Err(e)) => {
                warn!(query, error = %e, "search failed");
                return Vec::new();
            }
            Err(_) => {
                warn!(query, timeout_secs = self.timeout.as_secs(), "search timed out");
                return Vec::new();
            }
        };

        let total = hits.len();
        let mut candidates = Vec::new();
        for hit in hits {
            if candidates.len() >= cap {
                break;
            }
            let title = hit.title.trim();
            if title.is_empty() {
                continue;
            }
            let Some(url) = canonical_url(&hit.url, &hit.url) else {
                debug!(query, url = %hit.url, "dropping hit without a usable link");
                continue;
            };
            if self.seen.contains(&url) {
                debug!(query, url = %url, "skipping candidate seen earlier in this request");
                continue;
            }
            self.seen.insert(url.clone());
            candidates.push(Candidate {
                title: title.to_string(),
                url,
                is_renewed_hint: mentions_renewed(title),
            });
        }
        info!(
            query,
            hits = total,
            candidates = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search finished"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn bot_pages_are_recognized() {
        assert!(is_bot_blocked("<title>Robot Check</title>"));
        assert!(is_bot_blocked("contact api-services-support@amazon.com"));
        assert!(!is_bot_blocked("<div class='s-main-slot'></div>"));
    }

    #[test]
    fn canonical_urls_collapse_to_asin() {
        assert_eq!(
            canonical_url(AMAZON_ORIGIN, "/Eco-Bottle-32oz/dp/B07XJ8C8F5/ref=sr_1_1?keywords=x&qid=1#reviews").as_deref(),
            Some("https://www.amazon.com/dp/B07XJ8C8F5")
        );
        assert_eq!(
            canonical_url(AMAZON_ORIGIN, "/gp/product/b07xj8c8f5?psc=1").as_deref(),
            Some("https://www.amazon.com/dp/B07XJ8C8F5")
        );
        assert_eq!(
            canonical_url(AMAZON_ORIGIN, "/sspa/click?ie=UTF8&url=%2FTote%2Fdp%2FB0000TOTE1%2Fref%3Dsr").as_deref(),
            Some("https://www.amazon.com/dp/B0000TOTE1")
        );
        assert_eq!(
            canonical_url("https://shop.example", "https://shop.example/item?id=7&utm_source=x").as_deref(),
            Some("https://shop.example/item?id=7")
        );
        assert_eq!(canonical_url(AMAZON_ORIGIN, "javascript:void(0)"), None);
        assert_eq!(canonical_url(AMAZON_ORIGIN, "  "), None);
    }

    #[test]
    fn search_cards_are_parsed_in_order() {
        let html = r#"
          <div class="s-main-slot">
            <div data-component-type="s-search-result">
              <h2><a href="/Bamboo-Brush/dp/B000000001/ref=sr_1_1"><span>Bamboo Brush</span></a></h2>
            </div>
            <div data-component-type="s-search-result">
              <h2><span>Steel Bottle (Renewed)</span></h2>
              <a class="a-link-normal" href="/Steel-Bottle/dp/B000000002"><img></a>
            </div>
            <div data-component-type="s-search-result"><h2><span></span></h2></div>
            <div data-component-type="s-search-result">
              <h2><a href="/Third/dp/B000000003"><span>Third</span></a></h2>
            </div>
          </div>"#;
        let hits = parse_search_results(html, 2);
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    title: "Bamboo Brush".into(),
                    url: "/Bamboo-Brush/dp/B000000001/ref=sr_1_1".into()
                },
                SearchHit {
                    title: "Steel Bottle (Renewed)".into(),
                    url: "/Steel-Bottle/dp/B000000002".into()
                },
            ]
        );
    }

    #[test]
    fn shopping_payload_maps_to_hits() {
        let payload = serde_json::json!({
            "shopping_results": [
                {"title": "Organic Tote", "product_link": "https://g.co/p/1"},
                {"title": "", "link": "https://g.co/p/2"},
                {"title": "Hemp Bag", "link": "https://g.co/p/3"},
            ]
        });
        let hits = parse_shopping_results(&payload, 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].url, "https://g.co/p/3");

        let err = parse_shopping_results(&serde_json::json!({"error": "Invalid API key"}), 5);
        assert!(matches!(err, Err(SearchError::Payload(_))));
    }

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<SearchHit>, SearchError>>>,
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            let next = self.responses.lock().unwrap().remove(0);
            next.map(|hits| hits.into_iter().take(limit).collect())
        }
    }

    fn hit(title: &str, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn dedup_happens_before_the_cap() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![
                Ok(vec![hit("A", "https://s.example/u1"), hit("B (Refurbished)", "https://s.example/u2")]),
                Ok(vec![
                    hit("A again", "https://s.example/u1"),
                    hit("B again", "https://s.example/u2"),
                    hit("C", "https://s.example/u3"),
                    hit("D", "https://s.example/u4"),
                ]),
                Err(SearchError::BotBlocked),
            ]),
        };
        let mut retriever = CandidateRetriever::new(&provider, Duration::from_secs(1));

        let first = retriever.retrieve("q1", 2).await;
        assert_eq!(first.len(), 2);
        assert!(first[1].is_renewed_hint);

        let second = retriever.retrieve("q2", 2).await;
        let urls: Vec<&str> = second.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://s.example/u3", "https://s.example/u4"]);

        assert!(retriever.retrieve("q3", 2).await.is_empty());
    }

    struct PerQueryProvider;

    #[async_trait]
    impl SearchProvider for PerQueryProvider {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            if query == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(vec![
                hit("Placeholder", "javascript:void(0)"),
                hit(
                    "Hemp Tote",
                    &format!("https://www.google.com/shopping/product/123?gl=us&q={query}"),
                ),
            ])
        }
    }

    #[tokio::test]
    async fn tracking_parameters_do_not_defeat_dedup() {
        let mut retriever = CandidateRetriever::new(&PerQueryProvider, Duration::from_secs(1));
        let first = retriever.retrieve("tote recycled", 4).await;
        let urls: Vec<&str> = first.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://www.google.com/shopping/product/123"]);
        assert!(retriever.retrieve("tote organic", 4).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_search_is_a_soft_failure() {
        let mut retriever = CandidateRetriever::new(&PerQueryProvider, Duration::from_secs(10));
        assert!(retriever.retrieve("slow", 4).await.is_empty());
        assert_eq!(retriever.retrieve("fast", 4).await.len(), 1);
    }

    #[test]
    fn product_paths_collapse_only_on_storefront_hosts() {
        assert_eq!(
            canonical_url("https://shop.example", "/product/ABCDEFGHIJ?ref=x").as_deref(),
            Some("https://shop.example/product/ABCDEFGHIJ")
        );
        assert_eq!(
            canonical_url("https://www.amazon.co.uk", "/gp/product/abcdefghij").as_deref(),
            Some("https://www.amazon.co.uk/dp/ABCDEFGHIJ")
        );
        assert_eq!(
            canonical_url(AMAZON_ORIGIN, "/product/ABCDEFGHIJ").as_deref(),
            Some("https://www.amazon.com/product/ABCDEFGHIJ")
        );
    }

    #[test]
    fn shopping_links_are_canonicalized() {
        let payload = serde_json::json!({
            "shopping_results": [
                {"title": "Hemp Tote", "product_link": "https://www.google.com/shopping/product/9?gl=us&prds=abc"},
                {"title": "Broken", "link": "not a url"},
            ]
        });
        let hits = parse_shopping_results(&payload, 5).unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                title: "Hemp Tote".into(),
                url: "https://www.google.com/shopping/product/9".into()
            }]
        );
    }
}
