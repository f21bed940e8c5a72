use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::EcoError;

pub const DESKTOP_LANGUAGE: &str = "en-US,en;q=0.9";
const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36";
const MAX_REDIRECTS: usize = 3;

/// Fetches raw page markup. `None` means the page could not be read.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Browser-emulating fetcher used for storefront pages.
pub struct BrowserFetcher {
    client: wreq::Client,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(client: wreq::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn fetch_following_redirects(&self, original_url: &str) -> Option<String> {
        let mut current_url = original_url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let mut resp = self
                .client
                .get(&current_url)
                .header("accept-language", DESKTOP_LANGUAGE)
                .send()
                .await
                .ok()?;
            let mut status = resp.status();

            if status.as_u16() == 403 {
                debug!(url = %current_url, "HTTP 403, retrying with mobile UA");
                resp = self
                    .client
                    .get(&current_url)
                    .header("User-Agent", MOBILE_UA)
                    .header("accept-language", DESKTOP_LANGUAGE)
                    .send()
                    .await
                    .ok()?;
                status = resp.status();
            }

            if status.is_success() {
                return resp.text().await.ok();
            }

            let code = status.as_u16();
            if (300..400).contains(&code) {
                let location = resp
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match location {
                    Some(loc) => {
                        let next_url = resolve_location(&current_url, &loc);
                        debug!(from = %current_url, to = %next_url, "following redirect");
                        current_url = next_url;
                        continue;
                    }
                    None => {
                        warn!(url = %current_url, code, "redirect without usable Location header");
                        return None;
                    }
                }
            }

            warn!(url = %current_url, code, "page fetch failed");
            return None;
        }

        warn!(url = %original_url, "exceeded redirect limit");
        None
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let start = Instant::now();
        let body = match tokio::time::timeout(self.timeout, self.fetch_following_redirects(url)).await {
            Ok(body) => body,
            Err(_) => {
                warn!(url, timeout_secs = self.timeout.as_secs(), "page fetch timed out");
                None
            }
        };
        info!(
            url,
            bytes = body.as_ref().map(|b| b.len()).unwrap_or(0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "page fetch finished"
        );
        body
    }
}

/// Chrome-emulating client shared by page and search fetches. Redirects are
/// left to [`BrowserFetcher`] so the hop limit is ours.
pub fn browser_client() -> Result<wreq::Client, EcoError> {
    wreq::Client::builder()
        .emulation(wreq_util::Emulation::Chrome131)
        .redirect(wreq::redirect::Policy::none())
        .build()
        .map_err(|e| EcoError::Http(e.to_string()))
}

/// Resolves a relative redirect target against the current URL.
pub fn resolve_location(current_url: &str, location: &str) -> String {
    match Url::parse(current_url).and_then(|base| base.join(location)) {
        Ok(u) => u.to_string(),
        Err(_) => location.to_string(),
    }
}
