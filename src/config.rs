use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EcoError;

pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, EcoError> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| EcoError::config(format!("{name} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

/// Which alternative sources the pipeline runs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Live,
    Catalog,
    /// Live search first, catalog matches fill whatever is left.
    Chained,
}

impl FromStr for Strategy {
    type Err = EcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Strategy::Live),
            "catalog" => Ok(Strategy::Catalog),
            "chained" => Ok(Strategy::Chained),
            other => Err(EcoError::config(format!("unknown strategy {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Amazon,
    SerpApi,
}

impl FromStr for SearchBackend {
    type Err = EcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(SearchBackend::Amazon),
            "serpapi" => Ok(SearchBackend::SerpApi),
            other => Err(EcoError::config(format!("unknown search backend {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub serpapi_key: Option<String>,
    pub catalog_path: PathBuf,
    pub strategy: Strategy,
    pub search_backend: SearchBackend,
    pub max_alternatives: usize,
    pub results_per_query: usize,
    /// In-flight candidate ratings per query. 1 keeps discovery sequential.
    pub rating_workers: usize,
    pub fetch_timeout: Duration,
    pub search_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            serpapi_key: None,
            catalog_path: PathBuf::from("data/dataset.csv"),
            strategy: Strategy::Chained,
            search_backend: SearchBackend::Amazon,
            max_alternatives: 4,
            results_per_query: 4,
            rating_workers: 1,
            fetch_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(10),
            oracle_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Reads `.env` (when present) and the process environment.
    pub fn from_env() -> Result<Self, EcoError> {
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();

        let strategy = match env_var("ECO_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => defaults.strategy,
        };
        let search_backend = match env_var("ECO_SEARCH_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.search_backend,
        };

        let settings = Settings {
            gemini_api_key: env_var("GEMINI_API_KEY").or_else(|| env_var("GENAI_API_KEY")),
            gemini_model: env_var("GEMINI_MODEL_ID").unwrap_or(defaults.gemini_model),
            serpapi_key: env_var("SERPAPI_KEY"),
            catalog_path: env_var("ECO_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            strategy,
            search_backend,
            max_alternatives: env_parse("ECO_MAX_ALTERNATIVES", defaults.max_alternatives)?,
            results_per_query: env_parse("ECO_RESULTS_PER_QUERY", defaults.results_per_query)?,
            rating_workers: env_parse("ECO_RATING_WORKERS", defaults.rating_workers)?.max(1),
            fetch_timeout: Duration::from_secs(env_parse("ECO_FETCH_TIMEOUT_SECS", 10u64)?),
            search_timeout: Duration::from_secs(env_parse("ECO_SEARCH_TIMEOUT_SECS", 10u64)?),
            oracle_timeout: Duration::from_secs(env_parse("ECO_ORACLE_TIMEOUT_SECS", 10u64)?),
        };

        if settings.search_backend == SearchBackend::SerpApi && settings.serpapi_key.is_none() {
            return Err(EcoError::config("ECO_SEARCH_BACKEND=serpapi requires SERPAPI_KEY"));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_and_backend_parse() {
        assert_eq!("Chained".parse::<Strategy>().unwrap(), Strategy::Chained);
        assert_eq!(" catalog ".parse::<Strategy>().unwrap(), Strategy::Catalog);
        assert!("agentic".parse::<Strategy>().is_err());
        assert_eq!("serpapi".parse::<SearchBackend>().unwrap(), SearchBackend::SerpApi);
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_alternatives, 4);
        assert_eq!(settings.results_per_query, 4);
        assert_eq!(settings.rating_workers, 1);
        assert_eq!(settings.oracle_timeout, Duration::from_secs(10));
        assert_eq!(settings.gemini_model, DEFAULT_MODEL);
    }

    #[test]
    fn unparsable_numbers_are_config_errors() {
        std::env::set_var("ECO_TEST_WORKER_COUNT", "many");
        let err = env_parse("ECO_TEST_WORKER_COUNT", 1usize).unwrap_err();
        assert!(matches!(err, EcoError::Config(_)));
        assert!(err.to_string().contains("ECO_TEST_WORKER_COUNT"));

        std::env::set_var("ECO_TEST_WORKER_COUNT", " 3 ");
        assert_eq!(env_parse("ECO_TEST_WORKER_COUNT", 1usize).unwrap(), 3);

        std::env::remove_var("ECO_TEST_WORKER_COUNT");
        assert_eq!(env_parse("ECO_TEST_WORKER_COUNT", 7usize).unwrap(), 7);
    }

    #[test]
    fn serpapi_backend_requires_a_key() {
        std::env::set_var("ECO_SEARCH_BACKEND", "serpapi");
        std::env::remove_var("SERPAPI_KEY");
        let result = Settings::from_env();
        std::env::remove_var("ECO_SEARCH_BACKEND");
        assert!(matches!(result, Err(EcoError::Config(_))));
    }
}
