//! Server configuration from environment variables.

use std::str::FromStr;

use livlib_core::{defaults, Error, Recommendation, Result};

/// Which [`RecommendationSource`](livlib_search::RecommendationSource) to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecommendationKind {
    #[default]
    Live,
    Fixture,
}

impl FromStr for RecommendationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "fixture" => Ok(Self::Fixture),
            other => Err(Error::Config(format!(
                "unknown RECOMMENDATION_SOURCE '{}', expected 'live' or 'fixture'",
                other
            ))),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Postgres URL, or `memory` for the in-memory store.
    pub database_url: String,
    pub recommendation_source: RecommendationKind,
    /// JSON array of recommendations served by the fixture source.
    pub recommendation_fixture_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            database_url: "postgres://localhost/livlib".to_string(),
            recommendation_source: RecommendationKind::Live,
            recommendation_fixture_path: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `DATABASE_URL` | `postgres://localhost/livlib` |
    /// | `RECOMMENDATION_SOURCE` | `live` |
    /// | `RECOMMENDATION_FIXTURE_PATH` | unset (empty fixture) |
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT '{}' is not a valid port", v)))?,
            Err(_) => defaults.port,
        };

        let recommendation_source = match std::env::var("RECOMMENDATION_SOURCE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.recommendation_source,
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            recommendation_source,
            recommendation_fixture_path: std::env::var("RECOMMENDATION_FIXTURE_PATH").ok(),
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }

    /// Read the fixture recommendations, empty when no path is configured.
    pub fn load_fixture(&self) -> Result<Vec<Recommendation>> {
        let Some(path) = &self.recommendation_fixture_path else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path, e)))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_kind_parse() {
        assert_eq!(
            "Fixture".parse::<RecommendationKind>().unwrap(),
            RecommendationKind::Fixture
        );
        assert_eq!(
            " live ".parse::<RecommendationKind>().unwrap(),
            RecommendationKind::Live
        );
        assert!(matches!(
            "random".parse::<RecommendationKind>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_fixture_path_is_empty() {
        let config = ServerConfig::default();
        assert!(config.load_fixture().unwrap().is_empty());
        assert!(!config.uses_memory_store());
    }
}
