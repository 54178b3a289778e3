//! Runtime configuration of the document API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DocumentStoreResult;

/// Tunables shared by the query and mutation services and the response envelope.
///
/// Every field has a default, so partial JSON configuration is accepted:
///
/// ```ignore
/// let config = ApiConfig::from_json_str(r#"{"max_page_length": 500}"#)?;
/// assert_eq!(config.default_page_length, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Page size used by list queries that do not name one.
    pub default_page_length: usize,
    /// Upper bound on a caller-requested page size. Unbounded when `None`.
    pub max_page_length: Option<usize>,
    /// Largest batch accepted by `insert_many_documents`.
    pub max_batch_insert: usize,
    /// Lifetime of cached unfiltered counts, in seconds.
    pub count_cache_ttl: u64,
    /// Attach the error chain to failure envelopes.
    pub include_traceback: bool,
    /// Map error kinds to distinct response codes instead of a uniform 500.
    pub distinct_response_codes: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_length: 20,
            max_page_length: None,
            max_batch_insert: 200,
            count_cache_ttl: 86_400,
            include_traceback: true,
            distinct_response_codes: false,
        }
    }
}

impl ApiConfig {
    pub fn builder() -> ApiConfigBuilder {
        ApiConfigBuilder::default()
    }

    /// Parses a configuration from JSON text; omitted keys keep their defaults.
    pub fn from_json_str(text: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn count_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.count_cache_ttl)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiConfigBuilder {
    config: ApiConfig,
}

impl ApiConfigBuilder {
    pub fn default_page_length(mut self, length: usize) -> Self {
        self.config.default_page_length = length;
        self
    }

    pub fn max_page_length(mut self, length: usize) -> Self {
        self.config.max_page_length = Some(length);
        self
    }

    pub fn max_batch_insert(mut self, size: usize) -> Self {
        self.config.max_batch_insert = size;
        self
    }

    pub fn count_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.count_cache_ttl = ttl.as_secs();
        self
    }

    pub fn include_traceback(mut self, include: bool) -> Self {
        self.config.include_traceback = include;
        self
    }

    pub fn distinct_response_codes(mut self, distinct: bool) -> Self {
        self.config.distinct_response_codes = distinct;
        self
    }

    pub fn build(self) -> ApiConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentStoreError;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ApiConfig::from_json_str(r#"{"max_page_length": 500, "include_traceback": false}"#).unwrap();

        assert_eq!(config.max_page_length, Some(500));
        assert!(!config.include_traceback);
        assert_eq!(config.default_page_length, 20);
        assert_eq!(config.max_batch_insert, 200);
        assert_eq!(config.count_cache_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(matches!(
            ApiConfig::from_json_str("{"),
            Err(DocumentStoreError::Decode(_))
        ));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ApiConfig::builder()
            .max_batch_insert(2)
            .distinct_response_codes(true)
            .build();

        assert_eq!(config.max_batch_insert, 2);
        assert!(config.distinct_response_codes);
        assert!(config.include_traceback);
    }
}
