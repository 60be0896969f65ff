//! Universal Dictionary pull client
//!
//! The central Universal Dictionary service publishes the master dictionary
//! set; `sync_all` pulls it into the USL layer. Authentication is a Bearer
//! JWT configured alongside the endpoint URL.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum UniversalDictionaryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Universal Dictionary returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Universal Dictionary endpoint is not configured")]
    NotConfigured,
}

/// One dictionary as published by the Universal Dictionary service
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDictionary {
    pub name: String,
    pub version_number: i32,
    #[serde(default)]
    pub is_published: bool,
}

/// One term as published by the Universal Dictionary service
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTerm {
    pub term: String,
    pub data_type: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub term_description: Option<String>,
    #[serde(default)]
    pub expected_values: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// One `{dictionary, dictionary_terms}` entry of the pull payload
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDictionaryEntry {
    pub dictionary: RemoteDictionary,
    #[serde(default)]
    pub dictionary_terms: Vec<RemoteTerm>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    data: Vec<RemoteDictionaryEntry>,
}

/// HTTP client for the Universal Dictionary pull endpoint
pub struct UniversalDictionaryClient {
    client: reqwest::Client,
    url: String,
    jwt: Option<String>,
}

impl UniversalDictionaryClient {
    pub fn new(url: String, jwt: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, url, jwt }
    }

    /// Build a client from settings, if an endpoint is configured
    pub fn from_settings(
        settings: &datamap_common::config::Settings,
    ) -> Option<Self> {
        settings
            .universal_dictionary_url
            .clone()
            .map(|url| Self::new(url, settings.universal_dictionary_jwt.clone()))
    }

    /// Pull the full remote dictionary set
    pub async fn fetch_dictionaries(
        &self,
    ) -> Result<Vec<RemoteDictionaryEntry>, UniversalDictionaryError> {
        debug!(url = %self.url, "Pulling Universal Dictionary set");

        let mut request = self.client.get(&self.url);
        if let Some(jwt) = &self.jwt {
            request = request.bearer_auth(jwt);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UniversalDictionaryError::Status(response.status()));
        }

        let payload: PullResponse = response.json().await?;
        debug!(count = payload.data.len(), "Universal Dictionary pull complete");
        Ok(payload.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_payload_deserializes() {
        let json = r#"
        {
            "data": [
                {
                    "dictionary": {"name": "lab", "version_number": 4, "is_published": true},
                    "dictionary_terms": [
                        {"term": "patient_id", "data_type": "NVARCHAR", "is_required": true},
                        {"term": "result_date", "data_type": "DATETIME",
                         "expected_values": "^\\d{4}-\\d{2}-\\d{2}$"}
                    ]
                }
            ]
        }
        "#;
        let parsed: PullResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 1);

        let entry = &parsed.data[0];
        assert_eq!(entry.dictionary.name, "lab");
        assert_eq!(entry.dictionary.version_number, 4);
        assert!(entry.dictionary.is_published);
        assert_eq!(entry.dictionary_terms.len(), 2);
        assert!(entry.dictionary_terms[0].is_required);
        // Active defaults to true when the service omits the flag
        assert!(entry.dictionary_terms[1].is_active);
    }
}
