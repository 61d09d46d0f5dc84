//! Rendered article HTML through the MediaWiki parse API.

use std::io::Read;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use super::DocumentSource;
use crate::config::SourceConfig;
use crate::ingest::IngestionError;

pub struct WikipediaSource {
    api_url: String,
    page: String,
    user_agent: String,
    http_client: ureq::Agent,
}

impl WikipediaSource {
    pub fn new(config: &SourceConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            api_url: config.api_url.clone(),
            page: config.page.clone(),
            user_agent: config.user_agent.clone(),
            http_client,
        }
    }

    pub fn request_url(&self) -> String {
        format!(
            "{}?action=parse&page={}&prop=text&format=json&formatversion=2",
            self.api_url,
            urlencoding::encode(&self.page)
        )
    }
}

impl DocumentSource for WikipediaSource {
    fn fetch_markup(&self) -> Result<String, IngestionError> {
        let url = self.request_url();
        debug!("Source: requesting {}", url);
        let response = self
            .http_client
            .get(&url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| {
                warn!("Source: request for '{}' failed: {}", self.page, error);
                IngestionError::SourceUnavailable(format!("Request failed: {error}"))
            })?;

        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| {
                IngestionError::SourceUnavailable(format!("Failed to read response: {error}"))
            })?;
        extract_markup(&body)
    }
}

/// Pulls the article HTML out of a parse API response body.
///
/// Accepts both `formatversion=2` (`parse.text` is a string) and the legacy
/// layout (`parse.text["*"]`).
pub fn extract_markup(body: &str) -> Result<String, IngestionError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|error| IngestionError::MalformedSource(format!("Invalid JSON response: {error}")))?;

    if let Some(error) = json.get("error") {
        let code = error["code"].as_str().unwrap_or("unknown");
        let info = error["info"].as_str().unwrap_or("");
        return Err(IngestionError::MalformedSource(format!(
            "API error {code}: {info}"
        )));
    }

    let text = &json["parse"]["text"];
    text.as_str()
        .or_else(|| text["*"].as_str())
        .map(str::to_string)
        .ok_or_else(|| IngestionError::MalformedSource("Response has no parse.text".to_string()))
}
