
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ConfigError;

/// Fetches external text snippets for a query.
pub trait SearchProvider {
    fn fetch(&self, query: &str) -> Result<Vec<String>>;
}

impl<T: SearchProvider + ?Sized> SearchProvider for &T {
    #[inline]
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        (**self).fetch(query)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebConfig {
    /// DuckDuckGo Instant Answer endpoint
    pub endpoint: String,
    pub max_snippets: usize,
    pub timeout_secs: u64,
}

impl Default for WebConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "https://api.duckduckgo.com/".to_string(),
            max_snippets: 5,
            timeout_secs: 15,
        }
    }
}

impl WebConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.endpoint).map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))?;
        if !(1..=50).contains(&self.max_snippets) {
            return Err(ConfigError::InvalidMaxSnippets(self.max_snippets));
        }
        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a topic with text or a named group of further topics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

impl RelatedTopic {
    fn collect_text(self, out: &mut Vec<String>) {
        if let Some(text) = self.text.filter(|t| !t.trim().is_empty()) {
            out.push(text);
        }
        for topic in self.topics {
            topic.collect_text(out);
        }
    }
}

/// Snippets from the DuckDuckGo Instant Answer JSON API.
#[derive(Debug, Clone)]
pub struct DuckDuckGoClient {
    endpoint: Url,
    max_snippets: usize,
    agent: ureq::Agent,
}

impl DuckDuckGoClient {
    #[inline]
    pub fn new(config: &WebConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid web search endpoint: {}", config.endpoint))?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();
        Ok(Self {
            endpoint,
            max_snippets: config.max_snippets,
            agent,
        })
    }
}

impl SearchProvider for DuckDuckGoClient {
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        let url = Url::parse_with_params(
            self.endpoint.as_str(),
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .context("Failed to build search URL")?;

        debug!("Fetching web snippets from {}", url);
        let body = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("Web search request failed for {query:?}"))?;

        let answer: InstantAnswer =
            serde_json::from_str(&body).context("Failed to parse web search response")?;

        let mut snippets = Vec::new();
        if !answer.abstract_text.trim().is_empty() {
            snippets.push(answer.abstract_text);
        }
        for topic in answer.related_topics {
            topic.collect_text(&mut snippets);
        }
        snippets.truncate(self.max_snippets);

        debug!("Got {} web snippets for {:?}", snippets.len(), query);
        Ok(snippets)
    }
}
