//! Reference discovery through the Serper web search API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use penwright_core::{Discovered, Reference, REFERENCES_SUBTASK};

use super::ranking::select_references;
use super::{DiscoveryConstraints, DiscoveryService};
use crate::http;
use crate::providers::secrets::{ApiCredential, CredentialSpec};
use crate::providers::ProviderError;

const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

pub const SERPER_KEY: CredentialSpec =
    CredentialSpec::new("api_key", "SERPER_API_KEY", "Serper API key");

/// Finds citable references for a topic.
#[derive(Debug)]
pub struct SerperReferences {
    credential: ApiCredential,
    endpoint: String,
    timeout: Duration,
}

impl SerperReferences {
    /// Options: `api_key` (or `SERPER_API_KEY`), `endpoint`, `timeout_ms`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: SERPER_KEY.load(options)?,
            endpoint: options["endpoint"]
                .as_str()
                .unwrap_or(DEFAULT_ENDPOINT)
                .to_string(),
            timeout: Duration::from_millis(options["timeout_ms"].as_u64().unwrap_or(15_000)),
        })
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    hl: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

fn references(response: SearchResponse, constraints: &DiscoveryConstraints) -> Option<Discovered> {
    let results = response
        .organic
        .into_iter()
        .map(|hit| Reference {
            title: hit.title,
            url: hit.link,
            snippet: hit.snippet,
            domain: String::new(),
        })
        .collect();

    let selected = select_references(results, constraints);
    (!selected.is_empty()).then_some(Discovered::References(selected))
}

#[async_trait]
impl DiscoveryService for SerperReferences {
    fn name(&self) -> &str {
        REFERENCES_SUBTASK
    }

    async fn discover(
        &self,
        topic: &str,
        constraints: &DiscoveryConstraints,
    ) -> Result<Option<Discovered>, ProviderError> {
        // Over-fetch: filtering drops excluded and duplicate domains.
        let request = SearchRequest {
            q: topic,
            num: (constraints.max_results * 2).clamp(1, 20),
            hl: constraints.language.as_deref(),
        };

        let builder = http::client()
            .post(&self.endpoint)
            .header("X-API-KEY", self.credential.expose())
            .json(&request);
        let response = http::send(builder, self.timeout, self.name()).await?;
        let body: SearchResponse = http::read_json(response).await?;

        Ok(references(body, constraints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_apply_constraints() {
        let body: SearchResponse = serde_json::from_str(
            r#"{
                "searchParameters": {"q": "bread"},
                "organic": [
                    {"title": "Bread", "link": "https://en.wikipedia.org/wiki/Bread", "snippet": "Bread is"},
                    {"title": "More bread", "link": "https://en.wikipedia.org/wiki/Flour"},
                    {"title": "Pin", "link": "https://www.pinterest.com/x"}
                ]
            }"#,
        )
        .unwrap();
        let constraints = DiscoveryConstraints {
            exclude_domains: vec!["pinterest.com".to_string()],
            ..Default::default()
        };

        match references(body, &constraints) {
            Some(Discovered::References(found)) => {
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].domain, "en.wikipedia.org");
                assert_eq!(found[0].snippet, "Bread is");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_no_usable_results_is_none() {
        let body: SearchResponse = serde_json::from_str(r#"{"organic": []}"#).unwrap();
        assert_eq!(references(body, &DiscoveryConstraints::default()), None);
    }
}
