//! Discovery services: auxiliary lookups that decorate an article.
//!
//! A discovery service answers one question about a topic (a video to
//! embed, references to cite) and may come back empty. The orchestrator
//! runs each service as an independent subtask keyed by
//! [`DiscoveryService::name`]; any failure becomes a `null` entry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use penwright_core::Discovered;

use crate::providers::ProviderError;

pub mod ranking;

#[cfg(feature = "discovery")]
mod serper;
#[cfg(feature = "discovery")]
mod youtube;

#[cfg(feature = "discovery")]
pub use serper::SerperReferences;
#[cfg(feature = "discovery")]
pub use youtube::YouTubeVideos;

/// Limits applied to every discovery lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConstraints {
    /// Upper bound on candidates requested and returned
    pub max_results: usize,

    /// Preferred content language (ISO 639-1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Domains never returned as references (subdomains included)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl Default for DiscoveryConstraints {
    fn default() -> Self {
        Self {
            max_results: 5,
            language: None,
            exclude_domains: Vec::new(),
        }
    }
}

/// A lookup that finds supporting material for a topic.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Subtask name, also the dependency name it is guarded under.
    fn name(&self) -> &str;

    /// Find the best candidate for `topic`; `Ok(None)` when nothing fits.
    async fn discover(
        &self,
        topic: &str,
        constraints: &DiscoveryConstraints,
    ) -> Result<Option<Discovered>, ProviderError>;
}

/// Build the services named in configuration.
///
/// Known adapters: `youtube` (video subtask) and `serper` (references
/// subtask).
#[cfg(feature = "discovery")]
pub fn build_services(
    services: &std::collections::BTreeMap<String, serde_json::Value>,
) -> Result<Vec<std::sync::Arc<dyn DiscoveryService>>, ProviderError> {
    use std::sync::Arc;

    services
        .iter()
        .map(|(adapter, options)| -> Result<Arc<dyn DiscoveryService>, ProviderError> {
            match adapter.as_str() {
                "youtube" => Ok(Arc::new(YouTubeVideos::from_config(options)?)),
                "serper" => Ok(Arc::new(SerperReferences::from_config(options)?)),
                other => Err(ProviderError::NotConfigured(format!(
                    "Unknown discovery adapter: '{other}'. Available: [\"serper\", \"youtube\"]"
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraints_defaults() {
        let constraints: DiscoveryConstraints =
            serde_yaml::from_str("exclude_domains: [pinterest.com]").unwrap();
        assert_eq!(constraints.max_results, 5);
        assert_eq!(constraints.language, None);
        assert_eq!(constraints.exclude_domains, vec!["pinterest.com"]);
    }

    #[cfg(feature = "discovery")]
    #[test]
    fn test_build_services_rejects_unknown_adapter() {
        let mut services = std::collections::BTreeMap::new();
        services.insert("bing".to_string(), serde_json::json!({}));

        let error = build_services(&services).err().unwrap();
        assert!(error.to_string().contains("bing"));
    }
}
