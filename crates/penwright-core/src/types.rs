//! Shared data model handed from the orchestrator to content assembly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Subtask name for video discovery.
pub const VIDEO_SUBTASK: &str = "video";

/// Subtask name for reference discovery.
pub const REFERENCES_SUBTASK: &str = "references";

/// Structured article content decoded from the primary provider response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePayload {
    /// Article title
    #[serde(default)]
    pub title: String,

    /// Article body (HTML or Markdown, as produced by the model)
    pub content: String,

    /// Short SEO description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,

    /// Suggested tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Any further fields the model returned
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ArticlePayload {
    /// Create a payload with just a title and body.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            meta_description: None,
            tags: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// A ranked video candidate from video discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    /// Provider-side video identifier
    pub video_id: String,

    /// Video title
    pub title: String,

    /// Channel that published the video
    #[serde(default)]
    pub channel: String,

    /// Watch URL
    pub url: String,

    /// Relevance score assigned during ranking
    #[serde(default)]
    pub score: f64,
}

/// An external reference from reference discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    /// Page title
    pub title: String,

    /// Page URL
    pub url: String,

    /// Search snippet
    #[serde(default)]
    pub snippet: String,

    /// Host the URL points at
    #[serde(default)]
    pub domain: String,
}

/// Value produced by a discovery subtask.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Discovered {
    /// A single ranked video
    Video(VideoRef),

    /// An ordered list of references
    References(Vec<Reference>),
}

/// Per-subtask outcomes, keyed by subtask name.
///
/// Every requested subtask has an entry. `None` means the subtask ran but
/// failed or found nothing; it never means the subtask was skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SubtaskResults(BTreeMap<String, Option<Discovered>>);

impl SubtaskResults {
    /// Create an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a subtask.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<Discovered>) {
        self.0.insert(name.into(), value);
    }

    /// Outcome of a subtask. Outer `None` means the subtask was never requested.
    pub fn get(&self, name: &str) -> Option<&Option<Discovered>> {
        self.0.get(name)
    }

    /// Whether a subtask has an entry.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// The discovered video, if video discovery succeeded.
    pub fn video(&self) -> Option<&VideoRef> {
        match self.0.get(VIDEO_SUBTASK) {
            Some(Some(Discovered::Video(video))) => Some(video),
            _ => None,
        }
    }

    /// The discovered references, if reference discovery succeeded.
    pub fn references(&self) -> Option<&[Reference]> {
        match self.0.get(REFERENCES_SUBTASK) {
            Some(Some(Discovered::References(refs))) => Some(refs),
            _ => None,
        }
    }

    /// Subtask names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of subtasks recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no subtask was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Option<Discovered>)> for SubtaskResults {
    fn from_iter<I: IntoIterator<Item = (String, Option<Discovered>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How the payload was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Generated by the configured primary provider
    Primary,
}

/// Final output of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Healed primary payload
    pub payload: ArticlePayload,

    /// How the payload was produced
    pub method: GenerationMethod,

    /// Provider attempts the primary task needed
    pub attempts: u32,

    /// Wall time from start to join, in milliseconds
    pub elapsed_ms: u64,

    /// Discovery outcomes
    pub subtask_results: SubtaskResults,
}
