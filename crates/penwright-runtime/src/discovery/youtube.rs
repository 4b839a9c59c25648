//! Video discovery through the YouTube Data API search endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use penwright_core::{Discovered, VIDEO_SUBTASK};

use super::ranking::{rank_videos, VideoCandidate};
use super::{DiscoveryConstraints, DiscoveryService};
use crate::http;
use crate::providers::secrets::{ApiCredential, CredentialSpec};
use crate::providers::ProviderError;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

pub const YOUTUBE_KEY: CredentialSpec =
    CredentialSpec::new("api_key", "YOUTUBE_API_KEY", "YouTube API key");

/// Finds one embeddable video for a topic.
#[derive(Debug)]
pub struct YouTubeVideos {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
}

impl YouTubeVideos {
    /// Options: `api_key` (or `YOUTUBE_API_KEY`), `base_url`, `timeout_ms`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: YOUTUBE_KEY.load(options)?,
            base_url: options["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_millis(options["timeout_ms"].as_u64().unwrap_or(15_000)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
}

fn candidates(response: SearchResponse) -> Vec<VideoCandidate> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            Some(VideoCandidate {
                video_id: item.id.video_id?,
                title: item.snippet.title,
                channel: item.snippet.channel_title,
                description: item.snippet.description,
            })
        })
        .collect()
}

#[async_trait]
impl DiscoveryService for YouTubeVideos {
    fn name(&self) -> &str {
        VIDEO_SUBTASK
    }

    async fn discover(
        &self,
        topic: &str,
        constraints: &DiscoveryConstraints,
    ) -> Result<Option<Discovered>, ProviderError> {
        let max_results = constraints.max_results.clamp(1, 50).to_string();
        let mut query = vec![
            ("part", "snippet"),
            ("type", "video"),
            ("videoEmbeddable", "true"),
            ("maxResults", max_results.as_str()),
            ("q", topic),
        ];
        if let Some(language) = &constraints.language {
            query.push(("relevanceLanguage", language.as_str()));
        }

        let builder = http::client()
            .get(format!("{}/search", self.base_url))
            .header("x-goog-api-key", self.credential.expose())
            .query(&query);
        let response = http::send(builder, self.timeout, self.name()).await?;
        let body: SearchResponse = http::read_json(response).await?;

        Ok(rank_videos(topic, candidates(body)).map(Discovered::Video))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_skips_non_videos() {
        let body: SearchResponse = serde_json::from_str(
            r#"{
                "items": [
                    {"id": {"kind": "youtube#channel", "channelId": "c1"}, "snippet": {"title": "A channel"}},
                    {"id": {"kind": "youtube#video", "videoId": "v1"},
                     "snippet": {"title": "Knife skills", "description": "basics", "channelTitle": "Chef"}}
                ]
            }"#,
        )
        .unwrap();

        let found = candidates(body);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].video_id, "v1");
        assert_eq!(found[0].channel, "Chef");
    }

    #[test]
    fn test_from_config() {
        let service = YouTubeVideos::from_config(&serde_json::json!({
            "api_key": "yt-key",
            "timeout_ms": 2000
        }))
        .unwrap();

        assert_eq!(service.name(), "video");
        assert_eq!(service.timeout, Duration::from_secs(2));
        assert!(!format!("{service:?}").contains("yt-key"));
    }
}
