//! Pure ranking and filtering for discovery candidates.

use std::collections::HashSet;

use penwright_core::{Reference, VideoRef};

use super::DiscoveryConstraints;

/// Words too common to say anything about relevance.
const STOPWORDS: &[&str] = &[
    "and", "are", "for", "from", "how", "into", "its", "the", "that", "this", "what", "when",
    "where", "which", "why", "with", "your", "you",
];

/// A video search hit before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCandidate {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub description: String,
}

/// Lowercased, de-duplicated content words of `topic`.
pub fn topic_terms(topic: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    topic
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Fraction of `terms` that occur in `text` (case-insensitive).
pub fn overlap(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let hits = terms.iter().filter(|term| text.contains(term.as_str())).count();
    hits as f64 / terms.len() as f64
}

/// Pick the candidate that best matches `topic`.
///
/// Title matches weigh twice as much as description matches. Candidates
/// sharing no term with the topic are never returned; ties keep search
/// order.
pub fn rank_videos(topic: &str, candidates: Vec<VideoCandidate>) -> Option<VideoRef> {
    let terms = topic_terms(topic);

    let mut best: Option<(f64, VideoCandidate)> = None;
    for candidate in candidates {
        let score = (2.0 * overlap(&terms, &candidate.title)
            + overlap(&terms, &candidate.description))
            / 3.0;
        if score > 0.0 && best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    best.map(|(score, candidate)| VideoRef {
        url: format!("https://www.youtube.com/watch?v={}", candidate.video_id),
        video_id: candidate.video_id,
        title: candidate.title,
        channel: candidate.channel,
        score,
    })
}

/// Host of `url` without a leading `www.`, lowercased.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Whether `domain` is `excluded` or one of its subdomains.
fn is_excluded(domain: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|blocked| {
        let blocked = blocked.trim().trim_start_matches("www.").to_lowercase();
        !blocked.is_empty()
            && (domain == blocked || domain.ends_with(&format!(".{blocked}")))
    })
}

/// Apply constraints to search results, keeping search order.
///
/// Results with an unparseable URL or an excluded domain are dropped, only
/// the first result per domain is kept and at most `max_results` remain.
pub fn select_references(results: Vec<Reference>, constraints: &DiscoveryConstraints) -> Vec<Reference> {
    let mut seen = HashSet::new();

    results
        .into_iter()
        .filter_map(|mut reference| {
            let domain = domain_of(&reference.url)?;
            if is_excluded(&domain, &constraints.exclude_domains) || !seen.insert(domain.clone()) {
                return None;
            }
            reference.domain = domain;
            Some(reference)
        })
        .take(constraints.max_results)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, title: &str, description: &str) -> VideoCandidate {
        VideoCandidate {
            video_id: id.to_string(),
            title: title.to_string(),
            channel: "chan".to_string(),
            description: description.to_string(),
        }
    }

    fn reference(url: &str) -> Reference {
        Reference {
            title: url.to_string(),
            url: url.to_string(),
            snippet: String::new(),
            domain: String::new(),
        }
    }

    #[test]
    fn test_topic_terms() {
        assert_eq!(
            topic_terms("How to brew the PERFECT espresso, espresso at home"),
            vec!["brew", "perfect", "espresso", "home"]
        );
        assert!(topic_terms("a an of").is_empty());
    }

    #[test]
    fn test_rank_prefers_title_matches() {
        let best = rank_videos(
            "sourdough starter",
            vec![
                video("a", "Bread basics", "all about sourdough starter care"),
                video("b", "Sourdough starter in 5 minutes", ""),
                video("c", "Cat videos", "funny"),
            ],
        )
        .unwrap();

        assert_eq!(best.video_id, "b");
        assert_eq!(best.url, "https://www.youtube.com/watch?v=b");
        assert!(best.score > 0.6);
    }

    #[test]
    fn test_rank_rejects_unrelated_candidates() {
        assert!(rank_videos("sourdough", vec![video("c", "Cat videos", "funny")]).is_none());
        assert!(rank_videos("sourdough", Vec::new()).is_none());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.Example.com/a?b=c").as_deref(), Some("example.com"));
        assert_eq!(domain_of("http://docs.rs/tokio").as_deref(), Some("docs.rs"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_select_references_filters_and_caps() {
        let constraints = DiscoveryConstraints {
            max_results: 2,
            language: None,
            exclude_domains: vec!["pinterest.com".to_string()],
        };
        let selected = select_references(
            vec![
                reference("https://uk.pinterest.com/pin/1"),
                reference("https://www.wikipedia.org/wiki/Bread"),
                reference("https://wikipedia.org/wiki/Yeast"),
                reference("garbage"),
                reference("https://kingarthurbaking.com/recipes"),
                reference("https://seriouseats.com/bread"),
            ],
            &constraints,
        );

        let domains: Vec<&str> = selected.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(domains, vec!["wikipedia.org", "kingarthurbaking.com"]);
    }
}
