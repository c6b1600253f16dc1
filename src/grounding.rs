//! Factual context fetcher.
//!
//! Decides whether a query warrants factual grounding (a fixed keyword
//! allow-list) and, if so, performs a search-then-fetch against the MediaWiki
//! API: search for the query, take the top result title, fetch that article's
//! plain-text extract, and return it trimmed with a verified-topic marker.
//!
//! This module must never fail the main request: every error path (no
//! results, disambiguation dead end, network, parsing) degrades to `None`
//! and generation proceeds ungrounded.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::GroundingConfig;
use crate::models::GroundingContext;

/// Queries containing any of these terms are considered to need verified
/// reference data rather than purely conceptual explanation.
const FACTUAL_KEYWORDS: &[&str] = &[
    "who",
    "when",
    "where",
    "age",
    "born",
    "stats",
    "record",
    "population",
    "president",
    "prime minister",
    "version",
    "release",
    "latest",
    "data",
    "information",
];

/// Case-insensitive substring match against the fixed keyword allow-list.
pub fn needs_factual_context(text: &str) -> bool {
    let text = text.to_lowercase();
    FACTUAL_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Fetch best-effort reference text for a query.
///
/// Returns `None` on every failure path; callers degrade to ungrounded
/// generation.
pub async fn fetch_context(config: &GroundingConfig, query: &str) -> Option<GroundingContext> {
    match fetch_context_inner(config, query).await {
        Ok(context) => context,
        Err(e) => {
            tracing::debug!("reference fetch failed for {:?}: {}", query, e);
            None
        }
    }
}

async fn fetch_context_inner(
    config: &GroundingConfig,
    query: &str,
) -> Result<Option<GroundingContext>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .build()?;

    let titles = search_titles(&client, config, query).await?;
    if titles.is_empty() {
        return Ok(None);
    }

    // Best match first; a disambiguation page falls through to the next
    // search candidate.
    for title in &titles {
        match fetch_extract(&client, config, title).await? {
            Extract::Article(body) if !body.trim().is_empty() => {
                let body: String = body.chars().take(config.max_context_chars).collect();
                return Ok(Some(GroundingContext {
                    title: title.clone(),
                    body,
                }));
            }
            _ => continue,
        }
    }

    Ok(None)
}

/// Search the reference corpus and return candidate article titles, best
/// match first.
async fn search_titles(
    client: &reqwest::Client,
    config: &GroundingConfig,
    query: &str,
) -> Result<Vec<String>> {
    let response = client
        .get(&config.reference_api_url)
        .query(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", query),
            ("srlimit", "3"),
            ("format", "json"),
        ])
        .header("User-Agent", "docsmith/0.3 (reference fetch)")
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("reference search returned {}", response.status());
    }

    let json: serde_json::Value = response.json().await?;
    let results = json["query"]["search"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit["title"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(results)
}

enum Extract {
    Article(String),
    Disambiguation,
    Missing,
}

/// Fetch the plain-text extract of one article.
async fn fetch_extract(
    client: &reqwest::Client,
    config: &GroundingConfig,
    title: &str,
) -> Result<Extract> {
    let response = client
        .get(&config.reference_api_url)
        .query(&[
            ("action", "query"),
            ("prop", "extracts|pageprops"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", title),
            ("format", "json"),
        ])
        .header("User-Agent", "docsmith/0.3 (reference fetch)")
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("reference fetch returned {}", response.status());
    }

    let json: serde_json::Value = response.json().await?;
    let Some(pages) = json["query"]["pages"].as_object() else {
        return Ok(Extract::Missing);
    };

    for (page_id, page) in pages {
        if page_id == "-1" {
            return Ok(Extract::Missing);
        }
        if page["pageprops"].get("disambiguation").is_some() {
            return Ok(Extract::Disambiguation);
        }
        if let Some(extract) = page["extract"].as_str() {
            return Ok(Extract::Article(extract.to_string()));
        }
    }

    Ok(Extract::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factual_keywords_trigger_grounding() {
        assert!(needs_factual_context("Who is the president of France?"));
        assert!(needs_factual_context("latest rust release"));
        assert!(needs_factual_context("POPULATION of Japan"));
        assert!(needs_factual_context("when was python created"));
    }

    #[test]
    fn conceptual_queries_skip_grounding() {
        assert!(!needs_factual_context("explain binary search"));
        assert!(!needs_factual_context("how do closures work in rust"));
    }

    #[tokio::test]
    async fn unreachable_corpus_degrades_to_none() {
        let config = GroundingConfig {
            reference_api_url: "http://127.0.0.1:1/w/api.php".to_string(),
            fetch_timeout_secs: 1,
            ..Default::default()
        };
        let context = fetch_context(&config, "who invented the telephone").await;
        assert!(context.is_none());
    }
}
