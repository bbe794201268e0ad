//! Video search against the public YouTube results page.
//!
//! The page embeds its results as a `ytInitialData` JSON blob inside a
//! script tag; video ids are read from every `videoRenderer` in it.

use crate::error::{Error, Result};
use crate::http::HttpClient;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

const RESULTS_URL: &str = "https://www.youtube.com/results";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const INITIAL_DATA_PREFIXES: &[&str] = &["var ytInitialData = ", "window[\"ytInitialData\"] = "];

#[derive(Clone)]
pub struct YouTubeSearch {
    http: HttpClient,
    default_results: usize,
}

impl YouTubeSearch {
    pub fn new(default_results: usize) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new("Mozilla/5.0 (compatible; cinegraph/0.1.0)", None, 0)?,
            default_results,
        })
    }

    /// `input` is `"query"` or `"query,num_results"`; returns a list literal of links.
    pub async fn run(&self, input: &str) -> Result<String> {
        let (query, count) = parse_input(input, self.default_results);
        debug!(query = %query, count, "searching YouTube");
        let html = self
            .http
            .get_text(RESULTS_URL, &[("search_query", query.as_str())])
            .await?;
        let ids = extract_video_ids(&html, count)?;
        Ok(format_links(&ids))
    }
}

fn parse_input(input: &str, default_results: usize) -> (String, usize) {
    if let Some((query, n)) = input.rsplit_once(',')
        && let Ok(n) = n.trim().parse::<usize>()
    {
        return (query.trim().to_string(), n);
    }
    (input.trim().to_string(), default_results)
}

pub fn extract_video_ids(html: &str, limit: usize) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("script").map_err(|e| Error::parse(format!("selector: {e:?}")))?;

    let data = document
        .select(&selector)
        .map(|s| s.text().collect::<String>())
        .find_map(|text| {
            let text = text.trim();
            INITIAL_DATA_PREFIXES
                .iter()
                .find_map(|p| text.strip_prefix(p))
                .map(|json| json.trim_end().trim_end_matches(';').to_string())
        })
        .ok_or_else(|| Error::parse("ytInitialData not found in results page"))?;

    let value: Value = serde_json::from_str(&data)
        .map_err(|e| Error::parse(format!("parse ytInitialData: {e}")))?;

    let mut ids = Vec::new();
    collect_video_ids(&value, limit, &mut ids);
    Ok(ids)
}

fn collect_video_ids(value: &Value, limit: usize, ids: &mut Vec<String>) {
    if ids.len() >= limit {
        return;
    }
    match value {
        Value::Object(map) => {
            if let Some(id) = map
                .get("videoRenderer")
                .and_then(|r| r.get("videoId"))
                .and_then(Value::as_str)
                && !ids.iter().any(|existing| existing == id)
            {
                ids.push(id.to_string());
            }
            for v in map.values() {
                collect_video_ids(v, limit, ids);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_video_ids(v, limit, ids);
            }
        }
        _ => {}
    }
}

fn format_links(ids: &[String]) -> String {
    let links = ids
        .iter()
        .map(|id| format!("'{WATCH_URL}{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{links}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_with_count() {
        assert_eq!(parse_input("heat trailer,3", 2), ("heat trailer".into(), 3));
        assert_eq!(parse_input("heat trailer", 2), ("heat trailer".into(), 2));
        assert_eq!(
            parse_input("heat, 1995 trailer", 2),
            ("heat, 1995 trailer".into(), 2)
        );
    }

    #[test]
    fn links_render_as_list() {
        assert_eq!(format_links(&[]), "[]");
        assert_eq!(
            format_links(&["a1".into(), "b2".into()]),
            "['https://www.youtube.com/watch?v=a1', 'https://www.youtube.com/watch?v=b2']"
        );
    }

    #[test]
    fn missing_initial_data_is_error() {
        assert!(extract_video_ids("<html><script>var x = 1;</script></html>", 2).is_err());
    }
}
