use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use feed_rs::parser;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::NewsItem;

const JSON_LIST_FIELDS: [&str; 4] = ["items", "news", "data", "articles"];
const JSON_URL_FIELDS: [&str; 2] = ["url", "link"];
const JSON_DATE_FIELDS: [&str; 4] = ["publishedAt", "published_at", "date", "pubDate"];
const JSON_BODY_FIELDS: [&str; 3] = ["body", "description", "content"];

/// Parses an Atom or RSS document into news items.
/// feed-rs detects the dialect, so the YouTube and blog feeds share this path.
pub fn parse_xml_feed(source: &str, bytes: &[u8]) -> Result<Vec<NewsItem>> {
    let feed = parser::parse(bytes)
        .with_context(|| format!("{}: invalid Atom/RSS document", source))?;

    let mut items = Vec::with_capacity(feed.entries.len());

    for entry in feed.entries {
        let title = entry.title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_else(|| "Untitled".to_string());

        let link = entry.links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string());

        let guid = if entry.id.is_empty() { None } else { Some(entry.id.clone()) };

        let url = match link.or_else(|| guid.clone()) {
            Some(url) => url,
            None => {
                debug!("{}: skipping entry without link or id", source);
                continue;
            }
        };

        let published_at = entry.published
            .or(entry.updated)
            .map(|d| d.with_timezone(&Utc));

        // YouTube puts the video description under media:group
        let raw_body = entry.summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .or_else(|| {
                entry.media
                    .iter()
                    .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
            });

        items.push(NewsItem {
            source: source.to_string(),
            title,
            url,
            guid,
            published_at,
            raw_body,
        });
    }

    Ok(items)
}

/// Parses the JSON news API body.
///
/// The payload is either a bare array of article objects or an object that
/// wraps the array under one of `items`, `news`, `data` or `articles`.
/// Articles missing a title or a link are dropped.
pub fn parse_json_feed(source: &str, bytes: &[u8]) -> Result<Vec<NewsItem>> {
    let value: Value = serde_json::from_slice(bytes)
        .with_context(|| format!("{}: invalid JSON body", source))?;

    let articles = match &value {
        Value::Array(list) => list,
        Value::Object(obj) => JSON_LIST_FIELDS
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_array))
            .ok_or_else(|| anyhow!("{}: no article list in JSON object", source))?,
        _ => return Err(anyhow!("{}: expected a JSON array or object", source)),
    };

    let items = articles
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| json_article(source, obj))
        .collect();

    Ok(items)
}

fn json_article(source: &str, obj: &Map<String, Value>) -> Option<NewsItem> {
    let title = first_str(obj, &["title"])?;
    let url = first_str(obj, &JSON_URL_FIELDS)?;

    let published_at = JSON_DATE_FIELDS
        .iter()
        .find_map(|field| obj.get(*field))
        .and_then(parse_json_date);

    let guid = obj.get("id").and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Some(NewsItem {
        source: source.to_string(),
        title,
        url,
        guid,
        published_at,
        raw_body: first_str(obj, &JSON_BODY_FIELDS),
    })
}

fn first_str(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| obj.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn parse_json_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        // Unix seconds, or milliseconds for large values
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

/// Accepts RFC 3339, RFC 2822, naive `YYYY-MM-DDTHH:MM:SS` and bare dates.
/// Anything else is treated as missing.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const YOUTUBE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <title>Brawl Stars</title>
  <entry>
    <id>yt:video:abc123</id>
    <yt:videoId>abc123</yt:videoId>
    <title>Brawl Talk: New Brawler!</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=abc123"/>
    <published>2024-01-03T10:00:00+00:00</published>
    <updated>2024-01-04T10:00:00+00:00</updated>
    <media:group>
      <media:title>Brawl Talk: New Brawler!</media:title>
      <media:description>Everything coming in the next update.</media:description>
    </media:group>
  </entry>
</feed>"#;

    const BLOG_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Brawl Stars Blog</title>
    <link>https://blog.example.com</link>
    <description>News</description>
    <item>
      <title>Balance changes</title>
      <link>https://blog.example.com/balance</link>
      <guid>https://blog.example.com/balance</guid>
      <pubDate>Tue, 02 Jan 2024 09:30:00 GMT</pubDate>
      <description>&lt;p&gt;Nerfs and buffs&lt;/p&gt;</description>
    </item>
    <item>
      <title>Undated post</title>
      <link>https://blog.example.com/undated</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_youtube_atom_entry() {
        let items = parse_xml_feed("YouTube", YOUTUBE_ATOM.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.source, "YouTube");
        assert_eq!(item.title, "Brawl Talk: New Brawler!");
        assert_eq!(item.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(item.published_at, parse_timestamp("2024-01-03T10:00:00Z"));
        assert_eq!(item.raw_body.as_deref(), Some("Everything coming in the next update."));
    }

    #[test]
    fn parses_blog_rss_items() {
        let items = parse_xml_feed("Blog", BLOG_RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://blog.example.com/balance");
        assert_eq!(items[0].published_at, parse_timestamp("2024-01-02T09:30:00Z"));
        assert!(items[0].raw_body.as_deref().unwrap().contains("Nerfs"));
        assert_eq!(items[1].published_at, None);
    }

    #[test]
    fn rejects_garbage_xml() {
        assert!(parse_xml_feed("Blog", b"<html>not a feed").is_err());
    }

    #[test]
    fn parses_bare_json_array() {
        let body = r#"[
            {"id": 7, "title": "Season 30", "url": "https://api.example.com/n/7", "publishedAt": "2024-01-05T00:00:00Z", "body": "New season"},
            {"title": "No link"},
            {"title": "Date only", "link": "https://api.example.com/n/8", "date": "2024-01-01"}
        ]"#;

        let items = parse_json_feed("API", body.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid.as_deref(), Some("7"));
        assert_eq!(items[0].raw_body.as_deref(), Some("New season"));
        assert_eq!(items[1].url, "https://api.example.com/n/8");
        assert_eq!(items[1].published_at, parse_timestamp("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn parses_wrapped_json_list() {
        let body = r#"{"news": [{"title": "Hypercharge", "link": "https://x.test/h", "published_at": 1704067200}]}"#;
        let items = parse_json_feed("API", body.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].published_at, parse_timestamp("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn json_without_list_is_an_error() {
        assert!(parse_json_feed("API", br#"{"status": "ok"}"#).is_err());
        assert!(parse_json_feed("API", b"42").is_err());
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        assert_eq!(parse_timestamp("next tuesday"), None);
        assert!(parse_timestamp("Mon, 01 Jan 2024 00:00:00 +0000").is_some());
    }
}
