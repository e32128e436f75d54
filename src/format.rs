use chrono::{DateTime, Utc};

use crate::models::NewsItem;

const PREVIEW_CHARS: usize = 300;

pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d/%m/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Plain-text excerpt of the item body: HTML stripped, whitespace collapsed,
/// cut at a character boundary.
pub fn preview(item: &NewsItem) -> Option<String> {
    let body = item.raw_body.as_deref()?;
    let text = html2text::from_read(body.as_bytes(), 200);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() {
        return None;
    }
    Some(truncate_chars(&text, PREVIEW_CHARS))
}

/// Cuts `text` to at most `max` characters, ending in "…" when shortened
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Terminal rendering used by the `latest` subcommand
pub fn format_item(item: &NewsItem) -> String {
    let mut out = format!(
        "[{}] {}\n  {}\n  {}",
        item.source,
        item.title,
        item.url,
        format_date(item.published_at)
    );
    if let Some(text) = preview(item) {
        out.push_str("\n  ");
        out.push_str(&text);
    }
    out
}
