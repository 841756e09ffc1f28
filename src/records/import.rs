// JSON import of collected records.
//
// The collector that talks to the forum API lives outside this crate; it
// hands over a JSON array of loosely-shaped rows. Each row is parsed into a
// `RawRecord` on its own and then validated through `Record::new`, so one
// malformed row costs that row only and nothing downstream ever sees an
// unvalidated record.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::clean::clean;
use super::comments::{top_comments, Comment, DEFAULT_TOP_COMMENTS};
use super::models::Record;
use super::tagger::tag;

/// One row of the collector's export.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "post_id")]
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "selftext")]
    pub body: String,
    /// A single string, a list of comment bodies, or scored comments.
    #[serde(default)]
    pub top_comments: Option<TopComments>,
    #[serde(alias = "created_utc")]
    pub created_at: RawTimestamp,
    #[serde(default, alias = "subreddit")]
    pub source: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub flair: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TopComments {
    Joined(String),
    List(Vec<String>),
    /// Scored comments; only the best `n` are kept.
    Scored(Vec<Comment>),
}

impl TopComments {
    fn joined(&self, n: usize) -> String {
        match self {
            TopComments::Joined(s) => s.clone(),
            TopComments::List(items) => items.join(" "),
            TopComments::Scored(comments) => top_comments(comments, n).join(" "),
        }
    }
}

/// Timestamps arrive as text or as bare unix seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Text(String),
    Seconds(f64),
}

impl RawTimestamp {
    fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Text(s) => parse_timestamp(s),
            RawTimestamp::Seconds(secs) => DateTime::from_timestamp(*secs as i64, 0),
        }
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTimestamp::Text(s) => write!(f, "{s}"),
            RawTimestamp::Seconds(secs) => write!(f, "{secs}"),
        }
    }
}

/// Parse a timestamp in RFC 3339, naive ISO 8601 (assumed UTC) or unix
/// seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

impl RawRecord {
    /// Clean, validate and tag this row.
    pub fn into_record(self) -> Result<Record> {
        self.into_record_with(DEFAULT_TOP_COMMENTS)
    }

    /// Like `into_record`, keeping at most `max_comments` scored comments.
    pub fn into_record_with(self, max_comments: usize) -> Result<Record> {
        let created_at = self.created_at.parse().with_context(|| {
            format!(
                "record {} has an unparseable timestamp: {}",
                self.id, self.created_at
            )
        })?;

        let mut record = Record::new(
            self.id,
            self.author,
            clean(&self.title),
            clean(&self.body),
            created_at,
        )?
        .with_engagement(self.score, self.num_comments)
        .with_flair(self.flair);

        if let Some(comments) = self.top_comments {
            record = record.with_top_comments(clean(&comments.joined(max_comments)));
        }
        if let Some(source) = self.source {
            record = record.with_source(source);
        }

        let tags = tag(&record);
        Ok(record.with_tags(tags))
    }
}

/// Read a JSON array of raw rows from `path`.
pub fn load_json(path: &Path) -> Result<Vec<Record>> {
    load_json_with(path, DEFAULT_TOP_COMMENTS)
}

/// Read a JSON array of raw rows, keeping `max_comments` scored comments
/// per record.
///
/// Each row is deserialized and validated separately. Rows that fail either
/// step are skipped with a warning; the import as a whole only fails when
/// the file can't be read or isn't a JSON array.
pub fn load_json_with(path: &Path, max_comments: usize) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse records JSON in {}", path.display()))?;

    let total = rows.len();
    let mut records = Vec::with_capacity(total);
    for (row, value) in rows.into_iter().enumerate() {
        let raw: RawRecord = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(row, error = %e, "Skipping malformed record");
                continue;
            }
        };
        let id = raw.id.clone();
        match raw.into_record_with(max_comments) {
            Ok(record) => records.push(record),
            Err(e) => warn!(row, id = %id, error = %e, "Skipping invalid record"),
        }
    }

    info!(
        loaded = records.len(),
        skipped = total - records.len(),
        "Imported records from {}",
        path.display()
    );
    Ok(records)
}
