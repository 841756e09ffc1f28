// Top-comment selection.
//
// A post's comment thread is mostly noise for clustering. Only the best few
// comments are folded into the record's embedding text, ranked by
// `score * ln(1 + length)` so a long well-received comment beats a one-word
// reply with the same score. Deleted and removed comments never count.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::clean::clean;
use super::models::Record;

/// Comments kept per post.
pub const DEFAULT_TOP_COMMENTS: usize = 10;

const REMOVED_BODIES: [&str; 2] = ["[deleted]", "[removed]"];

/// One comment from the collector's export.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    /// The post this comment belongs to. Absent when the comment is nested
    /// inside its post's row.
    #[serde(default)]
    pub post_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub score: i64,
}

impl Comment {
    fn is_removed(&self) -> bool {
        REMOVED_BODIES.contains(&self.body.trim())
    }

    /// Ranking weight: score scaled by the log of the body length.
    pub fn rank(&self) -> f64 {
        self.score as f64 * (self.body.chars().count() as f64).ln_1p()
    }
}

/// The bodies of the `n` best comments, best first. Ties keep input order.
pub fn top_comments<'a, I>(comments: I, n: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a Comment>,
{
    let mut kept: Vec<&Comment> = comments.into_iter().filter(|c| !c.is_removed()).collect();
    kept.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    kept.into_iter().take(n).map(|c| c.body.clone()).collect()
}

/// Set each record's top comments from a flat comment list.
///
/// Comments are grouped by `post_id`; records with no surviving comments
/// keep whatever top comments they already had. Returns how many records
/// were updated.
pub fn attach_top_comments(records: &mut [Record], comments: &[Comment], n: usize) -> usize {
    let mut by_post: HashMap<&str, Vec<&Comment>> = HashMap::new();
    for comment in comments {
        match comment.post_id.as_deref() {
            Some(post_id) => by_post.entry(post_id).or_default().push(comment),
            None => warn!(body_len = comment.body.len(), "Comment without post_id ignored"),
        }
    }

    let mut updated = 0;
    for record in records.iter_mut() {
        let Some(thread) = by_post.get(record.id.as_str()) else {
            continue;
        };
        let top = top_comments(thread.iter().copied(), n);
        if top.is_empty() {
            continue;
        }
        record.top_comments = Some(clean(&top.join(" "))).filter(|t| !t.trim().is_empty());
        updated += 1;
    }
    updated
}

/// Read a JSON array of comments. Rows that don't parse are skipped.
pub fn load_comments_json(path: &Path) -> Result<Vec<Comment>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read comments from {}", path.display()))?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse comments JSON in {}", path.display()))?;

    let total = rows.len();
    let comments: Vec<Comment> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(row, value)| match serde_json::from_value(value) {
            Ok(comment) => Some(comment),
            Err(e) => {
                warn!(row, error = %e, "Skipping malformed comment");
                None
            }
        })
        .collect();

    info!(
        loaded = comments.len(),
        skipped = total - comments.len(),
        "Imported comments from {}",
        path.display()
    );
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn comment(post_id: &str, body: &str, score: i64) -> Comment {
        Comment {
            post_id: Some(post_id.to_string()),
            body: body.to_string(),
            score,
        }
    }

    #[test]
    fn test_rank_prefers_longer_body_at_equal_score() {
        let short = comment("p", "ok", 10);
        let long = comment("p", "a much longer and more considered reply", 10);
        assert!(long.rank() > short.rank());
    }

    #[test]
    fn test_top_comments_order_and_limit() {
        let thread = vec![
            comment("p", "meh", 1),
            comment("p", "this is the best reply in the thread", 50),
            comment("p", "[deleted]", 500),
            comment("p", "decent reply here", 20),
            comment("p", "[removed]", 90),
        ];
        let top = top_comments(&thread, 2);
        assert_eq!(top, vec!["this is the best reply in the thread", "decent reply here"]);
    }

    #[test]
    fn test_negative_scores_rank_last() {
        let thread = vec![comment("p", "downvoted rant", -5), comment("p", "fine", 0)];
        assert_eq!(top_comments(&thread, 10), vec!["fine", "downvoted rant"]);
    }

    #[test]
    fn test_attach_groups_by_post() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut records = vec![
            Record::new("a", "amy", "title a", "", ts).unwrap(),
            Record::new("b", "bob", "title b", "", ts)
                .unwrap()
                .with_top_comments("kept as is"),
        ];
        let comments = vec![
            comment("a", "Second **best**", 2),
            comment("a", "Top comment for a", 30),
            comment("zzz", "orphan", 99),
        ];

        assert_eq!(attach_top_comments(&mut records, &comments, DEFAULT_TOP_COMMENTS), 1);
        assert_eq!(
            records[0].top_comments.as_deref(),
            Some("top comment for a second best")
        );
        assert_eq!(records[1].top_comments.as_deref(), Some("kept as is"));
    }

    #[test]
    fn test_load_comments_skips_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comments.json");
        std::fs::write(
            &path,
            r#"[
                {"post_id": "a", "body": "fine", "score": 3},
                {"post_id": "a", "body": null, "score": 3},
                {"post_id": "b", "body": "no score"}
            ]"#,
        )
        .unwrap();
        let comments = load_comments_json(&path).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].score, 0);
    }
}
