// Rule-based record tagging.
//
// Cheap keyword and engagement heuristics that annotate records for the
// reviewer. Tags never influence clustering.

use super::models::Record;

const CONSPIRACY_KEYWORDS: &[&str] = &[
    "deep state",
    "hoax",
    "false flag",
    "great reset",
    "illuminati",
];

const MISINFO_KEYWORDS: &[&str] = &[
    "5g",
    "plandemic",
    "bioweapon",
    "graphene",
    "cancer cure",
    "chemtrails",
];

const POLITICAL_FLAIRS: &[&str] = &["dem", "gop", "liberal", "conservative"];

/// Engagement above either of these marks a record as high engagement.
const HIGH_ENGAGEMENT_COMMENTS: u32 = 300;
const HIGH_ENGAGEMENT_SCORE: i64 = 1000;

/// Both engagement figures below these mark a record as low engagement.
const LOW_ENGAGEMENT_COMMENTS: u32 = 5;
const LOW_ENGAGEMENT_SCORE: i64 = 5;

/// Bodies longer than this (in characters) are tagged `theory_drop`.
const THEORY_DROP_CHARS: usize = 1000;

/// Compute the tag list for a record. Tags are returned in rule order with
/// duplicates removed.
pub fn tag(record: &Record) -> Vec<String> {
    let title = record.title.to_lowercase();
    let body = record.body.to_lowercase();
    let flair = record.flair.as_deref().unwrap_or("").to_lowercase();
    let source = record.source.as_deref().unwrap_or("").to_lowercase();
    let mentions = |kw: &&str| title.contains(*kw) || body.contains(*kw);

    let mut tags: Vec<&str> = Vec::new();

    if MISINFO_KEYWORDS.iter().any(mentions) {
        tags.push("potential_misinfo");
    }
    if CONSPIRACY_KEYWORDS.iter().any(mentions) || source == "conspiracy" {
        tags.push("conspiracy");
    }
    if record.num_comments > HIGH_ENGAGEMENT_COMMENTS || record.score > HIGH_ENGAGEMENT_SCORE {
        tags.push("high_engagement");
    }
    if record.num_comments < LOW_ENGAGEMENT_COMMENTS && record.score < LOW_ENGAGEMENT_SCORE {
        tags.push("low_engagement");
    }
    if record.author.to_lowercase().contains("[deleted]") {
        tags.push("deleted_author");
    }
    if flair.contains("satire") || flair.contains("joke") {
        tags.push("likely_satire");
    }
    if source == "politics" || POLITICAL_FLAIRS.iter().any(|p| flair.contains(p)) {
        tags.push("political");
    }
    let body_trimmed = record.body.trim();
    if body_trimmed.chars().count() > THEORY_DROP_CHARS {
        tags.push("theory_drop");
    }
    if body_trimmed.is_empty() {
        tags.push("url_only");
    }

    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for t in tags {
        if !out.iter().any(|existing| existing == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(title: &str, body: &str) -> Record {
        Record::new("p1", "someone", title, body, Utc::now())
            .unwrap()
            .with_engagement(50, 20)
    }

    #[test]
    fn test_misinfo_keyword_in_title() {
        let tags = tag(&record("5G towers are the real cause", "long body text"));
        assert!(tags.contains(&"potential_misinfo".to_string()));
    }

    #[test]
    fn test_conspiracy_from_keyword_and_source_not_duplicated() {
        let r = record("It was a false flag", "body").with_source("conspiracy");
        let tags = tag(&r);
        assert_eq!(tags.iter().filter(|t| *t == "conspiracy").count(), 1);
    }

    #[test]
    fn test_engagement_tags() {
        let high = record("t", "b").with_engagement(5000, 10);
        assert!(tag(&high).contains(&"high_engagement".to_string()));

        let low = record("t", "b").with_engagement(1, 1);
        assert!(tag(&low).contains(&"low_engagement".to_string()));
    }

    #[test]
    fn test_political_from_flair() {
        let r = record("t", "b").with_flair(Some("GOP".to_string()));
        assert!(tag(&r).contains(&"political".to_string()));
    }

    #[test]
    fn test_url_only_and_theory_drop() {
        assert!(tag(&record("link post", "")).contains(&"url_only".to_string()));
        let long = "x".repeat(1001);
        assert!(tag(&record("t", &long)).contains(&"theory_drop".to_string()));
    }

    #[test]
    fn test_plain_record_has_no_tags() {
        assert!(tag(&record("weekend gardening", "tomatoes are growing")).is_empty());
    }
}
