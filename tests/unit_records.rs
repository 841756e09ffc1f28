// Unit tests for record import: JSON parsing, cleaning, tagging and the
// validation that happens on the way in.

use std::io::Write;

use chrono::{TimeZone, Utc};
use murmur::records::clean::clean;
use murmur::records::import::{load_json, parse_timestamp};
use murmur::records::tagger::tag;
use murmur::records::{ClusterLabel, Record};

fn write_json(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================
// load_json
// ============================================================

#[test]
fn import_accepts_collector_field_names() {
    let file = write_json(
        r#"[
            {
                "post_id": "abc",
                "author": "alice",
                "title": "The Great Reset is coming",
                "selftext": "Read more at https://example.com [here](https://x.y)",
                "top_comments": ["first!", "second"],
                "created_utc": "1717243200",
                "subreddit": "conspiracy",
                "score": 12,
                "num_comments": 3
            }
        ]"#,
    );

    let records = load_json(file.path()).unwrap();
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.id, "abc");
    assert_eq!(r.title, "the great reset is coming");
    assert!(!r.body.contains("https"));
    assert_eq!(r.top_comments.as_deref(), Some("first! second"));
    assert_eq!(r.source.as_deref(), Some("conspiracy"));
    assert_eq!(r.created_at, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    assert!(r.tags.contains(&"conspiracy".to_string()));
    assert_eq!(r.label(), ClusterLabel::Unassigned);
}

#[test]
fn import_skips_invalid_rows() {
    let file = write_json(
        r#"[
            {"id": "ok", "author": "bob", "title": "fine", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "", "author": "bob", "title": "no id", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "nt", "author": "bob", "title": "", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "bad", "author": "bob", "title": "when?", "created_at": "yesterday"}
        ]"#,
    );

    let records = load_json(file.path()).unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
}

#[test]
fn import_fails_on_non_array() {
    let file = write_json(r#"{"id": "x"}"#);
    assert!(load_json(file.path()).is_err());
}

#[test]
fn import_fails_on_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_json(&dir.path().join("nope.json")).is_err());
}

// ============================================================
// parse_timestamp
// ============================================================

#[test]
fn timestamp_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    assert_eq!(parse_timestamp("2024-06-01T12:00:00Z"), Some(expected));
    assert_eq!(parse_timestamp("2024-06-01T14:00:00+02:00"), Some(expected));
    assert_eq!(parse_timestamp("2024-06-01 12:00:00"), Some(expected));
    assert_eq!(parse_timestamp("2024-06-01T12:00:00.000"), Some(expected));
    assert_eq!(parse_timestamp("1717243200.0"), Some(expected));
    assert_eq!(parse_timestamp("not a date"), None);
}

// ============================================================
// clean + tag
// ============================================================

#[test]
fn clean_strips_mentions_and_markdown() {
    assert_eq!(clean("Ask u/someone in r/news about **this**"), "ask in about this");
}

#[test]
fn tags_follow_rule_order() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let record = Record::new("p", "carol", "5g towers are a hoax", "", ts)
        .unwrap()
        .with_engagement(2000, 1);
    assert_eq!(
        tag(&record),
        vec!["potential_misinfo", "conspiracy", "high_engagement", "url_only"]
    );
}

#[test]
fn satire_flair_is_tagged() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let record = Record::new("p", "dan", "title", "a body", ts)
        .unwrap()
        .with_engagement(50, 50)
        .with_flair(Some("Satire".to_string()));
    assert_eq!(tag(&record), vec!["likely_satire"]);
}
