// Record model: the fixed-schema value type that flows through a run.
//
// Records are only built through `Record::new`, which validates the fields
// every later stage relies on. The cluster label starts as `Unassigned` and
// is written exactly once per run by `assign_labels`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Where a record stands with respect to clustering.
///
/// `Unassigned` and `Noise` are different states: a record that
/// has not been clustered yet must never be mistaken for one that clustering
/// looked at and left ungrouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum ClusterLabel {
    #[default]
    Unassigned,
    Noise,
    Cluster(u32),
}

impl ClusterLabel {
    /// The cluster id, if this label names a cluster.
    pub fn cluster_id(&self) -> Option<u32> {
        match self {
            ClusterLabel::Cluster(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        !matches!(self, ClusterLabel::Unassigned)
    }

    /// Integer encoding used in storage: -1 for noise, None for unassigned.
    pub fn to_db(&self) -> Option<i64> {
        match self {
            ClusterLabel::Unassigned => None,
            ClusterLabel::Noise => Some(-1),
            ClusterLabel::Cluster(id) => Some(*id as i64),
        }
    }

    /// Inverse of `to_db`. Ids beyond `u32` mean the row was not written by
    /// this crate and are rejected rather than wrapped.
    pub fn from_db(value: Option<i64>) -> Result<Self> {
        match value {
            None => Ok(ClusterLabel::Unassigned),
            Some(v) if v < 0 => Ok(ClusterLabel::Noise),
            Some(v) => u32::try_from(v).map(ClusterLabel::Cluster).map_err(|_| {
                PipelineError::InvalidParameters(format!("stored cluster id {v} is out of range"))
            }),
        }
    }
}

impl std::fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterLabel::Unassigned => write!(f, "unassigned"),
            ClusterLabel::Noise => write!(f, "noise"),
            ClusterLabel::Cluster(id) => write!(f, "cluster {id}"),
        }
    }
}

/// A forum post (with its top comments) to embed and cluster.
///
/// Serialize-only: records are read back through `Record::new`, never
/// deserialized directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub author: String,
    pub title: String,
    pub body: String,
    /// Concatenated top comments; preferred as embedding text when present.
    pub top_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Forum or subreddit the record was collected from.
    pub source: Option<String>,
    pub score: i64,
    pub num_comments: u32,
    pub flair: Option<String>,
    pub tags: Vec<String>,
    label: ClusterLabel,
}

impl Record {
    /// Build a record, rejecting empty ids, empty authors and records with
    /// no text at all.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into().trim().to_string();
        let author = author.into().trim().to_string();
        let title = title.into();
        let body = body.into();

        if id.is_empty() {
            return Err(PipelineError::InvalidParameters(
                "record id must not be empty".to_string(),
            ));
        }
        if author.is_empty() {
            return Err(PipelineError::InvalidParameters(format!(
                "record {id} has an empty author"
            )));
        }
        if title.trim().is_empty() && body.trim().is_empty() {
            return Err(PipelineError::InvalidParameters(format!(
                "record {id} has no title or body text"
            )));
        }

        Ok(Self {
            id,
            author,
            title,
            body,
            top_comments: None,
            created_at,
            source: None,
            score: 0,
            num_comments: 0,
            flair: None,
            tags: Vec::new(),
            label: ClusterLabel::Unassigned,
        })
    }

    pub fn with_top_comments(mut self, comments: impl Into<String>) -> Self {
        let comments = comments.into();
        self.top_comments = if comments.trim().is_empty() {
            None
        } else {
            Some(comments)
        };
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_engagement(mut self, score: i64, num_comments: u32) -> Self {
        self.score = score;
        self.num_comments = num_comments;
        self
    }

    pub fn with_flair(mut self, flair: Option<String>) -> Self {
        self.flair = flair.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn label(&self) -> ClusterLabel {
        self.label
    }

    /// Text fed to the embedder: top comments when collected, otherwise the
    /// post's own title and body.
    pub fn embedding_text(&self) -> String {
        match &self.top_comments {
            Some(comments) => comments.clone(),
            None => self.summary_text(),
        }
    }

    /// Title and body joined, used for keyword extraction and samples.
    pub fn summary_text(&self) -> String {
        format!("{} {}", self.title, self.body).trim().to_string()
    }
}

/// Write clustering labels onto the records, in order.
///
/// Labels are written once per run: a length mismatch or a record that is
/// already labeled is rejected before anything is modified.
pub fn assign_labels(records: &mut [Record], labels: &[ClusterLabel]) -> Result<()> {
    if records.len() != labels.len() {
        return Err(PipelineError::LengthMismatch {
            what: "cluster labels",
            expected: records.len(),
            actual: labels.len(),
        });
    }
    if let Some(labeled) = records.iter().find(|r| r.label.is_assigned()) {
        return Err(PipelineError::InvalidParameters(format!(
            "record {} is already labeled ({}); labels are written once per run",
            labeled.id, labeled.label
        )));
    }
    for (record, label) in records.iter_mut().zip(labels) {
        record.label = *label;
    }
    Ok(())
}

/// Reset every label to `Unassigned` so a fresh run can label again.
pub fn clear_labels(records: &mut [Record]) {
    for record in records {
        record.label = ClusterLabel::Unassigned;
    }
}

/// Fail with `MissingLabelColumn` unless clustering has labeled every record.
pub fn require_labels(records: &[Record]) -> Result<()> {
    let unlabeled = records.iter().filter(|r| !r.label.is_assigned()).count();
    if unlabeled > 0 {
        return Err(PipelineError::MissingLabelColumn {
            unlabeled,
            total: records.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_id() {
        assert!(Record::new("  ", "alice", "title", "", ts()).is_err());
    }

    #[test]
    fn test_new_rejects_empty_author() {
        assert!(Record::new("p1", "", "title", "", ts()).is_err());
    }

    #[test]
    fn test_new_rejects_no_text() {
        assert!(Record::new("p1", "alice", " ", "", ts()).is_err());
    }

    #[test]
    fn test_new_starts_unassigned() {
        let r = Record::new("p1", "alice", "title", "body", ts()).unwrap();
        assert_eq!(r.label(), ClusterLabel::Unassigned);
    }

    #[test]
    fn test_embedding_text_prefers_comments() {
        let r = Record::new("p1", "alice", "title", "body", ts())
            .unwrap()
            .with_top_comments("first comment second comment");
        assert_eq!(r.embedding_text(), "first comment second comment");
        assert_eq!(r.summary_text(), "title body");
    }

    #[test]
    fn test_blank_comments_fall_back_to_post_text() {
        let r = Record::new("p1", "alice", "title", "", ts())
            .unwrap()
            .with_top_comments("   ");
        assert_eq!(r.embedding_text(), "title");
    }

    #[test]
    fn test_assign_labels_once() {
        let mut records = vec![
            Record::new("a", "x", "t", "", ts()).unwrap(),
            Record::new("b", "y", "t", "", ts()).unwrap(),
        ];
        assign_labels(&mut records, &[ClusterLabel::Cluster(0), ClusterLabel::Noise]).unwrap();
        assert_eq!(records[1].label(), ClusterLabel::Noise);

        let again = assign_labels(&mut records, &[ClusterLabel::Noise, ClusterLabel::Noise]);
        assert!(again.is_err());
        assert_eq!(records[0].label(), ClusterLabel::Cluster(0));
    }

    #[test]
    fn test_assign_labels_length_mismatch() {
        let mut records = vec![Record::new("a", "x", "t", "", ts()).unwrap()];
        let err = assign_labels(&mut records, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
        assert_eq!(records[0].label(), ClusterLabel::Unassigned);
    }

    #[test]
    fn test_require_labels_reports_unassigned() {
        let records = vec![Record::new("a", "x", "t", "", ts()).unwrap()];
        let err = require_labels(&records).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingLabelColumn { unlabeled: 1, total: 1 }
        ));
    }

    #[test]
    fn test_label_db_encoding() {
        assert_eq!(ClusterLabel::from_db(None).unwrap(), ClusterLabel::Unassigned);
        assert_eq!(ClusterLabel::from_db(Some(-1)).unwrap(), ClusterLabel::Noise);
        assert_eq!(ClusterLabel::from_db(Some(3)).unwrap(), ClusterLabel::Cluster(3));
        assert_eq!(ClusterLabel::Noise.to_db(), Some(-1));
        assert_eq!(ClusterLabel::Unassigned.to_db(), None);
    }

    #[test]
    fn test_label_db_rejects_ids_beyond_u32() {
        let too_big = i64::from(u32::MAX) + 1;
        assert!(matches!(
            ClusterLabel::from_db(Some(too_big)),
            Err(PipelineError::InvalidParameters(_))
        ));
        assert_eq!(
            ClusterLabel::from_db(Some(i64::from(u32::MAX))).unwrap(),
            ClusterLabel::Cluster(u32::MAX)
        );
    }
}
