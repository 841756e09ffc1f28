// Suspicious-activity signals over clustered records.
//
// Cluster-level: a burst (every member posted within a short window) or an
// author concentration (one author posting many of the members). Author-level:
// identities whose posts land in more than one cluster.
//
// Flags are advisory. Nothing here modifies records; only the summaries'
// `flagged` / `flag_reasons` fields are written.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::records::{require_labels, Record};
use crate::summary::{group_by_cluster, ClusterSummary};

/// Default burst window: members all posted within this span.
pub const DEFAULT_BURST_MINUTES: i64 = 60;
/// Default per-author limit; more posts than this in one cluster is flagged.
pub const DEFAULT_MAX_POSTS_PER_AUTHOR: usize = 4;

/// Why a cluster was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagReason {
    /// All members were created within `window_minutes` of each other.
    Burst { span_seconds: i64, window_minutes: i64 },
    /// One author contributed more than the allowed number of members.
    AuthorConcentration { author: String, count: usize },
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagReason::Burst {
                span_seconds,
                window_minutes,
            } => write!(
                f,
                "burst: all posts within {}m (window {}m)",
                span_seconds / 60,
                window_minutes
            ),
            FlagReason::AuthorConcentration { author, count } => {
                write!(f, "concentration: {author} posted {count} times")
            }
        }
    }
}

pub struct AnomalyFlagger {
    pub burst_window: Duration,
    pub max_posts_per_author: usize,
}

impl Default for AnomalyFlagger {
    fn default() -> Self {
        Self {
            burst_window: Duration::minutes(DEFAULT_BURST_MINUTES),
            max_posts_per_author: DEFAULT_MAX_POSTS_PER_AUTHOR,
        }
    }
}

impl AnomalyFlagger {
    pub fn new(burst_window: Duration, max_posts_per_author: usize) -> Self {
        Self {
            burst_window,
            max_posts_per_author,
        }
    }

    /// Set `flagged` and `flag_reasons` on each summary from its members.
    ///
    /// A summary whose cluster has no members in `records` is logged and
    /// left unflagged; the others are still evaluated.
    pub fn flag_clusters(&self, records: &[Record], summaries: &mut [ClusterSummary]) -> Result<()> {
        require_labels(records)?;
        let groups = group_by_cluster(records);

        let mut flagged = 0;
        for summary in summaries.iter_mut() {
            let Some(members) = groups.get(&summary.id) else {
                error!(
                    stage = "flag",
                    cluster = summary.id,
                    "Summary has no member records, leaving it unflagged"
                );
                continue;
            };

            let reasons = self.cluster_reasons(members);
            summary.flagged = !reasons.is_empty();
            summary.flag_reasons = reasons;
            if summary.flagged {
                flagged += 1;
                debug!(cluster = summary.id, reasons = ?summary.flag_reasons, "Flagged cluster");
            }
        }

        info!(clusters = summaries.len(), flagged, "Cluster flagging complete");
        Ok(())
    }

    /// Evaluate the burst and concentration checks independently.
    pub fn cluster_reasons(&self, members: &[&Record]) -> Vec<FlagReason> {
        let mut reasons = Vec::new();

        let first = members.iter().map(|r| r.created_at).min();
        let last = members.iter().map(|r| r.created_at).max();
        if let (Some(first), Some(last)) = (first, last) {
            let span = last - first;
            if span < self.burst_window {
                reasons.push(FlagReason::Burst {
                    span_seconds: span.num_seconds(),
                    window_minutes: self.burst_window.num_minutes(),
                });
            }
        }

        let mut per_author: HashMap<&str, usize> = HashMap::new();
        for record in members {
            *per_author.entry(record.author.as_str()).or_default() += 1;
        }
        let mut heavy: Vec<(&str, usize)> = per_author
            .into_iter()
            .filter(|(_, count)| *count > self.max_posts_per_author)
            .collect();
        heavy.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        reasons.extend(heavy.into_iter().map(|(author, count)| {
            FlagReason::AuthorConcentration {
                author: author.to_string(),
                count,
            }
        }));

        reasons
    }

    /// Authors whose records fall in more than one distinct non-noise
    /// cluster. Independent of the cluster-level flags.
    pub fn flagged_users(&self, records: &[Record]) -> Result<BTreeSet<String>> {
        require_labels(records)?;

        let mut clusters_by_author: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
        for record in records {
            if let Some(id) = record.label().cluster_id() {
                clusters_by_author
                    .entry(record.author.as_str())
                    .or_default()
                    .insert(id);
            }
        }

        let users: BTreeSet<String> = clusters_by_author
            .into_iter()
            .filter(|(_, clusters)| clusters.len() > 1)
            .map(|(author, _)| author.to_string())
            .collect();

        info!(flagged_users = users.len(), "Cross-cluster author check complete");
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::records::{assign_labels, ClusterLabel};
    use crate::summary::ClusterSummarizer;
    use chrono::{DateTime, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, author: &str, created: DateTime<Utc>) -> Record {
        Record::new(id, author, format!("post {id}"), "", created).unwrap()
    }

    fn labeled(mut records: Vec<Record>, labels: &[ClusterLabel]) -> Vec<Record> {
        assign_labels(&mut records, labels).unwrap();
        records
    }

    fn flag(records: &[Record]) -> Vec<ClusterSummary> {
        let mut summaries = ClusterSummarizer::default().summarize(records).unwrap();
        AnomalyFlagger::default()
            .flag_clusters(records, &mut summaries)
            .unwrap();
        summaries
    }

    #[test]
    fn test_burst_within_ten_minutes_is_flagged() {
        let records: Vec<Record> = (0..10)
            .map(|i| record(&i.to_string(), &format!("user{i}"), base() + Duration::minutes(i)))
            .collect();
        let records = labeled(records, &[ClusterLabel::Cluster(0); 10]);
        let s = &flag(&records)[0];
        assert!(s.flagged);
        assert!(matches!(s.flag_reasons[0], FlagReason::Burst { .. }));
    }

    #[test]
    fn test_thirty_day_span_without_concentration_is_not_flagged() {
        let records: Vec<Record> = (0..10)
            .map(|i| {
                record(
                    &i.to_string(),
                    &format!("user{}", i % 5),
                    base() + Duration::days(i * 30 / 9),
                )
            })
            .collect();
        let records = labeled(records, &[ClusterLabel::Cluster(0); 10]);
        let s = &flag(&records)[0];
        assert_eq!(s.span(), Duration::days(30));
        assert!(!s.flagged);
        assert!(s.flag_reasons.is_empty());
    }

    #[test]
    fn test_author_concentration_is_flagged() {
        let records: Vec<Record> = (0..8)
            .map(|i| {
                let author = if i < 5 { "spammer" } else { "other" };
                record(&i.to_string(), author, base() + Duration::days(i))
            })
            .collect();
        let records = labeled(records, &[ClusterLabel::Cluster(0); 8]);
        let s = &flag(&records)[0];
        assert!(s.flagged);
        assert_eq!(
            s.flag_reasons,
            vec![FlagReason::AuthorConcentration {
                author: "spammer".to_string(),
                count: 5
            }]
        );
    }

    #[test]
    fn test_exactly_max_posts_is_not_concentration() {
        let records: Vec<Record> = (0..6)
            .map(|i| {
                let author = if i < 4 { "regular" } else { "other" };
                record(&i.to_string(), author, base() + Duration::days(i))
            })
            .collect();
        let records = labeled(records, &[ClusterLabel::Cluster(0); 6]);
        assert!(!flag(&records)[0].flagged);
    }

    #[test]
    fn test_both_reasons_recorded() {
        let records: Vec<Record> = (0..6)
            .map(|i| record(&i.to_string(), "bot", base() + Duration::seconds(i)))
            .collect();
        let records = labeled(records, &[ClusterLabel::Cluster(0); 6]);
        let s = &flag(&records)[0];
        assert_eq!(s.flag_reasons.len(), 2);
        assert!(matches!(s.flag_reasons[0], FlagReason::Burst { .. }));
        assert!(matches!(s.flag_reasons[1], FlagReason::AuthorConcentration { .. }));
    }

    #[test]
    fn test_multi_cluster_author_is_flagged() {
        let records = labeled(
            vec![
                record("1", "hopper", base()),
                record("2", "hopper", base()),
                record("3", "stayer", base()),
                record("4", "stayer", base()),
                record("5", "other", base()),
            ],
            &[
                ClusterLabel::Cluster(0),
                ClusterLabel::Cluster(2),
                ClusterLabel::Cluster(0),
                ClusterLabel::Noise,
                ClusterLabel::Cluster(2),
            ],
        );
        let users = AnomalyFlagger::default().flagged_users(&records).unwrap();
        assert!(users.contains("hopper"));
        assert!(!users.contains("stayer"));
        assert!(!users.contains("other"));
    }

    #[test]
    fn test_flagged_users_requires_labels() {
        let records = vec![record("1", "a", base())];
        let err = AnomalyFlagger::default().flagged_users(&records).unwrap_err();
        assert!(matches!(err, PipelineError::MissingLabelColumn { .. }));
    }

    #[test]
    fn test_flagging_leaves_records_untouched() {
        let records = labeled(
            (0..5).map(|i| record(&i.to_string(), "a", base())).collect(),
            &[ClusterLabel::Cluster(0); 5],
        );
        let before = records.clone();
        let _ = flag(&records);
        assert_eq!(records, before);
    }

    #[test]
    fn test_summary_without_members_is_skipped() {
        let records = labeled(
            vec![record("1", "a", base()), record("2", "b", base())],
            &[ClusterLabel::Cluster(0); 2],
        );
        let mut summaries = ClusterSummarizer::default().summarize(&records).unwrap();
        let mut orphan = summaries[0].clone();
        orphan.id = 9;
        summaries.insert(0, orphan);

        AnomalyFlagger::default()
            .flag_clusters(&records, &mut summaries)
            .unwrap();
        assert!(!summaries[0].flagged);
        assert!(summaries[1].flagged);
    }
}
