// Database queries: records, runs and per-run labels.
//
// Every database interaction goes through this module. Records are rebuilt
// through `Record::new` on load, so a row that no longer validates is an
// error rather than a half-built record.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{DbStats, RunInfo};
use crate::pipeline::RunReport;
use crate::records::{ClusterLabel, Record};

// --- Records ---

/// Insert or update records by id. Runs in one transaction.
pub fn save_records(conn: &Connection, records: &[Record]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records (id, author, title, body, top_comments, created_at,
                                  source, score, num_comments, flair, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                author = ?2, title = ?3, body = ?4, top_comments = ?5,
                created_at = ?6, source = ?7, score = ?8, num_comments = ?9,
                flair = ?10, tags = ?11",
        )?;
        for record in records {
            let tags = serde_json::to_string(&record.tags)?;
            stmt.execute(params![
                record.id,
                record.author,
                record.title,
                record.body,
                record.top_comments,
                record.created_at.to_rfc3339(),
                record.source,
                record.score,
                record.num_comments,
                record.flair,
                tags,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Load every stored record, oldest first, with no labels.
pub fn load_records(conn: &Connection) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(
        "SELECT id, author, title, body, top_comments, created_at,
                source, score, num_comments, flair, tags
         FROM records ORDER BY created_at, id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(RecordRow {
            id: row.get(0)?,
            author: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            top_comments: row.get(4)?,
            created_at: row.get(5)?,
            source: row.get(6)?,
            score: row.get(7)?,
            num_comments: row.get(8)?,
            flair: row.get(9)?,
            tags: row.get(10)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record()?);
    }
    Ok(records)
}

struct RecordRow {
    id: String,
    author: String,
    title: String,
    body: String,
    top_comments: Option<String>,
    created_at: String,
    source: Option<String>,
    score: i64,
    num_comments: u32,
    flair: Option<String>,
    tags: String,
}

impl RecordRow {
    fn into_record(self) -> Result<Record> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("Bad created_at for record {}: {}", self.id, self.created_at))?
            .with_timezone(&Utc);
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .with_context(|| format!("Bad tags JSON for record {}", self.id))?;

        let mut record = Record::new(self.id, self.author, self.title, self.body, created_at)?
            .with_engagement(self.score, self.num_comments)
            .with_flair(self.flair)
            .with_tags(tags);
        if let Some(comments) = self.top_comments {
            record = record.with_top_comments(comments);
        }
        if let Some(source) = self.source {
            record = record.with_source(source);
        }
        Ok(record)
    }
}

pub fn record_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(count as usize)
}

// --- Runs ---

/// Store a finished run: the report JSON plus the label of every record.
/// Returns the new run id.
pub fn save_run(
    conn: &Connection,
    report: &RunReport,
    records: &[Record],
    embedding_cache: Option<&str>,
) -> Result<i64> {
    let report_json = serde_json::to_string(report).context("Failed to serialize run report")?;
    let flagged = report.flagged_clusters().count();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs (generated_at, total_records, noise_records, cluster_count,
                           flagged_clusters, report_json, embedding_cache)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.generated_at.to_rfc3339(),
            report.total_records as i64,
            report.noise_records as i64,
            report.clusters.len() as i64,
            flagged as i64,
            report_json,
            embedding_cache,
        ],
    )?;
    let run_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO cluster_labels (run_id, record_id, label) VALUES (?1, ?2, ?3)",
        )?;
        for record in records {
            stmt.execute(params![run_id, record.id, record.label().to_db()])?;
        }
    }
    tx.commit()?;

    Ok(run_id)
}

/// The most recent run's report, if any run has been stored.
pub fn latest_report(conn: &Connection) -> Result<Option<RunReport>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT report_json FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => {
            let report = serde_json::from_str(&json).context("Stored run report is corrupt")?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}

/// The most recent runs, newest first.
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, generated_at, total_records, noise_records, cluster_count,
                flagged_clusters, embedding_cache
         FROM runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(RunInfo {
            id: row.get(0)?,
            generated_at: row.get(1)?,
            total_records: row.get::<_, i64>(2)? as usize,
            noise_records: row.get::<_, i64>(3)? as usize,
            cluster_count: row.get::<_, i64>(4)? as usize,
            flagged_clusters: row.get::<_, i64>(5)? as usize,
            embedding_cache: row.get(6)?,
        })
    })?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(row?);
    }
    Ok(runs)
}

/// Labels a run assigned, keyed by record id.
pub fn run_labels(conn: &Connection, run_id: i64) -> Result<HashMap<String, ClusterLabel>> {
    let mut stmt =
        conn.prepare("SELECT record_id, label FROM cluster_labels WHERE run_id = ?1")?;
    let rows = stmt.query_map(params![run_id], |row| {
        let id: String = row.get(0)?;
        let label: Option<i64> = row.get(1)?;
        Ok((id, label))
    })?;

    let mut labels = HashMap::new();
    for row in rows {
        let (id, label) = row?;
        let label = ClusterLabel::from_db(label)
            .with_context(|| format!("Bad label for record {id} in run {run_id}"))?;
        labels.insert(id, label);
    }
    Ok(labels)
}

pub fn stats(conn: &Connection) -> Result<DbStats> {
    let (records, authors): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT author) FROM records",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
    Ok(DbStats {
        records: records as usize,
        authors: authors as usize,
        runs: runs as usize,
    })
}
