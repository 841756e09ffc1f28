// System status display: DB stats, model presence, recent runs.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::db::{self, queries};
use crate::embedding::download;

/// Display system status to the terminal.
pub fn show(config: &Config) -> Result<()> {
    let db_path = config.db_path.as_str();

    // Model files
    if download::model_files_present(&config.model_dir, &config.model) {
        println!(
            "Embedding model: {} ({})",
            config.model.name,
            config.model_path().display()
        );
    } else {
        println!("Embedding model: {} not downloaded", config.model.name);
        println!("  Run `murmur download-model` to fetch it");
    }

    if !Path::new(db_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `murmur init` to set up the database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    let conn = db::open(db_path)?;
    let stats = queries::stats(&conn)?;
    println!(
        "Records: {} from {} authors",
        stats.records, stats.authors
    );
    if stats.records == 0 {
        println!("  Run `murmur import <file>` to load records");
    }

    let runs = queries::recent_runs(&conn, 5)?;
    if runs.is_empty() {
        println!("Clustering runs: none yet");
        println!("  Run `murmur cluster` to cluster the imported records");
    } else {
        println!("Clustering runs: {} total, {} most recent:", stats.runs, runs.len());
        for run in &runs {
            println!(
                "  #{} {}: {} records, {} clusters ({} flagged), {} noise",
                run.id,
                run.generated_at,
                run.total_records,
                run.cluster_count,
                run.flagged_clusters,
                run.noise_records
            );
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
