// Colored terminal output for run reports.
//
// main.rs delegates all report formatting here: the cluster table, the
// flagged-cluster details, the cross-cluster author list, and the
// parameter-sweep table.

use colored::Colorize;

use crate::cluster::grid::GridResult;
use crate::pipeline::RunReport;
use crate::summary::ClusterSummary;

/// Display a run report in the terminal.
pub fn display_report(report: &RunReport) {
    println!(
        "\n{}",
        format!(
            "=== Cluster Report ({} records, {} clusters) ===",
            report.total_records,
            report.clusters.len()
        )
        .bold()
    );
    println!(
        "  Generated {}  |  Noise: {} records",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.noise_records
    );
    println!();

    if report.clusters.is_empty() {
        println!("  No clusters found. Every record was labeled noise.");
        println!("  Try a smaller MURMUR_MIN_CLUSTER_SIZE or MURMUR_MIN_SAMPLES.");
    } else {
        display_cluster_table(&report.clusters);
    }

    let flagged: Vec<&ClusterSummary> = report.flagged_clusters().collect();
    if !flagged.is_empty() {
        println!(
            "\n{}",
            format!("=== Flagged Clusters ({}) ===", flagged.len()).bold()
        );
        for cluster in flagged {
            display_cluster_detail(cluster);
        }
    }

    if !report.flagged_users.is_empty() {
        println!(
            "\n{}",
            format!(
                "=== Authors Active in Multiple Clusters ({}) ===",
                report.flagged_users.len()
            )
            .bold()
        );
        for user in &report.flagged_users {
            println!("  {} {}", "~".yellow(), user);
        }
    }
    println!();
}

/// Display parameter-sweep results, one row per pair.
pub fn display_grid(results: &[GridResult]) {
    println!(
        "\n{}",
        format!("=== Clustering Parameter Sweep ({} pairs) ===", results.len()).bold()
    );
    println!(
        "  {:>8}  {:>8}  {:>8}  {:>6}  {:>7}  {:>7}  {:>7}",
        "min_size".dimmed(),
        "min_samp".dimmed(),
        "clusters".dimmed(),
        "noise".dimmed(),
        "largest".dimmed(),
        "median".dimmed(),
        "mean".dimmed(),
    );
    println!("  {}", "-".repeat(64).dimmed());

    let stat = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    for r in results {
        println!(
            "  {:>8}  {:>8}  {:>8}  {:>6}  {:>7}  {:>7}  {:>7}",
            r.min_cluster_size,
            r.min_samples,
            r.n_clusters,
            r.n_noise,
            r.largest,
            stat(r.median),
            stat(r.mean)
        );
    }
    println!();
}

fn display_cluster_table(clusters: &[ClusterSummary]) {
    println!(
        "  {:>4}  {:>5}  {:<7}  {:<21}  {}",
        "ID".dimmed(),
        "Size".dimmed(),
        "Flag".dimmed(),
        "Active".dimmed(),
        "Keywords".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for cluster in clusters {
        let flag = if cluster.flagged {
            "!!".red().bold()
        } else {
            "".normal()
        };
        let active = format!(
            "{} - {}",
            cluster.first_seen.format("%m-%d"),
            cluster.last_seen.format("%m-%d")
        );
        let keywords = super::truncate_chars(&cluster.keywords.join(", "), 40);
        println!(
            "  {:>4}  {:>5}  {:<7}  {:<21}  {}",
            cluster.id, cluster.size, flag, active, keywords
        );
    }
}

fn display_cluster_detail(cluster: &ClusterSummary) {
    println!(
        "\n  {} {} ({} posts)",
        "Cluster".bold(),
        cluster.id.to_string().bold(),
        cluster.size
    );
    for reason in &cluster.flag_reasons {
        println!("    {} {}", "!".bright_red(), reason);
    }

    if !cluster.top_authors.is_empty() {
        let authors: Vec<String> = cluster
            .top_authors
            .iter()
            .map(|(author, count)| format!("{author} ({count})"))
            .collect();
        println!("    Top authors: {}", authors.join(", "));
    }

    let busiest = cluster.daily_activity.iter().max_by_key(|(_, count)| **count);
    if let Some((day, count)) = busiest {
        println!("    Busiest day: {day} ({count} posts)");
    }

    for title in &cluster.headline {
        println!("    - {}", super::truncate_chars(title, 100).dimmed());
    }
}
