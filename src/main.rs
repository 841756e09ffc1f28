use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use murmur::cluster::grid;
use murmur::config::Config;
use murmur::db::{self, queries};
use murmur::embedding::download;
use murmur::embedding::onnx::SentenceEmbedder;
use murmur::output::{self, terminal};
use murmur::pipeline::Pipeline;
use murmur::records::{comments, import};

/// Murmur: cluster forum discussion and flag coordinated posting.
///
/// Embeds imported posts, groups them by density-based clustering, and
/// flags clusters and authors whose activity looks coordinated.
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import records from a JSON export (an array of posts)
    Import {
        /// Path to the JSON file
        file: PathBuf,

        /// JSON array of comments (with post_id) to pick top comments from
        #[arg(long)]
        comments: Option<PathBuf>,

        /// Comments kept per post, best first
        #[arg(long, default_value_t = murmur::records::comments::DEFAULT_TOP_COMMENTS)]
        top_comments: usize,
    },

    /// Download the sentence embedding model
    DownloadModel,

    /// Embed, cluster, summarize and flag the imported records
    Cluster {
        /// Recompute embeddings even if a cache file exists
        #[arg(long)]
        overwrite: bool,

        /// Name of the embedding cache file (without extension)
        #[arg(long, default_value = "posts")]
        cache_name: String,
    },

    /// Sweep clustering thresholds over the imported records and report
    /// cluster counts and sizes for each pair
    GridSearch {
        /// Recompute embeddings even if a cache file exists
        #[arg(long)]
        overwrite: bool,

        /// Name of the embedding cache file (without extension)
        #[arg(long, default_value = "posts")]
        cache_name: String,
    },

    /// Show the most recent clustering report
    Report {
        /// Also write the report as JSON into the report directory
        #[arg(long)]
        json: bool,
    },

    /// Show system status (model, DB stats, recent runs)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("murmur=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing Murmur database...");
            let config = Config::load()?;
            let conn = db::initialize(&config.db_path)?;
            let table_count = db::schema::table_count(&conn)?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext steps:");
            println!("  murmur download-model");
            println!("  murmur import <posts.json>");
        }

        Commands::Import {
            file,
            comments: comments_file,
            top_comments,
        } => {
            let config = Config::load()?;
            let mut records = import::load_json_with(&file, top_comments)?;
            if records.is_empty() {
                anyhow::bail!("No valid records found in {}", file.display());
            }
            if let Some(path) = comments_file {
                let thread = comments::load_comments_json(&path)?;
                let updated = comments::attach_top_comments(&mut records, &thread, top_comments);
                println!("Top comments attached to {updated} records");
            }

            let conn = db::initialize(&config.db_path)?;
            let saved = queries::save_records(&conn, &records)?;
            let total = queries::record_count(&conn)?;

            let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for tag in records.iter().flat_map(|r| r.tags.iter()) {
                *tag_counts.entry(tag.as_str()).or_default() += 1;
            }

            println!("Imported {saved} records ({total} in database)");
            if !tag_counts.is_empty() {
                println!("\nTags:");
                for (tag, count) in &tag_counts {
                    println!("  {:<20} {}", tag, count);
                }
            }
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading sentence embedding model...");
            println!("  Destination: {}", model_dir.display());

            download::download_model(model_dir, &config.model).await?;

            println!("\n{}", "Model downloaded successfully.".bold());
            println!("You can now run `murmur cluster`.");
        }

        Commands::Cluster {
            overwrite,
            cache_name,
        } => {
            let config = Config::load()?;
            config.require_model()?;
            let conn = db::open(&config.db_path)?;

            let records = queries::load_records(&conn)?;
            if records.is_empty() {
                println!("No records imported yet. Run `murmur import <file>` first.");
                return Ok(());
            }

            let cache_path = config.cache_path(&cache_name);
            let embedder = SentenceEmbedder::load(&config.model_path(), config.model)
                .context("Failed to load the embedding model")?;

            println!(
                "Clustering {} records with {}...",
                records.len(),
                config.model.name
            );
            let pipeline = Pipeline::new(config.pipeline_settings(&cache_path, overwrite));
            let run = pipeline.run(records, embedder)?;

            let cache_display = cache_path.display().to_string();
            let run_id = queries::save_run(&conn, &run.report, &run.records, Some(&cache_display))?;
            info!(run_id, "Run stored");

            terminal::display_report(&run.report);
            let report_path = output::write_json_report(&run.report, &config.report_dir)?;
            println!(
                "{}",
                format!("JSON report saved to: {}", report_path.display()).bold()
            );
        }

        Commands::GridSearch {
            overwrite,
            cache_name,
        } => {
            let config = Config::load()?;
            config.require_model()?;
            let conn = db::open(&config.db_path)?;
            let records = queries::load_records(&conn)?;
            if records.is_empty() {
                println!("No records imported yet. Run `murmur import <file>` first.");
                return Ok(());
            }

            let cache_path = config.cache_path(&cache_name);
            let embedder = SentenceEmbedder::load(&config.model_path(), config.model)
                .context("Failed to load the embedding model")?;
            let settings = config.pipeline_settings(&cache_path, overwrite);
            let metric = settings.cluster.metric;

            println!("Sweeping clustering thresholds over {} records...", records.len());
            let reduced = Pipeline::new(settings).embed_and_reduce(&records, embedder)?;

            let results = grid::grid_search(&reduced, metric)?;
            terminal::display_grid(&results);
            let path = output::write_grid_results(&results, &config.report_dir, Utc::now())?;
            println!(
                "{}",
                format!("Grid results saved to: {}", path.display()).bold()
            );
        }

        Commands::Report { json } => {
            let config = Config::load()?;
            let conn = db::open(&config.db_path)?;

            let Some(report) = queries::latest_report(&conn)? else {
                println!("No clustering runs yet. Run `murmur cluster` first.");
                return Ok(());
            };

            terminal::display_report(&report);
            if json {
                let report_path = output::write_json_report(&report, &config.report_dir)?;
                println!(
                    "{}",
                    format!("JSON report saved to: {}", report_path.display()).bold()
                );
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            murmur::status::show(&config)?;
        }
    }

    Ok(())
}
