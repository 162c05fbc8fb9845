//! Retrieval Benchmark CLI
//!
//! Compares embedding providers on how well they surface the right tutoring
//! passages for a set of labeled queries.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run against every provider with credentials in the environment
//! VOYAGE_API_KEY=... OPENAI_API_KEY=... ./retrieval-benchmark run
//!
//! # Only one provider, custom fixtures, JSON output after the report
//! ./retrieval-benchmark run \
//!     --provider voyage \
//!     --corpus ./fixtures/corpus.json \
//!     --queries ./fixtures/queries.json \
//!     --json
//!
//! # Check fixtures without calling any API
//! ./retrieval-benchmark validate
//! ```
//!
//! ## Providers Configuration
//!
//! Providers and retry behavior are configured in `providers.toml`. Without
//! that file a Voyage and an OpenAI provider are configured by default.
//! A provider only runs when its API key variable is set.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use retrieval_benchmark::benchmark::{render_report, BenchmarkResult, BenchmarkRunner};
use retrieval_benchmark::config::{env_lookup, ProvidersConfig, DEFAULT_CONFIG_PATH};
use retrieval_benchmark::fixtures::Fixtures;
use retrieval_benchmark::orchestrator::BatchEmbedder;

#[derive(Parser)]
#[command(name = "retrieval-benchmark")]
#[command(about = "Compare embedding providers on a labeled tutoring corpus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Fixture overrides shared by subcommands
#[derive(Args)]
struct FixtureArgs {
    /// Corpus JSON file (built-in tutoring corpus if omitted)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Query JSON file (built-in query set if omitted)
    #[arg(long)]
    queries: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark for every configured provider with credentials
    ///
    /// Providers run one after another. The comparative report is written
    /// to stdout; progress goes to stderr.
    Run {
        #[command(flatten)]
        fixtures: FixtureArgs,

        /// Path to providers config file (TOML)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Only run the named provider (repeatable)
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Hard deadline per provider run, retries included
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Also print results as JSON after the report
        #[arg(long)]
        json: bool,
    },

    /// Validate corpus and query fixtures
    Validate {
        #[command(flatten)]
        fixtures: FixtureArgs,
    },

    /// List configured providers and whether their credentials are set
    List {
        /// Path to providers config file (TOML)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

/// JSON document emitted by `run --json`
#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    corpus: &'a str,
    chunk_count: usize,
    query_count: usize,
    results: &'a [BenchmarkResult],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs to stderr so the report on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            fixtures,
            config,
            providers,
            timeout_secs,
            json,
        } => {
            run_benchmark(&fixtures, &config, &providers, timeout_secs, json).await?;
        }

        Commands::Validate { fixtures } => {
            validate_fixtures(&fixtures)?;
        }

        Commands::List { config } => {
            list_providers(&config)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and parseable, `info` otherwise
fn log_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    directives
        .and_then(|d| tracing_subscriber::EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"))
}

fn load_fixtures(args: &FixtureArgs) -> Result<Fixtures> {
    let fixtures = Fixtures::load(args.corpus.as_deref(), args.queries.as_deref())
        .context("Failed to load fixtures")?;
    Ok(fixtures)
}

fn load_config(path: &Path) -> Result<ProvidersConfig> {
    let config = ProvidersConfig::load_or_default(path)
        .with_context(|| format!("Failed to load providers config: {:?}", path))?;
    Ok(config)
}

/// Run the benchmark with all providers that have credentials
async fn run_benchmark(
    fixture_args: &FixtureArgs,
    config_path: &Path,
    only: &[String],
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let resolved = config.resolve_credentials(only, env_lookup)?;

    let fixtures = load_fixtures(fixture_args)?;
    // Use eprintln for progress (line-buffered even when piped)
    eprintln!(
        "Loaded corpus '{}': {} chunks, {} queries",
        fixtures.corpus().metadata.name,
        fixtures.chunks().len(),
        fixtures.queries().len()
    );
    eprintln!(
        "  Providers: {}",
        resolved
            .iter()
            .map(|p| p.settings.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let policy = config.retry.to_policy();
    let timeout = timeout_secs.map(Duration::from_secs);

    let mut results = Vec::new();
    let mut failed = Vec::new();

    for entry in &resolved {
        let settings = &entry.settings;
        eprintln!(
            "\n▶ Testing: {} ({}, batch size {})",
            settings.name(),
            settings.model,
            settings.batch_size
        );

        let provider = match entry.build() {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("  Failed to initialize: {}", e);
                failed.push(settings.name().to_string());
                continue;
            }
        };

        let runner = BenchmarkRunner::new(&fixtures, BatchEmbedder::new(settings.batch_size, policy))
            .with_timeout(timeout);

        match runner.run(provider.as_ref()).await {
            Ok(result) => {
                eprintln!("  {}", result.format_summary());
                results.push(result);
            }
            Err(e) => {
                tracing::error!(provider = settings.name(), "benchmark failed: {}", e);
                eprintln!("  Benchmark failed: {}", e);
                failed.push(settings.name().to_string());
            }
        }
    }

    println!();
    print!("{}", render_report(&results));

    if json {
        let document = JsonReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            corpus: &fixtures.corpus().metadata.name,
            chunk_count: fixtures.chunks().len(),
            query_count: fixtures.queries().len(),
            results: &results,
        };
        println!("\n{}", serde_json::to_string_pretty(&document)?);
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} provider runs failed: {}",
            failed.len(),
            resolved.len(),
            failed.join(", ")
        );
    }

    Ok(())
}

/// Validate corpus and query fixtures
fn validate_fixtures(args: &FixtureArgs) -> Result<()> {
    match (&args.corpus, &args.queries) {
        (None, None) => println!("Validating built-in fixtures..."),
        (corpus, queries) => println!(
            "Validating corpus {} and queries {}...",
            corpus.as_ref().map_or("(built-in)".to_string(), |p| format!("{:?}", p)),
            queries.as_ref().map_or("(built-in)".to_string(), |p| format!("{:?}", p)),
        ),
    }

    let fixtures = load_fixtures(args)?;
    let corpus = fixtures.corpus();
    let queries = fixtures.query_file();

    println!("✓ Valid fixtures");
    println!("  Corpus: {} ({} chunks)", corpus.metadata.name, corpus.chunks.len());
    if !corpus.metadata.description.is_empty() {
        println!("  Description: {}", corpus.metadata.description);
    }
    println!("  Queries: {} ({} queries)", queries.metadata.name, queries.queries.len());

    let mut subjects = std::collections::BTreeMap::new();
    for chunk in &corpus.chunks {
        *subjects.entry(chunk.subject.as_str()).or_insert(0usize) += 1;
    }
    println!("  Subject distribution:");
    for (subject, count) in subjects {
        println!("    {}: {}", subject, count);
    }

    println!("  Tag distribution:");
    for (tag, count) in fixtures.tag_counts() {
        println!("    {}: {}", tag, count);
    }

    Ok(())
}

fn list_providers(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              CONFIGURED EMBEDDING PROVIDERS                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    if config_path.exists() {
        println!("From {:?}:", config_path);
    } else {
        println!("Built-in defaults ({:?} not found):", config_path);
    }
    println!("─────────────────────────────────────────────────────────────────");
    for settings in &config.providers {
        let credential = if settings.api_key(env_lookup).is_some() {
            "✓ set"
        } else {
            "✗ missing"
        };
        println!(
            "  {:16} {:8} {:30} batch {:>3}  {} {}",
            settings.name(),
            settings.kind.name(),
            settings.model,
            settings.batch_size,
            settings.api_key_env,
            credential
        );
    }

    let retry = &config.retry;
    println!("\nRETRY (rate limits only):");
    println!("─────────────────────────────────────────────────────────────────");
    println!("  max_retries        {}", retry.max_retries);
    println!("  initial_delay_secs {}", retry.initial_delay_secs);
    println!("  growth_factor      {}", retry.growth_factor);

    println!("\nCONFIGURATION:");
    println!("─────────────────────────────────────────────────────────────────");
    println!("  Providers are configured in {}. Example:", DEFAULT_CONFIG_PATH);
    println!();
    println!("  [[providers]]");
    println!("  kind = \"openai\"");
    println!("  model = \"text-embedding-3-large\"");
    println!("  api_key_env = \"OPENAI_API_KEY\"");
    println!("  dimensions = 1024");

    Ok(())
}
