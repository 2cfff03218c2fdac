//! dictcache CLI
//!
//! Command-line front end for the dictcache dictionary cache: one-shot
//! lookups against a rows file, and a synthetic load benchmark.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dictcache_core::{AttributeSpec, AttributeType, DictionaryLifetime, DictionaryStructure, Key, SourceRow};
use dictcache_engine::{CacheConfig, CacheDictionary, Defaults, DictionaryStats};
use dictcache_source::{FileSource, MemorySource};

/// dictcache - direct-mapped, time-expiring dictionary cache
#[derive(Parser)]
#[command(name = "dictcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one attribute for a list of keys
    Lookup(LookupArgs),

    /// Run a synthetic lookup workload
    Bench(BenchArgs),
}

#[derive(Args)]
struct LookupArgs {
    /// Config file (JSON): { "cache": {...}, "structure": [...] }
    #[arg(short, long, env = "DICTCACHE_CONFIG")]
    config: PathBuf,
    /// Rows file (JSON array of { "key", "values" })
    #[arg(short, long)]
    rows: PathBuf,
    /// Attribute to read
    #[arg(short, long)]
    attribute: String,
    /// Keys to look up
    #[arg(required = true)]
    keys: Vec<Key>,
    /// Override the configured cache size
    #[arg(long, env = "DICTCACHE_SIZE")]
    size: Option<usize>,
    /// Serve expired values while refreshing
    #[arg(long, env = "DICTCACHE_ALLOW_STALE")]
    allow_stale: bool,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
    /// Print dictionary statistics afterwards
    #[arg(long)]
    stats: bool,
}

#[derive(Args)]
struct BenchArgs {
    /// Rows held by the synthetic source
    #[arg(short, long, default_value = "100000")]
    count: u64,
    /// Cache size in slots
    #[arg(short, long, default_value = "65536")]
    size: usize,
    /// Keys per lookup batch
    #[arg(short, long, default_value = "1024")]
    batch: usize,
    /// Number of batches
    #[arg(short, long, default_value = "1000")]
    iterations: u64,
    /// Fetch worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,
    /// Serve expired values while refreshing
    #[arg(long)]
    allow_stale: bool,
    /// Workload RNG seed
    #[arg(long, default_value = "7")]
    seed: u64,
}

/// Config file layout.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    cache: CacheConfig,
    structure: DictionaryStructure,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dictcache=debug,info"
    } else {
        "dictcache=info,warn"
    };

    let json_layer = cli.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!cli.log_json).then(tracing_subscriber::fmt::layer);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(json_layer)
        .with(text_layer)
        .init();

    match cli.command {
        Commands::Lookup(args) => cmd_lookup(args),
        Commands::Bench(args) => cmd_bench(args),
    }
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

/// Look up one attribute
fn cmd_lookup(args: LookupArgs) -> Result<()> {
    let FileConfig { mut cache, structure } = load_config(&args.config)?;
    if let Some(size) = args.size {
        cache = cache.size(size);
    }
    if args.allow_stale {
        cache = cache.allow_read_expired_keys(true);
    }

    let source = FileSource::open(&args.rows, structure.clone()).context("Failed to load rows file")?;
    let dictionary = CacheDictionary::new("cli", structure, Arc::new(source), cache)
        .context("Failed to create dictionary")?;

    let index = dictionary.structure().index_of(&args.attribute)?;
    let attr_type = dictionary.structure().attributes()[index].attr_type;
    let keys = &args.keys;

    let values: Vec<String> = match attr_type {
        AttributeType::UInt64 => to_strings(dictionary.get_u64(&args.attribute, keys)?),
        AttributeType::Int64 => to_strings(dictionary.get_i64(&args.attribute, keys)?),
        AttributeType::Float64 => to_strings(dictionary.get_f64(&args.attribute, keys)?),
        AttributeType::String => dictionary
            .get_strings(&args.attribute, keys, Defaults::Attribute)?
            .to_vec(),
    };

    if args.json {
        let rows: Vec<_> = keys
            .iter()
            .zip(&values)
            .map(|(key, value)| serde_json::json!({ "key": key, "value": value }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{} {} ({})", "🔍 Attribute:".cyan().bold(), args.attribute, attr_type);
        for (key, value) in keys.iter().zip(&values) {
            println!("   {} {}", format!("{:>20}", key).dimmed(), value);
        }
    }

    if args.stats {
        print_stats(&dictionary.stats(), args.json)?;
    }
    Ok(())
}

fn to_strings<T: ToString>(values: Vec<T>) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Run a synthetic workload
fn cmd_bench(args: BenchArgs) -> Result<()> {
    println!(
        "{} {} batches of {} keys",
        "📊 Benchmarking with".cyan().bold(),
        args.iterations,
        args.batch
    );

    // Build source
    println!("\n{}", "1. Populating source...".dimmed());
    let start = Instant::now();
    let structure = DictionaryStructure::new(vec![
        AttributeSpec::new("name", AttributeType::String, "".into()),
        AttributeSpec::new("score", AttributeType::UInt64, 0u64.into()),
    ])?;
    let rows = (0..args.count).map(|key| SourceRow::new(key, vec![format!("user-{}", key).into(), key.into()]));
    let source = MemorySource::with_rows(structure.clone(), rows)?;
    println!("   ✓ {} rows: {:?}", args.count, start.elapsed());

    let config = CacheConfig::new()
        .size(args.size)
        .lifetime(DictionaryLifetime::from_secs(5, 10))
        .allow_read_expired_keys(args.allow_stale)
        .update_threads(args.threads.max(1))
        .rng_seed(args.seed);
    let dictionary = CacheDictionary::new("bench", structure, Arc::new(source), config)?;

    // Keys drawn from twice the source range: about half miss.
    println!("\n{}", "2. Running lookups...".dimmed());
    let key_space = args.count.saturating_mul(2).max(1);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let pb = ProgressBar::new(args.iterations);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("   [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut failed = 0u64;
    for i in 0..args.iterations {
        let keys: Vec<Key> = (0..args.batch).map(|_| rng.gen_range(0..key_space)).collect();
        let result = if i % 2 == 0 {
            dictionary.get_u64("score", &keys).map(|_| ())
        } else {
            dictionary.get_strings("name", &keys, Defaults::Attribute).map(|_| ())
        };
        if let Err(err) = result {
            failed += 1;
            info!(error = %err, "batch failed");
        }
        pb.inc(1);
    }
    pb.finish();
    let elapsed = start.elapsed();

    let total_keys = args.iterations * args.batch as u64;
    let rate = total_keys as f64 / elapsed.as_secs_f64();
    println!("   ✓ {} keys: {:?}", total_keys, elapsed);

    println!("\n{}", "📈 Results:".green().bold());
    println!("   Lookup rate: {:.0} keys/sec", rate);
    println!("   Time per batch: {:.2}µs", elapsed.as_micros() as f64 / args.iterations.max(1) as f64);
    if failed == 0 {
        println!("   {} Every batch answered", "✅".green());
    } else {
        println!("   {} {} batches failed", "❌".red(), failed);
    }

    print_stats(&dictionary.stats(), false)
}

fn print_stats(stats: &DictionaryStats, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("\n{}", "Dictionary stats:".yellow().bold());
    println!("   {} {}", "Capacity:".dimmed(), stats.capacity);
    println!("   {} {}", "Elements:".dimmed(), stats.element_count);
    println!("   {} {:.3}", "Load factor:".dimmed(), stats.load_factor);
    println!("   {} {}", "Queries:".dimmed(), stats.query_count);
    println!("   {} {:.3}", "Hit rate:".dimmed(), stats.hit_rate);
    println!("   {} {}/{}", "Queue:".dimmed(), stats.queue_len, stats.queue_capacity);
    println!("   {} {}", "Source requests:".dimmed(), stats.profile.source_requests);
    println!("   {} {}", "Stale reads:".dimmed(), stats.profile.reads_rotted_values);
    Ok(())
}
