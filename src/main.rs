use anyhow::Context;
use clap::Parser;
use siftrank_core::{CancellationToken, Dataset, Deadline};
use siftrank_ranking::{ConstraintSet, EngineConfig, MatchEngine, SearchOptions, SortKey};
use siftrank_stats::{LmdbStatistics, MemoryStatistics, StatisticPersistence, StatisticsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Rank records against soft and hard field constraints
#[derive(Parser, Debug)]
#[command(name = "siftrank")]
#[command(about = "Soft-constraint search and ranking", long_about = None)]
struct Args {
    /// Dataset file (JSON with "entities" and "records")
    #[arg(short, long)]
    data: PathBuf,

    /// Entity type to search
    #[arg(short, long)]
    entity: String,

    /// Constraint set as JSON: one group object or an array of groups
    #[arg(short, long, default_value = "[]")]
    query: String,

    /// Minimum score; 1.0 returns hard matches only
    #[arg(long, default_value_t = 0.0)]
    threshold: f64,

    /// Return the best K records using percentile windows
    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(long)]
    limit: Option<usize>,

    /// Secondary order for records tied on score and key; prefix with '-' for descending
    #[arg(long)]
    order: Vec<String>,

    /// Skip soft scoring when there are more hard matches than this
    #[arg(long)]
    skip_soft_above: Option<usize>,

    /// Abort the query after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Directory for the persistent (LMDB) statistics cache
    #[arg(long)]
    stats_dir: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the statistics cache timeout in seconds; negative never expires
    #[arg(long, allow_hyphen_values = true)]
    stats_timeout_secs: Option<f64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(secs) = args.stats_timeout_secs {
        config.stats_timeout_secs = secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting siftrank v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&args)?;

    let (schema, store) = Dataset::from_path(&args.data)
        .with_context(|| format!("loading dataset {}", args.data.display()))?
        .into_parts()?;
    info!("Loaded dataset {:?}", args.data);

    let persistence: Arc<dyn StatisticPersistence> = match &args.stats_dir {
        Some(dir) => {
            info!("Statistics cache: {:?}", dir);
            Arc::new(LmdbStatistics::new(dir)?)
        }
        None => Arc::new(MemoryStatistics::new()),
    };
    let stats = Arc::new(StatisticsStore::new(persistence, config.stats_config()));
    let engine = MatchEngine::with_stats(Arc::new(schema), Arc::new(store), stats, config);

    let (constraints, mut ignored) = ConstraintSet::from_str_json(&args.query)?;
    for diagnostic in &ignored {
        warn!("Ignoring constraint: {}", diagnostic);
    }

    let token = CancellationToken::new();
    let deadline = match args.timeout_ms {
        Some(ms) => Deadline::after(Duration::from_millis(ms)),
        None => Deadline::none(),
    }
    .with_token(token.clone());

    let entity = args.entity.clone();
    let top_k = args.top_k;
    let options = SearchOptions {
        threshold: args.threshold,
        order: args.order.iter().map(|s| SortKey::parse(s)).collect(),
        offset: args.offset,
        limit: args.limit,
        skip_soft_above: args.skip_soft_above,
        deadline: deadline.clone(),
    };

    let mut task = tokio::task::spawn_blocking(move || -> anyhow::Result<serde_json::Value> {
        match top_k {
            Some(k) => {
                let mut result = engine.top_k(&entity, &constraints, k, &deadline)?;
                ignored.append(&mut result.ignored);
                result.ignored = ignored;
                Ok(serde_json::to_value(result)?)
            }
            None => {
                let mut response = engine.search(&entity, &constraints, &options)?;
                ignored.append(&mut response.ignored);
                response.ignored = ignored;
                Ok(serde_json::to_value(response)?)
            }
        }
    });

    let finished = tokio::select! {
        result = &mut task => Some(result??),
        _ = tokio::signal::ctrl_c() => None,
    };
    let output = match finished {
        Some(output) => output,
        None => {
            info!("Shutdown signal received, cancelling query");
            token.cancel();
            task.await??
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
