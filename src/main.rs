use anyhow::Result;
use clap::Parser;
use patload::{
    verify, BigQueryWarehouse, Catalog, CompletionPolicy, LoadOptions, Orchestrator,
    ProgressStore, SharedProgress, PROGRESS_FILE_NAME,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "patload")]
#[command(about = "Resumable bulk loader for PATSTAT CSV exports into BigQuery")]
struct Args {
    /// Directory holding the <table>_part*.csv export files
    csv_dir: PathBuf,

    /// Destination GCP project
    project: String,

    /// Destination BigQuery dataset
    dataset: String,

    /// Plan only: report pending creations and loads without touching the warehouse
    #[arg(long)]
    dry_run: bool,

    /// Resume from the progress file instead of starting fresh
    #[arg(long)]
    resume: bool,

    /// Restrict the run to these tables (comma separated)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Assume every table already exists; never probe or create
    #[arg(long)]
    skip_create: bool,

    /// Compare row counts against the catalog instead of loading
    #[arg(long)]
    verify: bool,

    /// Catalog file overriding the builtin PATSTAT table set
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Progress file location (default: <csv_dir>/load_progress.json)
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Tables loaded concurrently
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Mark tables complete even when some of their files failed
    #[arg(long)]
    complete_on_error: bool,

    /// Exit non-zero when any load or verification failed
    #[arg(long)]
    fail_on_error: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut catalog = match &args.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::patstat(),
    };
    if !args.tables.is_empty() {
        for name in catalog.restrict_to(&args.tables) {
            warn!("requested table {} is not in the catalog", name);
        }
        if catalog.is_empty() {
            anyhow::bail!("none of the requested tables are in the catalog");
        }
    }
    info!(
        "targeting {}:{} with {} table(s) in scope",
        args.project,
        args.dataset,
        catalog.len()
    );

    let warehouse = Arc::new(BigQueryWarehouse::new(&args.project, &args.dataset));

    if args.verify {
        let results = verify::verify(warehouse.as_ref(), &catalog).await?;
        println!("\n=== verification ===");
        for result in &results {
            println!("{}", result);
        }
        let mismatched = results.iter().filter(|r| !r.status.is_ok()).count();
        if mismatched > 0 {
            warn!(
                "{} of {} table(s) are off their expected counts",
                mismatched,
                results.len()
            );
            if args.fail_on_error {
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let progress_path = args
        .progress_file
        .clone()
        .unwrap_or_else(|| args.csv_dir.join(PROGRESS_FILE_NAME));
    let store = if args.resume {
        ProgressStore::load(&progress_path)?
    } else {
        if progress_path.exists() {
            warn!(
                "progress file {} exists but --resume was not given, starting fresh",
                progress_path.display()
            );
        }
        ProgressStore::new(&progress_path)
    };
    let progress = SharedProgress::new(store);

    let options = LoadOptions {
        dry_run: args.dry_run,
        skip_create: args.skip_create,
        workers: args.workers.max(1),
        completion: if args.complete_on_error {
            CompletionPolicy::AlwaysMark
        } else {
            CompletionPolicy::RequireClean
        },
        ..LoadOptions::default()
    };

    let orchestrator = Orchestrator::new(warehouse, catalog, options);
    let summary = orchestrator.run(&args.csv_dir, progress).await?;

    println!("\n{}", summary.render());
    if args.fail_on_error && summary.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
