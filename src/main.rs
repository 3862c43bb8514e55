use abx::cli::{DistanceArgs, TaskArgs};
use abx_core::{ItemTable, Task};
use abx_similarity::{analyze_to_path, compute_distances, score, summarize, JsonLinesFeatures};
use abx_storage::{DistanceFile, ScoreFile, TaskFile};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// ABX discrimination tasks
#[derive(Parser, Debug)]
#[command(name = "abx")]
#[command(about = "Generate, score and analyze ABX discrimination tasks", long_about = None)]
struct Args {
    /// Log level, overridden by RUST_LOG when set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print task statistics without generating triplets
    Stats {
        #[command(flatten)]
        task: TaskArgs,
    },
    /// Generate triplets and pairs into a task file
    Task {
        #[command(flatten)]
        task: TaskArgs,

        /// Task file to write
        #[arg(long)]
        output: PathBuf,
    },
    /// Compute the distance of every pair of a task file
    Distance {
        task: PathBuf,
        /// Features as JSON lines: {"item": id, "features": [[...], ...]}
        features: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        distance: DistanceArgs,
    },
    /// Score every triplet from pair distances
    Score {
        task: PathBuf,
        distances: PathBuf,
        output: PathBuf,
    },
    /// Aggregate scores per regressor group into a TSV table
    Analyze {
        task: PathBuf,
        scores: PathBuf,
        output: PathBuf,
    },
    /// Task, distance, score and analyze in one go
    Run {
        #[command(flatten)]
        task: TaskArgs,

        features: PathBuf,

        /// Directory receiving task.abx, distances.abx, scores.abx and analysis.tsv
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        distance: DistanceArgs,
    },
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_task(args: &TaskArgs) -> anyhow::Result<Task> {
    info!("Loading items from {:?}", args.database);
    let items = ItemTable::from_path(&args.database)?;
    Ok(Task::new(items, args.config())?)
}

fn write_task(args: &TaskArgs, output: &Path) -> anyhow::Result<()> {
    let task = build_task(args)?;
    // Draw a seed when none is given so the run can be replayed from the manifest
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    TaskFile::write(output, &task, &args.options(), &mut rng, Some(seed))?;
    Ok(())
}

fn write_distances(
    task: &Path,
    features: &Path,
    output: &Path,
    args: &DistanceArgs,
) -> anyhow::Result<()> {
    let task = TaskFile::open(task)?;
    info!("Loading features from {:?}", features);
    let features = JsonLinesFeatures::from_path(features)?;
    compute_distances(&features, &task, output, &args.metric.distance(), &args.config())?;
    Ok(())
}

fn write_scores(task: &Path, distances: &Path, output: &Path) -> anyhow::Result<()> {
    let task = TaskFile::open(task)?;
    let distances = DistanceFile::open(distances)?;
    score(&task, &distances, output)?;
    Ok(())
}

fn write_analysis(task: &Path, scores: &Path, output: &Path) -> anyhow::Result<()> {
    let task = TaskFile::open(task)?;
    let scores = ScoreFile::open(scores)?;
    let rows = analyze_to_path(&task, &scores, output)?;
    match summarize(&rows) {
        Some(summary) => info!(
            "Mean score {:.4} over {} group(s) in {} by-level(s)",
            summary.score, summary.nb_groups, summary.nb_by_levels
        ),
        None => info!("No triplet to analyze"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    match args.command {
        Command::Stats { task } => {
            let task = build_task(&task)?;
            println!("{}", task.stats());
        }
        Command::Task { task, output } => write_task(&task, &output)?,
        Command::Distance {
            task,
            features,
            output,
            distance,
        } => write_distances(&task, &features, &output, &distance)?,
        Command::Score {
            task,
            distances,
            output,
        } => write_scores(&task, &distances, &output)?,
        Command::Analyze {
            task,
            scores,
            output,
        } => write_analysis(&task, &scores, &output)?,
        Command::Run {
            task,
            features,
            output_dir,
            distance,
        } => {
            std::fs::create_dir_all(&output_dir)?;
            let task_path = output_dir.join("task.abx");
            let distance_path = output_dir.join("distances.abx");
            let score_path = output_dir.join("scores.abx");

            write_task(&task, &task_path)?;
            write_distances(&task_path, &features, &distance_path, &distance)?;
            write_scores(&task_path, &distance_path, &score_path)?;
            write_analysis(&task_path, &score_path, &output_dir.join("analysis.tsv"))?;
        }
    }
    Ok(())
}
