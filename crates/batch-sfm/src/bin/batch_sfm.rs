//! batch-sfm CLI: incremental COLMAP reconstruction over `t<N>` batches.

use std::path::PathBuf;

use batch_sfm::core::{discover_batches, CollisionPolicy};
use batch_sfm::{run_colmap_pipeline, PipelineConfig, PipelineError, RunReport};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Parser)]
#[command(name = "batch-sfm")]
#[command(
    about = "Register time-ordered image batches into one sparse COLMAP reconstruction and undistort it"
)]
#[command(version)]
struct Cli {
    /// Input directory containing t0/, t1/, ... subdirectories of images.
    #[arg(long = "input-dir", alias = "input_dir")]
    input_dir: PathBuf,

    /// JSON pipeline config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// COLMAP executable.
    #[arg(long)]
    colmap: Option<PathBuf>,

    /// Extra argument placed before the COLMAP subcommand (repeatable).
    #[arg(long = "colmap-arg", allow_hyphen_values = true)]
    colmap_args: Vec<String>,

    /// Camera model used when bootstrapping from the first batch.
    #[arg(long)]
    camera_model: Option<String>,

    /// Vocabulary tree for matching incremental batches.
    #[arg(long)]
    vocab_tree: Option<PathBuf>,

    /// Kill any single COLMAP invocation running longer than this.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Handling of equally named images in different batches.
    #[arg(long, value_enum)]
    collision_policy: Option<CollisionPolicyArg>,

    /// Adopt an existing single model instead of bootstrapping again.
    #[arg(long)]
    resume: bool,

    /// Write a JSON run report here (also on failure).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Validate the input, print the batch order and exit.
    #[arg(long)]
    list_batches: bool,

    /// Debug logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// JSON log output (requires the `tracing` feature).
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CollisionPolicyArg {
    KeepFirst,
    Reject,
}

impl From<CollisionPolicyArg> for CollisionPolicy {
    fn from(arg: CollisionPolicyArg) -> Self {
        match arg {
            CollisionPolicyArg::KeepFirst => CollisionPolicy::KeepFirst,
            CollisionPolicyArg::Reject => CollisionPolicy::Reject,
        }
    }
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    fn build_config(&self) -> CliResult<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load_json(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(colmap) = &self.colmap {
            cfg.colmap_binary = colmap.clone();
        }
        if !self.colmap_args.is_empty() {
            cfg.colmap_leading_args = self.colmap_args.clone();
        }
        if let Some(model) = &self.camera_model {
            cfg.camera_model = model.clone();
        }
        if let Some(vocab) = &self.vocab_tree {
            cfg.vocab_tree_path = Some(vocab.clone());
        }
        if let Some(secs) = self.timeout_secs {
            cfg.timeout_secs = Some(secs);
        }
        if let Some(policy) = self.collision_policy {
            cfg.collision_policy = policy.into();
        }
        if self.resume {
            cfg.resume = true;
        }
        Ok(cfg)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    if let Err(err) = try_main(&cli) {
        eprintln!("error: {err}");
        if let Some(diag) = err
            .downcast_ref::<PipelineError>()
            .and_then(PipelineError::engine_diagnostics)
        {
            eprintln!("engine output:\n{}", diag.trim_end());
        }
        std::process::exit(1);
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    let _ = tracing_log::LogTracer::init_with_filter(cli.level());
    batch_sfm::core::init_tracing(cli.log_json);
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    if cli.log_json {
        eprintln!("warning: --log-json needs the `tracing` feature; using plain logs");
    }
    let _ = batch_sfm::core::init_with_level(cli.level());
}

fn try_main(cli: &Cli) -> CliResult<()> {
    if cli.list_batches {
        for batch in discover_batches(&cli.input_dir)? {
            println!("{}\t{}", batch.name(), batch.len());
        }
        return Ok(());
    }

    let config = cli.build_config()?;
    let mut report = RunReport::new(&cli.input_dir);
    let result = run_colmap_pipeline(&cli.input_dir, &config, &mut report);
    if let Err(err) = &result {
        report.set_error(err);
    }

    if let Some(path) = &cli.report {
        report.write_json(path)?;
        log::info!("wrote run report to {}", path.display());
    }

    result?;
    if let Some(out) = &report.undistorted_path {
        println!("{}", out.display());
    }
    Ok(())
}
