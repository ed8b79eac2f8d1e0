//! vialscan CLI: droplet counting, parameter tuning and vial batch analysis.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vialscan::batch::{run_batch, BatchConfig};
use vialscan::params::PARAM_DEFS;
use vialscan::render::render_detection;
use vialscan::{
    detect_blobs, ErrorMetric, OptimizationStatus, OptimizerConfig, ParamId, ParameterSet,
    ProgressEvent, TuningSession, DEFAULT_TARGET,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "vialscan")]
#[command(about = "Count bright droplets in vial images and tune the detection parameters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect droplets in one image.
    Detect(CliDetectArgs),

    /// Count droplets in every image of a directory and score against targets.
    Process(CliProcessArgs),

    /// Search the unlocked parameters for the lowest counting error.
    Tune(CliTuneArgs),

    /// Analyze all frames of one vial and write marked images plus a log entry.
    Analyze(CliAnalyzeArgs),

    /// Print the parameter table, the default snippet or the default JSON.
    Params {
        #[arg(long, value_enum, default_value_t = ParamsFormat::Table)]
        format: ParamsFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ParamsFormat {
    Table,
    Snippet,
    Json,
}

/// Where the detection parameters come from. Defaults when neither is given.
#[derive(Debug, Clone, Args, Default)]
struct CliParamSource {
    /// Parameter set JSON (name → value plus unlocked names).
    #[arg(long, conflicts_with = "snippet")]
    params: Option<PathBuf>,

    /// Exported parameter snippet (`NAME = value` lines).
    #[arg(long)]
    snippet: Option<PathBuf>,
}

impl CliParamSource {
    fn load(&self) -> CliResult<Option<ParameterSet>> {
        if let Some(path) = &self.params {
            let text = std::fs::read_to_string(path)?;
            return Ok(Some(serde_json::from_str(&text)?));
        }
        if let Some(path) = &self.snippet {
            let text = std::fs::read_to_string(path)?;
            return Ok(Some(ParameterSet::from_snippet(&text)?));
        }
        Ok(None)
    }

    fn load_or_default(&self) -> CliResult<ParameterSet> {
        Ok(self.load()?.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Args)]
struct CliDetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    source: CliParamSource,

    /// Write the overlay image here.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Write the detection result (JSON) here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliProcessArgs {
    /// Directory of sample images.
    #[arg(long)]
    dir: PathBuf,

    /// Target count for every image.
    #[arg(long, default_value_t = DEFAULT_TARGET)]
    target: i64,

    /// Per-file target, `name=count`. Repeatable.
    #[arg(long = "target-for", value_parser = parse_named_target)]
    target_for: Vec<(String, i64)>,

    #[command(flatten)]
    source: CliParamSource,
}

#[derive(Debug, Clone, Args)]
struct CliTuneArgs {
    /// Tuning configuration (JSON). Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of sample images.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Target count for every image.
    #[arg(long)]
    target: Option<i64>,

    /// Per-file target, `name=count`. Repeatable.
    #[arg(long = "target-for", value_parser = parse_named_target)]
    target_for: Vec<(String, i64)>,

    /// Parameters to search, e.g. `BLUR_SIZE,MIN_BLOB_AREA`.
    #[arg(long, value_delimiter = ',')]
    unlock: Vec<ParamId>,

    /// Iteration budget.
    #[arg(long)]
    iterations: Option<usize>,

    /// Error aggregation: average, sum or max.
    #[arg(long)]
    metric: Option<ErrorMetric>,

    /// Random seed of the search.
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    source: CliParamSource,

    /// Write the tuned snippet here.
    #[arg(long)]
    out_snippet: Option<PathBuf>,

    /// Write the tuned parameter set (JSON) here.
    #[arg(long)]
    out_params: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliAnalyzeArgs {
    /// Directory holding the vial's JPEG frames.
    #[arg(long)]
    input: PathBuf,

    /// Output directory for marked frames, summary and log.
    #[arg(long)]
    output: PathBuf,

    /// Vial label used in file names and the log.
    #[arg(long, default_value = "Unknown")]
    label: String,

    /// Merge distance for detections across frames (pixels).
    #[arg(long, default_value_t = vialscan::batch::DEFAULT_CLUSTER_DISTANCE)]
    cluster_distance: f64,

    /// Delete the input frames afterwards.
    #[arg(long)]
    delete_inputs: bool,

    #[command(flatten)]
    source: CliParamSource,
}

/// File-level tuning setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct TuneConfig {
    image_dir: Option<PathBuf>,
    default_target: i64,
    /// Per-file targets, keyed by file name.
    targets: BTreeMap<String, i64>,
    /// Starting values and locks. Defaults when absent.
    params: Option<ParameterSet>,
    /// Parameters to search. When empty the locks in `params` apply.
    unlocked: Vec<ParamId>,
    optimizer: OptimizerConfig,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            image_dir: None,
            default_target: DEFAULT_TARGET,
            targets: BTreeMap::new(),
            params: None,
            unlocked: Vec::new(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl CliTuneArgs {
    fn resolve(&self) -> CliResult<TuneConfig> {
        let mut cfg = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => TuneConfig::default(),
        };
        if let Some(dir) = &self.dir {
            cfg.image_dir = Some(dir.clone());
        }
        if let Some(t) = self.target {
            cfg.default_target = t;
        }
        for (name, t) in &self.target_for {
            cfg.targets.insert(name.clone(), *t);
        }
        if !self.unlock.is_empty() {
            cfg.unlocked = self.unlock.clone();
        }
        if let Some(n) = self.iterations {
            cfg.optimizer.max_iterations = n;
        }
        if let Some(m) = self.metric {
            cfg.optimizer.metric = m;
        }
        if let Some(s) = self.seed {
            cfg.optimizer.seed = s;
        }
        if let Some(p) = self.source.load()? {
            cfg.params = Some(p);
        }
        Ok(cfg)
    }
}

fn parse_named_target(s: &str) -> Result<(String, i64), String> {
    let (name, count) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected name=count, got {s:?}"))?;
    let count = count
        .trim()
        .parse()
        .map_err(|e| format!("invalid count in {s:?}: {e}"))?;
    Ok((name.trim().to_string(), count))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Process(args) => run_process(&args),
        Commands::Tune(args) => run_tune(&args),
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Params { format } => run_params(format),
    }
}

fn warn_if_inverted(params: &ParameterSet) {
    if params.area_window_inverted() {
        tracing::warn!(
            "MIN_BLOB_AREA ({}) exceeds MAX_BLOB_AREA ({}); every image will count 0",
            params.get(ParamId::MinBlobArea),
            params.get(ParamId::MaxBlobArea)
        );
    }
}

/// Load a directory into a session and apply per-file targets.
fn load_session(
    dir: &Path,
    default_target: i64,
    targets: &BTreeMap<String, i64>,
    params: ParameterSet,
) -> CliResult<TuningSession> {
    let session = TuningSession::new();
    let n = session.load_images(dir, default_target)?;
    tracing::info!("Loaded {} images from {}", n, dir.display());
    for (name, t) in targets {
        if !session.set_target_by_name(name, *t)? {
            tracing::warn!("No loaded image named {}; target ignored", name);
        }
    }
    warn_if_inverted(&params);
    session.set_params(params)?;
    Ok(session)
}

fn print_report(session: &TuningSession) -> CliResult<()> {
    let report = session.process_all()?;
    println!("{:<40} {:>8} {:>8} {:>8}", "image", "detected", "target", "error");
    for row in &report.rows {
        println!(
            "{:<40} {:>8} {:>8} {:>8}",
            row.filename, row.detected, row.target, row.error
        );
    }
    println!("average error: {:.2}", report.average_error);
    Ok(())
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(args: &CliDetectArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());

    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let params = args.source.load_or_default()?;
    warn_if_inverted(&params);
    let detection = detect_blobs(&gray, &params.detect_params())?;
    tracing::info!(
        "Detected {} droplets (threshold {:.1})",
        detection.count(),
        detection.threshold
    );
    for (i, b) in detection.blobs.iter().enumerate() {
        tracing::info!(
            "  #{}: center=({}, {}) radius={} area={}",
            i + 1,
            b.center[0],
            b.center[1],
            b.radius,
            b.area
        );
    }
    println!("{}", detection.count());

    if let Some(path) = &args.overlay {
        render_detection(&gray, &detection).save(path)?;
        tracing::info!("Overlay written to {}", path.display());
    }
    if let Some(path) = &args.out {
        std::fs::write(path, serde_json::to_string_pretty(&detection)?)?;
        tracing::info!("Results written to {}", path.display());
    }
    Ok(())
}

// ── process ────────────────────────────────────────────────────────────

fn run_process(args: &CliProcessArgs) -> CliResult<()> {
    let targets: BTreeMap<String, i64> = args.target_for.iter().cloned().collect();
    let session = load_session(
        &args.dir,
        args.target,
        &targets,
        args.source.load_or_default()?,
    )?;
    print_report(&session)
}

// ── tune ───────────────────────────────────────────────────────────────

fn run_tune(args: &CliTuneArgs) -> CliResult<()> {
    let cfg = args.resolve()?;
    let dir = cfg
        .image_dir
        .clone()
        .ok_or_else(|| -> CliError { "no image directory: pass --dir or set image_dir".into() })?;

    let session = load_session(
        &dir,
        cfg.default_target,
        &cfg.targets,
        cfg.params.clone().unwrap_or_default(),
    )?;
    if !cfg.unlocked.is_empty() {
        session.unlock_only(&cfg.unlocked)?;
    }
    session.set_optimizer_config(cfg.optimizer.clone())?;

    let handle = session.start_optimization()?;
    // Start and finish are logged by the worker itself.
    for event in handle.events() {
        match &event {
            ProgressEvent::Trial(t) if t.is_best => tracing::info!("{}", event.message()),
            ProgressEvent::Trial(_) => tracing::debug!("{}", event.message()),
            ProgressEvent::Started { .. } => {}
            ProgressEvent::Finished(_) => break,
        }
    }
    let status = handle.join();

    if let OptimizationStatus::Failed(msg) = &status {
        return Err(format!("optimization failed: {msg}").into());
    }

    print_report(&session)?;
    let snippet = session.export_snippet();
    println!();
    print!("{snippet}");

    if let Some(path) = &args.out_snippet {
        std::fs::write(path, &snippet)?;
        tracing::info!("Snippet written to {}", path.display());
    }
    if let Some(path) = &args.out_params {
        std::fs::write(path, serde_json::to_string_pretty(&session.params())?)?;
        tracing::info!("Parameters written to {}", path.display());
    }
    Ok(())
}

// ── analyze ────────────────────────────────────────────────────────────

fn run_analyze(args: &CliAnalyzeArgs) -> CliResult<()> {
    let params = args.source.load_or_default()?;
    warn_if_inverted(&params);
    let config = BatchConfig {
        vial_label: args.label.clone(),
        cluster_distance: args.cluster_distance,
        delete_inputs: args.delete_inputs,
    };

    let report = run_batch(&args.input, &args.output, &params.detect_params(), &config)?;

    println!("{}", report.record.result);
    for d in &report.record.droplet_details {
        println!(
            "  Droplet {}: radius={}px, area={:.0}px2, circularity={:.2}, seen in {} frames, confidence={}",
            d.droplet_num, d.radius_px, d.area_px2, d.circularity, d.frames_seen, d.confidence
        );
    }
    tracing::info!("Summary image: {}", report.summary_path.display());
    tracing::info!("Log: {}", report.log_path.display());
    if config.delete_inputs {
        tracing::info!("Deleted {} input frames", report.deleted);
    }
    Ok(())
}

// ── params ─────────────────────────────────────────────────────────────

fn run_params(format: ParamsFormat) -> CliResult<()> {
    match format {
        ParamsFormat::Table => {
            println!(
                "{:<22} {:>8} {:>12} {:>12} {:>12} {:>6}",
                "name", "kind", "default", "min", "max", "step"
            );
            for d in &PARAM_DEFS {
                println!(
                    "{:<22} {:>8} {:>12} {:>12} {:>12} {:>6}",
                    d.name,
                    format!("{:?}", d.kind).to_lowercase(),
                    d.default,
                    d.min,
                    d.max,
                    d.step
                );
            }
        }
        ParamsFormat::Snippet => print!("{}", ParameterSet::defaults().to_snippet()),
        ParamsFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&ParameterSet::defaults())?
        ),
    }
    Ok(())
}
