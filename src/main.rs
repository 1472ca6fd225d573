use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use propulse::core::config::EngineConfig;
use propulse::core::domain::RawParameters;
use propulse::core::validation::{raw_from_json, Validator};
use propulse::engine::evaluator::CandidateEvaluator;
use propulse::engine::physics::PhysicsScorer;
use propulse::engine::surrogate::{evaluate_model, read_dataset, LinearSurrogate, SurrogateAdapter};
use propulse::jobs::record::{JobEvent, ResultSummary, ResultView, StatusView};
use propulse::jobs::scheduler::JobScheduler;
use propulse::jobs::sink::{CsvJobLog, JobSink};

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Propellant mixture optimizer (physics + surrogate, thermal ceiling)", long_about = None)]
struct Args {
    /// Engine configuration (JSON). Defaults apply to anything omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trained surrogate artifact (JSON). Without it, scoring is physics-only.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Number of optimizer workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Iteration budget per search
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Seed for reproducible searches
    #[arg(long)]
    seed: Option<u64>,

    /// Append finalized jobs to this CSV file
    #[arg(long)]
    job_log: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one optimization job and wait for its result
    Run {
        #[command(flatten)]
        params: ParamArgs,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,

        /// Include the full trajectory in the output
        #[arg(long)]
        trajectory: bool,
    },
    /// Submit every parameter set in a JSON array file and wait for all of them
    Batch {
        file: PathBuf,

        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Evaluate a single parameter set without searching
    Simulate {
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Report MAE / RMSE / R2 of the surrogate against a labeled CSV dataset
    CheckModel {
        /// CSV with columns O_F_ratio, pressure, temp, isp, thrust
        data: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct ParamArgs {
    /// JSON object with O_F_ratio, pressure, temp, isp, alpha, max_temp
    #[arg(long, conflicts_with_all = ["of_ratio", "pressure", "temp", "isp", "alpha", "max_temp"])]
    params: Option<PathBuf>,

    #[arg(long = "of-ratio", allow_negative_numbers = true)]
    of_ratio: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pressure: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    temp: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    isp: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    alpha: Option<f64>,
    #[arg(long = "max-temp", allow_negative_numbers = true)]
    max_temp: Option<f64>,
}

impl ParamArgs {
    fn to_raw(&self) -> Result<RawParameters> {
        if let Some(path) = &self.params {
            let value = read_json(path)?;
            return Ok(raw_from_json(&value)?);
        }
        Ok(RawParameters {
            o_f_ratio: self.of_ratio,
            pressure: self.pressure,
            temp: self.temp,
            isp: self.isp,
            alpha: self.alpha,
            max_temp: self.max_temp,
        })
    }
}

#[derive(Serialize)]
struct JobReport {
    status: StatusView,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trajectory: Option<serde_json::Value>,
}

// --- Initialization Helpers ---

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => EngineConfig::from_json_file(path).context("Failed to load engine config")?,
        None => EngineConfig::default(),
    };
    if let Some(w) = args.workers {
        cfg.scheduler.workers = w;
    }
    if let Some(n) = args.iterations {
        cfg.search.max_iterations = n;
    }
    if args.seed.is_some() {
        cfg.search.seed = args.seed;
    }
    cfg.check().context("Invalid engine configuration")?;
    Ok(cfg)
}

fn load_surrogate(args: &Args) -> Result<SurrogateAdapter> {
    match &args.model {
        Some(path) => {
            let model = LinearSurrogate::from_json_file(path)
                .with_context(|| format!("Failed to load surrogate model {}", path.display()))?;
            info!("Loaded surrogate model from {}", path.display());
            Ok(SurrogateAdapter::new(Arc::new(model)))
        }
        None => {
            warn!("No surrogate model given; optimizing with physics only");
            Ok(SurrogateAdapter::unavailable())
        }
    }
}

fn build_scheduler(args: &Args, cfg: &EngineConfig, evaluator: Arc<CandidateEvaluator>) -> Result<JobScheduler> {
    let mut sinks: Vec<Arc<dyn JobSink>> = Vec::new();
    if let Some(path) = &args.job_log {
        let log = CsvJobLog::open(path).with_context(|| format!("Failed to open job log {}", path.display()))?;
        sinks.push(Arc::new(log));
    }
    JobScheduler::with_sinks(cfg, evaluator, sinks).context("Failed to start scheduler")
}

fn report(scheduler: &JobScheduler, job_id: &str, with_trajectory: bool) -> Result<JobReport> {
    let status = scheduler.get_status(job_id)?;
    let view = scheduler.get_result(job_id)?;
    let trajectory = match (&view, with_trajectory) {
        (ResultView::Ready(r), true) => Some(serde_json::to_value(&r.trajectory)?),
        _ => None,
    };
    Ok(JobReport {
        status,
        result: view.summary(),
        trajectory,
    })
}

// --- Commands ---

fn run_single(
    args: &Args,
    cfg: &EngineConfig,
    evaluator: Arc<CandidateEvaluator>,
    raw: RawParameters,
    timeout: Duration,
    with_trajectory: bool,
) -> Result<()> {
    let scheduler = build_scheduler(args, cfg, evaluator)?;
    let events = scheduler.subscribe();
    let job_id = scheduler.submit(&raw).context("Submission rejected")?;

    let deadline = Instant::now() + timeout;
    let mut last_logged = 0.0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            scheduler.cancel(&job_id)?;
            bail!("Job {} did not finish within {:?}", job_id, timeout);
        }
        match events.recv_timeout(remaining) {
            Ok(JobEvent::Progress { job_id: id, progress }) if id == job_id && progress - last_logged >= 0.1 => {
                info!("Progress {:>3.0}%", progress * 100.0);
                last_logged = progress;
            }
            Ok(JobEvent::Finished { job_id: id, .. }) if id == job_id => break,
            Ok(_) => {}
            Err(_) => {
                scheduler.cancel(&job_id)?;
                bail!("Job {} did not finish within {:?}", job_id, timeout);
            }
        }
    }

    let out = report(&scheduler, &job_id, with_trajectory)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_batch(
    args: &Args,
    cfg: &EngineConfig,
    evaluator: Arc<CandidateEvaluator>,
    file: &PathBuf,
    timeout: Duration,
) -> Result<()> {
    let value = read_json(file)?;
    let items = value.as_array().ok_or_else(|| anyhow!("{} must contain a JSON array", file.display()))?;

    let scheduler = build_scheduler(args, cfg, evaluator)?;
    let mut submitted = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match scheduler.validator().validate_json(item) {
            Ok(params) => submitted.push(scheduler.submit_validated(params)?),
            Err(e) => warn!("Entry {} rejected: {}", i, e),
        }
    }

    let deadline = Instant::now() + timeout;
    let mut reports = Vec::with_capacity(submitted.len());
    for job_id in &submitted {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Err(e) = scheduler.wait(job_id, remaining) {
            warn!("{}", e);
            scheduler.cancel(job_id)?;
            scheduler.wait(job_id, Duration::from_secs(30))?;
        }
        reports.push(report(&scheduler, job_id, false)?);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn main() -> Result<()> {
    // 1. Parsing & logging
    let args = Args::parse();
    init_logging(&args.log_level);

    // 2. Configuration
    let cfg = load_config(&args)?;

    // 3. Shared, read-only scoring components (loaded once)
    let surrogate = load_surrogate(&args)?;
    let evaluator = Arc::new(CandidateEvaluator::new(PhysicsScorer::default(), surrogate));

    // 4. Dispatch
    match &args.command {
        Command::Run {
            params,
            timeout_secs,
            trajectory,
        } => {
            let raw = params.to_raw()?;
            run_single(&args, &cfg, evaluator, raw, Duration::from_secs(*timeout_secs), *trajectory)
        }
        Command::Batch { file, timeout_secs } => {
            run_batch(&args, &cfg, evaluator, file, Duration::from_secs(*timeout_secs))
        }
        Command::Simulate { params } => {
            let validator = Validator::new(cfg.bounds.clone());
            let p = validator.validate(&params.to_raw()?)?;
            println!("{}", serde_json::to_string_pretty(&evaluator.simulate(&p))?);
            Ok(())
        }
        Command::CheckModel { data } => {
            let path = args.model.as_ref().ok_or_else(|| anyhow!("check-model requires --model"))?;
            let model = LinearSurrogate::from_json_file(path)?;
            let samples = read_dataset(data).with_context(|| format!("Failed to read {}", data.display()))?;
            let metrics = evaluate_model(&model, &samples)?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            Ok(())
        }
    }
}
