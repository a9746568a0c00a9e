//! Batch job generator.
//!
//! Expands a sweep spec (JSON) into one run configuration per job and writes
//! them to `<output>/job_<i>.json`. With `--run`, the jobs are also executed
//! locally in parallel.
//!
//! Usage:
//!   cargo run --release --bin sweep -- --spec sweeps/hp_tuning.json [--run]

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use ts_bandit_sim::simulation::{
    save_run_parameters, uniquize_experiment_name, write_jobs, DirectorySink, RunConfig,
    RunOptions, Simulation, SweepSpec,
};

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Generate and optionally run a batch of simulations")]
struct Args {
    /// Sweep specification JSON file
    #[arg(long, short = 's')]
    spec: PathBuf,

    /// Directory the job files are written to (recreated)
    #[arg(long, short = 'o', default_value = "job_specs")]
    output: PathBuf,

    /// Execute the generated jobs
    #[arg(long)]
    run: bool,

    /// Root directory for run artifacts
    #[arg(long, default_value = "./logging")]
    log_dir: PathBuf,

    /// Number of worker threads (default: all cores)
    #[arg(long, short = 't', default_value_t = 0)]
    threads: usize,
}

fn run_job(config: &RunConfig, log_dir: &Path) -> Result<f64> {
    let run_name = uniquize_experiment_name(&config.name);
    let mut sink = DirectorySink::open(log_dir, &run_name, config.save_every)?;
    save_run_parameters(config, &mut sink)?;

    let mut simulation = Simulation::new(config.clone(), &mut sink, RunOptions::default())?;
    simulation.run()?;
    let summary = simulation.summary();
    Ok(summary
        .strategies
        .iter()
        .map(|entry| entry.total_regret)
        .fold(f64::INFINITY, f64::min))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let spec = SweepSpec::from_json_file(&args.spec)
        .with_context(|| format!("loading {}", args.spec.display()))?;
    let configs = spec.expand()?;
    let paths = write_jobs(&configs, &args.output)?;

    println!("=================================================");
    println!("  Sweep");
    println!("=================================================");
    println!();
    println!("Generated {} jobs in {}", paths.len(), args.output.display());

    if !args.run {
        return Ok(());
    }

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("configuring thread pool")?;
    }
    println!("Running on {} threads...", rayon::current_num_threads());
    println!();

    let start = Instant::now();
    let results: Vec<(String, Result<f64>)> = configs
        .par_iter()
        .map(|config| {
            let result = run_job(config, &args.log_dir);
            if let Err(e) = &result {
                tracing::error!(name = %config.name, error = %e, "job failed");
            }
            (config.name.clone(), result)
        })
        .collect();

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(best) => println!("  {:<30} best total regret {:.3}", name, best),
            Err(e) => {
                failed += 1;
                println!("  {:<30} FAILED: {:#}", name, e);
            }
        }
    }

    println!();
    println!(
        "Completed {} jobs ({} failed) in {:.1}s",
        results.len(),
        failed,
        start.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{} of {} jobs failed", failed, results.len());
    }
    Ok(())
}
