//! Single simulation run.
//!
//! Usage:
//!   cargo run --release --bin simulate -- [OPTIONS]
//!
//! Either pass every run argument on the command line or load them with
//! `--config <FILE>`. Artifacts go to `<log-dir>/<name>_<timestamp>/`.
//!
//! Example:
//!   simulate --name test --steps 200 --save-every 2 --arms-nb 10 --a 0.5 --d 100 \
//!            --reward-distribution normal --seed 1 \
//!            --models LinearSemiParametricSampling --sigma-1 1 --sigma-2 1 --sigma-3 1

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ts_bandit_sim::simulation::{
    save_run_parameters, uniquize_experiment_name, DirectorySink, RewardDistribution, RunConfig,
    RunOptions, Simulation, StrategyKind,
};

#[derive(Parser, Debug)]
#[command(name = "simulate", about = "Run a Thompson sampling bandit simulation")]
struct Args {
    /// Run configuration JSON file; replaces the run arguments below
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Experiment name
    #[arg(long, required_unless_present = "config")]
    name: Option<String>,

    /// Number of steps
    #[arg(long, required_unless_present = "config")]
    steps: Option<u64>,

    /// Models to run side by side
    #[arg(long, num_args = 1.., required_unless_present = "config")]
    models: Vec<StrategyKind>,

    /// Number of arms
    #[arg(long, alias = "arms_nb", required_unless_present = "config")]
    arms_nb: Option<usize>,

    /// Norm of the linear parameter vector, in [0, 1]
    #[arg(long, required_unless_present = "config")]
    a: Option<f64>,

    /// Dimensionality of the linear parameter vector
    #[arg(long, required_unless_present = "config")]
    d: Option<usize>,

    /// Reward distribution: normal or binomial
    #[arg(long, alias = "reward_distribution", required_unless_present = "config")]
    reward_distribution: Option<RewardDistribution>,

    /// Seed for the environment and every model
    #[arg(long, required_unless_present = "config")]
    seed: Option<u64>,

    /// Semi-parametric: std of reward given expected reward
    #[arg(long, alias = "sigma_1")]
    sigma_1: Option<f64>,

    /// Semi-parametric: std of expected reward given the linear parameter
    #[arg(long, alias = "sigma_2")]
    sigma_2: Option<f64>,

    /// Semi-parametric: std of the linear parameter
    #[arg(long, alias = "sigma_3")]
    sigma_3: Option<f64>,

    /// Linear-Gaussian posterior scale
    #[arg(long)]
    v: Option<f64>,

    /// Save model snapshots every this many steps
    #[arg(long, alias = "save_every", default_value_t = 1)]
    save_every: u64,

    /// Root directory for run artifacts
    #[arg(long, default_value = "./logging")]
    log_dir: PathBuf,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        if let Some(path) = &self.config {
            return RunConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()));
        }

        // clap enforces presence when no config file is given
        let missing = |field: &str| anyhow::anyhow!("--{} is required", field);
        let config = RunConfig {
            name: self.name.clone().ok_or_else(|| missing("name"))?,
            steps: self.steps.ok_or_else(|| missing("steps"))?,
            save_every: self.save_every,
            arms_nb: self.arms_nb.ok_or_else(|| missing("arms-nb"))?,
            a: self.a.ok_or_else(|| missing("a"))?,
            d: self.d.ok_or_else(|| missing("d"))?,
            reward_distribution: self
                .reward_distribution
                .ok_or_else(|| missing("reward-distribution"))?,
            seed: self.seed.ok_or_else(|| missing("seed"))?,
            sigma_1: self.sigma_1,
            sigma_2: self.sigma_2,
            sigma_3: self.sigma_3,
            v: self.v,
            models: self.models.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.run_config()?;

    println!("=================================================");
    println!("  Thompson Sampling Simulation");
    println!("=================================================");
    println!();
    println!("Configuration:");
    println!("  Name:        {}", config.name);
    println!("  Steps:       {}", config.steps);
    println!("  Arms:        {}", config.arms_nb);
    println!("  d:           {}", config.d);
    println!("  a:           {}", config.a);
    println!("  Rewards:     {}", config.reward_distribution);
    println!("  Seed:        {}", config.seed);
    println!(
        "  Models:      {}",
        config
            .models
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let run_name = uniquize_experiment_name(&config.name);
    let mut sink = DirectorySink::open(&args.log_dir, &run_name, config.save_every)
        .with_context(|| format!("opening run directory under {}", args.log_dir.display()))?;
    save_run_parameters(&config, &mut sink)?;

    let options = RunOptions {
        show_progress: !args.no_progress,
    };

    let start = Instant::now();
    let summary = {
        let mut simulation = Simulation::new(config, &mut sink, options)?;
        simulation.run()?;
        simulation.summary()
    };
    let elapsed = start.elapsed();

    println!();
    println!("=================================================");
    println!("  Results ({} steps in {:.2}s)", summary.steps, elapsed.as_secs_f64());
    println!("=================================================");
    println!();
    println!(
        "  {:<30} {:>14} {:>12} {:>10}",
        "Model", "Total regret", "Mean regret", "Optimal"
    );
    for entry in &summary.strategies {
        println!(
            "  {:<30} {:>14.3} {:>12.5} {:>9.1}%",
            entry.kind.as_str(),
            entry.total_regret,
            entry.mean_regret,
            entry.optimal_fraction * 100.0
        );
    }
    println!();
    println!("Artifacts saved to: {}", sink.path().display());

    Ok(())
}
