//! The simulation loop.
//!
//! [`Simulation`] drives every configured model against one [`Environment`]
//! for a fixed number of steps. Within a step the order of generator draws is
//! fixed, which makes a run reproducible from its seed:
//!
//! 1. each model, in configuration order, draws from its posterior and
//!    chooses an arm (then is snapshotted if the step is on cadence);
//! 2. each *distinct* chosen arm, in ascending order, gets one reward draw
//!    from the environment;
//! 3. each model observes the reward of the arm it chose, so models that
//!    agree on an arm see the same reward.

use std::collections::BTreeMap;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::models::Strategy;
use crate::simulation::config::{RunConfig, RunOptions};
use crate::simulation::environment::Environment;
use crate::simulation::error::SimError;
use crate::simulation::storage::LogSink;
use crate::simulation::strategy::{SamplingStrategy, StrategyKind};

/// One model's decision and outcome within a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Choice {
    /// Model that made the choice.
    pub kind: StrategyKind,
    /// Chosen arm.
    pub arm: usize,
    /// Reward observed for the arm.
    pub reward: f64,
    /// Regret of the arm.
    pub regret: f64,
}

/// Everything that happened in one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Zero-based step index.
    pub step: u64,
    /// One entry per model, in configuration order.
    pub choices: Vec<Choice>,
}

/// Per-model arm and regret histories.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    kinds: Vec<StrategyKind>,
    arms: FxHashMap<StrategyKind, Vec<usize>>,
    regrets: FxHashMap<StrategyKind, Vec<f64>>,
}

impl RunHistory {
    /// Create empty histories for `kinds`, reserving room for `steps` entries.
    pub fn new(kinds: &[StrategyKind], steps: usize) -> Self {
        let mut arms = FxHashMap::with_capacity_and_hasher(kinds.len(), Default::default());
        let mut regrets = FxHashMap::with_capacity_and_hasher(kinds.len(), Default::default());
        for &kind in kinds {
            arms.insert(kind, Vec::with_capacity(steps));
            regrets.insert(kind, Vec::with_capacity(steps));
        }
        Self {
            kinds: kinds.to_vec(),
            arms,
            regrets,
        }
    }

    fn record(&mut self, kind: StrategyKind, arm: usize, regret: f64) {
        self.arms.entry(kind).or_default().push(arm);
        self.regrets.entry(kind).or_default().push(regret);
    }

    /// Models tracked, in configuration order.
    pub fn kinds(&self) -> &[StrategyKind] {
        &self.kinds
    }

    /// Arms chosen by `kind`, one per step.
    pub fn arms(&self, kind: StrategyKind) -> &[usize] {
        self.arms.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regrets incurred by `kind`, one per step.
    pub fn regrets(&self, kind: StrategyKind) -> &[f64] {
        self.regrets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Running sum of `kind`'s regrets.
    pub fn cumulative_regret(&self, kind: StrategyKind) -> Vec<f64> {
        self.regrets(kind)
            .iter()
            .scan(0.0, |total, &regret| {
                *total += regret;
                Some(*total)
            })
            .collect()
    }

    /// Number of steps recorded.
    pub fn len(&self) -> usize {
        self.kinds
            .first()
            .map(|&kind| self.arms(kind).len())
            .unwrap_or(0)
    }

    /// Whether no step has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arm histories keyed by model name.
    pub fn arms_map(&self) -> BTreeMap<&'static str, &[usize]> {
        self.kinds
            .iter()
            .map(|&kind| (kind.as_str(), self.arms(kind)))
            .collect()
    }

    /// Regret histories keyed by model name.
    pub fn regrets_map(&self) -> BTreeMap<&'static str, &[f64]> {
        self.kinds
            .iter()
            .map(|&kind| (kind.as_str(), self.regrets(kind)))
            .collect()
    }

    /// Aggregate the histories.
    pub fn summary(&self, arms_nb: usize) -> RunSummary {
        let strategies = self
            .kinds
            .iter()
            .map(|&kind| {
                let regrets = self.regrets(kind);
                let total_regret: f64 = regrets.iter().sum();
                let mut arm_counts = vec![0u64; arms_nb];
                for &arm in self.arms(kind) {
                    if let Some(count) = arm_counts.get_mut(arm) {
                        *count += 1;
                    }
                }
                let optimal = regrets.iter().filter(|&&r| r == 0.0).count();
                let steps = regrets.len().max(1) as f64;
                StrategySummary {
                    kind,
                    total_regret,
                    mean_regret: total_regret / steps,
                    optimal_fraction: optimal as f64 / steps,
                    arm_counts,
                }
            })
            .collect();

        RunSummary {
            steps: self.len() as u64,
            strategies,
        }
    }
}

/// Aggregated result of one model over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    /// Model.
    pub kind: StrategyKind,
    /// Sum of per-step regrets.
    pub total_regret: f64,
    /// Average per-step regret.
    pub mean_regret: f64,
    /// Fraction of steps on which a best arm was chosen.
    pub optimal_fraction: f64,
    /// How often each arm was chosen.
    pub arm_counts: Vec<u64>,
}

/// Aggregated result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Steps completed.
    pub steps: u64,
    /// One entry per model, in configuration order.
    pub strategies: Vec<StrategySummary>,
}

/// A run in progress.
pub struct Simulation<S: LogSink> {
    config: RunConfig,
    environment: Environment,
    strategies: Vec<Strategy>,
    history: RunHistory,
    step: u64,
    sink: S,
    options: RunOptions,
}

impl<S: LogSink> Simulation<S> {
    /// Validate `config`, build the environment and the models.
    ///
    /// The environment is persisted to the sink as `environment`.
    pub fn new(config: RunConfig, mut sink: S, options: RunOptions) -> Result<Self, SimError> {
        config.validate()?;

        let environment = Environment::from_params(&config.environment_params())?;
        sink.save_snapshot("environment", &environment)?;

        let strategies = config
            .models
            .iter()
            .map(|&kind| -> Result<Strategy, SimError> {
                let params = config.strategy_params(kind)?;
                Strategy::new(&params, environment.shared_context())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let history = RunHistory::new(&config.models, config.steps as usize);

        tracing::debug!(
            name = %config.name,
            optimal_arm = environment.optimal_arm(),
            "environment ready"
        );

        Ok(Self {
            config,
            environment,
            strategies,
            history,
            step: 0,
            sink,
            options,
        })
    }

    /// Run one step and return what each model did.
    pub fn step(&mut self) -> Result<StepRecord, SimError> {
        let step = self.step;

        let mut chosen = Vec::with_capacity(self.strategies.len());
        for strategy in &mut self.strategies {
            let arm = strategy.choose_arm()?;
            self.sink
                .save_snapshot_for_step(strategy.kind().as_str(), &*strategy, step)?;
            chosen.push(arm);
        }

        let mut distinct = chosen.clone();
        distinct.sort_unstable();
        distinct.dedup();

        let mut outcomes: FxHashMap<usize, (f64, f64)> =
            FxHashMap::with_capacity_and_hasher(distinct.len(), Default::default());
        for arm in distinct {
            let reward = self.environment.get_reward(arm)?;
            let regret = self.environment.get_regret(arm)?;
            outcomes.insert(arm, (reward, regret));
        }

        let mut choices = Vec::with_capacity(self.strategies.len());
        for (strategy, &arm) in self.strategies.iter_mut().zip(&chosen) {
            let (reward, regret) = outcomes[&arm];
            strategy.observe_reward(arm, reward)?;
            self.history.record(strategy.kind(), arm, regret);
            choices.push(Choice {
                kind: strategy.kind(),
                arm,
                reward,
                regret,
            });
        }

        tracing::trace!(
            step,
            arms = ?chosen,
            regrets = ?choices.iter().map(|c| c.regret).collect::<Vec<_>>(),
            "step finished"
        );

        self.step += 1;
        Ok(StepRecord { step, choices })
    }

    /// Run the remaining steps, then persist `arms` and `regrets` along with
    /// per-model `<Model>_arms` and `<Model>_regrets` sequences.
    pub fn run(&mut self) -> Result<&RunHistory, SimError> {
        let start_time = Instant::now();
        let remaining = self.config.steps.saturating_sub(self.step);

        tracing::info!(
            name = %self.config.name,
            steps = self.config.steps,
            arms_nb = self.config.arms_nb,
            models = ?self.config.models,
            "starting run"
        );

        let pb = if self.options.show_progress {
            ProgressBar::new(remaining)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps ({per_sec}, eta {eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        while self.step < self.config.steps {
            self.step()?;
            pb.inc(1);
        }
        pb.finish_and_clear();

        self.sink.save_map("arms", &self.history.arms_map())?;
        self.sink.save_map("regrets", &self.history.regrets_map())?;
        for &kind in self.history.kinds() {
            let arms: Vec<f64> = self.history.arms(kind).iter().map(|&arm| arm as f64).collect();
            self.sink.save_sequence(&format!("{}_arms", kind), &arms)?;
            self.sink
                .save_sequence(&format!("{}_regrets", kind), self.history.regrets(kind))?;
        }

        tracing::info!(
            name = %self.config.name,
            elapsed_seconds = start_time.elapsed().as_secs_f64(),
            "run finished"
        );

        Ok(&self.history)
    }

    /// Aggregate the histories recorded so far.
    pub fn summary(&self) -> RunSummary {
        self.history.summary(self.config.arms_nb)
    }

    /// Steps completed.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// The run's configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The environment the models are evaluated against.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The models, in configuration order.
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Histories recorded so far.
    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Consume the run, keeping only its histories.
    pub fn into_history(self) -> RunHistory {
        self.history
    }
}

/// Build and run a simulation to completion.
pub fn run_simulation<S: LogSink>(
    config: &RunConfig,
    sink: S,
    options: RunOptions,
) -> Result<RunHistory, SimError> {
    let mut simulation = Simulation::new(config.clone(), sink, options)?;
    simulation.run()?;
    Ok(simulation.into_history())
}

/// Persist the arguments the environment and each model are built from, as
/// `environment_kwargs` and `<ModelName>_kwargs`.
pub fn save_run_parameters<S: LogSink>(config: &RunConfig, sink: &mut S) -> Result<(), SimError> {
    sink.save_map("environment_kwargs", &config.environment_params())?;
    for &kind in &config.models {
        let params = config.strategy_params(kind)?;
        sink.save_map(&format!("{}_kwargs", kind), &params)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::RewardDistribution;
    use crate::simulation::storage::{DirectorySink, NullSink};

    fn binomial_config(models: Vec<StrategyKind>) -> RunConfig {
        RunConfig::new("runner", 40, 6, 0.5, 4, RewardDistribution::Binomial, 3)
            .with_models(models)
            .with_v(1.0)
            .with_sigmas(1.0, 1.0, 1.0)
    }

    #[test]
    fn test_history_lengths_and_ranges() {
        let config = binomial_config(StrategyKind::ALL.to_vec());
        let history = run_simulation(&config, NullSink, RunOptions::default()).unwrap();

        assert_eq!(history.len(), 40);
        for kind in StrategyKind::ALL {
            assert_eq!(history.arms(kind).len(), 40);
            assert_eq!(history.regrets(kind).len(), 40);
            assert!(history.arms(kind).iter().all(|&arm| arm < 6));
            assert!(history.regrets(kind).iter().all(|&r| r >= 0.0));
        }
    }

    #[test]
    fn test_same_seed_same_history() {
        let config = binomial_config(StrategyKind::ALL.to_vec());
        let first = run_simulation(&config, NullSink, RunOptions::default()).unwrap();
        let second = run_simulation(&config, NullSink, RunOptions::default()).unwrap();
        for kind in StrategyKind::ALL {
            assert_eq!(first.arms(kind), second.arms(kind));
            assert_eq!(first.regrets(kind), second.regrets(kind));
        }
    }

    #[test]
    fn test_rewards_drawn_once_per_distinct_arm_in_ascending_order() {
        let config = binomial_config(vec![
            StrategyKind::BetaPriorsSampling,
            StrategyKind::GaussianPriorsSampling,
            StrategyKind::LinearGaussianSampling,
        ]);
        let mut simulation = Simulation::new(config.clone(), NullSink, RunOptions::default()).unwrap();
        let mut replica = Environment::from_params(&config.environment_params()).unwrap();

        for _ in 0..config.steps {
            let record = simulation.step().unwrap();

            let mut arms: Vec<usize> = record.choices.iter().map(|c| c.arm).collect();
            arms.sort_unstable();
            arms.dedup();
            let expected: FxHashMap<usize, f64> = arms
                .into_iter()
                .map(|arm| (arm, replica.get_reward(arm).unwrap()))
                .collect();

            for choice in &record.choices {
                assert_eq!(choice.reward, expected[&choice.arm]);
                assert_eq!(choice.regret, replica.get_regret(choice.arm).unwrap());
            }
        }
    }

    #[test]
    fn test_step_record_follows_config_order() {
        let models = vec![
            StrategyKind::LinearSemiParametricSampling,
            StrategyKind::BetaPriorsSampling,
        ];
        let mut simulation =
            Simulation::new(binomial_config(models.clone()), NullSink, RunOptions::default())
                .unwrap();
        let record = simulation.step().unwrap();
        let kinds: Vec<StrategyKind> = record.choices.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, models);
        assert_eq!(record.step, 0);
        assert_eq!(simulation.current_step(), 1);
    }

    #[test]
    fn test_beta_rejects_normal_rewards() {
        let config = RunConfig::new("normal", 5, 3, 0.5, 2, RewardDistribution::Normal, 1)
            .with_models(vec![StrategyKind::BetaPriorsSampling]);
        let result = run_simulation(&config, NullSink, RunOptions::default());
        assert!(matches!(result, Err(SimError::InvalidReward { .. })));
    }

    #[test]
    fn test_invalid_config_rejected_before_running() {
        let config = RunConfig::new("bad", 5, 3, 0.5, 2, RewardDistribution::Normal, 1)
            .with_models(vec![StrategyKind::LinearGaussianSampling]);
        let result = Simulation::new(config, NullSink, RunOptions::default());
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_cumulative_regret_and_summary() {
        let mut history = RunHistory::new(&[StrategyKind::GaussianPriorsSampling], 3);
        history.record(StrategyKind::GaussianPriorsSampling, 1, 0.5);
        history.record(StrategyKind::GaussianPriorsSampling, 0, 0.0);
        history.record(StrategyKind::GaussianPriorsSampling, 1, 0.25);

        assert_eq!(
            history.cumulative_regret(StrategyKind::GaussianPriorsSampling),
            vec![0.5, 0.5, 0.75]
        );

        let summary = history.summary(3);
        assert_eq!(summary.steps, 3);
        let entry = &summary.strategies[0];
        assert_eq!(entry.arm_counts, vec![1, 2, 0]);
        assert!((entry.total_regret - 0.75).abs() < 1e-12);
        assert!((entry.mean_regret - 0.25).abs() < 1e-12);
        assert!((entry.optimal_fraction - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_directory_sink_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let config = binomial_config(vec![StrategyKind::BetaPriorsSampling])
            .with_save_every(10);
        let mut sink = DirectorySink::open(root.path(), &config.name, config.save_every).unwrap();

        save_run_parameters(&config, &mut sink).unwrap();
        let history = run_simulation(&config, &mut sink, RunOptions::default()).unwrap();

        let dir = sink.path();
        for name in [
            "environment",
            "environment_kwargs",
            "BetaPriorsSampling_kwargs",
            "BetaPriorsSampling_0",
            "BetaPriorsSampling_10",
            "BetaPriorsSampling_20",
            "BetaPriorsSampling_30",
            "arms",
            "regrets",
        ] {
            assert!(dir.join(format!("{}.json", name)).exists(), "missing {}", name);
        }
        assert!(!dir.join("BetaPriorsSampling_5.json").exists());

        let text = std::fs::read_to_string(dir.join("arms.json")).unwrap();
        let arms: BTreeMap<String, Vec<usize>> = serde_json::from_str(&text).unwrap();
        assert_eq!(arms["BetaPriorsSampling"], history.arms(StrategyKind::BetaPriorsSampling));
    }

    #[derive(Default)]
    struct RecordingSink {
        sequences: Vec<(String, Vec<f64>)>,
    }

    impl LogSink for RecordingSink {
        fn save_every(&self) -> u64 {
            1
        }

        fn save_snapshot<T: Serialize + ?Sized>(&mut self, _: &str, _: &T) -> Result<(), SimError> {
            Ok(())
        }

        fn save_map<T: Serialize + ?Sized>(&mut self, _: &str, _: &T) -> Result<(), SimError> {
            Ok(())
        }

        fn save_sequence(&mut self, name: &str, values: &[f64]) -> Result<(), SimError> {
            self.sequences.push((name.to_string(), values.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_run_saves_per_model_sequences() {
        let models = vec![StrategyKind::GaussianPriorsSampling, StrategyKind::BetaPriorsSampling];
        let mut sink = RecordingSink::default();
        let history =
            run_simulation(&binomial_config(models), &mut sink, RunOptions::default()).unwrap();

        let names: Vec<&str> = sink.sequences.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "GaussianPriorsSampling_arms",
                "GaussianPriorsSampling_regrets",
                "BetaPriorsSampling_arms",
                "BetaPriorsSampling_regrets",
            ]
        );

        let beta_arms: Vec<f64> = history
            .arms(StrategyKind::BetaPriorsSampling)
            .iter()
            .map(|&arm| arm as f64)
            .collect();
        assert_eq!(sink.sequences[2].1, beta_arms);
        assert_eq!(sink.sequences[3].1, history.regrets(StrategyKind::BetaPriorsSampling));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_step_emits_trace_event() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let config = binomial_config(vec![StrategyKind::BetaPriorsSampling]);
        tracing::subscriber::with_default(subscriber, || {
            let mut simulation = Simulation::new(config, NullSink, RunOptions::default()).unwrap();
            simulation.step().unwrap();
            simulation.step().unwrap();
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let events: Vec<&str> = output.lines().filter(|l| l.contains("step finished")).collect();
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("step=0"));
        assert!(events[1].contains("step=1"));
    }

    #[test]
    fn test_linear_models_share_environment_context() {
        let config = binomial_config(StrategyKind::ALL.to_vec());
        let simulation = Simulation::new(config, NullSink, RunOptions::default()).unwrap();
        // environment plus the two linear models
        assert_eq!(std::sync::Arc::strong_count(simulation.environment().shared_context()), 3);

        for strategy in &simulation.strategies {
            let json = serde_json::to_value(strategy).unwrap();
            assert!(json.get("x").is_none());
        }
        let json = serde_json::to_value(simulation.environment()).unwrap();
        assert!(json.get("x").is_some());
    }
}
