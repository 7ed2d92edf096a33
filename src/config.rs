//! Configuration parameters for the reconfiguration engine.

use crate::error::{ReconfigError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// The top level search algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmKind {
    /// Plain descent over every period at once
    Descent,
    /// Random restarts of a descent; single period problems only
    RandomRestart,
    /// Sweeps of per-period random restarts
    SimpleMultiPeriod,
    /// Descent diversified by ruining and rebuilding switch sets
    RuinAndRecreate,
}

impl AlgorithmKind {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::Descent => "descent",
            AlgorithmKind::RandomRestart => "random-restart",
            AlgorithmKind::SimpleMultiPeriod => "simple-multi-period",
            AlgorithmKind::RuinAndRecreate => "ruin-and-recreate",
        }
    }

    /// Whether the algorithm can handle more than one period.
    pub fn supports_multi_period(&self) -> bool {
        !matches!(self, AlgorithmKind::RandomRestart)
    }
}

/// How feasible start solutions and repairs are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConstructorKind {
    /// Spanning tree over randomly ordered lines
    RandomSpanningTree,
    /// Spanning tree preferring low resistance lines
    MinimumResistanceTree,
}

impl ConstructorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstructorKind::RandomSpanningTree => "random-spanning-tree",
            ConstructorKind::MinimumResistanceTree => "minimum-resistance-tree",
        }
    }
}

/// Which improving move a descent applies from a neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ImprovementPolicy {
    /// The most improving feasible move
    BestImprovement,
    /// The first improving feasible move found
    FirstImprovement,
}

impl ImprovementPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ImprovementPolicy::BestImprovement => "best-improvement",
            ImprovementPolicy::FirstImprovement => "first-improvement",
        }
    }
}

macro_rules! named_enum {
    ($ty:ident, $what:literal, [$($alias:literal => $variant:ident),* $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = ReconfigError;

            fn from_str(s: &str) -> Result<Self> {
                let key = s.trim().to_ascii_lowercase().replace('_', "-");
                match key.as_str() {
                    $($alias => Ok($ty::$variant),)*
                    _ => Err(ReconfigError::Misconfiguration(format!(
                        "unknown {} '{}'",
                        $what, s
                    ))),
                }
            }
        }
    };
}

named_enum!(AlgorithmKind, "algorithm", [
    "descent" => Descent,
    "random-restart" => RandomRestart,
    "simple-multi-period" => SimpleMultiPeriod,
    "simple" => SimpleMultiPeriod,
    "ruin-and-recreate" => RuinAndRecreate,
    "ruin-recreate" => RuinAndRecreate,
]);

named_enum!(ConstructorKind, "constructor", [
    "random-spanning-tree" => RandomSpanningTree,
    "random" => RandomSpanningTree,
    "minimum-resistance-tree" => MinimumResistanceTree,
    "minimum-resistance" => MinimumResistanceTree,
]);

named_enum!(ImprovementPolicy, "improvement policy", [
    "best-improvement" => BestImprovement,
    "best" => BestImprovement,
    "first-improvement" => FirstImprovement,
    "first" => FirstImprovement,
]);

/// Configuration settings for the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search algorithm to run
    pub algorithm: AlgorithmKind,
    /// Construction and repair strategy
    pub constructor: ConstructorKind,
    /// Best or first improvement in the descent
    pub improvement_policy: ImprovementPolicy,
    /// Neighbourhoods scored per descent iteration
    pub batch_size: usize,
    /// Score a batch on the rayon pool
    pub parallel: bool,
    /// Only propose the switches next to the closing switch
    pub use_small_neighbourhood: bool,
    /// Retry improving swaps in the adjacent periods
    pub retry_adjacent_periods: bool,
    /// Sweeps (simple solver) or ruin rounds (ruin and recreate)
    pub max_iterations: usize,
    /// Optional time limit for the whole optimization
    pub time_limit: Option<Duration>,
    /// Restarts per random-restart run
    pub restarts: usize,
    /// Optional time limit for one random-restart run
    pub restart_time_limit: Option<Duration>,
    /// Random swaps applied before each restart
    pub perturbation_moves: usize,
    /// Lower bound of switches ruined per round
    pub min_ruined_switches: usize,
    /// Share of switchable lines ruined per round
    pub ruin_fraction: f64,
    /// Spanning trees tried before construction gives up
    pub construction_attempts: usize,
    /// Weight of energy losses
    pub loss_weight: f64,
    /// Weight of switching away from the field state
    pub switching_cost_weight: f64,
    /// Weight of switch changes between periods
    pub configuration_change_weight: f64,
    /// Weight of expected interrupted energy
    pub reliability_weight: f64,
    /// Nominal voltage used by the reference load flow
    pub voltage: f64,
    /// Seed of every random generator
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: AlgorithmKind::RuinAndRecreate,
            constructor: ConstructorKind::RandomSpanningTree,
            improvement_policy: ImprovementPolicy::BestImprovement,
            batch_size: 8,
            parallel: true,
            use_small_neighbourhood: false,
            retry_adjacent_periods: true,
            max_iterations: 20,
            time_limit: None,
            restarts: 3,
            restart_time_limit: None,
            perturbation_moves: 3,
            min_ruined_switches: 5,
            ruin_fraction: 0.01,
            construction_attempts: 20,
            loss_weight: 1.0,
            switching_cost_weight: 0.0,
            configuration_change_weight: 0.01,
            reliability_weight: 0.0,
            voltage: 1.0,
            seed: 42,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Config::default()
    }

    /// Read a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no search can run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ReconfigError::Misconfiguration(msg));
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".to_string());
        }
        if self.max_iterations == 0 {
            return fail("max_iterations must be at least 1".to_string());
        }
        if self.restarts == 0 {
            return fail("restarts must be at least 1".to_string());
        }
        if self.construction_attempts == 0 {
            return fail("construction_attempts must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.ruin_fraction) {
            return fail(format!("ruin_fraction {} is not in [0, 1]", self.ruin_fraction));
        }
        if !(self.voltage.is_finite() && self.voltage > 0.0) {
            return fail(format!("voltage {} must be positive", self.voltage));
        }
        let weights = [
            ("loss_weight", self.loss_weight),
            ("switching_cost_weight", self.switching_cost_weight),
            ("configuration_change_weight", self.configuration_change_weight),
            ("reliability_weight", self.reliability_weight),
        ];
        if let Some((name, w)) = weights.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return fail(format!("{} {} must be a non-negative number", name, w));
        }
        Ok(())
    }

    /// Set the search algorithm.
    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the construction strategy.
    pub fn with_constructor(mut self, constructor: ConstructorKind) -> Self {
        self.constructor = constructor;
        self
    }

    /// Set the improvement policy.
    pub fn with_improvement_policy(mut self, policy: ImprovementPolicy) -> Self {
        self.improvement_policy = policy;
        self
    }

    /// Set the number of neighbourhoods scored per iteration.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enable or disable parallel scoring.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Use the small close-and-open neighbourhood.
    pub fn with_small_neighbourhood(mut self, small: bool) -> Self {
        self.use_small_neighbourhood = small;
        self
    }

    /// Enable or disable retries in adjacent periods.
    pub fn with_retry_adjacent_periods(mut self, retry: bool) -> Self {
        self.retry_adjacent_periods = retry;
        self
    }

    /// Set the maximum number of sweeps or ruin rounds.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the time limit.
    pub fn with_time_limit(mut self, duration: Duration) -> Self {
        self.time_limit = Some(duration);
        self
    }

    /// Set the number of restarts per random-restart run.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    /// Set the time limit of a single random-restart run.
    pub fn with_restart_time_limit(mut self, duration: Duration) -> Self {
        self.restart_time_limit = Some(duration);
        self
    }

    /// Set the ruin size bounds.
    pub fn with_ruin(mut self, min_switches: usize, fraction: f64) -> Self {
        self.min_ruined_switches = min_switches;
        self.ruin_fraction = fraction;
        self
    }

    /// Set the weight of expected interrupted energy.
    pub fn with_reliability_weight(mut self, weight: f64) -> Self {
        self.reliability_weight = weight;
        self
    }

    /// Set the objective weights.
    pub fn with_weights(mut self, losses: f64, switching: f64, changes: f64) -> Self {
        self.loss_weight = losses;
        self.switching_cost_weight = switching;
        self.configuration_change_weight = changes;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
