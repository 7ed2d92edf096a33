//! # feeder_reconfig
//!
//! Local search engine for the switching reconfiguration of electrical
//! distribution networks over one or more time periods.
//!
//! A solution holds one radial configuration per period. The search explores
//! close-one-open-another swaps, applies independent improving moves together
//! and diversifies with random restarts or ruin and recreate rounds, while
//! objectives such as losses and switching stability guide it.

pub mod config;
pub mod configuration;
pub mod construction;
pub mod criteria;
pub mod error;
pub mod events;
pub mod flow;
pub mod local_search;
pub mod multi_period;
pub mod network;
pub mod problem;
pub mod solution;
pub mod stop;
pub mod synthetic;
pub mod utils;

use crate::config::{AlgorithmKind, Config};
use crate::construction::SpanningTreeConstructor;
use crate::criteria::{ConstraintViolation, Criteria};
use crate::error::{ReconfigError, Result};
use crate::events::{EventHub, SolverEvent};
use crate::flow::RadialLoadFlow;
use crate::local_search::{Descent, DescentConfig};
use crate::multi_period::{
    build_selector, construct_feasible, RandomRestartSolver, RuinAndRecreateMultiPeriod,
    SimpleMultiPeriodSolver,
};
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use crate::stop::{AnyStop, StopCriterion, StopToken};
use crate::utils::RunReport;

use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of a finished optimization.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub algorithm: AlgorithmKind,
    /// Best feasible solution, `None` if no feasible solution was found.
    pub solution: Option<Solution>,
    pub value: Option<f64>,
    /// Violations of the start solution when construction failed.
    pub violations: Vec<ConstraintViolation>,
    pub runtime: Duration,
}

impl OptimizationOutcome {
    pub fn is_feasible(&self) -> bool {
        self.solution.is_some()
    }

    pub fn report(&self, problem: &Problem) -> RunReport {
        RunReport {
            problem: problem.name.clone(),
            algorithm: self.algorithm.name().to_string(),
            runtime_ms: self.runtime.as_millis(),
            feasible: self.is_feasible(),
            solution: self
                .solution
                .as_ref()
                .zip(self.value)
                .map(|(s, v)| s.report(v)),
            violations: self.violations.clone(),
        }
    }
}

/// Entry point tying a problem, its criteria and a configured algorithm
/// together.
pub struct Optimizer {
    problem: Arc<Problem>,
    config: Config,
    criteria: Criteria,
    initial: Solution,
    events: EventHub,
}

impl Optimizer {
    /// Check `config` against `problem` and set up the standard criteria.
    pub fn new(problem: Problem, config: Config) -> Result<Self> {
        config.validate()?;
        if problem.is_multi_period() && !config.algorithm.supports_multi_period() {
            return Err(ReconfigError::Misconfiguration(format!(
                "{} cannot optimize a problem with {} periods",
                config.algorithm,
                problem.period_count()
            )));
        }

        let provider = Arc::new(RadialLoadFlow::new(config.voltage));
        let criteria = Criteria::standard(&config, provider);
        let initial = Solution::initial(&problem);
        Ok(Optimizer {
            problem: Arc::new(problem),
            config,
            criteria,
            initial,
            events: EventHub::new(),
        })
    }

    /// Replace the standard criteria.
    pub fn with_criteria(mut self, criteria: Criteria) -> Result<Self> {
        if criteria.objective_names().is_empty() {
            return Err(ReconfigError::Misconfiguration(
                "criteria without objectives".to_string(),
            ));
        }
        self.criteria = criteria;
        Ok(self)
    }

    /// Start from `solution` instead of the field state.
    pub fn with_initial_solution(mut self, solution: Solution) -> Result<Self> {
        if solution.period_count() != self.problem.period_count() {
            return Err(ReconfigError::Misconfiguration(format!(
                "initial solution has {} periods, the problem has {}",
                solution.period_count(),
                self.problem.period_count()
            )));
        }
        self.initial = solution;
        Ok(self)
    }

    pub fn subscribe(&mut self, observer: impl Fn(&SolverEvent) + Send + Sync + 'static) {
        self.events.subscribe(observer);
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Run the configured algorithm until it finishes, its time limit expires
    /// or `stop` triggers.
    pub fn run(&mut self, stop: &dyn StopCriterion) -> Result<OptimizationOutcome> {
        let start = Instant::now();
        let algorithm = self.config.algorithm;
        self.events.emit(SolverEvent::OptimizationStarted {
            algorithm: algorithm.name().to_string(),
        });
        let budget = AnyStop::new()
            .with(stop)
            .with_time_limit(self.config.time_limit);

        let (solution, violations) = match algorithm {
            AlgorithmKind::Descent => self.run_descent(&budget)?,
            AlgorithmKind::RandomRestart => self.run_random_restart(&budget)?,
            AlgorithmKind::SimpleMultiPeriod => {
                let mut solver = SimpleMultiPeriodSolver::new(&self.config, self.constructor());
                let solution = solver.optimize(
                    &self.problem,
                    &self.criteria,
                    &self.initial,
                    &budget,
                    &self.events,
                )?;
                (solution, solver.violations().to_vec())
            }
            AlgorithmKind::RuinAndRecreate => {
                let mut solver = RuinAndRecreateMultiPeriod::new(&self.config, self.constructor());
                let solution = solver.optimize(
                    &self.problem,
                    &self.criteria,
                    &self.initial,
                    &budget,
                    &self.events,
                )?;
                (solution, solver.violations().to_vec())
            }
        };

        let value = solution
            .as_ref()
            .map(|s| self.criteria.value(&self.problem, s));
        self.events.emit(SolverEvent::OptimizationStopped { value });
        let runtime = start.elapsed();
        info!(
            "{} on {} finished in {}",
            algorithm,
            self.problem.name,
            utils::format_duration(runtime)
        );

        Ok(OptimizationOutcome {
            algorithm,
            solution,
            value,
            violations,
            runtime,
        })
    }

    /// Run on a worker thread. The returned handle stops it cleanly.
    pub fn spawn(mut self) -> BackgroundOptimization {
        let token = StopToken::new();
        let worker_token = token.clone();
        let handle = thread::spawn(move || self.run(&worker_token));
        BackgroundOptimization { token, handle }
    }

    fn constructor(&self) -> Box<SpanningTreeConstructor> {
        Box::new(SpanningTreeConstructor::from_config(&self.config))
    }

    fn run_descent(
        &self,
        stop: &dyn StopCriterion,
    ) -> Result<(Option<Solution>, Vec<ConstraintViolation>)> {
        let mut constructor = self.constructor();
        let (mut solution, value) = match construct_feasible(
            constructor.as_mut(),
            &self.problem,
            &self.criteria,
            &self.initial,
            stop,
            &self.events,
        ) {
            Ok(start) => start,
            Err(violations) => return Ok((None, violations)),
        };

        let periods: Vec<Period> = self.problem.periods().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(3));
        let mut selector = build_selector(
            &self.problem,
            &periods,
            self.config.use_small_neighbourhood,
            self.config.retry_adjacent_periods,
            &mut rng,
        );
        Descent::new(&self.problem, &self.criteria, DescentConfig::from(&self.config))
            .with_incumbent(value)
            .run(&mut solution, selector.as_mut(), stop, &self.events)?;
        Ok((Some(solution), Vec::new()))
    }

    fn run_random_restart(
        &self,
        stop: &dyn StopCriterion,
    ) -> Result<(Option<Solution>, Vec<ConstraintViolation>)> {
        let mut constructor = self.constructor();
        let (solution, _) = match construct_feasible(
            constructor.as_mut(),
            &self.problem,
            &self.criteria,
            &self.initial,
            stop,
            &self.events,
        ) {
            Ok(start) => start,
            Err(violations) => return Ok((None, violations)),
        };

        let outcome = RandomRestartSolver::new(&self.config).optimize_period(
            &self.problem,
            &self.criteria,
            &solution,
            Period(0),
            stop,
            &self.events,
        )?;
        Ok((Some(outcome.solution), Vec::new()))
    }
}

/// An optimization running on its own thread.
pub struct BackgroundOptimization {
    token: StopToken,
    handle: JoinHandle<Result<OptimizationOutcome>>,
}

impl BackgroundOptimization {
    /// Token that stops the worker when raised.
    pub fn stop_token(&self) -> StopToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the worker to stop and wait until the current iteration completed.
    pub fn stop(self) -> Result<OptimizationOutcome> {
        self.token.stop();
        self.wait()
    }

    /// Wait for the worker to finish on its own.
    pub fn wait(self) -> Result<OptimizationOutcome> {
        self.handle.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ReconfigError::WorkerPanicked(message)
        })?
    }
}
