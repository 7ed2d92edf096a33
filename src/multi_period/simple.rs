//! Sequential multi-period solver: sweeps the periods in order and improves
//! each one with a random-restart descent while its neighbours stay fixed.

use super::{construct_feasible, RandomRestartSolver};
use crate::config::Config;
use crate::construction::FeasibilityConstructor;
use crate::criteria::{ConstraintViolation, Criteria};
use crate::error::Result;
use crate::events::{EventHub, SolverEvent};
use crate::local_search::moves::IMPROVEMENT_EPSILON;
use crate::problem::Problem;
use crate::solution::Solution;
use crate::stop::{AnyStop, StopCriterion};
use log::{info, warn};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleSolverState {
    ConstructingFeasible,
    FirstPass,
    SubsequentPass,
    Done,
    Failed,
}

pub struct SimpleMultiPeriodSolver {
    max_iterations: usize,
    time_limit: Option<Duration>,
    constructor: Box<dyn FeasibilityConstructor>,
    restart: RandomRestartSolver,
    state: SimpleSolverState,
    violations: Vec<ConstraintViolation>,
    sweeps: usize,
}

impl SimpleMultiPeriodSolver {
    pub fn new(config: &Config, constructor: Box<dyn FeasibilityConstructor>) -> Self {
        SimpleMultiPeriodSolver {
            max_iterations: config.max_iterations,
            time_limit: config.time_limit,
            constructor,
            restart: RandomRestartSolver::new(config),
            state: SimpleSolverState::ConstructingFeasible,
            violations: Vec::new(),
            sweeps: 0,
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn state(&self) -> SimpleSolverState {
        self.state
    }

    /// Violations of the start solution if no feasible one could be built.
    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    /// Completed sweeps of the last run.
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Returns `None` if no feasible solution could be constructed.
    pub fn optimize(
        &mut self,
        problem: &Problem,
        criteria: &Criteria,
        initial: &Solution,
        stop: &dyn StopCriterion,
        events: &EventHub,
    ) -> Result<Option<Solution>> {
        let budget = AnyStop::new().with(stop).with_time_limit(self.time_limit);
        self.sweeps = 0;
        self.violations.clear();
        self.state = SimpleSolverState::ConstructingFeasible;

        let (mut current, mut value) = match construct_feasible(
            self.constructor.as_mut(),
            problem,
            criteria,
            initial,
            &budget,
            events,
        ) {
            Ok(start) => start,
            Err(violations) => {
                warn!("no feasible start for {}", problem.name);
                self.violations = violations;
                self.state = SimpleSolverState::Failed;
                return Ok(None);
            }
        };

        self.state = SimpleSolverState::FirstPass;
        while self.sweeps < self.max_iterations && !budget.is_triggered() {
            let mut improved = false;
            for period in problem.periods() {
                if budget.is_triggered() {
                    break;
                }
                events.emit(SolverEvent::StartingSubOptimizer {
                    name: format!("random restart {}", period),
                });
                let outcome = self.restart.optimize_period(
                    problem, criteria, &current, period, &budget, events,
                )?;
                if outcome.improved && outcome.value < value - IMPROVEMENT_EPSILON {
                    current.set_configuration(period, outcome.solution.configuration(period).clone());
                    value = criteria.value(problem, &current);
                    improved = true;
                }
            }
            self.sweeps += 1;
            info!("sweep {} finished at {:.6}", self.sweeps, value);

            if self.state == SimpleSolverState::SubsequentPass && !improved {
                break;
            }
            self.state = SimpleSolverState::SubsequentPass;
        }

        self.state = SimpleSolverState::Done;
        Ok(Some(current))
    }
}
