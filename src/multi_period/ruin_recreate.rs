//! Ruin and recreate over all periods.
//!
//! After a first descent to a local optimum every round forces a random set of
//! switches closed in every period, rebuilds each meshed period with the
//! feasibility constructor and descends again. A round that beats the best
//! solution replaces it; otherwise the search restarts from the best.

use super::{build_selector, construct_feasible};
use crate::config::Config;
use crate::construction::FeasibilityConstructor;
use crate::criteria::{ConstraintViolation, Criteria};
use crate::error::Result;
use crate::events::{EventHub, SolverEvent};
use crate::local_search::moves::IMPROVEMENT_EPSILON;
use crate::local_search::{Descent, DescentConfig};
use crate::network::LineId;
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use crate::stop::{AnyStop, StopCriterion};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuinAndRecreateState {
    Initializing,
    LocalSearchToOptimum,
    Ruin,
    Recreate,
    Done,
    Failed,
}

pub struct RuinAndRecreateMultiPeriod {
    max_iterations: usize,
    time_limit: Option<Duration>,
    min_ruined_switches: usize,
    ruin_fraction: f64,
    descent: DescentConfig,
    use_small_neighbourhood: bool,
    retry_adjacent_periods: bool,
    constructor: Box<dyn FeasibilityConstructor>,
    rng: ChaCha8Rng,
    state: RuinAndRecreateState,
    violations: Vec<ConstraintViolation>,
    iterations: usize,
}

impl RuinAndRecreateMultiPeriod {
    pub fn new(config: &Config, constructor: Box<dyn FeasibilityConstructor>) -> Self {
        RuinAndRecreateMultiPeriod {
            max_iterations: config.max_iterations,
            time_limit: config.time_limit,
            min_ruined_switches: config.min_ruined_switches,
            ruin_fraction: config.ruin_fraction,
            descent: DescentConfig::from(config),
            use_small_neighbourhood: config.use_small_neighbourhood,
            retry_adjacent_periods: config.retry_adjacent_periods,
            constructor,
            rng: ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(2)),
            state: RuinAndRecreateState::Initializing,
            violations: Vec::new(),
            iterations: 0,
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn state(&self) -> RuinAndRecreateState {
        self.state
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    /// Completed ruin rounds of the last run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of switches ruined per round.
    pub fn ruin_size(&self, switchable: usize) -> usize {
        let by_fraction = (self.ruin_fraction * switchable as f64).ceil() as usize;
        by_fraction.max(self.min_ruined_switches).min(switchable)
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
        let periods: Vec<Period> = problem.periods().collect();
        self.iterations = 0;
        self.violations.clear();
        self.state = RuinAndRecreateState::Initializing;

        let (mut current, start_value) = match construct_feasible(
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
                self.state = RuinAndRecreateState::Failed;
                return Ok(None);
            }
        };

        self.state = RuinAndRecreateState::LocalSearchToOptimum;
        self.descend(problem, criteria, &periods, &mut current, start_value, &budget, events)?;
        let mut best = current.clone();
        let mut best_value = criteria.value(problem, &best);
        info!("local optimum {:.6} before ruin rounds", best_value);

        while self.iterations < self.max_iterations && !budget.is_triggered() {
            self.state = RuinAndRecreateState::Ruin;
            let ruined_lines = self.pick_ruined(problem);
            let ruined = Self::ruin(&current, &periods, &ruined_lines)?;

            self.state = RuinAndRecreateState::Recreate;
            let repaired = self.recreate(problem, criteria, &mut current, &ruined, &periods, &budget);

            self.state = RuinAndRecreateState::LocalSearchToOptimum;
            let applied =
                self.descend(problem, criteria, &periods, &mut current, best_value, &budget, events)?;
            self.iterations += 1;

            let value = criteria.value(problem, &current);
            debug!(
                "round {}: ruined {} switches, repaired {} period(s), value {:.6}",
                self.iterations,
                ruined_lines.len(),
                repaired,
                value
            );
            if value < best_value - IMPROVEMENT_EPSILON && criteria.is_feasible(problem, &current) {
                if applied == 0 {
                    events.emit(SolverEvent::BestSolutionFound {
                        value,
                        solution: Arc::new(current.clone()),
                    });
                }
                best = current.clone();
                best_value = value;
            } else {
                current = best.clone();
            }
        }

        self.state = RuinAndRecreateState::Done;
        info!(
            "ruin and recreate finished after {} round(s) at {:.6}",
            self.iterations, best_value
        );
        Ok(Some(best))
    }

    /// Descend over every period; returns the number of applied moves.
    #[allow(clippy::too_many_arguments)]
    fn descend(
        &mut self,
        problem: &Problem,
        criteria: &Criteria,
        periods: &[Period],
        solution: &mut Solution,
        incumbent: f64,
        stop: &dyn StopCriterion,
        events: &EventHub,
    ) -> Result<usize> {
        let mut selector = build_selector(
            problem,
            periods,
            self.use_small_neighbourhood,
            self.retry_adjacent_periods,
            &mut self.rng,
        );
        let stats = Descent::new(problem, criteria, self.descent)
            .with_incumbent(incumbent)
            .run(solution, selector.as_mut(), stop, events)?;
        Ok(stats.applied_moves)
    }

    fn pick_ruined(&mut self, problem: &Problem) -> Vec<LineId> {
        let switchable = problem.network.switchable_lines();
        let count = self.ruin_size(switchable.len());
        switchable
            .choose_multiple(&mut self.rng, count)
            .copied()
            .collect()
    }

    /// Copy of `solution` with `lines` closed in every period.
    fn ruin(solution: &Solution, periods: &[Period], lines: &[LineId]) -> Result<Solution> {
        let mut ruined = solution.clone();
        for &period in periods {
            if let Some(config) = ruined.get_mut(period) {
                for &line in lines {
                    if config.is_open(line) {
                        config.set_switch(line, false)?;
                    }
                }
            }
        }
        Ok(ruined)
    }

    /// Rebuild each ruined period and fold the feasible ones into `current`.
    /// Returns the number of folded periods.
    fn recreate(
        &mut self,
        problem: &Problem,
        criteria: &Criteria,
        current: &mut Solution,
        ruined: &Solution,
        periods: &[Period],
        stop: &dyn StopCriterion,
    ) -> usize {
        let mut folded = 0;
        for &period in periods {
            if stop.is_triggered() {
                break;
            }
            let mut trial = current.clone();
            trial.set_configuration(period, ruined.configuration(period).clone());
            if let Some(repaired) = self.constructor.optimize(problem, &trial, criteria, stop) {
                current.set_configuration(period, repaired.configuration(period).clone());
                folded += 1;
            }
        }
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::{SpanningTreeConstructor, TreeOrdering};

    #[test]
    fn test_ruin_size_bounds() {
        let config = Config::default();
        let solver = RuinAndRecreateMultiPeriod::new(
            &config,
            Box::new(SpanningTreeConstructor::new(TreeOrdering::Random, 1)),
        );
        assert_eq!(solver.ruin_size(3), 3);
        assert_eq!(solver.ruin_size(100), 5);
        assert_eq!(solver.ruin_size(1000), 10);
        assert_eq!(solver.state(), RuinAndRecreateState::Initializing);
    }
}
