//! Bounded random-restart descent on a single period.

use crate::config::Config;
use crate::criteria::Criteria;
use crate::error::Result;
use crate::events::{EventHub, SolverEvent};
use crate::local_search::moves::IMPROVEMENT_EPSILON;
use crate::local_search::neighborhood::CloseSwitchAndOpenOtherNeighbourhood;
use crate::local_search::selector::SequentialSelector;
use crate::local_search::{Descent, DescentConfig};
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use crate::stop::{AnyStop, StopCriterion};
use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;

/// Result of one random-restart run.
#[derive(Debug, Clone)]
pub struct RestartOutcome {
    pub solution: Solution,
    pub value: f64,
    pub improved: bool,
    pub restarts_run: usize,
}

/// Descends in one period, then repeatedly perturbs the best state found and
/// descends again. Only the chosen period changes; the others stay in place so
/// that objectives coupling periods see them.
pub struct RandomRestartSolver {
    restarts: usize,
    perturbation_moves: usize,
    time_limit: Option<Duration>,
    descent: DescentConfig,
    use_small_neighbourhood: bool,
    rng: ChaCha8Rng,
}

impl RandomRestartSolver {
    pub fn new(config: &Config) -> Self {
        RandomRestartSolver {
            restarts: config.restarts.max(1),
            perturbation_moves: config.perturbation_moves,
            time_limit: config.restart_time_limit,
            descent: DescentConfig::from(config),
            use_small_neighbourhood: config.use_small_neighbourhood,
            rng: ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1)),
        }
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    /// Improve `period` of `solution`.
    pub fn optimize_period(
        &mut self,
        problem: &Problem,
        criteria: &Criteria,
        solution: &Solution,
        period: Period,
        stop: &dyn StopCriterion,
        events: &EventHub,
    ) -> Result<RestartOutcome> {
        let budget = AnyStop::new().with(stop).with_time_limit(self.time_limit);
        let start_value = criteria.value(problem, solution);
        let mut best = solution.clone();
        let mut best_value = start_value;
        let mut restarts_run = 0;

        for restart in 0..self.restarts {
            if budget.is_triggered() {
                break;
            }
            let mut work = best.clone();
            if restart > 0 {
                self.perturb(&mut work, period)?;
            }

            let mut selector = SequentialSelector::for_periods(
                problem,
                &[period],
                self.use_small_neighbourhood,
                &mut self.rng,
            );
            let stats = Descent::new(problem, criteria, self.descent)
                .with_incumbent(best_value)
                .run(&mut work, &mut selector, &budget, events)?;
            restarts_run += 1;

            let value = criteria.value(problem, &work);
            trace!("restart {} in {}: {:.6}", restart, period, value);
            if value < best_value - IMPROVEMENT_EPSILON && criteria.is_feasible(problem, &work) {
                if stats.applied_moves == 0 {
                    events.emit(SolverEvent::BestSolutionFound {
                        value,
                        solution: Arc::new(work.clone()),
                    });
                }
                best = work;
                best_value = value;
            }
        }

        debug!(
            "random restart in {}: {:.6} -> {:.6} after {} restart(s)",
            period, start_value, best_value, restarts_run
        );
        Ok(RestartOutcome {
            improved: best_value < start_value - IMPROVEMENT_EPSILON,
            solution: best,
            value: best_value,
            restarts_run,
        })
    }

    /// Apply random close-and-open swaps to `period`.
    fn perturb(&mut self, solution: &mut Solution, period: Period) -> Result<()> {
        for _ in 0..self.perturbation_moves {
            let Some(config) = solution.get(period) else {
                return Ok(());
            };
            let Some(&close) = config.open_switches().choose(&mut self.rng) else {
                return Ok(());
            };
            let mut neighbourhood = CloseSwitchAndOpenOtherNeighbourhood::new(close, period, false);
            neighbourhood.init(solution);
            let moves = neighbourhood.into_moves();
            if let Some(mv) = moves.choose(&mut self.rng) {
                mv.apply(solution)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RadialLoadFlow;
    use crate::network::{Line, Network, Node};
    use crate::problem::PeriodData;
    use crate::stop::NeverStop;

    fn problem() -> Problem {
        let nodes = (0..5)
            .map(|i| {
                if i == 0 {
                    Node::provider(i, "P")
                } else {
                    Node::consumer(i, format!("N{}", i))
                }
            })
            .collect();
        let lines = (0..5)
            .map(|i| Line::switch(i, i, (i + 1) % 5, 1.0, i == 4))
            .collect();
        let network = Network::new(nodes, lines).unwrap();
        Problem::new(
            "ring",
            network,
            vec![
                PeriodData::new("h0", vec![0.0, 0.1, 0.1, 1.0, 1.0]),
                PeriodData::new("h1", vec![0.0, 1.0, 1.0, 0.1, 0.1]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_only_the_chosen_period_changes() {
        let problem = problem();
        let config = Config::new().with_restarts(3).with_parallel(false);
        let criteria = Criteria::standard(&config, Arc::new(RadialLoadFlow::default()));
        let solution = Solution::initial(&problem);

        let mut solver = RandomRestartSolver::new(&config);
        let outcome = solver
            .optimize_period(&problem, &criteria, &solution, Period(0), &NeverStop, &EventHub::new())
            .unwrap();

        assert!(outcome.improved);
        assert!(outcome.value < criteria.value(&problem, &solution));
        assert_eq!(
            outcome.solution.configuration(Period(1)).open_flags(),
            solution.configuration(Period(1)).open_flags()
        );
        assert!(criteria.is_feasible(&problem, &outcome.solution));
    }
}
