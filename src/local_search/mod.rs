//! Local search: moves, neighbourhoods, the dependence rule and the descent
//! driver that ties them together.

pub mod dependence;
pub mod moves;
pub mod neighborhood;
pub mod selector;

use crate::config::{Config, ImprovementPolicy};
use crate::criteria::Criteria;
use crate::error::Result;
use crate::events::{EventHub, SolverEvent};
use crate::problem::Problem;
use crate::solution::Solution;
use crate::stop::StopCriterion;
use log::{debug, trace};
use rayon::prelude::*;
use std::sync::Arc;

use self::dependence::MoveDependenceRule;
use self::moves::{Move, MoveInfo, IMPROVEMENT_EPSILON};
use self::neighborhood::Neighborhood;
use self::selector::{NeighborhoodSelector, Selection};

/// Settings of a descent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescentConfig {
    pub policy: ImprovementPolicy,
    /// Neighbourhoods scored per iteration
    pub batch_size: usize,
    /// Score a batch on the rayon pool
    pub parallel: bool,
}

impl Default for DescentConfig {
    fn default() -> Self {
        DescentConfig {
            policy: ImprovementPolicy::BestImprovement,
            batch_size: 8,
            parallel: true,
        }
    }
}

impl From<&Config> for DescentConfig {
    fn from(config: &Config) -> Self {
        DescentConfig {
            policy: config.improvement_policy,
            batch_size: config.batch_size.max(1),
            parallel: config.parallel,
        }
    }
}

/// Counters of one descent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescentStatistics {
    pub iterations: usize,
    pub evaluated_moves: usize,
    pub applied_moves: usize,
    /// Candidates dropped because they conflict with a move committed earlier
    /// in the same iteration.
    pub dependent_moves: usize,
    /// Candidates scored again after an earlier commit.
    pub rescored_moves: usize,
    pub reached_local_optimum: bool,
    pub final_value: f64,
}

/// A neighbourhood with the move chosen from it.
struct Scored {
    neighborhood: Neighborhood,
    candidate: Option<MoveInfo>,
    evaluated: usize,
}

/// Repeatedly applies improving moves until the selector runs dry.
pub struct Descent<'a> {
    problem: &'a Problem,
    criteria: &'a Criteria,
    config: DescentConfig,
    rule: MoveDependenceRule,
    incumbent: Option<f64>,
}

impl<'a> Descent<'a> {
    pub fn new(problem: &'a Problem, criteria: &'a Criteria, config: DescentConfig) -> Self {
        Descent {
            problem,
            criteria,
            config,
            rule: MoveDependenceRule::new(),
            incumbent: None,
        }
    }

    /// Only report solutions better than `value`.
    pub fn with_incumbent(mut self, value: f64) -> Self {
        self.incumbent = Some(value);
        self
    }

    /// Improve `solution` in place.
    pub fn run(
        &self,
        solution: &mut Solution,
        selector: &mut dyn NeighborhoodSelector,
        stop: &dyn StopCriterion,
        events: &EventHub,
    ) -> Result<DescentStatistics> {
        let (problem, criteria) = (self.problem, self.criteria);
        selector.init(problem, solution);

        let mut stats = DescentStatistics::default();
        let mut value = criteria.value(problem, solution);
        let mut best = self
            .incumbent
            .or_else(|| criteria.is_feasible(problem, solution).then_some(value));

        loop {
            if stop.is_triggered() {
                debug!("descent stopped after {} iterations", stats.iterations);
                break;
            }

            let (batch, exhausted) = self.collect_batch(selector, solution);
            if batch.is_empty() {
                stats.reached_local_optimum = exhausted;
                if exhausted {
                    events.emit(SolverEvent::LocalOptimumFound { value });
                }
                break;
            }
            stats.iterations += 1;

            let scored = self.score_batch(batch, solution);
            let base = solution.clone();
            let mut committed: Vec<Move> = Vec::new();

            for result in scored {
                let scored = result?;
                stats.evaluated_moves += scored.evaluated;
                let applied = match scored.candidate {
                    Some(info) => self.commit(info, &base, &mut committed, solution, &mut stats)?,
                    None => None,
                };
                selector.register_result(&scored.neighborhood, applied.as_ref());
            }

            if committed.is_empty() {
                continue;
            }
            stats.applied_moves += committed.len();
            value = criteria.value(problem, solution);
            debug!(
                "descent iteration {}: {} moves applied, value {:.6}",
                stats.iterations,
                committed.len(),
                value
            );
            if best.map_or(true, |b| value < b - IMPROVEMENT_EPSILON)
                && criteria.is_feasible(problem, solution)
            {
                best = Some(value);
                events.emit(SolverEvent::BestSolutionFound {
                    value,
                    solution: Arc::new(solution.clone()),
                });
            }
        }

        stats.final_value = value;
        Ok(stats)
    }

    /// Up to `batch_size` neighbourhoods; the flag tells whether the selector
    /// is exhausted.
    fn collect_batch(
        &self,
        selector: &mut dyn NeighborhoodSelector,
        solution: &Solution,
    ) -> (Vec<Neighborhood>, bool) {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while batch.len() < self.config.batch_size {
            match selector.select_neighborhood(self.problem, solution, self.criteria) {
                Selection::Neighborhood(n) => batch.push(n),
                // Every result is registered within its iteration, so a
                // stall with an empty batch cannot resolve itself.
                Selection::Stalled => return (batch, true),
                Selection::Exhausted => return (batch, true),
            }
        }
        (batch, false)
    }

    fn score_batch(&self, batch: Vec<Neighborhood>, solution: &Solution) -> Vec<Result<Scored>> {
        if self.config.parallel && batch.len() > 1 {
            batch
                .into_par_iter()
                .map(|n| self.score(n, solution))
                .collect()
        } else {
            batch.into_iter().map(|n| self.score(n, solution)).collect()
        }
    }

    /// Initialise `neighborhood` on `solution` and pick its move.
    fn score(&self, mut neighborhood: Neighborhood, solution: &Solution) -> Result<Scored> {
        neighborhood.init(solution);
        let mut candidate: Option<MoveInfo> = None;
        let mut evaluated = 0;

        for mv in neighborhood.moves_mut() {
            let info = self.criteria.evaluate(self.problem, solution, mv)?;
            evaluated += 1;
            if !info.is_acceptable() {
                continue;
            }
            if candidate
                .as_ref()
                .map_or(true, |best| info.delta_value < best.delta_value)
            {
                candidate = Some(info);
            }
            if self.config.policy == ImprovementPolicy::FirstImprovement {
                break;
            }
        }

        Ok(Scored {
            neighborhood,
            candidate,
            evaluated,
        })
    }

    /// Apply `info` unless it conflicts with the moves already committed in
    /// this iteration or stopped improving once they were applied.
    fn commit(
        &self,
        info: MoveInfo,
        base: &Solution,
        committed: &mut Vec<Move>,
        solution: &mut Solution,
        stats: &mut DescentStatistics,
    ) -> Result<Option<MoveInfo>> {
        if !self.rule.is_independent(base, committed, &info.mv) {
            trace!("dropping dependent move {}", info.mv);
            stats.dependent_moves += 1;
            return Ok(None);
        }

        let info = if committed.is_empty() {
            info
        } else {
            let mut mv = info.mv;
            for other in committed.iter() {
                match self.rule.update(base, &mv, other) {
                    Some(update) => update.apply(&mut mv),
                    None => {
                        stats.dependent_moves += 1;
                        return Ok(None);
                    }
                }
            }
            stats.rescored_moves += 1;
            self.criteria.evaluate(self.problem, solution, &mut mv)?
        };

        if !info.is_acceptable() {
            return Ok(None);
        }
        trace!("applying {} ({:+.6})", info.mv, info.delta_value);
        info.mv.apply(solution)?;
        committed.push(info.mv.clone());
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RadialLoadFlow;
    use crate::network::{Line, Network, Node};
    use crate::problem::{Period, PeriodData};
    use crate::stop::NeverStop;
    use super::selector::SequentialSelector;

    /// Provider 0 with a long branch 0-1-2-3-4 and a tie 4-0 open; all load
    /// sits at the end of the branch.
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
        let lines = vec![
            Line::switch(0, 0, 1, 1.0, false),
            Line::switch(1, 1, 2, 1.0, false),
            Line::switch(2, 2, 3, 1.0, false),
            Line::switch(3, 3, 4, 1.0, false),
            Line::switch(4, 4, 0, 1.0, true),
        ];
        let network = Network::new(nodes, lines).unwrap();
        Problem::new(
            "branch",
            network,
            vec![PeriodData::new("h0", vec![0.0, 0.1, 0.1, 1.0, 1.0])],
        )
        .unwrap()
    }

    fn run(policy: ImprovementPolicy, parallel: bool) -> (Solution, DescentStatistics) {
        let problem = problem();
        let criteria = Criteria::new()
            .with_objective(
                crate::criteria::LossObjective::new(Arc::new(RadialLoadFlow::default())),
                1.0,
            )
            .with_constraint(crate::criteria::RadialityConstraint);
        let mut solution = Solution::initial(&problem);
        let mut selector = SequentialSelector::new(Neighborhood::all(&problem, &[Period(0)], false));
        let config = DescentConfig {
            policy,
            batch_size: 2,
            parallel,
        };
        let stats = Descent::new(&problem, &criteria, config)
            .run(&mut solution, &mut selector, &NeverStop, &EventHub::new())
            .unwrap();
        (solution, stats)
    }

    #[test]
    fn test_descent_reaches_local_optimum() {
        let (solution, stats) = run(ImprovementPolicy::BestImprovement, false);
        assert!(stats.reached_local_optimum);
        assert!(stats.applied_moves >= 1);
        // The heavy buses are fed from the tie after the descent.
        assert!(solution.configuration(Period(0)).is_open(2));
        assert!(solution.is_radial() && solution.is_connected());
    }

    #[test]
    fn test_policies_agree_on_this_feeder() {
        let (best, _) = run(ImprovementPolicy::BestImprovement, true);
        let (first, _) = run(ImprovementPolicy::FirstImprovement, true);
        assert!(best.is_radial() && first.is_radial());
        assert_eq!(
            best.configuration(Period(0)).open_switches(),
            first.configuration(Period(0)).open_switches()
        );
    }
}
