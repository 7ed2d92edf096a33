//! Feasibility construction: turning any switch state into a radial,
//! connected and feasible one.

use crate::config::{Config, ConstructorKind};
use crate::configuration::NetworkConfiguration;
use crate::criteria::Criteria;
use crate::network::{LineId, Network};
use crate::problem::Problem;
use crate::solution::Solution;
use crate::stop::StopCriterion;
use log::{debug, trace};
use petgraph::unionfind::UnionFind;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

pub trait FeasibilityConstructor: Send {
    /// A feasible solution derived from `initial`, or `None` if none was found
    /// before the attempts ran out or `stop` triggered.
    fn optimize(
        &mut self,
        problem: &Problem,
        initial: &Solution,
        criteria: &Criteria,
        stop: &dyn StopCriterion,
    ) -> Option<Solution>;
}

/// Order in which lines are offered to the spanning tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOrdering {
    Random,
    MinimumResistance,
}

impl From<ConstructorKind> for TreeOrdering {
    fn from(kind: ConstructorKind) -> Self {
        match kind {
            ConstructorKind::RandomSpanningTree => TreeOrdering::Random,
            ConstructorKind::MinimumResistanceTree => TreeOrdering::MinimumResistance,
        }
    }
}

/// Rebuilds infeasible periods as spanning trees.
///
/// Fixed lines go in first, then switches that are currently closed, then open
/// ones, so the rebuilt tree stays close to the state it starts from. All
/// providers are merged into one virtual root, which makes the result a
/// forest with one provider per tree.
#[derive(Debug, Clone)]
pub struct SpanningTreeConstructor {
    ordering: TreeOrdering,
    attempts: usize,
    rng: ChaCha8Rng,
}

impl SpanningTreeConstructor {
    pub fn new(ordering: TreeOrdering, seed: u64) -> Self {
        SpanningTreeConstructor {
            ordering,
            attempts: 20,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        SpanningTreeConstructor::new(config.constructor.into(), config.seed)
            .with_attempts(config.construction_attempts)
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    fn ordered(&mut self, network: &Network, mut lines: Vec<LineId>) -> Vec<LineId> {
        lines.shuffle(&mut self.rng);
        if self.ordering == TreeOrdering::MinimumResistance {
            lines.sort_by(|&a, &b| {
                network
                    .line(a)
                    .resistance
                    .total_cmp(&network.line(b).resistance)
            });
        }
        lines
    }

    /// A spanning forest of `network` that keeps as many of the closed
    /// switches of `config` as possible.
    pub fn spanning_tree(&mut self, config: &NetworkConfiguration) -> NetworkConfiguration {
        let network = Arc::clone(config.network());
        let (fixed, switches): (Vec<LineId>, Vec<LineId>) =
            (0..network.line_count()).partition(|&l| !network.is_switchable(l));
        let (closed, open): (Vec<LineId>, Vec<LineId>) =
            switches.into_iter().partition(|&l| !config.is_open(l));

        let root = network.node_count();
        let mut forest = UnionFind::<usize>::new(root + 1);
        for &provider in network.providers() {
            forest.union(provider, root);
        }

        let mut open_flags: Vec<bool> = (0..network.line_count())
            .map(|l| network.is_switchable(l))
            .collect();
        let closed = self.ordered(&network, closed);
        let open = self.ordered(&network, open);
        for line in fixed.into_iter().chain(closed).chain(open) {
            let l = network.line(line);
            if forest.union(l.from, l.to) {
                open_flags[line] = false;
            } else if !network.is_switchable(line) {
                trace!("fixed line {} closes a cycle", line);
            }
        }

        NetworkConfiguration::new(network, open_flags)
    }
}

impl FeasibilityConstructor for SpanningTreeConstructor {
    fn optimize(
        &mut self,
        problem: &Problem,
        initial: &Solution,
        criteria: &Criteria,
        stop: &dyn StopCriterion,
    ) -> Option<Solution> {
        let mut solution = initial.clone();
        for attempt in 0..self.attempts {
            if attempt > 0 && stop.is_triggered() {
                break;
            }
            let mut repaired_all = true;
            for period in problem.periods() {
                let current = solution.configuration(period);
                if criteria.is_period_feasible(problem, &solution, period, current) {
                    continue;
                }
                let rebuilt = self.spanning_tree(current);
                if criteria.is_period_feasible(problem, &solution, period, &rebuilt) {
                    solution.set_configuration(period, rebuilt);
                } else {
                    repaired_all = false;
                }
            }
            if repaired_all && criteria.is_feasible(problem, &solution) {
                debug!("feasible solution built in {} attempt(s)", attempt + 1);
                return Some(solution);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::RadialityConstraint;
    use crate::network::{Line, Node};
    use crate::problem::{Period, PeriodData};
    use crate::stop::NeverStop;

    /// Two providers 0 and 3 on a ring of six buses.
    fn ring() -> Problem {
        let nodes = (0..6)
            .map(|i| {
                if i % 3 == 0 {
                    Node::provider(i, format!("P{}", i))
                } else {
                    Node::consumer(i, format!("N{}", i))
                }
            })
            .collect();
        let lines = (0..6)
            .map(|i| Line::switch(i, i, (i + 1) % 6, 0.1 * (i + 1) as f64, i == 1))
            .collect();
        let network = Network::new(nodes, lines).unwrap();
        Problem::new("ring", network, vec![PeriodData::new("h0", vec![1.0; 6])]).unwrap()
    }

    #[test]
    fn test_meshed_start_is_repaired() {
        let problem = ring();
        let criteria = Criteria::new().with_constraint(RadialityConstraint);
        let meshed = Solution::from_open_flags(&problem, vec![vec![false; 6]]);
        assert!(!criteria.is_feasible(&problem, &meshed));

        let mut constructor = SpanningTreeConstructor::new(TreeOrdering::Random, 3);
        let repaired = constructor
            .optimize(&problem, &meshed, &criteria, &NeverStop)
            .unwrap();
        assert!(criteria.is_feasible(&problem, &repaired));
        assert_eq!(repaired.configuration(Period(0)).open_switches().len(), 2);
    }

    #[test]
    fn test_feasible_periods_are_kept() {
        let problem = ring();
        let criteria = Criteria::new().with_constraint(RadialityConstraint);
        let radial = Solution::from_open_flags(
            &problem,
            vec![vec![false, true, false, false, true, false]],
        );
        let mut constructor = SpanningTreeConstructor::new(TreeOrdering::Random, 3);
        let kept = constructor
            .optimize(&problem, &radial, &criteria, &NeverStop)
            .unwrap();
        assert_eq!(kept.configuration(Period(0)).open_switches(), vec![1, 4]);
    }

    #[test]
    fn test_minimum_resistance_prefers_cheap_lines() {
        let problem = ring();
        let all_open = NetworkConfiguration::new(Arc::clone(&problem.network), vec![true; 6]);
        let mut constructor = SpanningTreeConstructor::new(TreeOrdering::MinimumResistance, 1);
        let tree = constructor.spanning_tree(&all_open);
        // 2-3 would join the two providers; 5-0 is the most resistive line left.
        assert!(tree.is_radial() && tree.is_connected());
        assert_eq!(tree.open_switches(), vec![2, 5]);
    }
}
