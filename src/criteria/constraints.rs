//! Built-in constraints.

use super::Constraint;
use crate::configuration::NetworkConfiguration;
use crate::flow::FlowProvider;
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use itertools::Itertools;
use std::sync::Arc;

/// Every period is a forest with one provider per tree and every bus supplied.
#[derive(Debug, Clone, Copy)]
pub struct RadialityConstraint;

impl Constraint for RadialityConstraint {
    fn name(&self) -> &str {
        "Radiality"
    }

    fn is_satisfied_in(
        &self,
        _problem: &Problem,
        _solution: &Solution,
        _period: Period,
        config: &NetworkConfiguration,
    ) -> bool {
        config.is_radial() && config.is_connected()
    }

    fn reason(&self, problem: &Problem, solution: &Solution) -> String {
        problem
            .periods()
            .filter_map(|p| {
                let config = solution.configuration(p);
                let cycles = config.chords().count();
                let unsupplied = config.disconnected_nodes();
                let mut parts = Vec::new();
                if cycles > 0 {
                    parts.push(format!("{} closed cycle(s)", cycles));
                }
                if !unsupplied.is_empty() {
                    parts.push(format!(
                        "buses [{}] not supplied",
                        unsupplied.iter().join(", ")
                    ));
                }
                (!parts.is_empty()).then(|| format!("period {}: {}", p, parts.join(", ")))
            })
            .join("; ")
    }
}

/// Line flows stay within their thermal capacity.
#[derive(Clone)]
pub struct LineCapacityConstraint {
    provider: Arc<dyn FlowProvider>,
}

impl LineCapacityConstraint {
    pub fn new(provider: Arc<dyn FlowProvider>) -> Self {
        LineCapacityConstraint { provider }
    }

    fn overloaded(
        &self,
        problem: &Problem,
        period: Period,
        config: &NetworkConfiguration,
    ) -> Vec<(usize, f64, f64)> {
        let flow = self.provider.compute_power_flow(problem, period, config);
        problem
            .network
            .lines
            .iter()
            .filter_map(|line| {
                let capacity = line.capacity?;
                let carried = flow.flow(line.id).abs();
                (carried > capacity + 1e-9).then_some((line.id, carried, capacity))
            })
            .collect()
    }
}

impl Constraint for LineCapacityConstraint {
    fn name(&self) -> &str {
        "LineCapacity"
    }

    fn is_satisfied_in(
        &self,
        problem: &Problem,
        _solution: &Solution,
        period: Period,
        config: &NetworkConfiguration,
    ) -> bool {
        self.overloaded(problem, period, config).is_empty()
    }

    fn reason(&self, problem: &Problem, solution: &Solution) -> String {
        problem
            .periods()
            .flat_map(|p| {
                self.overloaded(problem, p, solution.configuration(p))
                    .into_iter()
                    .map(move |(line, carried, capacity)| {
                        format!(
                            "period {}: line {} carries {:.3} > {:.3}",
                            p, line, carried, capacity
                        )
                    })
            })
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RadialLoadFlow;
    use crate::network::{Line, Network, Node};
    use crate::problem::PeriodData;

    fn problem() -> Problem {
        let network = Network::new(
            vec![
                Node::provider(0, "P"),
                Node::consumer(1, "A"),
                Node::consumer(2, "B"),
            ],
            vec![
                Line::switch(0, 0, 1, 0.1, false).with_capacity(1.5),
                Line::switch(1, 1, 2, 0.1, false),
                Line::switch(2, 2, 0, 0.1, true),
            ],
        )
        .unwrap();
        Problem::new(
            "triangle",
            network,
            vec![PeriodData::new("h0", vec![0.0, 1.0, 1.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_line_capacity() {
        let problem = problem();
        let constraint = LineCapacityConstraint::new(Arc::new(RadialLoadFlow::default()));

        let overloaded = Solution::initial(&problem);
        assert!(!constraint.is_satisfied(&problem, &overloaded));
        assert!(constraint
            .reason(&problem, &overloaded)
            .contains("line 0 carries 2.000 > 1.500"));

        let split = Solution::from_open_flags(&problem, vec![vec![false, true, false]]);
        assert!(constraint.is_satisfied(&problem, &split));
    }

    #[test]
    fn test_radiality_reason() {
        let problem = problem();
        let meshed = Solution::from_open_flags(&problem, vec![vec![false, false, false]]);
        assert!(!RadialityConstraint.is_satisfied(&problem, &meshed));
        assert_eq!(
            RadialityConstraint.reason(&problem, &meshed),
            "period t0: 1 closed cycle(s)"
        );
    }
}
