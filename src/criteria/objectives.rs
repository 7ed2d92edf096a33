//! Built-in objective terms.

use super::Objective;
use crate::error::Result;
use crate::flow::FlowProvider;
use crate::local_search::moves::Move;
use crate::network::LineId;
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use std::sync::Arc;

/// Energy losses: per-period losses weighted by period duration.
#[derive(Clone)]
pub struct LossObjective {
    provider: Arc<dyn FlowProvider>,
}

impl LossObjective {
    pub fn new(provider: Arc<dyn FlowProvider>) -> Self {
        LossObjective { provider }
    }
}

impl Objective for LossObjective {
    fn name(&self) -> &str {
        "Losses"
    }

    fn value(&self, problem: &Problem, solution: &Solution) -> f64 {
        problem
            .periods()
            .map(|p| {
                let flow = self
                    .provider
                    .compute_power_flow(problem, p, solution.configuration(p));
                problem.period_data(p).duration * flow.total_loss()
            })
            .sum()
    }

    fn delta(&self, problem: &Problem, solution: &Solution, mv: &mut Move) -> Result<f64> {
        let duration = problem.period_data(mv.period()).duration;
        let delta = mv.power_flow_delta(problem, solution, self.provider.as_ref())?;
        Ok(duration * delta.loss_delta)
    }
}

/// Expected interrupted energy: every line carrying power cuts off the demand
/// it carries at its failure rate, weighted by period duration.
#[derive(Clone)]
pub struct ReliabilityObjective {
    provider: Arc<dyn FlowProvider>,
}

impl ReliabilityObjective {
    pub fn new(provider: Arc<dyn FlowProvider>) -> Self {
        ReliabilityObjective { provider }
    }
}

impl Objective for ReliabilityObjective {
    fn name(&self) -> &str {
        "Reliability"
    }

    fn value(&self, problem: &Problem, solution: &Solution) -> f64 {
        let network = &problem.network;
        problem
            .periods()
            .map(|p| {
                let flow = self
                    .provider
                    .compute_power_flow(problem, p, solution.configuration(p));
                let interrupted: f64 = network
                    .lines
                    .iter()
                    .map(|line| line.failure_rate * flow.flow(line.id))
                    .sum();
                problem.period_data(p).duration * interrupted
            })
            .sum()
    }

    fn delta(&self, problem: &Problem, solution: &Solution, mv: &mut Move) -> Result<f64> {
        let network = &problem.network;
        let period = mv.period();
        let delta = mv.power_flow_delta(problem, solution, self.provider.as_ref())?;
        if delta
            .changed_flows
            .iter()
            .all(|&(line, _)| network.line(line).failure_rate == 0.0)
        {
            return Ok(0.0);
        }

        let base = self
            .provider
            .compute_power_flow(problem, period, solution.configuration(period));
        let interrupted: f64 = delta
            .changed_flows
            .iter()
            .map(|&(line, flow)| network.line(line).failure_rate * (flow - base.flow(line)))
            .sum();
        Ok(problem.period_data(period).duration * interrupted)
    }
}

/// Cost of operating switches away from the field state in the first period.
#[derive(Debug, Clone, Copy)]
pub struct SwitchingCostObjective;

impl Objective for SwitchingCostObjective {
    fn name(&self) -> &str {
        "SwitchingCost"
    }

    fn value(&self, problem: &Problem, solution: &Solution) -> f64 {
        let network = &problem.network;
        let first = solution.configuration(Period(0));
        network
            .switchable_lines()
            .iter()
            .map(|&l| network.line(l))
            .filter(|line| first.is_open(line.id) != line.initially_open)
            .map(|line| line.switching_cost)
            .sum()
    }

    fn delta(&self, problem: &Problem, _solution: &Solution, mv: &mut Move) -> Result<f64> {
        if mv.period() != Period(0) {
            return Ok(0.0);
        }
        let network = &problem.network;
        let cost = |line: LineId, now_open: bool| {
            let l = network.line(line);
            if now_open == l.initially_open {
                -l.switching_cost
            } else {
                l.switching_cost
            }
        };
        let opened: f64 = mv.switches_to_open().iter().map(|&l| cost(l, true)).sum();
        let closed: f64 = mv.switches_to_close().iter().map(|&l| cost(l, false)).sum();
        Ok(opened + closed)
    }
}

/// Stability between adjacent periods: every switch that changes state from
/// one period to the next costs its switching cost.
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationChangeObjective;

impl Objective for ConfigurationChangeObjective {
    fn name(&self) -> &str {
        "ConfigurationChange"
    }

    fn value(&self, problem: &Problem, solution: &Solution) -> f64 {
        let network = &problem.network;
        solution
            .configurations()
            .windows(2)
            .flat_map(|pair| pair[0].switch_differences(&pair[1]))
            .map(|l| network.line(l).switching_cost)
            .sum()
    }

    fn delta(&self, problem: &Problem, solution: &Solution, mv: &mut Move) -> Result<f64> {
        let period = mv.period();
        let neighbours: Vec<Period> = problem
            .previous_period(period)
            .into_iter()
            .chain(problem.next_period(period))
            .collect();
        if neighbours.is_empty() {
            return Ok(0.0);
        }

        let network = &problem.network;
        let mut delta = 0.0;
        let switched = mv
            .switches_to_open()
            .iter()
            .map(|&l| (l, true))
            .chain(mv.switches_to_close().iter().map(|&l| (l, false)));
        for (line, now_open) in switched {
            let cost = network.line(line).switching_cost;
            for &q in &neighbours {
                let there = solution.configuration(q).is_open(line);
                let before = (!now_open != there) as u8 as f64;
                let after = (now_open != there) as u8 as f64;
                delta += cost * (after - before);
            }
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RadialLoadFlow;
    use crate::local_search::moves::SwapSwitchStatusMove;
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
                Line::switch(0, 0, 1, 0.1, false),
                Line::switch(1, 1, 2, 0.1, false).with_switching_cost(2.0),
                Line::switch(2, 2, 0, 0.1, true).with_switching_cost(3.0),
            ],
        )
        .unwrap();
        let periods = (0..3)
            .map(|i| PeriodData::new(format!("h{}", i), vec![0.0, 1.0, 1.0]))
            .collect();
        Problem::new("triangle", network, periods).unwrap()
    }

    #[test]
    fn test_reliability_delta_matches_value_difference() {
        let network = Network::new(
            vec![
                Node::provider(0, "P"),
                Node::consumer(1, "A"),
                Node::consumer(2, "B"),
                Node::consumer(3, "C"),
            ],
            vec![
                Line::switch(0, 0, 1, 0.1, false).with_failure_rate(0.5),
                Line::switch(1, 1, 2, 0.1, false).with_failure_rate(0.2),
                Line::switch(2, 2, 3, 0.1, false).with_failure_rate(1.0),
                Line::switch(3, 3, 0, 0.1, true).with_failure_rate(0.1),
            ],
        )
        .unwrap();
        let periods = vec![
            PeriodData::new("h0", vec![0.0, 1.0, 2.0, 3.0]),
            PeriodData::new("h1", vec![0.0, 2.0, 1.0, 1.0]).with_duration(2.0),
        ];
        let problem = Problem::new("square", network, periods).unwrap();
        let solution = Solution::initial(&problem);
        let objective = ReliabilityObjective::new(Arc::new(RadialLoadFlow::default()));

        // Flows 6, 5, 3 in h0 and 4, 2, 1 over two hours in h1.
        let expected = (0.5 * 6.0 + 0.2 * 5.0 + 3.0) + 2.0 * (0.5 * 4.0 + 0.2 * 2.0 + 1.0);
        assert!((objective.value(&problem, &solution) - expected).abs() < 1e-9);

        for period in [Period(0), Period(1)] {
            for open in [0, 1, 2] {
                let config = solution.configuration(period);
                let mut mv: Move = SwapSwitchStatusMove::new(config, period, open, 3)
                    .unwrap()
                    .into();
                let delta = objective.delta(&problem, &solution, &mut mv).unwrap();

                let mut applied = solution.clone();
                mv.apply(&mut applied).unwrap();
                let difference =
                    objective.value(&problem, &applied) - objective.value(&problem, &solution);
                assert!((delta - difference).abs() < 1e-9, "{}", mv);
            }
        }
    }

    #[test]
    fn test_switching_cost_only_counts_first_period() {
        let problem = problem();
        let solution = Solution::initial(&problem);
        let config = solution.configuration(Period(0));

        let mut first: Move = SwapSwitchStatusMove::new(config, Period(0), 1, 2).unwrap().into();
        let mut later: Move = SwapSwitchStatusMove::new(config, Period(2), 1, 2).unwrap().into();
        let objective = SwitchingCostObjective;
        assert_eq!(objective.delta(&problem, &solution, &mut first).unwrap(), 5.0);
        assert_eq!(objective.delta(&problem, &solution, &mut later).unwrap(), 0.0);
    }

    #[test]
    fn test_configuration_change_delta() {
        let problem = problem();
        let solution = Solution::initial(&problem);
        let config = solution.configuration(Period(1));
        let objective = ConfigurationChangeObjective;

        // Changing the middle period differs from both neighbours.
        let mut middle: Move = SwapSwitchStatusMove::new(config, Period(1), 1, 2).unwrap().into();
        assert_eq!(objective.delta(&problem, &solution, &mut middle).unwrap(), 10.0);

        let mut applied = solution.clone();
        middle.apply(&mut applied).unwrap();
        assert_eq!(objective.value(&problem, &applied), 10.0);

        // Undoing it in the changed solution removes the cost again.
        let mut undo = middle.reverse();
        assert_eq!(objective.delta(&problem, &applied, &mut undo).unwrap(), -10.0);
    }
}
