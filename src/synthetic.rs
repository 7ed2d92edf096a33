//! Synthetic feeders for the command line, tests and benchmarks.

use crate::error::{ReconfigError, Result};
use crate::network::{Line, LineId, Network, Node, NodeId};
use crate::problem::{PeriodData, Problem};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::f64::consts::PI;

/// Outages per hour and ohm; longer lines fail more often.
const FAILURES_PER_OHM: f64 = 0.02;

/// A ring `0 - 1 - ... - n-1 - 0` where line `i` joins bus `i` and bus
/// `i + 1`. Every line is a switch; `open_lines` start open.
pub fn ring(
    node_count: usize,
    providers: &[NodeId],
    open_lines: &[LineId],
    demands: Vec<Vec<f64>>,
) -> Result<Problem> {
    if node_count < 3 {
        return Err(ReconfigError::InvalidNetwork(format!(
            "a ring needs at least 3 buses, got {}",
            node_count
        )));
    }
    let nodes = (0..node_count)
        .map(|i| {
            if providers.contains(&i) {
                Node::provider(i, format!("P{}", i))
            } else {
                Node::consumer(i, format!("B{}", i))
            }
        })
        .collect();
    let lines = (0..node_count)
        .map(|i| {
            let resistance = 0.1 + 0.05 * (i % 3) as f64;
            Line::switch(i, i, (i + 1) % node_count, resistance, open_lines.contains(&i))
        })
        .collect();
    let network = Network::new(nodes, lines)?;
    let periods = demands
        .into_iter()
        .enumerate()
        .map(|(p, d)| PeriodData::new(format!("h{}", p), d))
        .collect();
    Problem::new(format!("ring-{}", node_count), network, periods)
}

/// Random meshed distribution grid: one radial tree per feeder, cross-linked
/// by open tie switches.
#[derive(Debug, Clone)]
pub struct FeederGenerator {
    feeders: usize,
    buses_per_feeder: usize,
    ties: usize,
    periods: usize,
    seed: u64,
}

impl FeederGenerator {
    pub fn new(feeders: usize, buses_per_feeder: usize) -> Self {
        FeederGenerator {
            feeders,
            buses_per_feeder,
            ties: feeders * 2,
            periods: 1,
            seed: 42,
        }
    }

    pub fn with_ties(mut self, ties: usize) -> Self {
        self.ties = ties;
        self
    }

    pub fn with_periods(mut self, periods: usize) -> Self {
        self.periods = periods;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn generate(&self) -> Result<Problem> {
        if self.feeders == 0 || self.buses_per_feeder == 0 || self.periods == 0 {
            return Err(ReconfigError::InvalidNetwork(
                "feeders, buses per feeder and periods must be positive".to_string(),
            ));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let stride = self.buses_per_feeder + 1;
        let node_count = self.feeders * stride;

        let mut nodes = Vec::with_capacity(node_count);
        for f in 0..self.feeders {
            nodes.push(Node::provider(f * stride, format!("SUB{}", f)));
            for b in 1..stride {
                nodes.push(Node::consumer(f * stride + b, format!("F{}B{}", f, b)));
            }
        }

        let base: Vec<f64> = (0..node_count)
            .map(|n| if n % stride == 0 { 0.0 } else { rng.gen_range(0.2..1.0) })
            .collect();
        let head_capacity = 2.0 * base.iter().sum::<f64>();

        let mut lines = Vec::new();
        let mut joined = HashSet::new();
        for f in 0..self.feeders {
            let provider = f * stride;
            for b in 1..stride {
                let bus = provider + b;
                // Attach to one of the few most recent buses to get long branches.
                let lowest = b.saturating_sub(3);
                let parent = provider + rng.gen_range(lowest..b);
                let resistance = rng.gen_range(0.05..0.3);
                let id = lines.len();
                let line = if parent == provider {
                    Line::fixed(id, parent, bus, resistance).with_capacity(head_capacity)
                } else {
                    Line::switch(id, parent, bus, resistance, false)
                };
                lines.push(line.with_failure_rate(FAILURES_PER_OHM * resistance));
                joined.insert((parent.min(bus), parent.max(bus)));
            }
        }

        let consumers: Vec<NodeId> = (0..node_count).filter(|n| n % stride != 0).collect();
        let mut tries = 0;
        let mut placed = 0;
        while placed < self.ties && tries < self.ties * 20 && consumers.len() > 1 {
            tries += 1;
            let a = consumers[rng.gen_range(0..consumers.len())];
            let b = consumers[rng.gen_range(0..consumers.len())];
            if a == b || !joined.insert((a.min(b), a.max(b))) {
                continue;
            }
            let id = lines.len();
            let resistance = rng.gen_range(0.1..0.4);
            lines.push(
                Line::switch(id, a, b, resistance, true)
                    .with_failure_rate(FAILURES_PER_OHM * resistance),
            );
            placed += 1;
        }

        let periods = (0..self.periods)
            .map(|p| {
                let phase = 2.0 * PI * p as f64 / self.periods as f64;
                let factor = 0.8 + 0.3 * phase.sin();
                let demands = base
                    .iter()
                    .map(|&d| d * factor * rng.gen_range(0.9..1.1))
                    .collect();
                PeriodData::new(format!("h{}", p), demands)
            })
            .collect();

        let network = Network::new(nodes, lines)?;
        Problem::new(
            format!("synthetic-{}x{}", self.feeders, self.buses_per_feeder),
            network,
            periods,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::Solution;

    #[test]
    fn test_generated_feeders_start_radial() {
        let problem = FeederGenerator::new(3, 10)
            .with_ties(5)
            .with_periods(4)
            .generate()
            .unwrap();
        assert_eq!(problem.network.node_count(), 33);
        assert_eq!(problem.network.providers().len(), 3);
        assert_eq!(problem.period_count(), 4);

        let solution = Solution::initial(&problem);
        assert!(solution.is_radial());
        assert!(solution.is_connected());
    }

    #[test]
    fn test_generation_is_reproducible() {
        let first = FeederGenerator::new(2, 6).with_seed(9).generate().unwrap();
        let second = FeederGenerator::new(2, 6).with_seed(9).generate().unwrap();
        assert_eq!(first.network.line_count(), second.network.line_count());
        assert_eq!(first.periods[0].demands, second.periods[0].demands);
    }

    #[test]
    fn test_ring_checks_demands() {
        assert!(ring(6, &[0, 3], &[1, 4], vec![vec![0.0; 6]]).is_ok());
        assert!(ring(6, &[0, 3], &[1, 4], vec![vec![0.0; 5]]).is_err());
        assert!(ring(2, &[0], &[], vec![vec![0.0; 2]]).is_err());
    }
}
