//! Power flow capability consumed by the objectives and constraints.
//!
//! The engine only needs line flows and losses for a radial configuration and
//! the change a move causes to them. Real solvers plug in through
//! [`FlowProvider`]; [`RadialLoadFlow`] is a lossless backward sweep that sums
//! demands up the tree and prices losses as `r * f^2 / v^2`.

use crate::configuration::NetworkConfiguration;
use crate::error::Result;
use crate::local_search::moves::{Move, SwapSwitchStatusMove};
use crate::network::LineId;
use crate::problem::{Period, Problem};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_PROVIDER_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of a flow provider, used to key the flow-delta caches on moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(pub u32);

impl ProviderId {
    /// A process-wide unique id.
    pub fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Flows and losses of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlow {
    /// Power carried by each line, zero for open lines and chords.
    pub line_flows: Vec<f64>,
    pub line_losses: Vec<f64>,
    /// Demand fed through each bus, including its own.
    pub subtree_loads: Vec<f64>,
}

impl PowerFlow {
    pub fn total_loss(&self) -> f64 {
        self.line_losses.iter().sum()
    }

    pub fn flow(&self, line: LineId) -> f64 {
        self.line_flows[line]
    }
}

/// Effect of a move on the flows of its period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerFlowDelta {
    /// New flow of every line whose flow changes.
    pub changed_flows: Vec<(LineId, f64)>,
    pub loss_delta: f64,
}

/// A power flow solver.
pub trait FlowProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn compute_power_flow(
        &self,
        problem: &Problem,
        period: Period,
        config: &NetworkConfiguration,
    ) -> PowerFlow;

    /// Flow change caused by `mv` on `config`. Defaults to solving before and
    /// after the move.
    fn compute_power_flow_delta(
        &self,
        problem: &Problem,
        config: &NetworkConfiguration,
        mv: &Move,
    ) -> Result<PowerFlowDelta> {
        diff_power_flow(self, problem, config, mv)
    }
}

/// Solve `config` with and without `mv` applied and report the difference.
pub fn diff_power_flow<P: FlowProvider + ?Sized>(
    provider: &P,
    problem: &Problem,
    config: &NetworkConfiguration,
    mv: &Move,
) -> Result<PowerFlowDelta> {
    let period = mv.period();
    let before = provider.compute_power_flow(problem, period, config);

    let mut moved = config.clone();
    mv.apply_to(&mut moved)?;
    let after = provider.compute_power_flow(problem, period, &moved);

    let changed_flows = (0..before.line_flows.len())
        .filter(|&l| (after.line_flows[l] - before.line_flows[l]).abs() > 1e-9)
        .map(|l| (l, after.line_flows[l]))
        .collect();

    Ok(PowerFlowDelta {
        changed_flows,
        loss_delta: after.total_loss() - before.total_loss(),
    })
}

/// Load summation flow for radial networks.
#[derive(Debug, Clone)]
pub struct RadialLoadFlow {
    id: ProviderId,
    /// Nominal voltage used to turn power into current.
    pub voltage: f64,
}

impl Default for RadialLoadFlow {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RadialLoadFlow {
    pub fn new(voltage: f64) -> Self {
        RadialLoadFlow {
            id: ProviderId::next(),
            voltage,
        }
    }

    fn line_loss(&self, problem: &Problem, line: LineId, flow: f64) -> f64 {
        let r = problem.network.line(line).resistance;
        r * flow * flow / (self.voltage * self.voltage)
    }

    /// Delta of a swap computed from the re-hung subtree only.
    ///
    /// Opening the switch detaches the subtree below it, closing the other
    /// switch hangs it back from a new entry bus. Flows change on the old and
    /// new supply paths and on the reversed path inside the subtree.
    fn swap_delta(
        &self,
        problem: &Problem,
        config: &NetworkConfiguration,
        mv: &SwapSwitchStatusMove,
    ) -> Option<PowerFlowDelta> {
        let (child, entry, anchor) = mv.rehang_points(config)?;
        if !config.is_supplied(child) || !config.is_supplied(anchor) {
            return None;
        }

        let base = self.compute_power_flow(problem, mv.period(), config);
        let moved = base.subtree_loads[child];

        let mut shift: BTreeMap<LineId, f64> = BTreeMap::new();
        for line in config.path_to_top(child).into_iter().skip(1) {
            *shift.entry(line).or_insert(0.0) -= moved;
        }
        for line in config.path_to_top(anchor) {
            *shift.entry(line).or_insert(0.0) += moved;
        }

        let mut new_flows: BTreeMap<LineId, f64> = shift
            .into_iter()
            .filter(|(_, d)| d.abs() > 1e-12)
            .map(|(line, d)| (line, base.line_flows[line] + d))
            .collect();
        new_flows.insert(mv.switch_to_open(), 0.0);

        let mut node = entry;
        let mut below = None;
        loop {
            let line = mv.new_upstream_line(config, node)?;
            let carried = match below {
                None => moved,
                Some(b) => moved - base.subtree_loads[b],
            };
            new_flows.insert(line, carried);
            if node == child {
                break;
            }
            below = Some(node);
            node = config.parent(node)?;
        }

        let loss_delta = new_flows
            .iter()
            .map(|(&line, &flow)| {
                self.line_loss(problem, line, flow) - self.line_loss(problem, line, base.flow(line))
            })
            .sum();

        Some(PowerFlowDelta {
            changed_flows: new_flows.into_iter().collect(),
            loss_delta,
        })
    }
}

impl FlowProvider for RadialLoadFlow {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn compute_power_flow(
        &self,
        problem: &Problem,
        period: Period,
        config: &NetworkConfiguration,
    ) -> PowerFlow {
        let network = config.network();
        let n = network.node_count();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&node| std::cmp::Reverse(config.depth(node)));

        let mut subtree_loads: Vec<f64> = (0..n).map(|node| problem.demand(period, node)).collect();
        let mut line_flows = vec![0.0; network.line_count()];
        for &node in &order {
            if let (Some(parent), Some(line)) = (config.parent(node), config.upstream_line(node)) {
                subtree_loads[parent] += subtree_loads[node];
                if config.is_supplied(node) {
                    line_flows[line] = subtree_loads[node];
                }
            }
        }

        let line_losses = line_flows
            .iter()
            .enumerate()
            .map(|(line, &flow)| self.line_loss(problem, line, flow))
            .collect();

        PowerFlow {
            line_flows,
            line_losses,
            subtree_loads,
        }
    }

    fn compute_power_flow_delta(
        &self,
        problem: &Problem,
        config: &NetworkConfiguration,
        mv: &Move,
    ) -> Result<PowerFlowDelta> {
        if let Move::Swap(swap) = mv {
            if config.is_radial() {
                if let Some(delta) = self.swap_delta(problem, config, swap) {
                    return Ok(delta);
                }
            }
        }
        diff_power_flow(self, problem, config, mv)
    }
}
