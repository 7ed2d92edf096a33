//! Switching moves.
//!
//! A move is a reversible edit of one period's configuration: a set of closed
//! switches to open and a set of open switches to close. Moves validate their
//! preconditions when built and again when replayed, and carry a cache of the
//! flow changes they cause, keyed by the provider that computed them.

use crate::configuration::NetworkConfiguration;
use crate::error::{InvalidMoveError, Result};
use crate::flow::{FlowProvider, PowerFlowDelta, ProviderId};
use crate::network::{LineId, NodeId};
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;

/// Moves with a delta below this value are improving.
pub const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Flow deltas computed for a move, one entry per flow provider.
#[derive(Debug, Clone, Default)]
pub struct FlowDeltaCache {
    entries: HashMap<ProviderId, PowerFlowDelta>,
}

impl FlowDeltaCache {
    pub fn get(&self, provider: ProviderId) -> Option<&PowerFlowDelta> {
        self.entries.get(&provider)
    }

    pub fn insert(&mut self, provider: ProviderId, delta: PowerFlowDelta) {
        self.entries.insert(provider, delta);
    }

    /// Drop every entry; the topology under the move has changed.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_preconditions(
    config: &NetworkConfiguration,
    to_open: &[LineId],
    to_close: &[LineId],
) -> std::result::Result<(), InvalidMoveError> {
    if let Some(&line) = to_open.iter().chain(to_close).duplicates().next() {
        return Err(InvalidMoveError::DuplicateSwitch(line));
    }

    let network = config.network();
    for &line in to_open.iter().chain(to_close) {
        if line >= network.line_count() {
            return Err(InvalidMoveError::UnknownLine(line));
        }
        if !network.is_switchable(line) {
            return Err(InvalidMoveError::NotSwitchable(line));
        }
    }
    if let Some(&line) = to_open.iter().find(|&&l| config.is_open(l)) {
        return Err(InvalidMoveError::AlreadyOpen(line));
    }
    if let Some(&line) = to_close.iter().find(|&&l| !config.is_open(l)) {
        return Err(InvalidMoveError::AlreadyClosed(line));
    }
    Ok(())
}

/// Closes first so that nothing is disconnected in between, then opens.
fn replay(config: &mut NetworkConfiguration, to_open: &[LineId], to_close: &[LineId]) -> Result<()> {
    check_preconditions(config, to_open, to_close)?;
    for &line in to_close {
        config.set_switch(line, false)?;
    }
    for &line in to_open {
        config.set_switch(line, true)?;
    }
    Ok(())
}

/// Open a set of closed switches and close a set of open switches.
#[derive(Debug, Clone)]
pub struct ChangeSwitchesMove {
    period: Period,
    to_open: Vec<LineId>,
    to_close: Vec<LineId>,
    flow_deltas: FlowDeltaCache,
}

impl ChangeSwitchesMove {
    pub fn new(
        config: &NetworkConfiguration,
        period: Period,
        to_open: Vec<LineId>,
        to_close: Vec<LineId>,
    ) -> std::result::Result<Self, InvalidMoveError> {
        check_preconditions(config, &to_open, &to_close)?;
        Ok(ChangeSwitchesMove {
            period,
            to_open,
            to_close,
            flow_deltas: FlowDeltaCache::default(),
        })
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn switches_to_open(&self) -> &[LineId] {
        &self.to_open
    }

    pub fn switches_to_close(&self) -> &[LineId] {
        &self.to_close
    }

    pub fn apply_to(&self, config: &mut NetworkConfiguration) -> Result<()> {
        replay(config, &self.to_open, &self.to_close)
    }

    pub fn reverse(&self) -> Self {
        ChangeSwitchesMove {
            period: self.period,
            to_open: self.to_close.clone(),
            to_close: self.to_open.clone(),
            flow_deltas: FlowDeltaCache::default(),
        }
    }
}

impl PartialEq for ChangeSwitchesMove {
    fn eq(&self, other: &Self) -> bool {
        self.period == other.period
            && self.to_open.iter().sorted().eq(other.to_open.iter().sorted())
            && self.to_close.iter().sorted().eq(other.to_close.iter().sorted())
    }
}

/// Open exactly one switch and close exactly one other.
#[derive(Debug, Clone)]
pub struct SwapSwitchStatusMove {
    period: Period,
    open: LineId,
    close: LineId,
    flow_deltas: FlowDeltaCache,
}

impl SwapSwitchStatusMove {
    pub fn new(
        config: &NetworkConfiguration,
        period: Period,
        switch_to_open: LineId,
        switch_to_close: LineId,
    ) -> std::result::Result<Self, InvalidMoveError> {
        check_preconditions(config, &[switch_to_open], &[switch_to_close])?;
        Ok(SwapSwitchStatusMove {
            period,
            open: switch_to_open,
            close: switch_to_close,
            flow_deltas: FlowDeltaCache::default(),
        })
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn switch_to_open(&self) -> LineId {
        self.open
    }

    pub fn switch_to_close(&self) -> LineId {
        self.close
    }

    pub fn apply_to(&self, config: &mut NetworkConfiguration) -> Result<()> {
        replay(config, &[self.open], &[self.close])
    }

    pub fn reverse(&self) -> Self {
        SwapSwitchStatusMove {
            period: self.period,
            open: self.close,
            close: self.open,
            flow_deltas: FlowDeltaCache::default(),
        }
    }

    /// The same switch pair in another period.
    pub fn in_period(&self, period: Period) -> Self {
        SwapSwitchStatusMove {
            period,
            open: self.open,
            close: self.close,
            flow_deltas: FlowDeltaCache::default(),
        }
    }

    /// Where the subtree below the opened switch gets re-hung: returns the
    /// bus below the opened switch, the end of the closing switch inside that
    /// subtree and the end outside it. `None` unless exactly one end of the
    /// closing switch lies in the subtree.
    pub fn rehang_points(&self, config: &NetworkConfiguration) -> Option<(NodeId, NodeId, NodeId)> {
        let child = config.child_end(self.open)?;
        let line = config.network().line(self.close);
        let from_inside = config.is_ancestor_or_same(child, line.from);
        let to_inside = config.is_ancestor_or_same(child, line.to);
        match (from_inside, to_inside) {
            (true, false) => Some((child, line.from, line.to)),
            (false, true) => Some((child, line.to, line.from)),
            _ => None,
        }
    }

    /// Upstream line of `node` once the move is applied, predicted from the
    /// current forest.
    ///
    /// Buses on the path from the entry point up to the opened switch reverse
    /// direction and now hang from the line toward the entry point; the entry
    /// point itself hangs from the closed switch. Everything else keeps its
    /// upstream line.
    pub fn new_upstream_line(&self, config: &NetworkConfiguration, node: NodeId) -> Option<LineId> {
        let Some((child, entry, _)) = self.rehang_points(config) else {
            return config.upstream_line(node);
        };
        if node == entry {
            Some(self.close)
        } else if config.is_ancestor_or_same(child, node) && config.is_ancestor(node, entry) {
            config.downstream_line_toward(node, entry)
        } else {
            config.upstream_line(node)
        }
    }

    /// Open switch currently closed, close switch currently open, and the
    /// opened switch lies on the cycle the closing switch would form.
    pub fn is_structurally_valid(&self, config: &NetworkConfiguration) -> bool {
        let network = config.network();
        if !network.is_switchable(self.open) || !network.is_switchable(self.close) {
            return false;
        }
        if config.is_open(self.open) || !config.is_open(self.close) {
            return false;
        }
        config
            .find_cycle_with(self.close)
            .map_or(false, |cycle| cycle.lines().any(|l| l == self.open))
    }

    /// Whether every direction-constrained line keeps its required upstream
    /// end after the move.
    pub fn respects_transformer_direction(&self, config: &NetworkConfiguration) -> bool {
        let Some((child, entry, anchor)) = self.rehang_points(config) else {
            return true;
        };
        let network = config.network();

        let closing = network.line(self.close);
        if closing.upstream_end.map_or(false, |end| end != anchor) {
            return false;
        }

        let mut node = entry;
        while node != child {
            let (Some(line), Some(parent)) = (config.upstream_line(node), config.parent(node))
            else {
                return false;
            };
            if network.line(line).upstream_end.map_or(false, |end| end != node) {
                return false;
            }
            node = parent;
        }
        true
    }
}

impl PartialEq for SwapSwitchStatusMove {
    fn eq(&self, other: &Self) -> bool {
        self.period == other.period && self.open == other.open && self.close == other.close
    }
}

/// A configuration edit of one period.
#[derive(Debug, Clone, PartialEq)]
pub enum Move {
    ChangeSwitches(ChangeSwitchesMove),
    Swap(SwapSwitchStatusMove),
}

impl Move {
    pub fn period(&self) -> Period {
        match self {
            Move::ChangeSwitches(m) => m.period(),
            Move::Swap(m) => m.period(),
        }
    }

    pub fn switches_to_open(&self) -> &[LineId] {
        match self {
            Move::ChangeSwitches(m) => m.switches_to_open(),
            Move::Swap(m) => std::slice::from_ref(&m.open),
        }
    }

    pub fn switches_to_close(&self) -> &[LineId] {
        match self {
            Move::ChangeSwitches(m) => m.switches_to_close(),
            Move::Swap(m) => std::slice::from_ref(&m.close),
        }
    }

    /// Every switch the move touches.
    pub fn switches(&self) -> impl Iterator<Item = LineId> + '_ {
        self.switches_to_open()
            .iter()
            .chain(self.switches_to_close())
            .copied()
    }

    /// Replay the edit on any configuration. Fails without touching the
    /// configuration if the preconditions do not hold there.
    pub fn apply_to(&self, config: &mut NetworkConfiguration) -> Result<()> {
        match self {
            Move::ChangeSwitches(m) => m.apply_to(config),
            Move::Swap(m) => m.apply_to(config),
        }
    }

    /// Apply the edit to the configuration of its period in `solution`.
    pub fn apply(&self, solution: &mut Solution) -> Result<()> {
        let period = self.period();
        let config = solution
            .get_mut(period)
            .ok_or(InvalidMoveError::UnknownPeriod(period.index()))?;
        self.apply_to(config)
    }

    pub fn reverse(&self) -> Move {
        match self {
            Move::ChangeSwitches(m) => Move::ChangeSwitches(m.reverse()),
            Move::Swap(m) => Move::Swap(m.reverse()),
        }
    }

    pub fn as_swap(&self) -> Option<&SwapSwitchStatusMove> {
        match self {
            Move::Swap(m) => Some(m),
            Move::ChangeSwitches(_) => None,
        }
    }

    fn flow_deltas(&self) -> &FlowDeltaCache {
        match self {
            Move::ChangeSwitches(m) => &m.flow_deltas,
            Move::Swap(m) => &m.flow_deltas,
        }
    }

    fn flow_deltas_mut(&mut self) -> &mut FlowDeltaCache {
        match self {
            Move::ChangeSwitches(m) => &mut m.flow_deltas,
            Move::Swap(m) => &mut m.flow_deltas,
        }
    }

    /// Flow change of this move, computed by `provider` on the current
    /// configuration of its period the first time it is asked for.
    pub fn power_flow_delta(
        &mut self,
        problem: &Problem,
        solution: &Solution,
        provider: &dyn FlowProvider,
    ) -> Result<&PowerFlowDelta> {
        let id = provider.id();
        if self.flow_deltas().get(id).is_none() {
            let period = self.period();
            let config = solution
                .get(period)
                .ok_or(InvalidMoveError::UnknownPeriod(period.index()))?;
            let delta = provider.compute_power_flow_delta(problem, config, self)?;
            self.flow_deltas_mut().insert(id, delta);
        }
        let period = self.period();
        self.flow_deltas()
            .get(id)
            .ok_or_else(|| InvalidMoveError::UnknownPeriod(period.index()).into())
    }

    pub fn cached_power_flow_delta(&self, provider: ProviderId) -> Option<&PowerFlowDelta> {
        self.flow_deltas().get(provider)
    }

    /// Forget all cached flow deltas.
    pub fn invalidate_power_flow_delta(&mut self) {
        self.flow_deltas_mut().invalidate();
    }
}

impl From<SwapSwitchStatusMove> for Move {
    fn from(m: SwapSwitchStatusMove) -> Self {
        Move::Swap(m)
    }
}

impl From<ChangeSwitchesMove> for Move {
    fn from(m: ChangeSwitchesMove) -> Self {
        Move::ChangeSwitches(m)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: open [{}] close [{}]",
            self.period(),
            self.switches_to_open().iter().join(", "),
            self.switches_to_close().iter().join(", ")
        )
    }
}

/// A scored move.
#[derive(Debug, Clone)]
pub struct MoveInfo {
    pub mv: Move,
    /// Change of the weighted objective; negative is better.
    pub delta_value: f64,
    pub is_feasible: bool,
}

impl MoveInfo {
    pub fn is_improving(&self) -> bool {
        self.delta_value < -IMPROVEMENT_EPSILON
    }

    /// Feasible and improving.
    pub fn is_acceptable(&self) -> bool {
        self.is_feasible && self.is_improving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Line, Network, Node};
    use std::sync::Arc;

    /// Provider 0 - 1 - 2 - 3 - 4 with tie 4-0 (line 4) open; line 5 is a
    /// direction-constrained transformer 2-5 hanging bus 5.
    fn feeder() -> Arc<Network> {
        let nodes = vec![
            Node::provider(0, "P"),
            Node::consumer(1, "A"),
            Node::consumer(2, "B"),
            Node::consumer(3, "C"),
            Node::consumer(4, "D"),
        ];
        let lines = vec![
            Line::switch(0, 0, 1, 0.1, false),
            Line::switch(1, 1, 2, 0.1, false),
            Line::switch(2, 2, 3, 0.1, false).with_upstream_end(2),
            Line::switch(3, 3, 4, 0.1, false),
            Line::switch(4, 4, 0, 0.1, true),
        ];
        Arc::new(Network::new(nodes, lines).unwrap())
    }

    #[test]
    fn test_preconditions() {
        let config = NetworkConfiguration::initial(feeder());
        assert_eq!(
            SwapSwitchStatusMove::new(&config, Period(0), 4, 1).unwrap_err(),
            InvalidMoveError::AlreadyOpen(4)
        );
        assert_eq!(
            SwapSwitchStatusMove::new(&config, Period(0), 1, 2).unwrap_err(),
            InvalidMoveError::AlreadyClosed(2)
        );
        assert_eq!(
            ChangeSwitchesMove::new(&config, Period(0), vec![1, 1], vec![4]).unwrap_err(),
            InvalidMoveError::DuplicateSwitch(1)
        );
        assert_eq!(
            ChangeSwitchesMove::new(&config, Period(0), vec![9], vec![]).unwrap_err(),
            InvalidMoveError::UnknownLine(9)
        );
    }

    #[test]
    fn test_apply_then_reverse_restores_state() {
        let mut config = NetworkConfiguration::initial(feeder());
        let original = config.open_flags().to_vec();
        let mv = Move::ChangeSwitches(
            ChangeSwitchesMove::new(&config, Period(0), vec![1], vec![4]).unwrap(),
        );
        mv.apply_to(&mut config).unwrap();
        assert!(config.is_radial() && config.is_connected());
        mv.reverse().apply_to(&mut config).unwrap();
        assert_eq!(config.open_flags(), original.as_slice());
        assert_eq!(mv.reverse().reverse(), mv);
    }

    #[test]
    fn test_failed_apply_leaves_config_untouched() {
        let config = NetworkConfiguration::initial(feeder());
        let mv = SwapSwitchStatusMove::new(&config, Period(0), 1, 4).unwrap();
        let mut other = config.clone();
        other.set_switch(1, true).unwrap();
        let before = other.open_flags().to_vec();
        assert!(mv.apply_to(&mut other).is_err());
        assert_eq!(other.open_flags(), before.as_slice());
    }

    #[test]
    fn test_new_upstream_line_prediction() {
        let config = NetworkConfiguration::initial(feeder());
        let swap = SwapSwitchStatusMove::new(&config, Period(0), 1, 4).unwrap();
        let mut applied = config.clone();
        swap.apply_to(&mut applied).unwrap();
        for node in 0..5 {
            assert_eq!(
                swap.new_upstream_line(&config, node),
                applied.upstream_line(node),
                "bus {}",
                node
            );
        }
    }

    #[test]
    fn test_structural_validity() {
        let config = NetworkConfiguration::initial(feeder());
        let swap = SwapSwitchStatusMove::new(&config, Period(0), 3, 4).unwrap();
        assert!(swap.is_structurally_valid(&config));
        assert!(swap.reverse().in_period(Period(1)) != swap);
    }

    #[test]
    fn test_transformer_direction() {
        let config = NetworkConfiguration::initial(feeder());
        // Re-feeding bus 3 from the tie keeps 2 upstream of line 2.
        let keeps = SwapSwitchStatusMove::new(&config, Period(0), 3, 4).unwrap();
        assert!(keeps.respects_transformer_direction(&config));
        // Re-feeding buses 2..4 from the tie would push power from 3 to 2.
        let reverses = SwapSwitchStatusMove::new(&config, Period(0), 1, 4).unwrap();
        assert!(!reverses.respects_transformer_direction(&config));
    }

    #[test]
    fn test_display() {
        let config = NetworkConfiguration::initial(feeder());
        let mv: Move = SwapSwitchStatusMove::new(&config, Period(0), 1, 4).unwrap().into();
        assert_eq!(mv.to_string(), "t0: open [1] close [4]");
    }
}
