//! Move dependence rule.
//!
//! Decides whether a batch of moves of one period can be committed together
//! and still leave that period radial and connected. Opening a line splits the
//! forest into a component below it; closing a line merges the clusters of
//! components on its two ends. All providers sit in one implicit main
//! component. The batch is independent iff no merge closes a cycle and every
//! split-off component ends up attached to main again.
//!
//! Moves of different periods never interact.

use super::moves::Move;
use crate::configuration::NetworkConfiguration;
use crate::network::{LineId, NodeId};
use crate::solution::Solution;
use itertools::Itertools;
use petgraph::unionfind::UnionFind;
use std::collections::HashMap;

/// Index of a component in a [`ComponentSet`]. The main component is always 0.
pub type ComponentId = usize;

pub const MAIN_COMPONENT: ComponentId = 0;

/// A fragment of the forest bounded by opened lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Opened line above this component; `None` for main.
    pub upstream: Option<LineId>,
    /// Opened lines directly below this component.
    pub downstream: Vec<LineId>,
}

/// The forest of a radial configuration split at a set of opened lines.
#[derive(Debug, Clone)]
pub struct ComponentSet<'a> {
    config: &'a NetworkConfiguration,
    components: Vec<Component>,
    by_upstream: HashMap<LineId, ComponentId>,
}

#[allow(clippy::len_without_is_empty)]
impl<'a> ComponentSet<'a> {
    pub fn new(config: &'a NetworkConfiguration) -> Self {
        ComponentSet {
            config,
            components: vec![Component {
                upstream: None,
                downstream: Vec::new(),
            }],
            by_upstream: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id]
    }

    /// Component holding `node`: the one below the nearest opened line above
    /// it, or main.
    pub fn component_of(&self, node: NodeId) -> ComponentId {
        let mut node = node;
        loop {
            if let Some(id) = self
                .config
                .upstream_line(node)
                .and_then(|line| self.by_upstream.get(&line))
            {
                return *id;
            }
            match self.config.parent(node) {
                Some(parent) => node = parent,
                None => return MAIN_COMPONENT,
            }
        }
    }

    /// Open the forest line `line`, splitting its component in two. Returns
    /// the new lower component, or `None` if the line is not a forest line.
    pub fn split(&mut self, line: LineId) -> Option<ComponentId> {
        let child = self.config.child_end(line)?;
        let upper = self.config.parent(child)?;
        let outer = self.component_of(upper);

        let config = self.config;
        let (inside, outside): (Vec<LineId>, Vec<LineId>) = self.components[outer]
            .downstream
            .drain(..)
            .partition(|&d| {
                config
                    .child_end(d)
                    .map_or(false, |below| config.is_ancestor(child, below))
            });

        let id = self.components.len();
        self.components[outer].downstream = outside;
        self.components[outer].downstream.push(line);
        self.components.push(Component {
            upstream: Some(line),
            downstream: inside,
        });
        self.by_upstream.insert(line, id);
        Some(id)
    }
}

/// Outcome of merging two clusters over a closed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    AttachedToMain,
    Cycle,
}

/// Clusters of components joined by closed lines.
#[derive(Debug, Clone)]
pub struct ClusterSet {
    clusters: UnionFind<ComponentId>,
    contains_main: Vec<bool>,
}

impl ClusterSet {
    /// One cluster per component; only main's contains main.
    pub fn new(component_count: usize) -> Self {
        let mut contains_main = vec![false; component_count];
        if let Some(main) = contains_main.first_mut() {
            *main = true;
        }
        ClusterSet {
            clusters: UnionFind::new(component_count),
            contains_main,
        }
    }

    pub fn contains_main(&self, component: ComponentId) -> bool {
        self.contains_main[self.clusters.find(component)]
    }

    /// Join the clusters of `a` and `b`.
    pub fn merge(&mut self, a: ComponentId, b: ComponentId) -> MergeOutcome {
        let (ra, rb) = (self.clusters.find(a), self.clusters.find(b));
        if ra == rb {
            return MergeOutcome::Cycle;
        }
        let (main_a, main_b) = (self.contains_main[ra], self.contains_main[rb]);
        if main_a && main_b {
            return MergeOutcome::Cycle;
        }
        self.clusters.union(ra, rb);
        let root = self.clusters.find(ra);
        self.contains_main[root] = main_a || main_b;
        if a == MAIN_COMPONENT || b == MAIN_COMPONENT {
            MergeOutcome::AttachedToMain
        } else {
            MergeOutcome::Merged
        }
    }

    /// Every component reaches main.
    pub fn all_contain_main(&self) -> bool {
        (0..self.contains_main.len()).all(|c| self.contains_main(c))
    }
}

/// Adjustment to a pending move once another move has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveUpdate {
    /// Different period; the move is unaffected.
    Keep,
    /// Same period; the topology under the move changed.
    InvalidateFlowDelta,
}

impl MoveUpdate {
    pub fn apply(self, mv: &mut Move) {
        if self == MoveUpdate::InvalidateFlowDelta {
            mv.invalidate_power_flow_delta();
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoveDependenceRule;

impl MoveDependenceRule {
    pub fn new() -> Self {
        MoveDependenceRule
    }

    /// Whether `candidate` can be committed together with `accepted`, all
    /// checked against the configurations of `solution`.
    pub fn is_independent(&self, solution: &Solution, accepted: &[Move], candidate: &Move) -> bool {
        let period = candidate.period();
        let Some(config) = solution.get(period) else {
            return false;
        };
        let batch: Vec<&Move> = accepted
            .iter()
            .filter(|m| m.period() == period)
            .chain(std::iter::once(candidate))
            .collect();
        self.are_independent(config, &batch)
    }

    /// Whether every move of `batch`, all in the period configured as
    /// `config`, can be applied together.
    pub fn are_independent(&self, config: &NetworkConfiguration, batch: &[&Move]) -> bool {
        if batch.iter().flat_map(|m| m.switches()).duplicates().next().is_some() {
            return false;
        }
        let network = config.network();
        let preconditions_hold = batch.iter().all(|m| {
            m.switches().all(|l| l < network.line_count() && network.is_switchable(l))
                && m.switches_to_open().iter().all(|&l| !config.is_open(l))
                && m.switches_to_close().iter().all(|&l| config.is_open(l))
        });
        if !preconditions_hold {
            return false;
        }

        if !config.is_radial() || !config.is_connected() {
            return Self::replay_is_radial(config, batch);
        }

        let mut components = ComponentSet::new(config);
        for m in batch {
            for &line in m.switches_to_open() {
                if components.split(line).is_none() {
                    return false;
                }
            }
        }

        let mut clusters = ClusterSet::new(components.len());
        for m in batch {
            for &line in m.switches_to_close() {
                let l = network.line(line);
                let (a, b) = (components.component_of(l.from), components.component_of(l.to));
                if clusters.merge(a, b) == MergeOutcome::Cycle {
                    log::trace!("line {} closes a cycle in {}", line, m.period());
                    return false;
                }
            }
        }
        clusters.all_contain_main()
    }

    /// Fallback for configurations that are already meshed or disconnected.
    fn replay_is_radial(config: &NetworkConfiguration, batch: &[&Move]) -> bool {
        let mut trial = config.clone();
        batch.iter().all(|m| m.apply_to(&mut trial).is_ok())
            && trial.is_radial()
            && trial.is_connected()
    }

    /// What to do with `move_to_update` once `move_to_be_applied` is
    /// committed; `None` if the two moves cannot coexist.
    pub fn update(
        &self,
        solution: &Solution,
        move_to_update: &Move,
        move_to_be_applied: &Move,
    ) -> Option<MoveUpdate> {
        if move_to_update.period() != move_to_be_applied.period() {
            return Some(MoveUpdate::Keep);
        }
        let config = solution.get(move_to_update.period())?;
        self.are_independent(config, &[move_to_be_applied, move_to_update])
            .then_some(MoveUpdate::InvalidateFlowDelta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_search::moves::SwapSwitchStatusMove;
    use crate::network::{Line, Network, Node};
    use crate::problem::{Period, PeriodData, Problem};

    /// Ring 0-1-2-3-4-5-0, providers 0 and 3, ties 1-2 (line 1) and 4-5
    /// (line 4) open.
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
            .map(|i| Line::switch(i, i, (i + 1) % 6, 0.1, i == 1 || i == 4))
            .collect();
        let network = Network::new(nodes, lines).unwrap();
        Problem::new("ring", network, vec![PeriodData::new("h0", vec![1.0; 6])]).unwrap()
    }

    fn swap(solution: &Solution, open: LineId, close: LineId) -> Move {
        SwapSwitchStatusMove::new(solution.configuration(Period(0)), Period(0), open, close)
            .unwrap()
            .into()
    }

    #[test]
    fn test_disjoint_feeders_are_independent() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let rule = MoveDependenceRule::new();
        // Shift the tie 1-2 to 0-1 and the tie 4-5 to 5-0.
        let a = swap(&solution, 0, 1);
        let b = swap(&solution, 5, 4);
        assert!(rule.is_independent(&solution, &[a.clone()], &b));
        assert_eq!(rule.update(&solution, &b, &a), Some(MoveUpdate::InvalidateFlowDelta));
    }

    #[test]
    fn test_shared_switch_is_dependent() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let rule = MoveDependenceRule::new();
        // Both swaps close the same tie.
        let a = swap(&solution, 0, 1);
        let b = swap(&solution, 2, 1);
        assert!(!rule.is_independent(&solution, &[a], &b));
    }

    #[test]
    fn test_matches_sequential_application() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let rule = MoveDependenceRule::new();
        // Buses 1 and 2 end up cut off while the ties mesh the two feeders.
        let a = swap(&solution, 2, 1);
        let b = swap(&solution, 0, 4);
        let mut both = solution.clone();
        a.apply(&mut both).unwrap();
        b.apply(&mut both).unwrap();
        let config = both.configuration(Period(0));
        let sequential_ok = config.is_radial() && config.is_connected();
        assert_eq!(rule.is_independent(&solution, &[a], &b), sequential_ok);
    }

    #[test]
    fn test_different_periods_keep() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let rule = MoveDependenceRule::new();
        let a = swap(&solution, 0, 1);
        let b: Move = SwapSwitchStatusMove::new(solution.configuration(Period(0)), Period(1), 0, 1)
            .unwrap()
            .into();
        assert_eq!(rule.update(&solution, &b, &a), Some(MoveUpdate::Keep));
    }

    #[test]
    fn test_component_split_bookkeeping() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let config = solution.configuration(Period(0));
        // Provider 3 feeds 2 (line 2) and 4 (line 3); provider 0 feeds 1
        // (line 0) and 5 (line 5).
        let mut components = ComponentSet::new(config);
        let below_2 = components.split(2).unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components.component_of(2), below_2);
        assert_eq!(components.component_of(3), MAIN_COMPONENT);
        assert_eq!(components.component(MAIN_COMPONENT).downstream, vec![2]);
        assert_eq!(components.component(below_2).upstream, Some(2));

        let mut clusters = ClusterSet::new(components.len());
        assert!(!clusters.contains_main(below_2));
        assert_eq!(clusters.merge(below_2, MAIN_COMPONENT), MergeOutcome::AttachedToMain);
        assert_eq!(clusters.merge(MAIN_COMPONENT, below_2), MergeOutcome::Cycle);
        assert!(clusters.all_contain_main());
    }

    #[test]
    fn test_nested_split_moves_boundary() {
        let network = Network::new(
            vec![
                Node::provider(0, "P"),
                Node::consumer(1, "A"),
                Node::consumer(2, "B"),
                Node::consumer(3, "C"),
            ],
            vec![
                Line::switch(0, 0, 1, 0.1, false),
                Line::switch(1, 1, 2, 0.1, false),
                Line::switch(2, 2, 3, 0.1, false),
                Line::switch(3, 3, 0, 0.1, true),
            ],
        )
        .unwrap();
        let config = NetworkConfiguration::initial(std::sync::Arc::new(network));
        let mut components = ComponentSet::new(&config);
        let lower = components.split(2).unwrap();
        let middle = components.split(0).unwrap();
        assert_eq!(components.component(MAIN_COMPONENT).downstream, vec![0]);
        assert_eq!(components.component(middle).downstream, vec![2]);
        assert_eq!(components.component_of(3), lower);
        assert_eq!(components.component_of(1), middle);
    }
}
