//! Radial topology of one period.
//!
//! A [`NetworkConfiguration`] keeps, next to the open flag of every line, the
//! forest induced by the closed lines: for each bus its upstream line, parent,
//! depth and the top of its tree. Tops are providers unless a fragment got
//! disconnected. Closed lines that cannot join the forest without creating a
//! cycle (or without joining two providers) are kept as *chords*; the
//! configuration is radial iff there are none.
//!
//! Switch operations only re-derive the parts of the forest they touch, and
//! ancestor queries walk parent pointers, so they cost at most the depth of
//! the tree.

use crate::error::{ReconfigError, Result};
use crate::network::{LineId, Network, NodeId};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// The cycle that closing an open line would create.
///
/// Both sides are listed outward from the closing line: `first_side` starts at
/// the line's `from` bus, `second_side` at its `to` bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub line: LineId,
    pub first_side: Vec<LineId>,
    pub second_side: Vec<LineId>,
}

#[allow(clippy::len_without_is_empty)]
impl Cycle {
    /// All lines of the cycle except the closing one.
    pub fn lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.first_side.iter().chain(self.second_side.iter()).copied()
    }

    pub fn contains(&self, line: LineId) -> bool {
        line == self.line || self.lines().any(|l| l == line)
    }

    pub fn len(&self) -> usize {
        1 + self.first_side.len() + self.second_side.len()
    }
}

/// Switch states and the radial forest of one period.
#[derive(Clone)]
pub struct NetworkConfiguration {
    network: Arc<Network>,
    open: Vec<bool>,
    upstream: Vec<Option<LineId>>,
    parent: Vec<Option<NodeId>>,
    depth: Vec<usize>,
    top: Vec<NodeId>,
    chords: BTreeSet<LineId>,
}

impl NetworkConfiguration {
    /// Build the forest for the given open flags (one per line). Fixed lines
    /// are always treated as closed.
    pub fn new(network: Arc<Network>, mut open: Vec<bool>) -> Self {
        let n = network.node_count();
        open.resize(network.line_count(), false);
        for line in &network.lines {
            if !line.switchable {
                open[line.id] = false;
            }
        }

        let mut config = NetworkConfiguration {
            open,
            upstream: vec![None; n],
            parent: vec![None; n],
            depth: vec![0; n],
            top: (0..n).collect(),
            chords: BTreeSet::new(),
            network,
        };
        config.build_forest();
        config
    }

    /// The configuration of the field state.
    pub fn initial(network: Arc<Network>) -> Self {
        let open = network.initial_open_flags();
        NetworkConfiguration::new(network, open)
    }

    /// Breadth-first construction from all providers at once, then from every
    /// bus that no provider reaches.
    fn build_forest(&mut self) {
        let network = Arc::clone(&self.network);
        let n = network.node_count();
        let mut visited = vec![false; n];
        let mut queue = VecDeque::new();

        for &provider in network.providers() {
            visited[provider] = true;
            queue.push_back(provider);
        }
        self.grow(&network, &mut visited, &mut queue);

        for start in 0..n {
            if !visited[start] {
                visited[start] = true;
                queue.push_back(start);
                self.grow(&network, &mut visited, &mut queue);
            }
        }
    }

    fn grow(&mut self, network: &Network, visited: &mut [bool], queue: &mut VecDeque<NodeId>) {
        while let Some(u) = queue.pop_front() {
            for line in network.incident_lines(u) {
                if self.open[line] || self.upstream[u] == Some(line) {
                    continue;
                }
                let v = network.line(line).other_end(u);
                if visited[v] {
                    self.chords.insert(line);
                    continue;
                }
                visited[v] = true;
                self.upstream[v] = Some(line);
                self.parent[v] = Some(u);
                self.depth[v] = self.depth[u] + 1;
                self.top[v] = self.top[u];
                queue.push_back(v);
            }
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn is_open(&self, line: LineId) -> bool {
        self.open[line]
    }

    /// Open flag of every line.
    pub fn open_flags(&self) -> &[bool] {
        &self.open
    }

    pub fn upstream_line(&self, node: NodeId) -> Option<LineId> {
        self.upstream[node]
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent[node]
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.depth[node]
    }

    /// The root of the tree holding `node`.
    pub fn top(&self, node: NodeId) -> NodeId {
        self.top[node]
    }

    /// Whether the tree of `node` is fed by a provider.
    pub fn is_supplied(&self, node: NodeId) -> bool {
        self.network.is_provider(self.top[node])
    }

    /// Closed lines that are not part of the forest.
    pub fn chords(&self) -> impl Iterator<Item = LineId> + '_ {
        self.chords.iter().copied()
    }

    /// No closed cycle and no closed path between two providers.
    pub fn is_radial(&self) -> bool {
        self.chords.is_empty()
    }

    /// Every bus is fed by a provider.
    pub fn is_connected(&self) -> bool {
        (0..self.top.len()).all(|n| self.is_supplied(n))
    }

    pub fn disconnected_nodes(&self) -> Vec<NodeId> {
        (0..self.top.len()).filter(|&n| !self.is_supplied(n)).collect()
    }

    pub fn open_switches(&self) -> Vec<LineId> {
        self.network
            .switchable_lines()
            .iter()
            .copied()
            .filter(|&l| self.open[l])
            .collect()
    }

    pub fn closed_switches(&self) -> Vec<LineId> {
        self.network
            .switchable_lines()
            .iter()
            .copied()
            .filter(|&l| !self.open[l])
            .collect()
    }

    /// Switchable lines whose state differs between the two configurations.
    pub fn switch_differences(&self, other: &NetworkConfiguration) -> Vec<LineId> {
        self.network
            .switchable_lines()
            .iter()
            .copied()
            .filter(|&l| self.open[l] != other.open[l])
            .collect()
    }

    /// `a` is a strict ancestor of `b`.
    pub fn is_ancestor(&self, a: NodeId, b: NodeId) -> bool {
        if a == b || self.top[a] != self.top[b] || self.depth[a] >= self.depth[b] {
            return false;
        }
        self.ancestor_at_depth(b, self.depth[a]) == a
    }

    pub fn is_ancestor_or_same(&self, a: NodeId, b: NodeId) -> bool {
        a == b || self.is_ancestor(a, b)
    }

    /// `node` is an ancestor of, or equal to, at least one end of `line`.
    pub fn is_ancestor_of_one_end(&self, node: NodeId, line: LineId) -> bool {
        let l = self.network.line(line);
        self.is_ancestor_or_same(node, l.from) || self.is_ancestor_or_same(node, l.to)
    }

    fn ancestor_at_depth(&self, mut node: NodeId, depth: usize) -> NodeId {
        while self.depth[node] > depth {
            match self.parent[node] {
                Some(p) => node = p,
                None => break,
            }
        }
        node
    }

    /// The forest line directly below `node` on the path to its descendant
    /// `target`.
    pub fn downstream_line_toward(&self, node: NodeId, target: NodeId) -> Option<LineId> {
        if !self.is_ancestor(node, target) {
            return None;
        }
        let below = self.ancestor_at_depth(target, self.depth[node] + 1);
        self.upstream[below]
    }

    /// For a forest line, the end that hangs below it.
    pub fn child_end(&self, line: LineId) -> Option<NodeId> {
        let l = self.network.line(line);
        if self.upstream[l.to] == Some(line) {
            Some(l.to)
        } else if self.upstream[l.from] == Some(line) {
            Some(l.from)
        } else {
            None
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.network
            .incident_lines(node)
            .filter(|&l| !self.open[l])
            .filter_map(|l| {
                let other = self.network.line(l).other_end(node);
                (self.upstream[other] == Some(l) && self.parent[other] == Some(node))
                    .then_some(other)
            })
            .collect()
    }

    /// `node` and all its descendants.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut nodes = vec![node];
        let mut i = 0;
        while i < nodes.len() {
            let children = self.children(nodes[i]);
            nodes.extend(children);
            i += 1;
        }
        nodes
    }

    /// Lines from `node` up to the top of its tree.
    pub fn path_to_top(&self, mut node: NodeId) -> Vec<LineId> {
        let mut lines = Vec::with_capacity(self.depth[node]);
        while let (Some(line), Some(parent)) = (self.upstream[node], self.parent[node]) {
            lines.push(line);
            node = parent;
        }
        lines
    }

    /// The cycle created by closing the open line `line`, if any.
    pub fn find_cycle_with(&self, line: LineId) -> Option<Cycle> {
        if line >= self.open.len() || !self.open[line] {
            return None;
        }
        let l = self.network.line(line);
        let (u, v) = (l.from, l.to);

        if self.top[u] == self.top[v] {
            let (mut a, mut b) = (u, v);
            let mut first_side = Vec::new();
            let mut second_side = Vec::new();
            while self.depth[a] > self.depth[b] {
                first_side.push(self.upstream[a]?);
                a = self.parent[a]?;
            }
            while self.depth[b] > self.depth[a] {
                second_side.push(self.upstream[b]?);
                b = self.parent[b]?;
            }
            while a != b {
                first_side.push(self.upstream[a]?);
                second_side.push(self.upstream[b]?);
                a = self.parent[a]?;
                b = self.parent[b]?;
            }
            Some(Cycle {
                line,
                first_side,
                second_side,
            })
        } else if self.is_supplied(u) && self.is_supplied(v) {
            Some(Cycle {
                line,
                first_side: self.path_to_top(u),
                second_side: self.path_to_top(v),
            })
        } else {
            None
        }
    }

    /// Open or close a switchable line, keeping the forest consistent.
    pub fn set_switch(&mut self, line: LineId, open: bool) -> Result<()> {
        if line >= self.open.len() {
            return Err(ReconfigError::UnknownLine(line));
        }
        if !self.network.is_switchable(line) {
            return Err(ReconfigError::NotSwitchable(line));
        }
        if self.open[line] == open {
            return Ok(());
        }

        self.open[line] = open;
        if open {
            self.detach(line);
        } else {
            self.attach(line);
        }
        Ok(())
    }

    fn joinable(&self, line: LineId) -> bool {
        let l = self.network.line(line);
        let (tu, tv) = (self.top[l.from], self.top[l.to]);
        tu != tv && !(self.network.is_provider(tu) && self.network.is_provider(tv))
    }

    fn attach(&mut self, line: LineId) {
        if !self.joinable(line) {
            self.chords.insert(line);
            return;
        }

        let l = self.network.line(line);
        let (anchor, hanging) = if self.is_supplied(l.to) {
            (l.to, l.from)
        } else {
            (l.from, l.to)
        };

        self.reroot(hanging);
        self.upstream[hanging] = Some(line);
        self.parent[hanging] = Some(anchor);
        self.depth[hanging] = self.depth[anchor] + 1;
        self.top[hanging] = self.top[anchor];
        self.refresh_below(hanging);
    }

    fn detach(&mut self, line: LineId) {
        if self.chords.remove(&line) {
            return;
        }
        let Some(child) = self.child_end(line) else {
            return;
        };

        self.upstream[child] = None;
        self.parent[child] = None;
        self.depth[child] = 0;
        self.top[child] = child;
        self.refresh_below(child);
        self.absorb_chords();
    }

    /// Promote chords that now join two separate trees.
    fn absorb_chords(&mut self) {
        loop {
            let candidate = self.chords.iter().copied().find(|&l| self.joinable(l));
            let Some(line) = candidate else {
                break;
            };
            self.chords.remove(&line);
            self.attach(line);
        }
    }

    /// Make `node` the top of its tree by reversing the path above it.
    fn reroot(&mut self, node: NodeId) {
        let mut path = vec![node];
        let mut lines = Vec::new();
        let mut current = node;
        while let (Some(line), Some(parent)) = (self.upstream[current], self.parent[current]) {
            lines.push(line);
            path.push(parent);
            current = parent;
        }

        for (i, &line) in lines.iter().enumerate() {
            self.upstream[path[i + 1]] = Some(line);
            self.parent[path[i + 1]] = Some(path[i]);
        }
        self.upstream[node] = None;
        self.parent[node] = None;
    }

    /// Recompute depth and top for every descendant of `root`.
    fn refresh_below(&mut self, root: NodeId) {
        let mut queue = VecDeque::from([root]);
        while let Some(u) = queue.pop_front() {
            for child in self.children(u) {
                self.depth[child] = self.depth[u] + 1;
                self.top[child] = self.top[u];
                queue.push_back(child);
            }
        }
    }

    /// Check every structural invariant of the forest. Used by tests and
    /// debug assertions.
    pub fn is_consistent(&self) -> bool {
        let n = self.top.len();
        let mut tree_lines = BTreeSet::new();

        for node in 0..n {
            match (self.upstream[node], self.parent[node]) {
                (None, None) => {
                    if self.top[node] != node || self.depth[node] != 0 {
                        return false;
                    }
                }
                (Some(line), Some(parent)) => {
                    let l = self.network.line(line);
                    if self.open[line]
                        || !l.touches(node)
                        || l.other_end(node) != parent
                        || self.depth[node] != self.depth[parent] + 1
                        || self.top[node] != self.top[parent]
                        || !tree_lines.insert(line)
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        let tops_are_roots = (0..n)
            .filter(|&node| self.parent[node].is_none())
            .all(|top| top == self.top[top]);
        let providers_are_tops = self
            .network
            .providers()
            .iter()
            .all(|&p| self.parent[p].is_none());

        let closed_accounted = (0..self.open.len()).all(|line| {
            self.open[line] || tree_lines.contains(&line) != self.chords.contains(&line)
        });
        let chords_closed = self.chords.iter().all(|&l| !self.open[l]);

        tops_are_roots && providers_are_tops && closed_accounted && chords_closed
    }
}

impl fmt::Debug for NetworkConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfiguration")
            .field("open_switches", &self.open_switches())
            .field("chords", &self.chords)
            .field("disconnected", &self.disconnected_nodes())
            .finish()
    }
}
