//! Neighbourhoods: restartable candidate move sets anchored to a solution.

use super::moves::{Move, SwapSwitchStatusMove};
use crate::configuration::{Cycle, NetworkConfiguration};
use crate::network::LineId;
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

/// Close one open switch and open a closed switch on the cycle it forms.
#[derive(Debug, Clone)]
pub struct CloseSwitchAndOpenOtherNeighbourhood {
    switch_to_close: LineId,
    period: Period,
    use_small_neighbourhood: bool,
    moves: Vec<Move>,
}

impl CloseSwitchAndOpenOtherNeighbourhood {
    pub fn new(switch_to_close: LineId, period: Period, use_small_neighbourhood: bool) -> Self {
        CloseSwitchAndOpenOtherNeighbourhood {
            switch_to_close,
            period,
            use_small_neighbourhood,
            moves: Vec::new(),
        }
    }

    pub fn switch_to_close(&self) -> LineId {
        self.switch_to_close
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn uses_small_neighbourhood(&self) -> bool {
        self.use_small_neighbourhood
    }

    /// Recompute the candidate moves from scratch around `solution`.
    pub fn init(&mut self, solution: &Solution) {
        self.moves.clear();
        let Some(config) = solution.get(self.period) else {
            return;
        };
        let Some(cycle) = config.find_cycle_with(self.switch_to_close) else {
            return;
        };

        let candidates = self.candidates_on(config, &cycle);
        self.moves = candidates
            .into_iter()
            .filter_map(|open| {
                SwapSwitchStatusMove::new(config, self.period, open, self.switch_to_close).ok()
            })
            .filter(|swap| swap.respects_transformer_direction(config))
            .map(Move::Swap)
            .collect();
    }

    fn candidates_on(&self, config: &NetworkConfiguration, cycle: &Cycle) -> Vec<LineId> {
        let network = config.network();
        let openable = |l: &LineId| network.is_switchable(*l) && !config.is_open(*l);
        if self.use_small_neighbourhood {
            cycle
                .first_side
                .iter()
                .copied()
                .find(openable)
                .into_iter()
                .chain(cycle.second_side.iter().copied().find(openable))
                .collect()
        } else {
            cycle.lines().filter(openable).collect()
        }
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn into_moves(self) -> Vec<Move> {
        self.moves
    }

    /// The lines this neighbourhood proposes to open.
    pub fn candidates(&self) -> Vec<LineId> {
        self.moves
            .iter()
            .flat_map(|m| m.switches_to_open().iter().copied())
            .collect()
    }
}

/// An explicit list of moves in one period.
#[derive(Debug, Clone)]
pub struct MoveListNeighborhood {
    period: Period,
    moves: Vec<Move>,
}

impl MoveListNeighborhood {
    pub fn new(period: Period, moves: Vec<Move>) -> Self {
        MoveListNeighborhood { period, moves }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Drop moves that no longer apply to `solution` and forget cached flows.
    pub fn init(&mut self, solution: &Solution) {
        let Some(config) = solution.get(self.period) else {
            self.moves.clear();
            return;
        };
        self.moves.retain(|m| match m.as_swap() {
            Some(swap) => {
                swap.is_structurally_valid(config) && swap.respects_transformer_direction(config)
            }
            None => m.apply_to(&mut config.clone()).is_ok(),
        });
        for m in &mut self.moves {
            m.invalidate_power_flow_delta();
        }
    }
}

/// A neighbourhood handed out by a selector.
#[derive(Debug, Clone)]
pub enum Neighborhood {
    CloseSwitchAndOpenOther(CloseSwitchAndOpenOtherNeighbourhood),
    MoveList(MoveListNeighborhood),
}

impl Neighborhood {
    /// One close-and-open neighbourhood per switchable line and period.
    pub fn all(problem: &Problem, periods: &[Period], use_small: bool) -> Vec<Neighborhood> {
        periods
            .iter()
            .cartesian_product(problem.network.switchable_lines())
            .map(|(&period, &line)| {
                Neighborhood::CloseSwitchAndOpenOther(CloseSwitchAndOpenOtherNeighbourhood::new(
                    line, period, use_small,
                ))
            })
            .collect()
    }

    /// [`Neighborhood::all`] in random order.
    pub fn all_shuffled<R: Rng + ?Sized>(
        problem: &Problem,
        periods: &[Period],
        use_small: bool,
        rng: &mut R,
    ) -> Vec<Neighborhood> {
        let mut neighborhoods = Neighborhood::all(problem, periods, use_small);
        neighborhoods.shuffle(rng);
        neighborhoods
    }

    pub fn init(&mut self, solution: &Solution) {
        match self {
            Neighborhood::CloseSwitchAndOpenOther(n) => n.init(solution),
            Neighborhood::MoveList(n) => n.init(solution),
        }
    }

    pub fn period(&self) -> Period {
        match self {
            Neighborhood::CloseSwitchAndOpenOther(n) => n.period,
            Neighborhood::MoveList(n) => n.period,
        }
    }

    pub fn moves(&self) -> &[Move] {
        match self {
            Neighborhood::CloseSwitchAndOpenOther(n) => &n.moves,
            Neighborhood::MoveList(n) => &n.moves,
        }
    }

    pub fn moves_mut(&mut self) -> &mut [Move] {
        match self {
            Neighborhood::CloseSwitchAndOpenOther(n) => &mut n.moves,
            Neighborhood::MoveList(n) => &mut n.moves,
        }
    }

    pub fn len(&self) -> usize {
        self.moves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves().is_empty()
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Neighborhood::MoveList(_))
    }
}

impl fmt::Display for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Neighborhood::CloseSwitchAndOpenOther(n) => write!(
                f,
                "close {} in {} ({} candidates)",
                n.switch_to_close,
                n.period,
                n.moves.len()
            ),
            Neighborhood::MoveList(n) => write!(f, "{} listed moves in {}", n.moves.len(), n.period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Line, Network, Node};
    use crate::problem::PeriodData;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Provider 0 feeding a ring 0-1-2-3-4-5-0 with tie 3-4 (line 3) open and
    /// a fixed line 1-2.
    fn ring() -> Problem {
        let nodes = (0..6)
            .map(|i| {
                if i == 0 {
                    Node::provider(i, "P")
                } else {
                    Node::consumer(i, format!("N{}", i))
                }
            })
            .collect();
        let lines = vec![
            Line::switch(0, 0, 1, 0.1, false),
            Line::fixed(1, 1, 2, 0.1),
            Line::switch(2, 2, 3, 0.1, false),
            Line::switch(3, 3, 4, 0.1, true),
            Line::switch(4, 4, 5, 0.1, false),
            Line::switch(5, 5, 0, 0.1, false),
        ];
        let network = Network::new(nodes, lines).unwrap();
        Problem::new(
            "ring",
            network,
            vec![PeriodData::new("h0", vec![0.0, 1.0, 1.0, 1.0, 1.0, 1.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_small_neighbourhood_is_subset_of_full() {
        let problem = ring();
        let solution = Solution::initial(&problem);

        let mut small = CloseSwitchAndOpenOtherNeighbourhood::new(3, Period(0), true);
        let mut full = CloseSwitchAndOpenOtherNeighbourhood::new(3, Period(0), false);
        small.init(&solution);
        full.init(&solution);

        let small_candidates = small.candidates();
        let full_candidates = full.candidates();
        assert_eq!(small_candidates, vec![2, 4]);
        assert_eq!(full_candidates.len(), 4);
        assert!(small_candidates.iter().all(|l| full_candidates.contains(l)));
        assert!(!full_candidates.contains(&1));
    }

    #[test]
    fn test_init_is_idempotent() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let mut n = Neighborhood::CloseSwitchAndOpenOther(
            CloseSwitchAndOpenOtherNeighbourhood::new(3, Period(0), false),
        );
        n.init(&solution);
        let first = n.moves().to_vec();
        n.init(&solution);
        assert_eq!(n.moves(), first.as_slice());
    }

    #[test]
    fn test_closed_switch_has_no_candidates() {
        let problem = ring();
        let solution = Solution::initial(&problem);
        let mut n = CloseSwitchAndOpenOtherNeighbourhood::new(2, Period(0), false);
        n.init(&solution);
        assert!(n.candidates().is_empty());
    }

    #[test]
    fn test_all_covers_every_switch_and_period() {
        let problem = ring();
        let periods = [Period(0)];
        let plain = Neighborhood::all(&problem, &periods, true);
        assert_eq!(plain.len(), 5);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let shuffled = Neighborhood::all_shuffled(&problem, &periods, true, &mut rng);
        assert_eq!(shuffled.len(), plain.len());
    }

    #[test]
    fn test_move_list_drops_stale_moves() {
        let problem = ring();
        let mut solution = Solution::initial(&problem);
        let config = solution.configuration(Period(0));
        let swap = SwapSwitchStatusMove::new(config, Period(0), 4, 3).unwrap();
        let mut list = Neighborhood::MoveList(MoveListNeighborhood::new(
            Period(0),
            vec![Move::Swap(swap.clone())],
        ));
        list.init(&solution);
        assert_eq!(list.len(), 1);

        Move::Swap(swap).apply(&mut solution).unwrap();
        list.init(&solution);
        assert!(list.is_empty());
    }
}
