//! Neighbourhood selectors decide which neighbourhood the descent explores next.

use super::moves::{MoveInfo, SwapSwitchStatusMove};
use super::neighborhood::{MoveListNeighborhood, Neighborhood};
use crate::criteria::Criteria;
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use rand::Rng;
use std::collections::VecDeque;

/// What a selector hands to the descent.
#[derive(Debug, Clone)]
pub enum Selection {
    Neighborhood(Neighborhood),
    /// Nothing to explore right now, but pending results may change that.
    Stalled,
    /// No neighbourhood can improve the solution.
    Exhausted,
}

pub trait NeighborhoodSelector: Send {
    /// Reset the selector for a search starting at `solution`.
    fn init(&mut self, problem: &Problem, solution: &Solution);

    fn select_neighborhood(
        &mut self,
        problem: &Problem,
        solution: &Solution,
        criteria: &Criteria,
    ) -> Selection;

    /// Feedback for a neighbourhood previously handed out. `applied` is the
    /// move the descent committed from it, if any.
    fn register_result(&mut self, neighborhood: &Neighborhood, applied: Option<&MoveInfo>);
}

/// Round robin over a fixed list of neighbourhoods.
///
/// Exhausted once a full round has passed without an applied move and every
/// handed out neighbourhood has reported back.
#[derive(Debug, Clone)]
pub struct SequentialSelector {
    neighborhoods: Vec<Neighborhood>,
    next: usize,
    since_improvement: usize,
    pending: usize,
}

impl SequentialSelector {
    pub fn new(neighborhoods: Vec<Neighborhood>) -> Self {
        SequentialSelector {
            neighborhoods,
            next: 0,
            since_improvement: 0,
            pending: 0,
        }
    }

    /// Close-and-open neighbourhoods over `periods` in random order.
    pub fn for_periods<R: Rng + ?Sized>(
        problem: &Problem,
        periods: &[Period],
        use_small_neighbourhood: bool,
        rng: &mut R,
    ) -> Self {
        SequentialSelector::new(Neighborhood::all_shuffled(
            problem,
            periods,
            use_small_neighbourhood,
            rng,
        ))
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }
}

impl NeighborhoodSelector for SequentialSelector {
    fn init(&mut self, _problem: &Problem, _solution: &Solution) {
        self.next = 0;
        self.since_improvement = 0;
        self.pending = 0;
    }

    fn select_neighborhood(
        &mut self,
        _problem: &Problem,
        _solution: &Solution,
        _criteria: &Criteria,
    ) -> Selection {
        if self.since_improvement >= self.neighborhoods.len() {
            return if self.pending > 0 {
                Selection::Stalled
            } else {
                Selection::Exhausted
            };
        }
        let neighborhood = self.neighborhoods[self.next].clone();
        self.next = (self.next + 1) % self.neighborhoods.len();
        self.since_improvement += 1;
        self.pending += 1;
        Selection::Neighborhood(neighborhood)
    }

    fn register_result(&mut self, neighborhood: &Neighborhood, applied: Option<&MoveInfo>) {
        if !neighborhood.is_retry() {
            self.pending = self.pending.saturating_sub(1);
        }
        if applied.is_some() {
            self.since_improvement = 0;
        }
    }
}

/// Wraps a selector and retries every improving swap in the neighbouring
/// periods before asking the wrapped selector again.
#[derive(Debug, Clone)]
pub struct RetryImprovingMoveInAdjacentPeriodsSelector<S> {
    main: S,
    retries: VecDeque<SwapSwitchStatusMove>,
    pending_retries: usize,
    period_count: usize,
}

impl<S: NeighborhoodSelector> RetryImprovingMoveInAdjacentPeriodsSelector<S> {
    pub fn new(main: S) -> Self {
        RetryImprovingMoveInAdjacentPeriodsSelector {
            main,
            retries: VecDeque::new(),
            pending_retries: 0,
            period_count: 0,
        }
    }

    pub fn queued_retries(&self) -> usize {
        self.retries.len()
    }

    pub fn pending_retries(&self) -> usize {
        self.pending_retries
    }

    fn schedule(&mut self, swap: &SwapSwitchStatusMove) {
        let period = swap.period().index();
        let adjacent = period
            .checked_sub(1)
            .into_iter()
            .chain(Some(period + 1).filter(|&p| p < self.period_count));
        for p in adjacent {
            log::trace!("retrying swap in t{}", p);
            self.retries.push_back(swap.in_period(Period(p)));
        }
    }
}

impl<S: NeighborhoodSelector> NeighborhoodSelector
    for RetryImprovingMoveInAdjacentPeriodsSelector<S>
{
    fn init(&mut self, problem: &Problem, solution: &Solution) {
        self.retries.clear();
        self.pending_retries = 0;
        self.period_count = problem.period_count();
        self.main.init(problem, solution);
    }

    fn select_neighborhood(
        &mut self,
        problem: &Problem,
        solution: &Solution,
        criteria: &Criteria,
    ) -> Selection {
        while let Some(swap) = self.retries.pop_front() {
            let Some(config) = solution.get(swap.period()) else {
                continue;
            };
            if swap.is_structurally_valid(config) {
                self.pending_retries += 1;
                let period = swap.period();
                return Selection::Neighborhood(Neighborhood::MoveList(
                    MoveListNeighborhood::new(period, vec![swap.into()]),
                ));
            }
        }

        match self.main.select_neighborhood(problem, solution, criteria) {
            Selection::Exhausted if self.pending_retries > 0 => Selection::Stalled,
            selection => selection,
        }
    }

    fn register_result(&mut self, neighborhood: &Neighborhood, applied: Option<&MoveInfo>) {
        if neighborhood.is_retry() {
            self.pending_retries = self.pending_retries.saturating_sub(1);
        }
        if let Some(swap) = applied
            .filter(|info| info.is_improving())
            .and_then(|info| info.mv.as_swap())
        {
            self.schedule(swap);
        }
        self.main.register_result(neighborhood, applied);
    }
}
