//! Solvers composing descent, construction and diversification over all
//! periods of a problem.

pub mod random_restart;
pub mod ruin_recreate;
pub mod simple;

pub use self::random_restart::{RandomRestartSolver, RestartOutcome};
pub use self::ruin_recreate::{RuinAndRecreateMultiPeriod, RuinAndRecreateState};
pub use self::simple::{SimpleMultiPeriodSolver, SimpleSolverState};

use crate::construction::FeasibilityConstructor;
use crate::criteria::{ConstraintViolation, Criteria};
use crate::events::{EventHub, SolverEvent};
use crate::local_search::selector::{
    NeighborhoodSelector, RetryImprovingMoveInAdjacentPeriodsSelector, SequentialSelector,
};
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use crate::stop::StopCriterion;
use rand::Rng;
use std::sync::Arc;

/// Sequential close-and-open neighbourhoods over `periods`, wrapped in the
/// adjacent period retry when asked for and useful.
pub fn build_selector<R: Rng + ?Sized>(
    problem: &Problem,
    periods: &[Period],
    use_small_neighbourhood: bool,
    retry_adjacent_periods: bool,
    rng: &mut R,
) -> Box<dyn NeighborhoodSelector> {
    let sequential =
        SequentialSelector::for_periods(problem, periods, use_small_neighbourhood, rng);
    if retry_adjacent_periods && periods.len() > 1 {
        Box::new(RetryImprovingMoveInAdjacentPeriodsSelector::new(sequential))
    } else {
        Box::new(sequential)
    }
}

/// Run the constructor from `initial`. On failure report the violations of
/// `initial` and return them.
pub fn construct_feasible(
    constructor: &mut dyn FeasibilityConstructor,
    problem: &Problem,
    criteria: &Criteria,
    initial: &Solution,
    stop: &dyn StopCriterion,
    events: &EventHub,
) -> Result<(Solution, f64), Vec<ConstraintViolation>> {
    events.emit(SolverEvent::StartingSubOptimizer {
        name: "construction".to_string(),
    });
    match constructor.optimize(problem, initial, criteria, stop) {
        Some(solution) => {
            let value = criteria.value(problem, &solution);
            events.emit(SolverEvent::BestSolutionFound {
                value,
                solution: Arc::new(solution.clone()),
            });
            Ok((solution, value))
        }
        None => {
            let violations = criteria.violations(problem, initial);
            events.emit(SolverEvent::NoFeasibleSolution {
                violations: violations.clone(),
            });
            Err(violations)
        }
    }
}
