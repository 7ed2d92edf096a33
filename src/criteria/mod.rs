//! Objectives, constraints and their weighted combination.
//!
//! The search only talks to [`Criteria`]: it asks for the value of a solution,
//! whether a solution is feasible and what a move would change. Individual
//! terms implement [`Objective`] or [`Constraint`].

pub mod constraints;
pub mod objectives;

use crate::config::Config;
use crate::configuration::NetworkConfiguration;
use crate::error::{InvalidMoveError, Result};
use crate::flow::FlowProvider;
use crate::local_search::moves::{Move, MoveInfo};
use crate::problem::{Period, Problem};
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use self::constraints::{LineCapacityConstraint, RadialityConstraint};
pub use self::objectives::{
    ConfigurationChangeObjective, LossObjective, ReliabilityObjective, SwitchingCostObjective,
};

/// A cost term to minimize.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self, problem: &Problem, solution: &Solution) -> f64;

    /// Change of [`Objective::value`] if `mv` were applied to `solution`.
    fn delta(&self, problem: &Problem, solution: &Solution, mv: &mut Move) -> Result<f64>;
}

/// A feasibility condition.
pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the constraint holds in `period` when that period is configured
    /// as `config` and every other period as in `solution`.
    fn is_satisfied_in(
        &self,
        problem: &Problem,
        solution: &Solution,
        period: Period,
        config: &NetworkConfiguration,
    ) -> bool;

    fn is_satisfied(&self, problem: &Problem, solution: &Solution) -> bool {
        problem
            .periods()
            .all(|p| self.is_satisfied_in(problem, solution, p, solution.configuration(p)))
    }

    /// Human readable description of the violation.
    fn reason(&self, problem: &Problem, solution: &Solution) -> String;
}

/// A violated constraint, by name and reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

struct WeightedObjective {
    objective: Box<dyn Objective>,
    weight: f64,
}

/// Weighted objectives plus hard constraints.
#[derive(Default)]
pub struct Criteria {
    objectives: Vec<WeightedObjective>,
    constraints: Vec<Box<dyn Constraint>>,
}

impl Criteria {
    pub fn new() -> Self {
        Criteria::default()
    }

    /// Add an objective term with the given weight.
    pub fn with_objective(mut self, objective: impl Objective + 'static, weight: f64) -> Self {
        self.objectives.push(WeightedObjective {
            objective: Box::new(objective),
            weight,
        });
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(Box::new(constraint));
        self
    }

    /// Losses, reliability, switching cost and configuration changes weighted
    /// as in `config`, subject to radiality and line capacities.
    pub fn standard(config: &Config, provider: Arc<dyn FlowProvider>) -> Self {
        Criteria::new()
            .with_objective(LossObjective::new(Arc::clone(&provider)), config.loss_weight)
            .with_objective(
                ReliabilityObjective::new(Arc::clone(&provider)),
                config.reliability_weight,
            )
            .with_objective(SwitchingCostObjective, config.switching_cost_weight)
            .with_objective(
                ConfigurationChangeObjective,
                config.configuration_change_weight,
            )
            .with_constraint(RadialityConstraint)
            .with_constraint(LineCapacityConstraint::new(provider))
    }

    pub fn objective_names(&self) -> Vec<&str> {
        self.objectives.iter().map(|w| w.objective.name()).collect()
    }

    pub fn constraint_names(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }

    /// Weighted objective value; lower is better.
    pub fn value(&self, problem: &Problem, solution: &Solution) -> f64 {
        self.objectives
            .iter()
            .filter(|w| w.weight != 0.0)
            .map(|w| w.weight * w.objective.value(problem, solution))
            .sum()
    }

    pub fn is_feasible(&self, problem: &Problem, solution: &Solution) -> bool {
        self.constraints
            .iter()
            .all(|c| c.is_satisfied(problem, solution))
    }

    /// Feasibility of one period configured as `config`.
    pub fn is_period_feasible(
        &self,
        problem: &Problem,
        solution: &Solution,
        period: Period,
        config: &NetworkConfiguration,
    ) -> bool {
        self.constraints
            .iter()
            .all(|c| c.is_satisfied_in(problem, solution, period, config))
    }

    pub fn violations(&self, problem: &Problem, solution: &Solution) -> Vec<ConstraintViolation> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(problem, solution))
            .map(|c| ConstraintViolation {
                name: c.name().to_string(),
                reason: c.reason(problem, solution),
            })
            .collect()
    }

    /// Score a move against `solution` without changing it.
    pub fn evaluate(&self, problem: &Problem, solution: &Solution, mv: &mut Move) -> Result<MoveInfo> {
        let period = mv.period();
        let mut trial = solution
            .get(period)
            .ok_or(InvalidMoveError::UnknownPeriod(period.index()))?
            .clone();
        mv.apply_to(&mut trial)?;

        let mut delta_value = 0.0;
        for w in &self.objectives {
            if w.weight != 0.0 {
                delta_value += w.weight * w.objective.delta(problem, solution, mv)?;
            }
        }
        let is_feasible = self.is_period_feasible(problem, solution, period, &trial);

        Ok(MoveInfo {
            mv: mv.clone(),
            delta_value,
            is_feasible,
        })
    }
}
