//! Progress events and their observers.

use crate::criteria::ConstraintViolation;
use crate::solution::Solution;
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum SolverEvent {
    OptimizationStarted { algorithm: String },
    OptimizationStopped { value: Option<f64> },
    /// A feasible solution better than every one reported before.
    BestSolutionFound { value: f64, solution: Arc<Solution> },
    LocalOptimumFound { value: f64 },
    StartingSubOptimizer { name: String },
    NoFeasibleSolution { violations: Vec<ConstraintViolation> },
}

impl fmt::Display for SolverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverEvent::OptimizationStarted { algorithm } => {
                write!(f, "optimization started ({})", algorithm)
            }
            SolverEvent::OptimizationStopped { value: Some(v) } => {
                write!(f, "optimization stopped at {:.6}", v)
            }
            SolverEvent::OptimizationStopped { value: None } => {
                write!(f, "optimization stopped without a solution")
            }
            SolverEvent::BestSolutionFound { value, .. } => write!(f, "new best {:.6}", value),
            SolverEvent::LocalOptimumFound { value } => write!(f, "local optimum {:.6}", value),
            SolverEvent::StartingSubOptimizer { name } => write!(f, "starting {}", name),
            SolverEvent::NoFeasibleSolution { violations } => {
                write!(f, "no feasible solution: {}", violations.iter().join("; "))
            }
        }
    }
}

pub type EventObserver = Box<dyn Fn(&SolverEvent) + Send + Sync>;

/// Observer list. Every event is also written to the log.
#[derive(Default)]
pub struct EventHub {
    observers: Vec<EventObserver>,
}

impl EventHub {
    pub fn new() -> Self {
        EventHub::default()
    }

    pub fn subscribe(&mut self, observer: impl Fn(&SolverEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn emit(&self, event: SolverEvent) {
        match &event {
            SolverEvent::OptimizationStarted { .. } | SolverEvent::OptimizationStopped { .. } => {
                info!("{}", event)
            }
            SolverEvent::NoFeasibleSolution { .. } => warn!("{}", event),
            _ => debug!("{}", event),
        }
        for observer in &self.observers {
            observer(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EventHub:")?;
        writeln!(f, "  Observers: {}", self.observers.len())
    }
}
