//! Problem definition: a network plus the periods it must be configured for.

use crate::error::{ReconfigError, Result};
use crate::network::{Network, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An index into the ordered list of periods of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period(pub usize);

impl Period {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Demand data for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodData {
    pub name: String,
    /// Demand per bus, indexed by node id. Providers usually carry zero.
    pub demands: Vec<f64>,
    /// Length of the period in hours, used to weight energy losses.
    pub duration: f64,
}

impl PeriodData {
    /// Create a period with the given demands and a one hour duration.
    pub fn new(name: impl Into<String>, demands: Vec<f64>) -> Self {
        PeriodData {
            name: name.into(),
            demands,
            duration: 1.0,
        }
    }

    /// Set the duration of the period.
    pub fn with_duration(mut self, hours: f64) -> Self {
        self.duration = hours;
        self
    }
}

/// A multi-period reconfiguration problem.
#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    pub network: Arc<Network>,
    pub periods: Vec<PeriodData>,
}

impl Problem {
    /// Create a problem, checking that every period has one demand per bus.
    pub fn new(name: impl Into<String>, network: Network, periods: Vec<PeriodData>) -> Result<Self> {
        if periods.is_empty() {
            return Err(ReconfigError::InvalidNetwork(
                "a problem needs at least one period".to_string(),
            ));
        }
        for period in &periods {
            if period.demands.len() != network.node_count() {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "period '{}' has {} demands for {} buses",
                    period.name,
                    period.demands.len(),
                    network.node_count()
                )));
            }
        }

        Ok(Problem {
            name: name.into(),
            network: Arc::new(network),
            periods,
        })
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    pub fn is_multi_period(&self) -> bool {
        self.periods.len() > 1
    }

    /// All periods in chronological order.
    pub fn periods(&self) -> impl Iterator<Item = Period> {
        (0..self.periods.len()).map(Period)
    }

    pub fn period_data(&self, period: Period) -> &PeriodData {
        &self.periods[period.0]
    }

    pub fn demand(&self, period: Period, node: NodeId) -> f64 {
        self.periods[period.0].demands[node]
    }

    pub fn previous_period(&self, period: Period) -> Option<Period> {
        period.0.checked_sub(1).map(Period)
    }

    pub fn next_period(&self, period: Period) -> Option<Period> {
        if period.0 + 1 < self.periods.len() {
            Some(Period(period.0 + 1))
        } else {
            None
        }
    }
}
