//! Solution representation: one network configuration per period.

use crate::configuration::NetworkConfiguration;
use crate::problem::{Period, Problem};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A multi-period switching plan.
#[derive(Clone)]
pub struct Solution {
    configurations: Vec<NetworkConfiguration>,
}

impl Solution {
    /// Create a solution from one configuration per period.
    pub fn new(configurations: Vec<NetworkConfiguration>) -> Self {
        Solution { configurations }
    }

    /// The field state repeated in every period.
    pub fn initial(problem: &Problem) -> Self {
        let config = NetworkConfiguration::initial(Arc::clone(&problem.network));
        Solution {
            configurations: vec![config; problem.period_count()],
        }
    }

    /// Build a solution from explicit open flags, one vector per period.
    pub fn from_open_flags(problem: &Problem, flags: Vec<Vec<bool>>) -> Self {
        Solution {
            configurations: flags
                .into_iter()
                .map(|open| NetworkConfiguration::new(Arc::clone(&problem.network), open))
                .collect(),
        }
    }

    pub fn period_count(&self) -> usize {
        self.configurations.len()
    }

    /// Configuration of `period`. Panics if the period does not exist.
    pub fn configuration(&self, period: Period) -> &NetworkConfiguration {
        &self.configurations[period.index()]
    }

    pub fn get(&self, period: Period) -> Option<&NetworkConfiguration> {
        self.configurations.get(period.index())
    }

    pub fn get_mut(&mut self, period: Period) -> Option<&mut NetworkConfiguration> {
        self.configurations.get_mut(period.index())
    }

    /// Replace the configuration of one period.
    pub fn set_configuration(&mut self, period: Period, config: NetworkConfiguration) {
        self.configurations[period.index()] = config;
    }

    pub fn configurations(&self) -> &[NetworkConfiguration] {
        &self.configurations
    }

    /// Every period is radial.
    pub fn is_radial(&self) -> bool {
        self.configurations.iter().all(|c| c.is_radial())
    }

    /// Every bus is supplied in every period.
    pub fn is_connected(&self) -> bool {
        self.configurations.iter().all(|c| c.is_connected())
    }

    /// Number of switch operations between consecutive periods.
    pub fn changes_between_periods(&self) -> usize {
        self.configurations
            .windows(2)
            .map(|pair| pair[0].switch_differences(&pair[1]).len())
            .sum()
    }

    /// Plain record of the open switches per period.
    pub fn report(&self, value: f64) -> SolutionReport {
        SolutionReport {
            value,
            open_switches: self
                .configurations
                .iter()
                .map(|c| c.open_switches())
                .collect(),
            changes_between_periods: self.changes_between_periods(),
        }
    }
}

/// Serializable summary of a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionReport {
    pub value: f64,
    pub open_switches: Vec<Vec<usize>>,
    pub changes_between_periods: usize,
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solution:")?;
        writeln!(f, "  Periods: {}", self.configurations.len())?;
        writeln!(f, "  Radial: {}", self.is_radial())?;
        writeln!(f, "  Connected: {}", self.is_connected())?;

        for (i, config) in self.configurations.iter().enumerate() {
            writeln!(f, "  Period {}: open {:?}", i, config.open_switches())?;
        }

        Ok(())
    }
}
