//! Reporting helpers for optimization runs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::criteria::ConstraintViolation;
use crate::error::Result;
use crate::problem::Problem;
use crate::solution::{Solution, SolutionReport};

/// Format a duration as hours, minutes, and seconds.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}h {:02}m {:02}s", hours, minutes, seconds)
}

/// Everything written to a JSON report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub problem: String,
    pub algorithm: String,
    pub runtime_ms: u128,
    pub feasible: bool,
    pub solution: Option<SolutionReport>,
    pub violations: Vec<ConstraintViolation>,
}

/// Write `report` as pretty JSON.
pub fn save_report<P: AsRef<Path>>(report: &RunReport, path: P) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Summary statistics of a finished run.
pub struct SearchStatistics {
    pub algorithm: String,
    pub runtime: Duration,
    pub value: Option<f64>,
    pub feasible: bool,
    pub periods: usize,
    pub open_switches: usize,
    pub changes_between_periods: usize,
    pub violations: usize,
}

impl SearchStatistics {
    pub fn new(
        algorithm: &str,
        runtime: Duration,
        solution: Option<(&Solution, f64)>,
        violations: usize,
    ) -> Self {
        SearchStatistics {
            algorithm: algorithm.to_string(),
            runtime,
            value: solution.map(|(_, v)| v),
            feasible: solution.is_some() && violations == 0,
            periods: solution.map_or(0, |(s, _)| s.period_count()),
            open_switches: solution.map_or(0, |(s, _)| {
                s.configurations().iter().map(|c| c.open_switches().len()).sum()
            }),
            changes_between_periods: solution.map_or(0, |(s, _)| s.changes_between_periods()),
            violations,
        }
    }

    /// Format the statistics as a string.
    pub fn format(&self) -> String {
        let value = self
            .value
            .map_or_else(|| "none".to_string(), |v| format!("{:.6}", v));
        format!(
            "Search Statistics:
- Algorithm: {}
- Runtime: {}
- Objective Value: {}
- Feasible: {}
- Periods: {}
- Open Switches (all periods): {}
- Changes Between Periods: {}
- Violations: {}",
            self.algorithm,
            format_duration(self.runtime),
            value,
            self.feasible,
            self.periods,
            self.open_switches,
            self.changes_between_periods,
            self.violations
        )
    }
}

/// Write the open switches of every period, one line per period.
pub fn write_switching_plan<W: Write>(
    writer: &mut W,
    solution: &Solution,
    problem: &Problem,
) -> std::io::Result<()> {
    for (period, config) in problem.periods().zip(solution.configurations()) {
        let names: Vec<&str> = config
            .open_switches()
            .into_iter()
            .map(|l| problem.network.line(l).name.as_str())
            .collect();
        writeln!(
            writer,
            "{} ({}): open {}",
            period,
            problem.period_data(period).name,
            names.join(", ")
        )?;
    }
    Ok(())
}
