//! Command line front end: generates a synthetic multi-feeder grid, optimizes
//! its switching plan and prints or stores the result.

use clap::{ArgAction, Parser};
use feeder_reconfig::config::{AlgorithmKind, Config, ConstructorKind, ImprovementPolicy};
use feeder_reconfig::solution::Solution;
use feeder_reconfig::stop::NeverStop;
use feeder_reconfig::synthetic::FeederGenerator;
use feeder_reconfig::utils::{format_duration, save_report, write_switching_plan, SearchStatistics};
use feeder_reconfig::Optimizer;
use log::LevelFilter;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[clap(name = "feeder-reconfig", version, author, about)]
struct Args {
    /// JSON file with the optimizer settings; flags below override it
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    /// Search algorithm
    #[clap(short, long, value_enum)]
    algorithm: Option<AlgorithmKind>,
    /// Construction of feasible start and repair solutions
    #[clap(long, value_enum)]
    constructor: Option<ConstructorKind>,
    /// Move selection inside a neighbourhood
    #[clap(long, value_enum)]
    policy: Option<ImprovementPolicy>,
    /// Number of feeders (substations) of the synthetic grid
    #[clap(long, default_value_t = 4)]
    feeders: usize,
    /// Buses per feeder
    #[clap(long, default_value_t = 25)]
    buses: usize,
    /// Open tie switches between buses
    #[clap(long, default_value_t = 12)]
    ties: usize,
    /// Number of time periods
    #[clap(short, long, default_value_t = 4)]
    periods: usize,
    /// Stops the search after timeout seconds
    #[clap(short, long)]
    timeout: Option<u64>,
    /// Maximum sweeps or ruin rounds
    #[clap(long)]
    max_iterations: Option<usize>,
    /// Weight of expected interrupted energy in the objective
    #[clap(long)]
    reliability_weight: Option<f64>,
    /// Seed for the grid and the search
    #[clap(short, long)]
    seed: Option<u64>,
    /// Score neighbourhoods on the calling thread only
    #[clap(long, action)]
    sequential: bool,
    /// Only try the first openable switch on each side of a cycle
    #[clap(long, action)]
    small_neighbourhood: bool,
    /// Write a JSON report to this file
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn to_config(&self) -> feeder_reconfig::error::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::new(),
        };
        if let Some(algorithm) = self.algorithm {
            config = config.with_algorithm(algorithm);
        }
        if let Some(constructor) = self.constructor {
            config = config.with_constructor(constructor);
        }
        if let Some(policy) = self.policy {
            config = config.with_improvement_policy(policy);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_time_limit(Duration::from_secs(timeout));
        }
        if let Some(iterations) = self.max_iterations {
            config = config.with_max_iterations(iterations);
        }
        if let Some(weight) = self.reliability_weight {
            config = config.with_reliability_weight(weight);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if self.sequential {
            config = config.with_parallel(false);
        }
        if self.small_neighbourhood {
            config = config.with_small_neighbourhood(true);
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = args.to_config()?;
    let problem = FeederGenerator::new(args.feeders, args.buses)
        .with_ties(args.ties)
        .with_periods(args.periods)
        .with_seed(config.seed)
        .generate()?;
    println!(
        "Generated {}: {} buses, {} lines ({} switchable), {} period(s)",
        problem.name,
        problem.network.node_count(),
        problem.network.line_count(),
        problem.network.switchable_lines().len(),
        problem.period_count()
    );

    let mut optimizer = Optimizer::new(problem.clone(), config)?;
    let start_value = optimizer
        .criteria()
        .value(&problem, &Solution::initial(&problem));
    println!("Field state objective: {:.6}", start_value);

    let outcome = optimizer.run(&NeverStop)?;
    println!("Search completed in {}", format_duration(outcome.runtime));

    let stats = SearchStatistics::new(
        outcome.algorithm.name(),
        outcome.runtime,
        outcome.solution.as_ref().zip(outcome.value),
        outcome.violations.len(),
    );
    println!("{}", stats.format());

    match &outcome.solution {
        Some(solution) => write_switching_plan(&mut io::stdout().lock(), solution, &problem)?,
        None => {
            for violation in &outcome.violations {
                println!("violated: {}", violation);
            }
        }
    }

    if let Some(path) = &args.output {
        println!("Saving report to: {}", path.display());
        save_report(&outcome.report(&problem), path)?;
    }

    Ok(())
}
