//! Benchmarks for the reconfiguration engine.

#[cfg(feature = "bench")]
extern crate criterion;

#[cfg(feature = "bench")]
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use feeder_reconfig::config::{AlgorithmKind, Config};
use feeder_reconfig::criteria::Criteria;
use feeder_reconfig::events::EventHub;
use feeder_reconfig::flow::RadialLoadFlow;
use feeder_reconfig::local_search::moves::Move;
use feeder_reconfig::local_search::neighborhood::Neighborhood;
use feeder_reconfig::local_search::selector::SequentialSelector;
use feeder_reconfig::local_search::{Descent, DescentConfig};
use feeder_reconfig::problem::{Period, Problem};
use feeder_reconfig::solution::Solution;
use feeder_reconfig::stop::NeverStop;
use feeder_reconfig::synthetic::FeederGenerator;
use feeder_reconfig::Optimizer;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;

/// Synthetic grid with `feeders` feeders of 25 buses each.
fn create_benchmark_problem(feeders: usize, periods: usize) -> Problem {
    FeederGenerator::new(feeders, 25)
        .with_ties(feeders * 3)
        .with_periods(periods)
        .with_seed(1)
        .generate()
        .expect("synthetic grid")
}

#[cfg(feature = "bench")]
fn benchmark_move_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("move_evaluation");

    for feeders in [2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(feeders), feeders, |b, &feeders| {
            let problem = create_benchmark_problem(feeders, 1);
            let criteria = Criteria::standard(&Config::new(), Arc::new(RadialLoadFlow::default()));
            let solution = Solution::initial(&problem);
            let moves: Vec<Move> = Neighborhood::all(&problem, &[Period(0)], false)
                .into_iter()
                .flat_map(|mut n| {
                    n.init(&solution);
                    n.moves().to_vec()
                })
                .collect();

            b.iter(|| {
                for mv in &moves {
                    let mut mv = mv.clone();
                    criteria.evaluate(&problem, &solution, &mut mv).unwrap();
                }
            });
        });
    }

    group.finish();
}

#[cfg(feature = "bench")]
fn benchmark_descent(c: &mut Criterion) {
    let mut group = c.benchmark_group("descent");

    for parallel in [false, true].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(parallel), parallel, |b, &parallel| {
            let problem = create_benchmark_problem(4, 1);
            let config = Config::new().with_parallel(parallel);
            let criteria = Criteria::standard(&config, Arc::new(RadialLoadFlow::default()));

            b.iter(|| {
                let mut solution = Solution::initial(&problem);
                let mut rng = ChaCha8Rng::seed_from_u64(0);
                let mut selector =
                    SequentialSelector::for_periods(&problem, &[Period(0)], false, &mut rng);
                Descent::new(&problem, &criteria, DescentConfig::from(&config))
                    .run(&mut solution, &mut selector, &NeverStop, &EventHub::new())
                    .unwrap();
            });
        });
    }

    group.finish();
}

#[cfg(feature = "bench")]
fn benchmark_ruin_and_recreate(c: &mut Criterion) {
    let mut group = c.benchmark_group("ruin_and_recreate");
    group.measurement_time(Duration::from_secs(30));

    for periods in [1, 4].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(periods), periods, |b, &periods| {
            let problem = create_benchmark_problem(4, periods);
            let config = Config::new()
                .with_algorithm(AlgorithmKind::RuinAndRecreate)
                .with_max_iterations(5)
                .with_time_limit(Duration::from_secs(10));

            b.iter(|| {
                let mut optimizer = Optimizer::new(problem.clone(), config.clone()).unwrap();
                optimizer.run(&NeverStop).unwrap();
            });
        });
    }

    group.finish();
}

#[cfg(feature = "bench")]
criterion_group!(
    benches,
    benchmark_move_evaluation,
    benchmark_descent,
    benchmark_ruin_and_recreate
);

#[cfg(feature = "bench")]
criterion_main!(benches);
