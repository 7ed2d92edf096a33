//! Multi-period solvers on synthetic feeders.

use feeder_reconfig::config::Config;
use feeder_reconfig::construction::{SpanningTreeConstructor, TreeOrdering};
use feeder_reconfig::criteria::Criteria;
use feeder_reconfig::events::{EventHub, SolverEvent};
use feeder_reconfig::flow::RadialLoadFlow;
use feeder_reconfig::multi_period::{
    RandomRestartSolver, RuinAndRecreateMultiPeriod, RuinAndRecreateState,
    SimpleMultiPeriodSolver, SimpleSolverState,
};
use feeder_reconfig::network::{Line, Network, Node};
use feeder_reconfig::problem::{Period, PeriodData, Problem};
use feeder_reconfig::solution::Solution;
use feeder_reconfig::stop::{NeverStop, StopToken};
use feeder_reconfig::synthetic::FeederGenerator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn three_periods() -> Problem {
    FeederGenerator::new(2, 6)
        .with_ties(4)
        .with_periods(3)
        .with_seed(17)
        .generate()
        .unwrap()
}

/// Square fed from bus 0 whose lines are all too weak for the load.
fn overloaded() -> Problem {
    let nodes = vec![
        Node::provider(0, "SUB"),
        Node::consumer(1, "A"),
        Node::consumer(2, "B"),
        Node::consumer(3, "C"),
    ];
    let lines = (0..4)
        .map(|i| Line::switch(i, i, (i + 1) % 4, 0.1, i == 3).with_capacity(0.5))
        .collect();
    let network = Network::new(nodes, lines).unwrap();
    Problem::new(
        "overloaded",
        network,
        vec![PeriodData::new("h0", vec![0.0, 1.0, 1.0, 1.0])],
    )
    .unwrap()
}

fn setup(config: &Config) -> (Criteria, Box<SpanningTreeConstructor>) {
    let criteria = Criteria::standard(config, Arc::new(RadialLoadFlow::new(config.voltage)));
    let constructor = Box::new(SpanningTreeConstructor::from_config(config));
    (criteria, constructor)
}

#[test]
fn test_simple_solver_single_sweep() {
    let problem = three_periods();
    let config = Config::new().with_max_iterations(1).with_restarts(2);
    let (criteria, constructor) = setup(&config);
    let initial = Solution::initial(&problem);
    let start = criteria.value(&problem, &initial);

    let mut solver = SimpleMultiPeriodSolver::new(&config, constructor);
    let solution = solver
        .optimize(&problem, &criteria, &initial, &NeverStop, &EventHub::new())
        .unwrap()
        .expect("the field state is feasible");

    assert_eq!(solver.state(), SimpleSolverState::Done);
    assert_eq!(solver.sweeps(), 1);
    assert_eq!(solution.period_count(), 3);
    assert!(criteria.is_feasible(&problem, &solution));
    assert!(criteria.value(&problem, &solution) <= start + 1e-9);
}

#[test]
fn test_simple_solver_stops_after_quiet_sweep() {
    let problem = three_periods();
    let config = Config::new().with_max_iterations(50).with_restarts(1);
    let (criteria, constructor) = setup(&config);
    let initial = Solution::initial(&problem);

    let mut solver = SimpleMultiPeriodSolver::new(&config, constructor);
    solver
        .optimize(&problem, &criteria, &initial, &NeverStop, &EventHub::new())
        .unwrap()
        .unwrap();
    assert_eq!(solver.state(), SimpleSolverState::Done);
    assert!(solver.sweeps() >= 2);
    assert!(solver.sweeps() < 50);
}

#[test]
fn test_ruin_and_recreate_runs_all_rounds() {
    let problem = three_periods();
    let config = Config::new().with_max_iterations(3).with_ruin(2, 0.2);
    let (criteria, constructor) = setup(&config);
    let initial = Solution::initial(&problem);
    let start = criteria.value(&problem, &initial);

    let mut solver = RuinAndRecreateMultiPeriod::new(&config, constructor);
    let solution = solver
        .optimize(&problem, &criteria, &initial, &NeverStop, &EventHub::new())
        .unwrap()
        .unwrap();

    assert_eq!(solver.state(), RuinAndRecreateState::Done);
    assert_eq!(solver.iterations(), 3);
    assert!(criteria.is_feasible(&problem, &solution));
    assert!(criteria.value(&problem, &solution) <= start + 1e-9);
}

#[test]
fn test_failed_construction_reports_violations() {
    let problem = overloaded();
    let config = Config::new();
    let criteria = Criteria::standard(&config, Arc::new(RadialLoadFlow::default()));
    let initial = Solution::initial(&problem);

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    let mut events = EventHub::new();
    events.subscribe(move |event| {
        if matches!(event, SolverEvent::NoFeasibleSolution { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let mut solver = RuinAndRecreateMultiPeriod::new(
        &config,
        Box::new(SpanningTreeConstructor::new(TreeOrdering::Random, 1).with_attempts(3)),
    );
    let result = solver
        .optimize(&problem, &criteria, &initial, &NeverStop, &events)
        .unwrap();

    assert!(result.is_none());
    assert_eq!(solver.state(), RuinAndRecreateState::Failed);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    let names: Vec<&str> = solver.violations().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["LineCapacity"]);

    let mut simple = SimpleMultiPeriodSolver::new(
        &config,
        Box::new(SpanningTreeConstructor::new(TreeOrdering::MinimumResistance, 1)),
    );
    assert!(simple
        .optimize(&problem, &criteria, &initial, &NeverStop, &EventHub::new())
        .unwrap()
        .is_none());
    assert_eq!(simple.state(), SimpleSolverState::Failed);
    assert!(!simple.violations().is_empty());
}

#[test]
fn test_raised_stop_returns_constructed_start() {
    let problem = three_periods();
    let config = Config::new().with_max_iterations(10);
    let (criteria, constructor) = setup(&config);
    let initial = Solution::initial(&problem);
    let token = StopToken::new();
    token.stop();

    let mut solver = RuinAndRecreateMultiPeriod::new(&config, constructor);
    let solution = solver
        .optimize(&problem, &criteria, &initial, &token, &EventHub::new())
        .unwrap()
        .unwrap();
    assert_eq!(solver.iterations(), 0);
    assert_eq!(solver.state(), RuinAndRecreateState::Done);
    for period in problem.periods() {
        assert_eq!(
            solution.configuration(period).open_flags(),
            initial.configuration(period).open_flags()
        );
    }
}

#[test]
fn test_random_restart_keeps_other_periods() {
    let problem = three_periods();
    let config = Config::new().with_restarts(3).with_parallel(false);
    let (criteria, _) = setup(&config);
    let initial = Solution::initial(&problem);

    let mut solver = RandomRestartSolver::new(&config);
    let outcome = solver
        .optimize_period(&problem, &criteria, &initial, Period(1), &NeverStop, &EventHub::new())
        .unwrap();
    assert!(outcome.restarts_run >= 1);
    for period in [Period(0), Period(2)] {
        assert_eq!(
            outcome.solution.configuration(period).open_flags(),
            initial.configuration(period).open_flags()
        );
    }
    assert!(outcome.value <= criteria.value(&problem, &initial) + 1e-9);
}
