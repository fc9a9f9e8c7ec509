use super::*;
use crate::eventsim::{Simulation, Stepper};
use crate::output::history::TrainLogEvent;
use crate::railway::car::LoadType;
use crate::railway::engine::Throttle;
use crate::railway::hooks::Hooks;
use crate::railway::signal::SignalState;
use approx::assert_abs_diff_eq;

/// A 40 x 20 loop with a signal at `b`, showing red to trains coming from
/// `a`. The engine starts 30 units short of it with two coal wagons behind.
const YARD: &str = "
    separation 2
    node a 0 0
    node b 40 0
    node c 40 20
    node d 0 20
    link a b
    link b c
    link c d
    link d a
    signal s1 b
    aspect s1 a red
    interval coal 25
    train t1 top=4 acc=1 dec=2
    car t1 a b 10 0
    car t1 a b 8 0 coal
    car t1 a b 6 0 coal
";

fn run(text: &str, time_step: Option<f64>, duration: f64) -> (History, ScenarioNames) {
    let scenario = get_scenario_string(text).unwrap();
    run_scenario(&scenario, time_step, Some(duration)).unwrap()
}

fn throttles(h: &History) -> Vec<Throttle> {
    h.trains[0].2.iter().filter_map(|e| match *e {
        TrainLogEvent::Throttle(t) => Some(t),
        _ => None,
    }).collect()
}

fn travelled(h: &History) -> f64 {
    h.trains[0].2.iter().map(|e| match *e {
        TrainLogEvent::Move(_, dx, _) => dx,
        _ => 0.0,
    }).sum()
}

#[test]
fn locked_red_is_never_overrun() {
    for &dt in &[0.01, 0.05, 0.3, 1.0] {
        let (h, _) = run(YARD, Some(dt), 40.0);
        let engine = &h.snapshot.engines[0];
        let head = &h.snapshot.cars[0];

        assert_eq!(engine.speed, 0.0);
        assert_eq!(head.current, 0);
        assert!(head.position.x < 40.0);
        assert!(travelled(&h) <= 30.0 + 1e-9);
        assert!(travelled(&h) > 29.0);

        // Only ever lowered, and never raised again by plain ticks.
        assert_eq!(throttles(&h), vec![Throttle::Stop]);
        assert!(h.anomalies.is_empty());
    }
}

#[test]
fn stopped_once_before_the_signal() {
    let (h, names) = run(YARD, None, 40.0);
    let stops: Vec<_> = h.trains[0].2.iter().filter_map(|e| match *e {
        TrainLogEvent::Stopped(n) => Some(n),
        _ => None,
    }).collect();
    assert_eq!(stops, vec![names.node("b").unwrap()]);
    assert_abs_diff_eq!(h.tracking.distance, travelled(&h), epsilon = 1e-9);
}

#[test]
fn green_while_waiting_for_loading_releases() {
    let text = format!("{}
        at 15 load t1 40
        at 16 aspect s1 a yellow
        at 20 aspect s1 a green
        at 25 unload t1 10
    ", YARD);
    let (h, names) = run(&text, Some(0.1), 30.0);

    assert_eq!(throttles(&h), vec![Throttle::Stop, Throttle::Wait, Throttle::Full]);
    let engine = &h.snapshot.engines[0];
    assert_eq!(engine.throttle, Throttle::Full);
    assert!(engine.speed > 0.0);
    assert_eq!(engine.stop.signal, None);
    assert!(engine.watching.is_empty());
    assert!(h.snapshot.cars[0].current != names.node("a").unwrap());

    // 25 + 15 loaded, then 10 taken off the first wagon.
    let fills: Vec<_> = h.snapshot.cars.iter().map(|c| c.fill).collect();
    assert_eq!(fills, vec![None, Some(15.0), Some(15.0)]);
    assert_eq!(h.tracking.deliveries[&LoadType::Coal], 10.0);
}

#[test]
fn red_while_waiting_keeps_the_train() {
    let text = format!("{}
        at 15 load t1 40
        at 16 aspect s1 a yellow
        at 17 aspect s1 a red
    ", YARD);
    let (h, _) = run(&text, Some(0.1), 30.0);
    assert_eq!(throttles(&h), vec![Throttle::Stop, Throttle::Wait, Throttle::Stop]);
    assert_eq!(h.snapshot.engines[0].speed, 0.0);
    assert_eq!(h.snapshot.cars[0].current, 0);
}

#[test]
fn end_of_loading_lets_the_train_go() {
    let text = format!("{}
        at 15 load t1 40
        at 16 aspect s1 a yellow
        at 18 endload t1
    ", YARD);
    let (h, _) = run(&text, Some(0.1), 30.0);
    assert_eq!(throttles(&h), vec![Throttle::Stop, Throttle::Wait, Throttle::Full]);
    assert!(h.trains[0].2.contains(&TrainLogEvent::Loading(false)));
    assert!(h.snapshot.cars[0].current != 0);
    assert!(h.anomalies.is_empty());
}

#[test]
fn reset_replays_identically() {
    let scenario = get_scenario_string(YARD).unwrap();
    let (world, _) = scenario.build(Hooks::default()).unwrap();
    let mut sim = Simulation::new(world);
    sim.advance_by(12.0, 0.1);
    let first = sim.world.snapshot();

    sim.reset();
    assert!(sim.world.topology().signal(0).watchers().is_empty());
    sim.advance_by(12.0, 0.1);
    assert_eq!(sim.world.snapshot(), first);

    sim.world.reset();
    let cars = sim.world.snapshot().cars;
    assert_eq!(cars[0].position.x, 10.0);
    assert_eq!(cars[2].position.x, 6.0);
}

#[test]
fn signal_aspects_are_logged() {
    let text = format!("{}\n at 3 aspect s1 a green\n", YARD);
    let (h, _) = run(&text, Some(0.5), 4.0);
    let mut t = 0.0;
    let mut seen = None;
    for ev in &h.inf {
        match *ev {
            InfrastructureLogEvent::Wait(dt) => t += dt,
            InfrastructureLogEvent::Aspect(0, 0, SignalState::Green) => seen = Some(t),
            _ => {}
        }
    }
    assert_abs_diff_eq!(seen.unwrap(), 3.0, epsilon = 1e-9);
    // Green before the engine got near: it never had to brake.
    assert!(throttles(&h).is_empty());
}

/// Loop with a second path from `b` to `e` through `d`.
const WYE: &str = "
    node a 0 0
    node b 20 0
    node c 40 0
    node d 30 5
    node e 40 20
    node f 0 20
    link a b
    link b c
    link c e
    link e f
    link f a
    link b d
    link d e
    train t1 top=5 acc=1 dec=1
    car t1 a b 5 0
    run 20 step 0.1
";

fn route(h: &History, names: &ScenarioNames) -> Vec<String> {
    output::history::visits(names, h)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().nth(2).unwrap_or("").to_string())
        .collect()
}

#[test]
fn branches_follow_switch_settings() {
    let (h, names) = run(WYE, None, 20.0);
    let straight = route(&h, &names);
    assert_eq!(&straight[..4], &["a", "b", "c", "e"]);

    let text = format!("{}\n switch b a d\n", WYE);
    let (h, names) = run(&text, None, 20.0);
    let turned = route(&h, &names);
    assert_eq!(&turned[..5], &["a", "b", "d", "e", "f"]);
}

#[test]
fn unknown_names_are_errors() {
    let scenario = get_scenario_string(&format!("{}\n at 1 endload t9\n", YARD)).unwrap();
    assert!(run_scenario(&scenario, None, Some(1.0)).is_err());
    assert!(get_scenario_string("teleport t1 b").is_err());
}

#[test]
fn whole_chain_takes_the_full_load() {
    let scenario = get_scenario_string(YARD).unwrap();
    let (mut world, names) = scenario.build(Hooks::default()).unwrap();
    let t1 = names.train("t1").unwrap();

    let mut requested = 0.0;
    let mut placed = 0.0;
    for &amount in &[30.0, 12.5, 70.0, 7.5, 90.0] {
        requested += amount;
        placed += amount - world.load(t1, amount, true);
    }
    let fill: f64 = world.snapshot().cars.iter().filter_map(|c| c.fill).sum();
    assert_abs_diff_eq!(fill, placed, epsilon = 1e-9);
    assert!(placed <= requested);
    assert!(world.train(t1).is_loading());
}
