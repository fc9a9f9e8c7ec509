#[macro_use] extern crate failure_derive;

pub mod config;
pub mod eventsim;
pub mod input;
pub mod output;
pub mod railway;

#[cfg(test)]
mod tests;

use log::{debug, info};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use input::scenario::{Scenario, ScenarioAction, ScenarioNames};
use output::history::{History, InfrastructureLogEvent};
use railway::hooks::{Hooks, IntervalTable, NoDispatch, SimTracking};
use railway::world::World;

pub type AppResult<T> = Result<T, failure::Error>;

/// Used when neither the scenario nor the caller gives a run length.
pub const DEFAULT_DURATION: f64 = 60.0;
pub const DEFAULT_TIME_STEP: f64 = 0.1;

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn get_scenario(f: &Path) -> AppResult<Scenario> {
    let contents = read_file(f)?;
    get_scenario_string(&contents)
}

pub fn get_scenario_string(s: &str) -> AppResult<Scenario> {
    let scenario = input::scenario_parser::parse_scenario(s)?;
    Ok(scenario)
}

fn apply(world: &mut World, names: &ScenarioNames, action: &ScenarioAction) -> AppResult<()> {
    match *action {
        ScenarioAction::Aspect(ref a) => {
            world.set_signal(names.signal(&a.signal)?, names.node(&a.approach)?, a.state)?;
        }
        ScenarioAction::Load { ref train, amount, loading } => {
            let left = world.load(names.train(train)?, amount, loading);
            if left > 0.0 {
                info!("Train {}: {} could not be placed", train, left);
            }
        }
        ScenarioAction::EndLoad { ref train } => {
            world.end_loading(names.train(train)?);
        }
    }
    Ok(())
}

/// Run a scenario from start to end and collect what happened.
///
/// Timed events are applied between ticks: the simulation is advanced
/// exactly to each event's time first. `time_step` and `duration` override
/// the scenario's own `run` line.
pub fn run_scenario(scenario: &Scenario, time_step: Option<f64>, duration: Option<f64>) -> AppResult<(History, ScenarioNames)> {
    let run = scenario.run.unwrap_or((DEFAULT_DURATION, DEFAULT_TIME_STEP));
    let duration = duration.unwrap_or(run.0);
    let time_step = time_step.unwrap_or(run.1);
    if !(time_step > 0.0) {
        return Err(failure::err_msg("time step must be positive"));
    }

    let inf_log = Rc::new(RefCell::new(Vec::new()));
    let tracking = Rc::new(RefCell::new(SimTracking::default()));
    let mut intervals = IntervalTable::default();
    intervals.intervals.extend(scenario.intervals.iter().cloned());
    let hooks = Hooks {
        stats: Box::new(tracking.clone()),
        visuals: Box::new(intervals),
        dispatch: Box::new(NoDispatch),
    };

    let mut names = ScenarioNames::default();
    let mut topology = scenario.topology(&mut names)?;
    let world_log = inf_log.clone();
    topology.set_logger(Box::new(move |i| world_log.borrow_mut().push(i)));
    let mut world = World::new(topology, hooks)?;
    scenario.place_trains(&mut world, &mut names)?;
    scenario.check_events(&names)?;

    let mut train_logs = Vec::new();
    for train in world.trains().iter().map(|t| t.id()).collect::<Vec<_>>() {
        let train_log = Rc::new(RefCell::new(Vec::new()));
        let spec = &scenario.trains[train];
        train_logs.push((spec.name.clone(), spec.params, train_log.clone()));
        world.set_train_logger(train, Box::new(move |e| train_log.borrow_mut().push(e)));
    }

    let mut sim = eventsim::Simulation::new(world);
    let time_log = inf_log.clone();
    sim.set_time_log(Box::new(move |t| if t > 0.0 {
        time_log.borrow_mut().push(InfrastructureLogEvent::Wait(t));
    }));
    sim.start();

    for event in &scenario.events {
        if event.time > duration {
            break;
        }
        let wait = event.time - sim.time();
        if wait > 0.0 {
            sim.advance_by(wait, time_step);
        }
        debug!("t={}: {:?}", sim.time(), event.action);
        apply(&mut sim.world, &names, &event.action)?;
    }
    let rest = duration - sim.time();
    if rest > 0.0 {
        sim.advance_by(rest, time_step);
    }
    info!("Simulated {} s, {} anomalies", sim.time(), sim.world.anomalies().len());

    let history = History {
        inf: inf_log.replace(Vec::new()),
        trains: train_logs.into_iter().map(|(n, p, v)| (n, p, v.replace(Vec::new()))).collect(),
        anomalies: sim.world.anomalies().to_vec(),
        tracking: tracking.borrow().clone(),
        snapshot: sim.world.snapshot(),
    };
    Ok((history, names))
}
