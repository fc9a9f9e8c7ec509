use crate::input::scenario::ScenarioNames;
use crate::railway::dynamics::EngineParams;
use crate::railway::engine::Throttle;
use crate::railway::hooks::{Anomaly, SimTracking};
use crate::railway::infrastructure::{CarRef, NodeId};
use crate::railway::signal::{SignalId, SignalState};
use crate::railway::world::Snapshot;

#[derive(Debug, Default)]
pub struct History {
    pub inf: Vec<InfrastructureLogEvent>,
    pub trains: Vec<(String, EngineParams, Vec<TrainLogEvent>)>,
    pub anomalies: Vec<Anomaly>,
    pub tracking: SimTracking,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InfrastructureLogEvent {
    Wait(f64),
    Aspect(SignalId, NodeId, SignalState), // signal, approach from, new aspect
    Occupied(NodeId, CarRef, bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainLogEvent {
    Node(NodeId), // head car reached node
    Throttle(Throttle),
    StopTarget(Option<SignalId>),
    SlowTarget(Option<SignalId>),
    Loading(bool),
    Stopped(NodeId), // stopped in front of node
    Move(f64, f64, f64), // dt, distance, speed at end of tick
    Anomaly(Anomaly),
}

/// Print one train node visits per line on the following format:
/// `trainname time nodename`.
pub fn visits(names: &ScenarioNames, h: &History) -> Result<String, failure::Error> {
    use std::fmt::Write;
    let mut s = String::new();
    for &(ref train_name, ref _params, ref events) in &h.trains {
        let mut t = 0.0;
        for ev in events {
            use self::TrainLogEvent::*;
            match *ev {
                Move(dt, _, _) => t += dt,
                Node(x) => {
                    writeln!(s, "{} {} {}", train_name, t, names.node_name(x))?;
                }
                _ => {}
            }
        }
    }
    Ok(s)
}
