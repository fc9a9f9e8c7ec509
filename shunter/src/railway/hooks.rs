//! Collaborators outside the train-control core, and the context handed
//! through a simulation step.

use log::{trace, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::car::LoadType;
use super::infrastructure::{CarRef, NodeId, Topology, TrainId};
use super::signal::SignalId;

/// Receives accounting data. Write-only from the core's point of view.
pub trait StatTracker {
    fn add_delivery(&mut self, load: LoadType, amount: f64);
    fn add_distance(&mut self, distance: f64);
}

/// Cargo presentation: decides the size of loading intervals and is told
/// about every fill change.
pub trait CargoVisuals {
    fn interval(&self, load: LoadType) -> f64;
    fn update(&mut self, _fill: f64, _load: LoadType) {}
}

/// Occupancy and dispatch logic bound to the track.
pub trait Dispatcher {
    fn car_enter(&mut self, _node: NodeId, _car: CarRef) {}
    fn car_exit(&mut self, _node: NodeId, _car: CarRef) {}
    fn train_stopped(&mut self, _node: NodeId, _train: TrainId, _from: NodeId) {}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SimTracking {
    pub distance: f64,
    pub deliveries: HashMap<LoadType, f64>,
}

impl StatTracker for SimTracking {
    fn add_delivery(&mut self, load: LoadType, amount: f64) {
        *self.deliveries.entry(load).or_insert(0.0) += amount;
    }
    fn add_distance(&mut self, distance: f64) {
        self.distance += distance;
    }
}

impl<T: StatTracker> StatTracker for Rc<RefCell<T>> {
    fn add_delivery(&mut self, load: LoadType, amount: f64) {
        self.borrow_mut().add_delivery(load, amount);
    }
    fn add_distance(&mut self, distance: f64) {
        self.borrow_mut().add_distance(distance);
    }
}

/// Interval sizes per load type.
#[derive(Debug, Clone)]
pub struct IntervalTable {
    pub intervals: HashMap<LoadType, f64>,
    pub default: f64,
}

impl Default for IntervalTable {
    fn default() -> IntervalTable {
        IntervalTable {
            intervals: HashMap::new(),
            default: 25.0,
        }
    }
}

impl CargoVisuals for IntervalTable {
    fn interval(&self, load: LoadType) -> f64 {
        self.intervals.get(&load).cloned().unwrap_or(self.default)
    }
    fn update(&mut self, fill: f64, load: LoadType) {
        trace!("Cargo {:?} at {}", load, fill);
    }
}

impl<T: CargoVisuals> CargoVisuals for Rc<RefCell<T>> {
    fn interval(&self, load: LoadType) -> f64 {
        self.borrow().interval(load)
    }
    fn update(&mut self, fill: f64, load: LoadType) {
        self.borrow_mut().update(fill, load);
    }
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoDispatch;

impl Dispatcher for NoDispatch {}

pub struct Hooks {
    pub stats: Box<dyn StatTracker>,
    pub visuals: Box<dyn CargoVisuals>,
    pub dispatch: Box<dyn Dispatcher>,
}

impl Default for Hooks {
    fn default() -> Hooks {
        Hooks {
            stats: Box::new(SimTracking::default()),
            visuals: Box::new(IntervalTable::default()),
            dispatch: Box::new(NoDispatch),
        }
    }
}

/// Something that should not happen, but which the simulation survives.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Anomaly {
    /// A car was asked to face a zero direction; its heading was kept.
    UnsetDirection { car: CarRef },
    /// A locked-on engine reached its red signal without stopping. The
    /// stop target and the subscription are kept as they were.
    MissedLockedStop { train: TrainId, signal: SignalId },
}

/// Mutable surroundings of a train during one step.
pub struct Context<'a> {
    pub topology: &'a mut Topology,
    pub hooks: &'a mut Hooks,
    pub anomalies: &'a mut Vec<Anomaly>,
}

impl<'a> Context<'a> {
    pub fn car_enter(&mut self, node: NodeId, car: CarRef) {
        if self.topology.car_enter(node, car) {
            self.hooks.dispatch.car_enter(node, car);
        }
    }

    pub fn car_exit(&mut self, node: NodeId, car: CarRef) {
        if self.topology.car_exit(node, car) {
            self.hooks.dispatch.car_exit(node, car);
        }
    }

    pub fn report(&mut self, anomaly: Anomaly) {
        warn!("{:?}", anomaly);
        self.anomalies.push(anomaly);
    }
}
