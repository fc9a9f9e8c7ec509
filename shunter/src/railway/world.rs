use glam::DVec2;
use log::{debug, info};

use crate::eventsim::Stepper;
use super::dynamics::EngineParams;
use super::engine::{Target, Throttle, TrainLogger};
use super::hooks::{Anomaly, Context, Hooks};
use super::infrastructure::{NodeId, Topology, TopologyError, TrainId};
use super::signal::{SignalChange, SignalId, SignalState};
use super::train::{CarPlacement, Train, TrainError};

/// Everything that moves, and the track it moves on.
pub struct World {
    topology: Topology,
    trains: Vec<Train>,
    hooks: Hooks,
    anomalies: Vec<Anomaly>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CarSnapshot {
    pub train: TrainId,
    pub index: usize,
    pub current: NodeId,
    pub target: NodeId,
    pub position: DVec2,
    pub heading: f64,
    pub remaining: f64,
    pub limbo: bool,
    pub fill: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSnapshot {
    pub train: TrainId,
    pub speed: f64,
    pub throttle: Throttle,
    pub stop: Target,
    pub slow: Target,
    pub watching: Vec<(SignalId, NodeId)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub cars: Vec<CarSnapshot>,
    pub engines: Vec<EngineSnapshot>,
}

impl World {
    pub fn new(topology: Topology, hooks: Hooks) -> Result<World, TopologyError> {
        topology.validate()?;
        Ok(World {
            topology: topology,
            trains: Vec::new(),
            hooks: hooks,
            anomalies: Vec::new(),
        })
    }

    pub fn topology(&self) -> &Topology { &self.topology }
    pub fn trains(&self) -> &[Train] { &self.trains }
    pub fn anomalies(&self) -> &[Anomaly] { &self.anomalies }

    pub fn train(&self, id: TrainId) -> &Train {
        &self.trains[id]
    }

    pub fn add_train(&mut self,
                     name: String,
                     params: EngineParams,
                     head: CarPlacement,
                     wagons: &[CarPlacement])
                     -> Result<TrainId, TrainError> {
        let id = self.trains.len();
        let train = {
            let mut ctx = Context {
                topology: &mut self.topology,
                hooks: &mut self.hooks,
                anomalies: &mut self.anomalies,
            };
            Train::new(id, name, params, head, wagons, &mut ctx)?
        };
        info!("Train {} \"{}\" with {} cars", id, train.name(), train.cars().len());
        self.trains.push(train);
        Ok(id)
    }

    pub fn set_train_logger(&mut self, train: TrainId, logger: TrainLogger) {
        self.trains[train].set_logger(logger);
    }

    /// Change a signal aspect and let every engine watching it react before
    /// returning. An engine that stopped watching while an earlier one
    /// reacted is skipped.
    pub fn set_signal(&mut self, signal: SignalId, approach: NodeId, state: SignalState)
                      -> Result<(), TopologyError> {
        let listeners = self.topology.set_signal_state(signal, approach, state)?;
        let change = SignalChange { signal: signal, approach: approach, state: state };
        for train in listeners {
            if !self.topology.signal(signal).is_watched_by(train) {
                continue;
            }
            debug!("Signal {} notifies train {}: {:?}", signal, train, state);
            if let Some(t) = self.trains.get_mut(train) {
                t.signal_changed(change, &mut self.topology);
            }
        }
        Ok(())
    }

    /// Start (or continue) a loading operation on `train`. Returns the
    /// amount no car could take.
    pub fn load(&mut self, train: TrainId, amount: f64, loading: bool) -> f64 {
        let train = &mut self.trains[train];
        train.begin_loading();
        train.load_cargo(amount, loading, &mut self.hooks)
    }

    pub fn end_loading(&mut self, train: TrainId) {
        self.trains[train].end_loading(&mut self.topology);
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for train in &self.trains {
            for (idx, car) in train.cars().iter().enumerate() {
                snapshot.cars.push(CarSnapshot {
                    train: train.id(),
                    index: idx,
                    current: car.current(),
                    target: car.target(),
                    position: car.position(),
                    heading: car.heading(),
                    remaining: car.remaining(),
                    limbo: car.in_limbo(),
                    fill: car.cargo().map(|c| c.fill),
                });
            }
            let engine = train.engine();
            snapshot.engines.push(EngineSnapshot {
                train: train.id(),
                speed: engine.speed(),
                throttle: engine.throttle(),
                stop: *engine.stop_target(),
                slow: *engine.slow_target(),
                watching: engine.watching().to_vec(),
            });
        }
        snapshot
    }
}

impl Stepper for World {
    fn start(&mut self) {
        for train in &mut self.trains {
            train.start(&mut self.topology);
        }
    }

    fn step(&mut self, dt: f64) {
        let mut ctx = Context {
            topology: &mut self.topology,
            hooks: &mut self.hooks,
            anomalies: &mut self.anomalies,
        };
        for train in &mut self.trains {
            train.step(dt, &mut ctx);
        }
    }

    fn reset(&mut self) {
        let mut ctx = Context {
            topology: &mut self.topology,
            hooks: &mut self.hooks,
            anomalies: &mut self.anomalies,
        };
        for train in &mut self.trains {
            train.reset(&mut ctx);
        }
        self.anomalies.clear();
    }
}
