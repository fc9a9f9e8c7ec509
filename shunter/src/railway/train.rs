use glam::DVec2;
use log::{debug, info};

use crate::output::history::TrainLogEvent;
use super::car::{Car, LoadOutcome, LoadType};
use super::dynamics::{EngineParams, ParamsError};
use super::engine::{Engine, TrainLogger};
use super::hooks::{Context, Hooks};
use super::infrastructure::{CarRef, NodeId, Topology, TopologyError, TrainId};
use super::signal::SignalChange;

#[derive(Debug, Fail)]
pub enum TrainError {
    #[fail(display = "bad engine parameters: {}", _0)]
    Params(#[cause] ParamsError),
    #[fail(display = "{}", _0)]
    Placement(#[cause] TopologyError),
}

impl From<ParamsError> for TrainError {
    fn from(e: ParamsError) -> TrainError {
        TrainError::Params(e)
    }
}

impl From<TopologyError> for TrainError {
    fn from(e: TopologyError) -> TrainError {
        TrainError::Placement(e)
    }
}

/// Where to put one car: on the segment `current -> target`, at `position`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CarPlacement {
    pub current: NodeId,
    pub target: NodeId,
    pub position: DVec2,
    pub load: Option<LoadType>,
}

/// A chain of cars moved as one. The first car carries the engine.
pub struct Train {
    id: TrainId,
    name: String,
    cars: Vec<Car>,
    engine: Engine,
    loading: bool,
}

impl Train {
    pub fn new(id: TrainId,
               name: String,
               params: EngineParams,
               head: CarPlacement,
               wagons: &[CarPlacement],
               ctx: &mut Context)
               -> Result<Train, TrainError> {
        params.validate()?;
        let mut cars = Vec::with_capacity(wagons.len() + 1);
        if head.load.is_some() {
            debug!("Train {}: engine car takes no cargo, ignoring load", name);
        }
        let engine_ref = CarRef { train: id, car: 0 };
        cars.push(Car::new(engine_ref, head.current, head.target, head.position, None, ctx)?);

        for (idx, p) in wagons.iter().enumerate() {
            let car = CarRef { train: id, car: idx + 1 };
            cars.push(Car::new(car, p.current, p.target, p.position, p.load, ctx)?);
        }

        Ok(Train {
            id: id,
            name: name,
            cars: cars,
            engine: Engine::new(id, params),
            loading: false,
        })
    }

    pub fn id(&self) -> TrainId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn cars(&self) -> &[Car] { &self.cars }
    pub fn engine(&self) -> &Engine { &self.engine }
    pub fn is_loading(&self) -> bool { self.loading }

    pub fn head(&self) -> &Car {
        &self.cars[0]
    }

    pub fn set_logger(&mut self, logger: TrainLogger) {
        self.engine.set_logger(logger);
    }

    /// Capture the starting state and latch onto a signal right ahead.
    pub fn start(&mut self, topo: &mut Topology) {
        for car in &mut self.cars {
            car.capture_start();
        }
        self.engine.latch_start_signal(&self.cars[0], topo);
        self.engine.log(TrainLogEvent::Node(self.cars[0].current()));
    }

    /// One tick: look ahead, set throttle and speed, then move every car.
    pub fn step(&mut self, dt: f64, ctx: &mut Context) {
        self.engine.search(&self.cars[0], ctx.topology);
        self.engine.adjust_throttle(ctx.topology);
        self.engine.adjust_speed(dt);
        let distance = self.engine.move_distance(dt, ctx.topology);
        self.engine.log(TrainLogEvent::Move(dt, distance, self.engine.speed()));

        self.move_train(distance, ctx);

        if self.engine.just_stopped() {
            let head = &self.cars[0];
            info!("Train {} stopped before node {}", self.name, head.target());
            ctx.hooks.dispatch.train_stopped(head.target(), self.id, head.current());
            self.engine.log(TrainLogEvent::Stopped(head.target()));
        }
    }

    /// Move all cars the same distance. The engine reacts to the head car
    /// switching tracks before the rest of the chain follows.
    pub fn move_train(&mut self, distance: f64, ctx: &mut Context) {
        let engine = &mut self.engine;
        if let Some((head, rest)) = self.cars.split_first_mut() {
            if let Some(previous) = head.move_car(distance, ctx) {
                engine.track_switched(head, previous, ctx);
            }
            engine.moved(distance, ctx);
            for car in rest {
                car.move_car(distance, ctx);
            }
        }
    }

    /// Load (or unload) `amount` into the wagons, one interval at a time,
    /// rolling whatever a car did not take on to the next one. Returns the
    /// amount no car could take.
    pub fn load_cargo(&mut self, amount: f64, loading: bool, hooks: &mut Hooks) -> f64 {
        let mut left = amount;
        for car in self.cars.iter_mut().skip(1) {
            if left <= 0.0 {
                break;
            }
            if let LoadOutcome::Loaded { excess, .. } = car.load_car(left, loading, hooks) {
                left = excess.unwrap_or(0.0);
            }
        }
        if left > 0.0 {
            debug!("Train {}: {} left over after {}", self.name, left, if loading { "loading" } else { "unloading" });
        }
        left
    }

    /// Every wagon is full (or empty, when unloading).
    pub fn is_filled(&self, loading: bool) -> bool {
        self.cars.iter().skip(1).all(|c| c.is_filled(loading))
    }

    pub fn begin_loading(&mut self) {
        if !self.loading {
            self.loading = true;
            self.engine.log(TrainLogEvent::Loading(true));
        }
    }

    pub fn end_loading(&mut self, topo: &mut Topology) {
        if self.loading {
            self.loading = false;
            self.engine.log(TrainLogEvent::Loading(false));
        }
        self.engine.end_loading(topo);
    }

    pub fn signal_changed(&mut self, change: SignalChange, topo: &mut Topology) {
        self.engine.signal_changed(change, self.loading, topo);
    }

    pub fn reset(&mut self, ctx: &mut Context) {
        for car in &mut self.cars {
            car.reset(ctx);
        }
        self.engine.reset(ctx.topology);
        self.loading = false;
    }
}
