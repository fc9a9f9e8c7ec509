use log::warn;
use ordered_float::OrderedFloat;

/// Anything that can be advanced in fixed ticks.
pub trait Stepper {
    /// Called once before the first tick after construction or reset.
    fn start(&mut self) {}
    fn step(&mut self, dt: f64);
    fn reset(&mut self);
}

pub type TimeLogger = Box<dyn Fn(f64)>;

pub struct Simulation<T> {
    pub world: T,
    time: OrderedFloat<f64>,
    started: bool,
    pub logger: Option<TimeLogger>,
}

impl<T: Stepper> Simulation<T> {
    pub fn new(world: T) -> Self {
        Simulation {
            world: world,
            time: OrderedFloat::from(0.0),
            started: false,
            logger: None,
        }
    }

    pub fn time(&self) -> f64 {
        *self.time
    }

    pub fn set_time_log(&mut self, logger: TimeLogger) {
        self.logger = Some(logger);
    }

    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.world.start();
        }
    }

    /// Advance by exactly one tick of length `dt`.
    pub fn tick(&mut self, dt: f64) {
        if dt < 0.0 {
            panic!("dt < 0");
        }
        self.start();
        if let Some(ref logger) = self.logger {
            logger(dt);
        }
        self.world.step(dt);
        self.time = OrderedFloat::from(*self.time + dt);
    }

    /// Advance by `dt` using ticks no longer than `max_dt`. Does nothing
    /// unless `max_dt` is positive.
    pub fn advance_by(&mut self, dt: f64, max_dt: f64) {
        if !(max_dt > 0.0) {
            warn!("Ignoring advance by {} with tick length {}", dt, max_dt);
            return;
        }
        let target = OrderedFloat::from(*self.time + dt);
        while self.time < target {
            let remaining = *target - *self.time;
            if remaining < 1e-9 {
                break;
            }
            self.tick(remaining.min(max_dt));
        }
        self.time = target;
    }

    pub fn reset(&mut self) {
        self.world.reset();
        self.time = OrderedFloat::from(0.0);
        self.started = false;
    }
}
