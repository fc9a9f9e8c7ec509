/// Simulation-wide constants.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimConfig {
    /// Fixed gap kept between the reference points of neighbouring cars.
    pub car_separation: f64,
    /// Red signals found closer than this are ignored by the lookahead.
    pub red_ignore_distance: f64,
    /// A locked-on engine halts this far short of its red signal.
    pub stop_margin: f64,
    /// Backwards nudge applied when a car is snapped into limbo at setup.
    pub limbo_nudge: f64,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            car_separation: 1.0,
            red_ignore_distance: 0.15,
            stop_margin: 0.001,
            limbo_nudge: 0.0001,
        }
    }
}

impl SimConfig {
    pub fn with_separation(car_separation: f64) -> SimConfig {
        SimConfig {
            car_separation: car_separation,
            ..Default::default()
        }
    }

    pub fn half_separation(&self) -> f64 {
        self.car_separation / 2.0
    }
}
