#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineParams {
    pub top_speed: f64,
    pub acceleration: f64,
    pub deceleration: f64,
}

#[derive(Debug, Fail)]
pub enum ParamsError {
    #[fail(display = "{} must be above zero, got {}", _0, _1)]
    NotPositive(&'static str, f64),
    #[fail(display = "{} must not be negative, got {}", _0, _1)]
    Negative(&'static str, f64),
}

impl EngineParams {
    /// Braking needs a positive deceleration, otherwise stopping distances
    /// are not finite.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.deceleration > 0.0 && self.deceleration.is_finite()) {
            return Err(ParamsError::NotPositive("deceleration", self.deceleration));
        }
        for &(name, value) in &[("top speed", self.top_speed), ("acceleration", self.acceleration)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ParamsError::Negative(name, value));
            }
        }
        Ok(())
    }

    /// Speed used while the throttle is at `slow`.
    pub fn half_speed(&self) -> f64 {
        self.top_speed / 2.0
    }

    pub fn stopping_distance(&self, from: f64, to: f64) -> f64 {
        stopping_distance(from, to, self.deceleration)
    }
}

/// Distance needed to brake from `from` down to `to` at a constant
/// deceleration. Zero if `to` is not below `from`.
pub fn stopping_distance(from: f64, to: f64, deceleration: f64) -> f64 {
    if to > from {
        return 0.0;
    }
    ((from + to) / 2.0) * ((from - to) / deceleration)
}

/// Linear ramp up towards `target`, never past it.
pub fn accelerate(current: f64, target: f64, acceleration: f64, dt: f64) -> f64 {
    if current == target {
        return current;
    }
    (current + dt * acceleration).min(target)
}

/// Linear ramp down towards `target`, never below it.
pub fn decelerate(current: f64, target: f64, deceleration: f64, dt: f64) -> f64 {
    (current - dt * deceleration).max(target)
}

/// Distance covered in one tick, using the mean of the speeds at both ends.
pub fn travel_distance(previous: f64, current: f64, dt: f64) -> f64 {
    ((current + previous) / 2.0).max(0.0) * dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn params_must_allow_braking() {
        let ok = EngineParams { top_speed: 4.0, acceleration: 1.0, deceleration: 2.0 };
        assert!(ok.validate().is_ok());
        assert!(EngineParams { top_speed: 0.0, acceleration: 0.0, ..ok }.validate().is_ok());

        for &dec in &[0.0, -1.0, std::f64::NAN, std::f64::INFINITY] {
            match (EngineParams { deceleration: dec, ..ok }).validate() {
                Err(ParamsError::NotPositive("deceleration", _)) => {}
                r => panic!("deceleration {} gave {:?}", dec, r),
            }
        }
        assert!(EngineParams { top_speed: -1.0, ..ok }.validate().is_err());
        assert!(EngineParams { acceleration: std::f64::NAN, ..ok }.validate().is_err());
    }

    #[test]
    fn stopping_distance_edges() {
        for &v in &[0.0, 0.5, 3.0, 120.0] {
            assert_eq!(stopping_distance(v, v, 2.0), 0.0);
            assert_eq!(stopping_distance(v, v + 1.0, 2.0), 0.0);
        }
        // v^2 / 2b
        assert_relative_eq!(stopping_distance(4.0, 0.0, 2.0), 4.0);
        assert_relative_eq!(stopping_distance(4.0, 2.0, 2.0), 3.0);
    }

    #[test]
    fn ramps_clip_to_target() {
        assert_relative_eq!(accelerate(0.0, 4.0, 1.0, 0.5), 0.5);
        assert_relative_eq!(accelerate(3.8, 4.0, 1.0, 0.5), 4.0);
        assert_relative_eq!(decelerate(1.0, 0.0, 4.0, 0.5), 0.0);
        assert_relative_eq!(decelerate(4.0, 2.0, 1.0, 0.5), 3.5);
    }

    #[test]
    fn braking_covers_stopping_distance() {
        // Mean-speed integration of a linear ramp covers exactly v^2 / 2b.
        let params = EngineParams { top_speed: 6.0, acceleration: 1.0, deceleration: 1.5 };
        let mut v = 6.0;
        let mut covered = 0.0;
        while v > 0.0 {
            let next = decelerate(v, 0.0, params.deceleration, 0.1);
            covered += travel_distance(v, next, 0.1);
            v = next;
        }
        assert!(covered <= params.stopping_distance(6.0, 0.0) + 1e-9);
        assert_relative_eq!(covered, params.stopping_distance(6.0, 0.0), epsilon = 1e-9);
    }
}
