use glam::DVec2;
use std::fmt;
use std::str::FromStr;

use super::hooks::{Anomaly, Context, Hooks};
use super::infrastructure::{CarRef, NodeId, Topology, TopologyError};

pub const FULL: f64 = 100.0;
const FILL_EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoadType {
    Coal,
    Ore,
    Grain,
    Lumber,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            LoadType::Coal => "coal",
            LoadType::Ore => "ore",
            LoadType::Grain => "grain",
            LoadType::Lumber => "lumber",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LoadType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coal" => Ok(LoadType::Coal),
            "ore" => Ok(LoadType::Ore),
            "grain" => Ok(LoadType::Grain),
            "lumber" => Ok(LoadType::Lumber),
            _ => Err(format!("unknown load type \"{}\"", s)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cargo {
    pub load: LoadType,
    pub fill: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    /// Loading a full car or unloading an empty one.
    Rejected,
    /// `excess` is `None` when the whole amount fit inside the current
    /// interval, and `Some(rest)` when the interval boundary was reached
    /// (`rest` may be zero).
    Loaded { applied: f64, excess: Option<f64> },
}

/// How the car's position is derived.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Motion {
    /// Following the segment `current -> target` exactly.
    Normal,
    /// Crossing the junction at `target` (`past` is `None`) or just past the
    /// junction at `current` (`past` is the distance covered since).
    Limbo { past: Option<f64> },
}

/// Outcome of one limbo step, with the node left behind if the car
/// switched tracks on the way.
enum LimboStep {
    Holding(Option<NodeId>),
    Released(f64, Option<NodeId>),
}

#[derive(Copy, Clone, Debug)]
struct StartState {
    current: NodeId,
    target: NodeId,
    position: DVec2,
}

#[derive(Clone, Debug)]
pub struct Car {
    id: CarRef,
    current: NodeId,
    target: NodeId,
    behind: NodeId,
    position: DVec2,
    heading: f64,
    direction: DVec2,
    remaining: f64,
    motion: Motion,
    cargo: Option<Cargo>,
    start: StartState,
}

impl Car {
    /// Put a car on the segment `current -> target`. Cars placed close to
    /// either end start out in limbo.
    pub fn new(id: CarRef,
               current: NodeId,
               target: NodeId,
               position: DVec2,
               load: Option<LoadType>,
               ctx: &mut Context)
               -> Result<Car, TopologyError> {
        check_placement(ctx.topology, current, target, position)?;

        let mut car = Car {
            id: id,
            current: current,
            target: target,
            behind: ctx.topology.next_track(current, target),
            position: position,
            heading: 0.0,
            direction: DVec2::ZERO,
            remaining: 0.0,
            motion: Motion::Normal,
            cargo: load.map(|l| Cargo { load: l, fill: 0.0 }),
            start: StartState { current: current, target: target, position: position },
        };

        car.try_enter_limbo(ctx);
        if !car.in_limbo() {
            car.rotate_towards(car.direction, ctx);
        }
        ctx.car_enter(current, id);
        if let Some(cargo) = car.cargo {
            ctx.hooks.visuals.update(cargo.fill, cargo.load);
        }
        Ok(car)
    }

    pub fn id(&self) -> CarRef { self.id }
    pub fn current(&self) -> NodeId { self.current }
    pub fn target(&self) -> NodeId { self.target }
    pub fn position(&self) -> DVec2 { self.position }
    pub fn heading(&self) -> f64 { self.heading }
    pub fn direction(&self) -> DVec2 { self.direction }
    pub fn remaining(&self) -> f64 { self.remaining }
    pub fn motion(&self) -> Motion { self.motion }
    pub fn cargo(&self) -> Option<Cargo> { self.cargo }

    pub fn in_limbo(&self) -> bool {
        match self.motion {
            Motion::Limbo { .. } => true,
            Motion::Normal => false,
        }
    }

    pub fn past_distance(&self) -> Option<f64> {
        match self.motion {
            Motion::Limbo { past } => past,
            Motion::Normal => None,
        }
    }

    /// Move the car `distance` along the track. Returns the node the car
    /// left behind if it switched tracks during the move.
    pub fn move_car(&mut self, distance: f64, ctx: &mut Context) -> Option<NodeId> {
        let mut distance = distance;
        let mut switched = None;
        loop {
            let crossing = match self.motion {
                Motion::Limbo { .. } => true,
                Motion::Normal => distance + ctx.topology.half_separation() >= self.remaining,
            };
            if !crossing {
                break;
            }
            if !self.in_limbo() {
                self.motion = Motion::Limbo { past: None };
            }
            match self.run_limbo(distance, ctx) {
                LimboStep::Holding(s) => return s.or(switched),
                LimboStep::Released(leftover, s) => {
                    switched = s.or(switched);
                    distance = leftover;
                }
            }
        }

        self.position += self.direction * distance;
        self.remaining -= distance;
        self.rotate_towards(self.direction, ctx);
        switched
    }

    /// Place the car between two anchor points, one on each side of the
    /// junction, instead of on the track itself. This keeps the car from
    /// snapping around when it moves from one segment onto the next.
    fn run_limbo(&mut self, distance: f64, ctx: &mut Context) -> LimboStep {
        let half = ctx.topology.half_separation();
        let past = self.past_distance();

        if let Some(past) = past {
            if past + distance >= half {
                let leftover = distance - (half - past);
                self.remaining = ctx.topology.distance_to_track(self.current, self.target) - half;
                self.position = ctx.topology.position(self.target) - self.direction * self.remaining;
                self.motion = Motion::Normal;
                return LimboStep::Released(leftover, None);
            }
        }

        if distance >= self.remaining && distance > 0.0 {
            // Reaching the junction: continue on the next segment with what is left.
            let leftover = distance - self.remaining;
            self.position = ctx.topology.position(self.target);
            let previous = self.switch_tracks(ctx);
            self.motion = Motion::Limbo { past: Some(0.0) };
            return match self.run_limbo(leftover, ctx) {
                LimboStep::Holding(s) => LimboStep::Holding(s.or(Some(previous))),
                LimboStep::Released(l, s) => LimboStep::Released(l, s.or(Some(previous))),
            };
        }

        let (front, back) = {
            let topo = &*ctx.topology;
            match past {
                None => {
                    let junction = topo.position(self.target);
                    let ahead = topo.next_track(self.target, self.current);
                    let ahead_dir = (topo.position(ahead) - junction).normalize_or_zero();
                    let back = junction - self.direction * (self.remaining - distance + half);
                    let front = junction + ahead_dir * (half - self.remaining + distance);
                    (front, back)
                }
                Some(past) => {
                    let junction = topo.position(self.current);
                    let behind_dir = (topo.position(self.behind) - junction).normalize_or_zero();
                    let back = junction + behind_dir * (half - past - distance);
                    let front = junction + self.direction * (past + distance + half);
                    (front, back)
                }
            }
        };

        self.motion = Motion::Limbo { past: past.map(|p| p + distance) };
        self.remaining -= distance;
        self.position = (front + back) / 2.0;
        let facing = (front - self.position).normalize_or_zero();
        self.rotate_towards(facing, ctx);
        LimboStep::Holding(None)
    }

    /// Snap the car into limbo if it stands within half a separation of
    /// either end of its segment. Only for setup and reset.
    pub fn try_enter_limbo(&mut self, ctx: &mut Context) {
        self.find_direction_to_next_track(ctx.topology);

        let half = ctx.topology.half_separation();
        let travelled = ctx.topology.distance_to_track(self.current, self.target) - self.remaining;
        if self.remaining < half || travelled < half {
            let past = if travelled < half { Some(travelled) } else { None };
            self.motion = Motion::Limbo { past: past };
            self.start.position = self.position;

            // Step microscopically backwards so that a signal the car starts
            // on is still ahead of it.
            let nudge = -ctx.topology.config().limbo_nudge;
            self.run_limbo(nudge, ctx);
        }
    }

    fn rotate_towards(&mut self, direction: DVec2, ctx: &mut Context) {
        if direction != DVec2::ZERO {
            self.heading = direction.y.atan2(direction.x);
        } else {
            ctx.report(Anomaly::UnsetDirection { car: self.id });
        }
    }

    /// The car reached its target node. Returns the node it came from.
    fn switch_tracks(&mut self, ctx: &mut Context) -> NodeId {
        let previous = self.current;
        self.current = self.target;
        self.target = ctx.topology.next_track(self.current, previous);
        self.behind = previous;

        ctx.car_exit(previous, self.id);
        ctx.car_enter(self.current, self.id);

        self.find_direction_to_next_track(ctx.topology);
        previous
    }

    fn find_direction_to_next_track(&mut self, topo: &Topology) {
        self.direction = (topo.position(self.target) - topo.position(self.current)).normalize_or_zero();
        self.remaining = topo.distance_to_position(self.target, self.position);
    }

    /// Load (or unload) at most up to the next interval boundary.
    ///
    /// Cars fill in sections, one interval at a time, so that a loader moves
    /// on to the next car whenever a section is done. Whatever did not fit
    /// is handed back as `excess` for the next car.
    pub fn load_car(&mut self, amount: f64, loading: bool, hooks: &mut Hooks) -> LoadOutcome {
        let cargo = match self.cargo {
            Some(ref mut cargo) => cargo,
            None => return LoadOutcome::Rejected,
        };
        if amount <= 0.0 || (loading && cargo.fill == FULL) || (!loading && cargo.fill == 0.0) {
            return LoadOutcome::Rejected;
        }

        let sign = if loading { 1.0 } else { -1.0 };
        let mut interval = hooks.visuals.interval(cargo.load);
        if !(interval > 0.0) {
            interval = FULL;
        }

        let mut next = if loading { interval - cargo.fill % interval } else { cargo.fill % interval };
        // Sitting exactly on a boundary: the whole next section is available.
        if next == 0.0 {
            next = interval;
        }
        // Never past empty or full.
        next = if loading { next.min(FULL - cargo.fill) } else { next.min(cargo.fill) };

        let (applied, excess) = if amount > next {
            (next, Some(amount - next))
        } else if amount == next {
            (amount, Some(0.0))
        } else {
            (amount, None)
        };

        cargo.fill = snap_fill(cargo.fill + applied * sign);

        if !loading {
            hooks.stats.add_delivery(cargo.load, applied);
        }
        hooks.visuals.update(cargo.fill, cargo.load);

        LoadOutcome::Loaded { applied: applied, excess: excess }
    }

    /// True if loading and full, or unloading and empty. Cars without cargo
    /// space are always done.
    pub fn is_filled(&self, loading: bool) -> bool {
        match self.cargo {
            Some(cargo) if loading => cargo.fill == FULL,
            Some(cargo) => cargo.fill == 0.0,
            None => true,
        }
    }

    /// Remember the current placement as the one to return to on reset.
    pub fn capture_start(&mut self) {
        self.start.current = self.current;
        self.start.target = self.target;
        if !self.in_limbo() {
            self.start.position = self.position;
        }
    }

    pub fn reset(&mut self, ctx: &mut Context) {
        ctx.car_exit(self.current, self.id);

        if let Some(ref mut cargo) = self.cargo {
            cargo.fill = 0.0;
            ctx.hooks.visuals.update(cargo.fill, cargo.load);
        }

        self.current = self.start.current;
        self.target = self.start.target;
        self.behind = ctx.topology.next_track(self.current, self.target);
        self.motion = Motion::Normal;
        self.position = self.start.position;

        self.try_enter_limbo(ctx);
        if !self.in_limbo() {
            self.rotate_towards(self.direction, ctx);
        }

        ctx.car_enter(self.current, self.id);
    }
}

fn snap_fill(fill: f64) -> f64 {
    if fill <= FILL_EPSILON {
        0.0
    } else if fill >= FULL - FILL_EPSILON {
        FULL
    } else {
        fill
    }
}

fn check_placement(topo: &Topology, current: NodeId, target: NodeId, position: DVec2)
                   -> Result<(), TopologyError> {
    let n = topo.nodes().len();
    if current >= n {
        return Err(TopologyError::UnknownNode(current));
    }
    if target >= n {
        return Err(TopologyError::UnknownNode(target));
    }
    if !topo.are_neighbors(current, target) {
        return Err(TopologyError::NotAdjacent(current, target));
    }
    let segment = topo.distance_to_track(current, target);
    let via = topo.distance_to_position(current, position) + topo.distance_to_position(target, position);
    if via - segment > 1e-6 * segment.max(1.0) {
        return Err(TopologyError::OffTrack(current, target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::railway::hooks::{SimTracking, StatTracker};
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// 10 x 10 square loop: 0 (0,0) -> 1 (10,0) -> 2 (10,10) -> 3 (0,10).
    fn square(separation: f64) -> Topology {
        let mut t = Topology::new(SimConfig::with_separation(separation));
        for &(x, y) in &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            t.add_node(DVec2::new(x, y));
        }
        for &(a, b) in &[(0, 1), (1, 2), (2, 3), (3, 0)] {
            t.link(a, b).unwrap();
        }
        t
    }

    struct Fixture {
        topology: Topology,
        hooks: Hooks,
        anomalies: Vec<Anomaly>,
    }

    impl Fixture {
        fn new(separation: f64) -> Fixture {
            Fixture { topology: square(separation), hooks: Hooks::default(), anomalies: Vec::new() }
        }
        fn ctx(&mut self) -> Context {
            Context { topology: &mut self.topology, hooks: &mut self.hooks, anomalies: &mut self.anomalies }
        }
        fn car(&mut self, current: NodeId, target: NodeId, x: f64, y: f64, load: Option<LoadType>) -> Car {
            let id = CarRef { train: 0, car: 1 };
            Car::new(id, current, target, DVec2::new(x, y), load, &mut self.ctx()).unwrap()
        }
    }

    #[test]
    fn straight_moves_superpose() {
        let mut f = Fixture::new(1.0);
        let mut fine = f.car(0, 1, 2.0, 0.0, None);
        let mut coarse = fine.clone();
        for _ in 0..40 {
            assert_eq!(fine.move_car(0.1, &mut f.ctx()), None);
        }
        coarse.move_car(4.0, &mut f.ctx());

        assert!(!fine.in_limbo());
        assert_abs_diff_eq!(fine.position().x, 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fine.position().x, coarse.position().x, epsilon = 1e-9);
        assert_abs_diff_eq!(fine.remaining(), coarse.remaining(), epsilon = 1e-9);
        assert_abs_diff_eq!(fine.heading(), 0.0);
    }

    #[test]
    fn short_move_stays_before_switch() {
        let mut f = Fixture::new(2.0);
        // Half a unit before node 1: starts in limbo.
        let mut car = f.car(0, 1, 9.5, 0.0, None);
        assert!(car.in_limbo());
        assert_eq!(car.past_distance(), None);

        assert_eq!(car.move_car(0.3, &mut f.ctx()), None);
        assert!(car.in_limbo());
        assert_eq!(car.past_distance(), None);
        assert_eq!((car.current(), car.target()), (0, 1));
        assert_abs_diff_eq!(car.remaining(), 0.2, epsilon = 1e-3);
    }

    #[test]
    fn junction_crossing_independent_of_step() {
        let mut f = Fixture::new(2.0);
        let start = f.car(0, 1, 5.0, 0.0, None);

        let mut ends = Vec::new();
        for &(step, n) in &[(0.01, 700), (0.25, 28), (1.0, 7), (3.5, 2), (7.0, 1)] {
            let mut car = start.clone();
            let mut switches = Vec::new();
            for _ in 0..n {
                if let Some(prev) = car.move_car(step, &mut f.ctx()) {
                    switches.push(prev);
                }
            }
            assert_eq!(switches, vec![0]);
            assert!(!car.in_limbo());
            assert_eq!((car.current(), car.target()), (1, 2));
            ends.push(car);
        }

        for car in &ends {
            assert_abs_diff_eq!(car.position().x, 10.0, epsilon = 1e-6);
            assert_abs_diff_eq!(car.position().y, 2.0, epsilon = 1e-6);
            assert_abs_diff_eq!(car.remaining(), 8.0, epsilon = 1e-6);
            assert_abs_diff_eq!(car.heading(), std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
        }
        assert!(f.anomalies.is_empty());
        assert!(f.topology.node(1).occupants().contains(&start.id()));
        assert!(!f.topology.node(0).occupants().contains(&start.id()));
    }

    #[test]
    fn one_long_move_matches_many_short_ones() {
        let mut f = Fixture::new(2.0);
        let start = f.car(0, 1, 5.0, 0.0, None);

        // Through the corner at node 1 and most of the way up to node 2.
        let mut fine = start.clone();
        for _ in 0..1200 {
            fine.move_car(0.01, &mut f.ctx());
        }
        let mut coarse = start.clone();
        assert_eq!(coarse.move_car(12.0, &mut f.ctx()), Some(0));

        for car in &[&fine, &coarse] {
            assert!(!car.in_limbo());
            assert_eq!((car.current(), car.target()), (1, 2));
            assert_abs_diff_eq!(car.position().x, 10.0, epsilon = 1e-6);
            assert_abs_diff_eq!(car.position().y, 7.0, epsilon = 1e-6);
            assert_abs_diff_eq!(car.remaining(), 3.0, epsilon = 1e-6);
        }

        // Ending inside the limbo zone past the junction.
        let mut fine = start.clone();
        for _ in 0..550 {
            fine.move_car(0.01, &mut f.ctx());
        }
        let mut coarse = start.clone();
        coarse.move_car(5.5, &mut f.ctx());
        assert_eq!(coarse.past_distance(), Some(0.5));
        assert_abs_diff_eq!(fine.past_distance().unwrap(), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(fine.position().x, coarse.position().x, epsilon = 1e-6);
        assert_abs_diff_eq!(fine.position().y, coarse.position().y, epsilon = 1e-6);
    }

    #[test]
    fn limbo_stays_between_anchors() {
        let mut f = Fixture::new(2.0);
        let mut car = f.car(0, 1, 8.5, 0.0, None);
        car.move_car(0.5, &mut f.ctx());
        assert!(car.in_limbo());
        // Entering limbo, the front anchor sits on the junction itself.
        assert_eq!(car.position(), DVec2::new(9.0, 0.0));

        car.move_car(0.5, &mut f.ctx());
        assert!(car.in_limbo());
        let p = car.position();
        assert!(p.x < 10.0 && p.y > 0.0 && p.y < 1.0);
        // Facing diagonally up the corner.
        assert!(car.heading() > 0.0 && car.heading() < std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn placed_just_past_junction() {
        let mut f = Fixture::new(2.0);
        let car = f.car(1, 2, 10.0, 0.5, None);
        match car.motion() {
            Motion::Limbo { past: Some(p) } => assert_abs_diff_eq!(p, 0.5 - 0.0001, epsilon = 1e-9),
            m => panic!("unexpected motion {:?}", m),
        }
    }

    #[test]
    fn rejects_bad_placement() {
        let mut f = Fixture::new(1.0);
        let id = CarRef { train: 0, car: 0 };
        assert!(Car::new(id, 0, 2, DVec2::new(5.0, 5.0), None, &mut f.ctx()).is_err());
        assert!(Car::new(id, 0, 1, DVec2::new(5.0, 1.0), None, &mut f.ctx()).is_err());
    }

    #[test]
    fn zero_direction_is_reported() {
        let mut f = Fixture::new(1.0);
        let mut car = f.car(0, 1, 5.0, 0.0, None);
        let heading = car.heading();
        car.rotate_towards(DVec2::ZERO, &mut f.ctx());
        assert_eq!(car.heading(), heading);
        assert_eq!(f.anomalies, vec![Anomaly::UnsetDirection { car: car.id() }]);
    }

    #[test]
    fn loading_in_intervals() {
        let mut f = Fixture::new(1.0);
        let mut car = f.car(0, 1, 5.0, 0.0, Some(LoadType::Coal));

        assert_eq!(car.load_car(30.0, true, &mut f.hooks),
                   LoadOutcome::Loaded { applied: 25.0, excess: Some(5.0) });
        assert_eq!(car.load_car(10.0, true, &mut f.hooks),
                   LoadOutcome::Loaded { applied: 10.0, excess: None });
        assert_eq!(car.load_car(15.0, true, &mut f.hooks),
                   LoadOutcome::Loaded { applied: 15.0, excess: Some(0.0) });
        assert_eq!(car.cargo().unwrap().fill, 50.0);

        let mut total = 50.0;
        while let LoadOutcome::Loaded { applied, .. } = car.load_car(7.0, true, &mut f.hooks) {
            total += applied;
        }
        assert_eq!(total, FULL);
        assert!(car.is_filled(true));
        assert_eq!(car.load_car(1.0, true, &mut f.hooks), LoadOutcome::Rejected);
    }

    #[test]
    fn unloading_reports_deliveries() {
        let mut f = Fixture::new(1.0);
        let tracking = Rc::new(RefCell::new(SimTracking::default()));
        f.hooks.stats = Box::new(tracking.clone());

        let mut car = f.car(0, 1, 5.0, 0.0, Some(LoadType::Grain));
        assert_eq!(car.load_car(5.0, false, &mut f.hooks), LoadOutcome::Rejected);
        car.load_car(40.0, true, &mut f.hooks);
        car.load_car(15.0, true, &mut f.hooks);
        assert_eq!(car.cargo().unwrap().fill, 40.0);

        // 40 sits 15 above the boundary at 25.
        assert_eq!(car.load_car(20.0, false, &mut f.hooks),
                   LoadOutcome::Loaded { applied: 15.0, excess: Some(5.0) });
        assert_eq!(car.load_car(30.0, false, &mut f.hooks),
                   LoadOutcome::Loaded { applied: 25.0, excess: Some(5.0) });
        assert!(car.is_filled(false));
        assert_eq!(tracking.borrow().deliveries[&LoadType::Grain], 40.0);

        let mut other = SimTracking::default();
        other.add_delivery(LoadType::Grain, 40.0);
        assert_eq!(*tracking.borrow(), other);
    }

    #[test]
    fn engines_hold_no_cargo() {
        let mut f = Fixture::new(1.0);
        let mut car = f.car(0, 1, 5.0, 0.0, None);
        assert_eq!(car.load_car(10.0, true, &mut f.hooks), LoadOutcome::Rejected);
        assert!(car.is_filled(true));
    }

    #[test]
    fn reset_returns_to_start() {
        let mut f = Fixture::new(2.0);
        let mut car = f.car(0, 1, 5.0, 0.0, Some(LoadType::Ore));
        car.capture_start();
        car.load_car(10.0, true, &mut f.hooks);
        for _ in 0..20 {
            car.move_car(0.5, &mut f.ctx());
        }
        assert_eq!(car.current(), 1);

        car.reset(&mut f.ctx());
        assert_eq!((car.current(), car.target()), (0, 1));
        assert_eq!(car.position(), DVec2::new(5.0, 0.0));
        assert_abs_diff_eq!(car.remaining(), 5.0);
        assert!(!car.in_limbo());
        assert_eq!(car.cargo().unwrap().fill, 0.0);
        assert!(f.topology.node(0).occupants().contains(&car.id()));
        assert!(!f.topology.node(1).occupants().contains(&car.id()));
    }
}
