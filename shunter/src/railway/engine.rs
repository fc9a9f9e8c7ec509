use log::{debug, warn};
use smallvec::SmallVec;

use crate::output::history::TrainLogEvent;
use super::car::Car;
use super::dynamics::*;
use super::hooks::{Anomaly, Context};
use super::infrastructure::{NodeId, Topology, TrainId};
use super::signal::{SignalChange, SignalId, SignalState};

pub type TrainLogger = Box<dyn Fn(TrainLogEvent)>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Throttle {
    Stop,
    Slow,
    Full,
    /// Held by the dispatcher, e.g. while loading. Brakes like `Stop`.
    Wait,
}

/// A signal the engine has to react to, seen from `approach`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Target {
    pub signal: Option<(SignalId, NodeId)>,
    /// Distance along the track to the signal. Only meaningful with a signal.
    pub distance: f64,
    /// The engine can no longer avoid reacting in time.
    pub locked_on: bool,
}

impl Target {
    pub fn none() -> Target {
        Target { signal: None, distance: -1.0, locked_on: false }
    }

    pub fn is(&self, signal: SignalId) -> bool {
        match self.signal {
            Some((s, _)) => s == signal,
            None => false,
        }
    }

    pub fn signal_id(&self) -> Option<SignalId> {
        self.signal.map(|(s, _)| s)
    }

    fn clear(&mut self) {
        *self = Target::none();
    }

    /// Held and showing something.
    fn active(&self, topo: &Topology) -> bool {
        match self.signal {
            Some((s, approach)) => topo.signal(s).state(approach) != SignalState::None,
            None => false,
        }
    }
}

/// The traction unit at the head of a train: throttle, speed and the
/// signals it is reacting to.
pub struct Engine {
    train: TrainId,
    params: EngineParams,
    speed: f64,
    previous_speed: f64,
    throttle: Throttle,
    stop: Target,
    slow: Target,
    watching: SmallVec<[(SignalId, NodeId); 4]>,
    logger: Option<TrainLogger>,
}

impl Engine {
    pub fn new(train: TrainId, params: EngineParams) -> Engine {
        Engine {
            train: train,
            params: params,
            speed: 0.0,
            previous_speed: 0.0,
            throttle: Throttle::Full,
            stop: Target::none(),
            slow: Target::none(),
            watching: SmallVec::new(),
            logger: None,
        }
    }

    pub fn set_logger(&mut self, logger: TrainLogger) {
        self.logger = Some(logger);
    }

    pub fn log(&self, event: TrainLogEvent) {
        if let Some(ref logger) = self.logger {
            logger(event);
        }
    }

    pub fn params(&self) -> &EngineParams { &self.params }
    pub fn speed(&self) -> f64 { self.speed }
    pub fn previous_speed(&self) -> f64 { self.previous_speed }
    pub fn throttle(&self) -> Throttle { self.throttle }
    pub fn stop_target(&self) -> &Target { &self.stop }
    pub fn slow_target(&self) -> &Target { &self.slow }
    pub fn watching(&self) -> &[(SignalId, NodeId)] { &self.watching }

    /// Came to a standstill during the last tick.
    pub fn just_stopped(&self) -> bool {
        self.speed == 0.0 && self.previous_speed > 0.0
    }

    fn set_throttle(&mut self, throttle: Throttle) {
        if self.throttle != throttle {
            debug!("Train {} throttle {:?} -> {:?}", self.train, self.throttle, throttle);
            self.throttle = throttle;
            self.log(TrainLogEvent::Throttle(throttle));
        }
    }

    fn clear_stop_target(&mut self) {
        self.stop.clear();
        self.log(TrainLogEvent::StopTarget(None));
    }

    fn clear_slow_target(&mut self) {
        self.slow.clear();
        self.log(TrainLogEvent::SlowTarget(None));
    }

    fn is_watching(&self, signal: SignalId) -> bool {
        self.watching.iter().any(|&(s, _)| s == signal)
    }

    fn watch(&mut self, topo: &mut Topology, signal: SignalId, approach: NodeId) {
        if !self.is_watching(signal) {
            self.watching.push((signal, approach));
        }
        topo.signal_mut(signal).subscribe(self.train);
    }

    fn unwatch(&mut self, topo: &mut Topology, signal: SignalId) {
        self.watching.retain(|&mut (s, _)| s != signal);
        topo.signal_mut(signal).unsubscribe(self.train);
    }

    /// Look ahead along the track for signals that matter at the current
    /// speed. Red signals become the stop target, yellow ones the slow
    /// target, and every signal found is watched for changes.
    pub fn search(&mut self, head: &Car, topo: &mut Topology) {
        if self.throttle == Throttle::Wait {
            return;
        }

        // Standing at the red we locked onto; nothing new to find.
        if self.speed == 0.0 && self.stop.locked_on {
            if let Some((signal, approach)) = self.stop.signal {
                if topo.signal(signal).state(approach) == SignalState::Red {
                    return;
                }
            }
        }

        let stopping = self.params.stopping_distance(self.speed, 0.0);
        let slowing = self.params.stopping_distance(self.speed, self.params.half_speed());
        let ignore_red = topo.config().red_ignore_distance;

        // Distance already covered since the last node.
        let behind = topo.distance_to_track(head.current(), head.target()) - head.remaining();
        let mut depth = stopping + behind;
        let mut searched = -behind;
        let (mut prev, mut track) = (head.current(), head.target());

        loop {
            let length = topo.distance_to_track(prev, track);
            searched += length;

            if let Some(signal) = topo.node(track).signal {
                let state = topo.signal(signal).state(prev);

                if self.stop.is(signal) && state == SignalState::Red {
                    self.stop.distance = searched;
                    return;
                }

                if state != SignalState::None && !self.is_watching(signal) {
                    self.watch(topo, signal, prev);

                    match state {
                        SignalState::Red => {
                            if searched <= ignore_red {
                                // Turned red as we pass it; braking now would
                                // only stop us just past the signal.
                                warn!("Train {} running red signal {} at {:.3}", self.train, signal, searched);
                            } else {
                                self.stop = Target {
                                    signal: Some((signal, prev)),
                                    distance: searched,
                                    locked_on: stopping <= searched,
                                };
                                self.log(TrainLogEvent::StopTarget(Some(signal)));
                                return;
                            }
                        }
                        SignalState::Yellow => {
                            let held = self.slow.signal.is_some()
                                && (self.slow.is(signal) || self.slow.distance < searched);
                            if !held {
                                self.slow = Target {
                                    signal: Some((signal, prev)),
                                    distance: searched,
                                    locked_on: slowing <= searched,
                                };
                                self.log(TrainLogEvent::SlowTarget(Some(signal)));
                            }
                        }
                        _ => {}
                    }
                }
            }

            depth -= length;
            if !(depth >= 0.0) {
                return;
            }

            let next = topo.next_track(track, prev);
            prev = track;
            track = next;
        }
    }

    /// Only ever lowers the throttle. Raising it again is left to signal
    /// changes and to passing signals.
    pub fn adjust_throttle(&mut self, topo: &Topology) {
        match self.throttle {
            Throttle::Stop | Throttle::Wait => return,
            Throttle::Full | Throttle::Slow => {}
        }

        if self.stop.active(topo) && self.stop.distance <= self.params.stopping_distance(self.speed, 0.0) {
            self.set_throttle(Throttle::Stop);
            return;
        }

        if self.throttle == Throttle::Full
            && self.slow.active(topo)
            && self.slow.distance <= self.params.stopping_distance(self.speed, self.params.half_speed())
        {
            self.set_throttle(Throttle::Slow);
        }
    }

    pub fn adjust_speed(&mut self, dt: f64) {
        self.previous_speed = self.speed;
        let p = self.params;
        self.speed = match self.throttle {
            Throttle::Full => accelerate(self.speed, p.top_speed, p.acceleration, dt),
            Throttle::Slow => {
                if self.speed <= p.half_speed() {
                    accelerate(self.speed, p.half_speed(), p.acceleration, dt)
                } else {
                    decelerate(self.speed, p.half_speed(), p.deceleration, dt)
                }
            }
            // Waiting holds the brakes like a stop.
            Throttle::Stop | Throttle::Wait => decelerate(self.speed, 0.0, p.deceleration, dt),
        };
    }

    /// Distance to travel this tick. Never runs past a locked-on red.
    pub fn move_distance(&mut self, dt: f64, topo: &Topology) -> f64 {
        let distance = travel_distance(self.previous_speed, self.speed, dt);
        if !self.stop.locked_on {
            return distance;
        }

        if self.stop.distance <= distance {
            self.speed = 0.0;
            return (self.stop.distance - topo.config().stop_margin).max(0.0);
        }
        distance
    }

    /// Bookkeeping after the train has moved `distance`.
    pub fn moved(&mut self, distance: f64, ctx: &mut Context) {
        if self.slow.active(ctx.topology) {
            self.slow.distance -= distance;
        }
        if self.stop.active(ctx.topology) {
            self.stop.distance -= distance;
        }
        ctx.hooks.stats.add_distance(distance);
    }

    /// The head car moved from `previous` onto its current node.
    pub fn track_switched(&mut self, head: &Car, previous: NodeId, ctx: &mut Context) {
        let node = head.current();
        self.log(TrainLogEvent::Node(node));

        let signal = match ctx.topology.enter_track(node, self.train, previous) {
            Some(signal) => signal,
            None => return,
        };
        let state = ctx.topology.signal(signal).state(previous);
        if state == SignalState::None {
            return;
        }

        if self.throttle == Throttle::Slow && state == SignalState::Green {
            self.set_throttle(Throttle::Full);
        }

        if self.slow.is(signal) {
            self.clear_slow_target();
        }

        let mut keep_watching = false;
        if self.stop.is(signal) && self.throttle == Throttle::Stop {
            if !self.stop.locked_on {
                // Could not stop in time: run the red and carry on carefully.
                self.set_throttle(Throttle::Slow);
                self.clear_stop_target();
            } else {
                // Target and subscription are left in place.
                let anomaly = Anomaly::MissedLockedStop { train: self.train, signal: signal };
                self.log(TrainLogEvent::Anomaly(anomaly));
                ctx.report(anomaly);
                keep_watching = true;
            }
        }

        if !keep_watching && self.is_watching(signal) {
            self.unwatch(ctx.topology, signal);
        }
    }

    /// React to a watched signal changing aspect. The signal is dropped from
    /// the watch list unless the engine is still waiting on it; the next
    /// search picks it up again if it still matters.
    ///
    /// A cleared slow target only raises a `Slow` throttle back to `Full`;
    /// it never releases a `Stop` or a `Wait`, unlike an unconditional restore.
    pub fn signal_changed(&mut self, change: SignalChange, loading: bool, topo: &mut Topology) {
        let SignalChange { signal, approach, state } = change;
        let watched = self.watching.iter().any(|&(s, a)| s == signal && a == approach);
        if !watched {
            return;
        }

        if self.stop.is(signal) {
            if self.throttle == Throttle::Wait {
                match state {
                    SignalState::Red => {
                        self.set_throttle(Throttle::Stop);
                        return;
                    }
                    SignalState::Yellow if loading => return,
                    _ => {
                        self.clear_stop_target();
                        self.set_throttle(if state == SignalState::Green { Throttle::Full } else { Throttle::Slow });
                    }
                }
            } else if state != SignalState::Red {
                if loading && state == SignalState::Yellow {
                    self.set_throttle(Throttle::Wait);
                    return;
                }
                self.clear_stop_target();
                self.set_throttle(if state == SignalState::Green { Throttle::Full } else { Throttle::Slow });
            }
        }

        if self.slow.is(signal) && state != SignalState::Yellow {
            self.clear_slow_target();
            if self.throttle == Throttle::Slow {
                self.set_throttle(Throttle::Full);
            }
        }

        self.unwatch(topo, signal);
    }

    /// Loading finished. An engine held at a yellow proceeds at full throttle.
    pub fn end_loading(&mut self, topo: &mut Topology) {
        if self.throttle != Throttle::Wait {
            return;
        }
        if let Some(signal) = self.stop.signal_id() {
            self.unwatch(topo, signal);
        }
        self.clear_stop_target();
        self.set_throttle(Throttle::Full);
    }

    /// An engine starting right at a signal latches onto it.
    pub fn latch_start_signal(&mut self, head: &Car, topo: &mut Topology) {
        let signal = match topo.node(head.target()).signal {
            Some(signal) => signal,
            None => return,
        };
        let approach = head.current();
        let latched = Target {
            signal: Some((signal, approach)),
            distance: head.remaining(),
            locked_on: true,
        };

        match topo.signal(signal).state(approach) {
            SignalState::Red => {
                self.watch(topo, signal, approach);
                self.stop = latched;
                self.log(TrainLogEvent::StopTarget(Some(signal)));
            }
            SignalState::Yellow => {
                self.watch(topo, signal, approach);
                self.slow = latched;
                self.log(TrainLogEvent::SlowTarget(Some(signal)));
            }
            _ => {}
        }
    }

    pub fn reset(&mut self, topo: &mut Topology) {
        for (signal, _) in self.watching.drain(..) {
            topo.signal_mut(signal).unsubscribe(self.train);
        }
        self.speed = 0.0;
        self.previous_speed = 0.0;
        self.throttle = Throttle::Full;
        self.stop = Target::none();
        self.slow = Target::none();
    }
}
