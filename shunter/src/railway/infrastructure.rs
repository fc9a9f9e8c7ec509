use glam::DVec2;
use log::debug;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

use crate::config::SimConfig;
use crate::eventsim::observable::Listeners;
use crate::output::history::InfrastructureLogEvent;
use super::signal::{Signal, SignalId, SignalState};

pub type NodeId = usize;
pub type TrainId = usize;
pub type InfLogger = Box<dyn Fn(InfrastructureLogEvent)>;

/// Links shorter than this are rejected by validation.
pub const MIN_LINK_LENGTH: f64 = 1e-6;

/// Identifies one car: its train and its index in the chain (0 is the engine).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CarRef {
    pub train: TrainId,
    pub car: usize,
}

#[derive(Debug, Fail)]
pub enum TopologyError {
    #[fail(display = "unknown node {}", _0)]
    UnknownNode(NodeId),
    #[fail(display = "unknown signal {}", _0)]
    UnknownSignal(SignalId),
    #[fail(display = "node {} cannot link to itself", _0)]
    SelfLink(NodeId),
    #[fail(display = "nodes {} and {} are already linked", _0, _1)]
    DuplicateLink(NodeId, NodeId),
    #[fail(display = "nodes {} and {} are too close to be linked", _0, _1)]
    ZeroLength(NodeId, NodeId),
    #[fail(display = "node {} is a dead end", _0)]
    DeadEnd(NodeId),
    #[fail(display = "node {} already carries signal {}", _0, _1)]
    SignalTaken(NodeId, SignalId),
    #[fail(display = "nodes {} and {} are not neighbours", _0, _1)]
    NotAdjacent(NodeId, NodeId),
    #[fail(display = "car position is not on the track between {} and {}", _0, _1)]
    OffTrack(NodeId, NodeId),
}

/// One track node. Consecutive nodes are joined by straight segments.
#[derive(Debug, Clone)]
pub struct TrackNode {
    pub position: DVec2,
    pub neighbors: SmallVec<[NodeId; 3]>,
    pub signal: Option<SignalId>,
    occupants: SmallVec<[CarRef; 4]>,
}

impl TrackNode {
    pub fn occupants(&self) -> &[CarRef] {
        &self.occupants
    }
}

/// Chooses where to continue at nodes with more than one way forward.
pub trait BranchPolicy {
    fn choose(&self, topology: &Topology, node: NodeId, previous: NodeId, candidates: &[NodeId]) -> NodeId;
}

/// Takes the branch that turns the least.
#[derive(Debug, Default, Copy, Clone)]
pub struct StraightAhead;

impl BranchPolicy for StraightAhead {
    fn choose(&self, topology: &Topology, node: NodeId, previous: NodeId, candidates: &[NodeId]) -> NodeId {
        let here = topology.position(node);
        let heading = (here - topology.position(previous)).normalize_or_zero();
        candidates
            .iter()
            .cloned()
            .min_by_key(|&c| OrderedFloat(-heading.dot((topology.position(c) - here).normalize_or_zero())))
            .unwrap_or(previous)
    }
}

/// Fixed switch settings: `(node, coming from) -> going to`. Anything not
/// listed falls back to `StraightAhead`.
#[derive(Debug, Default, Clone)]
pub struct SwitchTable {
    pub settings: HashMap<(NodeId, NodeId), NodeId>,
}

impl BranchPolicy for SwitchTable {
    fn choose(&self, topology: &Topology, node: NodeId, previous: NodeId, candidates: &[NodeId]) -> NodeId {
        match self.settings.get(&(node, previous)) {
            Some(next) if candidates.contains(next) => *next,
            _ => StraightAhead.choose(topology, node, previous, candidates),
        }
    }
}

/// Static track graph plus the mutable state that lives on it: signal
/// aspects and car occupancy.
pub struct Topology {
    nodes: Vec<TrackNode>,
    signals: Vec<Signal>,
    config: SimConfig,
    policy: Box<dyn BranchPolicy>,
    logger: Option<InfLogger>,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
               "Topology {{ nodes: {:?}, signals: {:?}, config: {:?} }}",
               self.nodes,
               self.signals,
               self.config)
    }
}

impl Topology {
    pub fn new(config: SimConfig) -> Topology {
        Topology {
            nodes: Vec::new(),
            signals: Vec::new(),
            config: config,
            policy: Box::new(StraightAhead),
            logger: None,
        }
    }

    pub fn set_branch_policy(&mut self, policy: Box<dyn BranchPolicy>) {
        self.policy = policy;
    }

    pub fn set_logger(&mut self, logger: InfLogger) {
        self.logger = Some(logger);
    }

    fn log(&self, event: InfrastructureLogEvent) {
        if let Some(ref logger) = self.logger {
            logger(event);
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn half_separation(&self) -> f64 {
        self.config.half_separation()
    }

    pub fn add_node(&mut self, position: DVec2) -> NodeId {
        self.nodes.push(TrackNode {
            position: position,
            neighbors: SmallVec::new(),
            signal: None,
            occupants: SmallVec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn link(&mut self, a: NodeId, b: NodeId) -> Result<(), TopologyError> {
        self.check_node(a)?;
        self.check_node(b)?;
        if a == b {
            return Err(TopologyError::SelfLink(a));
        }
        if self.nodes[a].neighbors.contains(&b) {
            return Err(TopologyError::DuplicateLink(a, b));
        }
        if self.distance_to_track(a, b) < MIN_LINK_LENGTH {
            return Err(TopologyError::ZeroLength(a, b));
        }
        self.nodes[a].neighbors.push(b);
        self.nodes[b].neighbors.push(a);
        Ok(())
    }

    pub fn add_signal(&mut self, node: NodeId) -> Result<SignalId, TopologyError> {
        self.check_node(node)?;
        if let Some(existing) = self.nodes[node].signal {
            return Err(TopologyError::SignalTaken(node, existing));
        }
        self.signals.push(Signal::new(node));
        let id = self.signals.len() - 1;
        self.nodes[node].signal = Some(id);
        Ok(id)
    }

    fn check_node(&self, node: NodeId) -> Result<(), TopologyError> {
        if node < self.nodes.len() { Ok(()) } else { Err(TopologyError::UnknownNode(node)) }
    }

    /// Every node must continue somewhere whichever way a train arrives.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.neighbors.len() < 2 {
                return Err(TopologyError::DeadEnd(idx));
            }
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[TrackNode] {
        &self.nodes
    }

    pub fn node(&self, node: NodeId) -> &TrackNode {
        &self.nodes[node]
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signal(&self, signal: SignalId) -> &Signal {
        &self.signals[signal]
    }

    pub fn signal_mut(&mut self, signal: SignalId) -> &mut Signal {
        &mut self.signals[signal]
    }

    pub fn position(&self, node: NodeId) -> DVec2 {
        self.nodes[node].position
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.nodes[a].neighbors.contains(&b)
    }

    pub fn distance_to_track(&self, a: NodeId, b: NodeId) -> f64 {
        self.nodes[a].position.distance(self.nodes[b].position)
    }

    pub fn distance_to_position(&self, node: NodeId, position: DVec2) -> f64 {
        self.nodes[node].position.distance(position)
    }

    /// The node following `node` for a train that arrived from `previous`.
    ///
    /// With two neighbours this is simply the other one; with more, the
    /// branch policy decides. On an (unvalidated) dead end the way back is
    /// the only way on.
    pub fn next_track(&self, node: NodeId, previous: NodeId) -> NodeId {
        let candidates: SmallVec<[NodeId; 3]> = self.nodes[node]
            .neighbors
            .iter()
            .cloned()
            .filter(|&n| n != previous)
            .collect();
        match candidates.len() {
            0 => previous,
            1 => candidates[0],
            _ => self.policy.choose(self, node, previous, &candidates),
        }
    }

    /// Change one aspect of a signal. Returns the engines to notify.
    pub fn set_signal_state(&mut self, signal: SignalId, approach: NodeId, state: SignalState)
                            -> Result<Listeners<TrainId>, TopologyError> {
        if signal >= self.signals.len() {
            return Err(TopologyError::UnknownSignal(signal));
        }
        self.check_node(approach)?;
        let listeners = self.signals[signal].set_state(approach, state);
        self.log(InfrastructureLogEvent::Aspect(signal, approach, state));
        Ok(listeners)
    }

    /// Returns false if the car was already registered on the node.
    pub fn car_enter(&mut self, node: NodeId, car: CarRef) -> bool {
        let occupants = &mut self.nodes[node].occupants;
        if occupants.contains(&car) {
            return false;
        }
        occupants.push(car);
        self.log(InfrastructureLogEvent::Occupied(node, car, true));
        true
    }

    /// Returns false if the car was not registered on the node.
    pub fn car_exit(&mut self, node: NodeId, car: CarRef) -> bool {
        let occupants = &mut self.nodes[node].occupants;
        let before = occupants.len();
        occupants.retain(|c| *c != car);
        if occupants.len() == before {
            return false;
        }
        self.log(InfrastructureLogEvent::Occupied(node, car, false));
        true
    }

    pub fn is_occupied(&self, node: NodeId) -> bool {
        !self.nodes[node].occupants.is_empty()
    }

    /// A train's head has reached `node`. Returns the signal guarding it, if any.
    pub fn enter_track(&mut self, node: NodeId, train: TrainId, previous: NodeId) -> Option<SignalId> {
        debug!("Train {} entered node {} from {}", train, node, previous);
        self.nodes[node].signal
    }
}
