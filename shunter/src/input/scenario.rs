use glam::DVec2;
use std::collections::HashMap;

use crate::config::SimConfig;
use crate::railway::car::LoadType;
use crate::railway::dynamics::EngineParams;
use crate::railway::hooks::Hooks;
use crate::railway::infrastructure::{NodeId, SwitchTable, Topology, TopologyError, TrainId};
use crate::railway::signal::{SignalId, SignalState};
use crate::railway::train::{CarPlacement, TrainError};
use crate::railway::world::World;

/// A scenario as written, with everything still referred to by name.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub separation: Option<f64>,
    pub nodes: Vec<(String, DVec2)>,
    pub links: Vec<(String, String)>,
    pub signals: Vec<(String, String)>, // signal name, node name
    pub aspects: Vec<AspectSetting>,
    pub switches: Vec<(String, String, String)>, // at node, coming from, going to
    pub intervals: Vec<(LoadType, f64)>,
    pub trains: Vec<TrainSpec>,
    pub cars: Vec<CarSpec>,
    pub events: Vec<TimedEvent>,
    pub run: Option<(f64, f64)>, // duration, time step
}

#[derive(Debug, Clone, PartialEq)]
pub struct AspectSetting {
    pub signal: String,
    pub approach: String,
    pub state: SignalState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSpec {
    pub name: String,
    pub params: EngineParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarSpec {
    pub train: String,
    pub current: String,
    pub target: String,
    pub position: DVec2,
    pub load: Option<LoadType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub time: f64,
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    Aspect(AspectSetting),
    Load { train: String, amount: f64, loading: bool },
    EndLoad { train: String },
}

#[derive(Debug, Fail)]
pub enum ScenarioError {
    #[fail(display = "unknown node \"{}\"", _0)]
    UnknownNode(String),
    #[fail(display = "unknown signal \"{}\"", _0)]
    UnknownSignal(String),
    #[fail(display = "unknown train \"{}\"", _0)]
    UnknownTrain(String),
    #[fail(display = "name \"{}\" is used twice", _0)]
    DuplicateName(String),
    #[fail(display = "train \"{}\" has no cars", _0)]
    NoCars(String),
    #[fail(display = "{}", _0)]
    Topology(#[cause] TopologyError),
    #[fail(display = "train: {}", _0)]
    Train(#[cause] TrainError),
}

impl From<TrainError> for ScenarioError {
    fn from(e: TrainError) -> ScenarioError {
        ScenarioError::Train(e)
    }
}

impl From<TopologyError> for ScenarioError {
    fn from(e: TopologyError) -> ScenarioError {
        ScenarioError::Topology(e)
    }
}

/// Name to index maps for everything in a built world.
#[derive(Debug, Clone, Default)]
pub struct ScenarioNames {
    pub node_names: HashMap<String, NodeId>,
    pub signal_names: HashMap<String, SignalId>,
    pub train_names: HashMap<String, TrainId>,
}

fn lookup(map: &HashMap<String, usize>, n: usize) -> &str {
    map.iter().find(|&(_, v)| *v == n).map(|(k, _)| k.as_str()).unwrap_or("?")
}

impl ScenarioNames {
    pub fn node(&self, name: &str) -> Result<NodeId, ScenarioError> {
        self.node_names.get(name).cloned().ok_or_else(|| ScenarioError::UnknownNode(name.to_string()))
    }

    pub fn signal(&self, name: &str) -> Result<SignalId, ScenarioError> {
        self.signal_names.get(name).cloned().ok_or_else(|| ScenarioError::UnknownSignal(name.to_string()))
    }

    pub fn train(&self, name: &str) -> Result<TrainId, ScenarioError> {
        self.train_names.get(name).cloned().ok_or_else(|| ScenarioError::UnknownTrain(name.to_string()))
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        lookup(&self.node_names, node)
    }

    pub fn signal_name(&self, signal: SignalId) -> &str {
        lookup(&self.signal_names, signal)
    }
}

fn insert_name(map: &mut HashMap<String, usize>, name: &str, idx: usize) -> Result<(), ScenarioError> {
    if map.insert(name.to_string(), idx).is_some() {
        return Err(ScenarioError::DuplicateName(name.to_string()));
    }
    Ok(())
}

impl Scenario {
    pub fn config(&self) -> SimConfig {
        match self.separation {
            Some(s) => SimConfig::with_separation(s),
            None => SimConfig::default(),
        }
    }

    /// Build the track layout with its initial signal aspects and switch
    /// settings.
    pub fn topology(&self, names: &mut ScenarioNames) -> Result<Topology, ScenarioError> {
        let mut topology = Topology::new(self.config());
        for &(ref name, position) in &self.nodes {
            let id = topology.add_node(position);
            insert_name(&mut names.node_names, name, id)?;
        }
        for &(ref a, ref b) in &self.links {
            topology.link(names.node(a)?, names.node(b)?)?;
        }
        for &(ref name, ref node) in &self.signals {
            let id = topology.add_signal(names.node(node)?)?;
            insert_name(&mut names.signal_names, name, id)?;
        }
        for aspect in &self.aspects {
            topology.set_signal_state(names.signal(&aspect.signal)?, names.node(&aspect.approach)?, aspect.state)?;
        }
        if !self.switches.is_empty() {
            let mut table = SwitchTable::default();
            for &(ref at, ref from, ref to) in &self.switches {
                table.settings.insert((names.node(at)?, names.node(from)?), names.node(to)?);
            }
            topology.set_branch_policy(Box::new(table));
        }
        Ok(topology)
    }

    /// Put every train on the track of `world`.
    pub fn place_trains(&self, world: &mut World, names: &mut ScenarioNames) -> Result<(), ScenarioError> {
        for train in &self.trains {
            let mut placements = Vec::new();
            for car in self.cars.iter().filter(|c| c.train == train.name) {
                placements.push(CarPlacement {
                    current: names.node(&car.current)?,
                    target: names.node(&car.target)?,
                    position: car.position,
                    load: car.load,
                });
            }
            let (head, wagons) = match placements.split_first() {
                Some(split) => split,
                None => return Err(ScenarioError::NoCars(train.name.clone())),
            };
            let id = world.add_train(train.name.clone(), train.params, *head, wagons)?;
            insert_name(&mut names.train_names, &train.name, id)?;
        }
        for car in &self.cars {
            names.train(&car.train)?;
        }
        Ok(())
    }

    /// Check that every timed event refers to something that exists.
    pub fn check_events(&self, names: &ScenarioNames) -> Result<(), ScenarioError> {
        for event in &self.events {
            match event.action {
                ScenarioAction::Aspect(ref a) => {
                    names.signal(&a.signal)?;
                    names.node(&a.approach)?;
                }
                ScenarioAction::Load { ref train, .. } | ScenarioAction::EndLoad { ref train } => {
                    names.train(train)?;
                }
            }
        }
        Ok(())
    }

    pub fn build(&self, hooks: Hooks) -> Result<(World, ScenarioNames), ScenarioError> {
        let mut names = ScenarioNames::default();
        let topology = self.topology(&mut names)?;
        let mut world = World::new(topology, hooks)?;
        self.place_trains(&mut world, &mut names)?;
        self.check_events(&names)?;
        Ok((world, names))
    }
}
