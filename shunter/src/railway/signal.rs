use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::eventsim::observable::{Listeners, Observable};
use super::infrastructure::{NodeId, TrainId};

pub type SignalId = usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SignalState {
    None,
    Red,
    Yellow,
    Green,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            SignalState::None => "none",
            SignalState::Red => "red",
            SignalState::Yellow => "yellow",
            SignalState::Green => "green",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SignalState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SignalState::None),
            "red" => Ok(SignalState::Red),
            "yellow" => Ok(SignalState::Yellow),
            "green" => Ok(SignalState::Green),
            _ => Err(format!("unknown signal state \"{}\"", s)),
        }
    }
}

/// One change of aspect, as delivered to watching engines.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalChange {
    pub signal: SignalId,
    pub approach: NodeId,
    pub state: SignalState,
}

/// Aspect shown per approach, keyed by the neighbour the train comes from.
pub type Aspects = SmallVec<[(NodeId, SignalState); 2]>;

/// A signal bound to a track node. The same signal can show different
/// aspects to trains approaching from different neighbours; approaches
/// that were never set show `None`.
#[derive(Debug, Clone)]
pub struct Signal {
    pub node: NodeId,
    aspects: Observable<Aspects, TrainId>,
}

impl Signal {
    pub fn new(node: NodeId) -> Signal {
        Signal {
            node: node,
            aspects: Observable::new(SmallVec::new()),
        }
    }

    pub fn state(&self, approach: NodeId) -> SignalState {
        self.aspects
            .get()
            .iter()
            .find(|&&(n, _)| n == approach)
            .map(|&(_, s)| s)
            .unwrap_or(SignalState::None)
    }

    pub fn aspects(&self) -> &[(NodeId, SignalState)] {
        self.aspects.get()
    }

    /// Change the aspect for one approach. Returns the engines that were
    /// watching at the time of the change; the caller must notify them.
    pub fn set_state(&mut self, approach: NodeId, state: SignalState) -> Listeners<TrainId> {
        self.aspects.update(|aspects| {
            match aspects.iter_mut().find(|entry| entry.0 == approach) {
                Some(entry) => entry.1 = state,
                None => aspects.push((approach, state)),
            }
        })
    }

    pub fn subscribe(&mut self, train: TrainId) -> bool {
        self.aspects.subscribe(train)
    }

    pub fn unsubscribe(&mut self, train: TrainId) -> bool {
        self.aspects.unsubscribe(train)
    }

    pub fn is_watched_by(&self, train: TrainId) -> bool {
        self.aspects.is_subscribed(train)
    }

    pub fn watchers(&self) -> &[TrainId] {
        self.aspects.listeners()
    }
}
