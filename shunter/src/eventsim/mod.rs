//! Tick driver and change notification.

pub mod observable;
pub mod simulation;

pub use self::simulation::{Simulation, Stepper};
