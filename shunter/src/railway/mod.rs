//! Railway simulation.

pub mod infrastructure;
pub mod signal;
pub mod dynamics;
pub mod hooks;
pub mod car;
pub mod engine;
pub mod train;
pub mod world;

pub use self::world::World;
