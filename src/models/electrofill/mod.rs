//! Copper electrodeposition with a suppressor additive.

pub mod equations;
pub mod geometry;
pub mod params;
pub mod system;

pub use params::SimulationParams;
pub use system::ElectrofillSystem;
