//! Level-set simulation of copper superfill in trenches, vias and annular
//! features: a moving deposit/electrolyte interface advanced by the local
//! deposition rate, coupled to electrolyte potential, cupric and suppressor
//! transport and suppressor coverage of the interface.

pub mod discretization;
pub mod error;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use error::{Result, SimulationError};
pub use models::electrofill::{ElectrofillSystem, SimulationParams};
