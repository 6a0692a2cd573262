pub mod bc;
pub mod fields;
pub mod functional;
pub mod kinetics;
pub mod levelset;

use crate::discretization::mesh::Mesh;
use crate::error::Result;

/// Defines the contract for one field equation of a coupled system.
///
/// `S` is the state the equation reads and updates. Equations reference, not
/// own, their variable.
pub trait Equation<S> {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Linearize at the current iterate and solve once. Returns the residual
    /// of the linearized system at the iterate before the solve.
    fn sweep(&self, mesh: &Mesh, state: &mut S, dt: f64) -> Result<f64>;
}
