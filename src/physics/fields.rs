use crate::discretization::mesh::Mesh;
use crate::physics::kinetics::ButlerVolmer;
use crate::physics::levelset::InterfaceGeometry;
use serde::{Deserialize, Serialize};

/// A swept cell field with its value at the start of the current step.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Vec<f64>,
    pub old: Vec<f64>,
}

impl Variable {
    pub fn uniform(n: usize, value: f64) -> Self {
        Self {
            value: vec![value; n],
            old: vec![value; n],
        }
    }

    pub fn update_old(&mut self) {
        self.old.clone_from(&self.value);
    }

    pub fn restore(&mut self) {
        self.value.clone_from(&self.old);
    }
}

/// All mutable state of a run.
#[derive(Debug, Clone)]
pub struct FieldStore {
    pub potential: Variable,
    pub cupric: Variable,
    pub suppressor: Variable,
    /// Suppressor coverage; only meaningful on interface cells.
    pub theta: Variable,
    pub distance: Vec<f64>,
    /// Distance before the step's advection.
    pub distance_old: Vec<f64>,
    pub extension: Vec<f64>,
    /// Working-electrode potential against the reference electrode. Fixed
    /// unless a target current is set.
    pub applied_potential: f64,
    pub applied_potential_old: f64,
}

/// Plain copy of the primary fields, for restarts and final output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub distance: Vec<f64>,
    pub potential: Vec<f64>,
    pub cupric: Vec<f64>,
    pub suppressor: Vec<f64>,
    pub theta: Vec<f64>,
    pub applied_potential: f64,
}

/// Quantities recomputed from the live fields on demand.
#[derive(Debug, Clone)]
pub struct Derived {
    pub interface: InterfaceGeometry,
    pub interface_theta: Vec<f64>,
    /// Current at bulk concentration, `I0·(e^{cf ψ} − e^{−cb ψ})`.
    pub base_current: Vec<f64>,
    pub current_density: Vec<f64>,
    pub current_derivative: Vec<f64>,
    pub deposition_rate: Vec<f64>,
}

impl Derived {
    /// Interface integral of the current density.
    pub fn total_current(&self) -> f64 {
        self.interface.integrate(&self.current_density)
    }
}

impl FieldStore {
    /// Fields at rest: the electrolyte potential sits at `-applied_potential`
    /// everywhere and both species at their bulk values.
    pub fn new(n: usize, applied_potential: f64, cupric: f64, suppressor: f64, distance: Vec<f64>) -> Self {
        Self {
            potential: Variable::uniform(n, -applied_potential),
            cupric: Variable::uniform(n, cupric),
            suppressor: Variable::uniform(n, suppressor),
            theta: Variable::uniform(n, 0.0),
            distance_old: distance.clone(),
            distance,
            extension: vec![0.0; n],
            applied_potential,
            applied_potential_old: applied_potential,
        }
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    fn swept_mut(&mut self) -> [&mut Variable; 4] {
        [
            &mut self.potential,
            &mut self.cupric,
            &mut self.suppressor,
            &mut self.theta,
        ]
    }

    pub fn update_old(&mut self) {
        self.swept_mut().into_iter().for_each(Variable::update_old);
        self.applied_potential_old = self.applied_potential;
    }

    pub fn snapshot_distance(&mut self) {
        self.distance_old.clone_from(&self.distance);
    }

    /// Undo the current step: swept fields from old, distance from its snapshot.
    pub fn rollback(&mut self) {
        self.swept_mut().into_iter().for_each(Variable::restore);
        self.applied_potential = self.applied_potential_old;
        self.distance.clone_from(&self.distance_old);
    }

    pub fn state(&self) -> FieldState {
        FieldState {
            distance: self.distance.clone(),
            potential: self.potential.value.clone(),
            cupric: self.cupric.value.clone(),
            suppressor: self.suppressor.value.clone(),
            theta: self.theta.value.clone(),
            applied_potential: self.applied_potential,
        }
    }

    /// Load a saved state into both live and old copies.
    pub fn restore(&mut self, state: FieldState) {
        self.potential = Variable { old: state.potential.clone(), value: state.potential };
        self.cupric = Variable { old: state.cupric.clone(), value: state.cupric };
        self.suppressor = Variable { old: state.suppressor.clone(), value: state.suppressor };
        self.theta = Variable { old: state.theta.clone(), value: state.theta };
        self.applied_potential = state.applied_potential;
        self.applied_potential_old = state.applied_potential;
        self.distance_old = state.distance.clone();
        self.distance = state.distance;
    }

    pub fn derived(&self, mesh: &Mesh, kinetics: &ButlerVolmer) -> Derived {
        let interface = InterfaceGeometry::new(mesh, &self.distance);
        let n = self.len();
        let interface_theta: Vec<f64> = (0..n)
            .map(|p| if interface.flag[p] { self.theta.value[p].min(1.0) } else { 0.0 })
            .collect();

        let mut base_current = vec![0.0; n];
        let mut current_density = vec![0.0; n];
        let mut current_derivative = vec![0.0; n];
        let mut deposition_rate = vec![0.0; n];
        for p in 0..n {
            let (base, dbase) = kinetics.base_current(self.potential.value[p], interface_theta[p]);
            let cbar = self.cupric.value[p] / kinetics.bulk_cupric;
            base_current[p] = base;
            current_density[p] = cbar * base;
            current_derivative[p] = cbar * dbase;
            deposition_rate[p] = kinetics.deposition_rate(current_density[p]);
        }

        Derived {
            interface,
            interface_theta,
            base_current,
            current_density,
            current_derivative,
            deposition_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_old_values_exactly() {
        let mut store = FieldStore::new(3, -0.25, 1000.0, 0.02, vec![-1.0, 0.5, 1.5]);
        assert_eq!(store.potential.value, vec![0.25; 3]);
        store.update_old();
        store.snapshot_distance();
        let before = store.state();

        store.potential.value[1] = 0.1234;
        store.theta.value[1] = 0.7;
        store.applied_potential = -0.2;
        store.distance[1] = -0.1;
        store.rollback();

        assert_eq!(store.state(), before);
    }
}
