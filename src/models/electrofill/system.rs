use crate::discretization::mesh::Mesh;
use crate::error::{Result, SimulationError};
use crate::models::electrofill::equations::EquationSet;
use crate::models::electrofill::geometry::{geometry_for, FeatureGeometry};
use crate::models::electrofill::params::SimulationParams;
use crate::numerics::transient::{MovingBoundaryModel, RunReport, StartState, TransientSolver};
use crate::numerics::SweepPolicy;
use crate::physics::fields::{Derived, FieldState, FieldStore};
use crate::physics::kinetics::ButlerVolmer;
use crate::physics::levelset::{delete_islands, extend_velocity, reinitialize};
use crate::processing::snapshot::{Snapshot, SnapshotWriter};
use std::collections::BTreeMap;

/// A fill simulation: mesh, fields and equations for one feature geometry.
pub struct ElectrofillSystem {
    pub params: SimulationParams,
    pub geometry: Box<dyn FeatureGeometry>,
    pub mesh: Mesh,
    pub fields: FieldStore,
    equations: EquationSet,
    kinetics: ButlerVolmer,
}

impl ElectrofillSystem {
    pub fn new(params: SimulationParams) -> Result<Self> {
        let geometry = geometry_for(params.geometry);
        Self::with_geometry(params, geometry)
    }

    /// Set up on an explicit geometry; the initial deposit is whatever the
    /// geometry marks solid at each cell centre.
    pub fn with_geometry(params: SimulationParams, geometry: Box<dyn FeatureGeometry>) -> Result<Self> {
        params.validate()?;
        let mesh = geometry.build_mesh(&params)?;

        let mut distance: Vec<f64> = mesh
            .cells
            .iter()
            .map(|c| {
                if geometry.is_solid(c.centroid.x, c.centroid.y, &params) {
                    -1.0
                } else {
                    1.0
                }
            })
            .collect();
        if !reinitialize(&mesh, &mut distance) {
            return Err(SimulationError::config(format!(
                "{} geometry has no deposit/electrolyte interface on the mesh",
                geometry.name()
            )));
        }

        let fields = FieldStore::new(
            mesh.num_cells(),
            params.applied_potential,
            params.bulk_cupric,
            params.bulk_suppressor,
            distance,
        );
        let equations = EquationSet::new(&mesh, &params);
        let kinetics = params.kinetics();

        log::info!(
            "{} mesh: {} x {} cells, fine spacing {:.3e} m",
            geometry.name(),
            mesh.nx,
            mesh.ny,
            mesh.nominal_dx
        );

        Ok(Self {
            params,
            geometry,
            mesh,
            fields,
            equations,
            kinetics,
        })
    }

    /// Load a saved state for a restart.
    pub fn restore(&mut self, state: FieldState) -> Result<()> {
        let n = self.mesh.num_cells();
        let lengths = [
            state.distance.len(),
            state.potential.len(),
            state.cupric.len(),
            state.suppressor.len(),
            state.theta.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(SimulationError::config(format!(
                "restart state has field lengths {lengths:?}, mesh has {n} cells"
            )));
        }
        self.fields.restore(state);
        Ok(())
    }

    pub fn state(&self) -> FieldState {
        self.fields.state()
    }

    pub fn derived(&self) -> Derived {
        self.fields.derived(&self.mesh, &self.kinetics)
    }

    /// Controller configured from the run parameters.
    pub fn controller(&self) -> TransientSolver {
        let p = &self.params;
        let sweeps = match p.sweep_tolerance {
            Some(tolerance) => SweepPolicy::Converge {
                max_sweeps: p.sweeps,
                tolerance,
            },
            None => SweepPolicy::Fixed(p.sweeps),
        };
        TransientSolver {
            dt_min: p.dt_min,
            dt_max: p.dt_max,
            cfl: p.cfl,
            total_steps: p.total_steps,
            total_time: p.total_time,
            sweeps,
            reinitialize_every: p.reinitialization_interval(),
            delete_islands: p.delete_islands,
            data_frequency: p.data_frequency,
            shutdown_deposition_rate: p.shutdown_deposition_rate,
        }
    }

    pub fn run<W: SnapshotWriter + ?Sized>(&mut self, writer: &mut W) -> Result<RunReport> {
        let start = StartState {
            elapsed: 0.0,
            step: 0,
            dt: self.params.dt,
        };
        self.run_from(writer, start)
    }

    pub fn run_from<W: SnapshotWriter + ?Sized>(&mut self, writer: &mut W, start: StartState) -> Result<RunReport> {
        let controller = self.controller();
        controller.solve(self, writer, start)
    }
}

impl MovingBoundaryModel for ElectrofillSystem {
    fn nominal_dx(&self) -> f64 {
        self.mesh.nominal_dx
    }

    fn update_old(&mut self) {
        self.fields.update_old();
    }

    fn snapshot_distance(&mut self) {
        self.fields.snapshot_distance();
    }

    fn reinitialize(&mut self, delete: bool) {
        if delete {
            delete_islands(&self.mesh, &mut self.fields.distance);
        }
        reinitialize(&self.mesh, &mut self.fields.distance);
    }

    fn extend(&mut self) -> f64 {
        let rate = self.derived().deposition_rate;
        let band = self.params.extension_band_cells * self.mesh.nominal_dx;
        self.fields.extension = extend_velocity(&self.mesh, &self.fields.distance, &rate, band);
        self.fields.extension.iter().cloned().fold(0.0, f64::max)
    }

    fn advect(&mut self, dt: f64) -> Result<()> {
        self.equations.advect(&self.mesh, &mut self.fields, dt)
    }

    fn sweep(&mut self, dt: f64) -> Result<Vec<f64>> {
        let residuals = self.equations.sweep(&self.mesh, &mut self.fields, dt)?;
        Ok(residuals.to_vec())
    }

    fn rollback(&mut self) {
        self.fields.rollback();
    }

    fn total_current(&self) -> f64 {
        self.derived().total_current()
    }

    fn snapshot(&self) -> Snapshot {
        let which = self.params.write_fields;
        let f = &self.fields;
        let mut fields = BTreeMap::new();
        let selected = [
            ("potential", which.potential, &f.potential.value),
            ("cupric", which.cupric, &f.cupric.value),
            ("suppressor", which.suppressor, &f.suppressor.value),
            ("theta", which.theta, &f.theta.value),
            ("extension", which.extension, &f.extension),
        ];
        for (name, keep, values) in selected {
            if keep {
                fields.insert(name.to_string(), values.clone());
            }
        }
        Snapshot {
            nx: self.mesh.nx,
            ny: self.mesh.ny,
            dx: self.mesh.dx.clone(),
            dy: self.mesh.dy.clone(),
            x: self.mesh.cells.iter().map(|c| c.centroid.x).collect(),
            y: self.mesh.cells.iter().map(|c| c.centroid.y).collect(),
            distance: f.distance.clone(),
            fields,
            total_current: self.total_current(),
        }
    }
}
