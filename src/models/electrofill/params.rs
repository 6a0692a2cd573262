use crate::error::{Result, SimulationError};
use crate::numerics::solver::{LinearSolver, LinearSolverKind};
use crate::numerics::Tolerance;
use crate::physics::kinetics::{ButlerVolmer, KineticConstants};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which feature is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// Planar trench, symmetric about `x = 0`.
    Trench,
    /// Cylindrical via on the axis.
    Via,
    /// Annular via between `rinner` and `router`.
    Annular,
}

/// Optional fields written with every snapshot, in addition to distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteFields {
    pub potential: bool,
    pub cupric: bool,
    pub suppressor: bool,
    pub theta: bool,
    pub extension: bool,
}

impl Default for WriteFields {
    fn default() -> Self {
        Self {
            potential: false,
            cupric: true,
            suppressor: true,
            theta: true,
            extension: false,
        }
    }
}

/// Flat parameter set of a run. Every field has a default, so a JSON file
/// only needs the values that differ. SI units throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    // geometry
    pub geometry: GeometryKind,
    pub feature_depth: f64,
    pub rinner: f64,
    pub router: f64,
    pub rboundary: f64,
    /// Boundary-layer thickness above the field.
    pub delta: f64,
    /// Distance to the reference electrode.
    pub delta_ref: f64,
    /// Cells across the feature depth.
    pub nx: usize,
    /// Fine spacing; overrides `feature_depth / nx` and is required for a flat substrate.
    pub fine_spacing: Option<f64>,
    pub spacing_ratio: f64,

    // kinetics and transport
    /// Applied potential; the starting value when `current` is set.
    pub applied_potential: f64,
    /// Target total current (interface integral of the current density).
    /// When set, the applied potential is adjusted every sweep to meet it.
    pub current: Option<f64>,
    pub i0: f64,
    pub i1: f64,
    pub alpha: f64,
    pub charge: f64,
    pub faradays_constant: f64,
    pub gas_constant: f64,
    pub temperature: f64,
    pub bulk_cupric: f64,
    pub bulk_suppressor: f64,
    pub diffusion_cupric: f64,
    pub diffusion_suppressor: f64,
    pub kappa: f64,
    pub capacitance: f64,
    pub k_plus: f64,
    pub k_minus: f64,
    pub omega: f64,
    pub gamma: f64,

    // stepping
    pub dt: f64,
    pub dt_min: f64,
    pub dt_max: f64,
    pub cfl: f64,
    pub total_steps: usize,
    pub total_time: f64,
    pub sweeps: usize,
    /// Stop sweeping once every equation's residual passes this test.
    pub sweep_tolerance: Option<Tolerance>,
    pub levelset_update_ncell: f64,
    pub delete_islands: bool,
    pub extension_band_cells: f64,
    pub data_frequency: usize,
    pub shutdown_deposition_rate: f64,
    pub write_fields: WriteFields,

    // linear solver
    pub linear_solver: LinearSolverKind,
    pub solver_tolerance: f64,
    pub solver_max_iterations: usize,
    pub dense_limit: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            geometry: GeometryKind::Trench,
            feature_depth: 56e-6,
            rinner: 0.0,
            router: 2.5e-6,
            rboundary: 50e-6,
            delta: 150e-6,
            delta_ref: 0.03,
            nx: 100,
            fine_spacing: None,
            spacing_ratio: 1.1,

            applied_potential: -0.25,
            current: None,
            i0: 40.0,
            i1: -40.0,
            alpha: 0.4,
            charge: 2.0,
            faradays_constant: 9.6485e4,
            gas_constant: 8.314,
            temperature: 298.0,
            bulk_cupric: 1000.0,
            bulk_suppressor: 0.02,
            diffusion_cupric: 2.65e-10,
            diffusion_suppressor: 9.2e-11,
            kappa: 15.26,
            capacitance: 0.3,
            k_plus: 150.0,
            k_minus: 2.45e7,
            omega: 7.1e-6,
            gamma: 2.5e-7,

            dt: 0.5e-7,
            dt_min: 0.5e-7,
            dt_max: 1e20,
            cfl: 0.1,
            total_steps: 1000,
            total_time: 1e20,
            sweeps: 5,
            sweep_tolerance: None,
            levelset_update_ncell: 5.0,
            delete_islands: true,
            extension_band_cells: 10.0,
            data_frequency: 10,
            shutdown_deposition_rate: 1e-10,
            write_fields: WriteFields::default(),

            linear_solver: LinearSolverKind::Auto,
            solver_tolerance: 1e-9,
            solver_max_iterations: 5000,
            dense_limit: 600,
        }
    }
}

impl SimulationParams {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("delta", self.delta),
            ("spacing_ratio", self.spacing_ratio - 1.0),
            ("faradays_constant", self.faradays_constant),
            ("gas_constant", self.gas_constant),
            ("temperature", self.temperature),
            ("charge", self.charge),
            ("bulk_cupric", self.bulk_cupric),
            ("diffusion_cupric", self.diffusion_cupric),
            ("diffusion_suppressor", self.diffusion_suppressor),
            ("kappa", self.kappa),
            ("dt", self.dt),
            ("dt_min", self.dt_min),
            ("cfl", self.cfl),
            ("total_time", self.total_time),
            ("extension_band_cells", self.extension_band_cells),
            ("solver_tolerance", self.solver_tolerance),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(SimulationError::config(format!("{name} must be positive")));
        }
        if self.dt_max < self.dt_min {
            return Err(SimulationError::config("dt_max must not be smaller than dt_min"));
        }
        if self.feature_depth < 0.0 {
            return Err(SimulationError::config("feature_depth must not be negative"));
        }
        if self.feature_depth == 0.0 && self.fine_spacing.is_none() {
            return Err(SimulationError::config(
                "a flat substrate (feature_depth = 0) needs fine_spacing",
            ));
        }
        if self.feature_depth > 0.0 && self.nx == 0 && self.fine_spacing.is_none() {
            return Err(SimulationError::config("nx must be at least 1"));
        }
        if let Some(h) = self.fine_spacing {
            if !(h.is_finite() && h > 0.0) {
                return Err(SimulationError::config("fine_spacing must be positive"));
            }
        }
        if !(0.0..2.0).contains(&self.alpha) {
            return Err(SimulationError::config("alpha must lie in [0, 2)"));
        }
        if self.rinner < 0.0 || self.router < self.rinner || self.rboundary <= self.router {
            return Err(SimulationError::config(
                "expected 0 <= rinner <= router < rboundary",
            ));
        }
        if self.geometry == GeometryKind::Via && self.rinner != 0.0 {
            return Err(SimulationError::config("a via has rinner = 0"));
        }
        if self.delta_ref <= self.delta {
            return Err(SimulationError::config(
                "the reference electrode must lie beyond the boundary layer",
            ));
        }
        if self.sweeps == 0 || self.data_frequency == 0 {
            return Err(SimulationError::config("sweeps and data_frequency must be at least 1"));
        }
        if let Some(target) = self.current {
            if !target.is_finite() {
                return Err(SimulationError::config("current must be finite"));
            }
            if self.applied_potential == 0.0 {
                return Err(SimulationError::config(
                    "a galvanostatic run needs a non-zero starting applied_potential",
                ));
            }
        }
        if self.levelset_update_ncell < 0.0 {
            return Err(SimulationError::config("levelset_update_ncell must not be negative"));
        }
        Ok(())
    }

    /// Spacing of the fine region.
    pub fn nominal_dx(&self) -> f64 {
        match self.fine_spacing {
            Some(h) => h,
            None => self.feature_depth / self.nx as f64,
        }
    }

    /// Steps between reinitializations, `max(1, floor(levelset_update_ncell / cfl))`.
    pub fn reinitialization_interval(&self) -> usize {
        ((self.levelset_update_ncell / self.cfl).floor() as usize).max(1)
    }

    pub fn kinetics(&self) -> ButlerVolmer {
        ButlerVolmer::from(KineticConstants {
            i0: self.i0,
            i1: self.i1,
            alpha: self.alpha,
            charge: self.charge,
            faradays_constant: self.faradays_constant,
            gas_constant: self.gas_constant,
            temperature: self.temperature,
            bulk_cupric: self.bulk_cupric,
            omega: self.omega,
        })
    }

    pub fn linear_solver(&self) -> LinearSolver {
        LinearSolver {
            kind: self.linear_solver,
            tolerance: self.solver_tolerance,
            max_iterations: self.solver_max_iterations,
            dense_limit: self.dense_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = SimulationParams::default();
        params.validate().unwrap();
        assert_eq!(params.reinitialization_interval(), 50);
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let params = SimulationParams::from_json_str(
            r#"{ "geometry": "via", "k_plus": 0.0, "linear_solver": "bicgstab", "write_fields": { "extension": true } }"#,
        )
        .unwrap();
        assert_eq!(params.geometry, GeometryKind::Via);
        assert_eq!(params.k_plus, 0.0);
        assert_eq!(params.linear_solver, LinearSolverKind::BiCgStab);
        assert!(params.write_fields.extension);
        assert!(params.write_fields.cupric);
        assert_eq!(params.kappa, 15.26);
    }

    #[test]
    fn flat_substrate_needs_fine_spacing() {
        let params = SimulationParams {
            feature_depth: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(SimulationError::Configuration(_))));
    }

    #[test]
    fn sweep_tolerance_and_target_current_read_from_json() {
        let params = SimulationParams::from_json_str(
            r#"{ "current": 2.5e-3, "sweep_tolerance": { "combined": [1e-10, 1e-4] } }"#,
        )
        .unwrap();
        assert_eq!(params.current, Some(2.5e-3));
        assert_eq!(params.sweep_tolerance, Some(Tolerance::Combined(1e-10, 1e-4)));
    }

    #[test]
    fn galvanostatic_runs_need_a_starting_potential() {
        let params = SimulationParams {
            current: Some(1e-3),
            applied_potential: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(SimulationError::Configuration(_))));
    }

    #[test]
    fn malformed_json_is_a_params_error() {
        assert!(matches!(
            SimulationParams::from_json_str("{ \"cfl\": "),
            Err(SimulationError::Params(_))
        ));
    }
}
