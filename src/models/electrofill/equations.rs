use crate::discretization::mesh::{BoundarySide, Mesh};
use crate::error::{Result, SimulationError};
use crate::models::electrofill::params::SimulationParams;
use crate::numerics::solver::{LinearSolver, SolverError};
use crate::physics::bc::{BCRegistry, GeneralizedBC};
use crate::physics::fields::FieldStore;
use crate::physics::functional::{harmonic_face_values, FunctionalForm};
use crate::physics::kinetics::ButlerVolmer;
use crate::physics::levelset::{advection_source, interface_cells, is_liquid};
use crate::physics::Equation;
use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

/// Residual of each swept equation for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Residuals {
    /// Applied-potential change; only present in galvanostatic runs.
    pub applied_potential: Option<f64>,
    pub potential: f64,
    pub cupric: f64,
    pub suppressor: f64,
    pub theta: f64,
}

impl Residuals {
    /// Residuals in sweep order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.applied_potential
            .into_iter()
            .chain([self.potential, self.cupric, self.suppressor, self.theta])
            .collect()
    }
}

fn diverged(equation: &'static str) -> impl FnOnce(SolverError) -> SimulationError {
    move |source| SimulationError::SolverDivergence { equation, source }
}

/// Electrolyte indicator, harmonically averaged onto faces: zero on every
/// face touching the deposit.
fn electrolyte_faces(mesh: &Mesh, distance: &[f64]) -> Vec<f64> {
    let indicator: Vec<f64> = distance.iter().map(|&d| if is_liquid(d) { 1.0 } else { 0.0 }).collect();
    harmonic_face_values(mesh, &indicator)
}

/// Electrolyte potential with capacitive charging at the interface and a
/// Robin-type coupling to the reference electrode through the top row.
pub struct PotentialEquation {
    kinetics: ButlerVolmer,
    kappa: f64,
    capacitance: f64,
    /// Reference-electrode coupling per unit volume; non-zero on the top row only.
    upper: Vec<f64>,
    solver: LinearSolver,
    bcs: BCRegistry,
}

impl PotentialEquation {
    pub fn new(mesh: &Mesh, params: &SimulationParams) -> Self {
        let mut upper = vec![0.0; mesh.num_cells()];
        let dy_top = mesh.dy[mesh.ny - 1];
        let coupling = params.kappa / dy_top / (params.delta_ref - params.delta + dy_top);
        for p in mesh.top_row() {
            upper[p] = coupling;
        }
        Self {
            kinetics: params.kinetics(),
            kappa: params.kappa,
            capacitance: params.capacitance,
            upper,
            solver: params.linear_solver(),
            bcs: BCRegistry::default(),
        }
    }
}

impl Equation<FieldStore> for PotentialEquation {
    fn name(&self) -> &'static str {
        "potential"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<f64> {
        let derived = fields.derived(mesh, &self.kinetics);
        let surface = &derived.interface.surface;
        let psi = &fields.potential.value;

        let transient: Vec<f64> = surface
            .iter()
            .zip(&fields.distance)
            .map(|(s, &d)| self.capacitance * s + if is_liquid(d) { 0.0 } else { 1.0 })
            .collect();
        let conductance: Vec<f64> = electrolyte_faces(mesh, &fields.distance)
            .into_iter()
            .map(|h| self.kappa * h)
            .collect();
        let explicit = (0..mesh.num_cells()).map(|p| {
            -surface[p] * (derived.current_density[p] - psi[p] * derived.current_derivative[p])
                - self.upper[p] * fields.applied_potential
        });
        let implicit = (0..mesh.num_cells()).map(|p| surface[p] * derived.current_derivative[p] + self.upper[p]);

        let mut value = psi.clone();
        let residual = FunctionalForm::new(mesh, self.name())
            .transient(transient, &fields.potential.old, dt)
            .diffusion(conductance)
            .explicit_source(explicit)
            .implicit_source(implicit)
            .sweep(&self.bcs, &self.solver, &mut value)
            .map_err(diverged(self.name()))?;
        fields.potential.value = value;
        Ok(residual)
    }
}

/// Galvanostatic control: moves the applied potential so that the interface
/// integral of the current density meets a target total current.
///
/// Shifting the applied potential by `e` shifts `ψ` by `-e`, which turns the
/// total current into `b_f·e^{-cf·e} − b_b·e^{cb·e}` with `b_f` and `b_b` the
/// area-weighted forward and backward terms at the present `ψ`. Each sweep
/// solves that balance for `e` and applies at most a tenth of the present
/// applied potential.
pub struct AppliedPotentialEquation {
    kinetics: ButlerVolmer,
    target: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl AppliedPotentialEquation {
    pub fn new(params: &SimulationParams, target: f64) -> Self {
        Self {
            kinetics: params.kinetics(),
            target,
            tolerance: 1e-12,
            max_iterations: 100,
        }
    }

    /// Root of the shifted current balance by Newton with backtracking.
    fn shift(&self, forward: f64, backward: f64) -> std::result::Result<f64, SolverError> {
        let (cf, cb) = (self.kinetics.forward, self.kinetics.backward);
        let balance = |e: f64| {
            let e = Dual64::from_re(e).derivative();
            (e * -cf).exp() * forward - (e * cb).exp() * backward - self.target
        };
        let scale = self.target.abs().max(forward).max(backward);

        let mut e = 0.0;
        let mut f = balance(e);
        for _ in 0..self.max_iterations {
            if f.re.abs() <= self.tolerance * scale {
                return Ok(e);
            }
            let step = -f.re / f.eps;
            let mut alpha = 1.0;
            loop {
                let trial = balance(e + alpha * step);
                // |f| must fall by at least 1e-4·alpha of itself
                if trial.re.is_finite() && trial.re.abs() < (1.0 - 1e-4 * alpha) * f.re.abs() {
                    e += alpha * step;
                    f = trial;
                    break;
                }
                alpha *= 0.5;
                if alpha < 1e-12 {
                    return Err(SolverError::NonConvergence {
                        iterations: self.max_iterations,
                        residual: f.re.abs() / scale,
                    });
                }
            }
        }
        Err(SolverError::NonConvergence {
            iterations: self.max_iterations,
            residual: f.re.abs() / scale,
        })
    }
}

impl Equation<FieldStore> for AppliedPotentialEquation {
    fn name(&self) -> &'static str {
        "applied_potential"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, _dt: f64) -> Result<f64> {
        let derived = fields.derived(mesh, &self.kinetics);
        let (cf, cb) = (self.kinetics.forward, self.kinetics.backward);
        let weight: Vec<f64> = (0..mesh.num_cells())
            .map(|p| {
                fields.cupric.value[p] / self.kinetics.bulk_cupric
                    * self.kinetics.exchange_current(derived.interface_theta[p])
            })
            .collect();
        let term = |rate: f64| -> Vec<f64> {
            weight
                .iter()
                .zip(&fields.potential.value)
                .map(|(w, psi)| w * (rate * psi).exp())
                .collect()
        };
        let forward = derived.interface.integrate(&term(cf));
        let backward = derived.interface.integrate(&term(-cb));
        if forward == 0.0 && backward == 0.0 {
            return Ok(0.0);
        }

        let e = self.shift(forward, backward).map_err(diverged(self.name()))?;
        let delta = e.signum() * e.abs().min(fields.applied_potential.abs() / 10.0);
        fields.applied_potential += delta;
        log::debug!(
            "applied potential {:.6} V, total current {:.4e} (target {:.4e})",
            fields.applied_potential,
            forward - backward,
            self.target
        );
        Ok(delta.abs())
    }
}

/// Cupric ion transport with consumption at the interface. Bulk
/// concentration is held on the top boundary.
pub struct CupricEquation {
    kinetics: ButlerVolmer,
    diffusion: f64,
    consumption: f64,
    solver: LinearSolver,
    bcs: BCRegistry,
}

impl CupricEquation {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            kinetics: params.kinetics(),
            diffusion: params.diffusion_cupric,
            consumption: 1.0 / (params.bulk_cupric * params.charge * params.faradays_constant),
            solver: params.linear_solver(),
            bcs: BCRegistry::default().with(
                "cupric",
                BoundarySide::Top,
                GeneralizedBC::dirichlet(params.bulk_cupric),
            ),
        }
    }
}

impl Equation<FieldStore> for CupricEquation {
    fn name(&self) -> &'static str {
        "cupric"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<f64> {
        let derived = fields.derived(mesh, &self.kinetics);
        let diffusivity: Vec<f64> = electrolyte_faces(mesh, &fields.distance)
            .into_iter()
            .map(|h| self.diffusion * h)
            .collect();
        let sink = derived
            .base_current
            .iter()
            .zip(&derived.interface.surface)
            .map(|(i, s)| i * s * self.consumption);

        let mut value = fields.cupric.value.clone();
        let residual = FunctionalForm::new(mesh, self.name())
            .transient(vec![1.0; mesh.num_cells()], &fields.cupric.old, dt)
            .diffusion(diffusivity)
            .implicit_source(sink)
            .sweep(&self.bcs, &self.solver, &mut value)
            .map_err(diverged(self.name()))?;
        fields.cupric.value = value;
        Ok(residual)
    }
}

/// Suppressor transport with adsorption onto free interface sites.
pub struct SuppressorEquation {
    kinetics: ButlerVolmer,
    diffusion: f64,
    adsorption: f64,
    solver: LinearSolver,
    bcs: BCRegistry,
}

impl SuppressorEquation {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            kinetics: params.kinetics(),
            diffusion: params.diffusion_suppressor,
            adsorption: params.gamma * params.k_plus,
            solver: params.linear_solver(),
            bcs: BCRegistry::default().with(
                "suppressor",
                BoundarySide::Top,
                GeneralizedBC::dirichlet(params.bulk_suppressor),
            ),
        }
    }
}

impl Equation<FieldStore> for SuppressorEquation {
    fn name(&self) -> &'static str {
        "suppressor"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<f64> {
        let derived = fields.derived(mesh, &self.kinetics);
        let diffusivity: Vec<f64> = electrolyte_faces(mesh, &fields.distance)
            .into_iter()
            .map(|h| self.diffusion * h)
            .collect();
        let sink = derived
            .interface_theta
            .iter()
            .zip(&derived.interface.surface)
            .map(|(theta, s)| self.adsorption * (1.0 - theta) * s);

        let mut value = fields.suppressor.value.clone();
        let residual = FunctionalForm::new(mesh, self.name())
            .transient(vec![1.0; mesh.num_cells()], &fields.suppressor.old, dt)
            .diffusion(diffusivity)
            .implicit_source(sink)
            .sweep(&self.bcs, &self.solver, &mut value)
            .map_err(diverged(self.name()))?;
        fields.suppressor.value = value;
        Ok(residual)
    }
}

/// Suppressor coverage on the interface: Langmuir adsorption onto free sites
/// and loss by incorporation into the growing deposit.
///
/// Integrated over a pseudo-time of 1 with the physical `dt` folded into the
/// rate coefficients. Coverage is carried to cells the interface moved into
/// from neighbouring cells the interface occupied at the start of the step.
pub struct ThetaEquation {
    kinetics: ButlerVolmer,
    k_plus: f64,
    k_minus: f64,
    solver: LinearSolver,
    bcs: BCRegistry,
}

impl ThetaEquation {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            kinetics: params.kinetics(),
            k_plus: params.k_plus,
            k_minus: params.k_minus,
            solver: params.linear_solver(),
            bcs: BCRegistry::default(),
        }
    }

    /// Old coverage moved with the interface.
    fn carried(&self, mesh: &Mesh, fields: &FieldStore, now: &[bool]) -> Vec<f64> {
        let before = interface_cells(mesh, &fields.distance_old);
        let old = &fields.theta.old;
        (0..mesh.num_cells())
            .map(|p| {
                if !now[p] {
                    0.0
                } else if before[p] {
                    old[p]
                } else {
                    let (sum, count) = mesh
                        .neighbors(p)
                        .into_iter()
                        .flatten()
                        .filter(|&q| before[q])
                        .fold((0.0, 0usize), |(s, c), q| (s + old[q], c + 1));
                    if count > 0 {
                        sum / count as f64
                    } else {
                        0.0
                    }
                }
            })
            .collect()
    }
}

impl Equation<FieldStore> for ThetaEquation {
    fn name(&self) -> &'static str {
        "theta"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<f64> {
        let derived = fields.derived(mesh, &self.kinetics);
        let flag = &derived.interface.flag;
        let carried = self.carried(mesh, fields, flag);

        let n = mesh.num_cells();
        let adsorption: Vec<f64> = (0..n)
            .map(|p| if flag[p] { dt * self.k_plus * fields.suppressor.value[p] } else { 0.0 })
            .collect();
        let incorporation = (0..n).map(|p| {
            if flag[p] {
                dt * self.k_minus * derived.deposition_rate[p].max(0.0)
            } else {
                0.0
            }
        });

        let mut value = fields.theta.value.clone();
        let residual = FunctionalForm::new(mesh, self.name())
            .transient(vec![1.0; n], &carried, 1.0)
            .explicit_source(adsorption.iter().copied())
            .implicit_source(adsorption.iter().copied())
            .implicit_source(incorporation)
            .sweep(&self.bcs, &self.solver, &mut value)
            .map_err(diverged(self.name()))?;
        fields.theta.value = value;
        Ok(residual)
    }
}

/// Level-set transport by the extension velocity, explicit in time.
pub struct AdvectionEquation {
    solver: LinearSolver,
    bcs: BCRegistry,
}

impl AdvectionEquation {
    pub fn new(params: &SimulationParams) -> Self {
        Self {
            solver: params.linear_solver(),
            bcs: BCRegistry::default(),
        }
    }
}

impl Equation<FieldStore> for AdvectionEquation {
    fn name(&self) -> &'static str {
        "advection"
    }

    fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<f64> {
        let start = fields.distance.clone();
        let rate = advection_source(mesh, &start, &fields.extension);
        let mut value = start.clone();
        let residual = FunctionalForm::new(mesh, self.name())
            .transient(vec![1.0; mesh.num_cells()], &start, dt)
            .explicit_source(rate)
            .sweep(&self.bcs, &self.solver, &mut value)
            .map_err(diverged(self.name()))?;
        fields.distance = value;
        Ok(residual)
    }
}

/// The swept equations, in sweep order, plus level-set advection. The
/// applied-potential equation only exists when a target current is set.
pub struct EquationSet {
    pub applied_potential: Option<AppliedPotentialEquation>,
    pub potential: PotentialEquation,
    pub cupric: CupricEquation,
    pub suppressor: SuppressorEquation,
    pub theta: ThetaEquation,
    pub advection: AdvectionEquation,
}

impl EquationSet {
    pub fn new(mesh: &Mesh, params: &SimulationParams) -> Self {
        Self {
            applied_potential: params
                .current
                .map(|target| AppliedPotentialEquation::new(params, target)),
            potential: PotentialEquation::new(mesh, params),
            cupric: CupricEquation::new(params),
            suppressor: SuppressorEquation::new(params),
            theta: ThetaEquation::new(params),
            advection: AdvectionEquation::new(params),
        }
    }

    /// One sweep of every coupled equation, one residual each.
    pub fn sweep(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<Residuals> {
        let applied_potential = match &self.applied_potential {
            Some(eq) => Some(eq.sweep(mesh, fields, dt)?),
            None => None,
        };
        let potential = self.potential.sweep(mesh, fields, dt)?;
        let cupric = self.cupric.sweep(mesh, fields, dt)?;
        let suppressor = self.suppressor.sweep(mesh, fields, dt)?;
        let theta = self.theta.sweep(mesh, fields, dt)?;
        let residuals = Residuals {
            applied_potential,
            potential,
            cupric,
            suppressor,
            theta,
        };
        log::debug!("sweep residuals: {:?}", residuals.to_vec());
        Ok(residuals)
    }

    pub fn advect(&self, mesh: &Mesh, fields: &mut FieldStore, dt: f64) -> Result<()> {
        self.advection.sweep(mesh, fields, dt).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn potential_shift_meets_the_target_current() {
        let params = SimulationParams::default();
        let eq = AppliedPotentialEquation::new(&params, 5e-4);
        let (forward, backward) = (2e-3, 1e-6);
        let e = eq.shift(forward, backward).unwrap();
        let (cf, cb) = (eq.kinetics.forward, eq.kinetics.backward);
        assert_relative_eq!(
            forward * (-cf * e).exp() - backward * (cb * e).exp(),
            5e-4,
            max_relative = 1e-9
        );
        // less current wanted: the applied potential rises toward zero
        assert!(e > 0.0);
    }

    #[test]
    fn residuals_lead_with_the_applied_potential() {
        let residuals = Residuals {
            applied_potential: Some(0.5),
            potential: 1.0,
            cupric: 2.0,
            suppressor: 3.0,
            theta: 4.0,
        };
        assert_eq!(residuals.to_vec(), [0.5, 1.0, 2.0, 3.0, 4.0]);
        let potentiostatic = Residuals {
            applied_potential: None,
            ..residuals
        };
        assert_eq!(potentiostatic.to_vec().len(), 4);
    }
}
