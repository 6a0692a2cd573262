use approx::assert_relative_eq;
use superfill::models::electrofill::params::GeometryKind;
use superfill::numerics::solver::{LinearSolverKind, SolverError};
use superfill::numerics::transient::{MovingBoundaryModel, Termination};
use superfill::processing::snapshot::MemorySnapshotWriter;
use superfill::{ElectrofillSystem, SimulationError, SimulationParams};

/// A flat deposit under a thin boundary layer, with the front held still
/// (negligible molar volume) and no suppressor adsorption.
fn flat_substrate() -> SimulationParams {
    SimulationParams {
        geometry: GeometryKind::Trench,
        feature_depth: 0.0,
        fine_spacing: Some(1e-6),
        router: 2.5e-6,
        rboundary: 10e-6,
        delta: 20e-6,
        k_plus: 0.0,
        omega: 1e-30,
        dt: 1e6,
        total_steps: 1,
        sweeps: 12,
        linear_solver: LinearSolverKind::Lu,
        ..Default::default()
    }
}

#[test]
fn cupric_depletion_matches_the_film_model() {
    let params = flat_substrate();
    let mut system = ElectrofillSystem::new(params.clone()).unwrap();
    let mut writer = MemorySnapshotWriter::default();
    let report = system.run(&mut writer).unwrap();
    assert_eq!(report.termination, Termination::StepLimit);
    assert_eq!(report.rejections(), 0);

    let derived = system.derived();
    let y_top = *system.mesh.y_faces().last().unwrap();
    let film = params.diffusion_cupric * params.charge * params.faradays_constant * params.bulk_cupric;

    let interface: Vec<usize> = (0..system.mesh.num_cells())
        .filter(|&p| derived.interface.flag[p])
        .collect();
    assert_eq!(interface.len(), system.mesh.nx);
    for p in interface {
        let cell = &system.mesh.cells[p];
        let delta = y_top - cell.centroid.y;
        let current = derived.base_current[p];
        assert!(current > 0.0);
        let expected = 1.0 / (1.0 + current * delta / film);
        let ratio = system.fields.cupric.value[p] / params.bulk_cupric;
        assert_relative_eq!(ratio, expected, max_relative = 1e-3);
        assert!(ratio < 0.95, "boundary layer should deplete cupric, got {ratio}");
    }
    assert!(system.fields.theta.value.iter().all(|t| *t == 0.0));
    assert!(report.history[0].total_current > 0.0);
}

#[test]
fn rollback_restores_the_step_start_exactly() {
    let params = SimulationParams {
        dt: 1e-3,
        sweeps: 2,
        k_plus: 150.0,
        ..flat_substrate()
    };
    let mut system = ElectrofillSystem::new(params).unwrap();
    system.update_old();
    system.snapshot_distance();
    let before = system.state();

    system.extend();
    system.advect(1e-3).unwrap();
    system.sweep(1e-3).unwrap();
    assert_ne!(system.state(), before);

    system.rollback();
    assert_eq!(system.state(), before);
}

#[test]
fn restart_state_must_match_the_mesh() {
    let mut system = ElectrofillSystem::new(flat_substrate()).unwrap();
    let saved = system.state();
    system.fields.cupric.value.iter_mut().for_each(|c| *c *= 0.5);
    system.restore(saved.clone()).unwrap();
    assert_eq!(system.state(), saved);
    assert_eq!(system.fields.cupric.old, saved.cupric);
}

#[test]
fn target_current_sets_the_applied_potential() {
    // Reference electrode at the edge of the boundary layer: negligible ohmic drop.
    let base = SimulationParams {
        delta_ref: 20e-6 + 1e-6,
        sweeps: 30,
        ..flat_substrate()
    };
    let potentiostatic = ElectrofillSystem::new(base.clone()).unwrap();
    let n = potentiostatic.mesh.num_cells();
    let area = potentiostatic.derived().interface.integrate(&vec![1.0; n]);
    let target = 500.0 * area;

    let params = SimulationParams {
        current: Some(target),
        ..base
    };
    let mut system = ElectrofillSystem::new(params.clone()).unwrap();
    let mut writer = MemorySnapshotWriter::default();
    let report = system.run(&mut writer).unwrap();

    assert_relative_eq!(system.derived().total_current(), target, max_relative = 1e-4);
    assert_relative_eq!(report.history[0].total_current, target, max_relative = 1e-4);
    // Half the potentiostatic current needs a smaller overpotential.
    assert!(system.fields.applied_potential > params.applied_potential);
    assert!(system.fields.applied_potential < 0.0);
    assert!(report.history.iter().all(|r| r.residuals.len() == 5));
}

#[test]
fn a_failed_linear_solve_ends_the_run() {
    let params = SimulationParams {
        linear_solver: LinearSolverKind::BiCgStab,
        solver_max_iterations: 1,
        solver_tolerance: 1e-15,
        ..flat_substrate()
    };
    let mut system = ElectrofillSystem::new(params).unwrap();
    let mut writer = MemorySnapshotWriter::default();
    match system.run(&mut writer) {
        Err(SimulationError::SolverDivergence { equation, source }) => {
            assert_eq!(equation, "potential");
            assert!(matches!(source, SolverError::NonConvergence { .. }));
        }
        Err(other) => panic!("expected a solver divergence, got {other}"),
        Ok(report) => panic!("run finished after {} steps", report.steps),
    }
    assert_eq!(writer.records.keys().copied().collect::<Vec<_>>(), [0]);
}
