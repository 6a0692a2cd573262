use crate::numerics::sparse::{CsrExt, CsrMatrix};
use kryst::context::ksp_context::Workspace;
use kryst::matrix::op::CsrOp;
use kryst::parallel::{NoComm, UniverseComm};
use kryst::preconditioner::PcSide;
use kryst::solver::bicgstab::BiCgStabSolver;
use kryst::solver::LinearSolver as _;
use nalgebra::DVector;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("linear solve failed")]
    LinearSolveFailed,
    #[error("iterative solve did not converge after {iterations} iterations (residual {residual:.3e})")]
    NonConvergence { iterations: usize, residual: f64 },
    #[error("linear system contains NaN or Inf")]
    NonFinite,
}

/// Which linear solver handles an assembled system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinearSolverKind {
    /// Dense LU up to `dense_limit` unknowns, BiCGStab above.
    #[default]
    Auto,
    Lu,
    BiCgStab,
}

#[derive(Debug, Clone)]
pub struct LinearSolver {
    pub kind: LinearSolverKind,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub dense_limit: usize,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self {
            kind: LinearSolverKind::Auto,
            tolerance: 1e-9,
            max_iterations: 5000,
            dense_limit: 600,
        }
    }
}

pub struct SolveStats {
    pub method: &'static str,
    pub relative_residual: f64,
}

impl LinearSolver {
    /// Solve `A x = b`, using `x` as the initial guess for iterative methods.
    pub fn solve(&self, a: &CsrMatrix, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
        if !b.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        let stats = self.dispatch(a, b, x)?;
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        log::trace!(
            "linear solve ({}): n = {}, nnz = {}, rel. residual = {:.3e}",
            stats.method,
            a.dim(),
            a.stored_entries(),
            stats.relative_residual
        );
        Ok(stats)
    }

    fn dispatch(&self, a: &CsrMatrix, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
        if a.is_diagonal() {
            return solve_diagonal(a, b, x);
        }
        match self.kind {
            LinearSolverKind::Lu => solve_lu(a, b, x),
            LinearSolverKind::BiCgStab => self.solve_bicgstab(a, b, x),
            LinearSolverKind::Auto if a.dim() <= self.dense_limit => solve_lu(a, b, x),
            LinearSolverKind::Auto => self.solve_bicgstab(a, b, x),
        }
    }

    /// BiCGStab on the Jacobi row-scaled system `D⁻¹A x = D⁻¹b`.
    fn solve_bicgstab(&self, a: &CsrMatrix, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
        let n = a.dim();
        let scale: Vec<f64> = a
            .diagonal_entries()
            .iter()
            .map(|d| if d.abs() < 1e-300 { 1.0 } else { 1.0 / d })
            .collect();
        let scaled = Arc::new(a.row_scaled(&scale));
        let rhs: Vec<f64> = b.iter().zip(&scale).map(|(b, s)| b * s).collect();

        // Residuals are relative to max(|b|, |r0|).
        let initial = scaled.residual_norm(x, &rhs);
        let reference = norm2(&rhs).max(initial).max(f64::MIN_POSITIVE);
        if initial / reference < self.tolerance || initial == 0.0 {
            return Ok(SolveStats {
                method: "bicgstab",
                relative_residual: initial / reference,
            });
        }

        let op = CsrOp::new(Arc::clone(&scaled));
        let mut bicgstab = BiCgStabSolver::new(self.tolerance, self.max_iterations);
        let mut workspace = Workspace::new(n);
        bicgstab.setup_workspace(&mut workspace);
        let outcome = bicgstab.solve(
            &op,
            None,
            rhs.as_slice(),
            &mut *x,
            PcSide::Left,
            &UniverseComm::NoComm(NoComm {}),
            None,
            Some(&mut workspace),
        );

        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        let relative_residual = scaled.residual_norm(x, &rhs) / reference;
        match outcome {
            Ok(stats) if relative_residual <= self.tolerance => {
                log::trace!("bicgstab: {stats:?}");
                Ok(SolveStats {
                    method: "bicgstab",
                    relative_residual,
                })
            }
            Ok(_) => Err(SolverError::NonConvergence {
                iterations: self.max_iterations,
                residual: relative_residual,
            }),
            Err(e) => {
                log::debug!("bicgstab failed: {e:?}");
                Err(SolverError::NonConvergence {
                    iterations: self.max_iterations,
                    residual: relative_residual,
                })
            }
        }
    }
}

fn solve_diagonal(a: &CsrMatrix, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
    for (i, d) in a.diagonal_entries().into_iter().enumerate() {
        if d == 0.0 {
            return Err(SolverError::LinearSolveFailed);
        }
        x[i] = b[i] / d;
    }
    Ok(SolveStats {
        method: "diagonal",
        relative_residual: 0.0,
    })
}

fn solve_lu(a: &CsrMatrix, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
    let rhs = DVector::from_column_slice(b);
    let solution = a
        .to_dense_matrix()
        .lu()
        .solve(&rhs)
        .ok_or(SolverError::LinearSolveFailed)?;
    x.copy_from_slice(solution.as_slice());
    Ok(SolveStats {
        method: "lu",
        relative_residual: 0.0,
    })
}

#[inline]
fn norm2(a: &[f64]) -> f64 {
    a.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::sparse::CsrBuilder;
    use approx::assert_relative_eq;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut b = CsrBuilder::new(n);
        for i in 0..n {
            b.add(i, i, 2.5);
            if i > 0 {
                b.add(i, i - 1, -1.0);
            }
            if i + 1 < n {
                b.add(i, i + 1, -1.2);
            }
        }
        b.build()
    }

    #[test]
    fn bicgstab_agrees_with_lu() {
        let a = laplacian_1d(40);
        let rhs: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin()).collect();

        let mut x_lu = vec![0.0; 40];
        LinearSolver { kind: LinearSolverKind::Lu, ..Default::default() }
            .solve(&a, &rhs, &mut x_lu)
            .unwrap();
        let mut x_it = vec![0.0; 40];
        LinearSolver { kind: LinearSolverKind::BiCgStab, tolerance: 1e-12, ..Default::default() }
            .solve(&a, &rhs, &mut x_it)
            .unwrap();

        for (a, b) in x_lu.iter().zip(&x_it) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn iteration_budget_is_reported() {
        let a = laplacian_1d(200);
        let rhs = vec![1.0; 200];
        let mut x = vec![0.0; 200];
        let err = LinearSolver {
            kind: LinearSolverKind::BiCgStab,
            tolerance: 1e-14,
            max_iterations: 2,
            ..Default::default()
        }
        .solve(&a, &rhs, &mut x);
        assert!(matches!(err, Err(SolverError::NonConvergence { .. })));
    }

    #[test]
    fn singular_dense_system_fails() {
        let mut b = CsrBuilder::new(2);
        b.add(0, 0, 1.0);
        b.add(0, 1, 1.0);
        b.add(1, 0, 1.0);
        b.add(1, 1, 1.0);
        let a = b.build();
        let mut x = vec![0.0; 2];
        let err = LinearSolver { kind: LinearSolverKind::Lu, ..Default::default() }.solve(&a, &[1.0, 2.0], &mut x);
        assert!(matches!(err, Err(SolverError::LinearSolveFailed) | Err(SolverError::NonFinite)));
    }
}
