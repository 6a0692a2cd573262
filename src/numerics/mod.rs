pub mod solver;
pub mod sparse;
pub mod timing;
pub mod transient;

use serde::{Deserialize, Serialize};

/// Residual exit test. `Relative` compares against the first-sweep residual;
/// `Combined` passes when either bound holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Absolute(f64),
    Relative(f64),
    Combined(f64, f64),
}

impl Tolerance {
    pub fn check(&self, norm: f64, initial_norm: f64) -> bool {
        let relative = |tol: f64| initial_norm == 0.0 || norm / initial_norm < tol;
        match *self {
            Tolerance::Absolute(tol) => norm < tol,
            Tolerance::Relative(tol) => relative(tol),
            Tolerance::Combined(abs_tol, rel_tol) => norm < abs_tol || relative(rel_tol),
        }
    }
}

/// How many coupled sweeps a time step performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepPolicy {
    /// Always exactly this many sweeps.
    Fixed(usize),
    /// Up to `max_sweeps`, stopping early once every equation's residual
    /// meets `tolerance` against its first-sweep residual.
    Converge { max_sweeps: usize, tolerance: Tolerance },
}

impl SweepPolicy {
    pub fn max_sweeps(&self) -> usize {
        match *self {
            SweepPolicy::Fixed(n) => n,
            SweepPolicy::Converge { max_sweeps, .. } => max_sweeps,
        }
    }

    /// Whether sweeping can stop after `residuals`, given the first sweep's.
    pub fn converged(&self, residuals: &[f64], initial: &[f64]) -> bool {
        match self {
            SweepPolicy::Fixed(_) => false,
            SweepPolicy::Converge { tolerance, .. } => residuals
                .iter()
                .zip(initial)
                .all(|(r, r0)| tolerance.check(*r, *r0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_exit_needs_every_equation() {
        let policy = SweepPolicy::Converge {
            max_sweeps: 10,
            tolerance: Tolerance::Relative(1e-3),
        };
        let initial = [1.0, 2.0, 0.0];
        assert!(!policy.converged(&[1e-4, 1.0, 0.0], &initial));
        assert!(policy.converged(&[1e-4, 1e-4, 0.0], &initial));
        assert!(!SweepPolicy::Fixed(3).converged(&[0.0; 3], &initial));
    }

    #[test]
    fn combined_tolerance_accepts_either_bound() {
        let tol = Tolerance::Combined(1e-8, 1e-3);
        assert!(tol.check(5e-9, 1.0));
        assert!(tol.check(5e-4, 1.0));
        assert!(!tol.check(5e-3, 1.0));
        assert!(Tolerance::Absolute(1e-8).check(5e-9, 1e-12));
        assert!(!Tolerance::Absolute(1e-8).check(5e-8, 1.0));
    }

    #[test]
    fn tolerance_reads_from_json() {
        let tol: Tolerance = serde_json::from_str(r#"{"combined": [1e-8, 1e-3]}"#).unwrap();
        assert_eq!(tol, Tolerance::Combined(1e-8, 1e-3));
        let tol: Tolerance = serde_json::from_str(r#"{"relative": 0.01}"#).unwrap();
        assert_eq!(tol, Tolerance::Relative(0.01));
    }
}
