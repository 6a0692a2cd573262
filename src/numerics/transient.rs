use crate::error::{Result, SimulationError};
use crate::numerics::SweepPolicy;
use crate::processing::snapshot::{Snapshot, SnapshotWriter};
use serde::Serialize;

/// Operations the time-integration controller drives on a moving-boundary
/// model. The controller never looks inside the fields.
pub trait MovingBoundaryModel {
    /// Spacing used in the CFL bound.
    fn nominal_dx(&self) -> f64;

    /// Copy live swept fields into their old companions.
    fn update_old(&mut self);

    /// Save the distance field so a rejected step can restore it.
    fn snapshot_distance(&mut self);

    fn reinitialize(&mut self, delete_islands: bool);

    /// Recompute the extension velocity; returns its global maximum.
    fn extend(&mut self) -> f64;

    fn advect(&mut self, dt: f64) -> Result<()>;

    /// One sweep of every coupled equation; one residual per equation.
    fn sweep(&mut self, dt: f64) -> Result<Vec<f64>>;

    /// Restore swept fields from old and distance from its snapshot.
    fn rollback(&mut self);

    fn total_current(&self) -> f64;

    fn snapshot(&self) -> Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepperState {
    Idle,
    Stepping,
    Accepted,
    RolledBack,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    StepLimit,
    TimeLimit,
    /// Deposition fell below the shutdown rate at a snapshot.
    Shutdown,
}

/// Where a run starts; non-default for restarts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartState {
    pub elapsed: f64,
    pub step: usize,
    pub dt: f64,
}

/// One attempted step, accepted or rolled back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub dt: f64,
    pub elapsed: f64,
    pub accepted: bool,
    pub max_extension: f64,
    pub residuals: Vec<f64>,
    pub sweeps: usize,
    pub total_current: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: usize,
    pub elapsed: f64,
    pub dt: f64,
    pub termination: Termination,
    pub snapshots: Vec<usize>,
    pub history: Vec<StepRecord>,
}

impl RunReport {
    pub fn rejections(&self) -> usize {
        self.history.iter().filter(|r| !r.accepted).count()
    }
}

/// Adaptive CFL-limited stepping with rollback of violating steps.
#[derive(Debug, Clone)]
pub struct TransientSolver {
    pub dt_min: f64,
    pub dt_max: f64,
    pub cfl: f64,
    pub total_steps: usize,
    pub total_time: f64,
    pub sweeps: SweepPolicy,
    /// Accepted steps between reinitializations.
    pub reinitialize_every: usize,
    pub delete_islands: bool,
    /// Accepted steps between snapshots.
    pub data_frequency: usize,
    pub shutdown_deposition_rate: f64,
}

impl Default for TransientSolver {
    fn default() -> Self {
        Self {
            dt_min: 0.5e-7,
            dt_max: 1e20,
            cfl: 0.1,
            total_steps: 1000,
            total_time: 1e20,
            sweeps: SweepPolicy::Fixed(5),
            reinitialize_every: 50,
            delete_islands: true,
            data_frequency: 10,
            shutdown_deposition_rate: 1e-10,
        }
    }
}

impl TransientSolver {
    /// `CFL·dx/max_ext`, unbounded when nothing moves.
    pub fn cfl_bound(&self, nominal_dx: f64, max_extension: f64) -> f64 {
        if max_extension > 0.0 {
            self.cfl * nominal_dx / max_extension
        } else {
            f64::INFINITY
        }
    }

    /// `min(CFL·dx/max_ext, 1.1·dt_prev)` clamped to `[dt_min, dt_max]`.
    pub fn candidate_dt(&self, nominal_dx: f64, max_extension: f64, dt_prev: f64) -> f64 {
        self.cfl_bound(nominal_dx, max_extension)
            .min(1.1 * dt_prev)
            .min(self.dt_max)
            .max(self.dt_min)
    }

    pub fn solve<M, W>(&self, model: &mut M, writer: &mut W, start: StartState) -> Result<RunReport>
    where
        M: MovingBoundaryModel + ?Sized,
        W: SnapshotWriter + ?Sized,
    {
        if self.data_frequency == 0 {
            return Err(SimulationError::config("data_frequency must be at least 1"));
        }
        let reinitialize_every = self.reinitialize_every.max(1);
        let dx = model.nominal_dx();

        let StartState {
            mut elapsed,
            mut step,
            mut dt,
        } = start;
        let mut state = StepperState::Idle;
        let mut redo = false;
        let mut max_extension = model.extend();
        let mut history = Vec::new();
        let mut snapshots: Vec<usize> = Vec::new();

        log::info!(
            "Starting transient run at step {} (t = {:.4e}, dt = {:.3e})",
            step,
            elapsed,
            dt
        );

        let termination = loop {
            if step >= self.total_steps {
                break Termination::StepLimit;
            }
            if elapsed >= self.total_time {
                break Termination::TimeLimit;
            }
            transition(&mut state, StepperState::Stepping);

            model.update_old();
            model.snapshot_distance();

            if step % self.data_frequency == 0 && !redo {
                emit(model, writer, &mut snapshots, elapsed, step)?;
                if step > 0 && max_extension < self.shutdown_deposition_rate {
                    log::info!(
                        "Deposition rate {:.3e} below shutdown threshold, stopping",
                        max_extension
                    );
                    break Termination::Shutdown;
                }
            }

            if step % reinitialize_every == 0 {
                model.reinitialize(self.delete_islands);
            }

            let extension = model.extend();
            dt = self.candidate_dt(dx, extension, dt);

            model.advect(dt)?;

            let (residuals, sweeps) = self.sweep(model, dt)?;

            max_extension = model.extend();
            let accepted = dt <= 1.1 * self.cfl_bound(dx, max_extension);
            let record = StepRecord {
                step,
                dt,
                elapsed,
                accepted,
                max_extension,
                residuals,
                sweeps,
                total_current: model.total_current(),
            };

            if accepted {
                elapsed += dt;
                step += 1;
                redo = false;
                transition(&mut state, StepperState::Accepted);
                log::info!(
                    "Step {:>4} | t = {:.4e} | dt = {:.3e} | I = {:.4e} | res = {:.3e}",
                    step,
                    elapsed,
                    dt,
                    record.total_current,
                    record.residuals.iter().cloned().fold(0.0, f64::max)
                );
                history.push(record);
            } else {
                history.push(record);
                if redo {
                    log::error!("Step {:>4} | dt = {:.3e} | CFL violated twice", step, dt);
                    return Err(SimulationError::CflDivergence { step, dt });
                }
                log::warn!(
                    "Step {:>4} | dt = {:.3e} | CFL violated (max ext {:.3e}), retrying with dt/10",
                    step,
                    dt,
                    max_extension
                );
                model.rollback();
                dt /= 10.0;
                redo = true;
                transition(&mut state, StepperState::RolledBack);
            }
        };
        if snapshots.last() != Some(&step) {
            emit(model, writer, &mut snapshots, elapsed, step)?;
        }
        transition(&mut state, StepperState::Finished);
        log::info!(
            "Run finished ({:?}) after {} steps, t = {:.4e}",
            termination,
            step,
            elapsed
        );

        Ok(RunReport {
            steps: step,
            elapsed,
            dt,
            termination,
            snapshots,
            history,
        })
    }

    fn sweep<M: MovingBoundaryModel + ?Sized>(&self, model: &mut M, dt: f64) -> Result<(Vec<f64>, usize)> {
        let max_sweeps = self.sweeps.max_sweeps().max(1);
        let mut initial: Option<Vec<f64>> = None;
        let mut residuals = Vec::new();
        for k in 0..max_sweeps {
            residuals = model.sweep(dt)?;
            let first = initial.get_or_insert_with(|| residuals.clone());
            if k > 0 && self.sweeps.converged(&residuals, first) {
                return Ok((residuals, k + 1));
            }
        }
        if matches!(self.sweeps, SweepPolicy::Converge { .. }) {
            log::warn!("sweep tolerance not met after {} sweeps: {:?}", max_sweeps, residuals);
        }
        Ok((residuals, max_sweeps))
    }
}

fn transition(state: &mut StepperState, next: StepperState) {
    log::trace!("{:?} -> {:?}", state, next);
    *state = next;
}

fn emit<M, W>(model: &M, writer: &mut W, written: &mut Vec<usize>, elapsed: f64, step: usize) -> Result<()>
where
    M: MovingBoundaryModel + ?Sized,
    W: SnapshotWriter + ?Sized,
{
    writer.write(elapsed, step, &model.snapshot())?;
    if written.last() != Some(&step) {
        written.push(step);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_dt_respects_growth_and_bounds() {
        let solver = TransientSolver {
            dt_min: 1e-3,
            dt_max: 1.0,
            cfl: 0.5,
            ..Default::default()
        };
        assert_eq!(solver.candidate_dt(1.0, 0.0, 0.1), 0.11000000000000001);
        assert_eq!(solver.candidate_dt(1.0, 10.0, 0.1), 0.05);
        assert_eq!(solver.candidate_dt(1.0, 1e6, 0.1), 1e-3);
        assert_eq!(solver.candidate_dt(1.0, 0.0, 5.0), 1.0);
    }
}
