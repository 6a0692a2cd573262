use crate::discretization::mesh::{Coordinates, Mesh};
use crate::error::{Result, SimulationError};
use glam::DVec2;

/// Widths of a geometrically growing run covering `domain_size`.
///
/// Cells are `dx, dx·r, dx·r², …`; the cell count is the largest `n` whose
/// geometric sum `dx·(r^n − 1)/(r − 1)` does not exceed `domain_size`, and the
/// final cell takes the remaining length so the run sums to `domain_size`.
///
/// `geometric_spacing(1.0, 10.0, 1.1)` gives
/// `[1.0, 1.1, 1.21, 1.331, 1.4641, 1.61051, 2.28439]`.
pub fn geometric_spacing(dx: f64, domain_size: f64, ratio: f64) -> Result<Vec<f64>> {
    if !(dx.is_finite() && dx > 0.0) {
        return Err(SimulationError::config(format!("spacing must be positive, got {dx}")));
    }
    if !(ratio.is_finite() && ratio > 1.0) {
        return Err(SimulationError::config(format!(
            "spacing ratio must exceed 1, got {ratio}"
        )));
    }
    if !(domain_size > 0.0) {
        return Ok(Vec::new());
    }

    let n = ((1.0 + domain_size * (ratio - 1.0) / dx).ln() / ratio.ln()).floor() as usize;
    if n == 0 {
        return Ok(vec![domain_size]);
    }

    let mut widths: Vec<f64> = (0..n).map(|k| dx * ratio.powi(k as i32)).collect();
    let covered = dx * (ratio.powi(n as i32) - 1.0) / (ratio - 1.0);
    let residual = domain_size - covered;
    // Floating point can push the geometric sum a hair past the target.
    if let Some(last) = widths.last_mut() {
        *last += residual;
    }
    if widths.last().map_or(true, |w| *w <= 0.0) {
        return Err(SimulationError::config(format!(
            "geometric run over {domain_size} with spacing {dx} produced a non-positive cell"
        )));
    }
    Ok(widths)
}

/// Widths along one axis: geometric coarsening from `x0 - padding` down to 0,
/// a uniform fine region over `[x0 - padding, x1 + padding]`, then geometric
/// coarsening up to `x2`.
///
/// The fine region spacing never exceeds `dx`, and widths never shrink moving
/// away from it. The inner padding is clamped to `x0` so the axis starts at 0.
pub fn nonuniform_spacing(
    dx: f64,
    x0: f64,
    x1: f64,
    x2: f64,
    padding: f64,
    ratio: f64,
) -> Result<Vec<f64>> {
    if x2 - x1 <= padding {
        return Err(SimulationError::config(format!(
            "outer bound {x2} must lie more than the padding {padding} beyond {x1}"
        )));
    }
    if x0 < 0.0 || x1 < x0 {
        return Err(SimulationError::config(format!(
            "fine region [{x0}, {x1}] is not ordered within [0, {x2}]"
        )));
    }

    let inner_padding = padding.min(x0);
    let mut inner = x0 - inner_padding;
    let mut outer = x2 - (x1 + padding);
    let mut fine_length = x1 - x0 + padding + inner_padding;
    // A coarse run shorter than one fine cell joins the fine region.
    if inner < dx {
        fine_length += inner;
        inner = 0.0;
    }
    if outer < dx {
        fine_length += outer;
        outer = 0.0;
    }

    let mut widths = geometric_spacing(dx, inner, ratio)?;
    widths.reverse();

    let n_fine = ((fine_length / dx) - 1e-9).ceil().max(1.0) as usize;
    widths.extend(std::iter::repeat(fine_length / n_fine as f64).take(n_fine));

    widths.extend(geometric_spacing(dx, outer, ratio)?);
    Ok(widths)
}

/// Description of a graded axis: fine region `[x0, x1]`, outer bound `x2`.
#[derive(Debug, Clone, Copy)]
pub struct AxisGrading {
    pub x0: f64,
    pub x1: f64,
    pub x2: f64,
}

/// Two-axis graded grid sharing one fine spacing, padding and ratio.
#[derive(Debug, Clone)]
pub struct GradedGrid {
    pub fine_spacing: f64,
    pub padding: f64,
    pub ratio: f64,
    pub x: AxisGrading,
    pub y: AxisGrading,
    pub origin: DVec2,
    pub coordinates: Coordinates,
}

impl GradedGrid {
    pub fn build(&self) -> Result<Mesh> {
        let dx = nonuniform_spacing(
            self.fine_spacing,
            self.x.x0,
            self.x.x1,
            self.x.x2,
            self.padding,
            self.ratio,
        )?;
        let dy = nonuniform_spacing(
            self.fine_spacing,
            self.y.x0,
            self.y.x1,
            self.y.x2,
            self.padding,
            self.ratio,
        )?;
        log::debug!(
            "graded mesh: {} x {} cells, fine spacing {:.3e}",
            dx.len(),
            dy.len(),
            self.fine_spacing
        );
        Mesh::new(dx, dy, self.origin, self.fine_spacing, self.coordinates)
    }
}
