use crate::discretization::generator::{AxisGrading, GradedGrid};
use crate::discretization::mesh::{Coordinates, Mesh};
use crate::error::Result;
use crate::models::electrofill::params::{GeometryKind, SimulationParams};
use glam::DVec2;

/// Shape of the feature being filled.
///
/// The field surface sits at `y = 0`, the feature floor at `y = −feature_depth`.
/// The feature opening spans `rinner <= x <= router`.
pub trait FeatureGeometry {
    fn name(&self) -> &'static str;

    fn coordinates(&self) -> Coordinates;

    /// Whether the point starts inside the deposit.
    fn is_solid(&self, x: f64, y: f64, params: &SimulationParams) -> bool;

    fn build_mesh(&self, params: &SimulationParams) -> Result<Mesh> {
        feature_grid(params, self.coordinates()).build()
    }
}

/// Grid fine around the feature and the boundary layer above it.
///
/// Ten fine cells of substrate lie below the floor and the fine region is
/// padded by three cells on every side.
pub fn feature_grid(params: &SimulationParams, coordinates: Coordinates) -> GradedGrid {
    let dx = params.nominal_dx();
    let below = 10.0 * dx;
    let depth = params.feature_depth;
    let x_offset = match coordinates {
        Coordinates::Cartesian => 0.0,
        Coordinates::Cylindrical => dx / 100.0,
    };
    GradedGrid {
        fine_spacing: dx,
        padding: 3.0 * dx,
        ratio: params.spacing_ratio,
        x: AxisGrading {
            x0: params.rinner,
            x1: params.router,
            x2: params.rboundary,
        },
        y: AxisGrading {
            x0: below,
            x1: below + depth,
            x2: below + depth + params.delta,
        },
        origin: DVec2::new(x_offset, -(below + depth)),
        coordinates,
    }
}

fn below_floor_or_beside(x: f64, y: f64, params: &SimulationParams) -> bool {
    y < -params.feature_depth || (y < 0.0 && x > params.router)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trench;

impl FeatureGeometry for Trench {
    fn name(&self) -> &'static str {
        "trench"
    }

    fn coordinates(&self) -> Coordinates {
        Coordinates::Cartesian
    }

    fn is_solid(&self, x: f64, y: f64, params: &SimulationParams) -> bool {
        below_floor_or_beside(x, y, params)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Via;

impl FeatureGeometry for Via {
    fn name(&self) -> &'static str {
        "via"
    }

    fn coordinates(&self) -> Coordinates {
        Coordinates::Cylindrical
    }

    fn is_solid(&self, x: f64, y: f64, params: &SimulationParams) -> bool {
        below_floor_or_beside(x, y, params)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Annular;

impl FeatureGeometry for Annular {
    fn name(&self) -> &'static str {
        "annular"
    }

    fn coordinates(&self) -> Coordinates {
        Coordinates::Cylindrical
    }

    fn is_solid(&self, x: f64, y: f64, params: &SimulationParams) -> bool {
        below_floor_or_beside(x, y, params) || (y < 0.0 && x < params.rinner)
    }
}

pub fn geometry_for(kind: GeometryKind) -> Box<dyn FeatureGeometry> {
    match kind {
        GeometryKind::Trench => Box::new(Trench),
        GeometryKind::Via => Box::new(Via),
        GeometryKind::Annular => Box::new(Annular),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small() -> SimulationParams {
        SimulationParams {
            geometry: GeometryKind::Annular,
            feature_depth: 10e-6,
            nx: 5,
            rinner: 4e-6,
            router: 8e-6,
            rboundary: 30e-6,
            delta: 20e-6,
            ..Default::default()
        }
    }

    #[test]
    fn mesh_covers_declared_domain() {
        let params = small();
        let mesh = Annular.build_mesh(&params).unwrap();
        let (w, h) = mesh.extent();
        assert_relative_eq!(w, params.rboundary, max_relative = 1e-12);
        assert_relative_eq!(h, 10.0 * 2e-6 + 10e-6 + 20e-6, max_relative = 1e-12);
        assert_relative_eq!(mesh.y_faces()[0], -(20e-6 + 10e-6), max_relative = 1e-12);
        assert!(mesh.x_faces()[0] > 0.0);
        assert!(mesh.min_spacing() <= mesh.nominal_dx * (1.0 + 1e-9));
    }

    #[test]
    fn annulus_has_walls_on_both_sides() {
        let params = small();
        assert!(Annular.is_solid(1e-6, -1e-6, &params));
        assert!(!Annular.is_solid(6e-6, -1e-6, &params));
        assert!(Annular.is_solid(10e-6, -1e-6, &params));
        assert!(Annular.is_solid(6e-6, -11e-6, &params));
        assert!(!Annular.is_solid(1e-6, 1e-6, &params));
        assert!(!Via.is_solid(1e-6, -1e-6, &params));
    }
}
