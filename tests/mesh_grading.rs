use approx::assert_relative_eq;
use glam::DVec2;
use proptest::prelude::*;
use superfill::discretization::generator::{geometric_spacing, nonuniform_spacing, AxisGrading, GradedGrid};
use superfill::discretization::mesh::{BoundarySide, Coordinates};

#[test]
fn reference_run_sums_to_the_domain() {
    let widths = geometric_spacing(1.0, 10.0, 1.1).unwrap();
    for (w, e) in widths.iter().zip([1.0, 1.1, 1.21, 1.331, 1.4641, 1.61051]) {
        assert_relative_eq!(*w, e, max_relative = 1e-12);
    }
    assert_relative_eq!(widths.iter().sum::<f64>(), 10.0, max_relative = 1e-12);
}

#[test]
fn graded_grid_has_fine_core_and_matching_faces() {
    let grid = GradedGrid {
        fine_spacing: 0.1,
        padding: 0.3,
        ratio: 1.2,
        x: AxisGrading { x0: 0.0, x1: 1.0, x2: 6.0 },
        y: AxisGrading { x0: 1.0, x1: 2.0, x2: 5.0 },
        origin: DVec2::new(0.0, -2.0),
        coordinates: Coordinates::Cartesian,
    };
    let mesh = grid.build().unwrap();
    let (width, height) = mesh.extent();
    assert_relative_eq!(width, 6.0, max_relative = 1e-12);
    assert_relative_eq!(height, 5.0, max_relative = 1e-12);
    assert!(mesh.min_spacing() <= 0.1 + 1e-12);
    assert_eq!(mesh.num_cells(), mesh.nx * mesh.ny);

    // Every cell has four faces and interior faces are shared.
    let boundary = mesh.faces.iter().filter(|f| f.boundary.is_some()).count();
    assert_eq!(boundary, 2 * (mesh.nx + mesh.ny));
    assert!(mesh.cells.iter().all(|c| c.face_ids.len() == 4));
    let top = mesh.faces.iter().filter(|f| f.boundary == Some(BoundarySide::Top)).count();
    assert_eq!(top, mesh.nx);
}

#[test]
fn cylindrical_volumes_grow_with_radius() {
    let grid = GradedGrid {
        fine_spacing: 0.5,
        padding: 0.5,
        ratio: 1.5,
        x: AxisGrading { x0: 0.0, x1: 1.0, x2: 5.0 },
        y: AxisGrading { x0: 0.0, x1: 1.0, x2: 3.0 },
        origin: DVec2::new(0.005, 0.0),
        coordinates: Coordinates::Cylindrical,
    };
    let mesh = grid.build().unwrap();
    let row: Vec<f64> = (0..mesh.nx).map(|i| mesh.cells[mesh.cell_id(i, 0)].volume).collect();
    let fine: Vec<f64> = row.iter().zip(&mesh.dx).filter(|(_, w)| (**w - 0.5).abs() < 1e-12).map(|(v, _)| *v).collect();
    assert!(fine.windows(2).all(|w| w[1] > w[0]));
}

proptest! {
    #[test]
    fn geometric_runs_cover_the_domain(dx in 0.01f64..1.0, length in 0.0f64..50.0, ratio in 1.01f64..2.0) {
        let widths = geometric_spacing(dx, length, ratio).unwrap();
        let total: f64 = widths.iter().sum();
        prop_assert!((total - length).abs() <= 1e-9 * length.max(1.0));
        prop_assert!(widths.iter().all(|w| *w > 0.0));
        // Monotone apart from the last cell, which absorbs the remainder.
        if widths.len() > 2 {
            let body = &widths[..widths.len() - 1];
            prop_assert!(body.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn axes_reach_the_outer_bound(dx in 0.05f64..0.5, x0 in 0.0f64..3.0, fine in 0.0f64..3.0, outer in 1.0f64..20.0) {
        let x1 = x0 + fine;
        let padding = 2.0 * dx;
        let x2 = x1 + padding + outer;
        let widths = nonuniform_spacing(dx, x0, x1, x2, padding, 1.1).unwrap();
        prop_assert!((widths.iter().sum::<f64>() - x2).abs() <= 1e-9 * x2);
        prop_assert!(widths.iter().cloned().fold(f64::INFINITY, f64::min) > 0.0);
        prop_assert!(widths.iter().any(|w| *w <= dx * (1.0 + 1e-9)));
        // Shrinking toward the fine region, growing away from it, never both.
        let growing = widths.windows(2).position(|w| w[1] > w[0] * (1.0 + 1e-9));
        if let Some(start) = growing {
            prop_assert!(widths[start..].windows(2).all(|w| w[1] >= w[0] * (1.0 - 1e-9)));
        }
    }
}
