use crate::error::{Result, SimulationError};
use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Coordinate system of the 2D grid.
///
/// `Cylindrical` is axisymmetric with `x` as the radius: cell volumes and face
/// areas are weighted by `r` (per radian).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinates {
    Cartesian,
    Cylindrical,
}

/// Side of the rectangular domain a boundary face lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundarySide {
    Left,
    Right,
    Bottom,
    Top,
}

/// The complete computational grid.
///
/// Cells are numbered row by row: `id = i + j * nx` with `i` the column
/// (x index) and `j` the row (y index).
#[derive(Debug, Clone)]
pub struct Mesh {
    pub nx: usize,
    pub ny: usize,
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
    pub origin: DVec2,
    /// Ideal spacing of the fine region. Not necessarily any actual width.
    pub nominal_dx: f64,
    pub coordinates: Coordinates,
    pub cells: Vec<Cell>,
    pub faces: Vec<Face>,
    x_faces: Vec<f64>,
    y_faces: Vec<f64>,
    x_centers: Vec<f64>,
    y_centers: Vec<f64>,
}

/// A single control volume.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: usize,
    pub volume: f64,
    pub centroid: DVec2,
    pub face_ids: Vec<usize>,
}

/// An interface between two cells, or between a cell and the domain boundary.
#[derive(Debug, Clone)]
pub struct Face {
    pub area: f64,
    /// Unit normal pointing from the first cell to the second (outward on the boundary).
    pub normal: DVec2,
    /// `(cell, Some(neighbor))` for interior faces, `(cell, None)` on the boundary.
    pub neighbor_cell_ids: (usize, Option<usize>),
    pub centroid: DVec2,
    pub boundary: Option<BoundarySide>,
}

impl Mesh {
    /// Build a grid from per-column (`dx`) and per-row (`dy`) widths.
    pub fn new(
        dx: Vec<f64>,
        dy: Vec<f64>,
        origin: DVec2,
        nominal_dx: f64,
        coordinates: Coordinates,
    ) -> Result<Self> {
        if dx.is_empty() || dy.is_empty() {
            return Err(SimulationError::config("mesh needs at least one cell per axis"));
        }
        if let Some(w) = dx.iter().chain(dy.iter()).find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(SimulationError::config(format!(
                "cell widths must be positive and finite, found {w}"
            )));
        }
        if !(nominal_dx.is_finite() && nominal_dx > 0.0) {
            return Err(SimulationError::config("nominal_dx must be positive"));
        }

        let x_faces = cumulative(origin.x, &dx);
        let y_faces = cumulative(origin.y, &dy);
        if coordinates == Coordinates::Cylindrical && x_faces[0] < 0.0 {
            return Err(SimulationError::config(
                "cylindrical meshes must not extend to negative radius",
            ));
        }
        let x_centers: Vec<f64> = x_faces.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let y_centers: Vec<f64> = y_faces.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();

        let mut mesh = Self {
            nx: dx.len(),
            ny: dy.len(),
            dx,
            dy,
            origin,
            nominal_dx,
            coordinates,
            cells: Vec::new(),
            faces: Vec::new(),
            x_faces,
            y_faces,
            x_centers,
            y_centers,
        };
        mesh.build_topology();
        Ok(mesh)
    }

    fn build_topology(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        let radial = |r: f64| match self.coordinates {
            Coordinates::Cartesian => 1.0,
            Coordinates::Cylindrical => r,
        };

        let mut cells: Vec<Cell> = (0..nx * ny)
            .map(|id| {
                let (i, j) = (id % nx, id / nx);
                let centroid = DVec2::new(self.x_centers[i], self.y_centers[j]);
                Cell {
                    id,
                    volume: self.dx[i] * self.dy[j] * radial(centroid.x),
                    centroid,
                    face_ids: Vec::with_capacity(4),
                }
            })
            .collect();
        let mut faces = Vec::with_capacity((nx + 1) * ny + nx * (ny + 1));

        // Faces normal to x.
        for j in 0..ny {
            for f in 0..=nx {
                let x = self.x_faces[f];
                let centroid = DVec2::new(x, self.y_centers[j]);
                let area = self.dy[j] * radial(x);
                let (ids, normal, boundary) = if f == 0 {
                    ((self.cell_id(0, j), None), DVec2::NEG_X, Some(BoundarySide::Left))
                } else if f == nx {
                    ((self.cell_id(nx - 1, j), None), DVec2::X, Some(BoundarySide::Right))
                } else {
                    (
                        (self.cell_id(f - 1, j), Some(self.cell_id(f, j))),
                        DVec2::X,
                        None,
                    )
                };
                push_face(&mut cells, &mut faces, Face { area, normal, neighbor_cell_ids: ids, centroid, boundary });
            }
        }

        // Faces normal to y.
        for f in 0..=ny {
            for i in 0..nx {
                let y = self.y_faces[f];
                let centroid = DVec2::new(self.x_centers[i], y);
                let area = self.dx[i] * radial(self.x_centers[i]);
                let (ids, normal, boundary) = if f == 0 {
                    ((self.cell_id(i, 0), None), DVec2::NEG_Y, Some(BoundarySide::Bottom))
                } else if f == ny {
                    ((self.cell_id(i, ny - 1), None), DVec2::Y, Some(BoundarySide::Top))
                } else {
                    (
                        (self.cell_id(i, f - 1), Some(self.cell_id(i, f))),
                        DVec2::Y,
                        None,
                    )
                };
                push_face(&mut cells, &mut faces, Face { area, normal, neighbor_cell_ids: ids, centroid, boundary });
            }
        }

        self.cells = cells;
        self.faces = faces;
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn cell_id(&self, i: usize, j: usize) -> usize {
        i + j * self.nx
    }

    #[inline]
    pub fn cell_ij(&self, id: usize) -> (usize, usize) {
        (id % self.nx, id / self.nx)
    }

    /// Face neighbours in the order left, right, bottom, top.
    pub fn neighbors(&self, id: usize) -> [Option<usize>; 4] {
        let (i, j) = self.cell_ij(id);
        [
            (i > 0).then(|| id - 1),
            (i + 1 < self.nx).then(|| id + 1),
            (j > 0).then(|| id - self.nx),
            (j + 1 < self.ny).then(|| id + self.nx),
        ]
    }

    pub fn x_centers(&self) -> &[f64] {
        &self.x_centers
    }

    pub fn y_centers(&self) -> &[f64] {
        &self.y_centers
    }

    pub fn x_faces(&self) -> &[f64] {
        &self.x_faces
    }

    pub fn y_faces(&self) -> &[f64] {
        &self.y_faces
    }

    /// Distance between the centres of two face-adjacent cells.
    pub fn center_distance(&self, a: usize, b: usize) -> f64 {
        self.cells[a].centroid.distance(self.cells[b].centroid)
    }

    /// Distance used for the flux across `face`: centre to centre for interior
    /// faces, centre to face on the boundary.
    pub fn face_distance(&self, face: &Face) -> f64 {
        match face.neighbor_cell_ids {
            (k, Some(l)) => self.center_distance(k, l),
            (k, None) => self.cells[k].centroid.distance(face.centroid),
        }
    }

    /// Domain extent `(width, height)`.
    pub fn extent(&self) -> (f64, f64) {
        (self.dx.iter().sum(), self.dy.iter().sum())
    }

    pub fn min_spacing(&self) -> f64 {
        self.dx.iter().chain(self.dy.iter()).cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max_spacing(&self) -> f64 {
        self.dx.iter().chain(self.dy.iter()).cloned().fold(0.0, f64::max)
    }

    /// Cells whose top face lies on the domain boundary.
    pub fn top_row(&self) -> impl Iterator<Item = usize> + '_ {
        let j = self.ny - 1;
        (0..self.nx).map(move |i| self.cell_id(i, j))
    }
}

fn push_face(cells: &mut [Cell], faces: &mut Vec<Face>, face: Face) {
    let id = faces.len();
    let (k, l) = face.neighbor_cell_ids;
    cells[k].face_ids.push(id);
    if let Some(l) = l {
        cells[l].face_ids.push(id);
    }
    faces.push(face);
}

fn cumulative(start: f64, widths: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(widths.len() + 1);
    let mut acc = start;
    out.push(acc);
    for w in widths {
        acc += w;
        out.push(acc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn faces_are_shared_between_neighbors() {
        let mesh = Mesh::new(vec![1.0, 2.0], vec![1.0, 1.0, 3.0], DVec2::ZERO, 1.0, Coordinates::Cartesian)
            .unwrap();
        assert_eq!(mesh.num_cells(), 6);
        assert_eq!(mesh.faces.len(), 3 * 3 + 2 * 4);
        for cell in &mesh.cells {
            assert_eq!(cell.face_ids.len(), 4);
        }
        let interior = mesh.faces.iter().filter(|f| f.neighbor_cell_ids.1.is_some()).count();
        assert_eq!(interior, 3 + 4);
    }

    #[test]
    fn cylindrical_volumes_are_radius_weighted() {
        let mesh = Mesh::new(vec![1.0, 1.0], vec![2.0], DVec2::ZERO, 1.0, Coordinates::Cylindrical)
            .unwrap();
        assert_relative_eq!(mesh.cells[0].volume, 1.0 * 2.0 * 0.5);
        assert_relative_eq!(mesh.cells[1].volume, 1.0 * 2.0 * 1.5);
        let (w, h) = mesh.extent();
        assert_relative_eq!(w, 2.0);
        assert_relative_eq!(h, 2.0);
    }

    #[test]
    fn rejects_non_positive_widths() {
        let err = Mesh::new(vec![1.0, 0.0], vec![1.0], DVec2::ZERO, 1.0, Coordinates::Cartesian);
        assert!(matches!(err, Err(SimulationError::Configuration(_))));
    }
}
