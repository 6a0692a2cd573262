//! Signed-distance machinery for the moving interface.
//!
//! The level set is positive in the electrolyte and negative in the deposit.
//! A cell is on the liquid side when `phi >= 0`.

use crate::discretization::mesh::Mesh;
use glam::DVec2;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[inline]
pub fn is_liquid(phi: f64) -> bool {
    phi >= 0.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Trial {
    value: f64,
    cell: usize,
}

impl Eq for Trial {}

impl Ord for Trial {
    // Reversed so the max-heap pops the smallest distance.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for Trial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// First-order fast marching solution of `|∇d| = 1` from the zero level of a
/// level set, on the non-uniform grid.
#[derive(Debug, Clone)]
pub struct FastMarch {
    /// Unsigned distance to the zero level.
    pub distance: Vec<f64>,
    /// Cells in the order they were accepted; seeds come first.
    pub order: Vec<usize>,
    /// Cells adjacent to a sign change, initialised by interpolation.
    pub seed: Vec<bool>,
}

impl FastMarch {
    /// Returns `None` when the level set has no sign change.
    pub fn new(mesh: &Mesh, phi: &[f64]) -> Option<Self> {
        let n = mesh.num_cells();
        let mut distance = vec![f64::INFINITY; n];
        let mut seed = vec![false; n];
        let mut heap = BinaryHeap::new();

        for p in 0..n {
            if let Some(d) = seed_distance(mesh, phi, p) {
                distance[p] = d;
                seed[p] = true;
                heap.push(Trial { value: d, cell: p });
            }
        }
        if heap.is_empty() {
            return None;
        }

        let mut accepted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while let Some(Trial { value, cell }) = heap.pop() {
            if accepted[cell] || value > distance[cell] {
                continue;
            }
            accepted[cell] = true;
            order.push(cell);
            for q in mesh.neighbors(cell).into_iter().flatten() {
                if accepted[q] || seed[q] {
                    continue;
                }
                let candidate = eikonal_update(mesh, &distance, &accepted, q);
                if candidate < distance[q] {
                    distance[q] = candidate;
                    heap.push(Trial { value: candidate, cell: q });
                }
            }
        }

        Some(Self { distance, order, seed })
    }

    /// Signed distance carrying the sign of `phi`.
    pub fn signed(&self, phi: &[f64]) -> Vec<f64> {
        phi.iter()
            .zip(&self.distance)
            .map(|(&p, &d)| {
                if !d.is_finite() {
                    p
                } else if is_liquid(p) {
                    d
                } else {
                    -d.max(f64::MIN_POSITIVE)
                }
            })
            .collect()
    }
}

/// Distance from a cell adjacent to a sign change, by linear interpolation of
/// the crossing along each axis.
fn seed_distance(mesh: &Mesh, phi: &[f64], p: usize) -> Option<f64> {
    let nb = mesh.neighbors(p);
    let liquid = is_liquid(phi[p]);
    let axis = |a: Option<usize>, b: Option<usize>| -> Option<f64> {
        [a, b]
            .into_iter()
            .flatten()
            .filter(|&q| is_liquid(phi[q]) != liquid)
            .map(|q| {
                let (vp, vq) = (phi[p].abs(), phi[q].abs());
                vp / (vp + vq) * mesh.center_distance(p, q)
            })
            .reduce(f64::min)
    };
    match (axis(nb[0], nb[1]), axis(nb[2], nb[3])) {
        (Some(dx), Some(dy)) => {
            if dx == 0.0 || dy == 0.0 {
                Some(0.0)
            } else {
                Some(1.0 / (1.0 / (dx * dx) + 1.0 / (dy * dy)).sqrt())
            }
        }
        (Some(d), None) | (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

/// Solve `(d − a)²/hx² + (d − b)²/hy² = 1` from accepted neighbours, falling
/// back to a single direction when the two-sided solution is not upwind.
fn eikonal_update(mesh: &Mesh, distance: &[f64], accepted: &[bool], q: usize) -> f64 {
    let nb = mesh.neighbors(q);
    let axis = |a: Option<usize>, b: Option<usize>| -> Option<(f64, f64)> {
        [a, b]
            .into_iter()
            .flatten()
            .filter(|&n| accepted[n])
            .map(|n| (distance[n], mesh.center_distance(q, n)))
            .min_by(|x, y| (x.0 + x.1).total_cmp(&(y.0 + y.1)))
    };
    match (axis(nb[0], nb[1]), axis(nb[2], nb[3])) {
        (Some((a, hx)), Some((b, hy))) => {
            let (wx, wy) = (1.0 / (hx * hx), 1.0 / (hy * hy));
            let qa = wx + wy;
            let qb = -2.0 * (a * wx + b * wy);
            let qc = a * a * wx + b * b * wy - 1.0;
            let disc = qb * qb - 4.0 * qa * qc;
            if disc >= 0.0 {
                let d = (-qb + disc.sqrt()) / (2.0 * qa);
                if d >= a.max(b) {
                    return d;
                }
            }
            (a + hx).min(b + hy)
        }
        (Some((a, h)), None) | (None, Some((a, h))) => a + h,
        (None, None) => f64::INFINITY,
    }
}

/// Replace `phi` with the signed distance to its zero level.
///
/// Returns `false`, leaving `phi` untouched, when there is no interface.
pub fn reinitialize(mesh: &Mesh, phi: &mut [f64]) -> bool {
    match FastMarch::new(mesh, phi) {
        Some(march) => {
            let signed = march.signed(phi);
            phi.copy_from_slice(&signed);
            true
        }
        None => {
            log::warn!("level set has no zero crossing, distance left unchanged");
            false
        }
    }
}

/// Liquid cells with at least one face neighbour in the solid.
pub fn interface_cells(mesh: &Mesh, phi: &[f64]) -> Vec<bool> {
    (0..mesh.num_cells())
        .map(|p| {
            is_liquid(phi[p])
                && mesh
                    .neighbors(p)
                    .into_iter()
                    .flatten()
                    .any(|q| !is_liquid(phi[q]))
        })
        .collect()
}

/// Central-difference gradient, one-sided at the domain edge.
pub fn gradient(mesh: &Mesh, phi: &[f64], p: usize) -> DVec2 {
    let nb = mesh.neighbors(p);
    let component = |lo: Option<usize>, hi: Option<usize>, pick: fn(DVec2) -> f64| -> f64 {
        let (a, b) = (lo.unwrap_or(p), hi.unwrap_or(p));
        if a == b {
            return 0.0;
        }
        let span = pick(mesh.cells[b].centroid) - pick(mesh.cells[a].centroid);
        (phi[b] - phi[a]) / span
    };
    DVec2::new(
        component(nb[0], nb[1], |v| v.x),
        component(nb[2], nb[3], |v| v.y),
    )
}

/// Per-cell interface measure derived from the level set.
#[derive(Debug, Clone)]
pub struct InterfaceGeometry {
    pub flag: Vec<bool>,
    /// Interface area inside each cell; zero off the interface.
    pub area: Vec<f64>,
    /// `area / volume`
    pub surface: Vec<f64>,
}

impl InterfaceGeometry {
    /// The interface through a liquid cell is measured on the faces it shares
    /// with solid neighbours, projected on the level-set normal.
    pub fn new(mesh: &Mesh, phi: &[f64]) -> Self {
        let flag = interface_cells(mesh, phi);
        let mut area = vec![0.0; mesh.num_cells()];
        for (p, _) in flag.iter().enumerate().filter(|(_, f)| **f) {
            let normal = gradient(mesh, phi, p).normalize_or_zero();
            area[p] = mesh.cells[p]
                .face_ids
                .iter()
                .map(|&f| &mesh.faces[f])
                .filter_map(|face| {
                    let (k, l) = face.neighbor_cell_ids;
                    let other = if k == p { l? } else { k };
                    (!is_liquid(phi[other])).then_some(face)
                })
                .map(|face| {
                    let projection = if normal == DVec2::ZERO {
                        1.0
                    } else {
                        normal.dot(face.normal).abs()
                    };
                    projection * face.area
                })
                .sum();
        }
        let surface = area
            .iter()
            .zip(&mesh.cells)
            .map(|(a, cell)| a / cell.volume)
            .collect();
        Self { flag, area, surface }
    }

    /// `Σ value·area`
    pub fn integrate(&self, values: &[f64]) -> f64 {
        self.area.iter().zip(values).map(|(a, v)| a * v).sum()
    }
}

/// Carry the interface deposition rate off the interface.
///
/// Liquid interface cells take their own rate; solid cells across the
/// interface take the mean of their liquid interface neighbours; everything
/// else is filled in fast-marching order from upwind neighbours, weighted by
/// `(d_P − d_N)/h²`. Cells farther than `band` from the interface get zero.
pub fn extend_velocity(mesh: &Mesh, phi: &[f64], rate: &[f64], band: f64) -> Vec<f64> {
    let n = mesh.num_cells();
    let mut ext = vec![0.0; n];
    let Some(march) = FastMarch::new(mesh, phi) else {
        return ext;
    };
    let interface = interface_cells(mesh, phi);
    let mut done = vec![false; n];

    for &p in march.order.iter().filter(|&&p| march.seed[p]) {
        if interface[p] {
            ext[p] = rate[p];
        } else {
            let (sum, count) = mesh
                .neighbors(p)
                .into_iter()
                .flatten()
                .filter(|&q| interface[q])
                .fold((0.0, 0usize), |(s, c), q| (s + rate[q], c + 1));
            if count > 0 {
                ext[p] = sum / count as f64;
            }
        }
        done[p] = true;
    }

    for &p in march.order.iter().filter(|&&p| !march.seed[p]) {
        let dp = march.distance[p];
        let mut weighted = 0.0;
        let mut weights = 0.0;
        let mut plain = 0.0;
        let mut count = 0usize;
        for q in mesh.neighbors(p).into_iter().flatten().filter(|&q| done[q]) {
            let h = mesh.center_distance(p, q);
            let w = (dp - march.distance[q]).max(0.0) / (h * h);
            weighted += w * ext[q];
            weights += w;
            plain += ext[q];
            count += 1;
        }
        ext[p] = if weights > 0.0 {
            weighted / weights
        } else if count > 0 {
            plain / count as f64
        } else {
            0.0
        };
        done[p] = true;
    }

    for (e, d) in ext.iter_mut().zip(&march.distance) {
        if *d > band {
            *e = 0.0;
        }
    }
    ext
}

/// Godunov upwind `|∇phi|` for a front moving with normal speed `speed`.
/// Missing neighbours on the domain edge contribute zero gradient.
pub fn godunov_gradient(mesh: &Mesh, phi: &[f64], p: usize, speed: f64) -> f64 {
    let nb = mesh.neighbors(p);
    let backward = |n: Option<usize>| n.map_or(0.0, |n| (phi[p] - phi[n]) / mesh.center_distance(p, n));
    let forward = |n: Option<usize>| n.map_or(0.0, |n| (phi[n] - phi[p]) / mesh.center_distance(p, n));
    let (dxm, dxp) = (backward(nb[0]), forward(nb[1]));
    let (dym, dyp) = (backward(nb[2]), forward(nb[3]));
    let upwind = |m: f64, p: f64| -> f64 {
        if speed > 0.0 {
            m.max(0.0).powi(2).max(p.min(0.0).powi(2))
        } else {
            m.min(0.0).powi(2).max(p.max(0.0).powi(2))
        }
    };
    (upwind(dxm, dxp) + upwind(dym, dyp)).sqrt()
}

/// Explicit advection rate `−V·|∇phi|` per cell.
pub fn advection_source(mesh: &Mesh, phi: &[f64], speed: &[f64]) -> Vec<f64> {
    (0..mesh.num_cells())
        .map(|p| {
            if speed[p] == 0.0 {
                0.0
            } else {
                -speed[p] * godunov_gradient(mesh, phi, p, speed[p])
            }
        })
        .collect()
}

/// Flip interior cells whose four face neighbours all lie on the other side
/// of the interface, in both directions: trapped liquid becomes deposit and
/// stray deposit becomes liquid. Returns the number of cells flipped.
pub fn delete_islands(mesh: &Mesh, phi: &mut [f64]) -> usize {
    let flips: Vec<usize> = (0..mesh.num_cells())
        .filter(|&p| {
            let nb = mesh.neighbors(p);
            let liquid = is_liquid(phi[p]);
            nb.iter().all(|n| matches!(n, Some(q) if is_liquid(phi[*q]) != liquid))
        })
        .collect();
    for &p in &flips {
        phi[p] = if is_liquid(phi[p]) { -1.0 } else { 1.0 };
    }
    if !flips.is_empty() {
        log::debug!("deleted {} level-set islands", flips.len());
    }
    flips.len()
}
