use nalgebra::DMatrix;

/// Square matrix in compressed sparse row layout, as consumed by the Krylov solvers.
pub type CsrMatrix = kryst::matrix::sparse::CsrMatrix<f64>;

/// Accumulates `(row, col, value)` triplets; duplicates are summed on build.
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n: usize,
    rows: Vec<Vec<(usize, f64)>>,
}

impl CsrBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            rows: vec![Vec::with_capacity(5); n],
        }
    }

    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.rows[row].push((col, value));
    }

    pub fn build(self) -> CsrMatrix {
        let mut indptr = Vec::with_capacity(self.n + 1);
        let mut indices: Vec<usize> = Vec::new();
        let mut data: Vec<f64> = Vec::new();
        indptr.push(0);
        for mut row in self.rows {
            row.sort_by_key(|&(c, _)| c);
            let start = indices.len();
            for (c, v) in row {
                if indices.len() > start && indices.last() == Some(&c) {
                    if let Some(last) = data.last_mut() {
                        *last += v;
                    }
                } else {
                    indices.push(c);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }
        CsrMatrix::from_csr(self.n, self.n, indptr, indices, data)
    }
}

/// Row-wise helpers over [`CsrMatrix`] used by assembly and the dense fallback.
pub trait CsrExt {
    fn dim(&self) -> usize;
    fn stored_entries(&self) -> usize;
    /// Column indices and values of one row.
    fn row_entries(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_;
    fn entry(&self, i: usize, j: usize) -> f64;
    fn diagonal_entries(&self) -> Vec<f64>;
    /// `y = A x`
    fn mul_into(&self, x: &[f64], y: &mut [f64]);
    /// `|A x − b|₂`
    fn residual_norm(&self, x: &[f64], b: &[f64]) -> f64;
    /// Copy with every row `i` scaled by `s[i]`.
    fn row_scaled(&self, s: &[f64]) -> CsrMatrix;
    fn to_dense_matrix(&self) -> DMatrix<f64>;
    /// True when every off-diagonal entry is zero.
    fn is_diagonal(&self) -> bool;
}

impl CsrExt for CsrMatrix {
    #[inline]
    fn dim(&self) -> usize {
        self.row_ptr().len() - 1
    }

    #[inline]
    fn stored_entries(&self) -> usize {
        self.values().len()
    }

    fn row_entries(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr()[i], self.row_ptr()[i + 1]);
        self.col_idx()[start..end]
            .iter()
            .copied()
            .zip(self.values()[start..end].iter().copied())
    }

    fn entry(&self, i: usize, j: usize) -> f64 {
        self.row_entries(i).find(|&(c, _)| c == j).map_or(0.0, |(_, v)| v)
    }

    fn diagonal_entries(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.entry(i, i)).collect()
    }

    fn mul_into(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate().take(self.dim()) {
            *yi = self.row_entries(i).map(|(c, v)| v * x[c]).sum();
        }
    }

    fn residual_norm(&self, x: &[f64], b: &[f64]) -> f64 {
        let mut ax = vec![0.0; self.dim()];
        self.mul_into(x, &mut ax);
        ax.iter()
            .zip(b)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    fn row_scaled(&self, s: &[f64]) -> CsrMatrix {
        let n = self.dim();
        let mut data = self.values().to_vec();
        for i in 0..n {
            for v in &mut data[self.row_ptr()[i]..self.row_ptr()[i + 1]] {
                *v *= s[i];
            }
        }
        CsrMatrix::from_csr(n, n, self.row_ptr().to_vec(), self.col_idx().to_vec(), data)
    }

    fn to_dense_matrix(&self) -> DMatrix<f64> {
        let n = self.dim();
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            for (j, v) in self.row_entries(i) {
                m[(i, j)] += v;
            }
        }
        m
    }

    fn is_diagonal(&self) -> bool {
        (0..self.dim()).all(|i| self.row_entries(i).all(|(j, v)| j == i || v == 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_summed() {
        let mut b = CsrBuilder::new(2);
        b.add(0, 1, 1.0);
        b.add(0, 0, 2.0);
        b.add(0, 1, 3.0);
        b.add(1, 1, 5.0);
        let m = b.build();
        assert_eq!(m.stored_entries(), 3);
        assert_eq!(m.entry(0, 1), 4.0);
        assert_eq!(m.diagonal_entries(), vec![2.0, 5.0]);

        let mut y = vec![0.0; 2];
        m.mul_into(&[1.0, 1.0], &mut y);
        assert_eq!(y, vec![6.0, 5.0]);
    }

    #[test]
    fn row_scaling_leaves_the_pattern_alone() {
        let mut b = CsrBuilder::new(2);
        b.add(0, 0, 4.0);
        b.add(0, 1, -2.0);
        b.add(1, 1, 8.0);
        let m = b.build();
        let scaled = m.row_scaled(&[0.25, 0.125]);
        assert_eq!(scaled.stored_entries(), m.stored_entries());
        assert_eq!(scaled.diagonal_entries(), vec![1.0, 1.0]);
        assert_eq!(scaled.entry(0, 1), -0.5);
        assert!(!scaled.is_diagonal());
    }
}
