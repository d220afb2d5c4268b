//! Sparse graph representations for the spectral embedder.
//!
//! - [`CooGraph`]: the upstream hand-off format, parallel `(row, col, val)` arrays.
//! - [`CsrGraph`]: row offsets + column indices + aligned weights, built from a
//!   `CooGraph` by a stable counting sort.
//! - [`NormalizedAffinity`]: the matrix-free operator \(I + D^{-1/2} A D^{-1/2}\)
//!   whose top eigenvectors are the bottom eigenvectors of \(L_{sym}\).
//!
//! Conversion is a pure re-indexing. Duplicate `(row, col)` entries survive
//! as separate edges, so the CSR graph holds exactly the COO multiset.

use std::collections::HashMap;

use crate::eigen::LinearOperator;
use crate::{try_with_capacity, try_zeroed, Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A weighted graph in coordinate form.
#[derive(Debug, Clone, PartialEq)]
pub struct CooGraph {
    n_vertices: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl CooGraph {
    /// Wrap parallel edge arrays.
    ///
    /// Only the array lengths are checked here; index bounds are checked by
    /// [`CsrGraph::from_coo`].
    pub fn new(n_vertices: usize, rows: Vec<usize>, cols: Vec<usize>, vals: Vec<f64>) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != vals.len() {
            return Err(Error::InvalidGraph(format!(
                "edge arrays differ in length: rows={}, cols={}, vals={}",
                rows.len(),
                cols.len(),
                vals.len()
            )));
        }
        Ok(Self {
            n_vertices,
            rows,
            cols,
            vals,
        })
    }

    /// Build from `(source, destination, weight)` triples.
    pub fn from_edges(n_vertices: usize, edges: &[(usize, usize, f64)]) -> Result<Self> {
        let rows = edges.iter().map(|&(r, _, _)| r).collect();
        let cols = edges.iter().map(|&(_, c, _)| c).collect();
        let vals = edges.iter().map(|&(_, _, w)| w).collect();
        Self::new(n_vertices, rows, cols, vals)
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    /// Iterate edges as `(source, destination, weight)` in storage order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.vals)
            .map(|((&r, &c), &w)| (r, c, w))
    }
}

/// A weighted graph in compressed-row form.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrGraph {
    n: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrGraph {
    /// Convert a COO graph by counting sort on the source index.
    ///
    /// Entries sharing a source keep their input order. Weights are copied
    /// verbatim (NaN and infinities included). The only validation is the
    /// index range check.
    pub fn from_coo(coo: &CooGraph) -> Result<Self> {
        let n = coo.n_vertices;
        if n == 0 {
            return Err(Error::InvalidGraph("graph has no vertices".into()));
        }
        for (e, (r, c, _)) in coo.edges().enumerate() {
            if r >= n || c >= n {
                return Err(Error::InvalidGraph(format!(
                    "edge {e} ({r}, {c}) out of bounds for n_vertices={n}"
                )));
            }
        }

        let mut row_offsets = try_zeroed::<usize>(n + 1)?;
        for &r in &coo.rows {
            row_offsets[r + 1] += 1;
        }
        for i in 0..n {
            row_offsets[i + 1] += row_offsets[i];
        }

        let nnz = coo.nnz();
        let mut col_indices = try_zeroed::<usize>(nnz)?;
        let mut values = try_zeroed::<f64>(nnz)?;

        // Write entries into CSR using row_offsets as cursors.
        let mut cursor = try_zeroed::<usize>(n)?;
        cursor.copy_from_slice(&row_offsets[..n]);
        for (r, c, w) in coo.edges() {
            let at = cursor[r];
            col_indices[at] = c;
            values[at] = w;
            cursor[r] += 1;
        }

        Ok(Self {
            n,
            row_offsets,
            col_indices,
            values,
        })
    }

    pub fn n_vertices(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `(column, weight)` pairs of row `v`.
    pub fn row(&self, v: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_offsets[v], self.row_offsets[v + 1]);
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Re-expand into coordinate form, row by row.
    pub fn to_coo(&self) -> CooGraph {
        let mut rows = Vec::with_capacity(self.nnz());
        for r in 0..self.n {
            let len = self.row_offsets[r + 1] - self.row_offsets[r];
            rows.extend(std::iter::repeat(r).take(len));
        }
        CooGraph {
            n_vertices: self.n,
            rows,
            cols: self.col_indices.clone(),
            vals: self.values.clone(),
        }
    }

    /// Row sums (weighted out-degrees).
    pub fn degree_vector(&self) -> Result<Vec<f64>> {
        let mut deg = try_zeroed::<f64>(self.n)?;

        #[cfg(feature = "parallel")]
        {
            deg.par_iter_mut()
                .enumerate()
                .for_each(|(r, deg_r)| *deg_r = self.row(r).map(|(_, w)| w).sum());
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (r, deg_r) in deg.iter_mut().enumerate() {
                *deg_r = self.row(r).map(|(_, w)| w).sum();
            }
        }

        Ok(deg)
    }

    /// Row sums of \((A + A^T) / 2\): the mean of out- and in-degree.
    pub fn symmetrized_degree_vector(&self) -> Result<Vec<f64>> {
        let mut deg = self.degree_vector()?;
        deg.iter_mut().for_each(|d| *d *= 0.5);
        for (&c, &w) in self.col_indices.iter().zip(&self.values) {
            deg[c] += 0.5 * w;
        }
        Ok(deg)
    }

    /// Total weight stored for `(r, c)`, duplicates summed.
    fn pair_weight(&self, r: usize, c: usize) -> f64 {
        self.row(r).filter(|&(col, _)| col == c).map(|(_, w)| w).sum()
    }

    /// Whether every `(u, v)` carries the same total weight as `(v, u)`.
    ///
    /// Duplicates are summed before comparing. `tol` is relative to the
    /// larger of the two weights (and absolute below 1). Works on the CSR
    /// arrays directly, so it never allocates.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.n).all(|u| {
            self.row(u).all(|(v, _)| {
                let w = self.pair_weight(u, v);
                let back = self.pair_weight(v, u);
                (w - back).abs() <= tol * w.abs().max(back.abs()).max(1.0)
            })
        })
    }

    /// The graph of \((A + A^T) / 2\).
    ///
    /// Unlike [`CsrGraph::from_coo`] this merges duplicates: each `(row, col)`
    /// appears once, columns sorted within a row.
    pub fn symmetrized(&self) -> Result<Self> {
        let mut sums: HashMap<(usize, usize), f64> = HashMap::new();
        let slots = self.nnz().saturating_mul(2);
        sums.try_reserve(slots).map_err(|_| Error::ResourceExhausted {
            requested: slots.saturating_mul(std::mem::size_of::<((usize, usize), f64)>()),
        })?;
        for r in 0..self.n {
            for (c, w) in self.row(r) {
                *sums.entry((r, c)).or_insert(0.0) += 0.5 * w;
                *sums.entry((c, r)).or_insert(0.0) += 0.5 * w;
            }
        }
        let mut entries: Vec<(usize, usize, f64)> = try_with_capacity(sums.len())?;
        entries.extend(sums.into_iter().map(|((r, c), w)| (r, c, w)));
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Self::from_coo(&CooGraph::from_edges(self.n, &entries)?)
    }
}

/// Matrix-free \(M = I + D^{-1/2} A D^{-1/2}\) over a CSR graph.
///
/// `M = 2I - L_sym`, so its spectrum lies in `[0, 2]` and its largest
/// eigenpairs are the smallest of the normalized Laplacian. Zero-degree
/// vertices get \(D^{-1/2} = 0\) (diagonal entry 1 in `M`).
///
/// For directed graphs the operator is built on \(A_s = (A + A^T) / 2\)
/// without materializing it: `D` holds the row sums of `A_s` (mean of out- and
/// in-degree), so a vertex with only incoming edges still gets a non-zero
/// degree, and \(D^{-1/2} A_s D^{-1/2}\) is applied as a row pass plus a
/// transposed scatter.
#[derive(Debug)]
pub struct NormalizedAffinity<'a> {
    graph: &'a CsrGraph,
    d_inv_sqrt: Vec<f64>,
    directed: bool,
}

impl<'a> NormalizedAffinity<'a> {
    /// Operator treating `graph` as symmetric.
    pub fn new(graph: &'a CsrGraph) -> Result<Self> {
        let d_inv_sqrt = inverse_sqrt(graph.degree_vector()?);
        Ok(Self {
            graph,
            d_inv_sqrt,
            directed: false,
        })
    }

    /// Operator over the symmetric part \((A + A^T) / 2\) of a directed graph.
    ///
    /// Equal to `NormalizedAffinity::new(&graph.symmetrized()?)` without the copy.
    pub fn symmetric_part(graph: &'a CsrGraph) -> Result<Self> {
        let d_inv_sqrt = inverse_sqrt(graph.symmetrized_degree_vector()?);
        Ok(Self {
            graph,
            d_inv_sqrt,
            directed: true,
        })
    }

    pub fn d_inv_sqrt(&self) -> &[f64] {
        &self.d_inv_sqrt
    }

    fn normalized_row(&self, r: usize, x: &[f64]) -> f64 {
        let dr = self.d_inv_sqrt[r];
        if dr == 0.0 {
            return 0.0;
        }
        let mut acc = 0.0;
        for (c, w) in self.graph.row(r) {
            acc += w * self.d_inv_sqrt[c] * x[c];
        }
        dr * acc
    }
}

fn inverse_sqrt(mut deg: Vec<f64>) -> Vec<f64> {
    for d in deg.iter_mut() {
        *d = if *d > 0.0 { 1.0 / d.sqrt() } else { 0.0 };
    }
    deg
}

impl LinearOperator for NormalizedAffinity<'_> {
    fn dim(&self) -> usize {
        self.graph.n
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let half = if self.directed { 0.5 } else { 1.0 };

        #[cfg(feature = "parallel")]
        {
            y.par_iter_mut()
                .enumerate()
                .for_each(|(r, y_r)| *y_r = x[r] + half * self.normalized_row(r, x));
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (r, y_r) in y.iter_mut().enumerate() {
                *y_r = x[r] + half * self.normalized_row(r, x);
            }
        }

        if self.directed {
            // Transposed half: scatter row r into its columns.
            for r in 0..self.graph.n {
                let dr = self.d_inv_sqrt[r];
                if dr == 0.0 {
                    continue;
                }
                for (c, w) in self.graph.row(r) {
                    y[c] += 0.5 * dr * w * self.d_inv_sqrt[c] * x[r];
                }
            }
        }
    }
}
