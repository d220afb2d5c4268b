//! Eigensolvers for the spectral embedder.
//!
//! [`lanczos_largest`] finds the top eigenpairs of a symmetric operator that is
//! only available through matrix-vector products. It is a thick-restart
//! Lanczos iteration with full reorthogonalization:
//!
//! ```text
//! 1. Extend an orthonormal Krylov basis V to m vectors (each step: one
//!    operator application, two Gram-Schmidt passes against all of V).
//! 2. Solve the small projected problem T = Vᵀ A V densely.
//! 3. Ritz residual of pair i is |h_{m+1,:} · s_i|; stop when all wanted
//!    residuals are ≤ tol, or V spans the whole space (exact).
//! 4. Otherwise keep the best Ritz vectors plus the residual direction and
//!    continue from there.
//! ```
//!
//! A single start vector sees only one direction of each eigenspace, so a
//! repeated eigenvalue (one per connected component at the top of the
//! normalized affinity) can be missed. Once the wanted pairs converge, the
//! operator is deflated by them and the largest remaining eigenvalue is
//! computed. While it beats the smallest accepted one it is swapped in.
//!
//! The projected problems are at most a few dozen rows, solved by
//! [`symmetric_eigen`] (cyclic Jacobi, or faer's self-adjoint EVD with the
//! `faer` feature). With `faer`, [`largest_eigenpairs`] hands large operators
//! to faer's matrix-free Krylov–Schur solver instead.

use log::{debug, trace};
use ndarray::Array2;

use crate::{try_with_capacity, try_zeroed, try_zeros2, Error, Result};

#[cfg(feature = "faer")]
use faer::{
    dyn_stack::{MemBuffer, MemStack, StackReq},
    matrix_free::{
        eigen::{partial_eigen_scratch, partial_self_adjoint_eigen, PartialEigenParams},
        LinOp,
    },
    Col, Mat, MatMut, MatRef, Par, Side,
};
#[cfg(feature = "faer")]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

/// A symmetric linear operator on `R^n`.
pub trait LinearOperator {
    fn dim(&self) -> usize;

    /// `y = A x`. Every entry of `y` is overwritten.
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

/// Converged top eigenpairs.
#[derive(Debug, Clone)]
pub struct RitzPairs {
    /// Eigenvalues in descending order.
    pub values: Vec<f64>,
    /// `n × want`, column `i` belongs to `values[i]`.
    pub vectors: Array2<f64>,
    /// Operator applications spent.
    pub iterations: usize,
    /// Largest residual among the returned pairs.
    pub residual: f64,
}

/// Residual norm below which the Krylov space is treated as invariant.
const BREAKDOWN: f64 = 1e-10;

/// Smallest dimension handed to faer's Krylov–Schur solver.
#[cfg(feature = "faer")]
const KRYLOV_SCHUR_MIN_N: usize = 512;

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

fn seed_vector(v: &mut [f64], salt: usize) {
    for (i, vi) in v.iter_mut().enumerate() {
        let h = (i + 1).wrapping_mul(1315423911) ^ (salt + 1).wrapping_mul(2654435761);
        *vi = (h % 10_000) as f64 / 10_000.0 - 0.5;
    }
}

fn krylov_dim(n: usize, want: usize) -> usize {
    n.min((2 * want + 1).max(want + 16))
}

/// Remove the components of `w` along `basis` (two passes), summing the
/// projection coefficients into `coeffs`.
fn orthogonalize(basis: &[Vec<f64>], w: &mut [f64], coeffs: &mut [f64]) {
    debug_assert!(coeffs.len() >= basis.len());
    coeffs.iter_mut().for_each(|c| *c = 0.0);
    for _ in 0..2 {
        for (q, c) in basis.iter().zip(coeffs.iter_mut()) {
            let proj = dot(q, w);
            axpy(-proj, q, w);
            *c += proj;
        }
    }
}

/// Project `w` onto the orthogonal complement of `locked`.
fn deflate(locked: &[Vec<f64>], w: &mut [f64]) {
    for _ in 0..2 {
        for q in locked {
            axpy(-dot(q, w), q, w);
        }
    }
}

/// Fill `basis[at]` with a unit vector orthogonal to `basis[..at]` and `locked`.
///
/// Returns `false` when those already span the space.
fn fresh_direction(locked: &[Vec<f64>], basis: &mut [Vec<f64>], at: usize, coeffs: &mut [f64]) -> bool {
    let (done, rest) = basis.split_at_mut(at);
    let v = &mut rest[0];
    let n = v.len();
    if at + locked.len() >= n {
        return false;
    }
    // A pseudo-random direction first; unit vectors guarantee progress.
    for attempt in 0..=n {
        if attempt == 0 {
            seed_vector(v, at + 7919);
        } else {
            v.fill(0.0);
            v[attempt - 1] = 1.0;
        }
        deflate(locked, v);
        orthogonalize(done, v, &mut coeffs[..at]);
        let nv = norm(v);
        if nv > 1e-8 {
            v.iter_mut().for_each(|x| *x /= nv);
            return true;
        }
    }
    false
}

/// The `want` largest eigenpairs of a symmetric operator.
///
/// `max_iter` bounds the number of operator applications, the multiplicity
/// check included. The Krylov space holds `min(n, max(2 want + 1, want + 16))`
/// vectors.
///
/// # Errors
///
/// - [`Error::InvalidEmbeddingDim`] if `want` is 0 or exceeds the dimension.
/// - [`Error::SolverDiverged`] if the residuals are still above `tol` when the
///   budget runs out, or the iteration produced non-finite values.
/// - [`Error::ResourceExhausted`] if the basis cannot be allocated.
pub fn lanczos_largest<A: LinearOperator + ?Sized>(
    op: &A,
    want: usize,
    tol: f64,
    max_iter: usize,
) -> Result<RitzPairs> {
    let n = op.dim();
    if want == 0 || want > n {
        return Err(Error::InvalidEmbeddingDim { k: want, n });
    }
    let (pairs, exact) = lanczos_run(op, &[], want, tol, max_iter)?;
    if exact {
        return Ok(pairs);
    }
    recover_missed_pairs(op, pairs, tol, max_iter)
}

/// Top eigenpairs through the configured backend.
///
/// Without the `faer` feature this is [`lanczos_largest`]. With it, operators
/// of dimension 512 and up go through `krylov_schur_largest`.
pub fn largest_eigenpairs<A: LinearOperator + Sync + ?Sized>(
    op: &A,
    want: usize,
    tol: f64,
    max_iter: usize,
) -> Result<RitzPairs> {
    #[cfg(feature = "faer")]
    {
        if op.dim() >= KRYLOV_SCHUR_MIN_N {
            return krylov_schur_largest(op, want, tol, max_iter);
        }
    }
    lanczos_largest(op, want, tol, max_iter)
}

/// One thick-restart Lanczos solve on `A` restricted to the complement of
/// `locked` (orthonormal, possibly empty).
///
/// Returns the pairs and whether the Krylov space covered the whole
/// complement, in which case they are exact and complete.
fn lanczos_run<A: LinearOperator + ?Sized>(
    op: &A,
    locked: &[Vec<f64>],
    want: usize,
    tol: f64,
    max_iter: usize,
) -> Result<(RitzPairs, bool)> {
    let n = op.dim();
    let dim = n - locked.len();
    if want == 0 || want > dim {
        return Err(Error::InvalidEmbeddingDim { k: want, n: dim });
    }
    let m = krylov_dim(dim, want);

    let mut basis: Vec<Vec<f64>> = try_with_capacity(m + 1)?;
    for _ in 0..=m {
        basis.push(try_zeroed(n)?);
    }
    let mut h = try_zeros2(m + 1, m)?;
    let mut w = try_zeroed::<f64>(n)?;
    let mut coeffs = try_zeroed::<f64>(m + 1)?;
    let mut couplings = try_zeroed::<f64>(m)?;

    seed_vector(&mut basis[0], locked.len());
    deflate(locked, &mut basis[0]);
    let nrm = norm(&basis[0]);
    if nrm > 1e-8 {
        basis[0].iter_mut().for_each(|x| *x /= nrm);
    } else if !fresh_direction(locked, &mut basis, 0, &mut coeffs) {
        return Err(Error::InvalidEmbeddingDim { k: want, n: 0 });
    }

    debug!(
        "lanczos: n={n}, locked={}, want={want}, basis={m}, tol={tol:e}, max_iter={max_iter}",
        locked.len()
    );

    let mut kept = 0;
    let mut iterations = 0;
    loop {
        let mut size = m;
        for j in kept..m {
            if iterations >= max_iter {
                size = j;
                break;
            }
            op.apply(&basis[j], &mut w);
            iterations += 1;

            deflate(locked, &mut w);
            orthogonalize(&basis[..=j], &mut w, &mut coeffs[..=j]);
            for i in 0..=j {
                h[[i, j]] = coeffs[i];
            }

            let beta = norm(&w);
            if beta > BREAKDOWN {
                h[[j + 1, j]] = beta;
                for (dst, src) in basis[j + 1].iter_mut().zip(&w) {
                    *dst = src / beta;
                }
            } else {
                h[[j + 1, j]] = 0.0;
                trace!("lanczos: invariant subspace of dimension {}", j + 1);
                if !fresh_direction(locked, &mut basis, j + 1, &mut coeffs) {
                    size = j + 1;
                    break;
                }
            }
        }

        if size < want {
            return Err(Error::SolverDiverged {
                iterations,
                residual: f64::INFINITY,
            });
        }

        let mut t = try_zeros2(size, size)?;
        for i in 0..size {
            for j in 0..size {
                t[[i, j]] = 0.5 * (h[[i, j]] + h[[j, i]]);
            }
        }
        if t.iter().any(|v| !v.is_finite()) {
            return Err(Error::SolverDiverged {
                iterations,
                residual: f64::NAN,
            });
        }
        let (theta, s) = symmetric_eigen(&t)?;
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(Error::SolverDiverged {
                iterations,
                residual: f64::NAN,
            });
        }

        // Coupling of each Ritz vector to the next basis direction.
        let coupling = |i: usize| -> f64 { (0..size).map(|j| h[[size, j]] * s[[j, i]]).sum() };
        let exact = size == dim;
        let mut worst = 0.0f64;
        for i in 0..want {
            let r = if exact { 0.0 } else { coupling(i).abs() };
            worst = if r.is_finite() { worst.max(r) } else { f64::INFINITY };
        }
        debug!("lanczos: basis={size}, iterations={iterations}, worst residual={worst:.3e}");

        if exact || worst <= tol {
            let mut vectors = try_zeros2(n, want)?;
            for i in 0..want {
                let mut col = vectors.column_mut(i);
                for (k, q) in basis.iter().enumerate().take(size) {
                    let c = s[[k, i]];
                    for (dst, src) in col.iter_mut().zip(q) {
                        *dst += c * src;
                    }
                }
            }
            let pairs = RitzPairs {
                values: theta[..want].to_vec(),
                vectors,
                iterations,
                residual: worst,
            };
            return Ok((pairs, exact));
        }

        if iterations >= max_iter {
            return Err(Error::SolverDiverged {
                iterations,
                residual: worst,
            });
        }

        // Thick restart: best `keep` Ritz vectors, then the residual direction.
        let keep = (want + (m - want) / 2).min(size - 1);
        for (i, c) in couplings.iter_mut().enumerate().take(keep) {
            *c = coupling(i);
        }
        let mut ritz = try_zeros2(keep, n)?;
        for i in 0..keep {
            let mut row = ritz.row_mut(i);
            for (k, q) in basis.iter().enumerate().take(size) {
                let c = s[[k, i]];
                for (dst, src) in row.iter_mut().zip(q) {
                    *dst += c * src;
                }
            }
        }
        basis.swap(keep, size);
        for (i, row) in ritz.rows().into_iter().enumerate() {
            for (dst, src) in basis[i].iter_mut().zip(row) {
                *dst = *src;
            }
        }

        h.fill(0.0);
        for i in 0..keep {
            h[[i, i]] = theta[i];
            h[[keep, i]] = couplings[i];
        }
        kept = keep;
        trace!("lanczos: restart keeping {keep} Ritz vectors");
    }
}

/// Swap in eigenvalues the Krylov sequence never saw.
///
/// Deflates `pairs` out of `op`, computes the largest remaining eigenpair and,
/// while it exceeds the smallest accepted value by more than `tol`, replaces
/// that pair with it. Shares `max_iter` with the solve that produced `pairs`.
fn recover_missed_pairs<A: LinearOperator + ?Sized>(
    op: &A,
    mut pairs: RitzPairs,
    tol: f64,
    max_iter: usize,
) -> Result<RitzPairs> {
    let n = op.dim();
    let want = pairs.values.len();
    if want >= n {
        return Ok(pairs);
    }

    let mut locked: Vec<Vec<f64>> = try_with_capacity(want)?;
    for col in pairs.vectors.columns() {
        let mut v = try_zeroed::<f64>(n)?;
        for (dst, src) in v.iter_mut().zip(col) {
            *dst = *src;
        }
        locked.push(v);
    }

    let mut swapped = false;
    loop {
        let budget = max_iter.saturating_sub(pairs.iterations);
        let (extra, _) = match lanczos_run(op, &locked, 1, tol, budget) {
            Err(Error::SolverDiverged {
                iterations,
                residual,
            }) => {
                return Err(Error::SolverDiverged {
                    iterations: pairs.iterations + iterations,
                    residual,
                })
            }
            other => other?,
        };
        pairs.iterations += extra.iterations;

        let theta = extra.values[0];
        let smallest = pairs.values[want - 1];
        if theta <= smallest + tol {
            break;
        }
        debug!("lanczos: deflated solve found missed eigenvalue {theta:.6} > {smallest:.6}");

        let at = pairs.values.iter().position(|&v| v < theta).unwrap_or(want - 1);
        pairs.values.pop();
        pairs.values.insert(at, theta);
        if let Some(mut v) = locked.pop() {
            for (dst, src) in v.iter_mut().zip(extra.vectors.column(0)) {
                *dst = *src;
            }
            locked.insert(at, v);
        }
        pairs.residual = pairs.residual.max(extra.residual);
        swapped = true;
    }

    if swapped {
        for (mut col, v) in pairs.vectors.columns_mut().into_iter().zip(&locked) {
            for (dst, src) in col.iter_mut().zip(v) {
                *dst = *src;
            }
        }
    }
    Ok(pairs)
}

/// [`LinearOperator`] seen through faer's matrix-free interface.
#[cfg(feature = "faer")]
struct FaerOperator<'a, A: ?Sized> {
    op: &'a A,
    scratch: Mutex<(Vec<f64>, Vec<f64>)>,
    applied: AtomicUsize,
}

#[cfg(feature = "faer")]
impl<A: LinearOperator + ?Sized> std::fmt::Debug for FaerOperator<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaerOperator")
            .field("dim", &self.op.dim())
            .field("applied", &self.applied.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(feature = "faer")]
impl<A: LinearOperator + Sync + ?Sized> LinOp<f64> for FaerOperator<'_, A> {
    fn apply_scratch(&self, _rhs_ncols: usize, _par: Par) -> StackReq {
        StackReq::EMPTY
    }

    fn nrows(&self) -> usize {
        self.op.dim()
    }

    fn ncols(&self) -> usize {
        self.op.dim()
    }

    fn apply(&self, mut out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, _par: Par, _stack: &mut MemStack) {
        let mut guard = self
            .scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (x, y) = &mut *guard;
        for j in 0..rhs.ncols() {
            for (i, xi) in x.iter_mut().enumerate() {
                *xi = rhs[(i, j)];
            }
            self.op.apply(x.as_slice(), y.as_mut_slice());
            for (i, yi) in y.iter().enumerate() {
                out[(i, j)] = *yi;
            }
        }
        self.applied.fetch_add(rhs.ncols(), Ordering::Relaxed);
    }

    fn conj_apply(&self, out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, par: Par, stack: &mut MemStack) {
        // Real and symmetric.
        self.apply(out, rhs, par, stack)
    }
}

/// The `want` largest eigenpairs through faer's Krylov–Schur solver
/// (`partial_self_adjoint_eigen`), followed by the same missed-eigenvalue
/// check as [`lanczos_largest`].
///
/// faer's result is re-checked against `tol` with explicit residuals
/// `‖A u - θ u‖`. If it falls short, the remaining budget goes to Lanczos.
#[cfg(feature = "faer")]
pub fn krylov_schur_largest<A: LinearOperator + Sync + ?Sized>(
    op: &A,
    want: usize,
    tol: f64,
    max_iter: usize,
) -> Result<RitzPairs> {
    let n = op.dim();
    if want == 0 || want > n {
        return Err(Error::InvalidEmbeddingDim { k: want, n });
    }
    let m = krylov_dim(n, want);

    let faer_op = FaerOperator {
        op,
        scratch: Mutex::new((try_zeroed(n)?, try_zeroed(n)?)),
        applied: AtomicUsize::new(0),
    };
    let mut eigvecs = Mat::<f64>::zeros(n, want);
    let mut eigvals = try_zeroed::<f64>(want)?;

    // Same deterministic start as the Lanczos path.
    let mut v0 = Col::<f64>::zeros(n);
    let mut seed = try_zeroed::<f64>(n)?;
    seed_vector(&mut seed, 0);
    for (i, s) in seed.iter().enumerate() {
        v0[i] = *s;
    }

    let par = Par::Seq;
    let params = PartialEigenParams {
        max_restarts: (max_iter / m).max(1),
        ..Default::default()
    };

    let req = partial_eigen_scratch(&faer_op, want, par, params);
    let mut mem = MemBuffer::new(req);
    let mut stack = MemStack::new(&mut mem);

    let _info = partial_self_adjoint_eigen(
        eigvecs.as_mut(),
        &mut eigvals,
        &faer_op,
        v0.as_ref(),
        tol,
        par,
        &mut stack,
        params,
    );
    let mut iterations = faer_op.applied.load(Ordering::Relaxed);

    // Sort descending and measure residuals with the operator itself.
    let mut order: Vec<usize> = try_with_capacity(want)?;
    order.extend(0..want);
    order.sort_by(|&i, &j| eigvals[j].total_cmp(&eigvals[i]));

    let mut vectors = try_zeros2(n, want)?;
    let mut values = try_zeroed::<f64>(want)?;
    let mut u = try_zeroed::<f64>(n)?;
    let mut au = try_zeroed::<f64>(n)?;
    let mut worst = 0.0f64;
    for (out_col, &idx) in order.iter().enumerate() {
        for (i, ui) in u.iter_mut().enumerate() {
            *ui = eigvecs[(i, idx)];
        }
        let nu = norm(&u);
        if !nu.is_finite() || nu == 0.0 {
            worst = f64::INFINITY;
            continue;
        }
        u.iter_mut().for_each(|x| *x /= nu);
        op.apply(&u, &mut au);
        iterations += 1;
        let theta = dot(&u, &au);
        axpy(-theta, &u, &mut au);
        let r = norm(&au);
        worst = if r.is_finite() { worst.max(r) } else { f64::INFINITY };
        values[out_col] = theta;
        for (dst, src) in vectors.column_mut(out_col).iter_mut().zip(&u) {
            *dst = *src;
        }
    }
    debug!("krylov-schur: n={n}, want={want}, iterations={iterations}, worst residual={worst:.3e}");

    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::SolverDiverged {
            iterations,
            residual: f64::NAN,
        });
    }
    if worst > tol {
        debug!("krylov-schur: residual {worst:.3e} above {tol:e}, continuing with lanczos");
        return match lanczos_largest(op, want, tol, max_iter.saturating_sub(iterations)) {
            Err(Error::SolverDiverged {
                iterations: more,
                residual,
            }) => Err(Error::SolverDiverged {
                iterations: iterations + more,
                residual,
            }),
            Ok(mut pairs) => {
                pairs.iterations += iterations;
                Ok(pairs)
            }
            Err(e) => Err(e),
        };
    }

    let pairs = RitzPairs {
        values,
        vectors,
        iterations,
        residual: worst,
    };
    recover_missed_pairs(op, pairs, tol, max_iter)
}

/// Eigen-decomposition of a small dense symmetric matrix.
///
/// Returns eigenvalues in descending order and the eigenvectors as columns.
pub fn symmetric_eigen(a: &Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(Error::Backend(format!(
            "matrix is not square: {} x {}",
            n,
            a.ncols()
        )));
    }

    #[cfg(feature = "faer")]
    let (vals, vecs) = faer_eigh(a)?;

    #[cfg(not(feature = "faer"))]
    let (vals, vecs) = {
        let frob = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        jacobi_eigh(a, 1e-13 * frob, 64)
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| vals[j].total_cmp(&vals[i]));

    let mut sorted = try_zeros2(n, n)?;
    for (out_col, &idx) in order.iter().enumerate() {
        sorted.column_mut(out_col).assign(&vecs.column(idx));
    }
    Ok((order.iter().map(|&i| vals[i]).collect(), sorted))
}

/// Cyclic Jacobi eigenvalue algorithm for symmetric matrices.
///
/// Returns `(eigenvalues, eigenvectors)` unsorted, eigenvectors as columns.
/// Stops once the off-diagonal Frobenius norm is at most `tol`.
#[cfg_attr(feature = "faer", allow(dead_code))]
pub(crate) fn jacobi_eigh(a: &Array2<f64>, tol: f64, max_sweeps: usize) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut d = a.to_owned();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..max_sweeps {
        let mut off = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                off += 2.0 * d[[i, j]] * d[[i, j]];
            }
        }
        if off.sqrt() <= tol {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = d[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let app = d[[p, p]];
                let aqq = d[[q, q]];

                let tau = (aqq - app) / (2.0 * apq);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for i in 0..n {
                    if i != p && i != q {
                        let dip = d[[i, p]];
                        let diq = d[[i, q]];
                        d[[i, p]] = c * dip - s * diq;
                        d[[p, i]] = d[[i, p]];
                        d[[i, q]] = s * dip + c * diq;
                        d[[q, i]] = d[[i, q]];
                    }
                }
                d[[p, p]] = c * c * app - 2.0 * s * c * apq + s * s * aqq;
                d[[q, q]] = s * s * app + 2.0 * s * c * apq + c * c * aqq;
                d[[p, q]] = 0.0;
                d[[q, p]] = 0.0;

                for i in 0..n {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    let eigvals: Vec<f64> = (0..n).map(|i| d[[i, i]]).collect();
    (eigvals, v)
}

#[cfg(feature = "faer")]
fn faer_eigh(a: &Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = a.nrows();
    let mut m = Mat::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            m[(i, j)] = a[[i, j]];
        }
    }

    let evd = m
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| Error::Backend(format!("faer self_adjoint_eigen: {e:?}")))?;
    let u = evd.U();
    let s = evd.S().column_vector();

    let vals = (0..n).map(|i| s[i]).collect();
    let mut vecs = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            vecs[[i, j]] = u[(i, j)];
        }
    }
    Ok((vals, vecs))
}
