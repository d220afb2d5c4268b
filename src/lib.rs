//! # lapinit
//!
//! Spectral initialization for graph embeddings: the leading non-trivial
//! eigenvectors of the normalized Laplacian of a weighted k-NN graph, used as
//! starting coordinates for an iterative layout optimizer (UMAP and friends).
//!
//! ## Pipeline
//!
//! ```text
//! CooGraph (rows, cols, vals)          upstream k-NN + weighting
//!     │  CsrGraph::from_coo            counting sort by source row
//!     ▼
//! CsrGraph (row_offsets, col_indices, values)
//!     │  embed                         thick-restart Lanczos on I + D^{-1/2} A D^{-1/2}
//!     ▼
//! Array2<f64>  (n_vertices × n_components)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use lapinit::{spectral_init, CooGraph, SpectralParameters};
//!
//! // Path graph: 0 -- 1 -- 2 -- 3, both directions present.
//! let coo = CooGraph::from_edges(4, &[
//!     (0, 1, 1.0), (1, 0, 1.0),
//!     (1, 2, 1.0), (2, 1, 1.0),
//!     (2, 3, 1.0), (3, 2, 1.0),
//! ]).unwrap();
//!
//! let params = SpectralParameters::new(2);
//! let embedding = spectral_init(&coo, &params).unwrap();
//! assert_eq!(embedding.dim(), (4, 2));
//! ```
//!
//! ## Why the Normalized Laplacian?
//!
//! ```text
//! L_sym = I - D^{-1/2} A D^{-1/2}
//!   - Eigenvalues in [0, 2]
//!   - Eigenvector for λ = 0 is D^{1/2} 1 (carries no layout information)
//!   - Next eigenvectors minimize a degree-normalized cut: neighbours land close
//! ```
//!
//! Rather than forming `L_sym`, the solver works on `M = 2I - L_sym`, whose
//! **largest** eigenpairs are the **smallest** eigenpairs of `L_sym`, and only
//! ever applies it to vectors through the CSR structure.
//!
//! ## What Can Go Wrong
//!
//! 1. **Asymmetric k-NN graphs**: a warning is logged and the operator is
//!    built on `(A + Aᵀ)/2` without copying the graph. Degrees are its row
//!    sums, so vertices with only incoming edges stay connected. The result
//!    matches embedding [`CsrGraph::symmetrized`].
//! 2. **Disconnected graphs**: λ = 0 has multiplicity equal to the number of
//!    components. A single Krylov sequence sees each eigenvalue only once, so
//!    the solver deflates its converged pairs and searches the complement for
//!    missed copies. With `c` components the first `c - 1` embedding columns
//!    span the remaining component indicators, in no particular basis.
//! 3. **Convergence**: the solve is bounded by
//!    [`SpectralParameters::eigensolver_max_iterations`] operator applications.
//!    Running out yields [`Error::SolverDiverged`]; nothing partial is returned.
//! 4. **Signs**: eigenvectors are defined up to sign. Normalize orientation
//!    before comparing embeddings numerically.

use thiserror::Error;

pub mod eigen;
pub mod embed;
pub mod sparse;

pub use embed::{embed, embed_into, spectral_clustering, SpectralClustering};
pub use sparse::{CooGraph, CsrGraph, NormalizedAffinity};

use ndarray::Array2;

/// Residual bound used when [`SpectralParameters::eigensolver_tolerance`] is zero.
pub const DEFAULT_EIGENSOLVER_TOLERANCE: f64 = 1e-6;
/// Operator-application budget used when the configured bound is zero.
pub const DEFAULT_EIGENSOLVER_MAX_ITERATIONS: usize = 4000;
/// Relative centroid shift used when the refinement tolerance is zero.
pub const DEFAULT_REFINEMENT_TOLERANCE: f64 = 1e-4;
/// Lloyd iteration bound used when the refinement bound is zero.
pub const DEFAULT_REFINEMENT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("eigensolver did not converge after {iterations} iterations (worst residual {residual:e})")]
    SolverDiverged { iterations: usize, residual: f64 },

    #[error("could not allocate scratch buffer of {requested} bytes")]
    ResourceExhausted { requested: usize },

    #[error("invalid embedding dimension k={k} for n={n}")]
    InvalidEmbeddingDim { k: usize, n: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("output buffer has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration for the spectral embedder.
///
/// Zero-valued solver and refinement bounds mean "use the default", so a
/// caller can always pass a fully specified struct without knowing the
/// solver's internals.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralParameters {
    /// Number of eigenvectors, i.e. output embedding dimensions.
    pub n_components: usize,
    /// Bound on the residual `‖M y - θ y‖` of every wanted Ritz pair.
    pub eigensolver_tolerance: f64,
    /// Bound on the number of operator applications.
    pub eigensolver_max_iterations: usize,
    /// Relative centroid movement below which k-means refinement stops.
    ///
    /// Only affects the cluster labels, never the embedding.
    pub clustering_refinement_tolerance: f64,
    /// Bound on Lloyd iterations during refinement.
    pub clustering_refinement_max_iterations: usize,
    /// Drop the trivial eigenvector (λ = 0, proportional to `D^{1/2} 1`).
    pub skip_trivial: bool,
}

impl Default for SpectralParameters {
    fn default() -> Self {
        Self {
            n_components: 2,
            eigensolver_tolerance: 0.0,
            eigensolver_max_iterations: 0,
            clustering_refinement_tolerance: 0.0,
            clustering_refinement_max_iterations: 1,
            skip_trivial: true,
        }
    }
}

impl SpectralParameters {
    /// Parameters for an `n_components`-dimensional embedding, solver defaults otherwise.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            ..Default::default()
        }
    }

    pub fn with_eigensolver_tolerance(mut self, tol: f64) -> Self {
        self.eigensolver_tolerance = tol;
        self
    }

    pub fn with_eigensolver_max_iterations(mut self, iters: usize) -> Self {
        self.eigensolver_max_iterations = iters;
        self
    }

    pub fn with_refinement(mut self, tol: f64, max_iters: usize) -> Self {
        self.clustering_refinement_tolerance = tol;
        self.clustering_refinement_max_iterations = max_iters;
        self
    }

    pub fn with_skip_trivial(mut self, skip: bool) -> Self {
        self.skip_trivial = skip;
        self
    }

    /// Reject values no solver default can stand in for.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(Error::InvalidParameter(
                "n_components must be at least 1".into(),
            ));
        }
        for (name, tol) in [
            ("eigensolver_tolerance", self.eigensolver_tolerance),
            (
                "clustering_refinement_tolerance",
                self.clustering_refinement_tolerance,
            ),
        ] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be finite and non-negative, got {tol}"
                )));
            }
        }
        Ok(())
    }

    pub fn resolved_eigensolver_tolerance(&self) -> f64 {
        if self.eigensolver_tolerance == 0.0 {
            DEFAULT_EIGENSOLVER_TOLERANCE
        } else {
            self.eigensolver_tolerance
        }
    }

    pub fn resolved_eigensolver_max_iterations(&self) -> usize {
        if self.eigensolver_max_iterations == 0 {
            DEFAULT_EIGENSOLVER_MAX_ITERATIONS
        } else {
            self.eigensolver_max_iterations
        }
    }

    pub fn resolved_refinement_tolerance(&self) -> f64 {
        if self.clustering_refinement_tolerance == 0.0 {
            DEFAULT_REFINEMENT_TOLERANCE
        } else {
            self.clustering_refinement_tolerance
        }
    }

    pub fn resolved_refinement_max_iterations(&self) -> usize {
        if self.clustering_refinement_max_iterations == 0 {
            DEFAULT_REFINEMENT_MAX_ITERATIONS
        } else {
            self.clustering_refinement_max_iterations
        }
    }

    /// Number of eigenpairs the solver has to deliver.
    pub(crate) fn wanted_eigenpairs(&self) -> usize {
        self.n_components + usize::from(self.skip_trivial)
    }
}

/// Convert a COO graph and embed it in one call.
///
/// Parameters are validated first and conversion errors abort before any
/// solver work is done.
pub fn spectral_init(coo: &CooGraph, params: &SpectralParameters) -> Result<Array2<f64>> {
    params.validate()?;
    let csr = CsrGraph::from_coo(coo)?;
    embed(&csr, params)
}

/// Empty buffer with room for `cap` elements, or [`Error::ResourceExhausted`].
pub(crate) fn try_with_capacity<T>(cap: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(cap)
        .map_err(|_| Error::ResourceExhausted {
            requested: cap.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buf)
}

/// Zero-initialized buffer that reports allocation failure instead of aborting.
pub(crate) fn try_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut buf = try_with_capacity(len)?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// Fallible `Array2::zeros`.
pub(crate) fn try_zeros2(rows: usize, cols: usize) -> Result<Array2<f64>> {
    let len = rows
        .checked_mul(cols)
        .ok_or(Error::ResourceExhausted { requested: usize::MAX })?;
    let buf = try_zeroed::<f64>(len)?;
    Array2::from_shape_vec((rows, cols), buf).map_err(|_| Error::ResourceExhausted {
        requested: len.saturating_mul(std::mem::size_of::<f64>()),
    })
}
