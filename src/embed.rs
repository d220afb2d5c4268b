//! Spectral embedding of a CSR graph.
//!
//! [`spectral_clustering`] runs the full balanced-cut protocol: Lanczos (or
//! faer's Krylov–Schur on large graphs) on the normalized affinity operator,
//! then a bounded k-means refinement over the eigenvector rows, delegated to
//! `clump`. [`embed`] and [`embed_into`] keep only the eigenvectors.

use log::{debug, warn};
use ndarray::{s, Array2, ArrayViewMut2};

use crate::eigen::largest_eigenpairs;
use crate::sparse::{CsrGraph, NormalizedAffinity};
use crate::{try_with_capacity, Error, Result, SpectralParameters};

/// Relative tolerance for deciding whether the input graph is symmetric.
const SYMMETRY_TOL: f64 = 1e-9;

/// Deterministic k-means restarts; the lowest within-cluster sum of squares wins.
const REFINEMENT_RESTARTS: u64 = 4;

/// Output of [`spectral_clustering`].
#[derive(Debug, Clone)]
pub struct SpectralClustering {
    /// `n_vertices × n_components`; column `j` is the eigenvector of the
    /// `j`-th smallest (non-trivial, unless `skip_trivial` is off) eigenvalue.
    pub embedding: Array2<f64>,
    /// Normalized-Laplacian eigenvalues of the embedding columns, ascending.
    pub eigenvalues: Vec<f64>,
    /// Cluster label per vertex, in `0..n_components`.
    pub labels: Vec<usize>,
    /// Operator applications spent by the eigensolver.
    pub iterations: usize,
}

/// Eigenvectors of the normalized Laplacian plus k-means labels.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] for parameters failing
///   [`SpectralParameters::validate`].
/// - [`Error::InvalidEmbeddingDim`] if the graph has fewer vertices than
///   eigenvectors requested (counting the trivial one when it is skipped).
/// - [`Error::SolverDiverged`] if Lanczos exhausts its iteration budget.
/// - [`Error::ResourceExhausted`] if scratch space cannot be allocated.
/// - [`Error::Backend`] if the k-means refinement fails.
pub fn spectral_clustering(
    graph: &CsrGraph,
    params: &SpectralParameters,
) -> Result<SpectralClustering> {
    params.validate()?;
    let n = graph.n_vertices();
    let k = params.n_components;
    let start = usize::from(params.skip_trivial);
    let want = params.wanted_eigenpairs();
    if want > n {
        return Err(Error::InvalidEmbeddingDim { k, n });
    }

    let op = if graph.is_symmetric(SYMMETRY_TOL) {
        NormalizedAffinity::new(graph)?
    } else {
        warn!(
            "spectral embedding: graph with {} vertices and {} edges is not symmetric; \
             using its symmetric part (A + A^T) / 2",
            n,
            graph.nnz()
        );
        NormalizedAffinity::symmetric_part(graph)?
    };

    let tol = params.resolved_eigensolver_tolerance();
    let max_iter = params.resolved_eigensolver_max_iterations();
    debug!("spectral embedding: n={n}, nnz={}, k={k}, want={want}", graph.nnz());

    let pairs = largest_eigenpairs(&op, want, tol, max_iter)?;

    // θ(M) = 2 - λ(L): descending θ is ascending λ.
    let eigenvalues: Vec<f64> = pairs.values[start..].iter().map(|t| 2.0 - t).collect();
    let embedding = pairs.vectors.slice(s![.., start..want]).to_owned();
    debug!(
        "spectral embedding: converged in {} iterations, eigenvalues {:?}",
        pairs.iterations, eigenvalues
    );

    let labels = refine_labels(&embedding, params)?;

    Ok(SpectralClustering {
        embedding,
        eigenvalues,
        labels,
        iterations: pairs.iterations,
    })
}

/// k-means over the embedding rows, delegated to `clump`.
fn refine_labels(embedding: &Array2<f64>, params: &SpectralParameters) -> Result<Vec<usize>> {
    let (n, d) = embedding.dim();
    let k = params.n_components;

    let mut rows: Vec<Vec<f32>> = try_with_capacity(n)?;
    for row in embedding.rows() {
        let mut r = try_with_capacity(d)?;
        r.extend(row.iter().map(|&x| x as f32));
        rows.push(r);
    }
    let mut refs: Vec<&[f32]> = try_with_capacity(n)?;
    refs.extend(rows.iter().map(Vec::as_slice));

    let mut best: Option<(f32, Vec<usize>)> = None;
    for t in 0..REFINEMENT_RESTARTS {
        let cfg = clump::KMeansConfig {
            k,
            max_iters: params.resolved_refinement_max_iterations(),
            tol: params.resolved_refinement_tolerance() as f32,
            seed: 42u64.wrapping_add(t),
        };
        let res = clump::kmeans(&refs, &cfg)
            .map_err(|e| Error::Backend(format!("clump kmeans failed: {e}")))?;

        let wcss: f32 = res
            .assignments
            .iter()
            .zip(&refs)
            .map(|(&a, x)| {
                x.iter()
                    .zip(&res.centroids[a])
                    .map(|(xi, ci)| (xi - ci) * (xi - ci))
                    .sum::<f32>()
            })
            .sum();
        debug!("spectral embedding: k-means restart {t}, wcss={wcss:.4e}");

        match &mut best {
            Some((best_wcss, _)) if *best_wcss <= wcss => {}
            _ => best = Some((wcss, res.assignments)),
        }
    }

    best.map(|(_, labels)| labels)
        .ok_or_else(|| Error::Backend("k-means produced no assignment".into()))
}

/// Spectral embedding: `n_vertices × n_components`, one row per vertex.
///
/// Eigenvectors are unit-norm columns with arbitrary sign.
pub fn embed(graph: &CsrGraph, params: &SpectralParameters) -> Result<Array2<f64>> {
    Ok(spectral_clustering(graph, params)?.embedding)
}

/// [`embed`] into a caller-provided buffer.
///
/// The shape is checked before any solver work. On error the buffer contents
/// are unspecified.
pub fn embed_into(
    graph: &CsrGraph,
    params: &SpectralParameters,
    mut out: ArrayViewMut2<'_, f64>,
) -> Result<()> {
    let expected = (graph.n_vertices(), params.n_components);
    if out.dim() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            found: out.dim(),
        });
    }
    let embedding = embed(graph, params)?;
    out.assign(&embedding);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::jacobi_eigh;
    use crate::sparse::CooGraph;
    use ndarray::Array1;
    use proptest::prelude::*;

    fn csr(n: usize, edges: &[(usize, usize, f64)]) -> CsrGraph {
        CsrGraph::from_coo(&CooGraph::from_edges(n, edges).unwrap()).unwrap()
    }

    fn undirected(edges: &[(usize, usize, f64)]) -> Vec<(usize, usize, f64)> {
        edges
            .iter()
            .flat_map(|&(u, v, w)| [(u, v, w), (v, u, w)])
            .collect()
    }

    fn path(n: usize) -> CsrGraph {
        let edges: Vec<_> = (0..n - 1).map(|i| (i, i + 1, 1.0)).collect();
        csr(n, &undirected(&edges))
    }

    /// Dense L_sym built straight from the definition.
    fn dense_normalized_laplacian(graph: &CsrGraph) -> Array2<f64> {
        let n = graph.n_vertices();
        let deg = graph.degree_vector().unwrap();
        let mut l = Array2::<f64>::eye(n);
        for r in 0..n {
            for (c, w) in graph.row(r) {
                l[[r, c]] -= w / (deg[r] * deg[c]).sqrt();
            }
        }
        l
    }

    fn abs_dot(a: ndarray::ArrayView1<'_, f64>, b: ndarray::ArrayView1<'_, f64>) -> f64 {
        a.dot(&b).abs() / (a.dot(&a).sqrt() * b.dot(&b).sqrt())
    }

    #[test]
    fn test_path_graph_scenario() {
        let graph = path(4);
        assert_eq!(graph.row_offsets(), &[0, 1, 3, 5, 6]);

        let u = embed(&graph, &SpectralParameters::new(2)).unwrap();
        assert_eq!(u.dim(), (4, 2));

        let first = u.column(0);
        let increasing = (0..3).all(|i| first[i] < first[i + 1]);
        let decreasing = (0..3).all(|i| first[i] > first[i + 1]);
        assert!(increasing || decreasing, "first component not monotone: {first}");
    }

    #[test]
    fn test_path_graph_eigenvalues() {
        // Normalized Laplacian of P4: 0, 1/2, 3/2, 2.
        let result = spectral_clustering(&path(4), &SpectralParameters::new(2)).unwrap();
        assert!((result.eigenvalues[0] - 0.5).abs() < 1e-8);
        assert!((result.eigenvalues[1] - 1.5).abs() < 1e-8);

        // Fiedler vector of L_sym is D^{1/2} (1, 1/2, -1/2, -1), up to scale.
        let expected = Array1::from(vec![1.0, 0.5 * 2f64.sqrt(), -0.5 * 2f64.sqrt(), -1.0]);
        assert!(abs_dot(result.embedding.column(0), expected.view()) > 1.0 - 1e-8);
    }

    #[test]
    fn test_keep_trivial_vector() {
        let graph = path(4);
        let params = SpectralParameters::new(1).with_skip_trivial(false);
        let result = spectral_clustering(&graph, &params).unwrap();
        assert!(result.eigenvalues[0].abs() < 1e-8);

        let sqrt_deg = Array1::from(
            graph
                .degree_vector()
                .unwrap()
                .into_iter()
                .map(f64::sqrt)
                .collect::<Vec<_>>(),
        );
        assert!(abs_dot(result.embedding.column(0), sqrt_deg.view()) > 1.0 - 1e-8);
    }

    #[test]
    fn test_agrees_with_dense_reference_with_restarts() {
        // Long enough that the Krylov space (19 vectors) forces restarts.
        let n = 60;
        let graph = path(n);
        let params = SpectralParameters::new(2);
        let result = spectral_clustering(&graph, &params).unwrap();
        assert!(result.iterations > 19);

        let lap = dense_normalized_laplacian(&graph);
        let (vals, vecs) = jacobi_eigh(&lap, 1e-12, 100);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| vals[i].total_cmp(&vals[j]));

        for j in 0..2 {
            let idx = order[j + 1];
            assert!(
                (result.eigenvalues[j] - vals[idx]).abs() < 1e-6,
                "λ{} = {} vs dense {}",
                j + 1,
                result.eigenvalues[j],
                vals[idx]
            );
            assert!(abs_dot(result.embedding.column(j), vecs.column(idx)) > 0.999);
        }
    }

    #[test]
    fn test_two_cliques_split_by_labels() {
        let mut edges = Vec::new();
        for base in [0, 5] {
            for i in 0..5 {
                for j in (i + 1)..5 {
                    edges.push((base + i, base + j, 1.0));
                }
            }
        }
        edges.push((4, 5, 0.1));
        let graph = csr(10, &undirected(&edges));

        let params = SpectralParameters::new(2).with_refinement(1e-6, 50);
        let result = spectral_clustering(&graph, &params).unwrap();
        assert_eq!(result.labels.len(), 10);
        assert!(result.labels.iter().all(|&l| l < 2));

        // The Fiedler vector separates the cliques by sign.
        let fiedler = result.embedding.column(0);
        for i in 1..5 {
            assert_eq!(fiedler[i].signum(), fiedler[0].signum());
            assert_eq!(fiedler[5 + i].signum(), fiedler[5].signum());
        }
        assert_ne!(fiedler[0].signum(), fiedler[5].signum());
    }

    #[test]
    fn test_repeated_calls_agree_up_to_sign() {
        let graph = path(30);
        let params = SpectralParameters::new(3);
        let a = embed(&graph, &params).unwrap();
        let b = embed(&graph, &params).unwrap();
        for j in 0..3 {
            let sign = if a.column(j).dot(&b.column(j)) < 0.0 { -1.0 } else { 1.0 };
            for i in 0..30 {
                assert!((a[[i, j]] - sign * b[[i, j]]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_single_vertex_is_well_defined_error() {
        let graph = csr(1, &[]);
        let err = embed(&graph, &SpectralParameters::new(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidEmbeddingDim { k: 1, n: 1 }));
    }

    #[test]
    fn test_single_vertex_keeping_trivial_vector() {
        let graph = csr(1, &[]);
        let params = SpectralParameters::new(1).with_skip_trivial(false);
        let u = embed(&graph, &params).unwrap();
        assert_eq!(u.dim(), (1, 1));
        assert!((u[[0, 0]].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_diverged_solve_is_reported() {
        let graph = path(200);
        let params = SpectralParameters::new(2)
            .with_eigensolver_tolerance(1e-12)
            .with_eigensolver_max_iterations(20);
        match embed(&graph, &params) {
            Err(Error::SolverDiverged { iterations, .. }) => assert_eq!(iterations, 20),
            other => panic!("expected SolverDiverged, got {other:?}"),
        }
    }

    #[test]
    fn test_embed_into_fills_buffer() {
        let graph = path(6);
        let params = SpectralParameters::new(2);
        let mut out = Array2::<f64>::from_elem((6, 2), f64::NAN);
        embed_into(&graph, &params, out.view_mut()).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out, embed(&graph, &params).unwrap());
    }

    #[test]
    fn test_embed_into_rejects_wrong_shape() {
        let graph = path(6);
        let mut out = Array2::<f64>::zeros((6, 3));
        let err = embed_into(&graph, &SpectralParameters::new(2), out.view_mut()).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: (6, 2),
                found: (6, 3)
            }
        ));
    }

    #[test]
    fn test_asymmetric_graph_uses_symmetric_part() {
        // One direction only: out-degrees differ from the undirected ones, but
        // the solve must still succeed on the symmetric part.
        let graph = csr(5, &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0), (4, 0, 1.0)]);
        assert!(!graph.is_symmetric(SYMMETRY_TOL));
        let u = embed(&graph, &SpectralParameters::new(2)).unwrap();
        assert_eq!(u.dim(), (5, 2));
        assert!(u.iter().all(|v| v.is_finite()));
    }

    /// `‖L u - λ u‖` for a unit column `u` against the dense Laplacian.
    fn dense_residual(lap: &Array2<f64>, u: ndarray::ArrayView1<'_, f64>, lambda: f64) -> f64 {
        let r = lap.dot(&u) - &u * lambda;
        r.dot(&r).sqrt()
    }

    #[test]
    fn test_disconnected_paths_recover_repeated_eigenvalues() {
        // Two paths of 30: every eigenvalue appears twice, and n = 60 exceeds
        // the 19-vector Krylov space, so each copy has to be found separately.
        for len in [30usize, 60] {
            let mut edges: Vec<_> = (0..len - 1).map(|i| (i, i + 1, 1.0)).collect();
            edges.extend((0..len - 1).map(|i| (len + i, len + i + 1, 1.0)));
            let n = 2 * len;
            let graph = csr(n, &undirected(&edges));

            let result = spectral_clustering(&graph, &SpectralParameters::new(2)).unwrap();

            let lap = dense_normalized_laplacian(&graph);
            let (mut vals, _) = jacobi_eigh(&lap, 1e-12, 100);
            vals.sort_by(f64::total_cmp);
            assert!(vals[1].abs() < 1e-9, "dense reference lost the second zero");

            // Skipping the trivial vector leaves the other indicator, then the
            // first path frequency 1 - cos(π / (len - 1)).
            let fiedler = 1.0 - (std::f64::consts::PI / (len - 1) as f64).cos();
            assert!((vals[2] - fiedler).abs() < 1e-9);
            for j in 0..2 {
                assert!(
                    (result.eigenvalues[j] - vals[j + 1]).abs() < 1e-6,
                    "len={len}: λ{} = {} vs dense {}",
                    j + 1,
                    result.eigenvalues[j],
                    vals[j + 1]
                );
                let col = result.embedding.column(j);
                assert!(dense_residual(&lap, col, result.eigenvalues[j]) < 1e-5);
            }

            // Column 0 lives in the null space: constant times sqrt-degree on each path.
            let col = result.embedding.column(0);
            let deg = graph.degree_vector().unwrap();
            for half in [0..len, len..n] {
                let ratio = col[half.start] / deg[half.start].sqrt();
                for i in half {
                    assert!((col[i] / deg[i].sqrt() - ratio).abs() < 1e-3);
                }
            }
        }
    }

    fn arb_connected_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize, f64)>)> {
        (5usize..30).prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec((0..n, 0..n, 0.5f64..1.0), 0..60),
            )
                .prop_map(|(n, extra)| {
                    // A ring keeps the graph connected.
                    let mut edges: Vec<_> = (0..n).map(|i| (i, (i + 1) % n, 1.0)).collect();
                    edges.extend(extra.into_iter().filter(|&(u, v, _)| u != v));
                    (n, undirected(&edges))
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_embedding_shape_and_orthogonality(
            (n, edges) in arb_connected_graph(),
            k in 1usize..4,
        ) {
            let graph = csr(n, &edges);
            let u = embed(&graph, &SpectralParameters::new(k)).unwrap();
            prop_assert_eq!(u.dim(), (n, k));
            prop_assert!(u.iter().all(|v| v.is_finite()));

            let sqrt_deg: Array1<f64> = graph
                .degree_vector()
                .unwrap()
                .into_iter()
                .map(f64::sqrt)
                .collect();
            let gram = u.t().dot(&u);
            for a in 0..k {
                prop_assert!(abs_dot(u.column(a), sqrt_deg.view()) < 1e-3);
                for b in 0..k {
                    let want = if a == b { 1.0 } else { 0.0 };
                    prop_assert!((gram[[a, b]] - want).abs() < 1e-8);
                }
            }
        }
    }
}
