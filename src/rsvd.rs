// src/rsvd.rs

//! Randomized truncated SVD for complex matrices.
//!
//! Follows the range-finder scheme of Halko, Martinsson & Tropp: a Gaussian
//! sketch of the tall orientation of the input is orthonormalised, refined
//! with a few power iterations (each re-orthonormalised by thin QR), and the
//! input is projected onto that range. The dense SVD of the small projected
//! matrix then yields the leading right singular vectors.

use crate::error::{BasisError, Result};
use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2};
use ndarray_linalg::{JobSvd, SVDDCInto, QR};
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Parameters of the randomized factorization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomizedSvdConfig {
    /// Extra sketch columns beyond the requested rank.
    pub oversampling: usize,
    /// Number of power iterations. `None` picks 7 for ranks below 10% of the
    /// smaller matrix dimension and 4 otherwise.
    pub power_iterations: Option<usize>,
    /// Seed for the Gaussian test matrix.
    pub seed: u64,
}

impl Default for RandomizedSvdConfig {
    fn default() -> Self {
        RandomizedSvdConfig {
            oversampling: 10,
            power_iterations: None,
            seed: 0,
        }
    }
}

impl RandomizedSvdConfig {
    fn power_iterations_for(&self, n_components: usize, max_rank: usize) -> usize {
        self.power_iterations.unwrap_or_else(|| {
            if (n_components as f64) < 0.1 * max_rank as f64 {
                7
            } else {
                4
            }
        })
    }
}

/// Leading singular values and right singular vectors of a matrix.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Singular values in descending order.
    pub singular_values: Array1<f64>,
    /// Right singular vectors as rows. Shape: `(n_components, n_cols)`
    pub vh: Array2<Complex64>,
}

/// Returns `M^H`.
pub fn conjugate_transpose(m: ArrayView2<Complex64>) -> Array2<Complex64> {
    m.t().mapv(|z| z.conj())
}

/// Computes an approximate rank-`n_components` SVD of `input`.
///
/// `n_components` must lie in `1..=min(rows, cols)`. The result is a pure
/// function of `input`, `n_components` and `config`.
pub fn randomized_svd(
    input: ArrayView2<Complex64>,
    n_components: usize,
    config: &RandomizedSvdConfig,
) -> Result<TruncatedSvd> {
    let (n_rows, n_cols) = input.dim();
    let max_rank = n_rows.min(n_cols);

    if max_rank == 0 {
        return Err(BasisError::InvalidArgument(format!(
            "Cannot factorize an empty {}x{} matrix.",
            n_rows, n_cols
        )));
    }
    if n_components == 0 || n_components > max_rank {
        return Err(BasisError::InvalidArgument(format!(
            "Requested {} components from a {}x{} matrix; expected 1..={}.",
            n_components, n_rows, n_cols, max_rank
        )));
    }

    let sketch_width = (n_components + config.oversampling).min(max_rank);
    let n_power_iterations = config.power_iterations_for(n_components, max_rank);

    // Work on the tall orientation so the sketch lives in the larger dimension
    // and the dense SVD only sees a sketch_width x min(rows, cols) matrix.
    let work_on_input = n_rows >= n_cols;
    let transposed;
    let tall = if work_on_input {
        input.view()
    } else {
        transposed = conjugate_transpose(input);
        transposed.view()
    };
    let tall_cols = tall.ncols();

    debug!(
        "Randomized SVD of {}x{} matrix: k={}, sketch width={}, power iterations={}, transposed={}",
        n_rows, n_cols, n_components, sketch_width, n_power_iterations, !work_on_input
    );

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let omega = Array2::from_shape_fn((tall_cols, sketch_width), |_| {
        Complex64::new(rng.sample::<f64, _>(StandardNormal), 0.0)
    });

    let (mut q_basis, _) = tall.dot(&omega).qr()?;

    for i in 0..n_power_iterations {
        // M^H Q computed as (Q^H M)^H
        let projected = conjugate_transpose(q_basis.view()).dot(&tall);
        let (w_basis, _) = conjugate_transpose(projected.view()).qr()?;
        let (refined, _) = tall.dot(&w_basis).qr()?;
        q_basis = refined;
        trace!("Power iteration {} complete, Q shape {:?}", i, q_basis.dim());
    }

    // B = Q^H M, shape sketch_width x tall_cols
    let b_projected = conjugate_transpose(q_basis.view()).dot(&tall);
    let (u_b, singular_values, vt_b) = b_projected.svddc_into(JobSvd::Some)?;

    let k = n_components.min(singular_values.len());
    let singular_values = singular_values.slice(s![..k]).to_owned();

    let vh = if work_on_input {
        let vt_b = vt_b.ok_or_else(|| {
            BasisError::InvalidArgument("SVD of projected sketch did not return V^H.".into())
        })?;
        vt_b.slice(s![..k, ..]).to_owned()
    } else {
        // M = A^H ~ Q U_B S W^H, hence A ~ W S (Q U_B)^H.
        let u_b = u_b.ok_or_else(|| {
            BasisError::InvalidArgument("SVD of projected sketch did not return U.".into())
        })?;
        let left = q_basis.dot(&u_b.slice(s![.., ..k]));
        conjugate_transpose(left.view())
    };

    debug_assert_eq!(vh.dim(), (k, n_cols));

    Ok(TruncatedSvd {
        singular_values,
        vh,
    })
}
