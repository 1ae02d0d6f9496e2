// src/basis.rs

use crate::error::{BasisError, Result};
use crate::rsvd::{conjugate_transpose, randomized_svd, RandomizedSvdConfig};
use crate::storage::{read_record, write_record};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{JobSvd, SVDDCInto};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Factorization used to compute the basis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvdMethod {
    /// Approximate truncated SVD from a seeded Gaussian sketch.
    #[default]
    Randomized,
    /// Full thin SVD via LAPACK divide-and-conquer, truncated afterwards.
    Exact,
}

impl FromStr for SvdMethod {
    type Err = BasisError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "random" | "randomized" => Ok(SvdMethod::Randomized),
            "exact" => Ok(SvdMethod::Exact),
            other => Err(BasisError::InvalidArgument(format!(
                "Unsupported SVD method: {}.",
                other
            ))),
        }
    }
}

impl fmt::Display for SvdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvdMethod::Randomized => write!(f, "randomized"),
            SvdMethod::Exact => write!(f, "exact"),
        }
    }
}

#[derive(Debug, Clone)]
struct BasisMatrices {
    /// Shape: (signal_length, rank)
    v: Array2<Complex64>,
    /// Conjugate transpose of `v`. Shape: (rank, signal_length)
    vh: Array2<Complex64>,
    /// Spectrum of the training matrix. Absent when the basis was built from a bare V.
    singular_values: Option<Array1<f64>>,
}

impl BasisMatrices {
    fn from_v(v: Array2<Complex64>, singular_values: Option<Array1<f64>>) -> Self {
        let vh = conjugate_transpose(v.view());
        BasisMatrices { v, vh, singular_values }
    }

    fn from_vh(vh: Array2<Complex64>, singular_values: Array1<f64>) -> Self {
        let v = conjugate_transpose(vh.view());
        BasisMatrices {
            v,
            vh,
            singular_values: Some(singular_values),
        }
    }
}

/// Truncated SVD basis for compressing frequency-series data.
///
/// For a training matrix `X = U diag(s) V^H` (rows are samples), the basis
/// keeps the leading `rank` right singular vectors as the columns of `V`.
/// Compression is `coefficients = data @ V` and reconstruction is
/// `data' = coefficients @ V^H`.
///
/// The basis is either empty or holds all of `V`, `V^H` and the rank; it is
/// populated by [`SvdBasis::fit`], [`SvdBasis::load_from_storage`] or
/// [`SvdBasis::load_from_matrix`], each of which replaces any prior state.
#[derive(Debug, Clone, Default)]
pub struct SvdBasis {
    matrices: Option<BasisMatrices>,
}

impl SvdBasis {
    /// Creates an empty basis.
    pub fn new() -> Self {
        SvdBasis { matrices: None }
    }

    /// Builds a basis from a caller-provided `V` of shape `(signal_length, rank)`.
    pub fn from_v(v: Array2<Complex64>) -> Self {
        let mut basis = SvdBasis::new();
        basis.load_from_matrix(v);
        basis
    }

    pub fn is_fitted(&self) -> bool {
        self.matrices.is_some()
    }

    /// Basis matrix, shape `(signal_length, rank)`.
    pub fn v(&self) -> Option<&Array2<Complex64>> {
        self.matrices.as_ref().map(|m| &m.v)
    }

    /// Conjugate transpose of [`SvdBasis::v`], shape `(rank, signal_length)`.
    pub fn vh(&self) -> Option<&Array2<Complex64>> {
        self.matrices.as_ref().map(|m| &m.vh)
    }

    /// Number of retained basis vectors.
    pub fn rank(&self) -> Option<usize> {
        self.matrices.as_ref().map(|m| m.v.ncols())
    }

    /// Length of the signals this basis applies to.
    pub fn signal_length(&self) -> Option<usize> {
        self.matrices.as_ref().map(|m| m.v.nrows())
    }

    /// Singular values of the training matrix, descending.
    ///
    /// Available after fitting, or after [`SvdBasis::load_singular_values`].
    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.matrices.as_ref().and_then(|m| m.singular_values.as_ref())
    }

    /// Fits the basis with the default randomized configuration.
    ///
    /// * `training_data` - shape `(n_samples, signal_length)`.
    /// * `n` - number of basis elements to keep; `0` keeps all.
    /// * `method` - factorization to use.
    pub fn fit(&mut self, training_data: ArrayView2<Complex64>, n: usize, method: SvdMethod) -> Result<()> {
        self.fit_with_config(training_data, n, method, &RandomizedSvdConfig::default())
    }

    /// Fits the basis, replacing any previous state.
    ///
    /// With [`SvdMethod::Randomized`], `n = 0` means `min(n_samples, signal_length)`
    /// and larger requests are clamped to that bound. With [`SvdMethod::Exact`],
    /// the full thin SVD is computed and truncated to `n` components when
    /// `0 < n < natural rank`; otherwise all components are kept.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty training matrix and `Linalg`
    /// if the underlying LAPACK routines fail. On error the previous state is
    /// left untouched.
    pub fn fit_with_config(
        &mut self,
        training_data: ArrayView2<Complex64>,
        n: usize,
        method: SvdMethod,
        config: &RandomizedSvdConfig,
    ) -> Result<()> {
        let (n_samples, signal_length) = training_data.dim();
        if n_samples == 0 || signal_length == 0 {
            return Err(BasisError::InvalidArgument(format!(
                "Training data has shape ({}, {}); both dimensions must be non-zero.",
                n_samples, signal_length
            )));
        }
        let start_time = std::time::Instant::now();

        let matrices = match method {
            SvdMethod::Randomized => {
                let natural_rank = n_samples.min(signal_length);
                let n_components = if n == 0 {
                    natural_rank
                } else if n > natural_rank {
                    warn!(
                        "Requested {} basis elements but training data ({} x {}) supports at most {}; clamping.",
                        n, n_samples, signal_length, natural_rank
                    );
                    natural_rank
                } else {
                    n
                };
                let truncated = randomized_svd(training_data, n_components, config)?;
                BasisMatrices::from_vh(truncated.vh, truncated.singular_values)
            }
            SvdMethod::Exact => {
                let (_, singular_values, vh_full) = training_data.to_owned().svddc_into(JobSvd::Some)?;
                let vh_full = vh_full.ok_or_else(|| {
                    BasisError::InvalidArgument("Thin SVD did not return V^H.".into())
                })?;
                let vh = if n == 0 || n >= vh_full.nrows() {
                    vh_full
                } else {
                    vh_full.slice(s![..n, ..]).to_owned()
                };
                BasisMatrices::from_vh(vh, singular_values)
            }
        };

        info!(
            "Fitted {} SVD basis: {} samples x {} bins -> rank {} in {:?}",
            method,
            n_samples,
            signal_length,
            matrices.v.ncols(),
            start_time.elapsed()
        );
        self.matrices = Some(matrices);
        Ok(())
    }

    fn matrices(&self) -> Result<&BasisMatrices> {
        self.matrices.as_ref().ok_or(BasisError::Unfitted)
    }

    /// Converts frequency series to basis coefficients (`fseries @ V`).
    ///
    /// * `fseries` - shape `(n_samples, signal_length)`.
    ///
    /// Returns coefficients of shape `(n_samples, rank)`.
    pub fn fseries_to_basis_coefficients(&self, fseries: ArrayView2<Complex64>) -> Result<Array2<Complex64>> {
        let m = self.matrices()?;
        if fseries.ncols() != m.v.nrows() {
            return Err(BasisError::InvalidArgument(format!(
                "Frequency series length ({}) does not match basis signal length ({}).",
                fseries.ncols(),
                m.v.nrows()
            )));
        }
        Ok(fseries.dot(&m.v))
    }

    /// Converts basis coefficients back to frequency series (`coefficients @ V^H`).
    ///
    /// * `coefficients` - shape `(n_samples, rank)`.
    pub fn basis_coefficients_to_fseries(&self, coefficients: ArrayView2<Complex64>) -> Result<Array2<Complex64>> {
        let m = self.matrices()?;
        if coefficients.ncols() != m.vh.nrows() {
            return Err(BasisError::InvalidArgument(format!(
                "Coefficient count ({}) does not match basis rank ({}).",
                coefficients.ncols(),
                m.vh.nrows()
            )));
        }
        Ok(coefficients.dot(&m.vh))
    }

    /// Single-sample form of [`SvdBasis::fseries_to_basis_coefficients`].
    pub fn project_sample(&self, fseries: ArrayView1<Complex64>) -> Result<Array1<Complex64>> {
        let projected = self.fseries_to_basis_coefficients(fseries.insert_axis(Axis(0)))?;
        Ok(projected.index_axis_move(Axis(0), 0))
    }

    /// Single-sample form of [`SvdBasis::basis_coefficients_to_fseries`].
    pub fn reconstruct_sample(&self, coefficients: ArrayView1<Complex64>) -> Result<Array1<Complex64>> {
        let reconstructed = self.basis_coefficients_to_fseries(coefficients.insert_axis(Axis(0)))?;
        Ok(reconstructed.index_axis_move(Axis(0), 0))
    }

    /// Replaces the basis with `v`, deriving `V^H` and the rank from it.
    ///
    /// Any previously stored singular values are discarded.
    pub fn load_from_matrix(&mut self, v: Array2<Complex64>) {
        debug!("Loading SVD basis from matrix of shape {:?}", v.dim());
        self.matrices = Some(BasisMatrices::from_v(v, None));
    }

    /// Saves `V` to `path`. `V^H` and the rank are derived again on load.
    ///
    /// # Errors
    /// Returns `Unfitted` for an empty basis and `Storage` if writing fails.
    pub fn save_to_storage<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let m = self.matrices()?;
        write_record(&m.v, path.as_ref())?;
        debug!("Saved SVD basis V {:?} to {:?}", m.v.dim(), path.as_ref());
        Ok(())
    }

    /// Loads `V` from `path`, replacing any existing state.
    pub fn load_from_storage<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let v: Array2<Complex64> = read_record(path.as_ref())?;
        info!("Loaded SVD basis V {:?} from {:?}", v.dim(), path.as_ref());
        self.matrices = Some(BasisMatrices::from_v(v, None));
        Ok(())
    }

    /// Saves the singular-value spectrum to `path`.
    ///
    /// # Errors
    /// Returns `Unfitted` if the basis is empty or carries no spectrum.
    pub fn save_singular_values<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.singular_values().ok_or(BasisError::Unfitted)?;
        write_record(s, path.as_ref())
    }

    /// Attaches a previously saved singular-value spectrum to a loaded basis.
    pub fn load_singular_values<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let s: Array1<f64> = read_record(path.as_ref())?;
        let m = self.matrices.as_mut().ok_or(BasisError::Unfitted)?;
        m.singular_values = Some(s);
        Ok(())
    }
}

#[cfg(test)]
#[path = "basis_tests.rs"]
mod basis_tests;
