// src/validation.rs

use crate::basis::SvdBasis;
use crate::error::{BasisError, Result};
use crate::storage::{read_record, write_record};
use log::{debug, info};
use ndarray::{s, Array1, ArrayView1, ArrayView2, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Candidate ranks scored when none are supplied.
pub const DEFAULT_VALIDATION_RANKS: [usize; 7] = [50, 100, 128, 200, 300, 500, 600];

/// Reconstruction quality of a basis on held-out data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Spectrum of the training matrix, if the basis carried one.
    pub singular_values: Option<Array1<f64>>,
    /// Per-sample mismatch (1 - normalized overlap), keyed by rank.
    pub mismatches: BTreeMap<usize, Array1<f64>>,
    /// Per-sample `max |h - h_reconstructed|`, keyed by rank.
    pub max_deviations: BTreeMap<usize, Array1<f64>>,
}

impl ValidationStats {
    /// Ranks that were scored, ascending.
    pub fn ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.mismatches.keys().copied()
    }

    /// Summary of the mismatch distribution at `rank`.
    pub fn summary(&self, rank: usize) -> Option<MismatchSummary> {
        self.mismatches
            .get(&rank)
            .and_then(|m| MismatchSummary::from_mismatches(m.view()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_record(self, path.as_ref())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_record(path.as_ref())
    }
}

/// Distribution statistics of per-sample mismatches at one rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MismatchSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub max: f64,
    pub median: f64,
    pub p99: f64,
    pub p99_9: f64,
    pub p99_99: f64,
}

impl MismatchSummary {
    /// Returns `None` for an empty input.
    pub fn from_mismatches(mismatches: ArrayView1<f64>) -> Option<Self> {
        if mismatches.is_empty() {
            return None;
        }
        let n = mismatches.len() as f64;
        let mean = mismatches.sum() / n;
        let variance = mismatches.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = mismatches.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(MismatchSummary {
            mean,
            std: variance.sqrt(),
            max: *sorted.last()?,
            median: percentile(&sorted, 50.0)?,
            p99: percentile(&sorted, 99.0)?,
            p99_9: percentile(&sorted, 99.9)?,
            p99_99: percentile(&sorted, 99.99)?,
        })
    }
}

/// Percentile `q` (0..=100) of an ascending slice with linear interpolation
/// between closest ranks. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = (q / 100.0).clamp(0.0, 1.0) * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Mismatch between a signal and its reconstruction, plus the largest
/// pointwise deviation between them.
///
/// # Errors
/// `InvalidArgument` if the two series differ in length.
pub fn reconstruction_scores(
    h: ArrayView1<Complex64>,
    h_reconstructed: ArrayView1<Complex64>,
) -> Result<(f64, f64)> {
    if h.len() != h_reconstructed.len() {
        return Err(BasisError::InvalidArgument(format!(
            "Signal length ({}) does not match reconstruction length ({}).",
            h.len(),
            h_reconstructed.len()
        )));
    }
    let len = h.len() as f64;
    let mut norm1 = 0.0;
    let mut norm2 = 0.0;
    let mut inner = 0.0;
    let mut max_deviation: f64 = 0.0;
    Zip::from(h).and(h_reconstructed).for_each(|&a, &b| {
        norm1 += a.norm_sqr();
        norm2 += b.norm_sqr();
        inner += (a.conj() * b).re;
        max_deviation = max_deviation.max((a - b).norm());
    });
    let (norm1, norm2, inner) = (norm1 / len, norm2 / len, inner / len);
    let overlap = inner / (norm1 * norm2).sqrt();
    Ok((1.0 - overlap, max_deviation))
}

/// Scores a fitted basis against held-out data at several truncation ranks.
#[derive(Debug, Clone)]
pub struct BasisValidator {
    candidate_ranks: Vec<usize>,
}

impl Default for BasisValidator {
    fn default() -> Self {
        BasisValidator::new(DEFAULT_VALIDATION_RANKS.to_vec())
    }
}

impl BasisValidator {
    pub fn new(candidate_ranks: Vec<usize>) -> Self {
        BasisValidator { candidate_ranks }
    }

    pub fn candidate_ranks(&self) -> &[usize] {
        &self.candidate_ranks
    }

    /// Projects every row of `test_data` onto the first `n` basis vectors,
    /// reconstructs it, and records mismatch and max deviation per row.
    ///
    /// Candidate ranks above the basis rank are skipped.
    ///
    /// # Errors
    /// `Unfitted` for an empty basis, `InvalidArgument` when the test data
    /// length differs from the basis signal length.
    pub fn evaluate(&self, basis: &SvdBasis, test_data: ArrayView2<Complex64>) -> Result<ValidationStats> {
        let (v, vh) = match (basis.v(), basis.vh()) {
            (Some(v), Some(vh)) => (v, vh),
            _ => return Err(BasisError::Unfitted),
        };
        if test_data.ncols() != v.nrows() {
            return Err(BasisError::InvalidArgument(format!(
                "Test data length ({}) does not match basis signal length ({}).",
                test_data.ncols(),
                v.nrows()
            )));
        }
        let fitted_rank = v.ncols();

        let mut stats = ValidationStats {
            singular_values: basis.singular_values().cloned(),
            mismatches: BTreeMap::new(),
            max_deviations: BTreeMap::new(),
        };

        for &n in &self.candidate_ranks {
            if n > fitted_rank {
                debug!("Skipping validation rank {} above fitted rank {}", n, fitted_rank);
                continue;
            }
            let coefficients = test_data.dot(&v.slice(s![.., ..n]));
            let reconstructed = coefficients.dot(&vh.slice(s![..n, ..]));

            let scores: Vec<(f64, f64)> = (0..test_data.nrows())
                .into_par_iter()
                .map(|i| reconstruction_scores(test_data.row(i), reconstructed.row(i)))
                .collect::<Result<_>>()?;
            let (mismatches, max_deviations): (Vec<f64>, Vec<f64>) = scores.into_iter().unzip();
            let mismatches = Array1::from_vec(mismatches);

            if let Some(summary) = MismatchSummary::from_mismatches(mismatches.view()) {
                info!("n = {}", n);
                info!("  Mean mismatch = {:e}", summary.mean);
                info!("  Standard deviation = {:e}", summary.std);
                info!("  Max mismatch = {:e}", summary.max);
                info!("  Median mismatch = {:e}", summary.median);
                info!("  Percentiles:");
                info!("    99    -> {:e}", summary.p99);
                info!("    99.9  -> {:e}", summary.p99_9);
                info!("    99.99 -> {:e}", summary.p99_99);
            }

            stats.mismatches.insert(n, mismatches);
            stats.max_deviations.insert(n, Array1::from_vec(max_deviations));
        }
        Ok(stats)
    }
}
