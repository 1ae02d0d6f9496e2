// src/transforms.rs

//! Pipeline adapters that compress or decompress per-detector data with a
//! pre-populated [`SvdBasis`].

use crate::basis::SvdBasis;
use crate::error::Result;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-channel (detector) data, ordered by channel name.
pub type ChannelMap<T> = BTreeMap<String, T>;

/// A single waveform: one frequency series (or coefficient vector) per channel.
pub type Waveform = ChannelMap<Array1<Complex64>>;

/// A stage of a per-sample waveform pipeline.
pub trait WaveformTransform: Send + Sync {
    fn transform(&self, waveform: Waveform) -> Result<Waveform>;
}

/// Maps every channel's frequency series onto basis coefficients.
#[derive(Debug, Clone)]
pub struct ApplySvd {
    svd_basis: Arc<SvdBasis>,
}

impl ApplySvd {
    pub fn new(svd_basis: Arc<SvdBasis>) -> Self {
        ApplySvd { svd_basis }
    }

    pub fn basis(&self) -> &SvdBasis {
        &self.svd_basis
    }

    /// Batched form: each channel holds `(n_samples, signal_length)` rows.
    pub fn apply_batch(&self, uncompressed: &ChannelMap<Array2<Complex64>>) -> Result<ChannelMap<Array2<Complex64>>> {
        uncompressed
            .iter()
            .map(|(channel, fseries)| {
                let coefficients = self.svd_basis.fseries_to_basis_coefficients(fseries.view())?;
                Ok((channel.clone(), coefficients))
            })
            .collect()
    }
}

impl WaveformTransform for ApplySvd {
    fn transform(&self, uncompressed: Waveform) -> Result<Waveform> {
        uncompressed
            .into_iter()
            .map(|(channel, fseries)| Ok((channel, self.svd_basis.project_sample(fseries.view())?)))
            .collect()
    }
}

/// Maps every channel's basis coefficients back to a frequency series.
#[derive(Debug, Clone)]
pub struct UndoSvd {
    svd_basis: Arc<SvdBasis>,
}

impl UndoSvd {
    pub fn new(svd_basis: Arc<SvdBasis>) -> Self {
        UndoSvd { svd_basis }
    }

    pub fn basis(&self) -> &SvdBasis {
        &self.svd_basis
    }

    /// Batched form: each channel holds `(n_samples, rank)` coefficient rows.
    pub fn apply_batch(&self, compressed: &ChannelMap<Array2<Complex64>>) -> Result<ChannelMap<Array2<Complex64>>> {
        compressed
            .iter()
            .map(|(channel, coefficients)| {
                let fseries = self.svd_basis.basis_coefficients_to_fseries(coefficients.view())?;
                Ok((channel.clone(), fseries))
            })
            .collect()
    }
}

impl WaveformTransform for UndoSvd {
    fn transform(&self, compressed: Waveform) -> Result<Waveform> {
        compressed
            .into_iter()
            .map(|(channel, coefficients)| Ok((channel, self.svd_basis.reconstruct_sample(coefficients.view())?)))
            .collect()
    }
}

/// Runs `waveform` through `stages` in order.
pub fn apply_all(stages: &[Box<dyn WaveformTransform>], waveform: Waveform) -> Result<Waveform> {
    stages.iter().try_fold(waveform, |w, stage| stage.transform(w))
}

#[cfg(test)]
mod transforms_tests {
    use super::*;
    use crate::basis::SvdMethod;
    use crate::error::BasisError;
    use ndarray::s;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rand_distr::StandardNormal;

    fn fitted_basis(signal_length: usize, rank: usize) -> Arc<SvdBasis> {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let data = Array2::from_shape_fn((3 * signal_length, signal_length), |_| {
            Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
        });
        let mut basis = SvdBasis::new();
        basis.fit(data.view(), rank, SvdMethod::Exact).unwrap();
        Arc::new(basis)
    }

    #[test]
    fn test_compress_then_decompress_preserves_keys_and_shapes() {
        let basis = fitted_basis(20, 6);
        let compress = ApplySvd::new(basis.clone());
        let decompress = UndoSvd::new(basis);

        let mut waveform = Waveform::new();
        waveform.insert("H1".to_string(), Array1::from_elem(20, Complex64::new(1.0, -1.0)));
        waveform.insert("L1".to_string(), Array1::from_elem(20, Complex64::new(0.0, 2.0)));

        let compressed = compress.transform(waveform.clone()).unwrap();
        assert_eq!(compressed.keys().collect::<Vec<_>>(), vec!["H1", "L1"]);
        assert!(compressed.values().all(|c| c.len() == 6));

        let restored = decompress.transform(compressed).unwrap();
        assert_eq!(restored.keys().collect::<Vec<_>>(), waveform.keys().collect::<Vec<_>>());
        assert!(restored.values().all(|h| h.len() == 20));
    }

    #[test]
    fn test_full_rank_pipeline_is_identity() {
        let basis = fitted_basis(10, 0);
        let stages: Vec<Box<dyn WaveformTransform>> = vec![
            Box::new(ApplySvd::new(basis.clone())),
            Box::new(UndoSvd::new(basis)),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let h = Array1::from_shape_fn(10, |_| Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal)));
        let mut waveform = Waveform::new();
        waveform.insert("V1".to_string(), h.clone());

        let out = apply_all(&stages, waveform).unwrap();
        for (a, b) in out["V1"].iter().zip(h.iter()) {
            assert!((a - b).norm() < 1e-10);
        }
    }

    #[test]
    fn test_batched_adapters_match_basis() {
        let basis = fitted_basis(16, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let batch = Array2::from_shape_fn((5, 16), |_| Complex64::new(rng.sample(StandardNormal), 0.0));
        let mut input = ChannelMap::new();
        input.insert("H1".to_string(), batch.clone());

        let compressed = ApplySvd::new(basis.clone()).apply_batch(&input).unwrap();
        assert_eq!(compressed["H1"].dim(), (5, 4));
        assert_eq!(compressed["H1"], basis.fseries_to_basis_coefficients(batch.view()).unwrap());
        let single = basis.project_sample(batch.row(0)).unwrap();
        for (a, b) in compressed["H1"].slice(s![0, ..]).iter().zip(single.iter()) {
            assert!((a - b).norm() < 1e-12);
        }

        let restored = UndoSvd::new(basis).apply_batch(&compressed).unwrap();
        assert_eq!(restored["H1"].dim(), (5, 16));
    }

    #[test]
    fn test_wrong_length_channel_fails() {
        let basis = fitted_basis(8, 3);
        let mut waveform = Waveform::new();
        waveform.insert("H1".to_string(), Array1::zeros(8));
        waveform.insert("L1".to_string(), Array1::zeros(7));
        assert!(matches!(
            ApplySvd::new(basis).transform(waveform),
            Err(BasisError::InvalidArgument(_))
        ));
    }
}
