// src/builder.rs

//! End-to-end reduced-basis generation from a batched waveform source.

use crate::basis::{SvdBasis, SvdMethod};
use crate::error::{BasisError, Result, ThreadSafeStdError};
use crate::rsvd::RandomizedSvdConfig;
use crate::storage::{basis_path, singular_values_path, stats_path};
use crate::transforms::{ChannelMap, Waveform};
use crate::validation::{BasisValidator, ValidationStats, DEFAULT_VALIDATION_RANKS};
use log::{debug, info};
use ndarray::{s, Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::time::Instant;

/// One batch of samples from a [`WaveformSource`].
#[derive(Debug, Clone)]
pub struct WaveformBatch {
    /// Source parameters, one row per sample.
    pub parameters: Array2<f64>,
    /// Frequency-domain strain per channel. Shape: `(batch_rows, signal_length)`
    pub strain: ChannelMap<Array2<Complex64>>,
}

impl WaveformBatch {
    /// Number of samples in the batch, taken from the strain arrays.
    pub fn len(&self) -> usize {
        self.strain.values().next().map_or(0, |a| a.nrows())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset that produces waveforms through a configurable list of
/// per-sample processing stages (e.g. whitening, noise addition, packaging).
pub trait WaveformSource {
    /// Identifies a processing stage.
    type Stage: Clone;

    /// Processing stages currently applied to each sample, in order.
    fn stages(&self) -> &[Self::Stage];

    /// Installs `stages` and returns the previously installed list.
    fn replace_stages(&mut self, stages: Vec<Self::Stage>) -> Vec<Self::Stage>;

    /// Produces sample `index` with its parameters.
    fn sample(&self, index: usize) -> std::result::Result<(Array1<f64>, Waveform), ThreadSafeStdError>;

    /// Iterates over the dataset in order, `batch_size` samples at a time.
    /// The final batch may be shorter.
    fn batches(
        &self,
        batch_size: usize,
    ) -> Box<dyn Iterator<Item = std::result::Result<WaveformBatch, ThreadSafeStdError>> + '_>;
}

/// Scope in which a source runs with some of its stages removed.
///
/// The original stage list is reinstalled when the guard is dropped, on every
/// exit path.
pub struct ReducedStages<'a, S: WaveformSource> {
    source: &'a mut S,
    original: Option<Vec<S::Stage>>,
}

impl<'a, S: WaveformSource> ReducedStages<'a, S> {
    /// Removes every stage for which `omit` returns true.
    pub fn new<F>(source: &'a mut S, omit: F) -> Self
    where
        F: Fn(&S::Stage) -> bool,
    {
        let kept: Vec<S::Stage> = source.stages().iter().filter(|&stage| !omit(stage)).cloned().collect();
        let n_kept = kept.len();
        let original = source.replace_stages(kept);
        debug!(
            "Omitting {} of {} waveform stages for reduced-basis generation.",
            original.len().saturating_sub(n_kept),
            original.len()
        );
        ReducedStages {
            source,
            original: Some(original),
        }
    }
}

impl<S: WaveformSource> Deref for ReducedStages<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.source
    }
}

impl<S: WaveformSource> DerefMut for ReducedStages<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.source
    }
}

impl<S: WaveformSource> Drop for ReducedStages<'_, S> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.source.replace_stages(original);
        }
    }
}

/// Settings for [`generate_and_save_reduced_basis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisBuilderConfig {
    /// Size of the training set.
    pub num_train: usize,
    /// Size of the held-out test set.
    pub num_test: usize,
    /// Number of samples requested per batch from the source.
    pub batch_size: usize,
    /// Number of basis elements; `0` keeps all.
    pub num_basis: usize,
    pub method: SvdMethod,
    pub randomized: RandomizedSvdConfig,
    /// Directory for V, singular-value and statistics files. Nothing is written,
    /// and no validation runs, when `None`.
    pub output_dir: Option<PathBuf>,
    /// Appended to the channel name in every file name.
    pub suffix: String,
    pub validation_ranks: Vec<usize>,
}

impl Default for BasisBuilderConfig {
    fn default() -> Self {
        BasisBuilderConfig {
            num_train: 50_000,
            num_test: 10_000,
            batch_size: 1000,
            num_basis: 200,
            method: SvdMethod::Randomized,
            randomized: RandomizedSvdConfig::default(),
            output_dir: None,
            suffix: String::new(),
            validation_ranks: DEFAULT_VALIDATION_RANKS.to_vec(),
        }
    }
}

/// Result of [`generate_and_save_reduced_basis`].
#[derive(Debug, Clone)]
pub struct ReducedBasis {
    /// One fitted basis per channel.
    pub bases: ChannelMap<SvdBasis>,
    /// Paths of the saved V matrices, in channel order. Empty without an output dir.
    pub v_paths: Vec<PathBuf>,
    /// Validation statistics per channel. Empty without an output dir.
    pub validation: ChannelMap<ValidationStats>,
}

/// Collects `num_train + num_test` waveforms from `source` with the stages
/// matching `omit` disabled, fits one basis per channel on the training part,
/// and, if an output directory is configured, saves V and the singular values
/// and validates each basis on the test part.
///
/// The stages of `source` are restored before this returns, whether or not
/// it succeeds.
///
/// # Errors
/// - `InvalidArgument` for a zero training size or batch size, an empty probe
///   sample, or batches whose channels or lengths disagree with the probe.
/// - `InsufficientData` if the source is exhausted before the buffers fill.
/// - `Source`, `Linalg` and `Storage` errors are propagated unchanged.
pub fn generate_and_save_reduced_basis<S, F>(
    source: &mut S,
    omit: F,
    config: &BasisBuilderConfig,
) -> Result<ReducedBasis>
where
    S: WaveformSource,
    F: Fn(&S::Stage) -> bool,
{
    if config.num_train == 0 {
        return Err(BasisError::InvalidArgument("num_train must be greater than 0.".into()));
    }
    if config.batch_size == 0 {
        return Err(BasisError::InvalidArgument("batch_size must be greater than 0.".into()));
    }

    let reduced = ReducedStages::new(source, omit);
    let collected = collect_training_data(&*reduced, config);
    drop(reduced);
    let data = collected?;

    info!("Generating SVD basis for {} channels.", data.len());
    let start_time = Instant::now();
    let mut bases = ChannelMap::new();
    for (channel, samples) in &data {
        let mut basis = SvdBasis::new();
        basis.fit_with_config(
            samples.slice(s![..config.num_train, ..]),
            config.num_basis,
            config.method,
            &config.randomized,
        )?;
        info!("  {} done", channel);
        bases.insert(channel.clone(), basis);
    }
    info!("Basis generation took {:.0?}.", start_time.elapsed());

    let mut v_paths = Vec::new();
    let mut validation = ChannelMap::new();
    if let Some(out_dir) = config.output_dir.as_deref() {
        info!("Saving SVD basis matrices to {:?}", out_dir);
        for (channel, basis) in &bases {
            let v_path = basis_path(out_dir, channel, &config.suffix);
            basis.save_to_storage(&v_path)?;
            basis.save_singular_values(singular_values_path(out_dir, channel, &config.suffix))?;
            v_paths.push(v_path);
        }

        if config.num_test > 0 {
            info!("Testing SVD basis matrices, saving stats to {:?}", out_dir);
            let validator = BasisValidator::new(config.validation_ranks.clone());
            for (channel, basis) in &bases {
                info!("Channel {}:", channel);
                let test_data = data[channel].slice(s![config.num_train.., ..]);
                let stats = validator.evaluate(basis, test_data)?;
                stats.save(stats_path(out_dir, channel, &config.suffix))?;
                validation.insert(channel.clone(), stats);
            }
        } else {
            debug!("num_test is 0; skipping basis validation and writing no stats files.");
        }
    }

    Ok(ReducedBasis {
        bases,
        v_paths,
        validation,
    })
}

/// Fills one `(num_train + num_test, signal_length)` buffer per channel from
/// the source's batches.
fn collect_training_data<S: WaveformSource>(
    source: &S,
    config: &BasisBuilderConfig,
) -> Result<ChannelMap<Array2<Complex64>>> {
    let (_, probe) = source.sample(0).map_err(BasisError::Source)?;
    let signal_length = probe
        .values()
        .next()
        .map(|h| h.len())
        .ok_or_else(|| BasisError::InvalidArgument("Probe sample contains no channels.".into()))?;

    let needed = config.num_train + config.num_test;
    let mut buffers: ChannelMap<Array2<Complex64>> = probe
        .keys()
        .map(|channel| (channel.clone(), Array2::zeros((needed, signal_length))))
        .collect();

    info!(
        "Collecting {} samples of length {} for channels {:?} for reduced basis generation.",
        needed,
        signal_length,
        buffers.keys().collect::<Vec<_>>()
    );
    let start_time = Instant::now();

    let mut filled = 0;
    for (batch_index, batch) in source.batches(config.batch_size).enumerate() {
        let batch = batch.map_err(BasisError::Source)?;
        let n = batch.len().min(needed - filled);

        for (channel, buffer) in buffers.iter_mut() {
            let strain = batch.strain.get(channel).ok_or_else(|| {
                BasisError::InvalidArgument(format!("Batch {} is missing channel {}.", batch_index, channel))
            })?;
            if strain.ncols() != signal_length || strain.nrows() < n {
                return Err(BasisError::InvalidArgument(format!(
                    "Batch {} channel {} has shape {:?}; expected at least ({}, {}).",
                    batch_index,
                    channel,
                    strain.dim(),
                    n,
                    signal_length
                )));
            }
            buffer
                .slice_mut(s![filled..filled + n, ..])
                .assign(&strain.slice(s![..n, ..]));
        }

        filled += n;
        if filled == needed {
            break;
        }
    }

    if filled < needed {
        return Err(BasisError::InsufficientData {
            needed,
            available: filled,
        });
    }
    info!("Done. This took {:.0?}.", start_time.elapsed());
    Ok(buffers)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;
