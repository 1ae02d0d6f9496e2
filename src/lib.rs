// Truncated SVD bases for frequency-series compression

#![doc = include_str!("../README.md")]

pub mod basis;
pub mod builder;
pub mod error;
pub mod rsvd;
pub mod storage;
pub mod transforms;
pub mod validation;

pub use basis::{SvdBasis, SvdMethod};
pub use builder::{
    generate_and_save_reduced_basis, BasisBuilderConfig, ReducedBasis, ReducedStages, WaveformBatch,
    WaveformSource,
};
pub use error::{BasisError, Result, ThreadSafeStdError};
pub use rsvd::{randomized_svd, RandomizedSvdConfig, TruncatedSvd};
pub use transforms::{ApplySvd, ChannelMap, UndoSvd, Waveform, WaveformTransform};
pub use validation::{BasisValidator, MismatchSummary, ValidationStats, DEFAULT_VALIDATION_RANKS};
