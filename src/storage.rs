// src/storage.rs

//! Array persistence.
//!
//! Every record (a V matrix, a singular-value vector or a validation
//! statistics record) is written as a single bincode document using the
//! standard configuration, one file per record.

use crate::error::{BasisError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File extension used for all persisted records.
pub const RECORD_EXTENSION: &str = "bin";

/// Serializes `value` to `path`, truncating any existing file.
pub fn write_record<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| BasisError::storage(path, format!("Failed to create file: {}", e)))?;
    let mut writer = BufWriter::new(file);

    bincode::serde::encode_into_std_write(value, &mut writer, bincode::config::standard())
        .map_err(|e| BasisError::storage(path, format!("Failed to serialize record: {}", e)))?;
    writer
        .flush()
        .map_err(|e| BasisError::storage(path, format!("Failed to flush file: {}", e)))?;
    Ok(())
}

/// Reads a record previously written with [`write_record`].
pub fn read_record<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| BasisError::storage(path, format!("Failed to open file: {}", e)))?;
    let mut reader = BufReader::new(file);

    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
        .map_err(|e| BasisError::storage(path, format!("Failed to deserialize record: {}", e)))
}

/// `<dir>/V_<channel><suffix>.bin`
pub fn basis_path(dir: &Path, channel: &str, suffix: &str) -> PathBuf {
    dir.join(format!("V_{}{}.{}", channel, suffix, RECORD_EXTENSION))
}

/// `<dir>/s_<channel><suffix>.bin`
pub fn singular_values_path(dir: &Path, channel: &str, suffix: &str) -> PathBuf {
    dir.join(format!("s_{}{}.{}", channel, suffix, RECORD_EXTENSION))
}

/// `<dir>/V_<channel><suffix>_stats.bin`
pub fn stats_path(dir: &Path, channel: &str, suffix: &str) -> PathBuf {
    dir.join(format!("V_{}{}_stats.{}", channel, suffix, RECORD_EXTENSION))
}

#[cfg(test)]
mod storage_tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64;
    use tempfile::tempdir;

    #[test]
    fn file_names_follow_channel_and_suffix() {
        let dir = Path::new("/data/rb");
        assert_eq!(basis_path(dir, "H1", "_v2"), PathBuf::from("/data/rb/V_H1_v2.bin"));
        assert_eq!(singular_values_path(dir, "L1", ""), PathBuf::from("/data/rb/s_L1.bin"));
        assert_eq!(stats_path(dir, "V1", "_x"), PathBuf::from("/data/rb/V_V1_x_stats.bin"));
    }

    #[test]
    fn complex_matrix_survives_write_then_read() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("m.bin");
        let m = array![
            [Complex64::new(1.0, -2.0), Complex64::new(0.5, 0.25)],
            [Complex64::new(-3.0, 0.0), Complex64::new(0.0, 7.5)]
        ];
        write_record(&m, &path)?;
        let back: ndarray::Array2<Complex64> = read_record(&path)?;
        assert_eq!(m, back);
        Ok(())
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let err = read_record::<Vec<f64>, _>(&path).unwrap_err();
        match err {
            BasisError::Storage { path: p, .. } => assert_eq!(p, path),
            other => panic!("Expected storage error, got {:?}", other),
        }
    }
}
