//! Local storage usage of the outbox database.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::Result;

const ALERT_PERCENT: u128 = 80;
const DANGER_PERCENT: u128 = 95;

/// How close the database is to its quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLevel {
    Normal,
    Alert,
    Danger,
}

impl StorageLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Alert => "alert",
            Self::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub percentage: f64,
    pub level: StorageLevel,
}

impl StorageUsage {
    /// Measure the database at `db_path` (plus its WAL sidecars) against
    /// `quota_bytes`. Missing files count as zero bytes.
    pub fn measure(db_path: &Path, quota_bytes: u64) -> Result<Self> {
        let mut used_bytes = 0u64;
        for path in [
            db_path.to_path_buf(),
            sidecar(db_path, "-wal"),
            sidecar(db_path, "-shm"),
        ] {
            used_bytes = used_bytes.saturating_add(file_len(&path)?);
        }
        Ok(Self::from_bytes(used_bytes, quota_bytes))
    }

    pub fn from_bytes(used_bytes: u64, quota_bytes: u64) -> Self {
        if quota_bytes == 0 {
            return Self {
                used_bytes,
                quota_bytes,
                percentage: 0.0,
                level: StorageLevel::Normal,
            };
        }

        let scaled = u128::from(used_bytes) * 100;
        let quota = u128::from(quota_bytes);
        let level = if scaled >= quota * DANGER_PERCENT {
            StorageLevel::Danger
        } else if scaled >= quota * ALERT_PERCENT {
            StorageLevel::Alert
        } else {
            StorageLevel::Normal
        };

        #[allow(clippy::cast_precision_loss)]
        let percentage = used_bytes as f64 / quota_bytes as f64 * 100.0;

        Self {
            used_bytes,
            quota_bytes,
            percentage,
            level,
        }
    }
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut raw = db_path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn level_thresholds() {
        assert_eq!(StorageUsage::from_bytes(79, 100).level, StorageLevel::Normal);
        assert_eq!(StorageUsage::from_bytes(80, 100).level, StorageLevel::Alert);
        assert_eq!(StorageUsage::from_bytes(94, 100).level, StorageLevel::Alert);
        assert_eq!(StorageUsage::from_bytes(95, 100).level, StorageLevel::Danger);
        assert_eq!(StorageUsage::from_bytes(150, 100).level, StorageLevel::Danger);
    }

    #[test]
    fn zero_quota_reports_normal() {
        let usage = StorageUsage::from_bytes(1_000, 0);
        assert_eq!(usage.level, StorageLevel::Normal);
        assert!(usage.percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn measure_includes_wal_sidecars() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cradle.db");
        fs::write(&db_path, vec![0u8; 600]).unwrap();
        fs::write(sidecar(&db_path, "-wal"), vec![0u8; 300]).unwrap();

        let usage = StorageUsage::measure(&db_path, 1_000).unwrap();
        assert_eq!(usage.used_bytes, 900);
        assert_eq!(usage.level, StorageLevel::Alert);
        assert!((usage.percentage - 90.0).abs() < 1e-9);
    }

    #[test]
    fn measure_missing_database_is_empty() {
        let dir = tempdir().unwrap();
        let usage = StorageUsage::measure(&dir.path().join("none.db"), 1_000).unwrap();
        assert_eq!(usage.used_bytes, 0);
        assert_eq!(usage.level, StorageLevel::Normal);
    }
}
