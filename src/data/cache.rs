//! Optional on-disk cache for resampled series.
//!
//! The payload is a postcard-encoded [`CandleSeries`]; a sidecar file stores
//! the blake3 hash of the 1m source bytes. A missing file, a stale hash, or
//! a failed decode is a cache miss, never an error, and results are
//! identical with the cache on or off.

use std::path::{Path, PathBuf};

use crate::{
    data::{candle::CandleSeries, domain::Timeframe},
    error::{SystemError, ZonalResult},
};

/// Hash of the 1m source bytes, used to invalidate cached resamples.
pub fn source_hash(source_bytes: &[u8]) -> String {
    blake3::hash(source_bytes).to_hex().to_string()
}

fn payload_path(dir: &Path, label: &str, timeframe: Timeframe) -> PathBuf {
    dir.join(format!("{label}_{timeframe}.postcard"))
}

fn sidecar_path(dir: &Path, label: &str, timeframe: Timeframe) -> PathBuf {
    dir.join(format!("{label}_{timeframe}.hash"))
}

/// Write a resampled series and its source-hash sidecar.
pub fn store(
    dir: &Path,
    label: &str,
    timeframe: Timeframe,
    series: &CandleSeries,
    hash: &str,
) -> ZonalResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| SystemError::InvariantViolation(e.to_string()))?;

    let payload = postcard::to_stdvec(series).map_err(SystemError::Encoding)?;
    let path = payload_path(dir, label, timeframe);
    std::fs::write(&path, payload)
        .map_err(|e| SystemError::InvariantViolation(e.to_string()))?;
    std::fs::write(sidecar_path(dir, label, timeframe), hash)
        .map_err(|e| SystemError::InvariantViolation(e.to_string()))?;

    tracing::debug!(label, timeframe = %timeframe, path = %path.display(), "cached resampled series");
    Ok(path)
}

/// Load a cached series if the sidecar hash still matches the source.
pub fn load(dir: &Path, label: &str, timeframe: Timeframe, hash: &str) -> Option<CandleSeries> {
    let stored = std::fs::read_to_string(sidecar_path(dir, label, timeframe)).ok()?;
    if stored.trim() != hash {
        tracing::warn!(label, timeframe = %timeframe, "cache miss: source hash changed");
        return None;
    }

    let bytes = std::fs::read(payload_path(dir, label, timeframe)).ok()?;
    match postcard::from_bytes::<CandleSeries>(&bytes) {
        Ok(series) => {
            tracing::debug!(label, timeframe = %timeframe, bars = series.len(), "cache hit");
            Some(series)
        }
        Err(e) => {
            tracing::warn!(label, timeframe = %timeframe, error = %e, "cache miss: decode failed");
            None
        }
    }
}
