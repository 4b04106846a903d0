//! Persisted result cache for per-voxel entropy vectors.
//!
//! One cache file per (stack, geometry) combination; the path is chosen and
//! owned by the embedding application. A lookup is valid only when the
//! stored element count matches the expected lattice size. Anything else
//! (missing file, foreign content, truncation) degrades to a miss and the
//! lattice is regenerated, never repaired.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Serialized cache payload.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    /// Element count stored alongside the data for the size check.
    element_count: usize,
    values: Vec<f64>,
}

/// Looks up a cached entropy vector.
///
/// Returns `Some` only when the file exists, parses, and holds exactly
/// `expected_len` elements. Every failure mode is a miss, never an error.
pub fn lookup(path: &Path, expected_len: usize) -> Option<Vec<f64>> {
    if !path.exists() {
        return None;
    }
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "cache file unreadable, treating as miss");
            return None;
        }
    };
    let envelope: CacheEnvelope = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(path = %path.display(), %err, "cache file corrupt, treating as miss");
            return None;
        }
    };
    if envelope.element_count != envelope.values.len() {
        warn!(
            path = %path.display(),
            declared = envelope.element_count,
            actual = envelope.values.len(),
            "cache element count disagrees with payload, treating as miss"
        );
        return None;
    }
    if envelope.values.len() != expected_len {
        debug!(
            path = %path.display(),
            stored = envelope.values.len(),
            expected = expected_len,
            "cache size mismatch, treating as miss"
        );
        return None;
    }
    Some(envelope.values)
}

/// Stores an entropy vector at `path`.
///
/// Writes to a sibling temp file and renames it into place, so a crashed
/// store leaves no partial cache. Returns false (and logs) on any I/O
/// failure; caching is an optimization and never fails the pipeline.
pub fn store(path: &Path, values: &[f64]) -> bool {
    let envelope = CacheEnvelope {
        element_count: values.len(),
        values: values.to_vec(),
    };
    let payload = match serde_json::to_string(&envelope) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(path = %path.display(), %err, "cache serialization failed");
            return false;
        }
    };

    let temp_path = path.with_extension("tmp");
    if let Err(err) = std::fs::write(&temp_path, payload) {
        warn!(path = %temp_path.display(), %err, "cache write failed");
        return false;
    }
    if let Err(err) = std::fs::rename(&temp_path, path) {
        warn!(path = %path.display(), %err, "cache rename failed");
        let _ = std::fs::remove_file(&temp_path);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_cache_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("kymo_cache_{tag}_{nanos}.json"))
    }

    #[test]
    fn test_roundtrip() {
        let path = temp_cache_path("roundtrip");
        let values = vec![0.0, 0.25, 0.5, std::f64::consts::FRAC_1_PI, 1.0];

        assert!(store(&path, &values));
        let loaded = lookup(&path, values.len()).expect("hit");
        assert_eq!(loaded.len(), values.len());
        for (a, b) in loaded.iter().zip(values.iter()) {
            assert!((a - b).abs() < 1e-10);
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_miss() {
        let path = temp_cache_path("missing");
        assert!(lookup(&path, 10).is_none());
    }

    #[test]
    fn test_size_mismatch_is_miss() {
        let path = temp_cache_path("size");
        store(&path, &[1.0, 2.0, 3.0]);
        assert!(lookup(&path, 4).is_none());
        assert!(lookup(&path, 3).is_some());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_file_is_miss() {
        let path = temp_cache_path("corrupt");
        std::fs::write(&path, b"definitely not a cache").unwrap();
        assert!(lookup(&path, 3).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_inconsistent_envelope_is_miss() {
        let path = temp_cache_path("envelope");
        std::fs::write(&path, r#"{"element_count": 5, "values": [1.0, 2.0]}"#).unwrap();
        assert!(lookup(&path, 2).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_store_overwrites() {
        let path = temp_cache_path("overwrite");
        store(&path, &[1.0, 2.0]);
        store(&path, &[3.0, 4.0, 5.0]);
        let loaded = lookup(&path, 3).expect("hit");
        assert_eq!(loaded, vec![3.0, 4.0, 5.0]);
        std::fs::remove_file(&path).ok();
    }
}
