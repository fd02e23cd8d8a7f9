//! Result cache for repeated invocations.
//!
//! Encoding is the bottleneck of the pipeline: a single source at four
//! widths can take seconds through an AVIF encoder. This module lets an
//! invocation skip the adapter entirely when the same source has already been
//! transformed with the same parameters.
//!
//! # Design
//!
//! The cache is pure memoization over [`run_transform`]: an entry holds the
//! complete [`TransformOutput`] (source dimensions + every encoded result), or
//! nothing. A hit returns it without calling the adapter at all, not even
//! for metadata.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: the key is a SHA-256 digest over
//!
//! - the source bytes (content, not path or mtime, so it survives
//!   `git checkout` and renames)
//! - the cache identifier (defaults to crate name + version, so upgrades
//!   invalidate old entries)
//! - the adapter identity
//! - the output format and adapter options (quality, background, rotation)
//! - the requested widths and placeholder width
//!
//! Changing any one of them produces a different key.
//!
//! ## Storage
//!
//! One file per key: `<dir>/<key>.json`, or `<dir>/<key>.json.gz` when
//! compression is on. There is no index; the filename is the key. Entries are
//! never evicted; the directory grows until an operator purges it.
//!
//! Writes go to a uniquely-named temp file and are renamed into place, so a
//! reader never sees a torn entry. Concurrent invocations racing on the same
//! key may both compute; the last rename wins, and both wrote identical
//! content.
//!
//! ## Failure policy
//!
//! Any read problem (missing file, bad gzip, bad JSON, version mismatch)
//! is a miss. A failed write is logged and otherwise ignored: the caller
//! already has its results.
//!
//! [`run_transform`]: crate::imaging::run_transform

use crate::imaging::{AdapterOptions, OutputFormat, TransformOutput};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Version of the entry format. Bump this to invalidate all existing entries
/// when the format or key computation changes.
const ENTRY_VERSION: u32 = 1;

/// Per-process counter making temp file names unique across threads.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("entry version {found} does not match {expected}")]
    Version { found: u32, expected: u32 },
}

/// Hex SHA-256 digest identifying one (source, parameters) computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

/// Everything besides the source bytes that determines the output.
#[derive(Debug, Clone, Serialize)]
pub struct KeyParams<'a> {
    pub identifier: &'a str,
    pub adapter: &'a str,
    pub format: OutputFormat,
    pub options: AdapterOptions,
    pub widths: &'a [u32],
    pub placeholder: Option<u32>,
}

impl CacheKey {
    pub fn compute(source: &[u8], params: &KeyParams<'_>) -> Result<Self, CacheError> {
        let mut hasher = Sha256::new();
        hasher.update(b"responsive-images\0");
        hasher.update((source.len() as u64).to_le_bytes());
        hasher.update(source);
        hasher.update(serde_json::to_vec(params)?);
        Ok(Self(format!("{:x}", hasher.finalize())))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    output: TransformOutput,
}

/// Whether a lookup was served from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// A directory of serialized [`TransformOutput`]s keyed by [`CacheKey`].
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    compression: bool,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            dir: dir.into(),
            compression,
        }
    }

    /// Location of the entry for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let ext = if self.compression { "json.gz" } else { "json" };
        self.dir.join(format!("{}.{}", key, ext))
    }

    /// Read and decode the entry for `key`.
    pub fn load(&self, key: &CacheKey) -> Result<TransformOutput, CacheError> {
        let raw = std::fs::read(self.entry_path(key))?;
        let json = if self.compression {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
            decoded
        } else {
            raw
        };
        let entry: CacheEntry = serde_json::from_slice(&json)?;
        if entry.version != ENTRY_VERSION {
            return Err(CacheError::Version {
                found: entry.version,
                expected: ENTRY_VERSION,
            });
        }
        Ok(entry.output)
    }

    /// Persist `output` under `key`, replacing any previous entry atomically.
    pub fn store(&self, key: &CacheKey, output: &TransformOutput) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            version: ENTRY_VERSION,
            output: output.clone(),
        };
        let json = serde_json::to_vec(&entry)?;
        let bytes = if self.compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?
        } else {
            json
        };

        let final_path = self.entry_path(key);
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&temp_path, bytes)?;
        if let Err(e) = std::fs::rename(&temp_path, &final_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Return the stored output for `key`, or run `compute` and store its
    /// result. `compute` is not called on a hit; its error is returned
    /// unchanged on a miss.
    pub fn get_or_compute<E>(
        &self,
        key: &CacheKey,
        compute: impl FnOnce() -> Result<TransformOutput, E>,
    ) -> Result<(TransformOutput, CacheStatus), E> {
        match self.load(key) {
            Ok(output) => {
                debug!(%key, "cache hit");
                return Ok((output, CacheStatus::Hit));
            }
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%key, "cache miss");
            }
            Err(e) => {
                warn!(%key, error = %e, "unreadable cache entry, recomputing");
            }
        }

        let output = compute()?;
        if let Err(e) = self.store(key, &output) {
            warn!(%key, error = %e, "failed to write cache entry");
        }
        Ok((output, CacheStatus::Miss))
    }
}

/// Serde adapter storing byte buffers as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::{Engine, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Summary of cache performance for a run.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn record(&mut self, status: CacheStatus) {
        match status {
            CacheStatus::Hit => self.hits += 1,
            CacheStatus::Miss => self.misses += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} encoded ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} encoded", self.misses)
        }
    }
}
