//! Model and metrics persistence
//!
//! A detector is stored as one zlib-compressed JSON document holding the
//! configuration, the ensemble, the region index (regions in id order plus
//! the node maps), the weights and the uniform prior. Region scores are not
//! stored; they are recomputed from the regions on load, and the RNG is
//! reseeded from the configured seed.
//!
//! Metrics files are plain JSON. A results directory that is unset or does
//! not exist skips the save instead of failing the run.

use std::fs;
use std::path::{Path, PathBuf};

use aad_core::{AadConfig, AadError, AadResult, TreeEnsemble};
use log::{debug, info};
use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::detector::AadForest;
use crate::feedback::AadMetrics;
use crate::region::RegionIndex;

/// Blob layout version
const MODEL_FORMAT_VERSION: u32 = 1;

/// zlib level for model blobs
const COMPRESSION_LEVEL: u8 = 6;

#[derive(Serialize)]
struct ModelBlobRef<'a, E> {
    version: u32,
    config: &'a AadConfig,
    ensemble: &'a E,
    regions: Option<&'a RegionIndex>,
    w: Option<&'a [f64]>,
    w_unif_prior: Option<&'a [f64]>,
}

#[derive(Deserialize)]
struct ModelBlob<E> {
    version: u32,
    config: AadConfig,
    ensemble: E,
    regions: Option<RegionIndex>,
    w: Option<Vec<f64>>,
    w_unif_prior: Option<Vec<f64>>,
}

/// Encode a detector as a compressed blob
pub fn to_bytes<E>(model: &AadForest<E>) -> AadResult<Vec<u8>>
where
    E: TreeEnsemble + Serialize,
{
    let blob = ModelBlobRef {
        version: MODEL_FORMAT_VERSION,
        config: model.config(),
        ensemble: model.ensemble(),
        regions: model.regions(),
        w: model.weights().ok(),
        w_unif_prior: model.uniform_prior(),
    };
    let json = serde_json::to_vec(&blob)?;
    Ok(compress_to_vec_zlib(&json, COMPRESSION_LEVEL))
}

/// Decode a blob written by [`to_bytes`]
pub fn from_bytes<E>(bytes: &[u8]) -> AadResult<AadForest<E>>
where
    E: TreeEnsemble + DeserializeOwned,
{
    let json = decompress_to_vec_zlib(bytes)
        .map_err(|e| AadError::Persistence(format!("corrupt model blob: {:?}", e.status)))?;
    let blob: ModelBlob<E> = serde_json::from_slice(&json)?;
    if blob.version != MODEL_FORMAT_VERSION {
        return Err(AadError::Persistence(format!("unsupported model format version {}", blob.version)));
    }
    AadForest::from_parts(blob.ensemble, blob.config, blob.regions, blob.w, blob.w_unif_prior)
}

/// Write a detector to `path`
pub fn save_aad_model<E>(path: impl AsRef<Path>, model: &AadForest<E>) -> AadResult<()>
where
    E: TreeEnsemble + Serialize,
{
    let bytes = to_bytes(model)?;
    fs::write(path.as_ref(), &bytes)?;
    debug!("saved model ({} bytes) to {}", bytes.len(), path.as_ref().display());
    Ok(())
}

/// Read a detector written by [`save_aad_model`]
pub fn load_aad_model<E>(path: impl AsRef<Path>) -> AadResult<AadForest<E>>
where
    E: TreeEnsemble + DeserializeOwned,
{
    let bytes = fs::read(path.as_ref())?;
    from_bytes(&bytes)
}

/// Write `metrics` as `results_dir/name`.
///
/// Returns the written path, or `None` when the directory is unset or missing.
pub fn save_metrics(metrics: &AadMetrics, results_dir: Option<&Path>, name: &str) -> AadResult<Option<PathBuf>> {
    let Some(dir) = results_dir.filter(|d| d.is_dir()) else {
        info!("results directory unavailable, metrics not saved");
        return Ok(None);
    };
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(metrics)?)?;
    debug!("saved metrics to {}", path.display());
    Ok(Some(path))
}

/// Read `results_dir/name`, or `None` when it does not exist
pub fn load_metrics(results_dir: Option<&Path>, name: &str) -> AadResult<Option<AadMetrics>> {
    let Some(path) = results_dir.map(|d| d.join(name)).filter(|p| p.is_file()) else {
        info!("cannot load metrics {}", name);
        return Ok(None);
    };
    let bytes = fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}
