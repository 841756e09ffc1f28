// Record-id index kept beside the embedding cache.
//
// The `.npy` file only holds vectors. `<cache>.ids.json` lists the record id
// of every row, in row order, so a later run can map its own records onto
// the cached rows by id instead of trusting the row count. A cache with no
// index, or one whose ids differ from the current records, is refused.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Axis;
use tracing::{info, warn};

use super::EmbeddingMatrix;
use crate::error::{PipelineError, Result};

/// Path of the id index for the cache at `cache_path`.
pub fn index_path(cache_path: &Path) -> PathBuf {
    let mut name = cache_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".ids.json");
    cache_path.with_file_name(name)
}

/// Write the row-order id list for a freshly saved cache.
pub fn write_index(cache_path: &Path, ids: &[String]) -> Result<()> {
    let path = index_path(cache_path);
    let json = serde_json::to_string(ids).map_err(|e| index_err(&path, e.to_string()))?;
    fs::write(&path, json).map_err(|e| index_err(&path, e.to_string()))?;
    info!(path = %path.display(), rows = ids.len(), "Embedding cache index saved");
    Ok(())
}

pub fn read_index(cache_path: &Path) -> Result<Vec<String>> {
    let path = index_path(cache_path);
    if !path.exists() {
        return Err(index_err(
            &path,
            "no record-id index beside the embedding cache; rerun with --overwrite".to_string(),
        ));
    }
    let json = fs::read_to_string(&path).map_err(|e| index_err(&path, e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| index_err(&path, e.to_string()))
}

/// Load the cache and return its rows reordered to match `ids`.
///
/// Fails when the index is missing, when the cache holds a different number
/// of records, or when any id in `ids` has no cached row.
pub fn load_aligned(cache_path: &Path, ids: &[String]) -> Result<EmbeddingMatrix> {
    let matrix = EmbeddingMatrix::load(cache_path)?;
    let index = read_index(cache_path)?;
    let path = index_path(cache_path);

    if index.len() != matrix.rows() {
        return Err(index_err(
            &path,
            format!(
                "index lists {} ids but the cache has {} rows",
                index.len(),
                matrix.rows()
            ),
        ));
    }
    if index.len() != ids.len() {
        warn!(
            cached = index.len(),
            records = ids.len(),
            "Embedding cache was built from a different record set"
        );
        return Err(PipelineError::LengthMismatch {
            what: "embedding cache",
            expected: ids.len(),
            actual: index.len(),
        });
    }

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(index.len());
    for (row, id) in index.iter().enumerate() {
        if position.insert(id.as_str(), row).is_some() {
            return Err(index_err(&path, format!("duplicate id '{id}' in index")));
        }
    }

    let rows = ids
        .iter()
        .map(|id| {
            position.get(id.as_str()).copied().ok_or_else(|| {
                index_err(
                    &path,
                    format!("record '{id}' has no cached embedding; rerun with --overwrite"),
                )
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    if rows.iter().enumerate().all(|(i, row)| i == *row) {
        return Ok(matrix);
    }
    info!(rows = rows.len(), "Reordering cached embeddings to match record order");
    Ok(EmbeddingMatrix::new(matrix.as_array().select(Axis(0), &rows)))
}

fn index_err(path: &Path, message: String) -> PipelineError {
    PipelineError::Cache {
        path: path.display().to_string(),
        message,
    }
}
