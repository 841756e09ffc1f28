// EmbeddingMatrix and its on-disk cache format.
//
// The cache is a NumPy `.npy` (format 1.0) file holding a C-ordered,
// little-endian f32 array of shape (rows, dim). Any tool that reads numpy
// arrays can inspect it, and `load(save(x)) == x` holds bit-for-bit.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use ndarray::{Array2, ArrayView1};
use regex_lite::Regex;

use crate::error::{PipelineError, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// Header (magic + version + length + dict) is padded to this alignment.
const NPY_ALIGN: usize = 64;

/// Dense embeddings, one row per record, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix(Array2<f32>);

impl EmbeddingMatrix {
    pub fn new(data: Array2<f32>) -> Self {
        Self(data)
    }

    /// Stack equal-length row vectors into a matrix.
    pub fn from_rows(rows: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
        let n = rows.len();
        let mut flat = Vec::with_capacity(n * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(PipelineError::EmbeddingUnavailable(format!(
                    "row {i} has {} values, expected {dim}",
                    row.len()
                )));
            }
            flat.extend(row);
        }
        let data = Array2::from_shape_vec((n, dim), flat)
            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?;
        Ok(Self(data))
    }

    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    pub fn dim(&self) -> usize {
        self.0.ncols()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f32> {
        self.0.row(i)
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.0
    }

    /// Fail unless this matrix has exactly one row per record.
    pub fn ensure_aligned(&self, records: usize) -> Result<()> {
        if self.rows() != records {
            return Err(PipelineError::LengthMismatch {
                what: "embedding matrix",
                expected: records,
                actual: self.rows(),
            });
        }
        Ok(())
    }

    /// Persist as a `.npy` file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let cache_err = |message: String| PipelineError::Cache {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| cache_err(e.to_string()))?;
            }
        }

        let mut dict = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            self.rows(),
            self.dim()
        );
        // magic(6) + version(2) + header_len(2) + dict + '\n'
        let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
        let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
        dict.push_str(&" ".repeat(padding));
        dict.push('\n');

        let header_len = u16::try_from(dict.len())
            .map_err(|_| cache_err("npy header too long".to_string()))?;

        let mut bytes = Vec::with_capacity(unpadded + padding + self.0.len() * 4);
        bytes.extend_from_slice(NPY_MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&header_len.to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        for value in self.0.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut file = fs::File::create(path).map_err(|e| cache_err(e.to_string()))?;
        file.write_all(&bytes).map_err(|e| cache_err(e.to_string()))?;
        Ok(())
    }

    /// Load a `.npy` file written by `save` (or by numpy as `<f4`/`<f8`, C order).
    pub fn load(path: &Path) -> Result<Self> {
        let cache_err = |message: String| PipelineError::Cache {
            path: path.display().to_string(),
            message,
        };

        let bytes = fs::read(path).map_err(|e| cache_err(e.to_string()))?;
        if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
            return Err(cache_err("not a .npy file".to_string()));
        }

        let major = bytes[6];
        let (header_start, header_len) = match major {
            1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
            2 | 3 if bytes.len() >= 12 => (
                12,
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            ),
            _ => return Err(cache_err(format!("unsupported npy version {major}"))),
        };
        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(cache_err("truncated npy header".to_string()));
        }
        let header = std::str::from_utf8(&bytes[header_start..data_start])
            .map_err(|e| cache_err(e.to_string()))?;

        let (descr, fortran, rows, cols) = parse_header(header).map_err(cache_err)?;
        if fortran {
            return Err(cache_err("fortran-ordered arrays are not supported".to_string()));
        }

        let payload = &bytes[data_start..];
        let values: Vec<f32> = match descr.as_str() {
            "<f4" => payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            "<f8" => payload
                .chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            other => return Err(cache_err(format!("unsupported dtype {other}"))),
        };

        if values.len() != rows * cols {
            return Err(cache_err(format!(
                "payload holds {} values, header says {}x{}",
                values.len(),
                rows,
                cols
            )));
        }

        let data = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| cache_err(e.to_string()))?;
        Ok(Self(data))
    }
}

/// Extract (descr, fortran_order, rows, cols) from an npy header dict.
struct HeaderPatterns {
    descr: Regex,
    fortran_order: Regex,
    shape: Regex,
}

fn header_patterns() -> &'static HeaderPatterns {
    static PATTERNS: OnceLock<HeaderPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HeaderPatterns {
        descr: Regex::new(r"'descr':\s*'([^']+)'").expect("valid regex"),
        fortran_order: Regex::new(r"'fortran_order':\s*(True|False)").expect("valid regex"),
        shape: Regex::new(r"'shape':\s*\((\d+),\s*(\d+)\s*,?\)").expect("valid regex"),
    })
}

fn parse_header(header: &str) -> std::result::Result<(String, bool, usize, usize), String> {
    let p = header_patterns();

    let descr = p
        .descr
        .captures(header)
        .map(|c| c[1].to_string())
        .ok_or("npy header has no descr")?;
    let fortran = p
        .fortran_order
        .captures(header)
        .map(|c| &c[1] == "True")
        .ok_or("npy header has no fortran_order")?;
    let shape = p
        .shape
        .captures(header)
        .ok_or("npy header shape is not two-dimensional")?;
    let rows = shape[1].parse().map_err(|_| "bad row count")?;
    let cols = shape[2].parse().map_err(|_| "bad column count")?;

    Ok((descr, fortran, rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_save_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emb.npy");
        let m = EmbeddingMatrix::new(array![[0.25f32, -1.5, 3.0], [f32::MIN_POSITIVE, 7.0, 0.0]]);

        m.save(&path).unwrap();
        let loaded = EmbeddingMatrix::load(&path).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn test_header_is_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        EmbeddingMatrix::new(Array2::zeros((3, 5))).save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % NPY_ALIGN, 0);
        assert_eq!(bytes.len(), 10 + header_len + 3 * 5 * 4);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        std::fs::write(&path, b"definitely not numpy").unwrap();
        assert!(matches!(
            EmbeddingMatrix::load(&path),
            Err(PipelineError::Cache { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("murmur-missing-cache.npy");
        assert!(EmbeddingMatrix::load(&path).is_err());
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let result = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]], 2);
        assert!(matches!(result, Err(PipelineError::EmbeddingUnavailable(_))));
    }

    #[test]
    fn test_ensure_aligned() {
        let m = EmbeddingMatrix::new(Array2::zeros((4, 2)));
        assert!(m.ensure_aligned(4).is_ok());
        assert!(matches!(
            m.ensure_aligned(5),
            Err(PipelineError::LengthMismatch { expected: 5, actual: 4, .. })
        ));
    }

    #[test]
    fn test_parse_header_numpy_style() {
        let (descr, fortran, rows, cols) =
            parse_header("{'descr': '<f8', 'fortran_order': False, 'shape': (12, 768), }")
                .unwrap();
        assert_eq!(descr, "<f8");
        assert!(!fortran);
        assert_eq!((rows, cols), (12, 768));
    }

    #[test]
    fn test_header_patterns_compile_once() {
        assert!(std::ptr::eq(header_patterns(), header_patterns()));
        for _ in 0..3 {
            assert!(parse_header("{'descr': '<f4', 'fortran_order': True, 'shape': (2, 3), }")
                .is_ok_and(|h| h.1));
        }
        assert!(parse_header("{'descr': '<f4', 'fortran_order': False, 'shape': (5,), }").is_err());
    }
}
