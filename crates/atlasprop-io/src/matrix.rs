//! NiftyReg affine matrix text files.
//!
//! `reg_aladin` writes its result as four whitespace-separated rows of four
//! numbers each. The matrix maps reference world points to floating world
//! points.

use std::path::Path;
use anyhow::{Context, bail};
use nalgebra::Matrix4;

use crate::error::{IoFailure, Result};

/// Parse the text form of a 4×4 affine.
pub fn parse_affine_matrix(text: &str) -> anyhow::Result<Matrix4<f64>> {
    let rows: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if rows.len() != 4 {
        bail!("expected 4 matrix rows, found {}", rows.len());
    }
    let mut matrix = Matrix4::zeros();
    for (i, row) in rows.iter().enumerate() {
        let values = row
            .split_whitespace()
            .map(|v| v.parse::<f64>().with_context(|| format!("row {}: bad number {:?}", i, v)))
            .collect::<anyhow::Result<Vec<f64>>>()?;
        if values.len() != 4 {
            bail!("row {} has {} entries, expected 4", i, values.len());
        }
        for (j, v) in values.into_iter().enumerate() {
            matrix[(i, j)] = v;
        }
    }
    Ok(matrix)
}

/// Format a 4×4 affine the way NiftyReg writes it.
pub fn format_affine_matrix(matrix: &Matrix4<f64>) -> String {
    let mut text = String::new();
    for i in 0..4 {
        let row: Vec<String> = (0..4).map(|j| format!("{}", matrix[(i, j)])).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    text
}

pub fn read_affine_matrix(path: impl AsRef<Path>) -> Result<Matrix4<f64>> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .context("failed to read affine matrix")
        .and_then(|text| parse_affine_matrix(&text))
        .map_err(|e| IoFailure::new(path, e))
}

pub fn write_affine_matrix(path: impl AsRef<Path>, matrix: &Matrix4<f64>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, format_affine_matrix(matrix)).map_err(|e| IoFailure::new(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_niftyreg_output() {
        let text = "0.98 -0.01 0.02 1.5\n0.01 1.01 0.0 -2.25\n-0.02 0.0 0.99 0.75\n0 0 0 1\n";
        let m = parse_affine_matrix(text).unwrap();
        assert_eq!(m[(0, 0)], 0.98);
        assert_eq!(m[(1, 3)], -2.25);
        assert_eq!(m[(3, 3)], 1.0);
    }

    #[test]
    fn test_rejects_short_rows() {
        assert!(parse_affine_matrix("1 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n").is_err());
        assert!(parse_affine_matrix("1 0 0 0\n0 1 0 0\n").is_err());
        assert!(parse_affine_matrix("1 0 0 x\n0 1 0 0\n0 0 1 0\n0 0 0 1\n").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subMatrixAff.txt");
        let mut m = Matrix4::identity();
        m[(0, 1)] = 0.123456789012;
        m[(2, 3)] = -41.5;
        write_affine_matrix(&path, &m).unwrap();
        assert_eq!(read_affine_matrix(&path).unwrap(), m);
    }

    #[test]
    fn test_missing_file_is_io_failure() {
        let err = read_affine_matrix("/nonexistent/MatrixAff.txt").unwrap_err();
        assert!(err.path().ends_with("MatrixAff.txt"));
    }
}
