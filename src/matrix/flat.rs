//! Flat (row-major) distance matrices and the distance-file collaborators.
//!
//! File format: the first line is the taxon count N; each of the next N lines
//! starts with a taxon name padded to at least ten columns, followed by the
//! row's distances. Three shapes are understood:
//!
//! - `square`: N values per row
//! - `upper`:  N-1, N-2, ..., 1 values (strictly upper triangle)
//! - `lower`:  0, 1, ..., N-1 values (strictly lower triangle)
//!
//! A `.gz` suffix on the file name (or on the shape, e.g. `square.gz`)
//! requests gzip compression. The reader sniffs the shape from the first data
//! row.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::defaults::NAME_COLUMN_WIDTH;
use crate::errors::TreeBuildError;

/// Taxon names plus a dense row-major `f64` distance buffer.
#[derive(Debug, Clone)]
pub struct FlatMatrix {
    names: Vec<String>,
    distances: Vec<f64>,
}

impl FlatMatrix {
    pub fn new(names: Vec<String>, distances: Vec<f64>) -> Self {
        FlatMatrix { names, distances }
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn cell(&self, r: usize, c: usize) -> f64 {
        self.distances[r * self.names.len() + c]
    }

    pub fn set_cell(&mut self, r: usize, c: usize, value: f64) {
        let n = self.names.len();
        self.distances[r * n + c] = value;
    }
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, TreeBuildError> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn create_maybe_gz(path: &Path, zipped: bool) -> Result<Box<dyn Write>, TreeBuildError> {
    let file = File::create(path)?;
    if zipped || path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(GzEncoder::new(
            BufWriter::new(file),
            Compression::default(),
        )))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Reads a distance-matrix file, auto-detecting square/upper/lower shape.
pub fn read_distance_file(path: &Path) -> Result<FlatMatrix, TreeBuildError> {
    let reader = open_maybe_gz(path)?;
    read_distances(BufReader::new(reader))
}

/// Reads distance-matrix text from any buffered source.
pub fn read_distances<R: BufRead>(reader: R) -> Result<FlatMatrix, TreeBuildError> {
    let mut lines = reader.lines();
    let first = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(TreeBuildError::InputShape(
                "distance file is empty".to_string(),
            ))
        }
    };
    let n: usize = first.trim().parse().map_err(|_| {
        TreeBuildError::InputShape(format!(
            "expected a taxon count on the first line, found {:?}",
            first.trim()
        ))
    })?;
    if n < 3 {
        return Err(TreeBuildError::InputShape(format!(
            "at least 3 taxa are required, file declares {}",
            n
        )));
    }

    let mut names = Vec::with_capacity(n);
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);
    for (row_number, line) in lines.enumerate() {
        if rows.len() == n {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let name = match fields.next() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let mut values = Vec::new();
        for field in fields {
            let v: f64 = field.parse().map_err(|_| {
                TreeBuildError::InputShape(format!(
                    "row {} ({}): {:?} is not a number",
                    row_number + 1,
                    name,
                    field
                ))
            })?;
            values.push(v);
        }
        names.push(name);
        rows.push(values);
    }
    if names.len() != n {
        return Err(TreeBuildError::InputShape(format!(
            "file declares {} taxa but contains {} rows",
            n,
            names.len()
        )));
    }

    let shape = detect_shape(n, &rows)?;
    let mut distances = vec![0.0; n * n];
    match shape {
        Shape::Square => {
            for (i, row) in rows.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    distances[i * n + j] = v;
                }
            }
        }
        Shape::Upper => {
            for (i, row) in rows.iter().enumerate() {
                for (k, &v) in row.iter().enumerate() {
                    let j = i + 1 + k;
                    distances[i * n + j] = v;
                    distances[j * n + i] = v;
                }
            }
        }
        Shape::Lower => {
            for (i, row) in rows.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    distances[i * n + j] = v;
                    distances[j * n + i] = v;
                }
            }
        }
    }
    Ok(FlatMatrix::new(names, distances))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Square,
    Upper,
    Lower,
}

fn detect_shape(n: usize, rows: &[Vec<f64>]) -> Result<Shape, TreeBuildError> {
    let shape = match rows[0].len() {
        len if len == n => Shape::Square,
        len if len == n - 1 => Shape::Upper,
        0 => Shape::Lower,
        other => {
            return Err(TreeBuildError::InputShape(format!(
                "first row has {} distances; expected {} (square), {} (upper) or 0 (lower)",
                other,
                n,
                n - 1
            )))
        }
    };
    for (i, row) in rows.iter().enumerate() {
        let expected = match shape {
            Shape::Square => n,
            Shape::Upper => n - 1 - i,
            Shape::Lower => i,
        };
        if row.len() != expected {
            return Err(TreeBuildError::InputShape(format!(
                "row {} has {} distances; expected {} for a {:?} matrix",
                i + 1,
                row.len(),
                expected,
                shape
            )));
        }
    }
    Ok(shape)
}

/// Writes a distance-matrix file in the named shape (`square`, `upper` or
/// `lower`, with an optional `.gz` suffix requesting compression).
pub fn write_distance_file(
    matrix: &FlatMatrix,
    shape: &str,
    precision: usize,
    path: &Path,
) -> Result<(), TreeBuildError> {
    let zipped = shape.ends_with(".gz");
    let bare_shape = shape.trim_end_matches(".gz");
    let mut out = create_maybe_gz(path, zipped)?;
    write_distances(matrix, bare_shape, precision, &mut out)?;
    out.flush()?;
    Ok(())
}

fn write_distances(
    matrix: &FlatMatrix,
    shape: &str,
    precision: usize,
    out: &mut dyn Write,
) -> Result<(), TreeBuildError> {
    let n = matrix.size();
    let name_width = matrix
        .names()
        .iter()
        .map(|s| s.len())
        .max()
        .unwrap_or(0)
        .max(NAME_COLUMN_WIDTH);
    writeln!(out, "{}", n)?;
    for i in 0..n {
        let (start, stop) = match shape {
            "square" => (0, n),
            "upper" => (i + 1, n),
            "lower" => (0, i),
            other => {
                return Err(TreeBuildError::InputShape(format!(
                    "unknown distance-file shape {:?}",
                    other
                )))
            }
        };
        write!(out, "{:<width$}", matrix.names()[i], width = name_width)?;
        for j in start..stop {
            let v = matrix.cell(i, j);
            if v <= 0.0 {
                write!(out, " 0")?;
            } else {
                write!(out, " {:.*}", precision, v)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> FlatMatrix {
        let names = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let distances = vec![
            0.0, 1.5, 2.5, //
            1.5, 0.0, 3.5, //
            2.5, 3.5, 0.0,
        ];
        FlatMatrix::new(names, distances)
    }

    fn write_to_string(matrix: &FlatMatrix, shape: &str) -> String {
        let mut buf = Vec::new();
        write_distances(matrix, shape, 2, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn square_round_trip() {
        let text = write_to_string(&sample(), "square");
        assert!(text.starts_with("3\n"));
        let parsed = read_distances(Cursor::new(text)).unwrap();
        assert_eq!(parsed.names(), sample().names());
        assert_eq!(parsed.cell(2, 1), 3.5);
    }

    #[test]
    fn upper_round_trip() {
        let text = write_to_string(&sample(), "upper");
        let parsed = read_distances(Cursor::new(text)).unwrap();
        assert_eq!(parsed.cell(0, 2), 2.5);
        assert_eq!(parsed.cell(2, 0), 2.5);
        assert_eq!(parsed.cell(1, 1), 0.0);
    }

    #[test]
    fn lower_round_trip() {
        let text = write_to_string(&sample(), "lower");
        let parsed = read_distances(Cursor::new(text)).unwrap();
        assert_eq!(parsed.cell(1, 0), 1.5);
        assert_eq!(parsed.cell(0, 1), 1.5);
    }

    #[test]
    fn names_are_padded_to_minimum_width() {
        let text = write_to_string(&sample(), "square");
        let second_line = text.lines().nth(1).unwrap();
        assert!(second_line.starts_with("alpha     "));
    }

    #[test]
    fn zero_and_negative_cells_write_as_zero() {
        let mut m = sample();
        m.set_cell(0, 1, -0.25);
        let text = write_to_string(&m, "square");
        let first_row = text.lines().nth(1).unwrap();
        assert_eq!(first_row.split_whitespace().nth(2).unwrap(), "0");
    }

    #[test]
    fn malformed_counts_are_rejected() {
        let text = "3\nalpha 1.0\nbeta 1.0 2.0\ngamma 2.0 1.0\n";
        assert!(read_distances(Cursor::new(text)).is_err());
    }

    #[test]
    fn gzip_file_round_trip() {
        let dir = std::path::PathBuf::from("target/test_flat_gz");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dist.square.gz");
        write_distance_file(&sample(), "square.gz", 4, &path).unwrap();
        let parsed = read_distance_file(&path).unwrap();
        assert_eq!(parsed.cell(2, 0), 2.5);
        std::fs::remove_dir_all(&dir).ok();
    }
}
