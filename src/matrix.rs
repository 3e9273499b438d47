//! Binary mutation matrix: flat-file I/O and canonical form.
//!
//! The flat format is `numRows numCols` on the first line, then one line per
//! mutation class: the GATK code, the mutation count/rate, and the row's bits
//! consumed positionally. The original writer emits only `code rate`; the
//! code characters double as the bits, and the reader accepts both shapes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{PhyError, Result};

/// One column's values read as a binary number, row 0 most significant.
pub type ColumnCode = u64;

/// Codes are held in a `u64`, so a run is capped at 64 samples.
pub const MAX_SAMPLES: usize = 64;

/// Raw 0/1 matrix. Rows are taxa (samples), columns are candidate mutations;
/// each column carries the GATK code string and mutation rate it was tagged
/// with in the input file.
#[derive(Debug, Clone)]
pub struct RawMatrix {
    pub rows: Vec<Vec<u8>>,
    pub codes: Vec<String>,
    pub rates: Vec<f64>,
}

impl RawMatrix {
    /// Builds the matrix from per-mutation file rows: `(code, rate, bits)`,
    /// where `bits` runs over samples. The in-memory orientation is
    /// transposed so that rows are taxa.
    pub fn from_columns(columns: Vec<(String, f64, Vec<u8>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PhyError::MalformedMatrix("no rows in input".into()));
        }
        let width = columns[0].2.len();
        if width == 0 {
            return Err(PhyError::MalformedMatrix("zero-width rows".into()));
        }
        if width > MAX_SAMPLES {
            return Err(PhyError::MalformedMatrix(format!(
                "{} samples exceeds the supported maximum of {}",
                width, MAX_SAMPLES
            )));
        }
        for (code, _, bits) in &columns {
            if bits.len() != width {
                return Err(PhyError::MalformedMatrix(format!(
                    "ragged input: row for code {} has {} bits, expected {}",
                    code,
                    bits.len(),
                    width
                )));
            }
        }
        let mut rows = vec![vec![0u8; columns.len()]; width];
        for (j, (_, _, bits)) in columns.iter().enumerate() {
            for (i, &b) in bits.iter().enumerate() {
                rows[i][j] = b;
            }
        }
        let (codes, rates) = columns
            .into_iter()
            .map(|(code, rate, _)| (code, rate))
            .unzip();
        Ok(RawMatrix { rows, codes, rates })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let header = lines
            .next()
            .ok_or_else(|| PhyError::parse(1, "missing header line"))??;
        let mut parts = header.split_whitespace();
        let num_rows: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PhyError::parse(1, "bad row count in header"))?;
        let num_cols: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PhyError::parse(1, "bad column count in header"))?;

        let mut columns = Vec::with_capacity(num_rows);
        for (idx, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            columns.push(parse_matrix_line(&line, num_cols, idx + 2)?);
        }
        if columns.len() != num_rows {
            return Err(PhyError::MalformedMatrix(format!(
                "header promised {} rows, file has {}",
                num_rows,
                columns.len()
            )));
        }
        RawMatrix::from_columns(columns)
    }

    /// Number of taxa (samples).
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of candidate mutations.
    pub fn num_cols(&self) -> usize {
        self.codes.len()
    }

    /// Mutation rate per code string, for use as vertex-cover weights.
    pub fn rate_map(&self) -> HashMap<String, f64> {
        self.codes
            .iter()
            .cloned()
            .zip(self.rates.iter().copied())
            .collect()
    }
}

fn parse_matrix_line(line: &str, num_cols: usize, lineno: usize) -> Result<(String, f64, Vec<u8>)> {
    let mut tokens = line.split_whitespace();
    let code = tokens
        .next()
        .ok_or_else(|| PhyError::parse(lineno, "missing GATK code"))?
        .to_string();
    let rate: f64 = tokens
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PhyError::parse(lineno, "missing or bad mutation rate"))?;
    // Remaining tokens are the row bits; fall back to the code characters.
    let bit_chars: Vec<char> = tokens.flat_map(|t| t.chars()).collect();
    let source: Vec<char> = if bit_chars.is_empty() {
        code.chars().collect()
    } else {
        bit_chars
    };
    if source.len() < num_cols {
        return Err(PhyError::parse(
            lineno,
            format!("expected {} bits, found {}", num_cols, source.len()),
        ));
    }
    let mut bits = Vec::with_capacity(num_cols);
    for &c in source.iter().take(num_cols) {
        match c {
            '0' => bits.push(0),
            '1' => bits.push(1),
            _ => {
                return Err(PhyError::parse(lineno, format!("invalid bit character {:?}", c)));
            }
        }
    }
    Ok((code, rate, bits))
}

/// Writes the flat matrix format from an ordered `(code, rate)` listing.
pub fn write_matrix_file(path: &Path, rows: &[(String, f64)], num_cols: usize) -> Result<()> {
    let mut out = File::create(path)?;
    writeln!(out, "{} {}", rows.len(), num_cols)?;
    for (code, rate) in rows {
        writeln!(out, "{} {} {}", code, rate, code)?;
    }
    Ok(())
}

/// M' from Gusfield 1991: columns deduplicated and sorted by strictly
/// descending binary code.
#[derive(Debug, Clone)]
pub struct CanonicalMatrix {
    pub rows: Vec<Vec<u8>>,
    pub codes: Vec<ColumnCode>,
    /// Every original column index that shared each surviving code. The
    /// first listed index is the retained representative.
    pub code_to_cols: HashMap<ColumnCode, Vec<usize>>,
    /// Bit width of the codes (number of taxa).
    pub width: usize,
}

impl CanonicalMatrix {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.codes.len()
    }

    /// Code of column `j` rendered as a GATK-style bit string.
    pub fn code_string(&self, j: usize) -> String {
        code_to_string(self.codes[j], self.width)
    }
}

/// Reads one column of a taxa-major matrix as a binary number.
pub fn column_code(rows: &[Vec<u8>], j: usize) -> ColumnCode {
    let mut code: ColumnCode = 0;
    for row in rows {
        code = (code << 1) | row[j] as ColumnCode;
    }
    code
}

pub fn code_to_string(code: ColumnCode, width: usize) -> String {
    (0..width)
        .rev()
        .map(|i| if code >> i & 1 == 1 { '1' } else { '0' })
        .collect()
}

pub fn code_from_string(s: &str) -> Result<ColumnCode> {
    ColumnCode::from_str_radix(s, 2)
        .map_err(|_| PhyError::MalformedMatrix(format!("invalid code string {:?}", s)))
}

/// Transposes, encodes, deduplicates and sorts the raw matrix into M'.
pub fn canonicalize(raw: &RawMatrix) -> Result<CanonicalMatrix> {
    if raw.num_rows() == 0 || raw.num_cols() == 0 {
        return Err(PhyError::MalformedMatrix("empty matrix".into()));
    }
    let width = raw.num_rows();
    let mut code_to_cols: HashMap<ColumnCode, Vec<usize>> = HashMap::new();
    let mut seen_order = Vec::new();
    for j in 0..raw.num_cols() {
        let code = column_code(&raw.rows, j);
        let cols = code_to_cols.entry(code).or_default();
        if cols.is_empty() {
            seen_order.push(code);
        }
        cols.push(j);
    }
    let mut codes = seen_order;
    codes.sort_unstable_by(|a, b| b.cmp(a));

    let mut rows = vec![Vec::with_capacity(codes.len()); width];
    for &code in &codes {
        let rep = code_to_cols[&code][0];
        for (i, row) in rows.iter_mut().enumerate() {
            row.push(raw.rows[i][rep]);
        }
    }
    Ok(CanonicalMatrix {
        rows,
        codes,
        code_to_cols,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cols: &[(&str, f64)]) -> RawMatrix {
        let columns = cols
            .iter()
            .map(|(code, rate)| {
                let bits = code.chars().map(|c| (c == '1') as u8).collect();
                (code.to_string(), *rate, bits)
            })
            .collect();
        RawMatrix::from_columns(columns).unwrap()
    }

    #[test]
    fn columns_sorted_descending_and_deduped() {
        let m = raw(&[("011", 2.0), ("110", 5.0), ("011", 1.0), ("100", 3.0)]);
        let canon = canonicalize(&m).unwrap();
        assert_eq!(canon.codes, vec![0b110, 0b100, 0b011]);
        assert_eq!(canon.code_to_cols[&0b011], vec![0, 2]);
        assert_eq!(canon.code_to_cols[&0b110], vec![1]);
        for w in canon.codes.windows(2) {
            assert!(w[0] > w[1]);
        }
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let m = raw(&[("110", 5.0), ("011", 3.0), ("100", 2.0)]);
        let canon = canonicalize(&m).unwrap();
        let again = RawMatrix::from_columns(
            canon
                .codes
                .iter()
                .map(|&c| {
                    let s = code_to_string(c, canon.width);
                    let bits = s.chars().map(|ch| (ch == '1') as u8).collect();
                    (s, 1.0, bits)
                })
                .collect(),
        )
        .unwrap();
        let canon2 = canonicalize(&again).unwrap();
        assert_eq!(canon.codes, canon2.codes);
        assert_eq!(canon.rows, canon2.rows);
    }

    #[test]
    fn ragged_input_is_rejected() {
        let columns = vec![
            ("10".to_string(), 1.0, vec![1, 0]),
            ("011".to_string(), 1.0, vec![0, 1, 1]),
        ];
        assert!(matches!(
            RawMatrix::from_columns(columns),
            Err(PhyError::MalformedMatrix(_))
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(RawMatrix::from_columns(Vec::new()).is_err());
    }

    #[test]
    fn code_round_trip() {
        let code = code_from_string("0110").unwrap();
        assert_eq!(code, 6);
        assert_eq!(code_to_string(code, 4), "0110");
    }

    #[test]
    fn parse_line_accepts_code_only_rows() {
        let (code, rate, bits) = parse_matrix_line("110 5", 3, 2).unwrap();
        assert_eq!(code, "110");
        assert_eq!(rate, 5.0);
        assert_eq!(bits, vec![1, 1, 0]);
    }

    #[test]
    fn parse_line_accepts_explicit_bits() {
        let (_, _, bits) = parse_matrix_line("110 5 1 1 0", 3, 2).unwrap();
        assert_eq!(bits, vec![1, 1, 0]);
        let (_, _, bits) = parse_matrix_line("110 5 110", 3, 2).unwrap();
        assert_eq!(bits, vec![1, 1, 0]);
    }
}
