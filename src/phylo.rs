//! Perfect-phylogeny consistency test over the canonical matrix.
//!
//! Follows Gusfield 1991 ("Efficient Algorithms for Inferring Evolutionary
//! Trees"): with columns sorted in decreasing binary order, M' admits a
//! perfect phylogeny iff for every 1-cell the L-function value equals the
//! column-wide maximum.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::config::Params;
use crate::conflict;
use crate::error::Result;
use crate::matrix::{canonicalize, CanonicalMatrix, RawMatrix};

/// L(i,j) for every 1-cell of M', plus the per-column maxima.
#[derive(Debug, Clone)]
pub struct LFunction {
    /// (row, col) -> 1-based index of the nearest earlier 1 in the row,
    /// or 0 when there is none. Only 1-cells are recorded.
    pub cells: HashMap<(usize, usize), usize>,
    /// Per column j, the largest L(i,j) over all rows (0 for all-zero columns).
    pub l_col: Vec<usize>,
}

/// L(i,j): scan columns j-1..0 of row i for the nearest 1.
fn func_value(rows: &[Vec<u8>], i: usize, j: usize) -> usize {
    for k in (0..j).rev() {
        if rows[i][k] == 1 {
            return k + 1;
        }
    }
    0
}

pub fn l_function(m: &CanonicalMatrix) -> LFunction {
    let num_rows = m.num_rows();
    let num_cols = m.num_cols();
    let mut cells = HashMap::new();
    let mut l_col = vec![0usize; num_cols];
    for j in 0..num_cols {
        for i in 0..num_rows {
            if m.rows[i][j] == 1 {
                let value = func_value(&m.rows, i, j);
                cells.insert((i, j), value);
                if value > l_col[j] {
                    l_col[j] = value;
                }
            }
        }
    }
    LFunction { cells, l_col }
}

/// The consistency predicate: every recorded L(i,j) equals L_col(j).
pub fn is_perfect_phylogeny(lf: &LFunction) -> bool {
    lf.cells.iter().all(|(&(_, j), &value)| value == lf.l_col[j])
}

/// Outcome of the consistency test; the L-function is kept for downstream
/// conflict detection and tree assembly.
#[derive(Debug)]
pub struct CheckOutcome {
    pub consistent: bool,
    pub lfunction: LFunction,
}

pub fn check(m: &CanonicalMatrix) -> CheckOutcome {
    let lfunction = l_function(m);
    let consistent = is_perfect_phylogeny(&lfunction);
    CheckOutcome {
        consistent,
        lfunction,
    }
}

/// The `check` command: load a flat matrix file and report whether it can
/// be a perfect phylogeny, naming the conflicting codes when it cannot.
pub fn start(matrix_file: &Path, params: &Params) -> Result<bool> {
    let raw = RawMatrix::from_file(matrix_file)?;
    let canon = canonicalize(&raw)?;
    let outcome = check(&canon);
    if outcome.consistent {
        info!("matrix admits a perfect phylogeny");
    } else {
        let mut_map = raw.rate_map();
        let columns = conflict::find_conflict_columns(&canon, &mut_map, params);
        let codes: Vec<String> = columns.iter().map(|&j| canon.code_string(j)).collect();
        info!(conflicts = ?codes, "matrix is not tree-consistent");
    }
    Ok(outcome.consistent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{canonicalize, RawMatrix};

    fn canon(cols: &[&str]) -> CanonicalMatrix {
        let columns = cols
            .iter()
            .map(|code| {
                let bits = code.chars().map(|c| (c == '1') as u8).collect();
                (code.to_string(), 1.0, bits)
            })
            .collect();
        canonicalize(&RawMatrix::from_columns(columns).unwrap()).unwrap()
    }

    #[test]
    fn single_column_is_consistent() {
        let m = canon(&["101"]);
        assert!(check(&m).consistent);
    }

    #[test]
    fn singleton_columns_are_consistent() {
        // Every column has exactly one 1-bit.
        let m = canon(&["100", "010", "001"]);
        assert!(check(&m).consistent);
    }

    #[test]
    fn nested_columns_are_consistent() {
        let m = canon(&["101", "100"]);
        assert!(check(&m).consistent);
    }

    #[test]
    fn overlapping_columns_are_inconsistent() {
        // 110 and 011 overlap without nesting; rows exhibit the forbidden
        // (1,0),(1,1),(0,1) pattern.
        let m = canon(&["110", "011"]);
        assert!(!check(&m).consistent);
    }

    #[test]
    fn l_values_match_hand_computation() {
        let m = canon(&["110", "100"]);
        // Sorted order keeps 110 first, 100 second.
        let lf = l_function(&m);
        assert_eq!(lf.cells[&(0, 0)], 0);
        assert_eq!(lf.cells[&(0, 1)], 1);
        assert_eq!(lf.l_col, vec![0, 1]);
    }
}
