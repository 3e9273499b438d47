//! Tree assembly from the canonical matrix.
//!
//! Plain owned node/parent structure, independent of any rendering
//! machinery; consumers get the node list, parent links and labels and can
//! draw it however they like. Ids follow the original layout: root 0,
//! mutation column j as j+1, taxon row i as -(i+1).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{PhyError, Result};
use crate::matrix::CanonicalMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Mutation,
    Taxon,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: i64,
    /// None only for the root.
    pub parent: Option<i64>,
    pub label: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn node(&self, id: i64) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn parent_of(&self, id: i64) -> Option<i64> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn mutation_nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Mutation)
    }

    pub fn taxon_leaves(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Taxon)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        let json = serde_json::to_string_pretty(self)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn taxon_label(i: usize) -> String {
    if i < 26 {
        ((b'A' + i as u8) as char).to_string()
    } else {
        format!("S{}", i + 1)
    }
}

/// Builds the directed tree from M' and its per-column maximum L values.
///
/// Mutation node j+1 hangs off the column holding L_col(j), or off the root
/// when L_col(j) is 0. Each taxon leaf hangs off the mutation node of the
/// rightmost 1 in its row, or off the root for an all-zero row. Parents
/// always reference strictly smaller column indices, so no cycles can form.
pub fn assemble(m: &CanonicalMatrix, l_col: &[usize]) -> Result<Tree> {
    let num_cols = m.num_cols();
    let num_rows = m.num_rows();
    if num_cols == 0 {
        return Err(PhyError::EmptyMatrix);
    }
    let mut nodes = Vec::with_capacity(1 + num_cols + num_rows);
    nodes.push(TreeNode {
        id: 0,
        parent: None,
        label: "Root".to_string(),
        kind: NodeKind::Root,
    });
    for j in 0..num_cols {
        nodes.push(TreeNode {
            id: (j + 1) as i64,
            parent: Some(l_col[j] as i64),
            label: m.code_string(j),
            kind: NodeKind::Mutation,
        });
    }
    for i in 0..num_rows {
        let deepest = (0..num_cols)
            .rev()
            .find(|&j| m.rows[i][j] == 1)
            .map(|j| (j + 1) as i64)
            .unwrap_or(0);
        nodes.push(TreeNode {
            id: -((i + 1) as i64),
            parent: Some(deepest),
            label: taxon_label(i),
            kind: NodeKind::Taxon,
        });
    }
    Ok(Tree { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{canonicalize, RawMatrix};
    use crate::phylo;

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
    fn worked_example_builds_nested_tree() {
        // Three mutation classes over two samples: 10, 01, 11.
        let m = canon(&["10", "01", "11"]);
        let outcome = phylo::check(&m);
        assert!(outcome.consistent);
        let tree = assemble(&m, &outcome.lfunction.l_col).unwrap();
        assert_eq!(tree.mutation_nodes().count(), 3);
        assert_eq!(tree.taxon_leaves().count(), 2);
        // Sorted columns: 11, 10, 01. Both subsets hang off column 1.
        assert_eq!(tree.parent_of(1), Some(0));
        assert_eq!(tree.parent_of(2), Some(1));
        assert_eq!(tree.parent_of(3), Some(1));
        // Taxon A's rightmost 1 is column 2 (code 10), taxon B's column 3.
        assert_eq!(tree.parent_of(-1), Some(2));
        assert_eq!(tree.parent_of(-2), Some(3));
    }

    #[test]
    fn all_zero_row_hangs_off_root() {
        let m = canon(&["100", "110"]);
        let outcome = phylo::check(&m);
        assert!(outcome.consistent);
        let tree = assemble(&m, &outcome.lfunction.l_col).unwrap();
        // Taxon C (row 2) carries no mutations.
        assert_eq!(tree.parent_of(-3), Some(0));
    }

    #[test]
    fn parents_reference_earlier_columns_only() {
        let m = canon(&["1100", "1000", "0011", "0010"]);
        let outcome = phylo::check(&m);
        let tree = assemble(&m, &outcome.lfunction.l_col).unwrap();
        for node in tree.mutation_nodes() {
            assert!(node.parent.unwrap() < node.id);
        }
    }

    #[test]
    fn empty_matrix_is_an_error() {
        let m = CanonicalMatrix {
            rows: vec![],
            codes: vec![],
            code_to_cols: Default::default(),
            width: 0,
        };
        assert!(matches!(assemble(&m, &[]), Err(PhyError::EmptyMatrix)));
    }
}
