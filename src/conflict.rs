//! Conflict detection on the canonical matrix.
//!
//! Columns whose codes are neither nested nor disjoint cannot coexist in a
//! perfect phylogeny. They form the edges of a conflict graph over columns,
//! and a greedy weighted vertex cover picks which columns to treat as
//! artifacts: columns backed by many mutation calls are presumed to be real
//! lineages and are preferentially kept out of the cover.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::config::Params;
use crate::matrix::{CanonicalMatrix, ColumnCode};

/// Two codes conflict when neither contains the other and they overlap.
pub fn codes_incompatible(c1: ColumnCode, c2: ColumnCode) -> bool {
    (c1 | c2) != c2 && (c1 | c2) != c1 && (c1 & c2) != 0
}

/// Pairwise-incompatibility graph over the columns of M'. Edges are ordered
/// pairs (i, j) with i < j.
#[derive(Debug, Clone)]
pub struct ConflictGraph {
    pub num_nodes: usize,
    pub edges: Vec<(usize, usize)>,
}

pub fn build_conflict_graph(codes: &[ColumnCode]) -> ConflictGraph {
    let mut edges = Vec::new();
    for j in 0..codes.len() {
        for i in 0..j {
            if codes_incompatible(codes[i], codes[j]) {
                edges.push((i, j));
            }
        }
    }
    ConflictGraph {
        num_nodes: codes.len(),
        edges,
    }
}

/// Columns whose code has exactly one set bit. A mutation private to a
/// single taxon cannot conflict with the rest of the matrix, so these are
/// excluded from the final conflict set even if the cover picked them.
pub fn singleton_columns(codes: &[ColumnCode]) -> HashSet<usize> {
    codes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.count_ones() == 1)
        .map(|(j, _)| j)
        .collect()
}

/// Largest x > 1 such that ((n - x*k)/n)^(k-1) exceeds the p-value bound,
/// scanning downward from n/k. Models how many mutations an independent
/// lineage should carry before a smaller count looks suspect.
pub fn conflict_threshold(n: i64, k: i64, threshold_pvalue: f64) -> i64 {
    let mut x = n / k;
    while x > 1 {
        let pvalue = ((n - x * k) as f64 / n as f64).powi((k - 1) as i32);
        if pvalue > threshold_pvalue {
            break;
        }
        x -= 1;
    }
    x
}

/// Greedy approximate vertex cover, weighted by per-column mutation counts.
///
/// Repeatedly keeps the highest-count column out of the cover and sends all
/// of its conflict partners in, until either no edges remain or the best
/// remaining count drops below the dynamic conflict threshold, at which
/// point every remaining node joins the cover. Not an optimal cover, and
/// none is claimed.
pub fn approx_vertex_cover(
    graph: &ConflictGraph,
    node_rates: &[f64],
    total_mutations: i64,
    params: &Params,
) -> HashSet<usize> {
    let mut nodes: BTreeSet<usize> = (0..graph.num_nodes).collect();
    let mut edges: Vec<(usize, usize)> = graph.edges.clone();
    let mut cover: HashSet<usize> = HashSet::new();
    // One tree edge per surviving column, plus the root edge; grows as
    // columns are confirmed kept.
    let mut num_edges_in_tree = (graph.num_nodes + 1) as i64;

    while !edges.is_empty() {
        let mut max_node = None;
        let mut max_rate = 0.0;
        for &node in &nodes {
            if node_rates[node] > max_rate {
                max_rate = node_rates[node];
                max_node = Some(node);
            }
        }
        let threshold = conflict_threshold(total_mutations, num_edges_in_tree, params.threshold_pvalue);
        debug!(threshold, max_rate, "vertex cover iteration");
        if max_rate < threshold as f64 {
            // No remaining column is strong enough to keep; everything left
            // goes into the cover.
            cover.extend(nodes.iter().copied());
            break;
        }
        let max_node = match max_node {
            Some(n) => n,
            None => break,
        };
        nodes.remove(&max_node);
        num_edges_in_tree += 1;
        for &(a, b) in &edges {
            if a == max_node {
                cover.insert(b);
            } else if b == max_node {
                cover.insert(a);
            }
        }
        nodes.retain(|n| !cover.contains(n));
        edges.retain(|(a, b)| !cover.contains(a) && !cover.contains(b));
    }
    cover
}

/// Full conflict detection: build the graph, run the cover, drop singleton
/// columns. Returns conflicting column indices in ascending order.
pub fn find_conflict_columns(
    m: &CanonicalMatrix,
    mut_map: &HashMap<String, f64>,
    params: &Params,
) -> Vec<usize> {
    let graph = build_conflict_graph(&m.codes);
    let node_rates: Vec<f64> = (0..m.num_cols())
        .map(|j| mut_map.get(&m.code_string(j)).copied().unwrap_or(0.0))
        .collect();
    let total_mutations = mut_map.values().sum::<f64>() as i64;
    let cover = approx_vertex_cover(&graph, &node_rates, total_mutations, params);
    let singletons = singleton_columns(&m.codes);
    let mut columns: Vec<usize> = cover.difference(&singletons).copied().collect();
    columns.sort_unstable();
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{canonicalize, code_from_string, RawMatrix};

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
    fn overlapping_codes_conflict() {
        let c1 = code_from_string("110").unwrap();
        let c2 = code_from_string("011").unwrap();
        assert!(codes_incompatible(c1, c2));
    }

    #[test]
    fn nested_and_disjoint_codes_do_not_conflict() {
        let large = code_from_string("110").unwrap();
        let nested = code_from_string("100").unwrap();
        let disjoint = code_from_string("001").unwrap();
        assert!(!codes_incompatible(large, nested));
        assert!(!codes_incompatible(large, disjoint));
    }

    #[test]
    fn graph_has_edge_per_incompatible_pair() {
        let m = canon(&["110", "011", "100"]);
        let graph = build_conflict_graph(&m.codes);
        // Sorted columns: 110, 100, 011. Only 110 vs 011 conflict.
        assert_eq!(graph.edges, vec![(0, 2)]);
    }

    #[test]
    fn threshold_matches_worked_example() {
        // Largest x > 1 with ((100 - 5x)/100)^4 > 0.01.
        assert_eq!(conflict_threshold(100, 5, 0.01), 13);
    }

    #[test]
    fn threshold_bottoms_out_at_one() {
        assert_eq!(conflict_threshold(10, 10, 0.01), 1);
    }

    #[test]
    fn cover_touches_every_edge() {
        let m = canon(&["1100", "0110", "0011", "1010"]);
        let graph = build_conflict_graph(&m.codes);
        assert!(!graph.edges.is_empty());
        let rates = vec![40.0, 30.0, 20.0, 10.0];
        let cover = approx_vertex_cover(&graph, &rates, 100, &Params::default());
        for (a, b) in &graph.edges {
            assert!(cover.contains(a) || cover.contains(b), "edge ({a},{b}) uncovered");
        }
    }

    #[test]
    fn high_weight_column_stays_out_of_cover() {
        let m = canon(&["110", "011"]);
        let graph = build_conflict_graph(&m.codes);
        let rates = vec![90.0, 10.0];
        let cover = approx_vertex_cover(&graph, &rates, 100, &Params::default());
        assert!(!cover.contains(&0));
        assert!(cover.contains(&1));
    }

    #[test]
    fn singletons_never_reported_as_conflicts() {
        let m = canon(&["110", "011", "010"]);
        let mut mut_map = HashMap::new();
        mut_map.insert("110".to_string(), 50.0);
        mut_map.insert("011".to_string(), 30.0);
        mut_map.insert("010".to_string(), 20.0);
        let singles = singleton_columns(&m.codes);
        let conflicts = find_conflict_columns(&m, &mut_map, &Params::default());
        for j in &conflicts {
            assert!(!singles.contains(j));
        }
    }

    #[test]
    fn consistent_matrix_yields_no_conflicts() {
        let m = canon(&["110", "100", "001"]);
        let mut_map: HashMap<String, f64> =
            [("110", 5.0), ("100", 3.0), ("001", 2.0)]
                .iter()
                .map(|(c, r)| (c.to_string(), *r))
                .collect();
        assert!(find_conflict_columns(&m, &mut_map, &Params::default()).is_empty());
    }
}
