//! End-to-end pipeline: VCF to phylogenetic tree.
//!
//! Generates the GATK-code matrix, tests it for perfect-phylogeny
//! consistency and, when it fails, runs the conflict pipeline (conflict
//! graph, vertex cover, SNV editing) before assembling the tree from the
//! corrected matrix.

use std::path::Path;

use tracing::{info, warn};

use crate::config::Params;
use crate::conflict;
use crate::correct;
use crate::error::Result;
use crate::matrix::canonicalize;
use crate::phylo;
use crate::tree::{self, Tree};
use crate::vcf::VcfDatabase;

/// What a build run produced, for callers and tests.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Whether the input matrix was consistent before any repair.
    pub initially_consistent: bool,
    /// Conflicting codes identified by the vertex cover (empty when none).
    pub conflict_codes: Vec<String>,
    /// Entries moved / left unresolved by SNV editing.
    pub moved: usize,
    pub unresolved: usize,
    pub tree: Tree,
}

pub fn start(
    vcf_file: &Path,
    matrix_out: &Path,
    tree_out: &Path,
    move_log_out: &Path,
    params: &Params,
) -> Result<BuildOutcome> {
    let mut db = VcfDatabase::load(vcf_file, params)?;
    db.generate_matrix(matrix_out)?;
    info!(path = %matrix_out.display(), "wrote mutation matrix");

    let mut mut_map = db.mutation_counts();
    let width = db.num_samples();
    let raw = correct::matrix_from_counts(&mut_map, width)?;
    let canon = canonicalize(&raw)?;
    let outcome = phylo::check(&canon);

    if outcome.consistent {
        info!("matrix admits a perfect phylogeny");
        let tree = tree::assemble(&canon, &outcome.lfunction.l_col)?;
        tree.write_json(tree_out)?;
        return Ok(BuildOutcome {
            initially_consistent: true,
            conflict_codes: Vec::new(),
            moved: 0,
            unresolved: 0,
            tree,
        });
    }

    info!("matrix is not tree-consistent, starting conflict resolution");
    let conflict_cols = conflict::find_conflict_columns(&canon, &mut_map, params);
    let conflict_codes: Vec<String> = conflict_cols
        .iter()
        .map(|&j| canon.code_string(j))
        .collect();
    info!(conflicts = conflict_codes.len(), "conflicting codes selected");

    correct::seed_all_ones(&mut mut_map, width);
    let log = correct::edit_snv(&conflict_codes, &mut mut_map, &mut db, params);
    correct::write_move_log(move_log_out, &log)?;
    info!(path = %move_log_out.display(), "wrote move log");

    let rebuilt = correct::matrix_from_counts(&mut_map, width)?;
    let canon = canonicalize(&rebuilt)?;
    let outcome = phylo::check(&canon);
    if !outcome.consistent {
        warn!("matrix still inconsistent after SNV editing; tree uses corrected columns as-is");
    }
    let tree = tree::assemble(&canon, &outcome.lfunction.l_col)?;
    tree.write_json(tree_out)?;
    info!(path = %tree_out.display(), "wrote tree");

    Ok(BuildOutcome {
        initially_consistent: false,
        conflict_codes,
        moved: log.moves.len(),
        unresolved: log.failures.len(),
        tree,
    })
}
