//! Conflict resolution by SNV editing.
//!
//! Each conflicting GATK code tries to disperse its entries onto
//! edit-distance-bounded non-conflicting codes. Candidate targets may only
//! add mutation calls (0 to 1 flips), each flip must pass the statistical
//! validity test, and the final assignment is a greedy maximum-coverage
//! pass over the candidates' convertible-entry sets.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use crate::config::Params;
use crate::error::Result;
use crate::matrix::RawMatrix;
use crate::vcf::VcfDatabase;

/// One reassignment (or failure, when `new_code == original_code`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub chromosome: String,
    pub position: String,
    pub original_code: String,
    pub new_code: String,
}

#[derive(Debug, Default)]
pub struct ResolutionLog {
    pub moves: Vec<MoveRecord>,
    pub failures: Vec<MoveRecord>,
}

/// Hamming distance between two equal-length codes.
pub fn edit_distance(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).filter(|(x, y)| x != y).count()
}

/// Non-conflicting codes within the edit bound of `conflict`, in sorted
/// order. Distance zero is excluded; ties later on break by this order.
fn candidate_codes(
    conflict: &str,
    mut_map: &HashMap<String, f64>,
    conflicts: &HashSet<String>,
    edit_bound: usize,
) -> Vec<String> {
    let mut candidates: Vec<String> = mut_map
        .keys()
        .filter(|code| !conflicts.contains(*code))
        .filter(|code| {
            let d = edit_distance(conflict, code);
            d > 0 && d <= edit_bound
        })
        .cloned()
        .collect();
    candidates.sort();
    candidates
}

/// Greedy maximum coverage over the candidates' possible-move sets:
/// repeatedly take the candidate covering the most not-yet-moved entries.
/// First-seen order wins ties.
fn largest_uncovered<'a>(
    possible: &HashMap<String, Vec<usize>>,
    order: &'a [String],
    moved: &HashSet<usize>,
) -> Option<&'a String> {
    let mut best: Option<&String> = None;
    let mut best_size = 0usize;
    for code in order {
        let Some(entries) = possible.get(code) else {
            continue;
        };
        let size = entries.iter().filter(|e| !moved.contains(e)).count();
        if size > best_size {
            best = Some(code);
            best_size = size;
        }
    }
    best
}

/// Resolves every conflicting code in turn, mutating the count map and the
/// database's code buckets in place. Total counts are conserved; only
/// bucket membership changes. Conflicts are visited in sorted order so runs
/// are reproducible.
pub fn edit_snv(
    conflict_codes: &[String],
    mut_map: &mut HashMap<String, f64>,
    db: &mut VcfDatabase,
    params: &Params,
) -> ResolutionLog {
    let conflict_set: HashSet<String> = conflict_codes.iter().cloned().collect();
    let mut ordered: Vec<&String> = conflict_codes.iter().collect();
    ordered.sort();

    let mut log = ResolutionLog::default();
    for conflict in ordered {
        let candidates = candidate_codes(conflict, mut_map, &conflict_set, params.edit_distance);
        if candidates.is_empty() {
            // Nothing within reach; every entry under this code is stuck.
            for idx in db.entries_by_code(conflict) {
                let entry = db.entry(idx);
                log.failures.push(MoveRecord {
                    chromosome: entry.chromosome.clone(),
                    position: entry.position.clone(),
                    original_code: conflict.clone(),
                    new_code: conflict.clone(),
                });
            }
            continue;
        }

        let mut possible: HashMap<String, Vec<usize>> = HashMap::new();
        let mut fail_set: Option<HashSet<usize>> = None;
        for candidate in &candidates {
            let (valid, failed) = db.valid_entries(conflict, candidate, params);
            debug!(
                conflict,
                candidate,
                valid = valid.len(),
                failed = failed.len(),
                "validity test"
            );
            possible.insert(candidate.clone(), valid);
            if !failed.is_empty() {
                let failed: HashSet<usize> = failed.into_iter().collect();
                fail_set = Some(match fail_set {
                    None => failed,
                    // An entry only counts as failed if no candidate accepted it.
                    Some(acc) => acc.intersection(&failed).copied().collect(),
                });
            }
        }

        let mut moved: HashSet<usize> = HashSet::new();
        for _ in 0..candidates.len() {
            let Some(target) = largest_uncovered(&possible, &candidates, &moved) else {
                break;
            };
            let target = target.clone();
            let to_move: Vec<usize> = possible[&target]
                .iter()
                .filter(|e| !moved.contains(e))
                .copied()
                .collect();
            let count = to_move.len() as f64;
            *mut_map.get_mut(conflict).expect("conflict code in map") -= count;
            *mut_map.get_mut(&target).expect("candidate code in map") += count;
            for idx in to_move {
                let entry = db.entry(idx);
                log.moves.push(MoveRecord {
                    chromosome: entry.chromosome.clone(),
                    position: entry.position.clone(),
                    original_code: conflict.clone(),
                    new_code: target.clone(),
                });
                db.reassign(idx, conflict, &target);
                moved.insert(idx);
            }
            possible.remove(&target);
        }

        if let Some(fail_set) = fail_set {
            let mut stuck: Vec<usize> = fail_set.difference(&moved).copied().collect();
            stuck.sort_unstable();
            for idx in stuck {
                let entry = db.entry(idx);
                log.failures.push(MoveRecord {
                    chromosome: entry.chromosome.clone(),
                    position: entry.position.clone(),
                    original_code: conflict.clone(),
                    new_code: conflict.clone(),
                });
            }
        }
    }
    info!(
        moved = log.moves.len(),
        unresolved = log.failures.len(),
        "SNV editing finished"
    );
    log
}

/// Seeds the count map with the reserved all-ones code so it is a legal
/// move target; its count starts at zero.
pub fn seed_all_ones(mut_map: &mut HashMap<String, f64>, width: usize) {
    mut_map.entry("1".repeat(width)).or_insert(0.0);
}

/// Rebuilds a raw matrix from the corrected count map. Codes whose count
/// dropped to zero and the reserved all-ones code are left out.
pub fn matrix_from_counts(mut_map: &HashMap<String, f64>, width: usize) -> Result<RawMatrix> {
    let all_ones = "1".repeat(width);
    let mut rows: Vec<(String, f64)> = mut_map
        .iter()
        .filter(|(code, &count)| count > 0.0 && **code != all_ones)
        .map(|(code, &count)| (code.clone(), count))
        .collect();
    rows.sort_by(|a, b| {
        let ca = u64::from_str_radix(&a.0, 2).unwrap_or(0);
        let cb = u64::from_str_radix(&b.0, 2).unwrap_or(0);
        cb.cmp(&ca)
    });
    let columns = rows
        .into_iter()
        .map(|(code, count)| {
            let bits = code.chars().map(|c| (c == '1') as u8).collect();
            (code, count, bits)
        })
        .collect();
    RawMatrix::from_columns(columns)
}

/// Writes the `Chromosome\tLocation\tOriginalCode\tNewCode` move log,
/// moves first, unresolved entries after.
pub fn write_move_log(path: &Path, log: &ResolutionLog) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    writer.write_record(["Chromosome", "Location", "OriginalCode", "NewCode"])?;
    for record in log.moves.iter().chain(log.failures.iter()) {
        writer.write_record([
            record.chromosome.as_str(),
            record.position.as_str(),
            record.original_code.as_str(),
            record.new_code.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
