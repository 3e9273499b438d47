//! VCF ingestion and the per-entry probability model.
//!
//! Records are parsed from plain or gzip-compressed VCF text. Each record
//! keeps its per-sample `GT:AD:DP` calls; the derived GATK code has one bit
//! per sample, 0 for homozygous reference and 1 otherwise. Entries are
//! immutable after parsing; only their membership in a code bucket changes
//! during conflict resolution.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use statrs::function::factorial::binomial;
use tracing::info;

use crate::config::Params;
use crate::error::{PhyError, Result};
use crate::matrix::write_matrix_file;

/// One sample's call within a record: genotype plus allele-depth evidence.
#[derive(Debug, Clone)]
pub struct SampleCall {
    pub genotype: String,
    pub major_count: u64,
    pub minor_count: u64,
    pub read_depth: u64,
}

/// One observed variant call across all samples.
#[derive(Debug, Clone)]
pub struct VcfEntry {
    pub chromosome: String,
    pub position: String,
    pub reference: char,
    pub alternate: char,
    pub calls: Vec<SampleCall>,
}

impl VcfEntry {
    /// Parses one tab-separated VCF record line.
    pub fn from_line(line: &str, lineno: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 10 {
            return Err(PhyError::parse(lineno, "VCF record has fewer than 10 columns"));
        }
        let mut calls = Vec::with_capacity(fields.len() - 9);
        for field in &fields[9..] {
            calls.push(parse_sample_call(field, lineno)?);
        }
        Ok(VcfEntry {
            chromosome: fields[0].to_string(),
            position: fields[1].to_string(),
            reference: fields[3].chars().next().unwrap_or('N'),
            alternate: fields[4].chars().next().unwrap_or('N'),
            calls,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.calls.len()
    }

    /// One bit per sample: 0 for genotype 0/0, 1 otherwise.
    pub fn gatk_code(&self) -> String {
        self.calls
            .iter()
            .map(|c| if c.genotype == "0/0" { '0' } else { '1' })
            .collect()
    }

    /// Probability that the call at `sample` is explainable by sequencing
    /// error alone: the binomial tail from the observed minor-allele count
    /// up to the read depth, with per-base error rate `base_error / 4`.
    pub fn sum_prob(&self, sample: usize, base_error: f64) -> f64 {
        let call = &self.calls[sample];
        let d = call.read_depth;
        let a = call.minor_count;
        let p = base_error / 4.0;
        let mut total = 0.0;
        for k in a..=d {
            total += binomial(d, k) * p.powi(k as i32) * (1.0 - base_error).powi((d - k) as i32);
        }
        total
    }
}

fn parse_sample_call(field: &str, lineno: usize) -> Result<SampleCall> {
    let parts: Vec<&str> = field.split(':').collect();
    let genotype = parts[0].to_string();
    if genotype == "./." {
        // Uncalled sample; the record is dropped before AD/DP are needed.
        return Ok(SampleCall {
            genotype,
            major_count: 0,
            minor_count: 0,
            read_depth: 0,
        });
    }
    if parts.len() < 3 {
        return Err(PhyError::parse(lineno, "sample field lacks AD/DP components"));
    }
    let mut depths = parts[1].split(',');
    let major_count = depths
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PhyError::parse(lineno, "bad major allele depth"))?;
    let minor_count = depths
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PhyError::parse(lineno, "bad minor allele depth"))?;
    let read_depth = parts[2]
        .parse()
        .map_err(|_| PhyError::parse(lineno, "bad read depth"))?;
    Ok(SampleCall {
        genotype,
        major_count,
        minor_count,
        read_depth,
    })
}

/// Container for VCF entries, bucketed by GATK code.
#[derive(Debug)]
pub struct VcfDatabase {
    entries: Vec<VcfEntry>,
    buckets: HashMap<String, Vec<usize>>,
}

impl VcfDatabase {
    /// Loads a VCF file, applying the record filters of the original
    /// pipeline: uncalled samples, germline records, and low-coverage
    /// records are dropped.
    pub fn load(path: &Path, params: &Params) -> Result<Self> {
        let reader = open_maybe_gzip(path)?;
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} ({pos} records kept)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("scanning VCF");

        let mut entries = Vec::new();
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        let mut total = 0usize;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            total += 1;
            let entry = VcfEntry::from_line(&line, idx + 1)?;
            if !keep_entry(&entry, params) {
                continue;
            }
            let code = entry.gatk_code();
            buckets.entry(code).or_default().push(entries.len());
            entries.push(entry);
            spinner.inc(1);
        }
        spinner.finish_and_clear();
        if total == 0 {
            return Err(PhyError::Vcf("no records in VCF input".into()));
        }
        info!(total, kept = entries.len(), "loaded VCF records");
        Ok(VcfDatabase { entries, buckets })
    }

    /// Test-facing constructor from pre-built entries.
    pub fn from_entries(entries: Vec<VcfEntry>) -> Self {
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            buckets.entry(entry.gatk_code()).or_default().push(i);
        }
        VcfDatabase { entries, buckets }
    }

    pub fn entry(&self, idx: usize) -> &VcfEntry {
        &self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of all entries currently bucketed under `code`.
    pub fn entries_by_code(&self, code: &str) -> Vec<usize> {
        self.buckets.get(code).cloned().unwrap_or_default()
    }

    /// Moves one entry between code buckets. The entry itself is unchanged.
    pub fn reassign(&mut self, idx: usize, from: &str, to: &str) {
        if let Some(bucket) = self.buckets.get_mut(from) {
            bucket.retain(|&i| i != idx);
        }
        self.buckets.entry(to.to_string()).or_default().push(idx);
    }

    /// Splits the entries under `input_code` into those that may validly be
    /// converted to `dest_code` and those that may not.
    ///
    /// A conversion is structurally sound only when every mismatched
    /// position flips 0 to 1; any 1 to 0 mismatch fails every entry for
    /// this pairing. For sound pairings, an entry converts only if the
    /// miscall probability at each mismatched sample is below the
    /// threshold, i.e. the minor-allele evidence there is indistinguishable
    /// from sequencing error.
    pub fn valid_entries(
        &self,
        input_code: &str,
        dest_code: &str,
        params: &Params,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut valid = Vec::new();
        let mut failed = Vec::new();
        let mismatches: Vec<(usize, bool)> = input_code
            .chars()
            .zip(dest_code.chars())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, (a, _))| (i, a == '0'))
            .collect();
        let all_zero_to_one = mismatches.iter().all(|&(_, up)| up);
        for idx in self.entries_by_code(input_code) {
            if !all_zero_to_one {
                failed.push(idx);
                continue;
            }
            let entry = &self.entries[idx];
            let convertible = mismatches
                .iter()
                .all(|&(pos, _)| entry.sum_prob(pos, params.base_error) < params.threshold);
            if convertible {
                valid.push(idx);
            } else {
                failed.push(idx);
            }
        }
        (valid, failed)
    }

    /// Entry count per GATK code, excluding the reserved all-ones code.
    pub fn mutation_counts(&self) -> HashMap<String, f64> {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.gatk_code()).or_insert(0.0) += 1.0;
        }
        if let Some(width) = self.entries.first().map(|e| e.num_samples()) {
            counts.remove(&"1".repeat(width));
        }
        counts
    }

    pub fn num_samples(&self) -> usize {
        self.entries.first().map(|e| e.num_samples()).unwrap_or(0)
    }

    /// Writes the flat matrix file: one row per GATK code, ordered by
    /// descending numeric code value. Returns the rows written.
    pub fn generate_matrix(&self, path: &Path) -> Result<Vec<(String, f64)>> {
        let counts = self.mutation_counts();
        if counts.is_empty() {
            return Err(PhyError::Vcf("no usable codes for matrix generation".into()));
        }
        let mut rows: Vec<(String, f64)> = counts.into_iter().collect();
        rows.sort_by(|a, b| {
            let ca = u64::from_str_radix(&a.0, 2).unwrap_or(0);
            let cb = u64::from_str_radix(&b.0, 2).unwrap_or(0);
            cb.cmp(&ca)
        });
        write_matrix_file(path, &rows, self.num_samples())?;
        Ok(rows)
    }

    /// Writes the `Chromosome\tLocation\tGATK` listing.
    pub fn write_gatk_file(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        writer.write_record(["Chromosome", "Location", "GATK"])?;
        for entry in &self.entries {
            writer.write_record([
                entry.chromosome.as_str(),
                entry.position.as_str(),
                entry.gatk_code().as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// The `matrix` command: load a VCF and emit the mutation matrix, plus the
/// optional GATK-code listing.
pub fn start(
    vcf_file: &Path,
    matrix_out: &Path,
    gatk_out: Option<&Path>,
    params: &Params,
) -> Result<()> {
    let db = VcfDatabase::load(vcf_file, params)?;
    let rows = db.generate_matrix(matrix_out)?;
    info!(
        codes = rows.len(),
        path = %matrix_out.display(),
        "wrote mutation matrix"
    );
    if let Some(path) = gatk_out {
        db.write_gatk_file(path)?;
        info!(path = %path.display(), "wrote GATK listing");
    }
    Ok(())
}

fn keep_entry(entry: &VcfEntry, params: &Params) -> bool {
    // Any uncalled sample disqualifies the record.
    if entry.calls.iter().any(|c| c.genotype == "./.") {
        return false;
    }
    // Germline: variant present in every sample.
    if entry
        .calls
        .iter()
        .all(|c| c.genotype == "0/1" || c.genotype == "1/1")
    {
        return false;
    }
    // Mean coverage gate.
    let total_depth: u64 = entry.calls.iter().map(|c| c.read_depth).sum();
    if 2.0 * total_depth as f64 / entry.num_samples() as f64 <= params.coverage {
        return false;
    }
    true
}

fn open_maybe_gzip(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(chrom: &str, pos: &str, samples: &[&str]) -> VcfEntry {
        let line = format!(
            "{}\t{}\t.\tA\tC\t50\tPASS\t.\tGT:AD:DP\t{}",
            chrom,
            pos,
            samples.join("\t")
        );
        VcfEntry::from_line(&line, 1).unwrap()
    }

    #[test]
    fn gatk_code_reflects_genotypes() {
        let e = entry("1", "100", &["0/0:20,0:20", "0/1:14,6:20", "1/1:2,18:20"]);
        assert_eq!(e.gatk_code(), "011");
    }

    #[test]
    fn sum_prob_is_one_with_no_minor_evidence() {
        // a = 0 sums the entire (unnormalized) mass; dominated by the k = 0
        // term, comfortably above any edit threshold.
        let e = entry("1", "100", &["0/0:20,0:20", "0/1:14,6:20"]);
        let p = e.sum_prob(0, 0.02);
        assert!(p > 0.5, "p = {p}");
    }

    #[test]
    fn sum_prob_is_small_with_strong_minor_evidence() {
        let e = entry("1", "100", &["0/0:2,18:20", "0/1:14,6:20"]);
        let p = e.sum_prob(0, 0.02);
        assert!(p < 1e-10, "p = {p}");
    }

    #[test]
    fn filters_drop_uncalled_germline_and_low_coverage() {
        let params = Params::default();
        let uncalled = entry("1", "1", &["./.", "0/1:14,6:20"]);
        assert!(!keep_entry(&uncalled, &params));
        let germline = entry("1", "2", &["0/1:14,6:20", "1/1:2,18:20"]);
        assert!(!keep_entry(&germline, &params));
        let shallow = entry("1", "3", &["0/0:5,0:5", "0/1:3,2:5"]);
        assert!(!keep_entry(&shallow, &params));
        let good = entry("1", "4", &["0/0:20,0:20", "0/1:14,6:20"]);
        assert!(keep_entry(&good, &params));
    }

    #[test]
    fn one_to_zero_mismatch_fails_all_entries() {
        let db = VcfDatabase::from_entries(vec![
            entry("1", "10", &["0/1:14,6:20", "0/0:20,0:20", "0/0:20,0:20"]),
        ]);
        let (valid, failed) = db.valid_entries("100", "001", &Params::default());
        assert!(valid.is_empty());
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn weak_evidence_allows_zero_to_one_conversion() {
        // Mismatch at sample 2, where the minor-allele count is high enough
        // that the code's 0 looks like a miscall.
        let db = VcfDatabase::from_entries(vec![
            entry("1", "10", &["0/1:14,6:20", "0/0:20,0:20", "0/0:4,16:20"]),
        ]);
        let params = Params::default();
        let (valid, failed) = db.valid_entries("100", "101", &params);
        assert_eq!(valid.len(), 1);
        assert!(failed.is_empty());
    }

    #[test]
    fn strong_reference_evidence_blocks_conversion() {
        let db = VcfDatabase::from_entries(vec![
            entry("1", "10", &["0/1:14,6:20", "0/0:20,0:20", "0/0:20,0:20"]),
        ]);
        let params = Params::default();
        let (valid, failed) = db.valid_entries("100", "101", &params);
        assert!(valid.is_empty());
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn mutation_counts_exclude_all_ones() {
        let db = VcfDatabase::from_entries(vec![
            entry("1", "1", &["0/1:14,6:20", "0/0:20,0:20"]),
            entry("1", "2", &["0/1:14,6:20", "0/1:14,6:20"]),
        ]);
        let counts = db.mutation_counts();
        assert_eq!(counts.get("10"), Some(&1.0));
        assert!(!counts.contains_key("11"));
    }

    #[test]
    fn reassign_moves_bucket_membership_only() {
        let mut db = VcfDatabase::from_entries(vec![
            entry("1", "1", &["0/1:14,6:20", "0/0:20,0:20"]),
        ]);
        assert_eq!(db.entries_by_code("10"), vec![0]);
        db.reassign(0, "10", "11");
        assert!(db.entries_by_code("10").is_empty());
        assert_eq!(db.entries_by_code("11"), vec![0]);
        // The entry's own code derivation is untouched.
        assert_eq!(db.entry(0).gatk_code(), "10");
    }
}
