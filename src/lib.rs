//! Perfect-phylogeny inference from binary mutation matrices, with
//! heuristic repair of ambiguous mutation calls when the matrix is not
//! tree-consistent.

pub mod build;
pub mod config;
pub mod conflict;
pub mod correct;
pub mod error;
pub mod matrix;
pub mod phylo;
pub mod tree;
pub mod vcf;
