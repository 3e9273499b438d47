use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use phytree::config::{
    Params, DEFAULT_BASE_ERROR, DEFAULT_COVERAGE, DEFAULT_EDIT_DISTANCE, DEFAULT_THRESHOLD,
    DEFAULT_THRESHOLD_PVALUE,
};
use phytree::{build, phylo, vcf};

#[derive(Debug, Parser)]
#[clap(name = "phytree")]
#[clap(about = "Perfect-phylogeny inference from genomic variant calls.", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate the GATK-code mutation matrix from a VCF file
    #[clap(arg_required_else_help = true)]
    Matrix {
        /// input VCF file (.vcf or .vcf.gz)
        #[clap(short, long, value_parser, required = true)]
        input_vcf: PathBuf,

        /// output path for the mutation matrix
        #[clap(short, long, value_parser, required = true)]
        output: PathBuf,

        /// optional output path for the Chromosome/Location/GATK listing
        #[clap(short, long, value_parser)]
        gatk_output: Option<PathBuf>,

        /// minimum mean read depth to keep a record
        #[clap(short, long, value_parser, default_value_t = DEFAULT_COVERAGE)]
        coverage: f64,
    },

    /// Check whether a matrix file admits a perfect phylogeny
    #[clap(arg_required_else_help = true)]
    Check {
        /// input matrix file
        #[clap(short, long, value_parser, required = true)]
        matrix_file: PathBuf,

        /// p-value bound for the dynamic conflict threshold
        #[clap(short, long, value_parser, default_value_t = DEFAULT_THRESHOLD_PVALUE)]
        threshold_pvalue: f64,
    },

    /// Build the phylogenetic tree, repairing conflicts if needed
    #[clap(arg_required_else_help = true)]
    Build {
        /// input VCF file (.vcf or .vcf.gz)
        #[clap(short, long, value_parser, required = true)]
        input_vcf: PathBuf,

        /// output path for the mutation matrix
        #[clap(short, long, value_parser, required = true)]
        matrix_output: PathBuf,

        /// output path for the tree JSON
        #[clap(short, long, value_parser, required = true)]
        tree_output: PathBuf,

        /// output path for the SNV edit move log
        #[clap(short = 'l', long, value_parser, required = true)]
        move_log_output: PathBuf,

        /// per-base sequencing error rate
        #[clap(short, long, value_parser, default_value_t = DEFAULT_BASE_ERROR)]
        base_error: f64,

        /// probability threshold for a position to be editable
        #[clap(short = 'p', long, value_parser, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// minimum mean read depth to keep a record
        #[clap(short, long, value_parser, default_value_t = DEFAULT_COVERAGE)]
        coverage: f64,

        /// p-value bound for the dynamic conflict threshold
        #[clap(short = 'v', long, value_parser, default_value_t = DEFAULT_THRESHOLD_PVALUE)]
        threshold_pvalue: f64,

        /// maximum Hamming distance for SNV edit targets
        #[clap(short, long, value_parser, default_value_t = DEFAULT_EDIT_DISTANCE)]
        edit_distance: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let result = match args.command {
        Commands::Matrix {
            input_vcf,
            output,
            gatk_output,
            coverage,
        } => {
            let params = Params {
                coverage,
                ..Params::default()
            };
            vcf::start(&input_vcf, &output, gatk_output.as_deref(), &params).map(|_| ExitCode::SUCCESS)
        }

        Commands::Check {
            matrix_file,
            threshold_pvalue,
        } => {
            let params = Params {
                threshold_pvalue,
                ..Params::default()
            };
            phylo::start(&matrix_file, &params).map(|consistent| {
                if consistent {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            })
        }

        Commands::Build {
            input_vcf,
            matrix_output,
            tree_output,
            move_log_output,
            base_error,
            threshold,
            coverage,
            threshold_pvalue,
            edit_distance,
        } => {
            let params = Params {
                base_error,
                threshold,
                coverage,
                threshold_pvalue,
                edit_distance,
            };
            build::start(
                &input_vcf,
                &matrix_output,
                &tree_output,
                &move_log_output,
                &params,
            )
            .map(|_| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
