//! Tunable constants for the analysis run.
//!
//! Every knob has a fixed default and can be overridden from the command
//! line. A `Params` value is built once per run and passed down by reference;
//! there is no process-wide state.

pub const DEFAULT_BASE_ERROR: f64 = 0.02;
pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_COVERAGE: f64 = 15.0;
pub const DEFAULT_THRESHOLD_PVALUE: f64 = 0.01;
pub const DEFAULT_EDIT_DISTANCE: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct Params {
    /// Per-base sequencing error rate used by the validity test.
    pub base_error: f64,
    /// A sample position is editable when its miscall probability is below this.
    pub threshold: f64,
    /// Records with mean read depth at or below this are dropped at load time.
    pub coverage: f64,
    /// Tail-probability bound for the dynamic conflict threshold.
    pub threshold_pvalue: f64,
    /// Maximum Hamming distance between a conflict code and a move target.
    pub edit_distance: usize,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            base_error: DEFAULT_BASE_ERROR,
            threshold: DEFAULT_THRESHOLD,
            coverage: DEFAULT_COVERAGE,
            threshold_pvalue: DEFAULT_THRESHOLD_PVALUE,
            edit_distance: DEFAULT_EDIT_DISTANCE,
        }
    }
}
