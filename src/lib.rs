// Library exports for blastcov
pub mod blast;
pub mod coverage;
pub mod error;
pub mod interval;
pub mod report;

pub use crate::coverage::{
    compute_coverage, CoverageConfig, CoverageEngine, CoveragePercent, CoverageReport,
    CoverageResult,
};
pub use crate::error::{CoverageError, Result};
