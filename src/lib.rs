//! GEMM throughput benchmark harness.
//!
//! Parses a list of `ROWS,COLUMNS` sizes, then for each one generates
//! seeded operands, uploads them to the device, times a single (or repeated)
//! BLAS GEMM call between two device synchronizations and reports TFLOP/s.
//! The BLAS library sits behind [`backend::ComputeBackend`]; the crate
//! itself never multiplies matrices.

pub mod backend;
pub mod error;
pub mod plan;
pub mod precision;
pub mod report;
pub mod runner;

pub use error::{BackendError, BenchError};
pub use plan::{parse_size_plan, BenchmarkJob, SizePlan};
pub use precision::PrecisionProfile;
pub use runner::{RunConfig, RunSummary, Runner, TimingResult};
