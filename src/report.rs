//! Line-oriented, human-readable benchmark report.

use std::io::{self, Write};

use crate::{
    error::BenchError,
    plan::{BenchmarkJob, Rejected},
    precision::PrecisionProfile,
    runner::{RunSummary, TimingResult},
};

pub fn banner<W: Write>(out: &mut W, job: &BenchmarkJob, profile: &PrecisionProfile) -> io::Result<()> {
    writeln!(out, "Benchmarking GEMM operation on {job} matrix ({profile})")
}

pub fn timing<W: Write>(out: &mut W, job: &BenchmarkJob, timing: &TimingResult) -> io::Result<()> {
    writeln!(
        out,
        "Time taken for GEMM operation on {job} matrix: {:.3}ms",
        timing.elapsed.as_secs_f64() * 1e3
    )?;
    match timing.tflops {
        Some(tflops) => writeln!(out, "TFLOP/s: {tflops:.3}"),
        None => writeln!(out, "TFLOP/s: n/a (elapsed time below timer resolution)"),
    }
}

pub fn failure<W: Write>(out: &mut W, job: &BenchmarkJob, err: &BenchError) -> io::Result<()> {
    write!(out, "GEMM operation on {job} matrix failed: {err}")?;
    if let BenchError::Synchronization {
        elapsed: Some(elapsed),
        ..
    } = err
    {
        write!(
            out,
            " (after {:.3}ms, throughput not reported)",
            elapsed.as_secs_f64() * 1e3
        )?;
    }
    writeln!(out)
}

pub fn rejected<W: Write>(out: &mut W, rejected: &Rejected) -> io::Result<()> {
    writeln!(
        out,
        "Skipping argument {:?}: {}",
        rejected.argument, rejected.reason
    )
}

pub fn summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(
        out,
        "Completed {} of {} jobs",
        summary.completed(),
        summary.outcomes.len()
    )
}
