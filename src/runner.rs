//! Runs benchmark jobs one after another against a compute backend.

use std::{
    io::{self, Write},
    time::{Duration, Instant},
};

use tracing::{debug, info, info_span, warn};

use crate::{
    backend::{ComputeBackend, GemmCall, GemmOperands, ScopedBuffer, Transpose},
    error::{BackendError, BenchError, Operand, Result, SyncPhase},
    plan::BenchmarkJob,
    precision::{HostOperands, PrecisionProfile, DEFAULT_SEED},
    report,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunConfig {
    pub profile: PrecisionProfile,
    /// GEMM calls issued back to back inside one timed region. At least 1.
    pub repeat: u32,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile: PrecisionProfile::FP32,
            repeat: 1,
            seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    fn repeat(&self) -> u32 {
        self.repeat.max(1)
    }

    /// `repeat * 2 * rows * columns * rows` floating-point operations over
    /// `elapsed`, in TFLOP/s.
    ///
    /// This counts the multiply-adds of a (rows x rows) . (rows x columns)
    /// product, not a general M x N x K one. `None` when no time elapsed.
    pub fn tflops(&self, job: &BenchmarkJob, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return None;
        }
        let (rows, columns) = (job.rows as f64, job.columns as f64);
        let flops = f64::from(self.repeat()) * 2.0 * rows * columns * rows;
        Some(flops / (secs * 1e12))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingResult {
    pub elapsed: Duration,
    pub tflops: Option<f64>,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: BenchmarkJob,
    pub result: Result<TimingResult>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<JobOutcome>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

fn byte_len(rows: usize, columns: usize, element_size: usize, operand: Operand) -> Result<usize> {
    rows.checked_mul(columns)
        .and_then(|n| n.checked_mul(element_size))
        .ok_or_else(|| BenchError::Allocation {
            operand,
            source: BackendError::new(format!(
                "{rows}x{columns} elements of {element_size} bytes overflow usize"
            )),
        })
}

/// Holds the long-lived backend for the whole run; every job borrows it.
pub struct Runner<'b, B: ComputeBackend> {
    backend: &'b B,
    config: RunConfig,
}

impl<'b, B: ComputeBackend> Runner<'b, B> {
    pub fn new(backend: &'b B, config: RunConfig) -> Self {
        Self { backend, config }
    }

    /// The GEMM issued for `job`: (M, N, K) = (rows, columns, rows),
    /// column-major, alpha = 1 and beta = 0.
    pub fn gemm_call(&self, job: &BenchmarkJob) -> GemmCall {
        let profile = self.config.profile;
        let (op_b, ldb) = if profile.transposes_b() {
            (Transpose::Transpose, job.columns)
        } else {
            (Transpose::None, job.rows)
        };
        GemmCall {
            op_a: Transpose::None,
            op_b,
            m: job.rows,
            n: job.columns,
            k: job.rows,
            lda: job.rows,
            ldb,
            ldc: job.rows,
            alpha: 1.0,
            beta: 0.0,
            profile,
        }
    }

    fn alloc(&self, operand: Operand, bytes: usize) -> Result<ScopedBuffer<'b, B>> {
        debug!(%operand, bytes, "allocating device buffer");
        ScopedBuffer::alloc(self.backend, bytes)
            .map_err(|source| BenchError::Allocation { operand, source })
    }

    fn upload(&self, operand: Operand, host: &[u8], device: &mut ScopedBuffer<'b, B>) -> Result<()> {
        self.backend
            .upload(host, device.get_mut())
            .map_err(|source| BenchError::Transfer { operand, source })
    }

    /// Benchmarks one job. Device buffers are released on every return path.
    pub fn run_job(&self, job: &BenchmarkJob) -> Result<TimingResult> {
        let profile = self.config.profile;
        let a_bytes = byte_len(job.rows, job.rows, profile.element.size_in_bytes(), Operand::A)?;
        let b_bytes = byte_len(job.rows, job.columns, profile.element.size_in_bytes(), Operand::B)?;
        let c_bytes = byte_len(job.rows, job.columns, profile.output.size_in_bytes(), Operand::C)?;

        let host = HostOperands::generate(
            job.rows * job.rows,
            job.rows * job.columns,
            profile.element,
            self.config.seed,
        )?;

        let mut a = self.alloc(Operand::A, a_bytes)?;
        let mut b = self.alloc(Operand::B, b_bytes)?;
        let c = if profile.needs_output_buffer() {
            Some(self.alloc(Operand::C, c_bytes)?)
        } else {
            None
        };

        self.upload(Operand::A, &host.a, &mut a)?;
        self.upload(Operand::B, &host.b, &mut b)?;

        // Drain the queued transfers so the timed region holds only the GEMM.
        self.backend
            .synchronize()
            .map_err(|source| BenchError::Synchronization {
                phase: SyncPhase::BeforeCompute,
                elapsed: None,
                source,
            })?;

        let call = self.gemm_call(job);
        let operands = GemmOperands {
            a: a.get(),
            b: b.get(),
            c: c.as_ref().map_or(b.get(), ScopedBuffer::get),
        };

        let start = Instant::now();
        for _ in 0..self.config.repeat() {
            self.backend
                .gemm(&call, operands)
                .map_err(|e| BenchError::Compute {
                    diagnostic: Some(e.message),
                })?;
        }
        let synced = self.backend.synchronize();
        let elapsed = start.elapsed();

        synced.map_err(|source| BenchError::Synchronization {
            phase: SyncPhase::AfterCompute,
            elapsed: Some(elapsed),
            source,
        })?;

        Ok(TimingResult {
            elapsed,
            tflops: self.config.tflops(job, elapsed),
        })
    }

    /// Runs every job in order, writing the report to `out`. A failed job is
    /// reported and skipped; it never stops the run.
    pub fn run_plan<W: Write>(&self, jobs: &[BenchmarkJob], out: &mut W) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();

        for job in jobs {
            let _span = info_span!("gemm", size = %job, precision = %self.config.profile).entered();
            report::banner(out, job, &self.config.profile)?;

            let result = self.run_job(job);
            match &result {
                Ok(timing) => {
                    info!(
                        elapsed_ms = timing.elapsed.as_secs_f64() * 1e3,
                        tflops = timing.tflops.unwrap_or(f64::NAN),
                        "job complete"
                    );
                    report::timing(out, job, timing)?;
                }
                Err(err) => {
                    warn!(error = %err, "job aborted");
                    report::failure(out, job, err)?;
                }
            }

            summary.outcomes.push(JobOutcome { job: *job, result });
        }

        report::summary(out, &summary)?;
        Ok(summary)
    }
}
