use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bench_gemm::{
    backend::{null::NullBackend, ComputeBackend},
    parse_size_plan,
    precision::DEFAULT_SEED,
    report, BenchError, BenchmarkJob, PrecisionProfile, RunConfig, Runner,
};

use std::{error::Error, io, process::ExitCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Precision {
    Fp32,
    Fp32Ex,
    Bf16,
}

impl Precision {
    fn profile(self) -> PrecisionProfile {
        match self {
            Precision::Fp32 => PrecisionProfile::FP32,
            Precision::Fp32Ex => PrecisionProfile::FP32_EX,
            Precision::Bf16 => PrecisionProfile::BF16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// cuBLAS on the first CUDA device
    Cuda,
    /// Performs no arithmetic; exercises the harness only
    Null,
}

/// Times a BLAS GEMM for each ROWS,COLUMNS size and reports TFLOP/s.
#[derive(Clone, Debug, Parser, PartialEq)]
#[clap(version)]
struct Args {
    /// Matrix sizes, e.g. `1024,1024 2048,512 4096,4096`
    sizes: Vec<String>,
    #[clap(short, long, value_enum, default_value = "fp32")]
    precision: Precision,
    /// GEMM calls inside one timed region
    #[clap(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,
    /// Seed for operand generation
    #[clap(short, long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[clap(short, long, value_enum, default_value = "cuda")]
    backend: Backend,
}

fn run<B: ComputeBackend>(backend: &B, config: RunConfig, jobs: &[BenchmarkJob]) -> io::Result<()> {
    let runner = Runner::new(backend, config);
    let summary = runner.run_plan(jobs, &mut io::stdout().lock())?;
    info!(
        completed = summary.completed(),
        total = summary.outcomes.len(),
        "run finished"
    );
    Ok(())
}

#[cfg(feature = "cuda")]
fn run_cuda(config: RunConfig, jobs: &[BenchmarkJob]) -> Result<(), Box<dyn Error>> {
    let backend = bench_gemm::backend::cuda::CudaBackend::new().map_err(BenchError::Initialization)?;
    Ok(run(&backend, config, jobs)?)
}

#[cfg(not(feature = "cuda"))]
fn run_cuda(_config: RunConfig, _jobs: &[BenchmarkJob]) -> Result<(), Box<dyn Error>> {
    Err(BenchError::Initialization(bench_gemm::BackendError::new(
        "built without the `cuda` feature",
    ))
    .into())
}

fn try_main(args: Args) -> Result<(), Box<dyn Error>> {
    let plan = parse_size_plan(&args.sizes);
    {
        let mut stdout = io::stdout().lock();
        for rejected in &plan.rejected {
            warn!(argument = %rejected.argument, reason = %rejected.reason, "skipping size");
            report::rejected(&mut stdout, rejected)?;
        }
    }

    let config = RunConfig {
        profile: args.precision.profile(),
        repeat: args.repeat,
        seed: args.seed,
    };
    info!(jobs = plan.jobs.len(), precision = %config.profile, backend = ?args.backend, "starting run");

    match args.backend {
        Backend::Cuda => run_cuda(config, &plan.jobs),
        Backend::Null => Ok(run(&NullBackend::new(), config, &plan.jobs)?),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    match try_main(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
