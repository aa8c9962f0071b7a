use std::{collections::TryReserveError, fmt, time::Duration};

use thiserror::Error;

/// Role of a device buffer within one GEMM call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operand::A => "A",
            Operand::B => "B",
            Operand::C => "C",
        };
        f.write_str(name)
    }
}

/// Where a device synchronization happened relative to the timed region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    BeforeCompute,
    AfterCompute,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::BeforeCompute => f.write_str("before compute"),
            SyncPhase::AfterCompute => f.write_str("after compute"),
        }
    }
}

/// Failure reported by a compute backend call, carrying its diagnostic text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("compute backend initialization failed: {0}")]
    Initialization(#[source] BackendError),

    #[error("device memory allocation failed for {operand}: {source}")]
    Allocation {
        operand: Operand,
        #[source]
        source: BackendError,
    },

    #[error("host memory allocation of {bytes} bytes failed for {operand}: {source}")]
    HostAllocation {
        operand: Operand,
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("copy from host to device failed for {operand}: {source}")]
    Transfer {
        operand: Operand,
        #[source]
        source: BackendError,
    },

    #[error("GEMM operation failed{}", diagnostic_suffix(.diagnostic))]
    Compute { diagnostic: Option<String> },

    #[error("device synchronization failed {phase}: {source}")]
    Synchronization {
        phase: SyncPhase,
        /// Time captured before the failed wait, when the timer was running.
        elapsed: Option<Duration>,
        #[source]
        source: BackendError,
    },
}

fn diagnostic_suffix(diagnostic: &Option<String>) -> String {
    diagnostic
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;
