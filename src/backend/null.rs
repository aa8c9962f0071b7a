//! A backend that performs no arithmetic. It records every call and can be
//! told to fail at a given call, which makes it the harness's test double and
//! the engine behind `--backend null` dry runs.

use std::cell::Cell;

use tracing::debug;

use super::{ComputeBackend, GemmCall, GemmOperands};
use crate::error::BackendError;

/// 1-based call indices, counted over the backend's whole lifetime, at which
/// the corresponding operation reports failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_alloc_at: Option<usize>,
    pub fail_upload_at: Option<usize>,
    pub fail_sync_at: Option<usize>,
    pub fail_gemm_at: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub allocs: usize,
    pub frees: usize,
    pub uploads: usize,
    pub syncs: usize,
    pub gemms: usize,
}

#[derive(Debug)]
pub struct NullBuffer {
    id: usize,
    bytes: usize,
    uploaded: usize,
}

impl NullBuffer {
    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Bytes written by the last upload.
    pub fn uploaded(&self) -> usize {
        self.uploaded
    }
}

#[derive(Debug, Default)]
pub struct NullBackend {
    faults: FaultPlan,
    counts: Cell<CallCounts>,
    alloc_attempts: Cell<usize>,
    last_gemm: Cell<Option<GemmCall>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    pub fn counts(&self) -> CallCounts {
        self.counts.get()
    }

    pub fn live_buffers(&self) -> usize {
        let counts = self.counts.get();
        counts.allocs - counts.frees
    }

    /// Arguments of the most recent GEMM, failed or not.
    pub fn last_gemm(&self) -> Option<GemmCall> {
        self.last_gemm.get()
    }

    fn bump(&self, f: impl FnOnce(&mut CallCounts) -> &mut usize) -> usize {
        let mut counts = self.counts.get();
        let slot = f(&mut counts);
        *slot += 1;
        let n = *slot;
        self.counts.set(counts);
        n
    }
}

fn injected(what: &str, call: usize) -> BackendError {
    BackendError::new(format!("injected {what} failure at call {call}"))
}

impl ComputeBackend for NullBackend {
    type Buffer = NullBuffer;

    fn alloc(&self, bytes: usize) -> Result<NullBuffer, BackendError> {
        // Only successful allocations count towards `allocs`, so it always pairs with `frees`.
        let call = self.alloc_attempts.get() + 1;
        self.alloc_attempts.set(call);
        if self.faults.fail_alloc_at == Some(call) {
            return Err(injected("alloc", call));
        }
        let id = self.bump(|c| &mut c.allocs);
        debug!(id, bytes, "alloc");
        Ok(NullBuffer {
            id,
            bytes,
            uploaded: 0,
        })
    }

    fn upload(&self, host: &[u8], device: &mut NullBuffer) -> Result<(), BackendError> {
        let call = self.bump(|c| &mut c.uploads);
        if self.faults.fail_upload_at == Some(call) {
            return Err(injected("upload", call));
        }
        if host.len() > device.bytes {
            return Err(BackendError::new(format!(
                "upload of {} bytes into a {} byte buffer",
                host.len(),
                device.bytes
            )));
        }
        device.uploaded = host.len();
        Ok(())
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        let call = self.bump(|c| &mut c.syncs);
        if self.faults.fail_sync_at == Some(call) {
            return Err(injected("synchronize", call));
        }
        Ok(())
    }

    fn gemm(
        &self,
        call: &GemmCall,
        operands: GemmOperands<'_, NullBuffer>,
    ) -> Result<(), BackendError> {
        let n = self.bump(|c| &mut c.gemms);
        self.last_gemm.set(Some(*call));
        if self.faults.fail_gemm_at == Some(n) {
            return Err(injected("gemm", n));
        }
        call.check_sizes([operands.a.bytes, operands.b.bytes, operands.c.bytes])
    }

    fn free(&self, buffer: NullBuffer) {
        debug!(id = buffer.id, "free");
        self.bump(|c| &mut c.frees);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_records_size_and_rejects_overflow() {
        let backend = NullBackend::new();
        let mut buffer = backend.alloc(8).unwrap();
        assert_eq!(buffer.len(), 8);

        backend.upload(&[1; 6], &mut buffer).unwrap();
        assert_eq!(buffer.uploaded(), 6);
        assert!(backend.upload(&[1; 9], &mut buffer).is_err());

        backend.free(buffer);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn failed_allocations_are_not_counted() {
        let backend = NullBackend::with_faults(FaultPlan {
            fail_alloc_at: Some(1),
            ..FaultPlan::default()
        });
        assert!(backend.alloc(4).is_err());
        let buffer = backend.alloc(4).unwrap();
        assert_eq!(backend.counts().allocs, 1);
        backend.free(buffer);
        assert_eq!(backend.counts().frees, 1);
    }

    #[test]
    fn faults_fire_once_at_their_call() {
        let backend = NullBackend::with_faults(FaultPlan {
            fail_sync_at: Some(2),
            ..FaultPlan::default()
        });
        assert!(backend.synchronize().is_ok());
        let err = backend.synchronize().unwrap_err();
        assert_eq!(err.message, "injected synchronize failure at call 2");
        assert!(backend.synchronize().is_ok());
    }
}
