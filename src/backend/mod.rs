//! The narrow interface the runner needs from a GPU BLAS library.

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod null;

use crate::{
    error::BackendError,
    precision::{GemmPath, PrecisionProfile},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transpose {
    None,
    Transpose,
}

/// Arguments of one column-major GEMM: `C = alpha * op(A) * op(B) + beta * C`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GemmCall {
    pub op_a: Transpose,
    pub op_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
    /// Scalars are held in the profile's compute type, which is f32 for every profile.
    pub alpha: f32,
    pub beta: f32,
    pub profile: PrecisionProfile,
}

impl GemmCall {
    /// Minimum byte sizes of A, B and C for this call's dimensions and
    /// leading dimensions, in column-major order.
    pub fn required_bytes(&self) -> [usize; 3] {
        let cols = |op: Transpose, plain: usize, transposed: usize| match op {
            Transpose::None => plain,
            Transpose::Transpose => transposed,
        };
        let input = self.profile.element.size_in_bytes();
        let output = match self.profile.path {
            GemmPath::Simple => input,
            GemmPath::Extended => self.profile.output.size_in_bytes(),
        };
        [
            self.lda * cols(self.op_a, self.k, self.m) * input,
            self.ldb * cols(self.op_b, self.n, self.k) * input,
            self.ldc * self.n * output,
        ]
    }

    /// Rejects buffers smaller than [`Self::required_bytes`].
    pub fn check_sizes(&self, actual: [usize; 3]) -> Result<(), BackendError> {
        for ((name, need), have) in ["A", "B", "C"].iter().zip(self.required_bytes()).zip(actual) {
            if have < need {
                return Err(BackendError::new(format!(
                    "buffer {name} holds {have} bytes, GEMM reads {need}"
                )));
            }
        }
        Ok(())
    }
}

/// Device buffers handed to [`ComputeBackend::gemm`]. On the simple path the
/// output aliases `b`.
pub struct GemmOperands<'a, T> {
    pub a: &'a T,
    pub b: &'a T,
    pub c: &'a T,
}

impl<T> Clone for GemmOperands<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GemmOperands<'_, T> {}

/// Context lifetime is tied to the value: it is created by the backend's
/// constructor and torn down when the backend is dropped.
pub trait ComputeBackend {
    type Buffer;

    fn alloc(&self, bytes: usize) -> Result<Self::Buffer, BackendError>;

    fn upload(&self, host: &[u8], device: &mut Self::Buffer) -> Result<(), BackendError>;

    /// Blocks until all work queued on the device has completed.
    fn synchronize(&self) -> Result<(), BackendError>;

    /// Queues one GEMM. Completion is only observed through [`Self::synchronize`].
    fn gemm(
        &self,
        call: &GemmCall,
        operands: GemmOperands<'_, Self::Buffer>,
    ) -> Result<(), BackendError>;

    fn free(&self, buffer: Self::Buffer);
}

/// A device buffer that is returned to its backend when dropped.
pub struct ScopedBuffer<'b, B: ComputeBackend> {
    backend: &'b B,
    buffer: Option<B::Buffer>,
}

impl<'b, B: ComputeBackend> ScopedBuffer<'b, B> {
    pub fn alloc(backend: &'b B, bytes: usize) -> Result<Self, BackendError> {
        let buffer = backend.alloc(bytes)?;
        Ok(Self {
            backend,
            buffer: Some(buffer),
        })
    }

    pub fn get(&self) -> &B::Buffer {
        // Only `drop` takes the buffer out.
        self.buffer.as_ref().unwrap_or_else(|| unreachable!())
    }

    pub fn get_mut(&mut self) -> &mut B::Buffer {
        self.buffer.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<B: ComputeBackend> Drop for ScopedBuffer<'_, B> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.backend.free(buffer);
        }
    }
}
