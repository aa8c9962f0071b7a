//! cuBLAS on top of a `cust` context and stream.

use std::{ffi::c_void, fmt::Display};

use cudarc::cublas::{result as blas, sys};
use cust::{memory::CopyDestination, prelude::*};
use tracing::{debug, info, warn};

use super::{ComputeBackend, GemmCall, GemmOperands, Transpose};
use crate::{
    error::BackendError,
    precision::{ElementType, GemmPath},
};

fn backend_err(context: &str) -> impl FnOnce(cust::error::CudaError) -> BackendError + '_ {
    move |e| BackendError::new(format!("{context}: {e}"))
}

fn dim(value: usize, name: &str) -> Result<i32, BackendError> {
    i32::try_from(value).map_err(|_| BackendError::new(format!("{name}={value} exceeds i32")))
}

fn op(t: Transpose) -> sys::cublasOperation_t {
    match t {
        Transpose::None => sys::cublasOperation_t::CUBLAS_OP_N,
        Transpose::Transpose => sys::cublasOperation_t::CUBLAS_OP_T,
    }
}

fn data_type(element: ElementType) -> sys::cudaDataType {
    match element {
        ElementType::F32 => sys::cudaDataType::CUDA_R_32F,
        ElementType::Bf16 => sys::cudaDataType::CUDA_R_16BF,
    }
}

fn compute_type(element: ElementType) -> Result<sys::cublasComputeType_t, BackendError> {
    match element {
        ElementType::F32 => Ok(sys::cublasComputeType_t::CUBLAS_COMPUTE_32F),
        ElementType::Bf16 => Err(BackendError::new("cuBLAS cannot accumulate in bf16")),
    }
}

fn raw<T>(buffer: &DeviceBuffer<u8>) -> *mut T {
    buffer.as_device_ptr().as_raw() as usize as *mut T
}

pub struct CudaBackend {
    handle: sys::cublasHandle_t,
    stream: Stream,
    // Must outlive the stream and the cuBLAS handle.
    _ctx: Context,
}

impl CudaBackend {
    /// Picks the first device, makes a context current on this thread and
    /// binds a cuBLAS handle to a non-blocking stream.
    pub fn new() -> Result<Self, BackendError> {
        let ctx = cust::quick_init().map_err(backend_err("CUDA context"))?;
        let stream =
            Stream::new(StreamFlags::NON_BLOCKING, None).map_err(backend_err("CUDA stream"))?;

        let handle = blas::create_handle()
            .map_err(|e| BackendError::new(format!("cuBLAS handle: {e:?}")))?;
        // SAFETY: `handle` was just created and the stream outlives it.
        if let Err(e) = unsafe { blas::set_stream(handle, stream.as_inner() as _) } {
            // SAFETY: the handle is not used after this point.
            let _ = unsafe { blas::destroy_handle(handle) };
            return Err(BackendError::new(format!("cuBLAS stream binding: {e:?}")));
        }

        if let Ok(device) = Device::get_device(0) {
            if let Ok(name) = device.name() {
                info!(device = %name, "CUDA backend ready");
            }
        }

        Ok(Self {
            handle,
            stream,
            _ctx: ctx,
        })
    }
}

fn status<E: std::fmt::Debug>(r: Result<(), E>) -> Result<(), BackendError> {
    r.map_err(|e| BackendError::new(format!("{e:?}")))
}

fn display<E: Display>(e: E) -> BackendError {
    BackendError::new(e.to_string())
}

impl ComputeBackend for CudaBackend {
    type Buffer = DeviceBuffer<u8>;

    fn alloc(&self, bytes: usize) -> Result<Self::Buffer, BackendError> {
        debug!(bytes, "cuMemAlloc");
        // SAFETY: the buffer is fully written by `upload` or by the GEMM before being read.
        unsafe { DeviceBuffer::uninitialized(bytes) }.map_err(display)
    }

    fn upload(&self, host: &[u8], device: &mut Self::Buffer) -> Result<(), BackendError> {
        if host.len() != device.len() {
            return Err(BackendError::new(format!(
                "host buffer is {} bytes, device buffer is {}",
                host.len(),
                device.len()
            )));
        }
        device.copy_from(host).map_err(display)
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        self.stream.synchronize().map_err(display)
    }

    fn gemm(
        &self,
        call: &GemmCall,
        operands: GemmOperands<'_, Self::Buffer>,
    ) -> Result<(), BackendError> {
        let (m, n, k) = (dim(call.m, "m")?, dim(call.n, "n")?, dim(call.k, "k")?);
        let (lda, ldb, ldc) = (
            dim(call.lda, "lda")?,
            dim(call.ldb, "ldb")?,
            dim(call.ldc, "ldc")?,
        );
        call.check_sizes([operands.a.len(), operands.b.len(), operands.c.len()])?;
        let profile = call.profile;
        let compute = compute_type(profile.compute)?;

        match profile.path {
            // SAFETY: sizes were checked above and the buffers stay alive
            // until the caller synchronizes.
            GemmPath::Simple => status(unsafe {
                blas::sgemm(
                    self.handle,
                    op(call.op_a),
                    op(call.op_b),
                    m,
                    n,
                    k,
                    &call.alpha,
                    raw::<f32>(operands.a),
                    lda,
                    raw::<f32>(operands.b),
                    ldb,
                    &call.beta,
                    raw::<f32>(operands.c),
                    ldc,
                )
            }),
            GemmPath::Extended => status(unsafe {
                blas::gemm_ex(
                    self.handle,
                    op(call.op_a),
                    op(call.op_b),
                    m,
                    n,
                    k,
                    (&call.alpha as *const f32).cast::<c_void>(),
                    raw::<c_void>(operands.a),
                    data_type(profile.element),
                    lda,
                    raw::<c_void>(operands.b),
                    data_type(profile.element),
                    ldb,
                    (&call.beta as *const f32).cast::<c_void>(),
                    raw::<c_void>(operands.c),
                    data_type(profile.output),
                    ldc,
                    compute,
                    sys::cublasGemmAlgo_t::CUBLAS_GEMM_DEFAULT,
                )
            }),
        }
    }

    fn free(&self, buffer: Self::Buffer) {
        if let Err((e, _)) = DeviceBuffer::drop(buffer) {
            warn!(error = %e, "cuMemFree failed");
        }
    }
}

impl Drop for CudaBackend {
    fn drop(&mut self) {
        // SAFETY: no buffers or calls outlive the backend.
        if let Err(e) = unsafe { blas::destroy_handle(self.handle) } {
            warn!(error = ?e, "cuBLAS handle teardown failed");
        }
    }
}
