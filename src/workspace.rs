//! Caller-owned scratch buffers for the int8 path.
//!
//! The dispatch table reports a per-call byte size and a required
//! alignment; [`Workspace`] allocates exactly that. The fp32 strategy
//! reports size 0, for which `Workspace::allocate` returns an empty
//! buffer with no allocation at all.

use crate::block::ComputeStrategy;
use crate::dispatch::{DispatchError, Op, QNBitGemmDispatch};

/// Byte buffer aligned to whatever the selected kernel set demands.
/// Zero-initialized on allocation so a partially filled quantized-A
/// region never exposes stale bytes.
pub struct Workspace {
    ptr: *mut u8,
    size: usize,
    align: usize,
}

unsafe impl Send for Workspace {}
unsafe impl Sync for Workspace {}

impl Workspace {
    /// Allocate the workspace for one GEMM shape under `strategy`.
    ///
    /// Fails if the table has no sizing slots for the strategy.
    pub fn allocate(
        table: &QNBitGemmDispatch,
        m: usize,
        n: usize,
        k: usize,
        blk_len: usize,
        strategy: ComputeStrategy,
    ) -> Result<Self, DispatchError> {
        let size_fn = table.workspace_size.ok_or(DispatchError::Unsupported(Op::WorkspaceSize))?;
        let align_fn = table
            .workspace_alignment
            .ok_or(DispatchError::Unsupported(Op::WorkspaceAlignment))?;
        let size = size_fn(m, n, k, blk_len, strategy);
        let align = align_fn(blk_len, strategy);
        Ok(Self::with_size(size, align))
    }

    fn with_size(size: usize, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        if size == 0 {
            return Self { ptr: std::ptr::null_mut(), size: 0, align };
        }
        let layout = std::alloc::Layout::from_size_align(size, align).unwrap();
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "workspace allocation failed ({size} bytes)");
        Self { ptr, size, align }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.size == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.size == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            let layout = std::alloc::Layout::from_size_align(self.size, self.align).unwrap();
            unsafe { std::alloc::dealloc(self.ptr, layout) };
        }
    }
}
