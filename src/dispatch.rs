//! Swappable-kernel dispatch table.
//!
//! One `QNBitGemmDispatch` instance describes a complete kernel set:
//! one implementation slot per operation, any of which may be absent.
//! A table is populated exactly once, before any concurrent reader
//! exists, and is immutable from then on; any number of threads may
//! read it freely. Callers probe availability through [`supports`]
//! (per slot) or [`is_available`] (per compute strategy) instead of
//! invoking a missing operation.
//!
//! [`supports`]: QNBitGemmDispatch::supports
//! [`is_available`]: QNBitGemmDispatch::is_available

use std::sync::OnceLock;

use thiserror::Error;

use crate::block::ComputeStrategy;
use crate::views::QuantBView;

/// Every operation slot a kernel set can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    PackQuantBSize,
    PackQuantB,
    WorkspaceSize,
    WorkspaceAlignment,
    GemmM1CompFp32,
    DequantBForSgemm,
    GemmCompInt8,
    QuantizeARowCompInt8,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("operation {0:?} not provided by the selected kernel set")]
    Unsupported(Op),
}

/// Size of the packed kernel-ready B representation; 0 means the raw
/// layout is consumed directly.
pub type PackQuantBSizeFn =
    fn(n: usize, k: usize, blk_len: usize, strategy: ComputeStrategy) -> usize;

/// Re-lays out raw quantized-B code data into the kernel-ready layout.
/// `pool` is an opaque parallel facility; `None` runs synchronously.
pub type PackQuantBFn = fn(
    n: usize,
    k: usize,
    blk_len: usize,
    strategy: ComputeStrategy,
    raw: &[u8],
    packed_out: &mut [u8],
    pool: Option<&rayon::ThreadPool>,
);

/// Per-GEMM scratch size in bytes; 0 if the strategy needs none.
pub type WorkspaceSizeFn =
    fn(m: usize, n: usize, k: usize, blk_len: usize, strategy: ComputeStrategy) -> usize;

/// Required start alignment of the per-GEMM scratch buffer.
pub type WorkspaceAlignmentFn = fn(blk_len: usize, strategy: ComputeStrategy) -> usize;

/// One output row of C = A · dequant(B) + bias, for f32 A (the M = 1
/// special case). Reads exactly `b.block_stride()` blocks per column.
pub type GemmM1CompFp32Fn =
    fn(b: &QuantBView<'_>, a: &[f32], c: &mut [f32], bias: Option<&[f32]>);

/// Dequantizes B into the dense-SGEMM packed-B panel layout. `out`
/// must hold `ceil(n / SGEMM_PANEL_WIDTH) * SGEMM_PANEL_WIDTH *
/// ceil(k / blk_len) * blk_len` elements; the K-padding tail is
/// caller-allocated but never meaningful.
pub type DequantBForSgemmFn = fn(b: &QuantBView<'_>, out: &mut [f32]);

/// Multiplies block-quantized int8 A rows against packed quantized B.
/// Processes at most `count_m` rows and returns how many it covered;
/// the caller loops, advancing `quant_a` and `c` by the return value.
pub type GemmCompInt8Fn = fn(
    b: &QuantBView<'_>,
    quant_a: &[u8],
    c: &mut [f32],
    count_m: usize,
    ldc: usize,
    bias: Option<&[f32]>,
) -> usize;

/// Block-quantizes one f32 activation row (`a.len()` = count K) into
/// self-describing int8 blocks written to `out`.
pub type QuantizeARowCompInt8Fn = fn(blk_len: usize, a: &[f32], out: &mut [u8]);

/// An immutable record of operation slots, one kernel set's worth.
///
/// All slots are independently optional; a hardware target registers
/// only what it implements.
#[derive(Clone, Copy)]
pub struct QNBitGemmDispatch {
    pub pack_quant_b_size: Option<PackQuantBSizeFn>,
    pub pack_quant_b: Option<PackQuantBFn>,
    pub workspace_size: Option<WorkspaceSizeFn>,
    pub workspace_alignment: Option<WorkspaceAlignmentFn>,
    pub gemm_m1_comp_fp32: Option<GemmM1CompFp32Fn>,
    pub dequant_b_for_sgemm: Option<DequantBForSgemmFn>,
    pub gemm_comp_int8: Option<GemmCompInt8Fn>,
    pub quantize_a_row_comp_int8: Option<QuantizeARowCompInt8Fn>,
}

impl QNBitGemmDispatch {
    /// A table with every slot unset.
    pub const EMPTY: Self = Self {
        pack_quant_b_size: None,
        pack_quant_b: None,
        workspace_size: None,
        workspace_alignment: None,
        gemm_m1_comp_fp32: None,
        dequant_b_for_sgemm: None,
        gemm_comp_int8: None,
        quantize_a_row_comp_int8: None,
    };

    /// Whether this set provides `op`.
    pub fn supports(&self, op: Op) -> bool {
        match op {
            Op::PackQuantBSize => self.pack_quant_b_size.is_some(),
            Op::PackQuantB => self.pack_quant_b.is_some(),
            Op::WorkspaceSize => self.workspace_size.is_some(),
            Op::WorkspaceAlignment => self.workspace_alignment.is_some(),
            Op::GemmM1CompFp32 => self.gemm_m1_comp_fp32.is_some(),
            Op::DequantBForSgemm => self.dequant_b_for_sgemm.is_some(),
            Op::GemmCompInt8 => self.gemm_comp_int8.is_some(),
            Op::QuantizeARowCompInt8 => self.quantize_a_row_comp_int8.is_some(),
        }
    }

    /// `Err(Unsupported)` when `op` is unset; lets orchestrators fail
    /// a GEMM during shape setup instead of at an invoke site.
    pub fn require(&self, op: Op) -> Result<(), DispatchError> {
        if self.supports(op) {
            Ok(())
        } else {
            Err(DispatchError::Unsupported(op))
        }
    }

    /// Whether every slot a strategy relies on is populated.
    pub fn is_available(&self, strategy: ComputeStrategy) -> bool {
        let shared = self.supports(Op::PackQuantBSize)
            && self.supports(Op::PackQuantB)
            && self.supports(Op::WorkspaceSize)
            && self.supports(Op::WorkspaceAlignment);
        match strategy {
            ComputeStrategy::CompFp32 => {
                shared && self.supports(Op::GemmM1CompFp32) && self.supports(Op::DequantBForSgemm)
            }
            ComputeStrategy::CompInt8 => {
                shared
                    && self.supports(Op::GemmCompInt8)
                    && self.supports(Op::QuantizeARowCompInt8)
            }
        }
    }
}

static DISPATCH: OnceLock<&'static QNBitGemmDispatch> = OnceLock::new();

/// The process-wide table, selected once from runtime CPU detection.
/// Safe to call from any thread; all callers observe the same table.
pub fn dispatch() -> &'static QNBitGemmDispatch {
    *DISPATCH.get_or_init(crate::kernels::select_dispatch)
}
