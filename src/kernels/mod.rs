//! Kernel sets and runtime selection.
//!
//! Two complete implementations of the dispatch contract live here:
//! a scalar reference set (`scalar`, also the test oracle) and an
//! 8-lane portable-SIMD set (`wide`). Which one backs the process-wide
//! table is decided once from the detected ISA level and cached; the
//! decision never changes afterwards.

use std::sync::OnceLock;

use crate::block::{q8_row_size, ComputeStrategy};
use crate::dispatch::QNBitGemmDispatch;

pub mod scalar;
pub mod wide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaLevel {
    Scalar,
    Avx2,
    Avx512,
    Neon,
}

static ISA_LEVEL: OnceLock<IsaLevel> = OnceLock::new();

pub fn get_isa_level() -> IsaLevel {
    *ISA_LEVEL.get_or_init(detect_isa_features)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_isa_features() -> IsaLevel {
    if is_x86_feature_detected!("avx512f") {
        IsaLevel::Avx512
    } else if is_x86_feature_detected!("avx2") {
        IsaLevel::Avx2
    } else {
        IsaLevel::Scalar
    }
}

#[cfg(target_arch = "aarch64")]
fn detect_isa_features() -> IsaLevel {
    IsaLevel::Neon
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect_isa_features() -> IsaLevel {
    IsaLevel::Scalar
}

/// Picks the table for the detected ISA. Any level with usable vector
/// units gets the 8-lane set; everything else falls back to scalar.
pub(crate) fn select_dispatch() -> &'static QNBitGemmDispatch {
    let isa = get_isa_level();
    let table = match isa {
        IsaLevel::Scalar => {
            log::warn!("no vector ISA detected, using scalar qnbit kernels");
            &scalar::DISPATCH
        }
        IsaLevel::Avx2 | IsaLevel::Avx512 | IsaLevel::Neon => {
            log::debug!("selected 8-lane qnbit kernel set for {isa:?}");
            &wide::DISPATCH
        }
    };
    table
}

// ── Workspace sizing protocol, shared by both sets ───────────────────
//
// The int8 strategy stages every quantized activation row in scratch;
// the fp32 strategy consumes A in place and needs none. Both kernel
// sets agree on the staging layout, so they share the arithmetic.

/// Start alignment of the int8 staging workspace.
pub(crate) const WORKSPACE_ALIGN: usize = 64;

pub(crate) fn workspace_size(
    m: usize,
    _n: usize,
    k: usize,
    blk_len: usize,
    strategy: ComputeStrategy,
) -> usize {
    match strategy {
        ComputeStrategy::CompFp32 => 0,
        ComputeStrategy::CompInt8 => m * q8_row_size(blk_len, k),
    }
}

pub(crate) fn workspace_alignment(_blk_len: usize, strategy: ComputeStrategy) -> usize {
    match strategy {
        ComputeStrategy::CompFp32 => 1,
        ComputeStrategy::CompInt8 => WORKSPACE_ALIGN,
    }
}
