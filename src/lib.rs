//! qnbit-kernels: sub-byte block-quantized GEMM kernels (C = A·B + bias).
//!
//! This crate provides the data-layout and dispatch contract for n-bit
//! (currently 4-bit) weight-quantized matrix multiply:
//! - **Runtime Kernel Selection**: ISA probed once, a kernel set chosen at startup
//! - **Swappable Kernel Sets**: a table of independently optional fn-pointer slots,
//!   so an architecture ships only the operations it actually accelerates
//! - **Two Compute Strategies**: float-direct (`CompFp32`) and quantized-activation
//!   (`CompInt8`) paths over the same quantized weights
//!
//! # Quick Start
//!
//! ```ignore
//! use qnbit_kernels::{dispatch, ComputeStrategy, QuantBView, Workspace};
//!
//! let table = dispatch(); // ISA-selected kernel set
//! let b = QuantBView::new(&data, &scales, zero_points, n, k, blk_len);
//! let mut ws = Workspace::allocate(table, m, n, k, blk_len, ComputeStrategy::CompInt8)?;
//! ```

pub mod block;
pub mod dispatch;
pub mod kernels;
pub mod pack;
pub mod views;
pub mod workspace;

mod tests_gemm;

pub use block::{
    blk_data_size_in_bytes, zero_point_size_in_bytes, ComputeStrategy, BLK_BITWIDTH_4,
    SGEMM_PANEL_WIDTH,
};
pub use dispatch::{dispatch, DispatchError, Op, QNBitGemmDispatch};
pub use kernels::{get_isa_level, IsaLevel};
pub use pack::{pack_quant_b, packed_quant_b_size};
pub use views::{QuantBView, DEFAULT_ZERO_POINT};
pub use workspace::Workspace;
