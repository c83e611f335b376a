//! Block-quantization layout arithmetic.
//!
//! A quantized block is `blk_len` consecutive values compressed to
//! `bit_width` bits each and stored packed. Each block carries one f32
//! scale and, optionally, one integer zero point; zero points for 4-bit
//! (and narrower) codes are nibble-packed two per byte.
//!
//! Everything here is pure size math shared by the packing pipeline,
//! the workspace protocol, and every kernel set. The byte conventions
//! are load-bearing: downstream buffer sizing depends on them exactly.

/// The one quantized-B bit width this crate ships kernels for.
pub const BLK_BITWIDTH_4: usize = 4;

/// Column panel width of the dense-SGEMM "pack B" layout that
/// [`dequant_b_for_sgemm`](crate::dispatch::QNBitGemmDispatch::dequant_b_for_sgemm)
/// targets. Output sizing rounds `count_n` up to a multiple of this.
pub const SGEMM_PANEL_WIDTH: usize = 16;

/// How the activation matrix A is consumed.
///
/// Bound once when a dispatch table is built; never switched mid-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeStrategy {
    /// A stays f32; B is dequantized on the fly (or staged for SGEMM).
    CompFp32,
    /// A is first block-quantized to int8 codes + per-block scales.
    CompInt8,
}

#[inline(always)]
pub const fn div_round_up(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Bytes of packed code data in one quantized block.
///
/// `blk_len * bit_width` must be a multiple of 8; a violation silently
/// truncates (integer division), it is never a reported error.
#[inline(always)]
pub const fn blk_data_size_in_bytes(bit_width: usize, blk_len: usize) -> usize {
    blk_len * bit_width / 8
}

/// Bytes of zero-point storage for `blk_count` blocks of one column.
///
/// Widths of 4 bits or less pack two zero points per byte; wider widths
/// spend a full byte each.
#[inline(always)]
pub const fn zero_point_size_in_bytes(bit_width: usize, blk_count: usize) -> usize {
    if bit_width <= 4 {
        div_round_up(blk_count, 2)
    } else {
        blk_count
    }
}

// ── Quantized-A (int8) block layout ──────────────────────────────────
//
// One activation row quantizes into ceil(count_k / blk_len) blocks laid
// out back to back, each self-describing:
//
//   [ scale: f32 (native endian) | codes: blk_len x i8, zero padded ]
//
// A consuming kernel recovers both without external metadata.

/// Bytes occupied by one quantized-A block.
#[inline(always)]
pub const fn q8_blk_size(blk_len: usize) -> usize {
    core::mem::size_of::<f32>() + blk_len
}

/// Bytes occupied by one quantized-A row of `count_k` values.
#[inline(always)]
pub const fn q8_row_size(blk_len: usize, count_k: usize) -> usize {
    div_round_up(count_k, blk_len) * q8_blk_size(blk_len)
}

/// Reads the scale of the quantized-A block starting at `blk[0]`.
#[inline(always)]
pub fn q8_blk_scale(blk: &[u8]) -> f32 {
    f32::from_ne_bytes([blk[0], blk[1], blk[2], blk[3]])
}

/// Writes `scale` into the quantized-A block starting at `blk[0]`.
#[inline(always)]
pub fn q8_blk_set_scale(blk: &mut [u8], scale: f32) {
    blk[..4].copy_from_slice(&scale.to_ne_bytes());
}

/// The int8 code run of the quantized-A block starting at `blk[0]`.
#[inline(always)]
pub fn q8_blk_data(blk: &[u8], blk_len: usize) -> &[u8] {
    &blk[4..4 + blk_len]
}
