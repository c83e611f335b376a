//! Borrowed views over caller-owned quantized-B storage.
//!
//! A quantized-B matrix is logically N columns by K rows, column major,
//! stored as a parallel triple: packed code blob, per-block f32 scales,
//! and an optional nibble-packed zero-point blob. All three share one
//! block stride (`ceil(k / blk_len)` blocks per column). The view never
//! owns; it only borrows for the duration of a call.
//!
//! Consistency between the three arrays is a caller precondition.
//! Constructors verify it with debug assertions only — release builds
//! pay nothing, matching the no-runtime-validation contract.

use crate::block::{blk_data_size_in_bytes, div_round_up, zero_point_size_in_bytes, BLK_BITWIDTH_4};

/// Zero point applied when no zero-point buffer is present: the
/// midpoint of the 4-bit code range.
pub const DEFAULT_ZERO_POINT: u8 = 8;

/// A borrowed quantized-B matrix (code blob + scales + optional zero
/// points) with its shape.
#[derive(Clone, Copy)]
pub struct QuantBView<'a> {
    data: &'a [u8],
    scales: &'a [f32],
    zero_points: Option<&'a [u8]>,
    n: usize,
    k: usize,
    blk_len: usize,
}

impl<'a> QuantBView<'a> {
    /// Wraps caller-owned storage for an `n` x `k` matrix quantized at
    /// `blk_len` values per block.
    pub fn new(
        data: &'a [u8],
        scales: &'a [f32],
        zero_points: Option<&'a [u8]>,
        n: usize,
        k: usize,
        blk_len: usize,
    ) -> Self {
        let stride = div_round_up(k, blk_len);
        debug_assert_eq!(
            data.len(),
            n * stride * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len),
            "quant B data blob size mismatch"
        );
        debug_assert_eq!(scales.len(), n * stride, "quant B scale count mismatch");
        if let Some(zp) = zero_points {
            debug_assert_eq!(
                zp.len(),
                n * zero_point_size_in_bytes(BLK_BITWIDTH_4, stride),
                "quant B zero point blob size mismatch"
            );
        }
        Self { data, scales, zero_points, n, k, blk_len }
    }

    #[inline(always)]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline(always)]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline(always)]
    pub fn blk_len(&self) -> usize {
        self.blk_len
    }

    /// Blocks per column, shared by all three parallel arrays.
    #[inline(always)]
    pub fn block_stride(&self) -> usize {
        div_round_up(self.k, self.blk_len)
    }

    #[inline(always)]
    pub fn has_zero_points(&self) -> bool {
        self.zero_points.is_some()
    }

    /// The whole code blob, for callers re-laying out the storage.
    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline(always)]
    pub fn scales(&self) -> &'a [f32] {
        self.scales
    }

    #[inline(always)]
    pub fn zero_points(&self) -> Option<&'a [u8]> {
        self.zero_points
    }

    /// The packed code bytes of one column.
    #[inline(always)]
    pub fn data_col(&self, col: usize) -> &'a [u8] {
        let col_bytes = self.block_stride() * blk_data_size_in_bytes(BLK_BITWIDTH_4, self.blk_len);
        &self.data[col * col_bytes..(col + 1) * col_bytes]
    }

    /// The packed code bytes of one block within one column.
    #[inline(always)]
    pub fn data_blk(&self, col: usize, blk: usize) -> &'a [u8] {
        let blk_bytes = blk_data_size_in_bytes(BLK_BITWIDTH_4, self.blk_len);
        let col_data = self.data_col(col);
        &col_data[blk * blk_bytes..(blk + 1) * blk_bytes]
    }

    #[inline(always)]
    pub fn scale(&self, col: usize, blk: usize) -> f32 {
        self.scales[col * self.block_stride() + blk]
    }

    /// Zero point of one block. Even block indices live in the low
    /// nibble, odd in the high nibble. Without a zero-point buffer the
    /// fixed default [`DEFAULT_ZERO_POINT`] (8, the 4-bit midpoint)
    /// applies.
    #[inline(always)]
    pub fn zero_point(&self, col: usize, blk: usize) -> u8 {
        match self.zero_points {
            Some(zp) => {
                let col_stride = zero_point_size_in_bytes(BLK_BITWIDTH_4, self.block_stride());
                let byte = zp[col * col_stride + blk / 2];
                if blk % 2 == 0 {
                    byte & 0x0F
                } else {
                    byte >> 4
                }
            }
            None => DEFAULT_ZERO_POINT,
        }
    }
}
