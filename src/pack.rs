//! Raw-to-packed transform for quantized-B code data.
//!
//! Raw producer layout stores a block of `L` 4-bit codes pairwise: byte
//! `j` holds code `2j` in the low nibble and code `2j + 1` in the high
//! nibble. The int8 compute path instead wants the block split in half
//! runs, so a kernel can mask `0x0F` for codes `0..L/2` and shift `>> 4`
//! for codes `L/2..L`, each run contiguous:
//!
//!   packed[i] = code(i) | code(i + L/2) << 4      for i in 0..L/2
//!
//! The fp32 path consumes the raw layout directly, so its packed size
//! is 0 ("no packing required"). Scales and zero points are untouched
//! by packing; only the code blob is re-laid out, column by column.
//!
//! Columns are independent, which is what makes the optional
//! thread-pool fan-out trivially deterministic: every column writes a
//! disjoint destination range and the output is byte-identical with or
//! without the pool.

use rayon::prelude::*;

use crate::block::{blk_data_size_in_bytes, div_round_up, ComputeStrategy, BLK_BITWIDTH_4};

/// Size in bytes of the packed, kernel-ready code blob for an `n` x `k`
/// matrix under `strategy`. Returns 0 when the raw layout is usable
/// directly. Non-decreasing in `n` and `k` for fixed `blk_len`.
pub fn packed_quant_b_size(n: usize, k: usize, blk_len: usize, strategy: ComputeStrategy) -> usize {
    match strategy {
        ComputeStrategy::CompFp32 => 0,
        ComputeStrategy::CompInt8 => {
            n * div_round_up(k, blk_len) * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len)
        }
    }
}

/// Re-lays out `raw` quantized-B code data into `packed_out`, sized per
/// [`packed_quant_b_size`]. May fan columns across `pool`; passing
/// `None` runs synchronously on the calling thread. Output is
/// byte-identical either way.
///
/// Call exactly once per destination buffer; re-packing into an
/// already-packed buffer is a contract violation, not detected here.
pub fn pack_quant_b(
    n: usize,
    k: usize,
    blk_len: usize,
    strategy: ComputeStrategy,
    raw: &[u8],
    packed_out: &mut [u8],
    pool: Option<&rayon::ThreadPool>,
) {
    if strategy == ComputeStrategy::CompFp32 {
        // Raw layout is the kernel layout; nothing to emit.
        return;
    }
    let stride = div_round_up(k, blk_len);
    let col_bytes = stride * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len);
    debug_assert_eq!(raw.len(), n * col_bytes);
    debug_assert_eq!(packed_out.len(), n * col_bytes);

    match pool {
        Some(pool) => pool.install(|| {
            packed_out
                .par_chunks_mut(col_bytes)
                .zip(raw.par_chunks(col_bytes))
                .for_each(|(dst, src_col)| pack_column(src_col, dst, blk_len));
        }),
        None => {
            for (dst, src_col) in packed_out.chunks_mut(col_bytes).zip(raw.chunks(col_bytes)) {
                pack_column(src_col, dst, blk_len);
            }
        }
    }
}

/// Packs every block of one column from pairwise to half-split layout.
fn pack_column(raw_col: &[u8], packed_col: &mut [u8], blk_len: usize) {
    let blk_bytes = blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len);
    let half = blk_len / 2;
    for (raw_blk, packed_blk) in raw_col.chunks(blk_bytes).zip(packed_col.chunks_mut(blk_bytes)) {
        for i in 0..half {
            let lo = raw_nibble(raw_blk, i);
            let hi = raw_nibble(raw_blk, i + half);
            packed_blk[i] = lo | (hi << 4);
        }
    }
}

/// Code `idx` of a raw (pairwise) block: even indices in low nibbles.
#[inline(always)]
pub(crate) fn raw_nibble(raw_blk: &[u8], idx: usize) -> u8 {
    let byte = raw_blk[idx / 2];
    if idx % 2 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

/// Code `idx` of a packed (half-split) block.
#[inline(always)]
pub(crate) fn packed_nibble(packed_blk: &[u8], idx: usize, blk_len: usize) -> u8 {
    let half = blk_len / 2;
    if idx < half {
        packed_blk[idx] & 0x0F
    } else {
        packed_blk[idx - half] >> 4
    }
}
