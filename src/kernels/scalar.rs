//! Scalar reference kernel set.
//!
//! Straight-line implementations of every dispatch slot. No vector
//! tricks; these define the semantics the SIMD sets are tested against.
//! The fp32 kernels consume the raw (pairwise) B layout, the int8
//! kernel consumes the packed (half-split) layout — see `pack.rs`.

use crate::block::{q8_blk_data, q8_blk_scale, q8_blk_set_scale, q8_blk_size, q8_row_size, SGEMM_PANEL_WIDTH};
use crate::dispatch::QNBitGemmDispatch;
use crate::pack::{pack_quant_b, packed_nibble, packed_quant_b_size, raw_nibble};
use crate::views::QuantBView;

/// Rows the int8 kernel covers per call before returning to the
/// caller's tiling loop.
const INT8_ROWS_PER_CALL: usize = 4;

pub static DISPATCH: QNBitGemmDispatch = QNBitGemmDispatch {
    pack_quant_b_size: Some(packed_quant_b_size),
    pack_quant_b: Some(pack_quant_b),
    workspace_size: Some(super::workspace_size),
    workspace_alignment: Some(super::workspace_alignment),
    gemm_m1_comp_fp32: Some(gemm_m1_comp_fp32),
    dequant_b_for_sgemm: Some(dequant_b_for_sgemm),
    gemm_comp_int8: Some(gemm_comp_int8),
    quantize_a_row_comp_int8: Some(quantize_a_row_comp_int8),
};

/// C[n] = sum_k A[k] * (code - zp) * scale + bias[n], one output row.
pub fn gemm_m1_comp_fp32(b: &QuantBView<'_>, a: &[f32], c: &mut [f32], bias: Option<&[f32]>) {
    let blk_len = b.blk_len();
    let stride = b.block_stride();
    let count_k = b.k();
    for n in 0..b.n() {
        let mut acc = 0.0f32;
        for blk in 0..stride {
            let scale = b.scale(n, blk);
            let zp = b.zero_point(n, blk) as i32;
            let data = b.data_blk(n, blk);
            let k0 = blk * blk_len;
            let len = blk_len.min(count_k - k0);
            for i in 0..len {
                let code = raw_nibble(data, i) as i32;
                acc += a[k0 + i] * ((code - zp) as f32) * scale;
            }
        }
        c[n] = acc + bias.map_or(0.0, |bv| bv[n]);
    }
}

/// Dequantizes B into 16-column SGEMM panels: panel p holds rows
/// 0..k_padded as 16 consecutive floats each, columns beyond `n`
/// zero-filled. Whole blocks are emitted, which is why the output is
/// sized for `ceil(k / blk_len) * blk_len` rows; rows past `k` are the
/// padding the caller never reads.
pub fn dequant_b_for_sgemm(b: &QuantBView<'_>, out: &mut [f32]) {
    let blk_len = b.blk_len();
    let stride = b.block_stride();
    let k_padded = stride * blk_len;
    let panels = crate::block::div_round_up(b.n(), SGEMM_PANEL_WIDTH);
    for p in 0..panels {
        let panel = &mut out[p * SGEMM_PANEL_WIDTH * k_padded..(p + 1) * SGEMM_PANEL_WIDTH * k_padded];
        for j in 0..SGEMM_PANEL_WIDTH {
            let col = p * SGEMM_PANEL_WIDTH + j;
            if col >= b.n() {
                for kk in 0..k_padded {
                    panel[kk * SGEMM_PANEL_WIDTH + j] = 0.0;
                }
                continue;
            }
            for blk in 0..stride {
                let scale = b.scale(col, blk);
                let zp = b.zero_point(col, blk) as i32;
                let data = b.data_blk(col, blk);
                for i in 0..blk_len {
                    let code = raw_nibble(data, i) as i32;
                    panel[(blk * blk_len + i) * SGEMM_PANEL_WIDTH + j] = ((code - zp) as f32) * scale;
                }
            }
        }
    }
}

/// Per-block integer dot products between quantized A rows and packed
/// quantized B, each block's partial sum rescaled by
/// `scale_a * scale_b` before the f32 accumulation across blocks.
/// Covers at most [`INT8_ROWS_PER_CALL`] rows and reports how many.
pub fn gemm_comp_int8(
    b: &QuantBView<'_>,
    quant_a: &[u8],
    c: &mut [f32],
    count_m: usize,
    ldc: usize,
    bias: Option<&[f32]>,
) -> usize {
    let blk_len = b.blk_len();
    let stride = b.block_stride();
    let row_bytes = q8_row_size(blk_len, b.k());
    let rows = count_m.min(INT8_ROWS_PER_CALL);
    for m in 0..rows {
        let qa_row = &quant_a[m * row_bytes..(m + 1) * row_bytes];
        for n in 0..b.n() {
            let mut acc = 0.0f32;
            for blk in 0..stride {
                let qa_blk = &qa_row[blk * q8_blk_size(blk_len)..(blk + 1) * q8_blk_size(blk_len)];
                let scale_a = q8_blk_scale(qa_blk);
                let codes_a = q8_blk_data(qa_blk, blk_len);
                let scale_b = b.scale(n, blk);
                let zp = b.zero_point(n, blk) as i32;
                let data = b.data_blk(n, blk);
                let mut isum = 0i32;
                // A's tail codes are zero-padded, so a full-block dot
                // never mixes stale B codes into the result.
                for i in 0..blk_len {
                    let qa = codes_a[i] as i8 as i32;
                    let qb = packed_nibble(data, i, blk_len) as i32 - zp;
                    isum += qa * qb;
                }
                acc += (isum as f32) * scale_a * scale_b;
            }
            c[m * ldc + n] = acc + bias.map_or(0.0, |bv| bv[n]);
        }
    }
    rows
}

/// One f32 activation row into `ceil(len / blk_len)` self-describing
/// int8 blocks: symmetric per-block scale `amax / 127`, codes rounded
/// to nearest, tail zero-padded past the row's end.
pub fn quantize_a_row_comp_int8(blk_len: usize, a: &[f32], out: &mut [u8]) {
    let count_k = a.len();
    let stride = crate::block::div_round_up(count_k, blk_len);
    let blk_size = q8_blk_size(blk_len);
    for blk in 0..stride {
        let k0 = blk * blk_len;
        let len = blk_len.min(count_k - k0);
        let values = &a[k0..k0 + len];
        let amax = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let scale = amax / 127.0;
        let inv = if scale != 0.0 { 1.0 / scale } else { 0.0 };
        let blk_out = &mut out[blk * blk_size..(blk + 1) * blk_size];
        q8_blk_set_scale(blk_out, scale);
        let codes = &mut blk_out[4..];
        for i in 0..len {
            codes[i] = (values[i] * inv).round().clamp(-127.0, 127.0) as i8 as u8;
        }
        for code in codes.iter_mut().take(blk_len).skip(len) {
            *code = 0;
        }
    }
}
