//! 8-lane portable-SIMD kernel set.
//!
//! Same contracts as the scalar set, vectorized with `wide::f32x8` /
//! `wide::i32x8`. Lane width 8 matches one AVX2 register or two NEON
//! quads; the point of this set is that a different vector width slots
//! into the dispatch table without any caller change. Accumulation
//! order differs from the scalar set, so agreement is by tolerance.

use wide::{f32x8, i32x8};

use crate::block::{q8_blk_data, q8_blk_scale, q8_blk_set_scale, q8_blk_size, q8_row_size, SGEMM_PANEL_WIDTH};
use crate::dispatch::QNBitGemmDispatch;
use crate::pack::{pack_quant_b, packed_nibble, packed_quant_b_size, raw_nibble};
use crate::views::QuantBView;

const LANES: usize = 8;

/// Smaller row tile than the scalar set: wide accumulators hold more
/// live state per row.
const INT8_ROWS_PER_CALL: usize = 2;

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

#[inline(always)]
fn load_f32x8(src: &[f32]) -> f32x8 {
    let arr: [f32; 8] = src[..8].try_into().unwrap();
    f32x8::from(arr)
}

/// Dequantized codes `i..i + 8` of a raw (pairwise) block, zero point
/// already subtracted.
#[inline(always)]
fn dequant_lane_raw(data: &[u8], i: usize, zp: i32) -> f32x8 {
    let mut codes = [0.0f32; 8];
    for (j, c) in codes.iter_mut().enumerate() {
        *c = (raw_nibble(data, i + j) as i32 - zp) as f32;
    }
    f32x8::from(codes)
}

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
            let full = len / LANES * LANES;

            let mut vacc = f32x8::ZERO;
            let mut i = 0;
            while i < full {
                let avec = load_f32x8(&a[k0 + i..]);
                vacc = avec.mul_add(dequant_lane_raw(data, i, zp), vacc);
                i += LANES;
            }
            let mut blk_sum = vacc.reduce_add();
            for i in full..len {
                blk_sum += a[k0 + i] * ((raw_nibble(data, i) as i32 - zp) as f32);
            }
            acc += blk_sum * scale;
        }
        c[n] = acc + bias.map_or(0.0, |bv| bv[n]);
    }
}

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
                let vscale = f32x8::splat(scale);
                let zp = b.zero_point(col, blk) as i32;
                let data = b.data_blk(col, blk);
                let full = blk_len / LANES * LANES;
                let mut i = 0;
                while i < full {
                    let vals = (dequant_lane_raw(data, i, zp) * vscale).to_array();
                    for (lane, v) in vals.iter().enumerate() {
                        panel[(blk * blk_len + i + lane) * SGEMM_PANEL_WIDTH + j] = *v;
                    }
                    i += LANES;
                }
                for i in full..blk_len {
                    let code = raw_nibble(data, i) as i32;
                    panel[(blk * blk_len + i) * SGEMM_PANEL_WIDTH + j] = ((code - zp) as f32) * scale;
                }
            }
        }
    }
}

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

                let full = blk_len / LANES * LANES;
                let mut vsum = i32x8::splat(0);
                let mut i = 0;
                while i < full {
                    let mut qa = [0i32; 8];
                    let mut qb = [0i32; 8];
                    for j in 0..LANES {
                        qa[j] = codes_a[i + j] as i8 as i32;
                        qb[j] = packed_nibble(data, i + j, blk_len) as i32 - zp;
                    }
                    vsum = vsum + i32x8::from(qa) * i32x8::from(qb);
                    i += LANES;
                }
                let mut isum: i32 = vsum.to_array().iter().sum();
                for i in full..blk_len {
                    isum += codes_a[i] as i8 as i32 * (packed_nibble(data, i, blk_len) as i32 - zp);
                }
                acc += (isum as f32) * scale_a * scale_b;
            }
            c[m * ldc + n] = acc + bias.map_or(0.0, |bv| bv[n]);
        }
    }
    rows
}

pub fn quantize_a_row_comp_int8(blk_len: usize, a: &[f32], out: &mut [u8]) {
    let count_k = a.len();
    let stride = crate::block::div_round_up(count_k, blk_len);
    let blk_size = q8_blk_size(blk_len);
    for blk in 0..stride {
        let k0 = blk * blk_len;
        let len = blk_len.min(count_k - k0);
        let values = &a[k0..k0 + len];

        let full = len / LANES * LANES;
        let mut vmax = f32x8::ZERO;
        let mut i = 0;
        while i < full {
            vmax = vmax.max(load_f32x8(&values[i..]).abs());
            i += LANES;
        }
        let mut amax = vmax.to_array().iter().fold(0.0f32, |m, v| m.max(*v));
        for v in &values[full..] {
            amax = amax.max(v.abs());
        }

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
