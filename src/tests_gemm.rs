#[cfg(test)]
mod tests_gemm {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::block::{
        blk_data_size_in_bytes, div_round_up, q8_blk_data, q8_blk_scale, q8_blk_size, q8_row_size,
        ComputeStrategy, BLK_BITWIDTH_4, SGEMM_PANEL_WIDTH,
    };
    use crate::dispatch::{dispatch, Op, QNBitGemmDispatch};
    use crate::kernels::{scalar, wide};
    use crate::pack::{pack_quant_b, packed_quant_b_size, raw_nibble};
    use crate::views::QuantBView;
    use crate::workspace::Workspace;

    /// Random quantized-B triple in the raw (pairwise) layout.
    fn make_quant_b(
        rng: &mut StdRng,
        n: usize,
        k: usize,
        blk_len: usize,
        with_zp: bool,
    ) -> (Vec<u8>, Vec<f32>, Option<Vec<u8>>) {
        let stride = div_round_up(k, blk_len);
        let data: Vec<u8> = (0..n * stride * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len))
            .map(|_| rng.gen::<u8>())
            .collect();
        let scales: Vec<f32> = (0..n * stride).map(|_| rng.gen_range(0.01..0.2f32)).collect();
        let zps = with_zp.then(|| {
            (0..n * div_round_up(stride, 2)).map(|_| rng.gen::<u8>() & 0x77).collect::<Vec<u8>>()
        });
        (data, scales, zps)
    }

    /// One dequantized weight element, straight from the raw layout.
    fn dequant_elem(b: &QuantBView<'_>, col: usize, kk: usize) -> f32 {
        let blk = kk / b.blk_len();
        let code = raw_nibble(b.data_blk(col, blk), kk % b.blk_len()) as i32;
        (code - b.zero_point(col, blk) as i32) as f32 * b.scale(col, blk)
    }

    /// Reference row GEMV over dequantized weights, f64 accumulation.
    fn ref_gemv(b: &QuantBView<'_>, a: &[f32], bias: Option<&[f32]>) -> Vec<f32> {
        (0..b.n())
            .map(|col| {
                let mut acc = 0.0f64;
                for kk in 0..b.k() {
                    acc += a[kk] as f64 * dequant_elem(b, col, kk) as f64;
                }
                acc as f32 + bias.map_or(0.0, |bv| bv[col])
            })
            .collect()
    }

    fn assert_close(got: &[f32], want: &[f32], tol: f32, label: &str) {
        for (i, (g, w)) in got.iter().zip(want).enumerate() {
            let err = (g - w).abs() / w.abs().max(1.0);
            assert!(err < tol, "{label}: element {i}: got {g}, want {w} (rel err {err})");
        }
    }

    #[test]
    fn fp32_m1_matches_reference_with_and_without_zero_points() {
        let mut rng = StdRng::seed_from_u64(11);
        for &with_zp in &[false, true] {
            let (n, k, blk_len) = (9, 83, 32);
            let (data, scales, zps) = make_quant_b(&mut rng, n, k, blk_len, with_zp);
            let b = QuantBView::new(&data, &scales, zps.as_deref(), n, k, blk_len);
            let a: Vec<f32> = (0..k).map(|_| rng.gen_range(-1.0..1.0f32)).collect();
            let bias: Vec<f32> = (0..n).map(|_| rng.gen_range(-0.5..0.5f32)).collect();
            let want = ref_gemv(&b, &a, Some(&bias));

            let mut c = vec![0.0f32; n];
            scalar::gemm_m1_comp_fp32(&b, &a, &mut c, Some(&bias));
            assert_close(&c, &want, 1e-4, &format!("scalar m1, zp={with_zp}"));

            let mut c_wide = vec![0.0f32; n];
            wide::gemm_m1_comp_fp32(&b, &a, &mut c_wide, Some(&bias));
            assert_close(&c_wide, &want, 1e-4, &format!("wide m1, zp={with_zp}"));
        }
    }

    #[test]
    fn dequant_panel_layout_and_padding() {
        let mut rng = StdRng::seed_from_u64(12);
        let (n, k, blk_len) = (19, 40, 16); // ragged in both N and K
        let (data, scales, zps) = make_quant_b(&mut rng, n, k, blk_len, true);
        let b = QuantBView::new(&data, &scales, zps.as_deref(), n, k, blk_len);

        let k_padded = div_round_up(k, blk_len) * blk_len;
        let n_padded = div_round_up(n, SGEMM_PANEL_WIDTH) * SGEMM_PANEL_WIDTH;
        let mut out = vec![f32::NAN; n_padded * k_padded];
        scalar::dequant_b_for_sgemm(&b, &mut out);

        for col in 0..n_padded {
            let panel = col / SGEMM_PANEL_WIDTH;
            let lane = col % SGEMM_PANEL_WIDTH;
            for kk in 0..k_padded {
                let got = out[panel * SGEMM_PANEL_WIDTH * k_padded + kk * SGEMM_PANEL_WIDTH + lane];
                if col >= n {
                    assert_eq!(got, 0.0, "pad col {col} row {kk} not zeroed");
                } else {
                    // rows past K come from stored tail codes of the last block
                    let blk = kk / blk_len;
                    let code = raw_nibble(b.data_blk(col, blk), kk % blk_len) as i32;
                    let want = (code - b.zero_point(col, blk) as i32) as f32 * b.scale(col, blk);
                    assert_eq!(got, want, "col {col} row {kk} mismatch");
                }
            }
        }

        let mut out_wide = vec![f32::NAN; n_padded * k_padded];
        wide::dequant_b_for_sgemm(&b, &mut out_wide);
        assert_eq!(out, out_wide, "wide dequant differs from scalar");
    }

    /// Drives the full int8 pipeline the way a caller would: quantize A
    /// rows into the workspace, pack B, then loop on the kernel's
    /// returned row counts.
    fn run_int8(
        table: &QNBitGemmDispatch,
        b: &QuantBView<'_>,
        a: &[f32],
        m: usize,
        bias: Option<&[f32]>,
    ) -> Vec<f32> {
        let (n, k, blk_len) = (b.n(), b.k(), b.blk_len());
        let quantize = table.quantize_a_row_comp_int8.unwrap();
        let gemm = table.gemm_comp_int8.unwrap();
        let pack = table.pack_quant_b.unwrap();
        let pack_size = table.pack_quant_b_size.unwrap();

        let mut packed = vec![0u8; pack_size(n, k, blk_len, ComputeStrategy::CompInt8)];
        pack(n, k, blk_len, ComputeStrategy::CompInt8, b.data(), &mut packed, None);
        let packed_b = QuantBView::new(&packed, b.scales(), b.zero_points(), n, k, blk_len);

        let mut ws = Workspace::allocate(table, m, n, k, blk_len, ComputeStrategy::CompInt8).unwrap();
        let row_bytes = q8_row_size(blk_len, k);
        for row in 0..m {
            quantize(blk_len, &a[row * k..(row + 1) * k], &mut ws.as_mut_slice()[row * row_bytes..(row + 1) * row_bytes]);
        }

        let mut c = vec![0.0f32; m * n];
        let qa = ws.as_slice();
        let mut done = 0;
        while done < m {
            let took = gemm(&packed_b, &qa[done * row_bytes..], &mut c[done * n..], m - done, n, bias);
            assert!(took > 0 && took <= m - done, "kernel reported {took} rows at offset {done}");
            done += took;
        }
        c
    }

    /// Reference for the int8 path: same blockwise integer dot and
    /// per-block scaling the kernels use, from the quantized A codes.
    fn ref_int8(b: &QuantBView<'_>, qa_row: &[u8], bias: Option<&[f32]>) -> Vec<f32> {
        let blk_len = b.blk_len();
        (0..b.n())
            .map(|col| {
                let mut acc = 0.0f32;
                for blk in 0..b.block_stride() {
                    let q8 = &qa_row[blk * q8_blk_size(blk_len)..(blk + 1) * q8_blk_size(blk_len)];
                    let codes = q8_blk_data(q8, blk_len);
                    let zp = b.zero_point(col, blk) as i32;
                    let data = b.data_blk(col, blk);
                    let mut isum = 0i32;
                    for i in 0..blk_len {
                        isum += codes[i] as i8 as i32 * (raw_nibble(data, i) as i32 - zp);
                    }
                    acc += isum as f32 * q8_blk_scale(q8) * b.scale(col, blk);
                }
                acc + bias.map_or(0.0, |bv| bv[col])
            })
            .collect()
    }

    #[test]
    fn int8_pipeline_matches_reference_and_float_path() {
        let mut rng = StdRng::seed_from_u64(13);
        let (m, n, k, blk_len) = (5, 7, 96, 32);
        let (data, scales, zps) = make_quant_b(&mut rng, n, k, blk_len, true);
        let b = QuantBView::new(&data, &scales, zps.as_deref(), n, k, blk_len);
        let a: Vec<f32> = (0..m * k).map(|_| rng.gen_range(-1.0..1.0f32)).collect();
        let bias: Vec<f32> = (0..n).map(|_| rng.gen_range(-0.5..0.5f32)).collect();

        let c_scalar = run_int8(&scalar::DISPATCH, &b, &a, m, Some(&bias));
        let c_wide = run_int8(&wide::DISPATCH, &b, &a, m, Some(&bias));

        // Both sets share the pack layout and quantizer; the integer
        // dot is exact, so the two tiles agree bitwise.
        assert_eq!(c_scalar, c_wide, "wide int8 differs from scalar");

        // Against the blockwise reference computed from the same codes.
        let row_bytes = q8_row_size(blk_len, k);
        let mut qa = vec![0u8; m * row_bytes];
        for row in 0..m {
            scalar::quantize_a_row_comp_int8(
                blk_len,
                &a[row * k..(row + 1) * k],
                &mut qa[row * row_bytes..(row + 1) * row_bytes],
            );
        }
        for row in 0..m {
            let want = ref_int8(&b, &qa[row * row_bytes..(row + 1) * row_bytes], Some(&bias));
            assert_close(&c_scalar[row * n..(row + 1) * n], &want, 1e-4, "int8 row vs reference");
        }

        // And loosely against the float path: the only gap is A's
        // 7-bit quantization error.
        for row in 0..m {
            let want = ref_gemv(&b, &a[row * k..(row + 1) * k], Some(&bias));
            assert_close(&c_scalar[row * n..(row + 1) * n], &want, 5e-2, "int8 row vs fp32");
        }
    }

    #[test]
    fn int8_ragged_k_ignores_padding_codes() {
        let mut rng = StdRng::seed_from_u64(14);
        let (m, n, k, blk_len) = (3, 4, 50, 16); // last block 2 valid rows
        let (data, scales, _) = make_quant_b(&mut rng, n, k, blk_len, false);
        let b = QuantBView::new(&data, &scales, None, n, k, blk_len);
        let a: Vec<f32> = (0..m * k).map(|_| rng.gen_range(-1.0..1.0f32)).collect();

        // The quantizer zero-fills A's tail codes, so B's stored tail
        // codes never reach the accumulator regardless of value.
        let c = run_int8(&scalar::DISPATCH, &b, &a, m, None);
        for row in 0..m {
            let want = ref_gemv(&b, &a[row * k..(row + 1) * k], None);
            assert_close(&c[row * n..(row + 1) * n], &want, 5e-2, "ragged int8 row");
        }
    }

    /// Minimal asymmetric 4-bit quantizer, fixture only: per block,
    /// scale = (max - min) / 15 and a nibble zero point, emitted in the
    /// raw pairwise layout.
    fn quantize_b_fixture(
        values: &[f32],
        n: usize,
        k: usize,
        blk_len: usize,
    ) -> (Vec<u8>, Vec<f32>, Vec<u8>) {
        let stride = div_round_up(k, blk_len);
        let mut data = vec![0u8; n * stride * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len)];
        let mut scales = vec![0.0f32; n * stride];
        let mut zps = vec![0u8; n * div_round_up(stride, 2)];
        let blk_bytes = blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len);
        for col in 0..n {
            for blk in 0..stride {
                let k0 = blk * blk_len;
                let len = blk_len.min(k - k0);
                let vals = &values[col * k + k0..col * k + k0 + len];
                let min = vals.iter().fold(f32::INFINITY, |m, v| m.min(*v));
                let max = vals.iter().fold(f32::NEG_INFINITY, |m, v| m.max(*v));
                let scale = (max - min) / 15.0;
                let inv = if scale != 0.0 { 1.0 / scale } else { 0.0 };
                let zp = (-min * inv).round().clamp(0.0, 15.0) as u8;
                scales[col * stride + blk] = scale;
                zps[col * div_round_up(stride, 2) + blk / 2] |=
                    if blk % 2 == 0 { zp } else { zp << 4 };
                let blk_data =
                    &mut data[(col * stride + blk) * blk_bytes..(col * stride + blk + 1) * blk_bytes];
                for (i, v) in vals.iter().enumerate() {
                    let code = ((v * inv).round() + zp as f32).clamp(0.0, 15.0) as u8;
                    blk_data[i / 2] |= if i % 2 == 0 { code } else { code << 4 };
                }
            }
        }
        (data, scales, zps)
    }

    #[test]
    fn b_quantize_pack_dequantize_round_trip() {
        let mut rng = StdRng::seed_from_u64(16);
        let (n, k, blk_len) = (6, 64, 32);
        let values: Vec<f32> = (0..n * k).map(|_| rng.gen_range(-2.0..2.0f32)).collect();
        let (data, scales, zps) = quantize_b_fixture(&values, n, k, blk_len);
        let b = QuantBView::new(&data, &scales, Some(&zps), n, k, blk_len);

        // Raw-layout dequantization recovers every element to half a step.
        for col in 0..n {
            for kk in 0..k {
                let got = dequant_elem(&b, col, kk);
                let step = b.scale(col, kk / blk_len);
                assert!(
                    (got - values[col * k + kk]).abs() <= step * 0.5 + 1e-6,
                    "col {col} row {kk}: {got} vs {}",
                    values[col * k + kk]
                );
            }
        }

        // Packing preserves every code, observed through the packed view.
        let mut packed = vec![0u8; packed_quant_b_size(n, k, blk_len, ComputeStrategy::CompInt8)];
        pack_quant_b(n, k, blk_len, ComputeStrategy::CompInt8, &data, &mut packed, None);
        let pb = QuantBView::new(&packed, &scales, Some(&zps), n, k, blk_len);
        for col in 0..n {
            for kk in 0..k {
                let blk = kk / blk_len;
                assert_eq!(
                    crate::pack::packed_nibble(pb.data_blk(col, blk), kk % blk_len, blk_len),
                    raw_nibble(b.data_blk(col, blk), kk % blk_len),
                    "code {col},{kk} lost in packing"
                );
            }
        }
    }

    #[test]
    fn size_queries_are_pure_and_consistent() {
        let (n, k, blk_len) = (20, 130, 32);
        let stride = div_round_up(k, blk_len);
        assert_eq!(packed_quant_b_size(n, k, blk_len, ComputeStrategy::CompFp32), 0);
        assert_eq!(
            packed_quant_b_size(n, k, blk_len, ComputeStrategy::CompInt8),
            n * stride * blk_data_size_in_bytes(BLK_BITWIDTH_4, blk_len)
        );

        let table = &scalar::DISPATCH;
        let ws_size = table.workspace_size.unwrap();
        assert_eq!(ws_size(4, n, k, blk_len, ComputeStrategy::CompFp32), 0);
        let one = ws_size(1, n, k, blk_len, ComputeStrategy::CompInt8);
        assert_eq!(one, q8_row_size(blk_len, k));
        assert_eq!(ws_size(6, n, k, blk_len, ComputeStrategy::CompInt8), 6 * one);

        let ws_align = table.workspace_alignment.unwrap();
        assert_eq!(ws_align(blk_len, ComputeStrategy::CompFp32), 1);
        let a = ws_align(blk_len, ComputeStrategy::CompInt8);
        assert!(a.is_power_of_two() && a >= 64);
    }

    #[test]
    fn selected_table_covers_both_strategies() {
        let table = dispatch();
        assert!(table.is_available(ComputeStrategy::CompFp32));
        assert!(table.is_available(ComputeStrategy::CompInt8));
        // Same selection on every call.
        assert!(std::ptr::eq(table, dispatch()));
    }

    #[test]
    fn partial_table_gates_strategies_independently() {
        let mut table = scalar::DISPATCH;
        table.gemm_comp_int8 = None;
        table.quantize_a_row_comp_int8 = None;
        assert!(table.is_available(ComputeStrategy::CompFp32));
        assert!(!table.is_available(ComputeStrategy::CompInt8));
        assert!(table.require(Op::GemmCompInt8).is_err());
        assert!(table.require(Op::GemmM1CompFp32).is_ok());
    }

    #[test]
    fn packing_matches_across_thread_pools() {
        let mut rng = StdRng::seed_from_u64(15);
        let (n, k, blk_len) = (33, 128, 32);
        let (data, _, _) = make_quant_b(&mut rng, n, k, blk_len, false);
        let size = packed_quant_b_size(n, k, blk_len, ComputeStrategy::CompInt8);

        let mut serial = vec![0u8; size];
        pack_quant_b(n, k, blk_len, ComputeStrategy::CompInt8, &data, &mut serial, None);
        for threads in [1, 3] {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            let mut parallel = vec![0u8; size];
            pack_quant_b(n, k, blk_len, ComputeStrategy::CompInt8, &data, &mut parallel, Some(&pool));
            assert_eq!(serial, parallel, "{threads}-thread pack differs from serial");
        }
    }
}
