use criterion::{criterion_group, criterion_main, Criterion};
use od_ppc::fp_utils::{
    add_double_precision, madd_double_precision, madd_single_precision, multiply_single_precision,
    round_to_single,
};
use od_ppc::Fpscr;
use std::hint::black_box;

fn operands() -> Vec<(u64, u64, u64)> {
    (1..=256u64)
        .map(|i| {
            let a = (i as f64 * 1.37).to_bits();
            let b = (-(i as f64) / 3.0).to_bits();
            let c = (1.0 + i as f64 / 7.0).to_bits();
            (a, b, c)
        })
        .collect()
}

fn bench_soft_float(c: &mut Criterion) {
    let data = operands();
    let fpscr = Fpscr::default();

    c.bench_function("fadd", |bench| {
        bench.iter(|| {
            for &(a, b, _) in &data {
                black_box(add_double_precision(black_box(a), black_box(b), fpscr));
            }
        })
    });

    c.bench_function("fmuls", |bench| {
        bench.iter(|| {
            for &(a, _, c) in &data {
                black_box(multiply_single_precision(black_box(a), black_box(c), fpscr));
            }
        })
    });

    c.bench_function("fmadd", |bench| {
        bench.iter(|| {
            for &(a, b, c) in &data {
                black_box(madd_double_precision(a, c, b, false, false, fpscr));
            }
        })
    });

    c.bench_function("fnmsubs", |bench| {
        bench.iter(|| {
            for &(a, b, c) in &data {
                black_box(madd_single_precision(a, c, b, true, true, fpscr));
            }
        })
    });

    c.bench_function("frsp", |bench| {
        bench.iter(|| {
            for &(a, _, _) in &data {
                black_box(round_to_single(black_box(a), fpscr));
            }
        })
    });
}

criterion_group!(benches, bench_soft_float);
criterion_main!(benches);
