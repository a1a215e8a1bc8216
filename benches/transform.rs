//! Pixel-transform throughput benchmarks.
//!
//! Measures `compile` (one-off per transform) separately from `exec::run`
//! (the per-batch hot path), across representative pixel formats and both
//! the identity (no color work) and matrix+TRC code paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skicc::pixel::{AlphaFormat, Layout, PixelFormat};
use skicc::{builtins, compile::compile};

const PIXEL_COUNTS: [usize; 3] = [64, 4096, 65536];

fn random_bytes(n: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen()).collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let srgb = builtins::srgb();

    group.bench_function("identity_rgba8888", |b| {
        b.iter(|| {
            compile(
                Some(srgb),
                PixelFormat::new(Layout::Rgba8888),
                AlphaFormat::Unpremul,
                Some(srgb),
                PixelFormat::new(Layout::Rgba8888),
                AlphaFormat::Unpremul,
                black_box(1024),
            )
            .unwrap()
        })
    });

    group.bench_function("srgb_to_xyzd50_rgba8888", |b| {
        b.iter(|| {
            compile(
                Some(srgb),
                PixelFormat::new(Layout::Rgba8888),
                AlphaFormat::Unpremul,
                Some(builtins::xyzd50()),
                PixelFormat::new(Layout::Rgba8888),
                AlphaFormat::Unpremul,
                black_box(1024),
            )
            .unwrap()
        })
    });

    group.finish();
}

fn bench_run_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_identity_rgba8888");
    let srgb = builtins::srgb();

    for &n in &PIXEL_COUNTS {
        group.throughput(Throughput::Elements(n as u64));
        let program = compile(
            Some(srgb),
            PixelFormat::new(Layout::Rgba8888),
            AlphaFormat::Unpremul,
            Some(srgb),
            PixelFormat::new(Layout::Rgba8888),
            AlphaFormat::Unpremul,
            n,
        )
        .unwrap();
        let src = random_bytes(n * 4, 1);
        let mut dst = vec![0u8; n * 4];

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| skicc::exec::run(&program, black_box(&src), &mut dst, n).unwrap())
        });
    }
    group.finish();
}

fn bench_run_color_work(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_srgb_to_xyzd50_rgba8888");
    let srgb = builtins::srgb();
    let xyzd50 = builtins::xyzd50();

    for &n in &PIXEL_COUNTS {
        group.throughput(Throughput::Elements(n as u64));
        let program = compile(
            Some(srgb),
            PixelFormat::new(Layout::Rgba8888),
            AlphaFormat::Unpremul,
            Some(xyzd50),
            PixelFormat::new(Layout::Rgba8888),
            AlphaFormat::Unpremul,
            n,
        )
        .unwrap();
        let src = random_bytes(n * 4, 2);
        let mut dst = vec![0u8; n * 4];

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| skicc::exec::run(&program, black_box(&src), &mut dst, n).unwrap())
        });
    }
    group.finish();
}

fn bench_run_by_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_by_format_4096px");
    let srgb = builtins::srgb();
    let xyzd50 = builtins::xyzd50();
    let n = 4096;

    let formats: [(&str, Layout); 5] = [
        ("rgb888", Layout::Rgb888),
        ("rgba8888", Layout::Rgba8888),
        ("rgb565", Layout::Rgb565),
        ("rgb161616be", Layout::Rgb161616Be),
        ("rgba_half", Layout::RgbaHalf),
    ];

    for (name, layout) in formats {
        let fmt = PixelFormat::new(layout);
        let alpha = if fmt.has_alpha() { AlphaFormat::Unpremul } else { AlphaFormat::Opaque };
        let program = compile(Some(srgb), fmt, alpha, Some(xyzd50), fmt, alpha, n).unwrap();
        let bpp = fmt.bytes_per_pixel();
        let src = random_bytes(n * bpp, 3);
        let mut dst = vec![0u8; n * bpp];

        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(name, |b| {
            b.iter(|| skicc::exec::run(&program, black_box(&src), &mut dst, n).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_run_identity, bench_run_color_work, bench_run_by_format);
criterion_main!(benches);
