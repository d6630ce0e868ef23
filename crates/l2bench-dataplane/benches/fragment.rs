//! Fragmentation and Role Swap Benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use l2bench_dataplane::{fragment_sizes, swap_roles, FragmentMode, FramePool, MacAddr, SizeSweep};

fn bench_fragment_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_sizes");

    for size in SizeSweep::new(8, 1 << 20).step_by(4) {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| fragment_sizes(black_box(size), black_box(1500), FragmentMode::Reference))
        });
    }

    group.finish();
}

fn bench_swap_roles(c: &mut Criterion) {
    let pool = FramePool::new(1);
    let a = MacAddr::local(0);
    let b = MacAddr::local(1);

    let mut frame = pool.alloc().unwrap();
    frame.set_len(64).unwrap();
    frame.write_eth_header(a, b, 0x0800);

    // Two swaps per iteration bring the frame back to where it started.
    c.bench_function("swap_roles", |bench| {
        bench.iter(|| {
            swap_roles(black_box(&mut frame), a).unwrap();
            swap_roles(black_box(&mut frame), b).unwrap();
        })
    });
}

criterion_group!(benches, bench_fragment_sizes, bench_swap_roles);
criterion_main!(benches);
