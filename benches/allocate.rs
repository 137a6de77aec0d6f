use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use d3d12_descriptor_pool::{DescriptorHeap, ShaderVisibleResourceHeap, SoftwareDevice};

fn bench_allocate(c: &mut Criterion) {
    let heap =
        DescriptorHeap::<ShaderVisibleResourceHeap>::new(&SoftwareDevice::new(), 4096).unwrap();

    let mut group = c.benchmark_group("Descriptor heap");

    group.bench_function("allocate + release", |b| {
        b.iter(|| {
            let descriptor = heap.allocate_descriptor().unwrap();
            black_box(descriptor.cpu_handle());
        });
    });

    group.bench_function("fill 4096 slots", |b| {
        b.iter(|| {
            let held: Vec<_> = (0..4096)
                .map(|_| heap.allocate_descriptor().unwrap())
                .collect();
            black_box(held.len());
        });
    });

    group.bench_function("clone + drop", |b| {
        let descriptor = heap.allocate_descriptor().unwrap();
        b.iter(|| black_box(descriptor.clone()));
    });

    group.finish();
}

criterion_group!(benches, bench_allocate);
criterion_main!(benches);
