use criterion::{Criterion, criterion_group, criterion_main};
use inpaintd::Mask;

fn square_mask(size: u32, half: u32) -> Mask {
    let mut mask = Mask::blank(size, size);
    let centre = size / 2;
    for y in (centre - half)..(centre + half) {
        for x in (centre - half)..(centre + half) {
            mask.set(x, y, true);
        }
    }
    mask
}

fn bench_dilation(c: &mut Criterion) {
    let mask = square_mask(256, 32);
    let mut group = c.benchmark_group("mask_dilation");
    for &radius in &[0u32, 2, 4, 8] {
        group.bench_function(format!("radius_{radius}"), |b| {
            b.iter(|| mask.dilated(radius))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dilation);
criterion_main!(benches);
