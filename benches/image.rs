use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, RgbImage};
use visionrag::normalize::{self, MAX_PIXELS};

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn benchmark_normalize(c: &mut Criterion) {
    let small = encode(800, 600, ImageFormat::Png);
    let large = encode(3000, 2000, ImageFormat::Jpeg);

    let mut group = c.benchmark_group("图像规范化");
    group.sample_size(10);
    group.throughput(Throughput::Elements(1));
    group.bench_function("PNG 800x600", |b| b.iter(|| normalize::normalize(black_box(&small))));
    group.bench_function("JPEG 3000x2000", |b| b.iter(|| normalize::normalize(black_box(&large))));
    group.finish();
}

fn benchmark_budget(c: &mut Criterion) {
    c.bench_function("像素预算计算", |b| {
        b.iter(|| normalize::fit_pixel_budget(black_box(4032), black_box(3024), MAX_PIXELS))
    });
}

criterion_group!(benches, benchmark_normalize, benchmark_budget);
criterion_main!(benches);
