//! Compositing benchmarks for gridstitch-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridstitch_core::compose::render;
use gridstitch_core::GridLayout;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;

fn sample_images(count: usize, width: u32, height: u32) -> (Vec<DynamicImage>, Vec<PathBuf>) {
    let images = (0..count)
        .map(|i| {
            let shade = (i * 40) as u8;
            DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([shade, shade, shade])))
        })
        .collect();
    let sources = (0..count).map(|i| PathBuf::from(format!("{i}.png"))).collect();
    (images, sources)
}

fn bench_render(c: &mut Criterion) {
    for count in [2usize, 4, 6] {
        let (images, sources) = sample_images(count, 640, 480);
        let layout = GridLayout::for_count(count).unwrap();

        c.bench_function(&format!("render_{count}_640x480"), |b| {
            b.iter(|| black_box(render(&images, layout, &sources).unwrap()));
        });
    }
}

fn bench_layout(c: &mut Criterion) {
    c.bench_function("cell_offsets_5", |b| {
        let layout = GridLayout::for_count(5).unwrap();
        b.iter(|| black_box(layout.cell_offsets(black_box(4032), black_box(3024))));
    });
}

criterion_group!(benches, bench_render, bench_layout);
criterion_main!(benches);
