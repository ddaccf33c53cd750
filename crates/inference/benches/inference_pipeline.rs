use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use inference::image_utils::{autocontrast, smart_resize};
use inference::processing::post::{PostProcessor, TransformParams};
use ndarray::{Array, IxDyn};

const ANCHORS: usize = 8400;

/// YOLOv8 head `[1, 5, 8400]` with `num_detections` confident, spread-out boxes
fn create_mock_yolo_output(num_detections: usize) -> Array<f32, IxDyn> {
    let mut out = Array::zeros(IxDyn(&[1, 5, ANCHORS]));
    for i in 0..ANCHORS {
        out[[0, 4, i]] = 0.01;
    }
    for i in 0..num_detections.min(ANCHORS) {
        out[[0, 0, i]] = 40.0 + (i % 10) as f32 * 60.0;
        out[[0, 1, i]] = 40.0 + (i / 10 % 10) as f32 * 60.0;
        out[[0, 2, i]] = 50.0;
        out[[0, 3, i]] = 20.0;
        out[[0, 4, i]] = 0.6 + (i % 4) as f32 * 0.1;
    }
    out
}

fn benchmark_postprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocess");
    let post = PostProcessor::new(0.5, 0.45, 20).with_classes(vec![0]);
    let transform = TransformParams {
        orig_width: 1920,
        orig_height: 1080,
        scale: 1.0 / 3.0,
        offset_x: 0.0,
        offset_y: 140.0,
    };

    for num_detections in [0, 10, 100, 500] {
        let output = create_mock_yolo_output(num_detections);
        group.bench_with_input(
            BenchmarkId::new("yolo_decode_nms", num_detections),
            &output,
            |b, output| {
                b.iter(|| {
                    post.parse_detections(black_box(&output.view()), black_box(&transform))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_enhance(c: &mut Criterion) {
    let mut group = c.benchmark_group("image_enhance");
    group.sample_size(20);

    let photo = RgbImage::from_fn(1280, 960, |x, y| Rgb([(x % 200) as u8 + 20, (y % 180) as u8 + 30, 90]));
    group.bench_function("autocontrast_1280x960", |b| {
        b.iter(|| {
            let mut image = photo.clone();
            autocontrast(black_box(&mut image), 0.01);
            image
        });
    });

    let large = RgbImage::new(6000, 4000);
    group.bench_function("smart_resize_6000x4000", |b| {
        b.iter(|| smart_resize(black_box(large.clone()), 4096));
    });

    group.finish();
}

criterion_group!(benches, benchmark_postprocess, benchmark_enhance);
criterion_main!(benches);
