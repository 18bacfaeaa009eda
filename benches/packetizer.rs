use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use robot_mjpeg_streamer::protocol::{Packetizer, DEFAULT_MAGIC};

fn create_test_frame(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn benchmark_packetize(c: &mut Criterion) {
    let mut group = c.benchmark_group("packetize");

    // Typical JPEG sizes for a 640x480 stream at quality 80
    for size in [5_000, 20_000, 50_000, 100_000].iter() {
        let frame = create_test_frame(*size);
        let packetizer = Packetizer::new(DEFAULT_MAGIC, 1300);

        group.bench_with_input(BenchmarkId::new("frame_size", size), &frame, |b, frame| {
            b.iter(|| packetizer.packetize(black_box(frame)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_packetize);
criterion_main!(benches);
