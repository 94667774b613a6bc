//! Benchmarks for Stowage protocol encoding and frame decoding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stowage::protocol::{encode_frame, Command, FrameDecoder};

fn frame_of(body_len: usize) -> Vec<u8> {
    let body = "A".repeat(body_len);
    encode_frame(format!("200\n{}", body).as_bytes()).unwrap()
}

fn decode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");

    for size in [64usize, 4 * 1024, 1024 * 1024] {
        let frame = frame_of(size);
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_with_input(BenchmarkId::new("whole", size), &frame, |b, frame| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                black_box(decoder.decode_chunk(frame).unwrap())
            })
        });

        // Typical socket read size
        group.bench_with_input(BenchmarkId::new("8k_chunks", size), &frame, |b, frame| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                let mut out = None;
                for chunk in frame.chunks(8 * 1024) {
                    out = decoder.decode_chunk(chunk).unwrap();
                }
                black_box(out)
            })
        });
    }

    group.finish();
}

fn encode_benchmarks(c: &mut Criterion) {
    let payload = vec![0xABu8; 64 * 1024];

    c.bench_function("encode_put_64k", |b| {
        b.iter(|| {
            let command = Command::put("1_1718000000000_blob.bin", black_box(&payload)).unwrap();
            black_box(command.encode())
        })
    });
}

criterion_group!(benches, decode_benchmarks, encode_benchmarks);
criterion_main!(benches);
