//! Codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wiroc_core::{codec, ChunkBuffer, DeviceId, FIRMWARE_BULK_SCHEMA};

fn snapshot() -> String {
    let values = [
        "WiRoc-Start", "sender", "ul", "1", "1", "14", "0", "0", "send", "1", "1", "0",
        "192.168.1.20", "10000", "send", "0", "0", "0", "1", "87", "0", "v4Rev1", "0.215",
        "1.3", "192.168.1.44", "B8:27:EB:11:22:33",
    ];
    format!("all\t{}", values.join("¤"))
}

fn bulk_decode_benchmark(c: &mut Criterion) {
    let message = snapshot();

    c.bench_function("decode_bulk_snapshot", |b| {
        b.iter(|| black_box(codec::decode_message(&FIRMWARE_BULK_SCHEMA, &message, None).unwrap()))
    });
}

fn reassembly_benchmark(c: &mut Criterion) {
    let message = snapshot();
    let buffer = ChunkBuffer::new(20);
    let device = DeviceId::new("B8:27:EB:11:22:33");
    buffer.subscribe(|m| {
        black_box(m.text.len());
    })
    .detach();

    c.bench_function("reassemble_snapshot", |b| {
        b.iter(|| {
            for chunk in message.as_bytes().chunks(20) {
                buffer.provide_chunk(&device, chunk);
            }
            if message.len() % 20 == 0 {
                buffer.provide_chunk(&device, b" ");
            }
        })
    });
}

criterion_group!(benches, bulk_decode_benchmark, reassembly_benchmark);
criterion_main!(benches);
