// Criterion benchmarks for the hrpc-common wire codec
//
// Run benchmarks with:
//   cargo bench -p hrpc-common
//
// For detailed output with plots:
//   cargo bench -p hrpc-common -- --save-baseline main

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hrpc_common::transport::{PayloadCodec, WireCodec, DEFAULT_MAX_FRAME_SIZE};
use hrpc_common::{Request, Response};

fn request_with(items: usize, codec: &PayloadCodec) -> Request {
    let data: Vec<String> = (0..items).map(|i| format!("item_{}", i)).collect();
    Request::with_params("Store", "put", &("key".to_string(), data), codec)
        .unwrap()
        .with_id(42)
}

fn bench_request_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_creation");
    let codec = PayloadCodec::default();

    group.bench_function("no_params", |b| {
        b.iter(|| Request::new(black_box("Echo"), black_box("ping")));
    });

    group.bench_function("two_params", |b| {
        let params = ("hello".to_string(), 7u64);
        b.iter(|| Request::with_params("Echo", "say", black_box(&params), &codec));
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for (name, payload) in [("postcard", PayloadCodec::postcard()), ("json", PayloadCodec::json())] {
        let wire = WireCodec::new(payload, DEFAULT_MAX_FRAME_SIZE);
        let small = request_with(1, &payload);
        let large = request_with(100, &payload);

        group.bench_function(format!("{}_small", name), |b| {
            b.iter(|| wire.encode(black_box(&small)));
        });
        group.bench_function(format!("{}_large", name), |b| {
            b.iter(|| wire.encode(black_box(&large)));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for (name, payload) in [("postcard", PayloadCodec::postcard()), ("json", PayloadCodec::json())] {
        let wire = WireCodec::new(payload, DEFAULT_MAX_FRAME_SIZE);
        let bytes = wire.encode(&request_with(100, &payload)).unwrap().to_bytes();

        group.bench_function(format!("{}_request", name), |b| {
            b.iter(|| {
                let mut buf = BytesMut::from(&bytes[..]);
                wire.decode::<Request>(black_box(&mut buf))
            });
        });
    }

    let wire = WireCodec::default();
    let response = wire
        .encode(&Response::success(1, vec![0u8; 4096]))
        .unwrap()
        .to_bytes();
    group.bench_function("postcard_response_4k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&response[..]);
            wire.decode::<Response>(black_box(&mut buf))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_request_creation, bench_encode, bench_decode);
criterion_main!(benches);
