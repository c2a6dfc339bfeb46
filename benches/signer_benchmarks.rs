//! Signing and batch encoding benchmarks.
//!
//! Every upload is signed once, so signing cost bounds request throughput.

use cls_log_shipper::buffer::Accumulator;
use cls_log_shipper::domain::{Content, LogRecord};
use cls_log_shipper::sender::{BatchSerializer, LogGroupSerializer, PayloadFormat};
use cls_log_shipper::signer::{format_string, sign};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;

fn params() -> HashMap<String, String> {
    HashMap::from([("topic_id".to_string(), "xxxxxxxx-xxxx".to_string())])
}

fn headers() -> HashMap<String, String> {
    HashMap::from([(
        "Host".to_string(),
        "ap-guangzhou.cls.tencentyun.com".to_string(),
    )])
}

fn bench_sign(c: &mut Criterion) {
    let params = params();
    let headers = headers();

    c.bench_function("sign_structuredlog", |b| {
        b.iter(|| {
            sign(
                black_box("AKIDexample"),
                black_box("secretkey"),
                "POST",
                "/structuredlog",
                &params,
                &headers,
                black_box(1_700_000_000),
            )
        });
    });

    c.bench_function("format_string", |b| {
        b.iter(|| format_string("POST", "/structuredlog", black_box(&params), &headers));
    });
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_batch");

    for size in [16usize, 256, 1024] {
        let mut accumulator = Accumulator::new();
        for i in 0..size {
            accumulator.append(LogRecord::new(
                1_700_000_000,
                vec![
                    Content::new("level", "info"),
                    Content::new("msg", format!("request {i} served in 12ms")),
                ],
            ));
        }
        let batch = accumulator.reset();
        group.throughput(Throughput::Elements(size as u64));

        for format in [PayloadFormat::Protobuf, PayloadFormat::Json] {
            let serializer = LogGroupSerializer::new(format);
            group.bench_with_input(
                BenchmarkId::new(format!("{format:?}"), size),
                &batch,
                |b, batch| b.iter(|| serializer.serialize(black_box(batch))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_sign, bench_serialize);
criterion_main!(benches);
