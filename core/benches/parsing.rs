// Benchmarks for the hot parse paths: single data-frame decodes against a
// parsed configuration, and the streaming parser fed a long chunked stream.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use synchroframe_core::channel::parser::StreamParser;
use synchroframe_core::ieee_c37_118::codec::C37Codec;
use synchroframe_core::ieee_c37_118::common::{FrameKind, Version};
use synchroframe_core::ieee_c37_118::config::encode_configuration;
use synchroframe_core::ieee_c37_118::data::{encode_data, parse_data};
use synchroframe_core::ieee_c37_118::random::{random_configuration, random_data};

fn bench_data_frame_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_frame_parse");
    let mut rng = rand::rng();

    for cells in [1usize, 10, 40] {
        let configuration = Arc::new(
            random_configuration(&mut rng, 7734, cells).expect("configuration"),
        );
        let data = random_data(&mut rng, &configuration).expect("data frame");
        let bytes = encode_data(&data, Version::V2011).expect("encode");

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cells), &bytes, |b, bytes| {
            b.iter(|| parse_data(bytes, &configuration).expect("parse"));
        });
    }
    group.finish();
}

fn bench_stream_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_reassembly");
    let mut rng = rand::rng();

    let configuration = Arc::new(random_configuration(&mut rng, 7734, 10).expect("configuration"));
    let mut stream =
        encode_configuration(&configuration, Version::V2011, FrameKind::Config2).expect("encode");
    for _ in 0..120 {
        let data = random_data(&mut rng, &configuration).expect("data frame");
        stream.extend_from_slice(&encode_data(&data, Version::V2011).expect("encode"));
    }

    group.throughput(Throughput::Bytes(stream.len() as u64));
    for chunk_size in [512usize, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let (mut parser, channels) =
                        StreamParser::new(Box::new(C37Codec::default()));
                    for chunk in stream.chunks(chunk_size) {
                        parser.write(chunk);
                    }
                    let mut received = 0;
                    while channels.data_frames.try_recv().is_ok() {
                        received += 1;
                    }
                    assert_eq!(received, 120);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_data_frame_parse, bench_stream_reassembly);
criterion_main!(benches);
