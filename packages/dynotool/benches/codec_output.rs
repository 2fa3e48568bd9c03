//! Codec throughput: decode tagged records and render them in each
//! output format.
//!
//! Run: cargo bench --bench codec_output

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dynotool::codec::output::DelimitedLayout;
use dynotool::codec::{decode, FormatWriter};
use dynotool::{OutputFormat, TaggedRecord, TaggedValue, UnencodablePolicy};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_records(count: usize) -> Vec<TaggedRecord> {
    (0..count)
        .map(|i| {
            let mut address = TaggedRecord::new();
            address.insert("city".into(), TaggedValue::S(format!("city-{}", i % 50)));
            address.insert("zip".into(), TaggedValue::N(format!("{:05}", 10000 + i % 9000)));

            let mut record = TaggedRecord::new();
            record.insert("id".into(), TaggedValue::S(format!("user-{:08}", i)));
            record.insert("score".into(), TaggedValue::N(format!("{}.{}", i * 7, i % 10)));
            record.insert("active".into(), TaggedValue::Bool(i % 3 != 0));
            record.insert("roles".into(), TaggedValue::Ss(vec!["reader".into(), "writer".into()]));
            record.insert("avatar".into(), TaggedValue::B(vec![(i % 256) as u8; 48]));
            record.insert("address".into(), TaggedValue::M(address));
            record
        })
        .collect()
}

fn formats() -> Vec<OutputFormat> {
    let layout = DelimitedLayout::new(vec!["id".into(), "score".into(), "active".into()], b',').unwrap();
    vec![
        OutputFormat::LineJson,
        OutputFormat::JsonArray,
        OutputFormat::Delimited(layout),
        OutputFormat::Native,
    ]
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_decode(c: &mut Criterion) {
    let records = make_records(1_000);
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("1k_records", |b| {
        b.iter(|| {
            for record in &records {
                black_box(decode(black_box(record)).unwrap());
            }
        })
    });
    group.finish();
}

fn bench_output(c: &mut Criterion) {
    let records = make_records(1_000);
    let mut group = c.benchmark_group("output");
    group.throughput(Throughput::Elements(records.len() as u64));
    for format in formats() {
        group.bench_with_input(BenchmarkId::from_parameter(format.name()), &format, |b, format| {
            b.iter(|| {
                let mut writer = FormatWriter::new(Vec::with_capacity(256 * 1024), format.clone(), UnencodablePolicy::Abort);
                writer.begin().unwrap();
                for record in &records {
                    writer.write(record).unwrap();
                }
                black_box(writer.finish().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_output);
criterion_main!(benches);
