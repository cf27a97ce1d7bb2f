use criterion::{criterion_group, criterion_main, Criterion};
use seekgz::map::BlockMap;
use seekgz::reader::Reader;
use seekgz::seek::SeekReader;
use seekgz::writer::Writer;
use std::hint::black_box;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

fn criterion_benchmark(c: &mut Criterion) {
    let data = black_box(sample_data(1024 * 1024));
    let (bytes, map) = compress(&data, 64 * 1024);
    let map = Arc::new(map);

    let mut group = c.benchmark_group("stream");
    group.throughput(criterion::Throughput::Bytes(data.len() as u64));
    group.bench_function("decode_all", |b| {
        // One reader for the whole run: reset must reuse the deflate
        // window rather than reallocating it.
        let mut reader = Reader::new(&bytes[..]).unwrap();
        let mut sink = Vec::with_capacity(data.len());
        b.iter(|| {
            sink.clear();
            reader.reset_source(&bytes[..]).unwrap();
            let n = reader.write_to(&mut sink).unwrap();
            black_box(n)
        })
    });
    group.finish();

    let mut group = c.benchmark_group("seek");
    group.throughput(criterion::Throughput::Bytes(256));
    group.bench_function("seek_and_read_256", |b| {
        let mut reader = SeekReader::new(Cursor::new(bytes.clone()), Arc::clone(&map));
        let mut buf = [0u8; 256];
        let mut offset = 0u64;
        b.iter(|| {
            offset = offset
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407)
                % (data.len() as u64 - 256);
            reader.seek(SeekFrom::Start(offset)).unwrap();
            reader.read_exact(&mut buf).unwrap();
            black_box(&buf);
        })
    });
    group.finish();
}

fn compress(data: &[u8], block_size: u32) -> (Vec<u8>, BlockMap) {
    let mut writer = Writer::with_level_and_block_size(Vec::new(), -1, block_size).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

/// Mildly compressible data: short runs with pseudo-random lengths.
fn sample_data(len: usize) -> Vec<u8> {
    let mut data = vec![0; len];
    let mut state = 0x9e37_79b9u32;
    let mut i = 0;
    while i < len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let run = (state as usize % 48 + 1).min(len - i);
        data[i..i + run].fill((state >> 8) as u8);
        i += run;
    }
    data
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
