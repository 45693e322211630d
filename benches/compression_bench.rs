use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::{Read, Seek, SeekFrom};

use xzseek::{compress, decompress, CompressOptions, DecompressOptions, SeekableXzReader};

fn sample(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    while out.len() < len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        if state & 0x7 < 5 {
            out.extend_from_slice(b"the quick brown fox jumps over the lazy dog ");
        } else {
            out.push((state >> 40) as u8);
        }
    }
    out.truncate(len);
    out
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    for size in [16 * 1024, 256 * 1024] {
        let data = sample(size);
        group.throughput(Throughput::Bytes(size as u64));
        for preset in [0u32, 6] {
            group.bench_with_input(
                BenchmarkId::new(format!("preset{preset}"), size),
                &data,
                |b, data| {
                    let options = CompressOptions::new().preset(preset);
                    b.iter(|| compress(data, &options).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    for size in [16 * 1024, 256 * 1024] {
        let data = sample(size);
        let packed = compress(&data, &CompressOptions::new().preset(6)).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packed, |b, packed| {
            let options = DecompressOptions::new();
            b.iter(|| decompress(packed, &options).unwrap());
        });
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    // Eight concatenated streams: a seek re-enters one block of eight.
    let mut plain_len = 0u64;
    let mut packed = Vec::new();
    for _ in 0..8 {
        let part = sample(64 * 1024);
        plain_len += part.len() as u64;
        packed.extend(compress(&part, &CompressOptions::new().preset(1)).unwrap());
    }

    c.bench_function("seek_and_read_4k", |b| {
        let mut reader = SeekableXzReader::new(std::io::Cursor::new(packed.clone())).unwrap();
        let mut buf = vec![0u8; 4096];
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 190_001) % (plain_len - buf.len() as u64);
            reader.seek(SeekFrom::Start(offset)).unwrap();
            reader.read_exact(&mut buf).unwrap();
        });
    });
}

criterion_group!(benches, bench_compress, bench_decompress, bench_seek);
criterion_main!(benches);
