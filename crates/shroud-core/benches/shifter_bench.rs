//! Benchmarks for fragmentation, reassembly and framing.
//!
//! Run with: `cargo bench -p shroud-core`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::RngCore;
use shroud_core::frame::Fragment;
use shroud_core::reassembly::ReassemblyCache;
use shroud_core::shifter::{self, FragmentSize};
use shroud_crypto::Secret;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

fn message(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("shifter_encode");
    let secret = Secret::new([0x42u8; 32]);

    for bpo in [4u8, 16, 32] {
        let size = FragmentSize::new(bpo).unwrap();
        let plaintext = message(256);

        group.throughput(Throughput::Bytes(plaintext.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bpo), &size, |b, &size| {
            b.iter(|| shifter::encode(black_box(&plaintext), 7, &secret, size))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("shifter_decode");
    let secret = Secret::new([0x42u8; 32]);

    for bpo in [4u8, 16, 32] {
        let size = FragmentSize::new(bpo).unwrap();
        let plaintext = message(256);
        let fragments = shifter::encode(&plaintext, 7, &secret, size).unwrap();

        group.throughput(Throughput::Bytes(plaintext.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bpo), &fragments, |b, fragments| {
            b.iter(|| shifter::decode(black_box(fragments), &secret))
        });
    }

    group.finish();
}

fn bench_fragment_parse(c: &mut Criterion) {
    let secret = Secret::new([0x42u8; 32]);
    let fragments = shifter::encode(b"parse me", 7, &secret, FragmentSize::DEFAULT).unwrap();
    let envelope = fragments[fragments.len() - 1].to_envelope();

    c.bench_function("fragment_parse", |b| {
        b.iter(|| Fragment::parse(black_box(&envelope)))
    });
}

fn bench_reassembly(c: &mut Criterion) {
    let secret = Secret::new([0x42u8; 32]);
    let fragments = shifter::encode(&message(128), 7, &secret, FragmentSize::DEFAULT).unwrap();

    let mut group = c.benchmark_group("reassembly");
    group.throughput(Throughput::Elements(fragments.len() as u64));
    group.bench_function("admit_transmission", |b| {
        b.iter(|| {
            let mut cache = ReassemblyCache::new(1, Duration::from_secs(5), 1024);
            for fragment in &fragments {
                black_box(cache.admit(PEER, fragment.clone()));
            }
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_fragment_parse,
    bench_reassembly
);
criterion_main!(benches);
