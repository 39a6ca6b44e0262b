//! Performance benchmarks for shroud-crypto.
//!
//! Run with: `cargo bench -p shroud-crypto`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use shroud_crypto::aead::{Nonce, Secret, transmission_aad};

// ============================================================================
// AEAD Benchmarks
// ============================================================================

fn bench_aead_encrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("aead_encrypt");

    // Covert messages are small; the large sizes bound the worst case
    let sizes = [16, 64, 256, 1024, 4096, 65536];

    for size in sizes {
        let secret = Secret::new([0x42u8; 32]);
        let nonce = Nonce::from_bytes([0u8; 12]);
        let aad = transmission_aad(42);
        let plaintext = vec![0xAA; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| secret.encrypt(black_box(&nonce), black_box(&plaintext), black_box(&aad)))
        });
    }

    group.finish();
}

fn bench_aead_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("aead_decrypt");

    let sizes = [16, 64, 256, 1024, 4096, 65536];

    for size in sizes {
        let secret = Secret::new([0x42u8; 32]);
        let nonce = Nonce::from_bytes([0u8; 12]);
        let aad = transmission_aad(42);
        let plaintext = vec![0xAA; size];

        // Pre-encrypt for decryption benchmark
        let ciphertext = secret.encrypt(&nonce, &plaintext, &aad).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| secret.decrypt(black_box(&nonce), black_box(&ciphertext), black_box(&aad)))
        });
    }

    group.finish();
}

fn bench_nonce_generation(c: &mut Criterion) {
    c.bench_function("nonce_random", |b| b.iter(Nonce::random));
}

criterion_group!(
    benches,
    bench_aead_encrypt,
    bench_aead_decrypt,
    bench_nonce_generation
);
criterion_main!(benches);
