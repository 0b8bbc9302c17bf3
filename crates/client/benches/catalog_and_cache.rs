//! Performance benchmarks for listing and caching.
//!
//! These benchmarks measure the hot paths of the core:
//! - Collation-ordered sorting of directory listings
//! - Image cache churn under eviction pressure
//! - Text decoding of downloaded content

use std::sync::Arc;

use client::files::{decode_text, sort_entries, DirectoryEntry};
use client::gallery::ImageCache;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use protocol::{EntryType, TextEncoding};

const NAMES: &[&str] = &[
    "Résumé", "resume", "ZEBRA", "apple", "Äpfel", "naïve", "Naive", "日本", "zoo", "Zürich",
];

fn listing(count: usize) -> Vec<DirectoryEntry> {
    (0..count)
        .map(|i| {
            let base = NAMES[i % NAMES.len()];
            let directory = i % 7 == 0;
            let name = format!("{base} {i}");
            DirectoryEntry {
                path: if directory {
                    format!("smb://nas/public/{name}/")
                } else {
                    format!("smb://nas/public/{name}.txt")
                },
                name,
                entry_type: if directory {
                    EntryType::Directory
                } else {
                    EntryType::File
                },
                size: i as u64,
                last_modified: 0,
            }
        })
        .collect()
}

/// Benchmark listing sort performance.
fn bench_sort_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_entries");

    for count in [100usize, 1_000, 10_000] {
        let entries = listing(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("entries_{count}"), |b| {
            b.iter_batched(
                || entries.clone(),
                |mut entries| {
                    sort_entries(&mut entries);
                    black_box(entries)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark cache insert/evict churn.
fn bench_cache_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_churn");

    let keys: Vec<String> = (0..1_000)
        .map(|i| format!("smb://nas/pics/{i}.jpg"))
        .collect();

    group.bench_function("put_evicting", |b| {
        let cache: ImageCache<Arc<Vec<u8>>> = ImageCache::new(64 * 1024);
        let value = Arc::new(vec![0u8; 16]);
        let mut i = 0usize;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            cache.put(key.clone(), Arc::clone(&value), 4 * 1024);
            i += 1;
        });
    });

    group.bench_function("get_hit", |b| {
        let cache: ImageCache<Arc<Vec<u8>>> = ImageCache::new(u64::MAX);
        for key in &keys {
            cache.put(key.clone(), Arc::new(vec![0u8; 16]), 1);
        }
        let mut i = 0usize;
        b.iter(|| {
            let hit = cache.get(&keys[i % keys.len()]);
            i += 1;
            black_box(hit)
        });
    });

    group.finish();
}

/// Benchmark text decoding.
fn bench_decode_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_text");

    let utf8 = "smbova ünïcödé text\n".repeat(4096).into_bytes();
    group.throughput(Throughput::Bytes(utf8.len() as u64));
    group.bench_function("utf8", |b| {
        b.iter(|| decode_text(black_box(&utf8), TextEncoding::Utf8))
    });

    let utf16: Vec<u8> = "smbova text\n"
        .repeat(4096)
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    group.throughput(Throughput::Bytes(utf16.len() as u64));
    group.bench_function("utf16le", |b| {
        b.iter(|| decode_text(black_box(&utf16), TextEncoding::Utf16Le))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_sort_entries,
    bench_cache_churn,
    bench_decode_text
);
criterion_main!(benches);
