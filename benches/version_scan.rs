use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use docvault::backends::{Backends, TableStore};
use docvault::store::types::FAMILY_META;
use docvault::store::{name_filter_regex, RowKey};
use docvault::{DocumentStore, StoreOptions};

// Row keys for `names` documents with a random number of versions each.
fn gen_row_keys(names: usize, max_versions: u64, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for n in 0..names {
        let versions = rng.gen_range(1..=max_versions);
        for v in 1..=versions {
            out.push(format!("v{}.doc-{}.txt", v, n));
        }
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_scan_parse");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &names in &[1_000usize, 10_000usize] {
        let keys = gen_row_keys(names, 20, 0xBEEF_CAFE);
        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::new("max_for_name", names.to_string()), &keys, |b, keys| {
            b.iter(|| {
                let target = "doc-7.txt";
                let max = keys
                    .iter()
                    .filter_map(|k| RowKey::parse(k).ok())
                    .filter(|rk| rk.name == target)
                    .map(|rk| rk.version)
                    .max();
                criterion::black_box(max);
            });
        });
    }
    group.finish();
}

fn bench_latest_version(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("version_scan_memory");
    group.sample_size(20);

    for &names in &[100usize, 1_000usize] {
        let (backends, _blob, table, _search) = Backends::in_memory();
        let store = rt.block_on(async {
            let store = DocumentStore::open(backends, StoreOptions::default()).await.unwrap();
            for k in gen_row_keys(names, 10, 0xDEAD_BEEF) {
                table.insert(&k, FAMILY_META, "version", b"1").await.unwrap();
            }
            store
        });
        group.bench_with_input(BenchmarkId::new("latest_version", names.to_string()), &names, |b, _| {
            b.iter(|| {
                let v = rt.block_on(store.latest_version("doc-3.txt")).unwrap();
                criterion::black_box(v);
            });
        });
        group.bench_with_input(BenchmarkId::new("filter_regex", names.to_string()), &names, |b, _| {
            b.iter(|| criterion::black_box(name_filter_regex("doc-3.txt")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_latest_version);
criterion_main!(benches);
