//! Benchmarks for record cache lookup and insertion.
//!
//! Measures the cost of the shared mutex on the query hot path.

use criterion::{BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::net::Ipv4Addr;

use hoard::cache::RecordCache;
use hoard::dns::{RecordData, RecordType};

const POPULATION: usize = 10_000;

fn domains() -> Vec<String> {
    (0..POPULATION).map(|i| format!("host{i}.example.com")).collect()
}

fn bench_get(c: &mut Criterion) {
    let cache = RecordCache::new();
    let domains = domains();
    for (i, domain) in domains.iter().enumerate() {
        cache.set(domain, RecordData::A(Ipv4Addr::from(i as u32)), 3600);
    }

    let mut group = c.benchmark_group("record_cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("get", "hit"), |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            let domain = &domains[rng.random_range(0..POPULATION)];
            cache.get(black_box(domain), RecordType::A)
        })
    });

    group.bench_function(BenchmarkId::new("get", "miss"), |b| {
        b.iter(|| cache.get(black_box("missing.example.org"), RecordType::A))
    });

    // Mixed-case names pay for lowercasing.
    group.bench_function(BenchmarkId::new("get", "mixed_case_hit"), |b| {
        b.iter(|| cache.get(black_box("HOST42.Example.COM"), RecordType::A))
    });

    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let cache = RecordCache::new();
    let domains = domains();

    let mut group = c.benchmark_group("record_cache");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("set", "overwrite"), |b| {
        let mut rng = rand::rng();
        b.iter(|| {
            let i = rng.random_range(0..POPULATION);
            cache.set(black_box(&domains[i]), RecordData::A(Ipv4Addr::from(i as u32)), 300)
        })
    });
    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_get(&mut criterion);
    bench_set(&mut criterion);
    criterion.final_summary();
}
