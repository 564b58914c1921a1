//! Benchmarks for DNS wire parsing and answer synthesis.
//!
//! Run with: cargo bench --bench codec_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::net::Ipv4Addr;

use hoard::dns::{parse_questions, parse_records, synthesize_answer};

fn create_dns_query(query_id: u16, domain: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);

    // Header (12 bytes)
    packet.extend_from_slice(&query_id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query
    packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
    packet.extend_from_slice(&[0x00, 0x00]); // Answer RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Authority RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Additional RRs: 0

    // Question section
    for label in domain.split('.') {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0x00); // Root label

    packet.extend_from_slice(&[0x00, 0x01]); // Type: A
    packet.extend_from_slice(&[0x00, 0x01]); // Class: IN

    packet
}

/// A response with `answers` A records and one NS record in authority,
/// all owner names compressed to the question.
fn create_dns_response(query: &[u8], answers: u8) -> Vec<u8> {
    let mut packet = query.to_vec();
    packet[2..4].copy_from_slice(&[0x81, 0x80]);
    packet[6..8].copy_from_slice(&[0x00, answers]);
    packet[8..10].copy_from_slice(&[0x00, 0x01]);

    for i in 0..answers {
        packet.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
        packet.extend_from_slice(&300u32.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x04, 10, 0, 0, i]);
    }

    packet.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x02, 0x00, 0x01]);
    packet.extend_from_slice(&3600u32.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x06, 3, b'n', b's', b'1', 0xC0, 0x0C]);

    packet
}

fn bench_parse_questions(c: &mut Criterion) {
    let short = create_dns_query(0x1234, "example.com");
    let long = create_dns_query(0x1234, "a.very.deep.subdomain.example.domain.com");

    let mut group = c.benchmark_group("parse_questions");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("domain", "short"), |b| {
        b.iter(|| parse_questions(black_box(&short)))
    });
    group.bench_function(BenchmarkId::new("domain", "long"), |b| {
        b.iter(|| parse_questions(black_box(&long)))
    });
    group.finish();
}

fn bench_parse_records(c: &mut Criterion) {
    let query = create_dns_query(0x1234, "example.com");

    let mut group = c.benchmark_group("parse_records");
    for answers in [1u8, 4, 16] {
        let response = create_dns_response(&query, answers);
        group.throughput(Throughput::Elements(answers as u64 + 1));
        group.bench_with_input(BenchmarkId::new("answers", answers), &response, |b, response| {
            b.iter(|| parse_records(black_box(response)))
        });
    }
    group.finish();
}

fn bench_synthesize_answer(c: &mut Criterion) {
    let query = create_dns_query(0x1234, "example.com");
    let addr = Ipv4Addr::new(93, 184, 216, 34);

    c.bench_function("synthesize_answer", |b| {
        b.iter(|| synthesize_answer(black_box(&query), black_box(addr)))
    });
}

criterion_group!(
    benches,
    bench_parse_questions,
    bench_parse_records,
    bench_synthesize_answer,
);

criterion_main!(benches);
