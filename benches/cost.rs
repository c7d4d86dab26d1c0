// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for cost evaluation and token estimation.
//!
//! Run with: `cargo bench --bench cost`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use spl_agent::cost::{estimate_messages, estimate_tokens, CostCatalog};
use spl_agent::types::{LlmResponse, Message, TokenUsage};

fn create_messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("User message {i}: some content here with reasonable length"))
            } else {
                Message::assistant(format!("Assistant response {i}: here is a helpful answer with some detail"))
            }
        })
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let catalog = CostCatalog::builtin();
    let mut group = c.benchmark_group("catalog_lookup");
    for name in ["gpt-4o", "GPT-4O-MINI", "gpt-4o-2024-08-06", "unknown-model"] {
        group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
            b.iter(|| black_box(catalog.lookup(black_box(name))))
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let catalog = CostCatalog::builtin();
    let mut group = c.benchmark_group("evaluate");

    let reported = LlmResponse {
        text: "It is noon.".to_string(),
        usage: TokenUsage::new(1_000, 500),
        ..Default::default()
    };
    group.bench_function("reported_usage", |b| {
        b.iter(|| black_box(catalog.evaluate("gpt-4o", black_box(&reported))))
    });

    for count in [10, 100] {
        let estimated = LlmResponse {
            text: "It is noon in Tokyo right now.".to_string(),
            messages: create_messages(count),
            ..Default::default()
        };
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("estimated", count), &estimated, |b, response| {
            b.iter(|| black_box(catalog.evaluate("gpt-4o", black_box(response))))
        });
    }
    group.finish();
}

fn bench_estimate(c: &mut Criterion) {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(200);
    let messages = create_messages(50);
    c.bench_function("estimate_tokens_9k_chars", |b| b.iter(|| black_box(estimate_tokens(black_box(&text)))));
    c.bench_function("estimate_messages_50", |b| b.iter(|| black_box(estimate_messages(black_box(&messages)))));
}

criterion_group!(benches, bench_lookup, bench_evaluate, bench_estimate);
criterion_main!(benches);
