// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use treeherder_logparser::suggestions::{ErrorSummarizer, InMemoryBugs};
use treeherder_logparser::{ArtifactBuilderCollection, BuilderKind, ParserConfig};

pub fn parse_generated_log(c: &mut Criterion) {
    let input = treeherder_generate::gen_log(500);
    let config = ParserConfig::default();
    let mut group = c.benchmark_group("logparser");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("builders", |b| {
        b.iter(|| {
            ArtifactBuilderCollection::new("bench", &BuilderKind::ALL, &config)
                .parse_reader(black_box(input.as_bytes()))
                .map(|parsed| parsed.artifacts.len())
        })
    });
    group.finish();
}

pub fn summarize_errors(c: &mut Criterion) {
    let input = treeherder_generate::gen_log(500);
    let config = ParserConfig {
        max_error_lines: usize::MAX,
        ..ParserConfig::default()
    };
    let errors = ArtifactBuilderCollection::new("bench", &[BuilderKind::Text], &config)
        .parse_reader(input.as_bytes())
        .ok()
        .and_then(|mut parsed| parsed.artifacts.remove("text_log_summary"))
        .and_then(|artifact| artifact.as_text_log_summary().map(|s| s.step_data.all_errors.clone()))
        .unwrap_or_default();
    let bugs = InMemoryBugs::default();
    c.bench_function("logparser::suggestions", |b| {
        b.iter(|| ErrorSummarizer::new(&bugs, usize::MAX).summarize(black_box(&errors)))
    });
}

criterion_group!(benches, parse_generated_log, summarize_errors);
criterion_main!(benches);
