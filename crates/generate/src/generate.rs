// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! Synthetic log generator
//!
//! [gen_lines] yields random noise, and [gen_log] produces a complete buildbot style log
//! with step markers, failures, job info and performance payloads:
//!
//! ```rust
//! # use treeherder_generate::{gen_log};
//! let log = gen_log(3);
//! assert!(log.starts_with("========= Started step-0 (results: 0, elapsed: 0 secs)"));
//! assert_eq!(log.matches("========= Finished").count(), 3);
//! ```

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const SEED: u64 = 42;

fn fixed_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(SEED)
}

fn gen_line(rng: &mut impl Rng) -> String {
    let mut result = String::with_capacity(256);
    for _ in 0..rng.random_range(2..10) {
        let word_size = rng.random_range(2..18);
        let word: String = rng
            .sample_iter(&rand::distr::Alphanumeric)
            .take(word_size)
            .map(char::from)
            .collect();
        result.push_str(&word);
        result.push(' ');
    }
    result.pop();
    result
}

struct RandomLine {
    rng: ChaCha8Rng,
}

impl Iterator for RandomLine {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        Some(gen_line(&mut self.rng))
    }
}

/// An infinite stream of random words lines.
pub fn gen_lines() -> impl Iterator<Item = String> {
    RandomLine { rng: fixed_rng() }
}

fn timestamp(secs: u64) -> String {
    format!(
        "2016-07-13 {:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

fn clock(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

fn gen_body_line(rng: &mut impl Rng, secs: u64) -> String {
    match rng.random_range(0..100) {
        0 => format!(
            "{}     INFO -  TEST-UNEXPECTED-FAIL | dom/tests/test_{}.html | {}",
            clock(secs),
            rng.random_range(0..1000),
            gen_line(rng)
        ),
        1 => format!("{}    ERROR - Return code: {}", clock(secs), rng.random_range(1..3)),
        2 => format!("TinderboxPrint: {}", gen_line(rng)),
        3 => format!(
            "PERFHERDER_DATA: {{\"framework\":{{\"name\":\"talos\"}},\"suites\":[{{\"name\":\"suite-{}\",\"subtests\":[{{\"name\":\"sub\",\"value\":{}}}]}}]}}",
            rng.random_range(0..10),
            rng.random_range(0..5000)
        ),
        4..=9 => format!(
            "{}     INFO -  TEST-PASS | dom/tests/test_{}.html | fatal error was expected",
            clock(secs),
            rng.random_range(0..1000)
        ),
        _ => format!("{}     INFO -  {}", clock(secs), gen_line(rng)),
    }
}

/// Generate a log with `steps` steps of pseudo random content, always the same for a given count.
pub fn gen_log(steps: usize) -> String {
    let mut rng = fixed_rng();
    let mut result = String::new();
    let mut secs: u64 = 3600;
    for step in 0..steps {
        let started = secs;
        result.push_str(&format!(
            "========= Started step-{} (results: 0, elapsed: 0 secs) (at {}) =========\n",
            step,
            timestamp(started)
        ));
        for _ in 0..rng.random_range(10..200) {
            secs += rng.random_range(0..2);
            result.push_str(&gen_body_line(&mut rng, secs));
            result.push('\n');
        }
        secs += 1;
        let code = if rng.random_range(0..4) == 0 { 1 } else { 0 };
        result.push_str(&format!(
            "========= Finished step-{} (results: {}, elapsed: {} secs) (at {}) =========\n",
            step,
            code,
            secs - started,
            timestamp(secs)
        ));
    }
    result
}
