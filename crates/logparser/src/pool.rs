// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module parses independent logs in parallel.
//! Each log gets its own builder set, nothing is shared between workers besides the environment.

use std::sync::mpsc::channel;
use threadpool::ThreadPool;

use crate::builders::BuilderKind;
use crate::collection::{parse_log, CancelToken, ParsedLog};
use crate::env::Env;
use crate::errors::Error;
use crate::reader::Input;

/// The number of workers used when none is requested.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Parse the inputs with `jobs` workers (0 means [default_jobs]).
/// The results are returned in the input order.
pub fn parse_many(
    env: &Env,
    inputs: &[Input],
    kinds: &[BuilderKind],
    jobs: usize,
    cancel: &CancelToken,
) -> Vec<Result<ParsedLog, Error>> {
    let workers = ThreadPool::new(if jobs == 0 { default_jobs() } else { jobs });
    let (tx, rx) = channel();
    for (idx, input) in inputs.iter().enumerate() {
        let tx = tx.clone();
        let env = env.clone();
        let input = input.clone();
        let kinds = kinds.to_vec();
        let cancel = cancel.clone();
        workers.execute(move || {
            let result = parse_log(&env, &input, &kinds, &cancel);
            // The receiver outlives the workers.
            let _ = tx.send((idx, result));
        });
    }
    drop(tx);
    workers.join();

    let mut results: Vec<Option<Result<ParsedLog, Error>>> = inputs.iter().map(|_| None).collect();
    for (idx, result) in rx.try_iter() {
        results[idx] = Some(result);
    }
    results
        .into_iter()
        .zip(inputs)
        .map(|(result, input)| {
            result.unwrap_or_else(|| {
                tracing::error!("Worker panicked while parsing {}", input);
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "worker panicked",
                )))
            })
        })
        .collect()
}
