// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module drives the builders over a log.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use treeherder_artifacts::ArtifactMap;
use treeherder_iterator::{bytes_to_string, BytesLines};

use crate::builders::{ArtifactBuilder, BuilderKind};
use crate::config::ParserConfig;
use crate::env::Env;
use crate::errors::{BuilderFailure, Error};
use crate::reader::Input;

/// The lines containing these markers are never truncated.
const PERF_MARKERS: [&str; 3] = ["TALOSDATA", "TalosResult", "PERFHERDER_DATA"];

/// A shared cancellation signal, checked once per line.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The result of a parse run.
#[derive(Debug)]
pub struct ParsedLog {
    pub logurl: String,
    pub artifacts: ArtifactMap,
    pub failures: Vec<BuilderFailure>,
    pub line_count: usize,
}

/// Cut a line to `max` bytes on a char boundary, unless it carries performance data.
pub fn truncate_line(line: &str, max: usize) -> &str {
    if line.len() <= max || PERF_MARKERS.iter().any(|marker| line.contains(marker)) {
        line
    } else {
        let mut end = max;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        &line[..end]
    }
}

struct Slot {
    builder: ArtifactBuilder,
    failure: Option<String>,
}

fn panic_reason(err: Box<dyn std::any::Any + Send>) -> String {
    match err.downcast::<String>() {
        Ok(s) => *s,
        Err(err) => err
            .downcast::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "unknown panic".to_string()),
    }
}

impl Slot {
    fn run<F: FnOnce(&mut ArtifactBuilder) -> anyhow::Result<()>>(&mut self, f: F) {
        if self.failure.is_some() {
            return;
        }
        let builder = &mut self.builder;
        let reason = match catch_unwind(AssertUnwindSafe(|| f(builder))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(err) => panic_reason(err),
        };
        tracing::error!(builder = self.builder.name(), "Builder failed: {}", reason);
        self.failure = Some(reason);
    }
}

/// The builder set of one log.
pub struct ArtifactBuilderCollection {
    logurl: String,
    slots: Vec<Slot>,
    max_line_length: usize,
    cancel: CancelToken,
}

impl ArtifactBuilderCollection {
    pub fn new(logurl: &str, kinds: &[BuilderKind], config: &ParserConfig) -> Self {
        Self::from_builders(
            logurl,
            kinds
                .iter()
                .map(|kind| ArtifactBuilder::new(*kind, config))
                .collect(),
            config.max_line_length,
        )
    }

    pub fn from_builders(logurl: &str, builders: Vec<ArtifactBuilder>, max_line_length: usize) -> Self {
        ArtifactBuilderCollection {
            logurl: logurl.to_string(),
            slots: builders
                .into_iter()
                .map(|builder| Slot {
                    builder,
                    failure: None,
                })
                .collect(),
            max_line_length,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Feed a single line to every active builder, in registration order.
    pub fn parse_line(&mut self, line: &str, line_number: usize) {
        let line = truncate_line(line, self.max_line_length);
        for slot in self.slots.iter_mut() {
            if !slot.builder.is_complete() {
                slot.run(|builder| builder.parse_line(line, line_number));
            }
        }
    }

    /// Stream the lines of a reader through the builders.
    pub fn parse_reader<R: Read>(mut self, reader: R) -> Result<ParsedLog, Error> {
        let mut lines = BytesLines::new(reader);
        let mut last_line_number = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match lines.next() {
                None => break,
                Some(line) => {
                    let (bytes, line_number) = line?;
                    let text = bytes_to_string(&bytes);
                    self.parse_line(&text, line_number);
                    last_line_number = line_number;
                }
            }
        }
        self.finish(last_line_number)
    }

    /// Close the builders and collect their artifacts.
    pub fn finish(mut self, last_line_number: usize) -> Result<ParsedLog, Error> {
        for slot in self.slots.iter_mut() {
            slot.run(|builder| {
                builder.finish_parse(last_line_number);
                Ok(())
            });
        }
        let mut artifacts = ArtifactMap::new();
        let mut failures = Vec::new();
        let logurl = &self.logurl;
        for mut slot in self.slots.into_iter() {
            let mut artifact = None;
            slot.run(|builder| {
                artifact = Some(builder.get_artifact(logurl));
                Ok(())
            });
            match (slot.failure, artifact) {
                (None, Some(artifact)) => {
                    artifacts.insert(slot.builder.name().to_string(), artifact);
                }
                (failure, _) => failures.push(BuilderFailure {
                    builder: slot.builder.name().to_string(),
                    reason: failure.unwrap_or_default(),
                }),
            }
        }
        if artifacts.is_empty() && !failures.is_empty() {
            return Err(Error::AllBuildersFailed(failures));
        }
        Ok(ParsedLog {
            logurl: self.logurl,
            artifacts,
            failures,
            line_count: last_line_number,
        })
    }
}

/// Parse a log with the given builders.
#[tracing::instrument(level = "debug", skip(env, input, cancel), fields(input = %input))]
pub fn parse_log(
    env: &Env,
    input: &Input,
    kinds: &[BuilderKind],
    cancel: &CancelToken,
) -> Result<ParsedLog, Error> {
    let start = Instant::now();
    let reader = input.open(env)?;
    let parsed = ArtifactBuilderCollection::new(&input.logurl(), kinds, &env.config)
        .with_cancel(cancel.clone())
        .parse_reader(reader)?;
    tracing::info!(
        lines = parsed.line_count,
        artifacts = parsed.artifacts.len(),
        elapsed = ?start.elapsed(),
        "Parsed {}",
        input
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepParser;
    use treeherder_artifacts::Artifact;

    fn parse_str(log: &str) -> ParsedLog {
        ArtifactBuilderCollection::new("http://localhost/log", &BuilderKind::ALL, &ParserConfig::default())
            .parse_reader(std::io::Cursor::new(log.to_string()))
            .unwrap()
    }

    #[test]
    fn test_truncate_line() {
        let short = "a".repeat(500);
        assert_eq!(truncate_line(&short, 500), short);
        let long = "b".repeat(501);
        assert_eq!(truncate_line(&long, 500).len(), 500);
        let perf = format!("PERFHERDER_DATA: {}", "c".repeat(600));
        assert_eq!(truncate_line(&perf, 500), perf);
        let talos = format!("{} TalosResult", "d".repeat(600));
        assert_eq!(truncate_line(&talos, 500), talos);
        let wide = "é".repeat(300);
        assert_eq!(truncate_line(&wide, 500).len(), 500);
        assert_eq!(truncate_line(&wide, 499).len(), 498);
    }

    #[test]
    fn test_collection() {
        let parsed = parse_str(
            "========= Started foo (results: 1, elapsed: 30 secs) (at 2016-07-13 16:09:31) =========\n\
             23:52:39 INFO - 346 INFO TEST-UNEXPECTED-FAIL | dom/base/test/test_XHRDocURI.html | foo\n\
             TinderboxPrint: link:log:http://localhost/log\n\
             PERFHERDER_DATA: {\"framework\":{\"name\":\"talos\"},\"suites\":[{\"name\":\"s\",\"subtests\":[{\"name\":\"t\",\"value\":1}]}]}\n\
             ========= Finished foo (results: 1, elapsed: 30 secs) (at 2016-07-13 16:10:01) =========\n",
        );
        assert_eq!(parsed.line_count, 5);
        assert!(parsed.failures.is_empty());
        let names: Vec<&str> = parsed.artifacts.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Job Info", "performance_data", "text_log_summary"]);
        let summary = parsed.artifacts["text_log_summary"]
            .as_text_log_summary()
            .unwrap();
        assert_eq!(summary.step_data.all_errors.len(), 1);
        assert_eq!(summary.step_data.all_errors[0].line_number, 2);
        assert_eq!(summary.step_data.steps[0].errors.len(), 1);
        match &parsed.artifacts["Job Info"] {
            Artifact::JobInfo(info) => assert_eq!(info.job_details.len(), 1),
            _ => panic!("bad artifact"),
        }
        match &parsed.artifacts["performance_data"] {
            Artifact::PerformanceData(perf) => assert_eq!(perf.performance_data.len(), 1),
            _ => panic!("bad artifact"),
        }
    }

    #[test]
    fn test_determinism() {
        let log = treeherder_generate::gen_log(10);
        let first = serde_json::to_string(&parse_str(&log).artifacts).unwrap();
        let second = serde_json::to_string(&parse_str(&log).artifacts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_long_error_line_truncated() {
        let long = format!("abort: {}", "x".repeat(1000));
        let parsed = parse_str(&long);
        let summary = parsed.artifacts["text_log_summary"]
            .as_text_log_summary()
            .unwrap();
        assert_eq!(summary.step_data.all_errors[0].line.len(), 500);
    }

    #[test]
    fn test_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = ArtifactBuilderCollection::new("log", &BuilderKind::ALL, &ParserConfig::default())
            .with_cancel(cancel)
            .parse_reader(std::io::Cursor::new("abort: oops\n"));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_strict_talos_failure_is_isolated() {
        let builders = vec![
            ArtifactBuilder::TextLogSummary(StepParser::new(100)),
            ArtifactBuilder::PerformanceData(crate::perf::PerformanceParser::new_strict()),
        ];
        let parsed = ArtifactBuilderCollection::from_builders("log", builders, 500)
            .parse_reader(std::io::Cursor::new("TALOSDATA: [{}]\nabort: oops\n"))
            .unwrap();
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].builder, "performance_data");
        assert!(parsed.artifacts.contains_key("text_log_summary"));
        assert!(!parsed.artifacts.contains_key("performance_data"));

        let only_strict = vec![ArtifactBuilder::PerformanceData(
            crate::perf::PerformanceParser::new_strict(),
        )];
        let result = ArtifactBuilderCollection::from_builders("log", only_strict, 500)
            .parse_reader(std::io::Cursor::new("TALOSDATA: [{}]\n"));
        assert!(matches!(result, Err(Error::AllBuildersFailed(f)) if f.len() == 1));
    }

    #[test]
    fn test_builder_panic_is_isolated() {
        let mut collection =
            ArtifactBuilderCollection::new("log", &BuilderKind::ALL, &ParserConfig::default());
        collection.parse_line("TinderboxPrint: before", 1);
        collection.slots[1].run(|_| panic!("boom"));
        assert_eq!(collection.slots[1].failure.as_deref(), Some("boom"));
        collection.slots[2].run(|_| panic!("boom at line {}", 2));
        assert_eq!(collection.slots[2].failure.as_deref(), Some("boom at line 2"));

        collection.parse_line("abort: oops", 2);
        collection.parse_line("TinderboxPrint: after", 3);
        let parsed = collection.finish(3).unwrap();
        let failed: Vec<(&str, &str)> = parsed
            .failures
            .iter()
            .map(|f| (f.builder.as_str(), f.reason.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![("Job Info", "boom"), ("performance_data", "boom at line 2")]
        );
        let summary = parsed.artifacts["text_log_summary"]
            .as_text_log_summary()
            .unwrap();
        assert_eq!(summary.step_data.all_errors[0].line_number, 2);
        assert_eq!(parsed.artifacts.len(), 1);
    }

    #[test]
    fn test_read_error() {
        let parsed = ArtifactBuilderCollection::new("log", &BuilderKind::ALL, &ParserConfig::default())
            .parse_reader(crate::reader::SizeLimit::new(
                std::io::Cursor::new("a\n".repeat(100)),
                10,
            ));
        assert!(matches!(parsed, Err(Error::LogSize { limit: 10 })));
    }
}
