// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This library provides the streaming log parser of treeherder.
//!
//! A log is read once, line by line, and every line is fed to a set of artifact builders:
//!
//! - `text_log_summary`: the build steps and their error lines,
//! - `Job Info`: the TinderboxPrint key/value items,
//! - `performance_data`: the PERFHERDER_DATA and TALOSDATA payloads.
//!
//! ```no_run
//! use treeherder_logparser::{parse_log, BuilderKind, CancelToken, Env, Input, ParserConfig};
//! let env = Env::new(ParserConfig::default()).unwrap();
//! let input = Input::from_string("https://example.com/live_backing.log".into());
//! let parsed = parse_log(&env, &input, &BuilderKind::ALL, &CancelToken::new()).unwrap();
//! println!("{}", serde_json::to_string(&parsed.artifacts).unwrap());
//! ```
//!
//! The structured error summaries are read with [failure_lines::parse_failure_lines],
//! and the error lines are mapped to bugs with [suggestions::ErrorSummarizer].

pub mod builders;
pub mod collection;
pub mod config;
pub mod env;
pub mod errors;
pub mod failure_lines;
pub mod perf;
pub mod pool;
pub mod reader;
pub mod steps;
pub mod suggestions;
pub mod tinderbox;

pub use builders::{ArtifactBuilder, BuilderKind};
pub use collection::{parse_log, ArtifactBuilderCollection, CancelToken, ParsedLog};
pub use config::ParserConfig;
pub use env::Env;
pub use errors::Error;
pub use reader::Input;

pub use treeherder_artifacts as artifacts;

use suggestions::{BugCacheQuery, ErrorSummarizer};
use treeherder_artifacts::{Artifact, BUG_SUGGESTIONS, TEXT_LOG_SUMMARY};

impl ParsedLog {
    /// Add the bug suggestions of the text log summary errors.
    pub fn add_bug_suggestions<Q: BugCacheQuery>(&mut self, bugs: &Q, max_summary_lines: usize) {
        let suggestions = match self
            .artifacts
            .get(TEXT_LOG_SUMMARY)
            .and_then(Artifact::as_text_log_summary)
        {
            Some(summary) => ErrorSummarizer::new(bugs, max_summary_lines)
                .summarize(&summary.step_data.all_errors),
            None => return,
        };
        tracing::info!(count = suggestions.len(), "Computed bug suggestions of {}", self.logurl);
        self.artifacts
            .insert(BUG_SUGGESTIONS.to_string(), Artifact::BugSuggestions(suggestions));
    }
}

#[test]
fn test_add_bug_suggestions() {
    let mut parsed = ArtifactBuilderCollection::new("log", &BuilderKind::ALL, &ParserConfig::default())
        .parse_reader(std::io::Cursor::new(
            "TEST-UNEXPECTED-FAIL | dom/test_foo.html | timed out\n",
        ))
        .unwrap();
    let bugs = suggestions::InMemoryBugs {
        open_recent: vec![],
        all_others: vec![artifacts::Bug {
            id: 7,
            summary: "Intermittent dom/test_foo.html | timed out".into(),
            status: None,
            resolution: None,
            crash_signature: None,
        }],
    };
    parsed.add_bug_suggestions(&bugs, 10);
    match &parsed.artifacts[BUG_SUGGESTIONS] {
        Artifact::BugSuggestions(suggestions) => {
            assert_eq!(suggestions.len(), 1);
            assert_eq!(suggestions[0].search_terms, vec!["test_foo.html"]);
            assert_eq!(suggestions[0].bugs.all_others[0].id, 7);
        }
        _ => panic!("bad artifact"),
    }
}
