// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module turns error lines into bug search terms and collects the matching bugs.
//!
//! The heuristic works on the pipe delimited harness format:
//! `FAILURE-TYPE | testNameOrFilePath | message`, where the test file name is the most useful term.

use anyhow::{Context, Result};
use fxhash::FxHashMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use treeherder_artifacts::{Bug, BugSuggestion, Bugs, ErrorLine};

lazy_static! {
    static ref MOZHARNESS_PREFIX: Regex =
        Regex::new(r"^\d+:\d+:\d+[ ]+(?:DEBUG|INFO|WARNING|ERROR|CRITICAL|FATAL) - [ ]?").unwrap();
    static ref PROCESS_ID: Regex = Regex::new(r"^\s*(?:GECKO\(\d+\)|PID \d+)\s*$").unwrap();
    static ref LEAK: Regex = Regex::new(r"\d+ bytes leaked \((.+)\)$|leak at (.+)$").unwrap();
    static ref REFTEST: Regex = Regex::new(r"\s+[=!]=\s+.*").unwrap();
    static ref CRASH: Regex = Regex::new(r".+ application crashed \[@ (.+?)\](?: \|.*)?$").unwrap();
    static ref FAILURE_PREFIX: Regex =
        Regex::new(r"^(?:TEST-UNEXPECTED-\S+|PROCESS-CRASH)\s+\|\s+").unwrap();
}

const MAX_TERM_LENGTH: usize = 100;

// Terms that match too many bug summaries.
const BLACKLIST: [&str; 23] = [
    "automation.py",
    "remoteautomation.py",
    "Shutdown",
    "undefined",
    "Main app process exited normally",
    "Traceback (most recent call last):",
    "Return code: 0",
    "Return code: 1",
    "Return code: 2",
    "Return code: 9",
    "Return code: 10",
    "mozalloc_abort(char const*)",
    "mozalloc_abort",
    "Exiting 1",
    "Exiting 9",
    "CrashingThread(void *)",
    "libSystem.B.dylib + 0xd7a",
    "linux-gate.so + 0x424",
    "TypeError: content is null",
    "leakcheck",
    "ImportError: No module named pygtk",
    "# TBPL FAILURE #",
    "Return code:",
];

/// The bug cache interface.
pub trait BugCacheQuery {
    fn search(&self, term: &str) -> Result<Bugs>;
}

/// A bug cache served over http: `GET <url>?search=<term>` returns the json [Bugs].
pub struct HttpBugsCache {
    client: ureq::Agent,
    url: String,
}

impl HttpBugsCache {
    pub fn new(client: ureq::Agent, url: &str) -> HttpBugsCache {
        HttpBugsCache {
            client,
            url: url.to_string(),
        }
    }
}

impl BugCacheQuery for HttpBugsCache {
    #[tracing::instrument(level = "debug", skip(self))]
    fn search(&self, term: &str) -> Result<Bugs> {
        self.client
            .get(&self.url)
            .query("search", term)
            .call()
            .with_context(|| format!("Can't query {}", self.url))?
            .into_json()
            .context("Can't decode bugs")
    }
}

/// A fixed set of bugs, a bug matches when its summary contains the term.
#[derive(Debug, Default)]
pub struct InMemoryBugs {
    pub open_recent: Vec<Bug>,
    pub all_others: Vec<Bug>,
}

impl BugCacheQuery for InMemoryBugs {
    fn search(&self, term: &str) -> Result<Bugs> {
        let matches = |bugs: &[Bug]| {
            bugs.iter()
                .filter(|bug| bug.summary.contains(term))
                .cloned()
                .collect()
        };
        Ok(Bugs {
            open_recent: matches(&self.open_recent),
            all_others: matches(&self.all_others),
        })
    }
}

/// Check if a term is specific enough to search.
pub fn is_helpful_search_term(term: &str) -> bool {
    let term = term.trim();
    term.len() > 4 && !BLACKLIST.contains(&term)
}

/// Remove the mozharness timestamp and level.
pub fn clean_line(line: &str) -> String {
    MOZHARNESS_PREFIX.replace(line, "").trim().to_string()
}

/// The search terms of an error line, and the test path they come from.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SearchInfo {
    pub terms: Vec<String>,
    pub path_end: Option<String>,
}

/// Compute the search terms of a cleaned error line.
pub fn search_info(line: &str) -> SearchInfo {
    let mut tokens: Vec<&str> = line.split(" | ").collect();
    if tokens.first().is_some_and(|token| PROCESS_ID.is_match(token)) {
        tokens.remove(0);
    }

    let mut term: Option<String> = None;
    let mut path_end: Option<String> = None;
    if tokens.len() >= 3 {
        let (path, message) = (tokens[1], tokens[2]);
        if let Some(cap) = LEAK.captures(message) {
            term = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str().to_string());
        } else {
            let path = REFTEST.replace(path, "").replace('\\', "/");
            term = path.rsplit('/').next().map(str::to_string);
            path_end = Some(path);
        }
    }

    if !term.as_deref().is_some_and(is_helpful_search_term) {
        if is_helpful_search_term(line) {
            term = Some(line.to_string());
        } else {
            term = None;
            if path_end.as_deref().is_some_and(|path| !path.contains('/')) {
                path_end = None;
            }
        }
    }

    let terms = match term {
        None => Vec::new(),
        Some(term) => {
            let term: String = FAILURE_PREFIX
                .replace(&term, "")
                .chars()
                .take(MAX_TERM_LENGTH)
                .collect();
            match term.split_once('?') {
                Some((name, _)) if !name.is_empty() => {
                    let name = name.to_string();
                    vec![term, name]
                }
                _ => vec![term],
            }
        }
    };
    SearchInfo { terms, path_end }
}

/// Get the crash signature of a cleaned error line, when it is helpful.
pub fn crash_signature(line: &str) -> Option<String> {
    CRASH
        .captures(line)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .filter(|sig| is_helpful_search_term(sig))
        .map(str::to_string)
}

/// Compute the bug suggestions of error lines, each term is searched once.
pub struct ErrorSummarizer<'a, Q: BugCacheQuery> {
    bugs: &'a Q,
    term_cache: FxHashMap<String, Bugs>,
    max_summary_lines: usize,
}

impl<'a, Q: BugCacheQuery> ErrorSummarizer<'a, Q> {
    pub fn new(bugs: &'a Q, max_summary_lines: usize) -> Self {
        ErrorSummarizer {
            bugs,
            term_cache: FxHashMap::default(),
            max_summary_lines,
        }
    }

    fn search(&mut self, term: &str) -> Bugs {
        if let Some(bugs) = self.term_cache.get(term) {
            return bugs.clone();
        }
        match self.bugs.search(term) {
            Ok(bugs) => {
                self.term_cache.insert(term.to_string(), bugs.clone());
                bugs
            }
            Err(e) => {
                tracing::warn!(term, "Bug search failed: {:?}", e);
                Bugs::default()
            }
        }
    }

    pub fn bug_suggestion(&mut self, error: &ErrorLine) -> BugSuggestion {
        let line = clean_line(&error.line);
        let info = search_info(&line);
        let mut search_terms = info.terms.clone();
        let mut bugs = Bugs::default();
        for term in info.terms.iter().filter(|term| !term.trim().is_empty()) {
            let found = self.search(term);
            bugs.merge(&found);
        }
        if bugs.is_empty() {
            if let Some(signature) = crash_signature(&line) {
                let found = self.search(&signature);
                bugs.merge(&found);
                search_terms.push(signature);
            }
        }
        BugSuggestion {
            search: line,
            search_terms: search_terms.into_iter().unique().collect(),
            bugs,
            line_number: error.line_number,
            path_end: info.path_end,
        }
    }

    /// Compute the suggestions of the first error lines.
    pub fn summarize(&mut self, errors: &[ErrorLine]) -> Vec<BugSuggestion> {
        errors
            .iter()
            .take(self.max_summary_lines)
            .map(|error| self.bug_suggestion(error))
            .collect()
    }
}
