// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]

//! This library provides the error line classifier of the treeherder log parser.
//!
//! The goal is to detect if a build or test harness line reports a failure.
//! The only context kept between lines is whether the log comes from Taskcluster,
//! in which case the bracketed prefix added by the worker is removed before matching.
//!
//! ```rust
//! use treeherder_errors::State;
//! let mut state = State::new();
//! assert!(!state.parse("[taskcluster 2016-09-07 19:02:55.114Z] Task ID: PWden6jYS4SfVKYj4p7y6w").is_error());
//! assert_eq!(
//!     state.parse("[vcs 2016-09-07T19:03:02.188327Z] 23:57:52 ERROR - Return code: 1").error(),
//!     Some("23:57:52 ERROR - Return code: 1")
//! );
//! ```

use lazy_static::lazy_static;
use regex::Regex;

/// The parser state.
pub struct State {
    /// A previous line started with the Taskcluster marker.
    taskcluster: bool,
}

/// The result of parsing a line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Classification<'a> {
    /// The line doesn't contain an error.
    NoError,
    /// The line is an error, the value is the line without its Taskcluster prefix.
    Error(&'a str),
}

impl<'a> Classification<'a> {
    /// Check if the line is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Classification::Error(_))
    }

    /// Get the error line.
    pub fn error(self) -> Option<&'a str> {
        match self {
            Classification::Error(line) => Some(line),
            Classification::NoError => None,
        }
    }
}

lazy_static! {
    static ref TASKCLUSTER_PREFIX: Regex = Regex::new(r"^\[([^\]]+)\] ").unwrap();

    static ref INFO_GUARD: Regex =
        Regex::new(r"^\d+:\d+:\d+ +INFO - +(?:TEST-|INFO TEST-)(?:INFO|PASS|START|END) ").unwrap();

    static ref MOZHARNESS_PREFIX: Regex =
        Regex::new(r"^\d+:\d+:\d+ +(?:DEBUG|INFO|WARNING) - +").unwrap();

    static ref EXCLUDE: Regex = Regex::new(concat!(
        r"^non-fatal error",
        r"|^ImportError: No module named pygtk\r?\n?$",
        r"|TEST-UNEXPECTED-WARNING",
        r"|I[ /](?:Gecko|Robocop|TestRunner).*TEST-UNEXPECTED-",
    ))
    .unwrap();

    static ref MATCH_AT_START: Regex = Regex::new(concat!(
        "^(?:",
        r"error: TEST FAILED",
        r"|g?make(?:\[\d+\])?: \*\*\*",
        r"|mozmake\.(?:exe|EXE)(?:\[\d+\])?: \*\*\*",
        r"|\d+:\d+:\d+ +(?:ERROR|CRITICAL|FATAL) - ",
        r"|[A-Za-z.]+Error:",
        r"|[A-Za-z.]*Exception:",
        r"|remoteFailed:",
        r"|rm: cannot",
        r"|abort:",
        r"|Output exceeded \d+ bytes",
        r"|The web-page 'stop build' button was pressed",
        r"|\[[\w._-]+:(?:error|exception)\]",
        r"|\[taskcluster\] Error:",
        ")"
    ))
    .unwrap();

    static ref SEARCH_ANYWHERE: Regex = Regex::new(concat!(
        r"TEST-UNEXPECTED-(?:PASS|FAIL) ",
        r"|TEST-TIMEOUT",
        r"|fatal error",
        r"|FATAL ERROR",
        r"|PROCESS-CRASH",
        r"|Assertion fail(?:ure|ed)",
        r"|###!!! ABORT:",
        r"| error\(\d*\):",
        r"|:\d+: error:",
        r"| error R?C\d*:",
        r"|Automation Error:",
        r"|Remote Device Error:",
        r"|command timed out:",
        r"|ERROR [45]\d\d:",
        r"|wget: unable ",
        r"|REFTEST ERROR",
        r"|\[ FAILED \] ",
        r"|bash\.exe: \*\*\* ",
        r"|Hit MOZ_CRASH",
        r"|SUMMARY: (?:AddressSanitizer|ThreadSanitizer|UndefinedBehaviorSanitizer)",
        r"|ThreadSanitizer: nested bug",
        r"|YOU ARE LEAKING THE WORLD",
    ))
    .unwrap();
}

impl State {
    /// Initialize the parser.
    pub fn new() -> State {
        State { taskcluster: false }
    }

    /// Check if a Taskcluster line was seen.
    pub fn is_taskcluster(&self) -> bool {
        self.taskcluster
    }

    /// Remove the Taskcluster prefix from the line, once the log is known to come from Taskcluster.
    pub fn normalize<'a>(&mut self, line: &'a str) -> &'a str {
        if line.starts_with("[taskcluster ") {
            self.taskcluster = true;
        }
        if self.taskcluster {
            strip_taskcluster_prefix(line)
        } else {
            line
        }
    }

    /// Parse a single line.
    pub fn parse<'a>(&mut self, line: &'a str) -> Classification<'a> {
        let line = self.normalize(line);
        if is_error_line(line) {
            Classification::Error(line)
        } else {
            Classification::NoError
        }
    }
}

/// Strip a single `[name ...] ` token, unless it is a Taskcluster error marker.
fn strip_taskcluster_prefix(line: &str) -> &str {
    match TASKCLUSTER_PREFIX.captures(line) {
        Some(cap) => {
            let name = cap.get(1).map_or("", |m| m.as_str());
            if name == "taskcluster" || name.ends_with(":error") || name.ends_with(":exception") {
                line
            } else {
                &line[cap.get(0).map_or(0, |m| m.end())..]
            }
        }
        None => line,
    }
}

/// Check if a line reports an error, without any Taskcluster handling.
pub fn is_error_line(line: &str) -> bool {
    if INFO_GUARD.is_match(line) {
        return false;
    }
    let trimmed = match MOZHARNESS_PREFIX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    if EXCLUDE.is_match(trimmed) {
        return false;
    }
    MATCH_AT_START.is_match(line)
        || MATCH_AT_START.is_match(trimmed)
        || SEARCH_ANYWHERE.is_match(trimmed)
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::{is_error_line, State};

    #[test]
    fn test_is_error_line() {
        for line in [
            "23:52:39 INFO - 346 INFO TEST-UNEXPECTED-FAIL | dom/base/test/test_XHRDocURI.html | foo",
            "23:57:52 ERROR - Return code: 1",
            "08:01:02  CRITICAL - Uncaught exception",
            "error: TEST FAILED",
            "make[2]: *** [libs] Error 2",
            "gmake: *** [all] Error 1",
            "mozmake.EXE[4]: *** [target] Error 2",
            "mozmake.exe: *** [target] Error 2",
            "NameError: name 'foo' is not defined",
            "socket.timeoutError: timed out",
            "Exception: something broke",
            "java.lang.NullPointerException: oops",
            "remoteFailed: [Failure instance: Traceback (failure with no frames)",
            "rm: cannot remove 'foo': No such file or directory",
            "abort: HTTP Error 500: Internal Server Error",
            "Output exceeded 52428800 bytes, remaining output has been truncated",
            "The web-page 'stop build' button was pressed by 'someone'",
            "[taskcluster:error] Task timeout after 3600 seconds. Force killing container.",
            "[worker_1.x-y:exception] something",
            "[taskcluster] Error: Task was aborted",
            "TEST-UNEXPECTED-PASS | test_foo.html | unexpected pass",
            "TEST-TIMEOUT | test_foo.html",
            "foo.cpp(12): fatal error C1083: Cannot open include file",
            "FATAL ERROR: out of memory",
            "PROCESS-CRASH | application crashed [@ foo]",
            "Assertion failure: x, at foo.cpp:12",
            "Assertion failed: y",
            "###!!! ABORT: file foo.cpp, line 12",
            "foo.c error(42): bad",
            "foo.c:12: error: expected ';'",
            "foo.obj : error LNK2019: unresolved", // not an RC error
            "LINK : error RC1234: broken",
            "Automation Error: Exception caught",
            "Remote Device Error: unable to connect",
            "command timed out: 1200 seconds without output",
            "HTTP ERROR 503: Service Unavailable",
            "wget: unable to resolve host address",
            "REFTEST ERROR | something",
            "[  FAILED  ] nope",
            "[ FAILED ] FooTest.Bar",
            "bash.exe: *** fork: Resource temporarily unavailable",
            "Hit MOZ_CRASH(oops) at foo.cpp:1",
            "SUMMARY: AddressSanitizer: heap-use-after-free",
            "SUMMARY: ThreadSanitizer: data race",
            "SUMMARY: UndefinedBehaviorSanitizer: undefined-behavior",
            "ThreadSanitizer: nested bug in the same thread",
            "YOU ARE LEAKING THE WORLD (at least one JSRuntime and everything alive inside it, that is) AT JS_ShutDown TIME.  FIX THIS!",
            "12:00:00     INFO -  abort: push creates new remote head",
        ] {
            let expected = !(line.starts_with("foo.obj") || line.starts_with("[  FAILED"));
            assert_eq!(is_error_line(line), expected, "'{}' classification", line);
        }
    }

    #[test]
    fn test_is_not_error_line() {
        for line in [
            "",
            "Running a script",
            "12:00:00     INFO - TEST-PASS | test_foo.html | fatal error looks fine",
            "12:00:00 INFO - TEST-INFO | fatal error in message",
            "12:00:00 INFO - INFO TEST-START | PROCESS-CRASH.html",
            "12:00:00 INFO - TEST-END | TEST-TIMEOUT.html",
            "non-fatal error: lint is unhappy",
            "12:00:00     INFO -  non-fatal error: lint is unhappy",
            "ImportError: No module named pygtk",
            "ImportError: No module named pygtk\r",
            "TEST-UNEXPECTED-WARNING | foo | fatal error",
            "I/Gecko   ( 1234): TEST-UNEXPECTED-FAIL | foo | bar",
            "I/TestRunner( 1234): TEST-UNEXPECTED-FAIL | foo | bar",
            "12:00:00 WARNING - Return code: 1",
            "Error: no prefix",
            "TEST-UNEXPECTED-FAIL",
        ] {
            assert!(!is_error_line(line), "'{}' is an error", line);
        }
    }

    #[test]
    fn test_taskcluster_prefix() {
        let mut state = State::new();
        // Before the marker, prefixes are kept.
        assert!(!state.parse("[vcs 2016] abort: oops").is_error());
        assert!(!state.is_taskcluster());

        assert!(!state
            .parse("[taskcluster 2016-09-07 19:02:55.114Z] Task ID: PWden6jYS4SfVKYj4p7y6w")
            .is_error());
        assert!(state.is_taskcluster());
        assert_eq!(
            state
                .parse("[vcs 2016-09-07T19:03:02.188327Z] 23:57:52 ERROR - Return code: 1")
                .error(),
            Some("23:57:52 ERROR - Return code: 1")
        );
        // Only a single prefix is stripped.
        assert_eq!(state.normalize("[a b] [c d] abort:"), "[c d] abort:");
        // Taskcluster error markers are kept.
        assert!(state.parse("[taskcluster:error] Task timeout").is_error());
        assert!(state.parse("[taskcluster] Error: Task was aborted").is_error());
        assert!(!state.parse("no prefix at all").is_error());
    }

    #[test]
    fn test_taskcluster_prefix_equivalence() {
        for payload in [
            "23:57:52 ERROR - Return code: 1",
            "abort: stop",
            "just some output",
            "TEST-UNEXPECTED-FAIL | a | b",
        ] {
            let mut state = State::new();
            state.parse("[taskcluster 2016-09-07 19:02:55.114Z] Worker Group: us-west-2b");
            let prefixed = format!("[vcs 2016-09-07T19:03:02.188327Z] {}", payload);
            assert_eq!(
                state.parse(&prefixed).is_error(),
                is_error_line(payload),
                "{}",
                payload
            );
        }
    }
}
