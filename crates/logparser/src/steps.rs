// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the step parser, which builds the log viewer summary.
//!
//! Steps are delimited by buildbot style markers:
//!
//! ```text
//! ========= Started foo (results: 0, elapsed: 0 secs) (at 2016-07-13 16:09:31) =========
//! ...
//! ========= Finished foo (results: 1, elapsed: 30 secs) (at 2016-07-13 16:10:01) =========
//! ```
//!
//! The error lines found outside of a step are recorded in an unnamed step.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use treeherder_artifacts::{
    parse_timestamp, ErrorLine, Step, StepData, StepResult, TextLogSummary,
};

lazy_static! {
    static ref STARTED: Regex = Regex::new(
        r"^={9} Started (.+?) \(results: (\d+), elapsed: (?:\d+ mins, )?\d+ secs\) \(at (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)\) ={9}$"
    )
    .unwrap();
    static ref FINISHED: Regex = Regex::new(
        r"^={9} Finished (.+?) \(results: (\d+), elapsed: (?:\d+ mins, )?\d+ secs\) \(at (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)\) ={9}$"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    BeforeFirstStep,
    InStep,
    BetweenSteps,
    Terminated,
}

pub struct StepParser {
    state: ParserState,
    classifier: treeherder_errors::State,
    steps: Vec<Step>,
    // The open step, either a marked step or the unnamed bucket.
    current: Option<Step>,
    all_errors: Vec<ErrorLine>,
    errors_truncated: bool,
    max_error_lines: usize,
    last_line_number: usize,
}

impl StepParser {
    pub fn new(max_error_lines: usize) -> StepParser {
        StepParser {
            state: ParserState::BeforeFirstStep,
            classifier: treeherder_errors::State::new(),
            steps: Vec::new(),
            current: None,
            all_errors: Vec::new(),
            errors_truncated: false,
            max_error_lines,
            last_line_number: 0,
        }
    }

    pub fn parse_line(&mut self, line: &str, line_number: usize) {
        if self.state == ParserState::Terminated {
            return;
        }
        self.last_line_number = line_number;
        if self.state == ParserState::InStep {
            if let Some(cap) = FINISHED.captures(line) {
                self.end_step(&cap, line_number);
                return;
            }
        } else if let Some(cap) = STARTED.captures(line) {
            self.start_step(&cap, line_number);
            return;
        }
        // A nested Started marker is an ordinary line.
        self.parse_error(line, line_number);
    }

    fn start_step(&mut self, cap: &Captures, line_number: usize) {
        // Close the unnamed step holding the errors found since the previous step.
        if let Some(mut unnamed) = self.current.take() {
            unnamed.finish(line_number.saturating_sub(1), None, StepResult::Unknown);
            self.steps.push(unnamed);
        }
        let name = cap.get(1).map_or("", |m| m.as_str());
        let started = cap.get(3).and_then(|m| parse_timestamp(m.as_str()));
        self.current = Some(Step::new(name, self.steps.len(), line_number, started));
        self.state = ParserState::InStep;
    }

    fn end_step(&mut self, cap: &Captures, line_number: usize) {
        let result = cap
            .get(2)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map_or(StepResult::Unknown, StepResult::from_code);
        let finished = cap.get(3).and_then(|m| parse_timestamp(m.as_str()));
        if let Some(mut step) = self.current.take() {
            step.finish(line_number, finished, result);
            self.steps.push(step);
        }
        self.state = ParserState::BetweenSteps;
    }

    fn parse_error(&mut self, line: &str, line_number: usize) {
        if let Some(error) = self.classifier.parse(line).error() {
            if self.all_errors.len() >= self.max_error_lines {
                self.errors_truncated = true;
                return;
            }
            let error = ErrorLine::new(line_number, error);
            self.all_errors.push(error.clone());
            let order = self.steps.len();
            self.current
                .get_or_insert_with(|| Step::new("", order, line_number, None))
                .add_error(error);
        }
    }

    /// Close the open step. A step without a Finished marker has an unknown result.
    pub fn finish_parse(&mut self, last_line_number: usize) {
        if self.state == ParserState::Terminated {
            return;
        }
        let last_line_number = last_line_number.max(self.last_line_number);
        if let Some(mut step) = self.current.take() {
            step.finish(last_line_number, None, StepResult::Unknown);
            self.steps.push(step);
        }
        self.state = ParserState::Terminated;
    }

    pub fn get_artifact(&self, logurl: &str) -> TextLogSummary {
        TextLogSummary {
            logurl: logurl.to_string(),
            step_data: StepData {
                steps: self.steps.clone(),
                errors_truncated: self.errors_truncated,
                all_errors: self.all_errors.clone(),
            },
        }
    }
}
