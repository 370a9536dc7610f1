// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! The data model of the log parser.
//!
//! These values are produced by a single parse run and handed to the caller as a [ArtifactMap].
//! Their JSON serialization is the contract with the persistence layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// The name of the log viewer summary artifact.
pub const TEXT_LOG_SUMMARY: &str = "text_log_summary";
/// The name of the job details artifact.
pub const JOB_INFO: &str = "Job Info";
/// The name of the performance artifact.
pub const PERFORMANCE_DATA: &str = "performance_data";
/// The name of the optional bug suggestions entry.
pub const BUG_SUGGESTIONS: &str = "Bug suggestions";

/// The timestamp format of the step markers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// An unexpected enum value.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLine {
    pub line_number: usize,
    pub line: String,
}

impl ErrorLine {
    pub fn new(line_number: usize, line: &str) -> ErrorLine {
        ErrorLine {
            line_number,
            line: line.trim_end().to_string(),
        }
    }
}

/// The outcome of a step, derived from the `results: N` code of the Finished marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Success,
    Testfailed,
    Busted,
    Skipped,
    Exception,
    Retry,
    Usercancel,
    Unknown,
    Superseded,
}

impl StepResult {
    pub fn from_code(code: u64) -> StepResult {
        match code {
            0 => StepResult::Success,
            1 => StepResult::Testfailed,
            2 => StepResult::Busted,
            3 => StepResult::Skipped,
            4 => StepResult::Exception,
            5 => StepResult::Retry,
            6 => StepResult::Usercancel,
            8 => StepResult::Superseded,
            _ => StepResult::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Success => "success",
            StepResult::Testfailed => "testfailed",
            StepResult::Busted => "busted",
            StepResult::Skipped => "skipped",
            StepResult::Exception => "exception",
            StepResult::Retry => "retry",
            StepResult::Usercancel => "usercancel",
            StepResult::Unknown => "unknown",
            StepResult::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a marker timestamp, returns None when the date is not valid.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

mod opt_timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A region of the log bounded by Started/Finished markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub order: usize,
    pub started_linenumber: usize,
    pub finished_linenumber: usize,
    #[serde(with = "opt_timestamp")]
    pub started: Option<NaiveDateTime>,
    #[serde(with = "opt_timestamp")]
    pub finished: Option<NaiveDateTime>,
    pub duration_secs: Option<f64>,
    pub result: StepResult,
    pub errors: Vec<ErrorLine>,
    pub error_count: usize,
}

impl Step {
    /// Create an open step.
    pub fn new(
        name: &str,
        order: usize,
        started_linenumber: usize,
        started: Option<NaiveDateTime>,
    ) -> Step {
        Step {
            name: name.to_string(),
            order,
            started_linenumber,
            finished_linenumber: started_linenumber,
            started,
            finished: None,
            duration_secs: None,
            result: StepResult::Unknown,
            errors: Vec::new(),
            error_count: 0,
        }
    }

    /// Close the step, the duration is only set when both timestamps are known.
    pub fn finish(
        &mut self,
        finished_linenumber: usize,
        finished: Option<NaiveDateTime>,
        result: StepResult,
    ) {
        self.finished_linenumber = finished_linenumber;
        self.finished = finished;
        self.result = result;
        self.duration_secs = match (self.started, finished) {
            (Some(started), Some(finished)) => {
                let delta = finished - started;
                delta
                    .num_microseconds()
                    .map(|us| us as f64 / 1_000_000.0)
            }
            _ => None,
        };
    }

    pub fn add_error(&mut self, error: ErrorLine) {
        self.errors.push(error);
        self.error_count = self.errors.len();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StepData {
    pub steps: Vec<Step>,
    pub errors_truncated: bool,
    pub all_errors: Vec<ErrorLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLogSummary {
    pub logurl: String,
    pub step_data: StepData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Link,
    RawHtml,
    Text,
}

/// A TinderboxPrint job detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfoItem {
    pub title: Option<String>,
    pub value: String,
    pub url: Option<String>,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub logurl: String,
    pub job_details: Vec<JobInfoItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceData {
    pub logurl: String,
    pub performance_data: Vec<Value>,
}

/// One named artifact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    TextLogSummary(TextLogSummary),
    JobInfo(JobInfo),
    PerformanceData(PerformanceData),
    BugSuggestions(Vec<BugSuggestion>),
}

impl Artifact {
    pub fn as_text_log_summary(&self) -> Option<&TextLogSummary> {
        match self {
            Artifact::TextLogSummary(summary) => Some(summary),
            _ => None,
        }
    }
}

/// The artifacts of a log, by name.
pub type ArtifactMap = BTreeMap<String, Artifact>;

/// A test result status, the serialized form is upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Status {
    Pass,
    Fail,
    Ok,
    Error,
    Timeout,
    Crash,
    Assert,
    Skip,
    Notrun,
}

impl TryFrom<String> for Status {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, UnknownValue> {
        match value.to_ascii_uppercase().as_str() {
            "PASS" => Ok(Status::Pass),
            "FAIL" => Ok(Status::Fail),
            "OK" => Ok(Status::Ok),
            "ERROR" => Ok(Status::Error),
            "TIMEOUT" => Ok(Status::Timeout),
            "CRASH" => Ok(Status::Crash),
            "ASSERT" => Ok(Status::Assert),
            "SKIP" => Ok(Status::Skip),
            "NOTRUN" => Ok(Status::Notrun),
            _ => Err(UnknownValue {
                kind: "status",
                value,
            }),
        }
    }
}

/// A log message level, the serialized form is lower case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Level {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl TryFrom<String> for Level {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, UnknownValue> {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Ok(Level::Critical),
            "error" => Ok(Level::Error),
            "warning" => Ok(Level::Warning),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            _ => Err(UnknownValue {
                kind: "level",
                value,
            }),
        }
    }
}

/// The structured failure records, keyed on the mozlog `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    TestResult {
        test: String,
        #[serde(default)]
        subtest: Option<String>,
        status: Status,
        #[serde(default)]
        expected: Option<Status>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        stack: Option<String>,
    },
    Log {
        level: Level,
        message: String,
    },
    Crash {
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        test: Option<String>,
        #[serde(default)]
        stack: Option<String>,
        #[serde(default)]
        stackwalk_stdout: Option<String>,
        #[serde(default)]
        stackwalk_stderr: Option<String>,
    },
    Truncated,
    GroupResult {
        group: String,
        status: Status,
        #[serde(default)]
        duration: Option<Value>,
    },
}

/// The longest group duration that is considered valid, in milliseconds.
const MAX_GROUP_DURATION_MS: f64 = 2.0 * 3600.0 * 1000.0;

/// The longest group path that is kept.
const MAX_GROUP_LENGTH: usize = 255;

impl Action {
    /// The group duration in whole seconds, 0 when it is missing or out of range.
    pub fn duration_secs(&self) -> u64 {
        match self {
            Action::GroupResult {
                duration: Some(duration),
                ..
            } => match duration.as_f64() {
                Some(ms) if (0.0..=MAX_GROUP_DURATION_MS).contains(&ms) => (ms / 1000.0) as u64,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Check if the record can be stored, group paths must be short forward slash paths.
    pub fn is_valid(&self) -> bool {
        match self {
            Action::GroupResult { group, .. } => {
                !group.contains('\\') && group.chars().count() <= MAX_GROUP_LENGTH
            }
            _ => true,
        }
    }
}

/// A failure record, either a known action or an opaque value for unknown producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Known(Action),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureLine {
    pub line_number: usize,
    #[serde(flatten)]
    pub record: Record,
}

impl FailureLine {
    pub fn truncated(line_number: usize) -> FailureLine {
        FailureLine {
            line_number,
            record: Record::Known(Action::Truncated),
        }
    }

    pub fn action(&self) -> Option<&Action> {
        match &self.record {
            Record::Known(action) => Some(action),
            Record::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bug {
    pub id: u64,
    pub summary: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub crash_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bugs {
    #[serde(default)]
    pub open_recent: Vec<Bug>,
    #[serde(default)]
    pub all_others: Vec<Bug>,
}

impl Bugs {
    pub fn is_empty(&self) -> bool {
        self.open_recent.is_empty() && self.all_others.is_empty()
    }

    /// Add the bugs that are not already present.
    pub fn merge(&mut self, other: &Bugs) {
        for bug in &other.open_recent {
            if !self.contains(bug.id) {
                self.open_recent.push(bug.clone());
            }
        }
        for bug in &other.all_others {
            if !self.contains(bug.id) {
                self.all_others.push(bug.clone());
            }
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.open_recent
            .iter()
            .chain(self.all_others.iter())
            .any(|bug| bug.id == id)
    }
}

/// The bug suggestions of an error line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugSuggestion {
    pub search: String,
    pub search_terms: Vec<String>,
    pub bugs: Bugs,
    pub line_number: usize,
    pub path_end: Option<String>,
}

/// The parse status of a job log, as recorded by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobLogStatus {
    Pending,
    Parsed,
    Failed,
    SkippedSize,
}

impl std::fmt::Display for JobLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobLogStatus::Pending => "pending",
            JobLogStatus::Parsed => "parsed",
            JobLogStatus::Failed => "failed",
            JobLogStatus::SkippedSize => "skipped-size",
        })
    }
}

#[test]
fn test_step_result_codes() {
    let codes: Vec<&str> = (0..10).map(|c| StepResult::from_code(c).as_str()).collect();
    assert_eq!(
        codes,
        vec![
            "success",
            "testfailed",
            "busted",
            "skipped",
            "exception",
            "retry",
            "usercancel",
            "unknown",
            "superseded",
            "unknown"
        ]
    );
}

#[test]
fn test_step_serialization() {
    let mut step = Step::new("foo", 0, 1, parse_timestamp("2016-07-13 16:09:31"));
    step.add_error(ErrorLine::new(2, "TEST-UNEXPECTED-FAIL | a | b  \n"));
    step.finish(3, parse_timestamp("2016-07-13 16:10:01.5"), StepResult::Testfailed);
    assert_eq!(step.duration_secs, Some(30.5));
    assert_eq!(
        serde_json::to_value(&step).unwrap(),
        serde_json::json!({
            "name": "foo",
            "order": 0,
            "started_linenumber": 1,
            "finished_linenumber": 3,
            "started": "2016-07-13 16:09:31",
            "finished": "2016-07-13 16:10:01.500",
            "duration_secs": 30.5,
            "result": "testfailed",
            "errors": [{"line_number": 2, "line": "TEST-UNEXPECTED-FAIL | a | b"}],
            "error_count": 1,
        })
    );
    let decoded: Step = serde_json::from_value(serde_json::to_value(&step).unwrap()).unwrap();
    assert_eq!(decoded, step);
}

#[test]
fn test_invalid_timestamp() {
    assert_eq!(parse_timestamp("2016-13-13 16:09:31"), None);
    let mut step = Step::new("bad", 0, 1, parse_timestamp("2016-13-13 16:09:31"));
    step.finish(2, parse_timestamp("2016-07-13 16:10:01"), StepResult::Success);
    assert_eq!(step.duration_secs, None);
    assert!(step.finished.is_some());
}

#[test]
fn test_failure_line_json() {
    let line: FailureLine = serde_json::from_str(
        r#"{"action": "test_result", "test": "t.html", "status": "fail", "expected": "PASS", "line_number": 4}"#,
    )
    .unwrap();
    assert_eq!(
        line.action(),
        Some(&Action::TestResult {
            test: "t.html".into(),
            subtest: None,
            status: Status::Fail,
            expected: Some(Status::Pass),
            message: None,
            stack: None,
        })
    );
    let value = serde_json::to_value(&line).unwrap();
    assert_eq!(value["status"], "FAIL");
    assert_eq!(value["action"], "test_result");
    assert_eq!(value["line_number"], 4);

    assert_eq!(
        serde_json::to_value(FailureLine::truncated(36)).unwrap(),
        serde_json::json!({"action": "truncated", "line_number": 36})
    );

    let level: Level = serde_json::from_str("\"ERROR\"").unwrap();
    assert_eq!(level, Level::Error);
    assert_eq!(serde_json::to_string(&level).unwrap(), "\"error\"");
    assert!(serde_json::from_str::<Status>("\"MAYBE\"").is_err());
}

#[test]
fn test_group_duration() {
    let group = |duration: Value| Action::GroupResult {
        group: "dom/base".into(),
        status: Status::Ok,
        duration: Some(duration),
    };
    assert_eq!(group(serde_json::json!(12345)).duration_secs(), 12);
    assert_eq!(group(serde_json::json!(-1)).duration_secs(), 0);
    assert_eq!(group(serde_json::json!("12345")).duration_secs(), 0);
    assert_eq!(group(serde_json::json!(7_300_000)).duration_secs(), 0);
    assert_eq!(Action::Truncated.duration_secs(), 0);
}

#[test]
fn test_group_validity() {
    let group = |name: &str| Action::GroupResult {
        group: name.into(),
        status: Status::Ok,
        duration: None,
    };
    assert!(group("dom/base/test").is_valid());
    assert!(group(&"a".repeat(255)).is_valid());
    assert!(!group(&"a".repeat(256)).is_valid());
    assert!(!group("dom\\base\\test").is_valid());
    assert!(Action::Truncated.is_valid());
}

#[test]
fn test_test_result_stack() {
    let input = serde_json::json!({
        "line_number": 4,
        "action": "test_result",
        "test": "t",
        "status": "FAIL",
        "expected": "PASS",
        "stack": "frame0\nframe1",
    });
    let line: FailureLine = serde_json::from_value(input).unwrap();
    match line.action() {
        Some(Action::TestResult { stack, .. }) => {
            assert_eq!(stack.as_deref(), Some("frame0\nframe1"))
        }
        _ => panic!("bad action"),
    }
    let value = serde_json::to_value(&line).unwrap();
    assert_eq!(value["stack"], "frame0\nframe1");
    assert_eq!(serde_json::from_value::<FailureLine>(value).unwrap(), line);
}

#[test]
fn test_bugs_merge() {
    let bug = |id| Bug {
        id,
        summary: format!("bug {}", id),
        status: None,
        resolution: None,
        crash_signature: None,
    };
    let mut bugs = Bugs {
        open_recent: vec![bug(1)],
        all_others: vec![],
    };
    bugs.merge(&Bugs {
        open_recent: vec![bug(1), bug(2)],
        all_others: vec![bug(3), bug(2)],
    });
    assert_eq!(bugs.open_recent, vec![bug(1), bug(2)]);
    assert_eq!(bugs.all_others, vec![bug(3)]);
}

#[test]
fn test_job_log_status() {
    assert_eq!(
        serde_json::to_string(&JobLogStatus::SkippedSize).unwrap(),
        "\"skipped-size\""
    );
    assert_eq!(JobLogStatus::SkippedSize.to_string(), "skipped-size");
}
