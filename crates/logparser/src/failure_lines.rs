// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module reads the structured error summary logs: one mozlog JSON object per line.

use serde_json::Value;
use std::io::Read;
use treeherder_artifacts::{Action, FailureLine, Record};
use treeherder_iterator::{bytes_to_string, BytesLines};

use crate::collection::CancelToken;
use crate::env::Env;
use crate::errors::Error;
use crate::reader::Input;

const KNOWN_ACTIONS: [&str; 5] = ["test_result", "log", "crash", "truncated", "group_result"];

/// Decode a single record, returns None for lines that are not valid records.
pub fn parse_failure_line(line: &str, position: usize) -> Option<FailureLine> {
    let mut value: Value = match serde_json::from_str(line) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            tracing::warn!(position, "Skipping non object failure line");
            return None;
        }
        Err(e) => {
            tracing::warn!(position, "Skipping malformed failure line: {}", e);
            return None;
        }
    };
    let line_number = value
        .get("line")
        .and_then(Value::as_u64)
        .map_or(position, |n| n as usize);
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);
    let record = match action {
        Some(action) if KNOWN_ACTIONS.contains(&action.as_str()) => {
            value["action"] = Value::String(action);
            match serde_json::from_value::<Action>(value) {
                Ok(action) if action.is_valid() => Record::Known(action),
                Ok(_) => {
                    tracing::warn!(position, "Skipping invalid group result");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(position, "Skipping invalid failure line: {}", e);
                    return None;
                }
            }
        }
        Some(_) => {
            // The line number is set by the reader.
            if let Some(map) = value.as_object_mut() {
                map.remove("line_number");
                map.remove("line");
            }
            Record::Other(value)
        }
        None => {
            tracing::warn!(position, "Skipping failure line without action");
            return None;
        }
    };
    Some(FailureLine {
        line_number,
        record,
    })
}

/// Read the failure lines, keeping at most `cutoff` records.
/// When more records are available, a synthetic truncated record is added.
pub fn read_failure_lines<R: Read>(
    reader: R,
    cutoff: usize,
    cancel: &CancelToken,
) -> Result<Vec<FailureLine>, Error> {
    let mut result = Vec::new();
    for line in BytesLines::new(reader) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (bytes, position) = line?;
        let text = bytes_to_string(&bytes);
        if text.trim().is_empty() {
            continue;
        }
        if let Some(failure_line) = parse_failure_line(&text, position) {
            if result.len() == cutoff {
                result.push(FailureLine::truncated(failure_line.line_number));
                break;
            }
            result.push(failure_line);
        }
    }
    Ok(result)
}

#[tracing::instrument(level = "debug", skip(env, input, cancel), fields(input = %input))]
pub fn parse_failure_lines(
    env: &Env,
    input: &Input,
    cancel: &CancelToken,
) -> Result<Vec<FailureLine>, Error> {
    let reader = input.open(env)?;
    let lines = read_failure_lines(reader, env.config.failure_lines_cutoff, cancel)?;
    tracing::info!(records = lines.len(), "Read failure lines of {}", input);
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeherder_artifacts::{Level, Status};

    fn read(log: &str, cutoff: usize) -> Vec<FailureLine> {
        read_failure_lines(std::io::Cursor::new(log.to_string()), cutoff, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_failure_lines() {
        let lines = read(
            r#"{"action": "test_result", "test": "a.html", "subtest": "s", "status": "FAIL", "expected": "PASS", "message": "boom", "line": 12}
not json
{"action": "log", "level": "ERROR", "message": "oops"}
{"action": "crash", "signature": "foo::bar", "test": "a.html"}
{"action": "test_groups", "groups": ["dom/base"]}
{"action": "group_result", "group": "dom/base", "status": "ok", "duration": 1500}
{"action": "test_result", "status": "FAIL"}
{"no": "action"}
"#,
            10,
        );
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].line_number, 12);
        assert_eq!(
            lines[0].action(),
            Some(&Action::TestResult {
                test: "a.html".into(),
                subtest: Some("s".into()),
                status: Status::Fail,
                expected: Some(Status::Pass),
                message: Some("boom".into()),
                stack: None,
            })
        );
        assert_eq!(lines[1].line_number, 3);
        assert_eq!(
            lines[1].action(),
            Some(&Action::Log {
                level: Level::Error,
                message: "oops".into()
            })
        );
        assert!(matches!(
            lines[2].action(),
            Some(Action::Crash { signature: Some(s), .. }) if s == "foo::bar"
        ));
        assert_eq!(lines[3].action(), None);
        assert_eq!(
            serde_json::to_value(&lines[3]).unwrap(),
            serde_json::json!({"action": "test_groups", "groups": ["dom/base"], "line_number": 5})
        );
        assert_eq!(lines[4].action().map(Action::duration_secs), Some(1));
    }

    #[test]
    fn test_cutoff() {
        let log: String = (0..5)
            .map(|i| format!("{{\"action\": \"log\", \"level\": \"info\", \"message\": \"m{}\"}}\n", i))
            .collect();
        let lines = read(&log, 3);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], FailureLine::truncated(4));

        let exact = read(&log, 5);
        assert_eq!(exact.len(), 5);
        assert!(exact.iter().all(|l| l.action() != Some(&Action::Truncated)));
    }

    #[test]
    fn test_action_case() {
        let lines = read(
            "{\"action\": \"TEST_RESULT\", \"test\": \"t\", \"status\": \"pass\"}\n",
            10,
        );
        assert!(matches!(
            lines[0].action(),
            Some(Action::TestResult { status: Status::Pass, .. })
        ));
    }

    #[test]
    fn test_other_action_line_number() {
        let line =
            parse_failure_line(r#"{"action":"test_groups","line_number":9,"groups":[]}"#, 3)
                .unwrap();
        assert_eq!(line.line_number, 3);
        assert_eq!(
            serde_json::to_string(&line).unwrap(),
            r#"{"line_number":3,"action":"test_groups","groups":[]}"#
        );

        let line = parse_failure_line(r#"{"action":"suite_end","line":7}"#, 1).unwrap();
        assert_eq!(line.line_number, 7);
        assert_eq!(
            serde_json::to_value(&line).unwrap(),
            serde_json::json!({"line_number": 7, "action": "suite_end"})
        );
    }

    #[test]
    fn test_test_result_stack() {
        let line = parse_failure_line(
            r#"{"action":"test_result","test":"t","status":"FAIL","expected":"PASS","stack":"frame0\nframe1"}"#,
            4,
        )
        .unwrap();
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["line_number"], 4);
        assert_eq!(value["stack"], "frame0\nframe1");
    }

    #[test]
    fn test_invalid_group_result() {
        let long = "a".repeat(256);
        let log = format!(
            "{{\"action\": \"group_result\", \"group\": \"dom\\\\base\", \"status\": \"OK\"}}\n\
             {{\"action\": \"group_result\", \"group\": \"{}\", \"status\": \"OK\"}}\n\
             {{\"action\": \"group_result\", \"group\": \"dom/base\", \"status\": \"OK\"}}\n",
            long
        );
        let lines = read(&log, 10);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line_number, 3);
        assert!(matches!(
            lines[0].action(),
            Some(Action::GroupResult { group, .. }) if group == "dom/base"
        ));
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = read_failure_lines(std::io::Cursor::new("{}\n"), 10, &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
