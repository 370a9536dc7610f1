// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the performance data parser.
//!
//! Payloads follow `PERFHERDER_DATA:` (one object) or `TALOSDATA:` (a list of objects).
//! They are kept verbatim once they pass the perfherder schema check.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use treeherder_artifacts::PerformanceData;

const PERFHERDER_MARKER: &str = "PERFHERDER_DATA:";
const TALOS_MARKER: &str = "TALOSDATA:";

#[derive(Error, Debug)]
pub enum PerfError {
    #[error("invalid json: {0}")]
    BadJSON(#[from] serde_json::Error),

    #[error("schema validation failure: {0}")]
    Schema(String),
}

#[derive(Deserialize)]
struct PerfherderPayload {
    framework: Framework,
    suites: Vec<Suite>,
}

#[derive(Deserialize)]
struct Framework {
    name: String,
}

#[derive(Deserialize)]
struct Suite {
    name: String,
    subtests: Vec<Subtest>,
}

#[derive(Deserialize)]
struct Subtest {
    name: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    replicates: Option<Vec<f64>>,
}

/// Check a payload against the perfherder schema.
pub fn validate(payload: &Value) -> Result<(), PerfError> {
    let payload = PerfherderPayload::deserialize(payload)
        .map_err(|e| PerfError::Schema(e.to_string()))?;
    if payload.framework.name.is_empty() {
        return Err(PerfError::Schema("empty framework name".into()));
    }
    if payload.suites.is_empty() {
        return Err(PerfError::Schema("no suites".into()));
    }
    for suite in &payload.suites {
        if suite.name.is_empty() {
            return Err(PerfError::Schema("empty suite name".into()));
        }
        for subtest in &suite.subtests {
            if subtest.name.is_empty() {
                return Err(PerfError::Schema(format!("{}: empty subtest name", suite.name)));
            }
            if subtest.value.is_none() && subtest.replicates.is_none() {
                return Err(PerfError::Schema(format!(
                    "{}/{}: missing value",
                    suite.name, subtest.name
                )));
            }
        }
    }
    Ok(())
}

fn parse_payload(data: &str) -> Result<Value, PerfError> {
    let value: Value = serde_json::from_str(data.trim())?;
    validate(&value)?;
    Ok(value)
}

pub struct PerformanceParser {
    artifacts: Vec<Value>,
    strict_talos: bool,
}

impl PerformanceParser {
    pub fn new() -> PerformanceParser {
        PerformanceParser {
            artifacts: Vec::new(),
            strict_talos: false,
        }
    }

    /// A parser that reports invalid talos payloads instead of dropping them.
    pub fn new_strict() -> PerformanceParser {
        PerformanceParser {
            artifacts: Vec::new(),
            strict_talos: true,
        }
    }

    pub fn parse_line(&mut self, line: &str, line_number: usize) -> Result<(), PerfError> {
        if let Some(pos) = line.find(PERFHERDER_MARKER) {
            match parse_payload(&line[pos + PERFHERDER_MARKER.len()..]) {
                Ok(value) => self.artifacts.push(value),
                Err(e) => tracing::debug!(line_number, "Dropping perfherder payload: {}", e),
            }
        } else if let Some(pos) = line.find(TALOS_MARKER) {
            self.parse_talos(&line[pos + TALOS_MARKER.len()..], line_number)?;
        }
        Ok(())
    }

    fn parse_talos(&mut self, data: &str, line_number: usize) -> Result<(), PerfError> {
        let values: Vec<Value> = match serde_json::from_str(data.trim()) {
            Ok(values) => values,
            Err(e) if self.strict_talos => return Err(e.into()),
            Err(e) => {
                tracing::debug!(line_number, "Dropping talos data: {}", e);
                return Ok(());
            }
        };
        for value in values {
            match validate(&value) {
                Ok(()) => self.artifacts.push(value),
                Err(e) if self.strict_talos => return Err(e),
                Err(e) => tracing::debug!(line_number, "Dropping talos payload: {}", e),
            }
        }
        Ok(())
    }

    pub fn get_artifact(&self, logurl: &str) -> PerformanceData {
        PerformanceData {
            logurl: logurl.to_string(),
            performance_data: self.artifacts.clone(),
        }
    }
}

impl Default for PerformanceParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"framework":{"name":"talos"},"suites":[{"name":"basic_compositor_video","subtests":[{"name":"240p","value":1234}]}]}"#;

    #[test]
    fn test_perfherder_lines() {
        let mut parser = PerformanceParser::new();
        for (idx, line) in [
            "PERFHERDER_DATA: {oh noes i am not valid json}".to_string(),
            "PERFHERDER_DATA: {}".to_string(),
            format!("PERFHERDER_DATA: {}", VALID),
        ]
        .iter()
        .enumerate()
        {
            parser.parse_line(line, idx + 1).unwrap();
        }
        let artifact = parser.get_artifact("http://localhost/log");
        assert_eq!(
            artifact.performance_data,
            vec![serde_json::from_str::<Value>(VALID).unwrap()]
        );
    }

    #[test]
    fn test_validate() {
        let check = |s: &str| validate(&serde_json::from_str(s).unwrap()).is_ok();
        assert!(check(VALID));
        assert!(check(
            r#"{"framework":{"name":"t"},"suites":[{"name":"s","subtests":[{"name":"a","replicates":[1, 2.5]}]}]}"#
        ));
        assert!(check(
            r#"{"framework":{"name":"t"},"suites":[{"name":"s","value":3,"subtests":[]}]}"#
        ));
        assert!(!check(r#"{"framework":{"name":""},"suites":[{"name":"s","subtests":[]}]}"#));
        assert!(!check(r#"{"framework":{"name":"t"},"suites":[]}"#));
        assert!(!check(r#"{"framework":{"name":"t"},"suites":[{"name":"s"}]}"#));
        assert!(!check(
            r#"{"framework":{"name":"t"},"suites":[{"name":"s","subtests":[{"name":"a"}]}]}"#
        ));
        assert!(!check(
            r#"{"framework":{"name":"t"},"suites":[{"name":"s","subtests":[{"name":"a","value":"fast"}]}]}"#
        ));
    }

    #[test]
    fn test_talos() {
        let line = format!("INFO - TALOSDATA: [{}, {{}}]", VALID);
        let mut parser = PerformanceParser::new();
        parser.parse_line(&line, 1).unwrap();
        parser.parse_line("TALOSDATA: [not json", 2).unwrap();
        assert_eq!(parser.get_artifact("").performance_data.len(), 1);

        let mut strict = PerformanceParser::new_strict();
        assert!(matches!(
            strict.parse_line(&line, 1),
            Err(PerfError::Schema(_))
        ));
        assert!(matches!(
            strict.parse_line("TALOSDATA: [not json", 2),
            Err(PerfError::BadJSON(_))
        ));
    }
}
