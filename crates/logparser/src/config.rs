// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the parser configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid file: {0}")]
    BadFile(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    BadJSON(#[from] serde_json::Error),

    #[error("invalid yaml: {0}")]
    BadYAML(#[from] serde_yaml::Error),

    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("invalid value for {name}: {value}")]
    BadValue { name: String, value: String },
}

/// The parser limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ParserConfig {
    /// The maximum inflated size of a log, in bytes.
    pub max_log_size: u64,
    /// Lines are truncated to this length, unless they contain a performance marker.
    pub max_line_length: usize,
    /// The maximum number of error lines recorded per log.
    pub max_error_lines: usize,
    /// The maximum number of error lines turned into bug suggestions.
    pub max_summary_lines: usize,
    /// The maximum number of structured failure lines.
    pub failure_lines_cutoff: usize,
    /// The bug cache search endpoint.
    pub bugscache_url: Option<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_log_size: 200 * 1024 * 1024,
            max_line_length: 500,
            max_error_lines: 100,
            max_summary_lines: 200,
            failure_lines_cutoff: 35,
            bugscache_url: None,
        }
    }
}

impl ParserConfig {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        ParserConfig::from_reader(path, file)
    }

    fn from_reader<R: std::io::Read>(path: &Path, mut file: R) -> Result<Self, Error> {
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        if content.trim().is_empty() {
            return Ok(ParserConfig::default());
        }
        match path.extension().and_then(std::ffi::OsStr::to_str) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            m_ext => Err(Error::UnknownFormat(
                m_ext.map(|s| s.to_string()).unwrap_or_default(),
            )),
        }
    }

    /// Apply the process environment overrides.
    pub fn with_env(self) -> Result<Self, Error> {
        self.with_lookup(|name| std::env::var(name).ok())
    }

    fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        if let Some(v) = lookup("PARSER_MAX_LOG_SIZE") {
            self.max_log_size = parse_value("PARSER_MAX_LOG_SIZE", &v)?;
        }
        if let Some(v) = lookup("PARSER_MAX_STEP_ERROR_LINES") {
            self.max_error_lines = parse_value("PARSER_MAX_STEP_ERROR_LINES", &v)?;
        }
        if let Some(v) = lookup("PARSER_MAX_SUMMARY_LINES") {
            self.max_summary_lines = parse_value("PARSER_MAX_SUMMARY_LINES", &v)?;
        }
        if let Some(v) = lookup("FAILURE_LINES_CUTOFF") {
            self.failure_lines_cutoff = parse_value("FAILURE_LINES_CUTOFF", &v)?;
        }
        if let Some(v) = lookup("TREEHERDER_BUGSCACHE_URL") {
            self.bugscache_url = Some(v);
        }
        Ok(self)
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::BadValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
fn config_from_yaml(yaml: &str) -> Result<ParserConfig, Error> {
    ParserConfig::from_reader(Path::new("config.yaml"), std::io::Cursor::new(yaml))
}

#[test]
fn test_config_default() {
    let config = config_from_yaml("").unwrap();
    assert_eq!(config, ParserConfig::default());
    assert_eq!(config.max_error_lines, 100);
    assert_eq!(config.max_line_length, 500);
}

#[test]
fn test_config_yaml() {
    let config = config_from_yaml(
        "
max_error_lines: 5
bugscache_url: http://localhost/bugs
",
    )
    .unwrap();
    assert_eq!(config.max_error_lines, 5);
    assert_eq!(config.failure_lines_cutoff, 35);
    assert_eq!(config.bugscache_url.as_deref(), Some("http://localhost/bugs"));
}

#[test]
fn test_config_bad() {
    assert!(config_from_yaml("unknown: true").is_err());
    assert!(ParserConfig::from_reader(
        Path::new("config.json"),
        std::io::Cursor::new("{\"unknown\": true}")
    )
    .is_err());
    assert!(matches!(
        ParserConfig::from_reader(Path::new("config.toml"), std::io::Cursor::new("a = 1")),
        Err(Error::UnknownFormat(ext)) if ext == "toml"
    ));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parser.json");
    std::fs::write(&path, "{\"failure_lines_cutoff\": 10}").unwrap();
    let config = ParserConfig::from_path(&path).unwrap();
    assert_eq!(config.failure_lines_cutoff, 10);
    assert!(ParserConfig::from_path(&dir.path().join("missing.json")).is_err());
}

#[test]
fn test_config_env() {
    let env = |name: &str| match name {
        "PARSER_MAX_SUMMARY_LINES" => Some("12".to_string()),
        "FAILURE_LINES_CUTOFF" => Some(" 7 ".to_string()),
        _ => None,
    };
    let config = ParserConfig::default().with_lookup(env).unwrap();
    assert_eq!(config.max_summary_lines, 12);
    assert_eq!(config.failure_lines_cutoff, 7);
    assert_eq!(config.max_error_lines, 100);

    let bad = ParserConfig::default().with_lookup(|name| {
        (name == "PARSER_MAX_LOG_SIZE").then(|| "big".to_string())
    });
    assert!(matches!(bad, Err(Error::BadValue { .. })));
}
