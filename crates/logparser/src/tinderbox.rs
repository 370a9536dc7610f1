// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the job details parser.

use lazy_static::lazy_static;
use regex::Regex;
use treeherder_artifacts::{ContentType, JobInfo, JobInfoItem};

lazy_static! {
    static ref TINDERBOX_PRINT: Regex = Regex::new(r"^.*TinderboxPrint: (.+)$").unwrap();
}

pub struct TinderboxPrintParser {
    items: Vec<JobInfoItem>,
    pub complete: bool,
}

/// Decode a TinderboxPrint payload.
pub fn parse_payload(payload: &str) -> JobInfoItem {
    if let Some(link) = payload.strip_prefix("link:") {
        let mut parts = link.splitn(2, ':');
        if let (Some(label), Some(url)) = (parts.next(), parts.next()) {
            return JobInfoItem {
                title: Some(label.to_string()),
                value: label.to_string(),
                url: Some(url.to_string()),
                content_type: ContentType::Link,
            };
        }
    }
    match payload.strip_prefix("raw_html:") {
        Some(html) => JobInfoItem {
            title: None,
            value: html.to_string(),
            url: None,
            content_type: ContentType::RawHtml,
        },
        None => JobInfoItem {
            title: None,
            value: payload.to_string(),
            url: None,
            content_type: ContentType::Text,
        },
    }
}

impl TinderboxPrintParser {
    pub fn new() -> TinderboxPrintParser {
        TinderboxPrintParser {
            items: Vec::new(),
            complete: false,
        }
    }

    pub fn parse_line(&mut self, line: &str, _line_number: usize) {
        if self.complete {
            return;
        }
        if let Some(payload) = TINDERBOX_PRINT.captures(line).and_then(|cap| cap.get(1)) {
            self.items.push(parse_payload(payload.as_str()));
        }
    }

    /// The end of the log is the completion marker.
    pub fn finish_parse(&mut self, _last_line_number: usize) {
        self.complete = true;
    }

    pub fn get_artifact(&self, logurl: &str) -> JobInfo {
        JobInfo {
            logurl: logurl.to_string(),
            job_details: self.items.clone(),
        }
    }
}

impl Default for TinderboxPrintParser {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn test_parse_payload() {
    assert_eq!(
        parse_payload("link:Build log:https://example.com/log?a=b:c"),
        JobInfoItem {
            title: Some("Build log".into()),
            value: "Build log".into(),
            url: Some("https://example.com/log?a=b:c".into()),
            content_type: ContentType::Link,
        }
    );
    assert_eq!(
        parse_payload("raw_html:<a href='x'>x</a>"),
        JobInfoItem {
            title: None,
            value: "<a href='x'>x</a>".into(),
            url: None,
            content_type: ContentType::RawHtml,
        }
    );
    assert_eq!(parse_payload("link:no-url").content_type, ContentType::Text);
    assert_eq!(parse_payload("link:no-url").value, "link:no-url");
    assert_eq!(parse_payload("hello: world").value, "hello: world");
}

#[test]
fn test_tinderbox_parser() {
    let mut parser = TinderboxPrintParser::new();
    for (idx, line) in [
        "08:00:00     INFO -  TinderboxPrint: mochitest-plain<br/>123/0/4",
        "TinderboxPrint: ",
        "no print here",
        "[task 2016] TinderboxPrint: link:artifact:https://example.com/a.zip",
    ]
    .iter()
    .enumerate()
    {
        parser.parse_line(line, idx + 1)
    }
    parser.finish_parse(4);
    parser.parse_line("TinderboxPrint: after the end", 5);

    let artifact = parser.get_artifact("http://localhost/log");
    let values: Vec<&str> = artifact
        .job_details
        .iter()
        .map(|item| item.value.as_str())
        .collect();
    assert_eq!(values, vec!["mochitest-plain<br/>123/0/4", "artifact"]);
    assert_eq!(
        artifact.job_details[1].url.as_deref(),
        Some("https://example.com/a.zip")
    );
}
