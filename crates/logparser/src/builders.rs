// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the closed set of artifact builders.

use thiserror::Error;
use treeherder_artifacts::{Artifact, JOB_INFO, PERFORMANCE_DATA, TEXT_LOG_SUMMARY};

use crate::config::ParserConfig;
use crate::perf::PerformanceParser;
use crate::steps::StepParser;
use crate::tinderbox::TinderboxPrintParser;

/// The builder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    Text,
    JobInfo,
    Perf,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown builder: {0} (expected text, jobinfo or perf)")]
pub struct UnknownBuilder(pub String);

impl BuilderKind {
    /// The default set, in registration order.
    pub const ALL: [BuilderKind; 3] = [BuilderKind::Text, BuilderKind::JobInfo, BuilderKind::Perf];

    pub fn artifact_name(&self) -> &'static str {
        match self {
            BuilderKind::Text => TEXT_LOG_SUMMARY,
            BuilderKind::JobInfo => JOB_INFO,
            BuilderKind::Perf => PERFORMANCE_DATA,
        }
    }

    /// Parse a comma separated list, keeping the registration order and dropping duplicates.
    pub fn parse_list(s: &str) -> Result<Vec<BuilderKind>, UnknownBuilder> {
        let requested = s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<BuilderKind>, _>>()?;
        Ok(BuilderKind::ALL
            .into_iter()
            .filter(|kind| requested.contains(kind))
            .collect())
    }
}

impl std::str::FromStr for BuilderKind {
    type Err = UnknownBuilder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | TEXT_LOG_SUMMARY => Ok(BuilderKind::Text),
            "jobinfo" | JOB_INFO => Ok(BuilderKind::JobInfo),
            "perf" | PERFORMANCE_DATA => Ok(BuilderKind::Perf),
            _ => Err(UnknownBuilder(s.to_string())),
        }
    }
}

/// A line consumer that produces one artifact.
pub enum ArtifactBuilder {
    TextLogSummary(StepParser),
    JobInfo(TinderboxPrintParser),
    PerformanceData(PerformanceParser),
}

impl ArtifactBuilder {
    pub fn new(kind: BuilderKind, config: &ParserConfig) -> ArtifactBuilder {
        match kind {
            BuilderKind::Text => {
                ArtifactBuilder::TextLogSummary(StepParser::new(config.max_error_lines))
            }
            BuilderKind::JobInfo => ArtifactBuilder::JobInfo(TinderboxPrintParser::new()),
            BuilderKind::Perf => ArtifactBuilder::PerformanceData(PerformanceParser::new()),
        }
    }

    pub fn kind(&self) -> BuilderKind {
        match self {
            ArtifactBuilder::TextLogSummary(_) => BuilderKind::Text,
            ArtifactBuilder::JobInfo(_) => BuilderKind::JobInfo,
            ArtifactBuilder::PerformanceData(_) => BuilderKind::Perf,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().artifact_name()
    }

    /// A complete builder no longer needs lines.
    pub fn is_complete(&self) -> bool {
        match self {
            ArtifactBuilder::JobInfo(parser) => parser.complete,
            _ => false,
        }
    }

    pub fn parse_line(&mut self, line: &str, line_number: usize) -> anyhow::Result<()> {
        match self {
            ArtifactBuilder::TextLogSummary(parser) => parser.parse_line(line, line_number),
            ArtifactBuilder::JobInfo(parser) => parser.parse_line(line, line_number),
            ArtifactBuilder::PerformanceData(parser) => parser.parse_line(line, line_number)?,
        }
        Ok(())
    }

    pub fn finish_parse(&mut self, last_line_number: usize) {
        match self {
            ArtifactBuilder::TextLogSummary(parser) => parser.finish_parse(last_line_number),
            ArtifactBuilder::JobInfo(parser) => parser.finish_parse(last_line_number),
            ArtifactBuilder::PerformanceData(_) => {}
        }
    }

    pub fn get_artifact(&self, logurl: &str) -> Artifact {
        match self {
            ArtifactBuilder::TextLogSummary(parser) => {
                Artifact::TextLogSummary(parser.get_artifact(logurl))
            }
            ArtifactBuilder::JobInfo(parser) => Artifact::JobInfo(parser.get_artifact(logurl)),
            ArtifactBuilder::PerformanceData(parser) => {
                Artifact::PerformanceData(parser.get_artifact(logurl))
            }
        }
    }
}

#[test]
fn test_builder_kind() {
    assert_eq!(BuilderKind::parse_list("text,jobinfo,perf").unwrap(), BuilderKind::ALL);
    assert_eq!(
        BuilderKind::parse_list("perf, text,perf").unwrap(),
        vec![BuilderKind::Text, BuilderKind::Perf]
    );
    assert_eq!(
        BuilderKind::parse_list("Job Info").unwrap(),
        vec![BuilderKind::JobInfo]
    );
    assert_eq!(
        BuilderKind::parse_list("text,html"),
        Err(UnknownBuilder("html".into()))
    );
}

#[test]
fn test_builder_dispatch() {
    let config = ParserConfig::default();
    let mut builders: Vec<ArtifactBuilder> = BuilderKind::ALL
        .iter()
        .map(|kind| ArtifactBuilder::new(*kind, &config))
        .collect();
    for builder in builders.iter_mut() {
        builder
            .parse_line("TinderboxPrint: abort: done", 1)
            .unwrap();
        builder.finish_parse(1);
    }
    let names: Vec<&str> = builders.iter().map(|b| b.name()).collect();
    assert_eq!(names, vec!["text_log_summary", "Job Info", "performance_data"]);
    assert!(builders[1].is_complete());
    match builders[0].get_artifact("log") {
        Artifact::TextLogSummary(summary) => assert_eq!(summary.step_data.all_errors.len(), 0),
        _ => panic!("unexpected artifact"),
    }
}
