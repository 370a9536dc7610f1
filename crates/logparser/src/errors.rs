// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the error taxonomy of a parse run.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use treeherder_artifacts::JobLogStatus;

/// The reasons a parse run did not produce artifacts.
#[derive(Error, Debug)]
pub enum Error {
    #[error("can't fetch {url}: {reason}")]
    Fetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("log exceeds the {limit} bytes limit")]
    LogSize { limit: u64 },

    #[error("parse cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("read error: {0}")]
    Io(std::io::Error),

    #[error("all builders failed: {0:?}")]
    AllBuildersFailed(Vec<BuilderFailure>),
}

/// The marker carried by the io error of a reader that went over its limit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("size limit of {limit} bytes exceeded")]
pub struct SizeExceeded {
    pub limit: u64,
}

/// A builder that crashed, its artifact is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderFailure {
    pub builder: String,
    pub reason: String,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<SizeExceeded>())
        {
            Some(exceeded) => Error::LogSize {
                limit: exceeded.limit,
            },
            None => Error::Io(e),
        }
    }
}

impl Error {
    pub(crate) fn from_ureq(url: &str, e: ureq::Error) -> Error {
        match e {
            ureq::Error::Status(status, resp) => Error::Fetch {
                url: url.to_string(),
                status: Some(status),
                reason: format!("HTTP {} {}", status, resp.status_text()),
            },
            ureq::Error::Transport(transport) => Error::Fetch {
                url: url.to_string(),
                status: None,
                reason: transport.to_string(),
            },
        }
    }

    /// The http status of a failed fetch.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if running the parse again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch {
                status: Some(403 | 404),
                ..
            } => false,
            Error::Fetch { .. } | Error::Io(_) => true,
            Error::LogSize { .. }
            | Error::Cancelled
            | Error::InvalidUrl(_)
            | Error::AllBuildersFailed(_) => false,
        }
    }

    /// The status the caller records for the job log.
    pub fn job_log_status(&self) -> JobLogStatus {
        match self {
            Error::LogSize { .. } => JobLogStatus::SkippedSize,
            _ => JobLogStatus::Failed,
        }
    }

    /// The process exit code of the command line.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Fetch { .. } | Error::InvalidUrl(_) | Error::Io(_) => 2,
            Error::LogSize { .. } => 3,
            Error::Cancelled => 4,
            Error::AllBuildersFailed(_) => 1,
        }
    }
}

#[test]
fn test_io_conversion() {
    let size = std::io::Error::new(
        std::io::ErrorKind::Other,
        SizeExceeded { limit: 42 },
    );
    assert!(matches!(Error::from(size), Error::LogSize { limit: 42 }));
    let other = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert!(matches!(Error::from(other), Error::Io(_)));
}

#[test]
fn test_error_policy() {
    let fetch = |status| Error::Fetch {
        url: "http://localhost/log".into(),
        status,
        reason: "oops".into(),
    };
    assert!(!fetch(Some(404)).is_retryable());
    assert!(!fetch(Some(403)).is_retryable());
    assert!(fetch(Some(500)).is_retryable());
    assert!(fetch(None).is_retryable());
    assert_eq!(fetch(Some(404)).job_log_status(), JobLogStatus::Failed);
    assert_eq!(fetch(Some(500)).exit_code(), 2);

    let size = Error::LogSize { limit: 1 };
    assert!(!size.is_retryable());
    assert_eq!(size.job_log_status(), JobLogStatus::SkippedSize);
    assert_eq!(size.exit_code(), 3);
    assert_eq!(Error::Cancelled.exit_code(), 4);
    assert_eq!(Error::AllBuildersFailed(vec![]).exit_code(), 1);
}
