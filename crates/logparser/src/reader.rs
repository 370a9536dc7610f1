// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the log source: a size limited, transparent decompression reader.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use url::Url;

use crate::env::Env;
use crate::errors::{Error, SizeExceeded};

/// The log content stream.
pub type LogReader = Box<dyn Read + Send>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Url(String),
    Path(PathBuf),
}

impl Input {
    pub fn from_string(s: String) -> Input {
        match s.starts_with("http://") || s.starts_with("https://") {
            true => Input::Url(s),
            false => Input::Path(s.into()),
        }
    }

    /// The identity of the log in the artifacts.
    pub fn logurl(&self) -> String {
        match self {
            Input::Url(url) => url.clone(),
            Input::Path(path) => path.to_string_lossy().into_owned(),
        }
    }

    pub fn open(&self, env: &Env) -> Result<LogReader, Error> {
        match self {
            Input::Url(url) => from_url(env, url),
            Input::Path(path) => from_path(path, env.config.max_log_size),
        }
    }
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.logurl())
    }
}

/// Open a local log, plain or gzip.
pub fn from_path(path: &Path, limit: u64) -> Result<LogReader, Error> {
    let file = File::open(path)?;
    Ok(decompress(file, limit)?)
}

/// Fetch a remote log.
#[tracing::instrument(level = "debug", skip(env))]
pub fn from_url(env: &Env, url: &str) -> Result<LogReader, Error> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_authority() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    let limit = env.config.max_log_size;
    let resp = env
        .client
        .request_url("GET", &parsed)
        .call()
        .map_err(|e| Error::from_ureq(url, e))?;
    if let Some(length) = resp
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        if length > limit {
            tracing::info!(url, length, limit, "Skipping oversized log");
            return Err(Error::LogSize { limit });
        }
    }
    Ok(decompress(resp.into_reader(), limit)?)
}

/// Peek at the first bytes to detect gzip content, and enforce the inflated size limit.
pub fn decompress<R: Read + Send + 'static>(mut reader: R, limit: u64) -> std::io::Result<LogReader> {
    let mut head = [0u8; 2];
    let mut len = 0;
    while len < head.len() {
        match reader.read(&mut head[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let reader = Cursor::new(head[..len].to_vec()).chain(reader);
    Ok(if head[..len] == GZIP_MAGIC {
        Box::new(SizeLimit::new(MultiGzDecoder::new(reader), limit))
    } else {
        Box::new(SizeLimit::new(reader, limit))
    })
}

/// A reader that fails once more than `limit` bytes went through.
pub struct SizeLimit<R> {
    inner: R,
    limit: u64,
    count: u64,
}

impl<R: Read> SizeLimit<R> {
    pub fn new(inner: R, limit: u64) -> SizeLimit<R> {
        SizeLimit {
            inner,
            limit,
            count: 0,
        }
    }
}

impl<R: Read> Read for SizeLimit<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        if self.count > self.limit {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                SizeExceeded { limit: self.limit },
            ))
        } else {
            Ok(n)
        }
    }
}

#[cfg(test)]
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;

    fn read_all(mut reader: LogReader) -> Result<String, Error> {
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        Ok(s)
    }

    fn test_env(max_log_size: u64) -> Env {
        Env::new(ParserConfig {
            max_log_size,
            ..ParserConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_decompress() {
        let plain = decompress(Cursor::new(b"hello\nworld".to_vec()), 100).unwrap();
        assert_eq!(read_all(plain).unwrap(), "hello\nworld");

        let gz = decompress(Cursor::new(gzip(b"hello\ngzip")), 100).unwrap();
        assert_eq!(read_all(gz).unwrap(), "hello\ngzip");

        let tiny = decompress(Cursor::new(b"x".to_vec()), 100).unwrap();
        assert_eq!(read_all(tiny).unwrap(), "x");
    }

    #[test]
    fn test_size_limit() {
        let data = "a".repeat(1000);
        let exact = decompress(Cursor::new(data.clone().into_bytes()), 1000).unwrap();
        assert_eq!(read_all(exact).unwrap().len(), 1000);

        let over = decompress(Cursor::new(gzip(data.as_bytes())), 999).unwrap();
        assert!(matches!(read_all(over), Err(Error::LogSize { limit: 999 })));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("log.txt");
        std::fs::write(&plain, "plain log").unwrap();
        let gz = dir.path().join("log.txt.gz");
        std::fs::write(&gz, gzip(b"gzip log")).unwrap();

        assert_eq!(read_all(from_path(&plain, 100).unwrap()).unwrap(), "plain log");
        assert_eq!(read_all(from_path(&gz, 100).unwrap()).unwrap(), "gzip log");
        assert!(matches!(
            from_path(&dir.path().join("missing"), 100),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_input() {
        assert_eq!(
            Input::from_string("https://localhost/log".into()),
            Input::Url("https://localhost/log".into())
        );
        assert_eq!(
            Input::from_string("/tmp/log.gz".into()),
            Input::Path("/tmp/log.gz".into())
        );
        assert_eq!(Input::Path("/tmp/log".into()).logurl(), "/tmp/log");
    }

    #[test]
    fn test_from_url() {
        let mut server = mockito::Server::new();
        let plain = server
            .mock("GET", "/plain.log")
            .with_body("line 1\nline 2\n")
            .create();
        let gz = server
            .mock("GET", "/magic.log")
            .with_header("Content-Type", "application/octet-stream")
            .with_body(gzip(b"gzip by magic\n"))
            .create();
        let encoded = server
            .mock("GET", "/encoded.log")
            .with_header("Content-Encoding", "gzip")
            .with_body(gzip(b"gzip by header\n"))
            .create();
        server.mock("GET", "/missing.log").with_status(404).create();
        server.mock("GET", "/broken.log").with_status(500).create();
        server
            .mock("GET", "/big.log")
            .with_body("a".repeat(2000))
            .create();

        let env = test_env(1000);
        let url = |path: &str| format!("{}{}", server.url(), path);

        assert_eq!(
            read_all(from_url(&env, &url("/plain.log")).unwrap()).unwrap(),
            "line 1\nline 2\n"
        );
        assert_eq!(
            read_all(from_url(&env, &url("/magic.log")).unwrap()).unwrap(),
            "gzip by magic\n"
        );
        assert_eq!(
            read_all(from_url(&env, &url("/encoded.log")).unwrap()).unwrap(),
            "gzip by header\n"
        );
        plain.assert();
        gz.assert();
        encoded.assert();

        let missing = from_url(&env, &url("/missing.log")).err().unwrap();
        assert_eq!(missing.http_status(), Some(404));
        assert!(!missing.is_retryable());

        let broken = from_url(&env, &url("/broken.log")).err().unwrap();
        assert_eq!(broken.http_status(), Some(500));
        assert!(broken.is_retryable());

        assert!(matches!(
            from_url(&env, &url("/big.log")),
            Err(Error::LogSize { limit: 1000 })
        ));
        assert!(matches!(
            from_url(&env, "ftp://localhost/log"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(from_url(&env, "not a url"), Err(Error::InvalidUrl(_))));
    }
}
