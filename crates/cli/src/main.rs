// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module is the entrypoint of the parselog command line.

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use time_humanize::HumanTime;

use treeherder_logparser::failure_lines::parse_failure_lines;
use treeherder_logparser::pool::parse_many;
use treeherder_logparser::suggestions::HttpBugsCache;
use treeherder_logparser::{BuilderKind, CancelToken, Env, Error, Input, ParserConfig};

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(long, help = "Parser configuration (yaml or json)", value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(long = "url", help = "A log url, can be repeated", value_name = "URL")]
    urls: Vec<String>,

    #[clap(long = "path", help = "A local log, can be repeated", value_name = "FILE")]
    paths: Vec<PathBuf>,

    #[clap(long, default_value = "text,jobinfo,perf", value_name = "LIST")]
    builders: String,

    #[clap(long, help = "Maximum inflated log size in bytes", value_name = "N")]
    max_size: Option<u64>,

    #[clap(long, help = "Maximum number of error lines", value_name = "N")]
    error_cap: Option<usize>,

    #[clap(long, help = "Read structured error summaries instead")]
    failure_lines: bool,

    #[clap(long, help = "Add the bug suggestions from this bug cache", value_name = "URL")]
    bugscache_url: Option<String>,

    #[clap(long, help = "Number of parallel parses", value_name = "N")]
    jobs: Option<usize>,

    #[clap(long, help = "Cancel the parse after this delay", value_name = "SECS")]
    timeout: Option<u64>,

    #[clap(long, default_value = "-", value_name = "-|FILE")]
    out: String,
}

/// The reason the command did not complete.
enum Failure {
    Usage(anyhow::Error),
    Parse(Error),
    Other(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Usage(_) => 2,
            Failure::Parse(e) => e.exit_code() as u8,
            Failure::Other(_) => 1,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Usage(e) | Failure::Other(e) => write!(f, "{:#}", e),
            Failure::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<ParserConfig> {
        let config = match &self.config {
            Some(path) => ParserConfig::from_path(path)
                .with_context(|| format!("Can't load {:?}", path))?,
            None => ParserConfig::default(),
        };
        let mut config = config.with_env()?;
        if let Some(max_size) = self.max_size {
            config.max_log_size = max_size;
        }
        if let Some(error_cap) = self.error_cap {
            config.max_error_lines = error_cap;
        }
        if self.bugscache_url.is_some() {
            config.bugscache_url = self.bugscache_url.clone();
        }
        Ok(config)
    }

    fn inputs(&self) -> Vec<Input> {
        self.urls
            .iter()
            .map(|url| Input::Url(url.clone()))
            .chain(self.paths.iter().map(|path| Input::Path(path.clone())))
            .collect()
    }

    fn run(self) -> Result<(), Failure> {
        let config = self.load_config().map_err(Failure::Usage)?;
        let kinds = BuilderKind::parse_list(&self.builders)
            .map_err(|e| Failure::Usage(e.into()))?;
        let inputs = self.inputs();
        if inputs.is_empty() {
            return Err(Failure::Usage(anyhow::anyhow!(
                "An input is required, please add a `--url URL` or `--path FILE` argument"
            )));
        }
        let env = Env::new(config)
            .context("Can't create the http client")
            .map_err(Failure::Other)?;

        let cancel = CancelToken::new();
        if let Some(secs) = self.timeout {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(secs));
                tracing::warn!("Timeout reached, cancelling");
                cancel.cancel();
            });
        }

        let start_time = Instant::now();
        let results: Vec<Result<Value, Error>> = if self.failure_lines {
            inputs
                .iter()
                .map(|input| {
                    parse_failure_lines(&env, input, &cancel).map(|lines| to_json(&lines))
                })
                .collect()
        } else {
            let bugs = env
                .config
                .bugscache_url
                .as_ref()
                .map(|url| HttpBugsCache::new(env.client.clone(), url));
            parse_many(&env, &inputs, &kinds, self.jobs.unwrap_or(0), &cancel)
                .into_iter()
                .map(|result| {
                    result.map(|mut parsed| {
                        if let Some(bugs) = &bugs {
                            parsed.add_bug_suggestions(bugs, env.config.max_summary_lines);
                        }
                        to_json(&parsed.artifacts)
                    })
                })
                .collect()
        };

        let mut first_error = None;
        let mut outputs = serde_json::Map::new();
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(value) => {
                    outputs.insert(input.logurl(), value);
                }
                Err(e) => {
                    tracing::error!("{}: {}", input, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        tracing::info!(
            "Completed {} in {}",
            inputs.iter().join(", "),
            HumanTime::from(start_time.elapsed())
        );

        let output = if inputs.len() == 1 {
            outputs.into_iter().next().map(|(_, value)| value)
        } else {
            Some(Value::Object(outputs))
        };
        if let Some(output) = output {
            write_output(&self.out, &output).map_err(Failure::Other)?;
        }
        match first_error {
            Some(e) => Err(Failure::Parse(e)),
            None => Ok(()),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("Can't encode the output: {}", e);
        Value::Null
    })
}

/// Write the output json, pretty printed when it goes to a terminal.
fn write_output(out: &str, value: &Value) -> Result<()> {
    if out == "-" {
        let text = if atty::is(atty::Stream::Stdout) {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", text);
        Ok(())
    } else {
        let text = serde_json::to_string_pretty(value)?;
        std::fs::write(out, text + "\n").with_context(|| format!("Can't write {}", out))?;
        tracing::info!("Wrote {}", out);
        Ok(())
    }
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let logger = tracing_subscriber::Registry::default();

    let _flush = match std::env::var_os("TREEHERDER_LOG") {
        None => {
            // Default INFO stderr logger, stdout is kept for the artifacts.
            logger
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr)
                        .compact()
                        .with_filter(tracing_subscriber::filter::LevelFilter::INFO),
                )
                .init();
            None
        }
        Some(_level) => {
            // Tracing spans
            let logger = logger.with(
                tracing_tree::HierarchicalLayer::new(1)
                    .with_targets(true)
                    .with_bracketed_fields(true)
                    .with_filter(tracing_subscriber::filter::EnvFilter::from_env(
                        "TREEHERDER_LOG",
                    )),
            );
            if let Ok(fp) = std::env::var("TREEHERDER_TRACE") {
                let chrome = tracing_chrome::ChromeLayerBuilder::new()
                    .file(fp)
                    .include_args(true)
                    .build();
                logger.with(chrome.0).init();
                // Return the chrome flush guard so that it is not dropped until the end
                Some(chrome.1)
            } else {
                logger.init();
                None
            }
        }
    };

    match Cli::parse().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("parselog: {}", failure);
            ExitCode::from(failure.exit_code())
        }
    }
}
