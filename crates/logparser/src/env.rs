// Copyright (C) 2025 Red Hat
// SPDX-License-Identifier: Apache-2.0

//! This module provides the parse environment.

use std::time::Duration;

use crate::config::ParserConfig;

/// The default http request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("treeherder-logparser/", env!("CARGO_PKG_VERSION"));

/// The shared parse context: the limits and the http client.
#[derive(Clone)]
pub struct Env {
    pub config: ParserConfig,
    pub client: ureq::Agent,
}

impl Env {
    pub fn new(config: ParserConfig) -> Result<Env, std::io::Error> {
        Env::new_with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn new_with_timeout(config: ParserConfig, timeout: Duration) -> Result<Env, std::io::Error> {
        Ok(Env {
            config,
            client: new_agent(timeout)?,
        })
    }
}

fn http_proxy() -> Result<String, std::env::VarError> {
    std::env::var("HTTPS_PROXY")
        .or_else(|_| std::env::var("https_proxy"))
        .or_else(|_| std::env::var("HTTP_PROXY"))
        .or_else(|_| std::env::var("http_proxy"))
}

fn new_agent(timeout: Duration) -> Result<ureq::Agent, std::io::Error> {
    let mut builder = ureq::builder().timeout(timeout).user_agent(USER_AGENT);
    if let Ok(proxy) = http_proxy() {
        let proxy = ureq::Proxy::new(proxy)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        builder = builder.proxy(proxy);
    };
    Ok(builder.build())
}
