// src/cli.rs
use crate::config::{Config, LogFormat};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Reverse proxy distributing requests round-robin across backends.
#[derive(Parser, Debug)]
#[command(name = "rrproxy", version, about, long_about = None)]
#[command(override_usage = "rrproxy [OPTIONS] <BACKEND1> [BACKEND2 ... [BACKENDN]]")]
pub struct Args {
    /// Frontend endpoint, e.g. :80 or 127.0.0.1:8080 (overrides server.listen)
    #[arg(short, long = "endpoint", value_name = "ADDR")]
    pub endpoint: Option<String>,

    /// Frontend path prefix (overrides server.path)
    #[arg(short, long, value_name = "PREFIX")]
    pub path: Option<String>,

    /// YAML or JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides logging.level)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format (overrides logging.format)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Backend URLs in round-robin order; replace any configured backends
    #[arg(value_name = "BACKEND")]
    pub backends: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Args {
    /// Apply command-line overrides on top of `config`.
    ///
    /// Backend URLs are returned as strings so that malformed ones are reported
    /// by the same path as configured ones.
    pub fn merge_into(self, mut config: Config) -> (Config, Vec<String>) {
        if let Some(endpoint) = self.endpoint {
            config.server.listen = endpoint;
        }
        if let Some(path) = self.path {
            config.server.path = path;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }

        let backends = if self.backends.is_empty() {
            config.backends.iter().map(|u| u.to_string()).collect()
        } else {
            self.backends
        };

        (config, backends)
    }
}
