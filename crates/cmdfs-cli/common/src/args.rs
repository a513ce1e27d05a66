// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Error, Result};
use tracing_subscriber::prelude::*;

#[cfg(test)]
#[path = "./args_test.rs"]
mod args_test;

const CMDFS_LOG: &str = "CMDFS_LOG";

/// Command line flags for configuring logging output
#[derive(Debug, Clone, clap::Args)]
pub struct Logging {
    /// Make output more verbose, can be specified more than once
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Additionally write all logs to this file
    #[clap(long, global = true, env = "CMDFS_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Logging {
    /// Install the global logger described by these flags
    pub fn configure(&self) -> Result<()> {
        configure_logging(self.verbose as usize, self.log_file.as_deref())
    }
}

/// The filter directives for a verbosity level.
///
/// With no extra verbosity, `CMDFS_LOG` replaces the default
/// directives. `RUST_LOG` is always appended when set.
pub(crate) fn log_directives(verbosity: usize) -> String {
    let mut directives = match verbosity {
        0 => std::env::var(CMDFS_LOG).unwrap_or_else(|_| "cmdfs=info,warn".to_string()),
        1 => "cmdfs=debug,info".to_string(),
        2 => "cmdfs=trace,info".to_string(),
        3 => "cmdfs=trace,debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Ok(overrides) = std::env::var("RUST_LOG") {
        directives.push(',');
        directives.push_str(&overrides);
    }
    directives
}

pub fn configure_logging(verbosity: usize, log_file: Option<&Path>) -> Result<()> {
    let env_filter = tracing_subscriber::filter::EnvFilter::new(log_directives(verbosity));
    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(verbosity > 2);

    let file_log = match log_file {
        None => None,
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
    };

    let sub = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_log)
        .with(file_log);
    tracing::subscriber::set_global_default(sub).context("Failed to set default logger")
}

/// The process exit code for a failed command
pub fn exit_code(err: &Error) -> i32 {
    match err.root_cause().downcast_ref::<std::io::Error>() {
        // commonly a mountpoint that does not exist
        Some(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => 2,
        _ => 1,
    }
}

#[macro_export]
macro_rules! handle_result {
    ($result:ident) => {{
        match $result {
            Err(err) => {
                $crate::__private::tracing::error!("{err:?}");
                $crate::exit_code(&err)
            }
            Ok(code) => code,
        }
    }};
}
