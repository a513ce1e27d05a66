// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::path::{Path, PathBuf};

use config::{Config as ConfigBase, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{ArgumentChain, ProcessHandle, Result};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static SYSTEM_CONFIG: &str = "/etc/cmdfs.conf";

/// How nodes are presented to the kernel
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesystemConfig {
    /// The size reported for every node.
    ///
    /// The real size of a node is never known ahead of time, but
    /// most programs refuse to read files that report a size of zero.
    pub nominal_size: u64,
    /// The block size reported for every node
    pub block_size: u32,
    /// The largest single read that the kernel is allowed to request
    pub max_read: u32,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            nominal_size: 1,
            block_size: 512,
            max_read: 512,
        }
    }
}

/// Runtime settings loaded from config files and the environment
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// How nodes are presented to the kernel
    pub filesystem: FilesystemConfig,
}

impl Config {
    /// Load a config from the contents of an ini file
    pub fn load_string<S: AsRef<str>>(conf: S) -> Result<Self> {
        let config = ConfigBase::builder()
            .add_source(File::from_str(conf.as_ref(), FileFormat::Ini))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Load the cmdfs configuration.
///
/// This layers the system config, the user config and
/// any `CMDFS_` environment variables over the defaults.
pub fn load_config() -> Result<Config> {
    let mut builder = ConfigBase::builder().add_source(
        File::with_name(SYSTEM_CONFIG)
            .format(FileFormat::Ini)
            .required(false),
    );
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("cmdfs").join("cmdfs.conf")) {
        if let Some(name) = user_config.to_str() {
            builder = builder.add_source(
                File::with_name(name)
                    .format(FileFormat::Ini)
                    .required(false),
            );
        }
    }
    let config = builder
        .add_source(
            Environment::with_prefix("CMDFS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(config.try_deserialize()?)
}

/// Everything needed to spawn node processes for one mount.
///
/// A context is built once at startup and then shared, unchanged,
/// by every filesystem operation.
#[derive(Clone, Debug)]
pub struct Context {
    root_command: ArgumentChain,
    working_dir: PathBuf,
    config: Config,
}

impl Context {
    /// Create a context for the given root command.
    ///
    /// All node processes are started in `working_dir`, which
    /// should be the working directory of the filesystem at startup.
    pub fn new<P: Into<PathBuf>>(
        root_command: ArgumentChain,
        working_dir: P,
        config: Config,
    ) -> Self {
        Self {
            root_command,
            working_dir: working_dir.into(),
            config,
        }
    }

    /// The command that backs the root directory
    pub fn root_command(&self) -> &ArgumentChain {
        &self.root_command
    }

    /// The directory that every node process starts in
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The runtime settings for this mount
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn a node process in this context
    pub fn spawn(&self, argv: &ArgumentChain) -> Result<ProcessHandle> {
        ProcessHandle::spawn(argv, &self.working_dir)
    }
}
