// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::path::Path;

use crate::config::Context;
use crate::{ArgumentChain, Classification, Error, ProcessHandle, ProcessState, Result};

#[cfg(test)]
#[path = "./resolve_test.rs"]
mod resolve_test;

/// Finds the command that backs a path in the filesystem.
///
/// Each ancestor of a path is itself a node process that must
/// be spawned and asked for the command of its children. This
/// happens recursively from the root down, and every ancestor
/// process is fully closed before its child is spawned.
#[derive(Clone, Copy, Debug)]
pub struct PathResolver<'ctx> {
    context: &'ctx Context,
}

impl<'ctx> PathResolver<'ctx> {
    /// Create a resolver that spawns processes within `context`
    pub fn new(context: &'ctx Context) -> Self {
        Self { context }
    }

    /// Spawn the node process for `path`.
    ///
    /// The returned process has not been read from, so its first
    /// line will be the classification of the node. `path` must be
    /// absolute and must not be the root directory, which has no
    /// node process of its own.
    pub fn resolve(&self, path: &Path) -> Result<ProcessHandle> {
        let (parent, leaf) = split_path(path)?;
        let command = if is_root(parent) {
            self.context.root_command().clone()
        } else {
            self.child_command(parent, &leaf)?
        };
        self.context.spawn(&command.append(leaf))
    }

    /// Find the command that resolves the children of the directory at `dir`.
    ///
    /// The node for `dir` must classify itself as a subdirectory
    /// command, and is always closed before this function returns.
    pub fn subdirectory_command(&self, dir: &Path) -> Result<ArgumentChain> {
        self.child_command(dir, ".")
    }

    /// The subdirectory command of `dir`, which is about to be
    /// used to spawn its child `leaf`
    fn child_command(&self, dir: &Path, leaf: &str) -> Result<ArgumentChain> {
        let mut node = self.resolve(dir)?;
        let line = node.read_line()?;
        if node.state() == ProcessState::Error {
            // the parent does not actually exist
            return Err(Error::NotFound(dir.to_owned()));
        }
        let Some(line) = line else {
            tracing::warn!(
                "Got no output when traversing directory: {} for {leaf}",
                dir.display()
            );
            return Err(Error::MissingOutput {
                path: dir.to_owned(),
                expected: "classification line",
            });
        };
        if Classification::parse(&line) != Some(Classification::SubdirCommand) {
            node.drain_and_close()?;
            return Err(Error::NotADirectory(dir.to_owned()));
        }

        let command = node.read_line()?;
        node.drain_and_close()?;
        if node.state() == ProcessState::Error {
            return Err(Error::NotFound(dir.to_owned()));
        }
        let Some(command) = command else {
            tracing::warn!(
                "Got no command when traversing directory: {} for {leaf}",
                dir.display()
            );
            return Err(Error::MissingOutput {
                path: dir.to_owned(),
                expected: "subdirectory command",
            });
        };
        Ok(ArgumentChain::split(&command))
    }
}

pub(crate) fn is_root(path: &Path) -> bool {
    path == Path::new("/")
}

/// Split a path into its parent directory and final segment
pub(crate) fn split_path(path: &Path) -> Result<(&Path, String)> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(leaf)) => Ok((parent, leaf.to_string_lossy().into_owned())),
        _ => Err(Error::NotFound(path.to_owned())),
    }
}
