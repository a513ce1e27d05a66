// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

//! A filesystem view over a tree of external commands.
//!
//! Every node of the filesystem is produced on demand by spawning
//! a command and reading a small line-oriented protocol from its
//! standard output. Nothing is stored or cached between calls.

mod args;
mod config;
mod error;
mod filesystem;
mod process;
mod protocol;
mod resolve;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use args::ArgumentChain;
pub use config::{Config, Context, FilesystemConfig, load_config};
pub use error::{Error, OsError, Result};
pub use filesystem::{DirEntry, FilesystemAdapter, NodeKind};
pub use process::{ProcessHandle, ProcessState};
pub use protocol::Classification;
pub use resolve::PathResolver;
