// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A specialized result for filesystem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving and serving filesystem nodes.
///
/// Protocol and lookup failures are reported back to the caller
/// of a single operation, while failures of the underlying process
/// primitives are [fatal](Error::is_fatal) to the whole filesystem.
#[derive(Diagnostic, Debug, Error)]
#[diagnostic(
    url(
        "https://spkenv.dev/error_codes#{}",
        self.code().unwrap_or_else(|| Box::new("cmdfs::generic"))
    )
)]
pub enum Error {
    /// The node, or one of its ancestors, does not exist
    #[error("No such node: {0}")]
    NotFound(PathBuf),
    /// A path traverses through a node that is not a subdirectory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    /// A command ended before printing a line that the protocol requires
    #[error("Got no {expected} when traversing {path}")]
    MissingOutput {
        /// The node whose command was being read
        path: PathBuf,
        /// A description of the missing line
        expected: &'static str,
    },
    /// A listing command did not identify itself as a listing
    #[error("Expected a listing for {path}, got {line:?}")]
    #[diagnostic(
        code("cmdfs::unexpected_listing"),
        help("Directory commands must print '!listing' when given '.' as their final argument")
    )]
    UnexpectedListing {
        /// The directory being listed
        path: PathBuf,
        /// The first line that the command printed, if any
        line: Option<String>,
    },
    /// A file was read anywhere other than where the last read ended
    #[error("Illegal seek: read requested at {requested}, but {expected} bytes have been read")]
    IllegalSeek {
        /// The number of bytes already delivered from the file
        expected: u64,
        /// The offset that was requested
        requested: i64,
    },
    /// Write access was requested for a node
    #[error("Read-only filesystem: {0}")]
    ReadOnly(PathBuf),
    /// A file handle that does not belong to any open file
    #[error("No open file for handle {0}")]
    UnknownHandle(u64),
    /// The process could not be created at all
    #[error("Failed to spawn process: {command}")]
    Spawn {
        /// The rendered command line
        command: String,
        /// The underlying os error
        #[source]
        source: io::Error,
    },
    /// A spawned process could not be reaped
    #[error("Failed to wait for process {pid}")]
    Wait {
        /// The id of the process being waited on
        pid: u32,
        /// The underlying os error
        #[source]
        source: io::Error,
    },
    /// The output stream of a process failed
    #[error("Failed to read process output")]
    Read(#[source] io::Error),
    /// The configuration could not be loaded
    #[error("Invalid configuration")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// True if this error leaves the process bookkeeping in
    /// a state that cannot be trusted, and the filesystem must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Spawn { .. } | Error::Wait { .. } | Error::Read(_) | Error::Config(_)
        )
    }
}

/// An error that can be expressed as an operating system error number
pub trait OsError {
    /// The errno that best represents this error, if any
    fn os_error(&self) -> Option<i32>;
}

impl OsError for io::Error {
    fn os_error(&self) -> Option<i32> {
        self.raw_os_error()
    }
}

impl OsError for Error {
    fn os_error(&self) -> Option<i32> {
        match self {
            Error::NotFound(_) => Some(libc::ENOENT),
            Error::NotADirectory(_) => Some(libc::ENOTDIR),
            Error::MissingOutput { .. } => Some(libc::EIO),
            Error::UnexpectedListing { .. } => Some(libc::EACCES),
            Error::IllegalSeek { .. } => Some(libc::ESPIPE),
            Error::ReadOnly(_) => Some(libc::EROFS),
            Error::UnknownHandle(_) => Some(libc::EBADF),
            Error::Spawn { source, .. } => source.os_error(),
            Error::Wait { source, .. } => source.os_error(),
            Error::Read(err) => err.os_error(),
            Error::Config(_) => None,
        }
    }
}
