// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::path::Path;

use crate::config::Context;
use crate::resolve::{is_root, split_path};
use crate::{
    ArgumentChain,
    Classification,
    Error,
    PathResolver,
    ProcessHandle,
    ProcessState,
    Result,
};

#[cfg(test)]
#[path = "./filesystem_test.rs"]
mod filesystem_test;

/// The kind of a node in the filesystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A node whose children are resolved through a subdirectory command
    Directory,
    /// A node whose content is produced by a file command
    File,
}

/// One entry produced while listing a directory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry<'a> {
    /// The name of the entry within its directory
    pub name: &'a str,
    /// The kind of the entry, if known without spawning it
    pub kind: Option<NodeKind>,
    /// The offset at which a listing should resume after this entry
    pub next_offset: i64,
}

/// Serves path based filesystem operations by spawning node commands.
///
/// This is the layer that a mount session calls into. No state is
/// kept between calls except for the processes backing open files,
/// which are owned by the caller.
#[derive(Debug)]
pub struct FilesystemAdapter {
    context: Context,
}

impl FilesystemAdapter {
    /// Create an adapter that serves the given context
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// The context that node processes are spawned in
    pub fn context(&self) -> &Context {
        &self.context
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.context)
    }

    /// Check access to a node, which is always permitted
    pub fn access(&self, _path: &Path, _mask: i32) -> Result<()> {
        Ok(())
    }

    /// Determine the kind of node at `path`.
    pub fn getattr(&self, path: &Path) -> Result<NodeKind> {
        if is_root(path) {
            return Ok(NodeKind::Directory);
        }
        let mut node = match self.resolver().resolve(path) {
            Ok(node) => node,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::debug!("getattr {}: {err}", path.display());
                return Err(Error::NotFound(path.to_owned()));
            }
        };
        let line = node.read_line()?;
        node.drain_and_close()?;
        match line.as_deref().and_then(Classification::parse) {
            Some(Classification::FileCommand) => Ok(NodeKind::File),
            Some(Classification::SubdirCommand) => Ok(NodeKind::Directory),
            Some(Classification::Listing) | None => Err(Error::NotFound(path.to_owned())),
        }
    }

    /// List the entries of the directory at `path`.
    ///
    /// Entries are numbered from zero, starting with the synthetic `.`
    /// and `..` entries, and any entry numbered below `offset` is skipped.
    /// `emit` is called for each remaining entry, and may return true to
    /// stop the listing early, eg: when the caller's buffer is full.
    pub fn readdir<F>(&self, path: &Path, offset: i64, mut emit: F) -> Result<()>
    where
        F: FnMut(DirEntry<'_>) -> bool,
    {
        let command = if is_root(path) {
            self.context.root_command().clone()
        } else {
            self.resolver().subdirectory_command(path)?
        };
        let mut listing = self.context.spawn(&command.append("."))?;
        let line = listing.read_line()?;
        if line.as_deref().and_then(Classification::parse) != Some(Classification::Listing) {
            listing.drain_and_close()?;
            return Err(Error::UnexpectedListing {
                path: path.to_owned(),
                line,
            });
        }

        let mut index = 0;
        let mut add = |name: &str, kind: Option<NodeKind>| {
            let current = index;
            index += 1;
            current >= offset
                && emit(DirEntry {
                    name,
                    kind,
                    next_offset: index,
                })
        };
        // the rest of a listing that the caller has no room for is not needed
        if add(".", Some(NodeKind::Directory)) || add("..", Some(NodeKind::Directory)) {
            return listing.close();
        }
        while let Some(name) = listing.read_line()? {
            if add(name.as_str(), None) {
                return listing.close();
            }
        }
        Ok(())
    }

    /// Open the file at `path` for reading.
    ///
    /// The returned process produces the content of the file and
    /// must be read sequentially with [`Self::read`].
    pub fn open(&self, path: &Path) -> Result<ProcessHandle> {
        let (_, leaf) = split_path(path)?;
        let mut node = self.resolver().resolve(path)?;
        let line = node.read_line()?;
        if node.state() == ProcessState::Error
            || line.as_deref().and_then(Classification::parse) != Some(Classification::FileCommand)
        {
            node.drain_and_close()?;
            return Err(Error::NotFound(path.to_owned()));
        }

        let command = node.read_line()?;
        node.drain_and_close()?;
        if node.state() == ProcessState::Error {
            return Err(Error::NotFound(path.to_owned()));
        }
        let Some(command) = command else {
            tracing::warn!("Got no file command for {}", path.display());
            return Err(Error::MissingOutput {
                path: path.to_owned(),
                expected: "file command",
            });
        };
        self.context
            .spawn(&ArgumentChain::split(&command).append(leaf))
    }

    /// Read the next `size` bytes of an open file.
    ///
    /// File content is a live process stream, so `offset` must be
    /// exactly where the previous read ended. Fewer bytes than requested
    /// are returned only at the end of the file.
    pub fn read(&self, file: &mut ProcessHandle, offset: i64, size: u32) -> Result<Vec<u8>> {
        if u64::try_from(offset).ok() != Some(file.offset()) {
            tracing::debug!(
                "Seek error: requested {offset}, at {} in {}",
                file.offset(),
                file.argv()
            );
            return Err(Error::IllegalSeek {
                expected: file.offset(),
                requested: offset,
            });
        }
        let mut buf = vec![0; size as usize];
        let count = file.read_bytes(&mut buf)?;
        buf.truncate(count);
        Ok(buf)
    }

    /// Flush an open file, which has nothing to write
    pub fn flush(&self, _file: &ProcessHandle) -> Result<()> {
        Ok(())
    }

    /// Release an open file.
    ///
    /// The backing process is left for its owner to close.
    pub fn release(&self, _file: &ProcessHandle) -> Result<()> {
        Ok(())
    }
}
