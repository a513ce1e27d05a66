// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::{ArgumentChain, Error, Result};

#[cfg(test)]
#[path = "./process_test.rs"]
mod process_test;

/// The observable life cycle of a spawned node process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// The process has output that has not been read yet
    Running,
    /// The process has exited normally with a zero exit code
    Done,
    /// The process has exited with a nonzero code or by a signal,
    /// or it could not be executed at all
    Error,
}

/// The process and its output stream only exist together,
/// and only while the process is considered running.
enum Lifecycle {
    Running {
        child: Child,
        stdout: BufReader<ChildStdout>,
    },
    Done,
    Error,
}

/// An owned, spawned node process and its standard output.
///
/// The process is reaped as soon as the end of its output is
/// observed by any read, at which point the handle becomes
/// [`ProcessState::Done`] or [`ProcessState::Error`] and stays there.
/// Dropping a handle that is still running kills and reaps its process.
pub struct ProcessHandle {
    argv: ArgumentChain,
    lifecycle: Lifecycle,
    offset: u64,
}

impl ProcessHandle {
    /// Spawn a process with its stdout captured.
    ///
    /// The child runs in `working_dir`. If the program cannot be
    /// executed the handle is returned in the error state, just as
    /// if the process had started and exited with a failure. Only
    /// failures to create the process itself are returned as errors.
    pub fn spawn(argv: &ArgumentChain, working_dir: &Path) -> Result<Self> {
        if argv.tokens().iter().any(|token| token.contains('\0')) {
            // no process can be given such an argument
            tracing::warn!("cannot execute a command containing a nul byte: {argv:?}");
            return Ok(Self::failed(argv));
        }

        let mut cmd = Command::new(argv.program());
        cmd.args(argv.args());
        cmd.current_dir(working_dir);
        cmd.stdout(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if is_exec_failure(&err) => {
                tracing::debug!("could not execute {argv}: {err}");
                return Ok(Self::failed(argv));
            }
            Err(source) => {
                return Err(Error::Spawn {
                    command: argv.to_string(),
                    source,
                });
            }
        };
        tracing::trace!(
            pid = child.id(),
            working_dir = %working_dir.display(),
            "running: {argv}"
        );

        let Some(stdout) = child.stdout.take() else {
            return Err(Error::Spawn {
                command: argv.to_string(),
                source: io::Error::other("stdout was not captured"),
            });
        };
        let mut handle = Self {
            argv: argv.clone(),
            lifecycle: Lifecycle::Running {
                child,
                stdout: BufReader::new(stdout),
            },
            offset: 0,
        };
        // short lived or failing commands may have already
        // closed their output, and must be reaped right away
        handle.check_end_of_stream()?;
        Ok(handle)
    }

    /// A handle for a process that never ran
    fn failed(argv: &ArgumentChain) -> Self {
        Self {
            argv: argv.clone(),
            lifecycle: Lifecycle::Error,
            offset: 0,
        }
    }

    /// The command line that this process was spawned with
    pub fn argv(&self) -> &ArgumentChain {
        &self.argv
    }

    /// The current state of this process
    pub fn state(&self) -> ProcessState {
        match self.lifecycle {
            Lifecycle::Running { .. } => ProcessState::Running,
            Lifecycle::Done => ProcessState::Done,
            Lifecycle::Error => ProcessState::Error,
        }
    }

    /// True if this process still has output to be read
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// The os process id, only available while running
    pub fn pid(&self) -> Option<u32> {
        match &self.lifecycle {
            Lifecycle::Running { child, .. } => Some(child.id()),
            Lifecycle::Done | Lifecycle::Error => None,
        }
    }

    /// The total number of bytes delivered by reads so far.
    ///
    /// This value no longer changes once the process has finished.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next line of output, without its trailing newline.
    ///
    /// Returns `None` once the output has ended, or if the
    /// process was already finished.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let Lifecycle::Running { stdout, .. } = &mut self.lifecycle else {
            return Ok(None);
        };
        let mut line = Vec::new();
        let count = stdout.read_until(b'\n', &mut line).map_err(Error::Read)?;
        if count == 0 {
            self.finish()?;
            return Ok(None);
        }
        self.offset += count as u64;
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Fill as much of `buf` as possible from the process output.
    ///
    /// A short read means that the output has ended and the process
    /// is reaped. Returns zero without reading if the process
    /// was already finished.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Lifecycle::Running { stdout, .. } = &mut self.lifecycle else {
            return Ok(0);
        };
        let mut consumed = 0;
        while consumed < buf.len() {
            match stdout.read(&mut buf[consumed..]) {
                // the end of the output has been reached
                Ok(0) => break,
                Ok(count) => consumed += count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Read(err)),
            }
        }
        self.offset += consumed as u64;
        if consumed < buf.len() {
            self.finish()?;
        }
        tracing::trace!("read {consumed}/{} from {}", buf.len(), self.argv);
        Ok(consumed)
    }

    /// Discard all remaining output and reap the process.
    ///
    /// Does nothing if the process has already finished.
    pub fn drain_and_close(&mut self) -> Result<()> {
        let Lifecycle::Running { stdout, .. } = &mut self.lifecycle else {
            return Ok(());
        };
        io::copy(stdout, &mut io::sink()).map_err(Error::Read)?;
        self.finish()
    }

    /// Stop the process without reading the rest of its output.
    ///
    /// The process is killed and reaped, so this returns even for
    /// a process that never ends its output on its own. Does nothing
    /// if the process has already finished.
    pub fn close(&mut self) -> Result<()> {
        let Lifecycle::Running { child, .. } = &mut self.lifecycle else {
            return Ok(());
        };
        if let Err(err) = child.kill() {
            // it may have exited already and only be waiting to be reaped
            tracing::trace!("failed to kill {}: {err}", self.argv);
        }
        self.finish()
    }

    fn check_end_of_stream(&mut self) -> Result<()> {
        let Lifecycle::Running { stdout, .. } = &mut self.lifecycle else {
            return Ok(());
        };
        let at_end = loop {
            match stdout.fill_buf() {
                Ok(buf) => break buf.is_empty(),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Read(err)),
            }
        };
        if at_end {
            self.finish()?;
        }
        Ok(())
    }

    /// Reap a process whose output has ended
    fn finish(&mut self) -> Result<()> {
        let (mut child, stdout) =
            match std::mem::replace(&mut self.lifecycle, Lifecycle::Error) {
                Lifecycle::Running { child, stdout } => (child, stdout),
                finished => {
                    self.lifecycle = finished;
                    return Ok(());
                }
            };
        let pid = child.id();
        let status = child
            .wait()
            .map_err(|source| Error::Wait { pid, source })?;
        drop(stdout);
        self.lifecycle = if status.success() {
            Lifecycle::Done
        } else {
            Lifecycle::Error
        };
        tracing::trace!(pid, "{} finished: {status}", self.argv);
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!("failed to close {}: {err:?}", self.argv);
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("argv", &self.argv)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .field("offset", &self.offset)
            .finish()
    }
}

/// True for errors that the child would have hit while
/// replacing its process image, rather than errors in
/// creating the process itself
fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOENT)
            | Some(libc::EACCES)
            | Some(libc::ENOEXEC)
            | Some(libc::ENOTDIR)
            | Some(libc::E2BIG)
            | Some(libc::ELOOP)
            | Some(libc::ENAMETOOLONG)
    )
}
