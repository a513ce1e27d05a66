// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use cmdfs::{FilesystemAdapter, NodeKind, OsError, ProcessHandle};
use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr,
    FileType,
    KernelConfig,
    MountOption,
    ReplyAttr,
    ReplyData,
    ReplyDirectory,
    ReplyEmpty,
    ReplyEntry,
    ReplyOpen,
    ReplyStatfs,
    Request,
    SessionUnmounter,
};

use crate::inode::InodeTable;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./fuse_test.rs"]
mod fuse_test;

// every answer depends on a process, so nothing may be cached
const TTL: Duration = Duration::ZERO;

/// Options to configure the FUSE filesystem and
/// its behavior at runtime
#[derive(Debug, Clone)]
pub struct Config {
    /// The user id that should own all files and directories
    pub uid: nix::unistd::Uid,
    /// The group id that should own all files and directories
    pub gid: nix::unistd::Gid,
    /// Mount options to be used when setting up
    pub mount_options: HashSet<MountOption>,
}

impl Config {
    /// A configuration owned by the calling user with
    /// the [`default_mount_options`].
    pub fn new(settings: &cmdfs::Config) -> Self {
        Self {
            uid: nix::unistd::geteuid(),
            gid: nix::unistd::getegid(),
            mount_options: default_mount_options(settings),
        }
    }

    /// Apply user-provided mount options on top of this config.
    ///
    /// Requesting write access is always an error. The custom
    /// `uid=` and `gid=` options change the reported owner of
    /// every node, and `max_read=` replaces the configured value.
    pub fn apply_options<S: AsRef<str>>(&mut self, options: &[S]) -> Result<()> {
        for option in options {
            match parse_option(option.as_ref()) {
                MountOption::RW => return Err(Error::ReadOnly),
                MountOption::CUSTOM(custom) => self.apply_custom(custom)?,
                option => {
                    self.mount_options.insert(option);
                }
            }
        }
        Ok(())
    }

    fn apply_custom(&mut self, option: String) -> Result<()> {
        let Some((name, value)) = option.split_once('=') else {
            return Err(Error::UnsupportedOption(option));
        };
        let Ok(number) = value.parse::<u32>() else {
            return Err(Error::UnsupportedOption(option));
        };
        match name {
            "uid" => self.uid = nix::unistd::Uid::from_raw(number),
            "gid" => self.gid = nix::unistd::Gid::from_raw(number),
            "max_read" => {
                self.mount_options.retain(|o| !is_max_read(o));
                self.mount_options.insert(MountOption::CUSTOM(option));
            }
            _ => return Err(Error::UnsupportedOption(option)),
        }
        Ok(())
    }
}

fn is_max_read(option: &MountOption) -> bool {
    matches!(option, MountOption::CUSTOM(o) if o.starts_with("max_read="))
}

fn parse_option(option: &str) -> MountOption {
    match option {
        "auto_unmount" => MountOption::AutoUnmount,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        x if x.starts_with("fsname=") => MountOption::FSName(x[7..].into()),
        x if x.starts_with("subtype=") => MountOption::Subtype(x[8..].into()),
        x => MountOption::CUSTOM(x.into()),
    }
}

/// The options that every cmdfs mount is made with.
///
/// The kernel is limited to requesting `max_read` bytes at a
/// time, which keeps reads small and sequential.
pub fn default_mount_options(settings: &cmdfs::Config) -> HashSet<MountOption> {
    HashSet::from([
        MountOption::RO,
        MountOption::NoDev,
        MountOption::NoSuid,
        MountOption::FSName("cmdfs".into()),
        MountOption::Subtype("cmdfs".into()),
        MountOption::CUSTOM(format!("max_read={}", settings.filesystem.max_read)),
    ])
}

/// Detaches a mount from outside of its session.
///
/// The slot is empty until the mount exists, and unmounting
/// only happens once no matter how many clones ask for it.
#[derive(Clone, Default)]
pub struct Unmounter {
    inner: Arc<Mutex<Option<SessionUnmounter>>>,
}

impl Unmounter {
    /// Keep the unmounter of an established mount
    pub fn set(&self, unmounter: SessionUnmounter) {
        let Ok(mut slot) = self.inner.lock() else { return };
        slot.replace(unmounter);
    }

    /// Unmount the filesystem, if it was mounted
    pub fn unmount(&self) {
        let Ok(mut slot) = self.inner.lock() else { return };
        let Some(mut unmounter) = slot.take() else { return };
        match unmounter.unmount() {
            Ok(()) => tracing::debug!("Filesystem unmounted"),
            Err(err) => tracing::warn!("Failed to unmount filesystem: {err}"),
        }
    }
}

impl std::fmt::Debug for Unmounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mounted = self.inner.lock().map(|slot| slot.is_some()).unwrap_or_default();
        f.debug_struct("Unmounter").field("mounted", &mounted).finish()
    }
}

/// Unwrap a result or reply with the error to FUSE and return
macro_rules! unwrap {
    ($self:ident, $reply:ident, $op:expr) => {{
        match $op {
            Ok(r) => r,
            Err(err) => err!($self, $reply, err),
        }
    }};
}

/// Reply with an error to FUSE and return
macro_rules! err {
    ($self:ident, $reply:ident, $err:expr) => {{
        let err: cmdfs::Error = $err;
        if err.is_fatal() {
            $self.fatal(err);
        }
        tracing::debug!("{err}");
        let errno = err.os_error().unwrap_or(libc::EIO);
        $reply.error(errno);
        return;
    }};
}

/// Resolve an inode to its path or reply with ENOENT and return
macro_rules! path {
    ($self:ident, $reply:ident, $ino:expr) => {{
        match $self.inodes.path($ino) {
            Some(path) => path.to_path_buf(),
            None => {
                tracing::debug!("inode {} = ENOENT", $ino);
                $reply.error(libc::ENOENT);
                return;
            }
        }
    }};
}

/// Represents a connected FUSE session.
///
/// This implements the [`fuser::Filesystem`] trait, assigning
/// inodes to the paths of the command tree and keeping track of
/// the processes behind every open file.
pub struct Session {
    fs: FilesystemAdapter,
    opts: Config,
    inodes: InodeTable,
    handles: HashMap<u64, ProcessHandle>,
    next_handle: u64,
    unmounter: Unmounter,
}

impl Session {
    /// Construct a new session which serves the command tree of `fs`
    pub fn new(fs: FilesystemAdapter, opts: Config) -> Self {
        Self {
            fs,
            opts,
            inodes: InodeTable::default(),
            handles: HashMap::new(),
            // we do not allocate handle 0, so skip it for now
            next_handle: 1,
            unmounter: Unmounter::default(),
        }
    }

    /// The unmounter used when this session hits a fatal error.
    ///
    /// It should be given the [`SessionUnmounter`] of the mount
    /// once the session is running.
    pub fn unmounter(&self) -> Unmounter {
        self.unmounter.clone()
    }

    /// Detach the mount and exit the whole program for an error
    /// that leaves the filesystem in an unknown state
    fn fatal(&self, err: cmdfs::Error) -> ! {
        tracing::error!("{err:?}");
        self.unmounter.unmount();
        std::process::exit(1)
    }

    fn allocate_handle(&mut self, file: ProcessHandle) -> u64 {
        let fh = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(fh, file);
        fh
    }

    fn attr(&self, ino: u64, kind: NodeKind) -> FileAttr {
        let settings = &self.fs.context().config().filesystem;
        let block_size = settings.block_size.max(1);
        let now = SystemTime::now();
        FileAttr {
            ino,
            size: settings.nominal_size,
            blocks: settings.nominal_size / block_size as u64 + 1,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: file_type(kind),
            perm: 0o777,
            nlink: 1,
            uid: self.opts.uid.as_raw(),
            gid: self.opts.gid.as_raw(),
            rdev: 0,
            blksize: block_size,
            flags: 0,
        }
    }

    /// List the directory `ino` at `path`, passing each entry to `add`
    /// as its inode, next offset, type and name.
    ///
    /// `.` and `..` are the directory itself and its parent, every
    /// other entry is given an inode and reported as a regular file
    /// until a lookup finds out its real type.
    fn list_dir<F>(&mut self, ino: u64, path: &Path, offset: i64, mut add: F) -> cmdfs::Result<()>
    where
        F: FnMut(u64, i64, FileType, &str) -> bool,
    {
        let parent = self.inodes.parent(ino);
        let inodes = &mut self.inodes;
        self.fs.readdir(path, offset, |entry| {
            let (entry_ino, kind) = match (entry.name, entry.kind) {
                (".", Some(_)) => (ino, FileType::Directory),
                ("..", Some(_)) => (parent, FileType::Directory),
                (name, kind) => (
                    inodes.insert(path.join(name)),
                    file_type(kind.unwrap_or(NodeKind::File)),
                ),
            };
            add(entry_ino, entry.next_offset, kind, entry.name)
        })
    }

    /// Open the file at `path` and return its new file handle
    fn open_path(&mut self, path: &Path, flags: i32) -> cmdfs::Result<u64> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(cmdfs::Error::ReadOnly(path.to_owned()));
        }
        let file = self.fs.open(path)?;
        let fh = self.allocate_handle(file);
        tracing::trace!("open {} = {fh}", path.display());
        Ok(fh)
    }

    fn read_handle(&mut self, fh: u64, offset: i64, size: u32) -> cmdfs::Result<Vec<u8>> {
        let file = self
            .handles
            .get_mut(&fh)
            .ok_or(cmdfs::Error::UnknownHandle(fh))?;
        self.fs.read(file, offset, size)
    }

    fn flush_handle(&self, fh: u64) -> cmdfs::Result<()> {
        let file = self.handles.get(&fh).ok_or(cmdfs::Error::UnknownHandle(fh))?;
        self.fs.flush(file)
    }

    /// Forget a file handle and stop the process behind it.
    ///
    /// Returns the closed process.
    fn release_handle(&mut self, fh: u64) -> cmdfs::Result<ProcessHandle> {
        let mut file = self
            .handles
            .remove(&fh)
            .ok_or(cmdfs::Error::UnknownHandle(fh))?;
        self.fs.release(&file)?;
        file.close()?;
        Ok(file)
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

// these functions mirror the actual fuse ones and
// so we don't have much control over the shape
#[allow(clippy::too_many_arguments)]
impl fuser::Filesystem for Session {
    fn init(
        &mut self,
        _req: &Request<'_>,
        config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        // read ahead would ask for data at offsets we cannot seek to; async
        // reads may stay enabled since requests are answered one at a time
        if let Err(nearest) = config.set_max_readahead(0) {
            tracing::warn!("Kernel refused to disable readahead, using {nearest}");
            config.set_max_readahead(nearest).map_err(|_| libc::EINVAL)?;
        }
        tracing::info!("Filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::debug!("closing {} open files", self.handles.len());
        for (fh, mut file) in self.handles.drain() {
            if let Err(err) = file.close() {
                tracing::error!("failed to close file handle {fh}: {err:?}");
            }
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            tracing::debug!("lookup {name:?} = EINVAL");
            reply.error(libc::EINVAL);
            return;
        };
        let path = path!(self, reply, parent).join(name);
        let kind = unwrap!(self, reply, self.fs.getattr(&path));
        let ino = self.inodes.insert(path);
        reply.entry(&TTL, &self.attr(ino, kind), 0);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = path!(self, reply, ino);
        let kind = unwrap!(self, reply, self.fs.getattr(&path));
        reply.attr(&TTL, &self.attr(ino, kind));
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = path!(self, reply, ino);
        unwrap!(self, reply, self.fs.access(&path, mask));
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = path!(self, reply, ino);
        let result = self.list_dir(ino, &path, offset, |entry_ino, next_offset, kind, name| {
            reply.add(entry_ino, next_offset, kind, name)
        });
        unwrap!(self, reply, result);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = path!(self, reply, ino);
        let fh = unwrap!(self, reply, self.open_path(&path, flags));
        reply.opened(fh, FOPEN_DIRECT_IO);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let data = unwrap!(self, reply, self.read_handle(fh, offset, size));
        reply.data(&data);
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        unwrap!(self, reply, self.flush_handle(fh));
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        unwrap!(self, reply, self.release_handle(fh));
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let block_size = self.fs.context().config().filesystem.block_size.max(1);
        reply.statfs(0, 0, 0, 0, 0, block_size, 255, block_size);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("opts", &self.opts)
            .field("inodes", &self.inodes.len())
            .field("handles", &self.handles.len())
            .field("unmounter", &self.unmounter)
            .finish()
    }
}
