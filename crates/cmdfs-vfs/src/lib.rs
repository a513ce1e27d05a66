// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

//! FUSE session for cmdfs
//!
//! Translates the inode based requests of the kernel into the
//! path based operations of a [`cmdfs::FilesystemAdapter`].

#![deny(missing_docs)]

mod error;
pub use error::{Error, Result};

#[cfg(unix)]
mod fuse;
#[cfg(unix)]
mod inode;

#[cfg(unix)]
pub use fuse::{Config, Session, Unmounter, default_mount_options};
