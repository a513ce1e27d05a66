// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
#[path = "./inode_test.rs"]
mod inode_test;

/// The inode of the filesystem root, as required by FUSE
pub(crate) const ROOT_INODE: u64 = fuser::FUSE_ROOT_ID;

/// Assigns a stable inode to every path that the kernel has seen.
///
/// Nodes have no identity of their own, so the path is the only
/// key. Inodes are never forgotten for the lifetime of the mount.
#[derive(Debug)]
pub(crate) struct InodeTable {
    by_inode: HashMap<u64, PathBuf>,
    by_path: HashMap<PathBuf, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        let root = PathBuf::from("/");
        Self {
            by_inode: HashMap::from([(ROOT_INODE, root.clone())]),
            by_path: HashMap::from([(root, ROOT_INODE)]),
            next_inode: ROOT_INODE + 1,
        }
    }
}

impl InodeTable {
    /// Get the inode for `path`, allocating one if needed
    pub fn insert(&mut self, path: PathBuf) -> u64 {
        if let Some(existing) = self.by_path.get(&path) {
            return *existing;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        self.by_inode.insert(inode, path.clone());
        self.by_path.insert(path, inode);
        inode
    }

    pub fn path(&self, inode: u64) -> Option<&Path> {
        self.by_inode.get(&inode).map(PathBuf::as_path)
    }

    /// The inode of the directory containing `inode`.
    ///
    /// The root is its own parent.
    pub fn parent(&self, inode: u64) -> u64 {
        self.path(inode)
            .and_then(Path::parent)
            .and_then(|parent| self.by_path.get(parent))
            .copied()
            .unwrap_or(ROOT_INODE)
    }

    pub fn len(&self) -> usize {
        self.by_inode.len()
    }
}
