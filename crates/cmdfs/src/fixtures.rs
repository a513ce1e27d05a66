// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

//! Fixtures for testing against real node commands.
//!
//! Node commands are small shell scripts written into a temporary
//! directory, so that tests exercise actual process spawning.

use std::path::{Path, PathBuf};

use rstest::fixture;
use tempfile::TempDir;

use crate::{ArgumentChain, Config, Context};

/// The bytes served by the `/x` file of the [`command_tree`]
pub fn sample_content() -> Vec<u8> {
    (0..3000u32).map(|i| (i % 251) as u8).collect()
}

#[allow(dead_code)]
pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

#[fixture]
pub fn tmpdir() -> TempDir {
    tempfile::Builder::new()
        .prefix("cmdfs-test-")
        .tempdir()
        .expect("failed to establish tmpdir for testing")
}

/// Write a shell script named `name` into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write test script");
    path
}

/// Build a context whose root command runs `script` with sh
pub fn script_context(dir: &Path, script: &Path) -> Context {
    let root_command = ArgumentChain::from_iter(["sh".to_string(), script.display().to_string()]);
    Context::new(root_command, dir, Config::default())
}

/// A tree of node scripts in a temporary directory.
///
/// ```text
/// /                 lists a, b
/// ├── x             file, serves sample_content()
/// ├── sub/          lists deeper, leaf
/// │   ├── leaf      file
/// │   └── deeper/   lists z
/// │       └── z     file
/// ├── fails/        every child exits with an error
/// ├── broken        exits with an error
/// ├── silent        prints nothing
/// ├── plain         prints a line that is not a classification
/// ├── truncated     subdirectory without a command line
/// └── notlisting/   lists with a command that does not print !listing
/// ```
pub struct CommandTree {
    pub dir: TempDir,
    pub context: Context,
}

impl CommandTree {
    /// The path of a file in the tree's temporary directory
    pub fn path<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.dir.path().join(rel)
    }
}

#[fixture]
pub fn command_tree(tmpdir: TempDir) -> CommandTree {
    let dir = tmpdir.path().display().to_string();
    let root = write_script(
        tmpdir.path(),
        "root.sh",
        &format!(
            r#"
case "$1" in
  .)
    echo '!listing'
    echo a
    echo b
    ;;
  x)
    echo '!file_command'
    echo "sh {dir}/cat.sh"
    ;;
  sub)
    echo '!subdir_command'
    echo "sh {dir}/sub.sh"
    ;;
  fails)
    echo '!subdir_command'
    echo "sh {dir}/fails.sh"
    ;;
  notlisting)
    echo '!subdir_command'
    echo "sh {dir}/plain.sh"
    ;;
  truncated)
    echo '!subdir_command'
    ;;
  plain)
    echo hello
    ;;
  silent)
    ;;
  *)
    exit 1
    ;;
esac"#
        ),
    );
    write_script(
        tmpdir.path(),
        "sub.sh",
        &format!(
            r#"
case "$1" in
  .)
    echo '!listing'
    echo deeper
    echo leaf
    ;;
  leaf)
    echo '!file_command'
    echo "sh {dir}/cat.sh"
    ;;
  deeper)
    echo '!subdir_command'
    echo "sh {dir}/deeper.sh"
    ;;
  *)
    exit 1
    ;;
esac"#
        ),
    );
    write_script(
        tmpdir.path(),
        "deeper.sh",
        &format!(
            r#"
case "$1" in
  .)
    echo '!listing'
    echo z
    ;;
  z)
    echo '!file_command'
    echo "sh {dir}/cat.sh"
    ;;
  *)
    exit 1
    ;;
esac"#
        ),
    );
    write_script(tmpdir.path(), "cat.sh", &format!(r#"exec cat "{dir}/content/$1""#));
    write_script(tmpdir.path(), "fails.sh", "exit 1");
    write_script(tmpdir.path(), "plain.sh", "echo hello");

    let content = tmpdir.path().join("content");
    std::fs::create_dir(&content).expect("failed to create content dir");
    std::fs::write(content.join("x"), sample_content()).expect("failed to write content");
    std::fs::write(content.join("leaf"), b"leaf content\n").expect("failed to write content");
    std::fs::write(content.join("z"), b"deepest content\n").expect("failed to write content");

    let context = script_context(tmpdir.path(), &root);
    CommandTree {
        dir: tmpdir,
        context,
    }
}
