// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::sync::mpsc;
use std::time::Duration;

use rstest::rstest;

use super::{ProcessHandle, ProcessState};
use crate::ArgumentChain;
use crate::fixtures::*;

fn sh(script: &str) -> ArgumentChain {
    ArgumentChain::from_iter(["sh", "-c", script])
}

fn spawn(script: &str) -> ProcessHandle {
    ProcessHandle::spawn(&sh(script), std::path::Path::new("/")).expect("spawn should succeed")
}

/// A running process always has a pid, and a finished one never does
fn assert_invariant(handle: &ProcessHandle) {
    match handle.state() {
        ProcessState::Running => assert!(handle.pid().is_some(), "{handle:?}"),
        ProcessState::Done | ProcessState::Error => assert!(handle.pid().is_none(), "{handle:?}"),
    }
    assert_eq!(handle.is_running(), handle.state() == ProcessState::Running);
}

#[rstest]
fn test_spawn_without_output_is_finished() {
    let handle = spawn("exit 0");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Done);
}

#[rstest]
fn test_spawn_failing_without_output_is_error() {
    let handle = spawn("exit 4");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Error);
}

#[rstest]
fn test_spawn_missing_program_is_error() {
    let argv = ArgumentChain::new("/definitely/not/a/real/program");
    let handle = ProcessHandle::spawn(&argv, std::path::Path::new("/"))
        .expect("a missing program should not be fatal");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Error);
}

#[rstest]
fn test_spawn_with_output_is_running() {
    let handle = spawn("echo hello");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Running);
    assert_eq!(handle.offset(), 0);
}

#[rstest]
fn test_read_lines_until_done() {
    let mut handle = spawn("echo one; echo two");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("one"));
    assert_invariant(&handle);
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("two"));
    assert_eq!(handle.offset(), 8, "newlines should be counted as consumed");
    assert_eq!(handle.read_line().unwrap(), None);
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Done);
    assert_eq!(handle.offset(), 8);
}

#[rstest]
fn test_read_line_without_trailing_newline() {
    let mut handle = spawn("printf abc");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("abc"));
    assert_eq!(handle.offset(), 3);
    assert_eq!(handle.read_line().unwrap(), None);
    assert_eq!(handle.state(), ProcessState::Done);
}

#[rstest]
fn test_read_line_keeps_empty_lines() {
    let mut handle = spawn("printf 'a\\n\\nb\\n'");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("a"));
    assert_eq!(handle.read_line().unwrap().as_deref(), Some(""));
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("b"));
    assert_eq!(handle.read_line().unwrap(), None);
}

#[rstest]
fn test_read_bytes_short_read_finishes() {
    let mut handle = spawn("printf hello");
    let mut buf = [0u8; 3];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"hel");
    assert_eq!(handle.state(), ProcessState::Running);

    let mut buf = [0u8; 10];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"lo");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Done);
    assert_eq!(handle.offset(), 5);

    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 0);
    assert_eq!(handle.offset(), 5);
}

#[rstest]
fn test_read_bytes_reports_exit_status() {
    let mut handle = spawn("printf data; exit 2");
    let mut buf = [0u8; 16];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 4);
    assert_eq!(handle.state(), ProcessState::Error);
}

#[rstest]
fn test_mixed_line_and_byte_reads_share_offset() {
    let mut handle = spawn("echo header; printf body");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("header"));
    let mut buf = [0u8; 4];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"body");
    assert_eq!(handle.offset(), 11);
}

#[rstest]
fn test_drain_and_close_is_final() {
    let mut handle = spawn("echo a; echo b; exit 3");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("a"));
    handle.drain_and_close().unwrap();
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Error);
    let offset = handle.offset();

    assert_eq!(handle.read_line().unwrap(), None);
    let mut buf = [0u8; 8];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 0);
    handle.drain_and_close().unwrap();
    assert_eq!(handle.state(), ProcessState::Error);
    assert_eq!(handle.offset(), offset);
}

#[rstest]
fn test_drain_and_close_large_output() {
    let mut handle = spawn("i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("line 0"));
    handle.drain_and_close().unwrap();
    assert_eq!(handle.state(), ProcessState::Done);
}

#[rstest]
fn test_spawn_runs_in_working_dir(tmpdir: tempfile::TempDir) {
    let mut handle = ProcessHandle::spawn(&sh("pwd -P"), tmpdir.path()).unwrap();
    let line = handle.read_line().unwrap().expect("pwd should print a line");
    assert_eq!(
        std::path::PathBuf::from(line),
        tmpdir.path().canonicalize().unwrap()
    );
}

#[rstest]
fn test_spawn_passes_arguments_verbatim(tmpdir: tempfile::TempDir) {
    let script = write_script(tmpdir.path(), "args.sh", r#"for a in "$@"; do echo "[$a]"; done"#);
    let argv = ArgumentChain::split(&format!("sh {}  two", script.display())).append("last");
    let mut handle = ProcessHandle::spawn(&argv, tmpdir.path()).unwrap();
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("[]"));
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("[two]"));
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("[last]"));
    assert_eq!(handle.read_line().unwrap(), None);
}

#[rstest]
fn test_spawn_with_nul_byte_is_error() {
    let argv = ArgumentChain::split("sh\0x").append("child");
    let handle = ProcessHandle::spawn(&argv, std::path::Path::new("/"))
        .expect("a nul byte in the command should not be fatal");
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Error);
}

/// Run `op` on another thread, failing if it does not finish in time
fn within_timeout<T, F>(op: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (send, recv) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = send.send(op());
    });
    recv.recv_timeout(Duration::from_secs(5))
        .expect("operation should not wait for the end of an endless output")
}

#[rstest]
fn test_close_endless_output() {
    let mut handle = spawn("exec yes");
    let mut buf = [0u8; 10];
    assert_eq!(handle.read_bytes(&mut buf).unwrap(), 10);
    assert_eq!(&buf, b"y\ny\ny\ny\ny\n");

    let handle = within_timeout(move || {
        handle.close().unwrap();
        handle
    });
    assert_invariant(&handle);
    assert_eq!(handle.state(), ProcessState::Error, "killed processes are not done");
    assert_eq!(handle.offset(), 10);
}

#[rstest]
fn test_close_finished_process_is_noop() {
    let mut handle = spawn("echo done");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("done"));
    assert_eq!(handle.read_line().unwrap(), None);
    handle.close().unwrap();
    assert_eq!(handle.state(), ProcessState::Done);
}

#[rstest]
fn test_drop_endless_output() {
    let mut handle = spawn("exec yes");
    assert_eq!(handle.read_line().unwrap().as_deref(), Some("y"));
    within_timeout(move || drop(handle));
}
