// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use clap::Parser;
use rstest::rstest;

use super::CmdFuse;

#[rstest]
fn test_root_command_is_everything_after_separator() {
    let opt = CmdFuse::try_parse_from([
        "cmdfs-fuse",
        "-o",
        "allow_other,max_read=64",
        "/mnt/tree",
        "--",
        "python3",
        "tree.py",
        "-v",
        "",
    ])
    .unwrap();
    assert_eq!(opt.mountpoint, std::path::Path::new("/mnt/tree"));
    assert_eq!(opt.options, vec!["allow_other", "max_read=64"]);
    assert_eq!(opt.logging.verbose, 0, "flags after -- belong to the command");
    let root = opt.root_command().unwrap();
    assert_eq!(root.program(), "python3");
    assert_eq!(root.args(), &["tree.py", "-v", ""]);
}

#[rstest]
fn test_root_command_is_required() {
    assert!(CmdFuse::try_parse_from(["cmdfs-fuse", "/mnt/tree"]).is_err());
    assert!(CmdFuse::try_parse_from(["cmdfs-fuse", "/mnt/tree", "--"]).is_err());
}

#[rstest]
fn test_verbosity_before_mountpoint() {
    let opt = CmdFuse::try_parse_from(["cmdfs-fuse", "-vv", "/mnt/tree", "--", "ls"]).unwrap();
    assert_eq!(opt.logging.verbose, 2);
    assert_eq!(opt.root_command().unwrap().len(), 1);
}

#[rstest]
fn test_empty_command_name_is_rejected() {
    let opt = CmdFuse::try_parse_from(["cmdfs-fuse", "/mnt/tree", "--", "", "arg"]).unwrap();
    assert!(opt.root_command().is_err());
}
