// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use rstest::rstest;

use super::{Config, Context, FilesystemConfig};
use crate::ArgumentChain;

#[rstest]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.filesystem.nominal_size, 1);
    assert_eq!(config.filesystem.block_size, 512);
    assert_eq!(config.filesystem.max_read, 512);
}

#[rstest]
fn test_config_load_empty_string() {
    let config = Config::load_string("").unwrap();
    assert_eq!(config, Config::default());
}

#[rstest]
fn test_config_load_string() {
    let config = Config::load_string("[filesystem]\nnominal_size=4096\nmax_read=1024").unwrap();
    assert_eq!(
        config.filesystem,
        FilesystemConfig {
            nominal_size: 4096,
            block_size: 512,
            max_read: 1024,
        }
    );
}

#[rstest]
fn test_config_load_invalid_value() {
    Config::load_string("[filesystem]\nmax_read=lots")
        .expect_err("non-numeric sizes should be rejected");
}

#[rstest]
fn test_context_accessors() {
    let context = Context::new(ArgumentChain::split("sh root.sh"), "/tmp", Config::default());
    assert_eq!(context.root_command().program(), "sh");
    assert_eq!(context.working_dir(), std::path::Path::new("/tmp"));
    assert_eq!(context.config(), &Config::default());
}
