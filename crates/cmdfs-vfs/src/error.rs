// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use miette::Diagnostic;
use thiserror::Error;

/// A specialized result for mount setup
pub type Result<T> = std::result::Result<T, Error>;

/// Errors specific to establishing a mount.
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    /// Write access was requested for a read-only filesystem
    #[error("rw mode is not supported")]
    #[diagnostic(code("cmdfs::read_only"))]
    ReadOnly,

    /// A mount option was given that is not understood
    #[error("Unsupported mount option, or missing value: {0}")]
    UnsupportedOption(String),
}
