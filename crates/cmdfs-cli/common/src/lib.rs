// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

//! Common macros and argument structures for the cmdfs command line

mod args;

pub use args::{Logging, configure_logging, exit_code};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
