// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use cmdfs::{ArgumentChain, FilesystemAdapter};
use cmdfs_cli_common as cli;
use cmdfs_vfs::{Config, Session};
use fuser::MountOption;
use tokio::signal::unix::{SignalKind, signal};

#[cfg(test)]
#[path = "./cmd_fuse_test.rs"]
mod cmd_fuse_test;

fn main() {
    // because this function exits right away it does not
    // properly handle destruction of data, so we put the actual
    // logic into a separate function/scope
    std::process::exit(main2())
}
fn main2() -> i32 {
    let opt = CmdFuse::parse();
    if let Err(err) = opt.logging.configure() {
        eprintln!("{err:?}");
        return 1;
    }

    let config = match cmdfs::load_config() {
        Err(err) => {
            tracing::error!(err = ?err, "failed to load config");
            return 1;
        }
        Ok(config) => config,
    };
    let result = opt.run(config);

    cli::handle_result!(result)
}

/// Mount a tree of commands as a read-only filesystem
#[derive(Debug, Parser)]
#[clap(name = "cmdfs-fuse", version)]
pub struct CmdFuse {
    #[clap(flatten)]
    logging: cli::Logging,

    /// Options for the mount in the form opt1,opt2=value
    ///
    /// In addition to most existing fuse mount options, the following custom
    /// options are also supported:
    ///
    ///  uid      - the user id that should own all files in the mount, defaults to
    ///             the effective user id of the caller
    ///  gid      - the group id that should own all files in the mount, defaults to
    ///             the effective group id of the caller
    ///  max_read - the largest read that the kernel may request at once
    #[clap(long, short, value_delimiter = ',')]
    options: Vec<String>,

    /// The location where to mount the command tree
    mountpoint: PathBuf,

    /// The root command and its arguments, which answer for the top
    /// of the filesystem
    #[clap(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl CmdFuse {
    pub fn run(&self, config: cmdfs::Config) -> Result<i32> {
        // every command of the tree runs from where we were started
        let working_dir =
            std::env::current_dir().context("Failed to determine the working directory")?;

        let root_command = self.root_command()?;
        let mut opts = Config::new(&config);
        opts.apply_options(self.options.as_slice())?;
        tracing::debug!("FUSE Config: {opts:#?}");

        let mountpoint = self
            .mountpoint
            .canonicalize()
            .context("Invalid mount point")?;

        if !nix::unistd::geteuid().is_root() {
            // unprivileged callers must have write access to the directory that
            // they are trying to mount over.
            nix::unistd::access(&mountpoint, nix::unistd::AccessFlags::W_OK)
                .context("Must have write access to mountpoint")?;
        }

        tracing::debug!(
            %root_command,
            working_dir = %working_dir.display(),
            "Establishing fuse session..."
        );
        let context = cmdfs::Context::new(root_command, working_dir, config);
        let mount_opts = opts.mount_options.iter().cloned().collect::<Vec<MountOption>>();
        let fs = Session::new(FilesystemAdapter::new(context), opts);
        let unmounter = fs.unmounter();
        let mut session = fuser::Session::new(fs, &mountpoint, &mount_opts)
            .context("Failed to create a FUSE session")?;
        unmounter.set(session.unmount_callable());

        // requests are answered one at a time, so a single
        // thread is all that the filesystem can use
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to establish runtime")?;

        let result = rt.block_on(async move {
            let mut interrupt =
                signal(SignalKind::interrupt()).context("interrupt signal handler")?;
            let mut quit = signal(SignalKind::quit()).context("quit signal handler")?;
            let mut terminate =
                signal(SignalKind::terminate()).context("terminate signal handler")?;

            tracing::info!(mountpoint = %mountpoint.display(), "Starting FUSE filesystem");
            let fut = tokio::task::spawn_blocking(move || session.run());
            let received = tokio::select! {
                res = fut => {
                    tracing::info!("Filesystem shutting down");
                    return res.context("FUSE session failed");
                }
                // we explicitly catch any signal related to interruption
                // and will act by shutting down the filesystem early
                _ = terminate.recv() => "Terminate",
                _ = interrupt.recv() => "Interrupt",
                _ = quit.recv() => "Quit",
            };
            tracing::info!("{received} signal received, unmounting {}", mountpoint.display());
            unmounter.unmount();
            Err(anyhow!("{received} signal received, filesystem shutting down"))
        });

        // the blocking session may still be waiting on the kernel
        rt.shutdown_timeout(std::time::Duration::from_secs(2));
        result??;
        Ok(0)
    }

    fn root_command(&self) -> Result<ArgumentChain> {
        let command: ArgumentChain = self.command.iter().cloned().collect();
        if command.is_empty() || command.program().is_empty() {
            bail!("A root command is required after '--'");
        }
        Ok(command)
    }
}
