/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Command-line surface: a global config override plus one subcommand per
//! role.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cedar", about = "Encrypted tunneling proxy transport", version)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", global = true, default_value = "cedar.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run as the server (exit) endpoint: accept connections and allocate bundles.
    Server,
    /// Run as the client (frontend) endpoint: dial the configured server.
    Client {
        /// Number of parallel fibers to open for the bundle, overriding the
        /// config file's `fiber_count`.
        #[arg(long)]
        fibers: Option<usize>,
    },
}
