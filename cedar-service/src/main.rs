/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

mod cli;
mod config;
mod logging;

use anyhow::{Context, Result};
use cedar_core::endpoint::{Endpoint, Role};
use clap::Parser;
use tracing::info;

use cli::{Cli, Command};
use config::{Config, RoleConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    logging::init();

    let config = Config::load(&cli.config).await.context("loading configuration")?;
    let settings = &config.settings;

    match (&cli.command, settings.role) {
        (Command::Server, RoleConfig::Server) => run_server(settings).await,
        (Command::Client { .. }, RoleConfig::Client) => run_client(&cli.command, settings).await,
        _ => anyhow::bail!("subcommand and config `role` must agree (server/client)"),
    }
}

async fn run_server(settings: &config::Settings) -> Result<()> {
    let endpoint = Endpoint::new(Role::Server, settings.addr, &settings.passphrase, Some(settings.buffer_len));
    endpoint.set_on_received(|bundle_id, payload| {
        info!(bundle_id, bytes = payload.len(), "received application data");
    });
    endpoint.set_on_bundle_lost(|bundle_id, error| {
        tracing::warn!(bundle_id, %error, "bundle lost");
    });

    info!(addr = %settings.addr, "starting Cedar server");
    endpoint.server_start().await.context("server accept loop exited")?;
    Ok(())
}

async fn run_client(command: &Command, settings: &config::Settings) -> Result<()> {
    let fiber_count = match command {
        Command::Client { fibers } => fibers.unwrap_or(settings.fiber_count),
        Command::Server => settings.fiber_count,
    };

    let endpoint = Endpoint::new(Role::Client, settings.addr, &settings.passphrase, Some(settings.buffer_len));
    endpoint.set_on_received(|bundle_id, payload| {
        info!(bundle_id, bytes = payload.len(), "received application data");
    });
    endpoint.set_on_bundle_lost(|bundle_id, error| {
        tracing::warn!(bundle_id, %error, "bundle lost");
    });

    let bundle_id = endpoint
        .create_connection(fiber_count.max(1))
        .await
        .context("establishing bundle with server")?;
    info!(bundle_id, fibers = fiber_count, "bundle established");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    Ok(())
}
