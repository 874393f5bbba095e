/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! On-disk configuration: a thin top-level `Config` wrapping a `Settings`
//! block that actually carries the tunables, so the file can grow new
//! top-level sections later without disturbing this one.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleConfig {
    Server,
    Client,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub role: RoleConfig,
    /// Bind address for a server, or the remote address to dial for a
    /// client.
    pub addr: SocketAddr,
    pub passphrase: String,
    /// In-flight send window per bundle.
    #[serde(default = "Settings::default_buffer_len")]
    pub buffer_len: usize,
    /// Number of parallel TCP carriers a client opens per bundle.
    #[serde(default = "Settings::default_fiber_count")]
    pub fiber_count: usize,
}

impl Settings {
    fn default_buffer_len() -> usize {
        cedar_core::constants::DEFAULT_BUFFER_LEN
    }

    fn default_fiber_count() -> usize {
        1
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub settings: Settings,
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
