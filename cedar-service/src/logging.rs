/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Structured logging setup, built on `tracing` + `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber driven by `RUST_LOG`, defaulting to `info`
/// when the variable is unset or unparseable.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
