/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("illegal packet: {0}")]
    IllegalPacket(#[from] cedar_crypto::CodecError),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("no read activity within the connection timeout")]
    ConnectionTimeout,

    #[error("all fibers for this bundle were lost")]
    AllFibersLost,

    #[error("bundle id {0} already exists in this collection")]
    DuplicatedBundle(u32),

    #[error("bundle id {0} not found")]
    UnknownBundle(u32),

    #[error("fiber write failed: {0}")]
    FiberWrite(#[source] std::io::Error),

    #[error("fiber read failed: {0}")]
    FiberRead(#[source] std::io::Error),

    #[error("bundle is closed")]
    BundleClosed,
}

pub type CoreResult<T> = Result<T, CoreError>;
