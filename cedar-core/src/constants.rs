/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Tunable constants for the bundle/fiber transport.

use std::time::Duration;

/// A fiber with no read activity for this long is considered dead.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Heartbeat driver wake-up interval.
pub const MIN_HEARTBEAT: Duration = Duration::from_secs(10);

/// How long an unacknowledged send waits before being retransmitted.
pub const RESEND_INTERVAL: Duration = Duration::from_secs(15);

/// Aggregation window for batching received-id acknowledgements.
pub const CONFIRM_WAIT: Duration = Duration::from_millis(1);

/// Delay after the last fiber leaves a bundle before it is declared lost.
pub const GRACE_WINDOW: Duration = Duration::from_secs(180);

/// Default in-flight send window per bundle, overridable via configuration.
pub const DEFAULT_BUFFER_LEN: usize = 100;

/// Size of the handshake nonce replay ring.
pub const NONCE_RING_SIZE: usize = 4096;

/// `seq_check`'s lookback window: ids within this distance behind the
/// expected sequence are treated as already-received duplicates rather than
/// out-of-range garbage.
pub const DUPLICATE_LOOKBACK: u32 = 100_000;

pub const APPLY_MAGIC: &[u8; 8] = b"cEdr_Go!";
pub const ADD_MAGIC: &[u8; 8] = b"gO_ceDR!";
pub const REPLY_MAGIC: &[u8; 8] = b"AccEPt!!";
pub const REFUSE_MAGIC: &[u8; 8] = b"!fAiLEd!";
