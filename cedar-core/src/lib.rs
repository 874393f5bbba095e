/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! The bundle/fiber reliable encrypted multiplexed transport: the core of
//! the Cedar tunnel. Builds atop `cedar-crypto` for the record codec and key
//! schedule; owns everything above the wire format — packets, fibers,
//! handshake, bundles, bundle collections, and the `Endpoint` applications
//! drive to send and receive messages.

pub mod bundle;
pub mod bundle_collection;
pub mod codec_async;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod fiber;
pub mod handshake;
pub mod packet;
pub mod seq;

pub use bundle::Bundle;
pub use bundle_collection::BundleCollection;
pub use endpoint::{Endpoint, Role};
pub use error::{CoreError, CoreResult};
pub use packet::{Packet, PacketType};
