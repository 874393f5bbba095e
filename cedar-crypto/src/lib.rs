/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Cryptographic primitives for the Cedar tunnel transport: passphrase key
//! schedule, the authenticated record codec, a CSPRNG wrapper, and a
//! zeroizing secret type. Kept as its own crate so `cedar-core` never has to
//! import `aes`/`hmac`/`sha2` directly.

pub mod aes_cbc;
pub mod hash;
pub mod kdf;
pub mod random;
pub mod record;
pub mod secret;

pub use kdf::KeySchedule;
pub use record::{
    decode_head, decode_rest, encode_record, read_record, write_record, CodecError, RecordHead,
    HEAD_ON_WIRE_LEN, MAX_PLAINTEXT_LEN,
};
pub use secret::Secret;
