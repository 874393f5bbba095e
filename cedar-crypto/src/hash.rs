/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! HMAC-SHA512 helper used to authenticate records.

use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Compute HMAC-SHA512(`key`, `data`), truncated to the first 8 bytes.
///
/// Eight bytes is a deliberately short tag: the codec trades MAC strength
/// for a compact head, relying on the surrounding handshake and passphrase
/// secrecy rather than the tag alone to repel forgery.
pub fn truncated_mac(key: &[u8], data: &[u8]) -> [u8; 8] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; 8];
    out.copy_from_slice(&full[..8]);
    out
}
