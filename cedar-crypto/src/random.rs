/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Thin wrapper around the OS CSPRNG, kept as its own module so the rest of
//! the crate never has to know which RNG crate backs it (matches the
//! `zerotier_crypto::random` split between a shared module and call sites
//! that just want a `u32`/`u64`/filled buffer).

use rand::RngCore;

#[inline]
pub fn fill(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}

#[inline]
pub fn next_u32() -> u32 {
    rand::thread_rng().next_u32()
}

#[inline]
pub fn next_u64() -> u64 {
    rand::thread_rng().next_u64()
}
