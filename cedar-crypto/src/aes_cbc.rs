/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! AES-256 primitives backing the record codec: a single-block encrypt used
//! to derive the per-record IV, and whole-buffer CBC encrypt/decrypt over
//! data that is already padded to the block size.

use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut};
use aes::Aes256;

pub const BLOCK_SIZE: usize = 16;

/// Encrypt exactly one 16-byte block under `key` (ECB, single block — used
/// only to turn `ivPad || fakeIV` into the real CBC IV, never for bulk data).
pub fn encrypt_block(key: &[u8; 32], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes256::new(key.into());
    let mut generic = aes::cipher::generic_array::GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut generic);
    block.copy_from_slice(&generic);
}

type CbcEnc = cbc::Encryptor<Aes256>;
type CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt `data` in place with AES-256-CBC under `key`/`iv`. `data.len()`
/// must be a multiple of [`BLOCK_SIZE`]; the caller is responsible for
/// padding.
pub fn cbc_encrypt(key: &[u8; 32], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    assert_eq!(data.len() % BLOCK_SIZE, 0, "CBC buffer must be block-aligned");
    let len = data.len();
    CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .expect("block-aligned buffer never overflows NoPadding");
}

/// Decrypt `data` in place with AES-256-CBC under `key`/`iv`.
pub fn cbc_decrypt(key: &[u8; 32], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    assert_eq!(data.len() % BLOCK_SIZE, 0, "CBC buffer must be block-aligned");
    CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .expect("block-aligned buffer round-trips under NoPadding");
}
