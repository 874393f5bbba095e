/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Record codec: encrypt/authenticate one framed unit with [`encode_record`],
//! decrypt/authenticate it back in two phases ([`decode_head`] then
//! [`decode_rest`]) so callers can read the fixed-size head off a stream
//! before they know how many more bytes to read for the body. [`write_record`]
//! / [`read_record`] wrap both phases for callers holding a blocking
//! `Read`/`Write` stream (tests, or any synchronous transport); async
//! transports (the real fiber socket) drive the same two phases directly
//! with `AsyncReadExt`/`AsyncWriteExt`.
//!
//! Wire layout (see `examples/original_source/libcedar/bundle/encryptor.go`
//! for the reference byte order this mirrors): `fakeIV:8B | hmac:8B |
//! timestamp:4B | length:4B | plaintext (length bytes) | random pad to a
//! 16-byte boundary`. Everything from byte 8 onward is CBC-encrypted; the
//! HMAC covers the whole record with its own slot zeroed.

use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

use crate::aes_cbc::{self, BLOCK_SIZE};
use crate::hash::truncated_mac;
use crate::kdf::KeySchedule;
use crate::random;

const HEAD_LEN: usize = 8 + 8 + 4 + 4; // fakeIV | hmac | timestamp | length
const TIMESTAMP_TOLERANCE_SECS: i64 = 600;

/// Size of the head every record starts with: 8 cleartext fakeIV bytes plus
/// one encrypted 16-byte block (hmac | timestamp | length).
pub const HEAD_ON_WIRE_LEN: usize = 8 + BLOCK_SIZE;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("record timestamp outside acceptable window")]
    TimestampOutOfRange,
    #[error("record authentication failed")]
    AuthenticationFailed,
    #[error("record length {0} exceeds maximum frame size")]
    LengthTooLarge(u32),
}

/// Maximum plaintext payload accepted by a single record, chosen generously
/// above any realistic packet but well short of letting a corrupt length
/// field trigger an unbounded allocation.
pub const MAX_PLAINTEXT_LEN: u32 = 1 << 20;

fn derive_iv(keys: &KeySchedule, fake_iv: &[u8; 8]) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..8].copy_from_slice(&keys.iv_pad.as_bytes()[..8]);
    block[8..].copy_from_slice(fake_iv);
    let mut key = keys.iv_key.first_n::<32>();
    aes_cbc::encrypt_block(&key, &mut block);
    key.zeroize();
    block
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as u32
}

fn padded_body_len(length: usize) -> usize {
    let body_len = HEAD_LEN - 8 + length; // hmac | timestamp | length | plaintext
    ((body_len + BLOCK_SIZE - 1) / BLOCK_SIZE) * BLOCK_SIZE
}

/// Encrypt `plaintext` into a standalone record. No I/O.
pub fn encode_record(keys: &KeySchedule, plaintext: &[u8]) -> Vec<u8> {
    let mut fake_iv = [0u8; 8];
    random::fill(&mut fake_iv);
    let iv = derive_iv(keys, &fake_iv);

    let padded_body_len = padded_body_len(plaintext.len());
    let total_len = 8 + padded_body_len;

    let mut buf = vec![0u8; total_len];
    buf[..8].copy_from_slice(&fake_iv);
    // buf[8..16] is the hmac slot, left zero for now.
    buf[16..20].copy_from_slice(&now_secs().to_be_bytes());
    buf[20..24].copy_from_slice(&(plaintext.len() as u32).to_be_bytes());
    buf[24..24 + plaintext.len()].copy_from_slice(plaintext);
    let pad_start = 24 + plaintext.len();
    random::fill(&mut buf[pad_start..total_len]);

    let mac = truncated_mac(keys.mac_key.as_bytes(), &buf);
    buf[8..16].copy_from_slice(&mac);

    let mut common_key = keys.common_key.first_n::<32>();
    aes_cbc::cbc_encrypt(&common_key, &iv, &mut buf[8..]);
    common_key.zeroize();

    buf
}

/// State recovered after decrypting a record's fixed-size head, before the
/// variable-length body has been read off the stream.
pub struct RecordHead {
    fake_iv: [u8; 8],
    first_block_ciphertext: [u8; BLOCK_SIZE],
    first_block_plaintext: [u8; BLOCK_SIZE],
    received_mac: [u8; 8],
    length: u32,
}

impl RecordHead {
    /// Number of remaining bytes the caller must read to complete the body.
    pub fn remaining_len(&self) -> usize {
        padded_body_len(self.length as usize) - BLOCK_SIZE
    }
}

/// Decrypt the fixed-size head (`fakeIV | encrypted block`) and validate the
/// timestamp/length, but do not yet verify the HMAC (that needs the body).
pub fn decode_head(keys: &KeySchedule, head: &[u8; HEAD_ON_WIRE_LEN]) -> Result<RecordHead, CodecError> {
    let mut fake_iv = [0u8; 8];
    fake_iv.copy_from_slice(&head[..8]);
    let iv = derive_iv(keys, &fake_iv);

    let mut common_key = keys.common_key.first_n::<32>();

    let mut first_block_ciphertext = [0u8; BLOCK_SIZE];
    first_block_ciphertext.copy_from_slice(&head[8..]);

    let mut first_block_plaintext = first_block_ciphertext;
    aes_cbc::cbc_decrypt(&common_key, &iv, &mut first_block_plaintext);
    common_key.zeroize();

    let received_mac: [u8; 8] = first_block_plaintext[0..8].try_into().unwrap();
    let timestamp = u32::from_be_bytes(first_block_plaintext[8..12].try_into().unwrap());
    let length = u32::from_be_bytes(first_block_plaintext[12..16].try_into().unwrap());

    if length > MAX_PLAINTEXT_LEN {
        return Err(CodecError::LengthTooLarge(length));
    }

    let now = now_secs() as i64;
    if (now - timestamp as i64).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(CodecError::TimestampOutOfRange);
    }

    Ok(RecordHead { fake_iv, first_block_ciphertext, first_block_plaintext, received_mac, length })
}

/// Decrypt the remaining `head.remaining_len()` bytes of the body, verify
/// the HMAC over the whole record, and return the plaintext payload.
pub fn decode_rest(keys: &KeySchedule, head: RecordHead, mut rest: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    let mut common_key = keys.common_key.first_n::<32>();

    // CBC chains each block's decryption off the previous block's
    // ciphertext; the first body block chains off the head's ciphertext
    // block, which we still have.
    aes_cbc::cbc_decrypt(&common_key, &head.first_block_ciphertext, &mut rest);
    common_key.zeroize();

    let mut full = vec![0u8; 8 + BLOCK_SIZE + rest.len()];
    full[..8].copy_from_slice(&head.fake_iv);
    full[8..8 + BLOCK_SIZE].copy_from_slice(&head.first_block_plaintext);
    full[8 + BLOCK_SIZE..].copy_from_slice(&rest);

    full[8..16].fill(0);
    let expected_mac = truncated_mac(keys.mac_key.as_bytes(), &full);

    if expected_mac.ct_eq(&head.received_mac).unwrap_u8() != 1 {
        return Err(CodecError::AuthenticationFailed);
    }

    Ok(full[24..24 + head.length as usize].to_vec())
}

/// Encrypt `plaintext` and write one record to `out`. Returns the number of
/// bytes written.
pub fn write_record<W: Write>(out: &mut W, keys: &KeySchedule, plaintext: &[u8]) -> Result<usize, CodecError> {
    let buf = encode_record(keys, plaintext);
    out.write_all(&buf)?;
    Ok(buf.len())
}

/// Read and decrypt one record from `src`, returning its plaintext payload.
pub fn read_record<R: Read>(src: &mut R, keys: &KeySchedule) -> Result<Vec<u8>, CodecError> {
    let mut head_bytes = [0u8; HEAD_ON_WIRE_LEN];
    src.read_exact(&mut head_bytes)?;
    let head = decode_head(keys, &head_bytes)?;

    let mut rest = vec![0u8; head.remaining_len()];
    src.read_exact(&mut rest)?;

    decode_rest(keys, head, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeySchedule {
        KeySchedule::from_passphrase("integration-test-passphrase")
    }

    #[test]
    fn round_trip_preserves_plaintext() {
        let keys = keys();
        for len in (5..64).step_by(7) {
            let plaintext: Vec<u8> = (0..len as u8).collect();
            let mut buf = Vec::new();
            write_record(&mut buf, &keys, &plaintext).unwrap();
            let mut cursor = io::Cursor::new(buf);
            let out = read_record(&mut cursor, &keys).unwrap();
            assert_eq!(out, plaintext);
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let keys = keys();
        let mut buf = Vec::new();
        write_record(&mut buf, &keys, b"hello world").unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let mut cursor = io::Cursor::new(buf);
        assert!(read_record(&mut cursor, &keys).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let keys_a = KeySchedule::from_passphrase("passphrase-a");
        let keys_b = KeySchedule::from_passphrase("passphrase-b");
        let mut buf = Vec::new();
        write_record(&mut buf, &keys_a, b"hello world").unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert!(read_record(&mut cursor, &keys_b).is_err());
    }
}
