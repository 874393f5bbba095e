/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Passphrase-based key schedule.
//!
//! Derives the four 512-bit sub-keys (`ivPad`, `ivKey`, `macKey`, `commonKey`)
//! used by the record codec from a single shared passphrase. The construction
//! mixes the passphrase, a fixed label, and an accumulating SHA-512 digest
//! over 233 rounds, then truncates to the requested bit length.

use sha2::{Digest, Sha512};

use crate::secret::Secret;

const ROUNDS: usize = 233;

/// Derive `bits` bits of key material from `passphrase` and `label`.
///
/// `bits` must be a positive multiple of 8 not exceeding 512.
pub fn derive(passphrase: &str, label: &str, bits: usize) -> Vec<u8> {
    assert!(bits > 0 && bits <= 512 && bits % 8 == 0, "bits must be in 8..=512 and a multiple of 8");

    let head = passphrase.as_bytes();
    let salt = label.as_bytes();
    let tlen = head.len() + salt.len();

    let mut buf = vec![0u8; tlen + 64 * ROUNDS];
    buf[..head.len()].copy_from_slice(head);
    buf[head.len()..tlen].copy_from_slice(salt);

    for round in 0..ROUNDS {
        let end = tlen + round * 64;
        let digest = Sha512::digest(&buf[..end]);
        buf[end..end + 64].copy_from_slice(&digest);
    }

    let final_digest = Sha512::digest(&buf);
    final_digest[..bits / 8].to_vec()
}

/// The four sub-keys used by the record codec, each the full 64-byte output
/// of [`derive`] for a distinct label, held as zeroizing [`Secret`]s so the
/// passphrase-derived key material is wiped from memory when the schedule is
/// dropped.
pub struct KeySchedule {
    pub iv_pad: Secret<64>,
    pub iv_key: Secret<64>,
    pub mac_key: Secret<64>,
    pub common_key: Secret<64>,
}

impl KeySchedule {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let one = |label: &str| -> Secret<64> {
            let v = derive(passphrase, label, 512);
            let mut out = [0u8; 64];
            out.copy_from_slice(&v);
            Secret::new(out)
        };
        Self {
            iv_pad: one("cedar/ivPad"),
            iv_key: one("cedar/ivKey"),
            mac_key: one("cedar/macKey"),
            common_key: one("cedar/commonKey"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Self-consistency vector for this derivation, computed independently
    // and cross-checked against an out-of-tree reimplementation of the same
    // growing-prefix construction. Guards against accidental regressions to
    // the round count or truncation direction, not an external wire vector.
    #[test]
    fn known_vector() {
        let out = derive("MyPassword", "Cedar_Session", 256);
        assert_eq!(
            hex::encode(&out),
            "a332512bca33c1087513a3e026d38a4d9319e27f419f814440a142b4dad40d48"
        );
    }

    #[test]
    fn truncation_length_matches_request() {
        assert_eq!(derive("x", "y", 128).len(), 16);
        assert_eq!(derive("x", "y", 512).len(), 64);
    }

    #[test]
    fn distinct_labels_diverge() {
        let a = derive("shared-secret", "cedar/ivPad", 256);
        let b = derive("shared-secret", "cedar/ivKey", 256);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic]
    fn rejects_non_byte_aligned_bits() {
        derive("x", "y", 255);
    }

    #[test]
    #[should_panic]
    fn rejects_oversized_bits() {
        derive("x", "y", 520);
    }
}
