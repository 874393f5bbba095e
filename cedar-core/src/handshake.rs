/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Handshake message codec and nonce replay guard.
//!
//! Grounded on `original_source/libcedar/bundle/handshake.go`. Four message
//! flavors travel over a fiber's record stream before it is attached to a
//! bundle: `Apply` and `Add` (client→server), `Reply` and `Refuse`
//! (server→client).

use parking_lot::Mutex;

use crate::constants::{ADD_MAGIC, APPLY_MAGIC, NONCE_RING_SIZE, REFUSE_MAGIC, REPLY_MAGIC};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    Apply { nonce: [u8; 8] },
    Add { nonce: [u8; 8], bundle_id: u32 },
    Reply { bundle_id: u32, id_s2c: u32, id_c2s: u32 },
    Refuse,
}

impl HandshakeMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HandshakeMessage::Apply { nonce } => {
                let mut out = Vec::with_capacity(16);
                out.extend_from_slice(APPLY_MAGIC);
                out.extend_from_slice(nonce);
                out
            }
            HandshakeMessage::Add { nonce, bundle_id } => {
                let mut out = Vec::with_capacity(20);
                out.extend_from_slice(ADD_MAGIC);
                out.extend_from_slice(nonce);
                out.extend_from_slice(&bundle_id.to_be_bytes());
                out
            }
            HandshakeMessage::Reply { bundle_id, id_s2c, id_c2s } => {
                let mut out = Vec::with_capacity(20);
                out.extend_from_slice(REPLY_MAGIC);
                out.extend_from_slice(&bundle_id.to_be_bytes());
                out.extend_from_slice(&id_s2c.to_be_bytes());
                out.extend_from_slice(&id_c2s.to_be_bytes());
                out
            }
            HandshakeMessage::Refuse => REFUSE_MAGIC.to_vec(),
        }
    }

    pub fn decode(buf: &[u8]) -> CoreResult<Self> {
        if buf.len() >= 8 && &buf[..8] == APPLY_MAGIC && buf.len() == 16 {
            let mut nonce = [0u8; 8];
            nonce.copy_from_slice(&buf[8..16]);
            return Ok(HandshakeMessage::Apply { nonce });
        }
        if buf.len() >= 8 && &buf[..8] == ADD_MAGIC && buf.len() == 20 {
            let mut nonce = [0u8; 8];
            nonce.copy_from_slice(&buf[8..16]);
            let bundle_id = u32::from_be_bytes(buf[16..20].try_into().unwrap());
            return Ok(HandshakeMessage::Add { nonce, bundle_id });
        }
        if buf.len() >= 8 && &buf[..8] == REPLY_MAGIC && buf.len() == 20 {
            let bundle_id = u32::from_be_bytes(buf[8..12].try_into().unwrap());
            let id_s2c = u32::from_be_bytes(buf[12..16].try_into().unwrap());
            let id_c2s = u32::from_be_bytes(buf[16..20].try_into().unwrap());
            return Ok(HandshakeMessage::Reply { bundle_id, id_s2c, id_c2s });
        }
        if buf.len() == 8 && buf == REFUSE_MAGIC {
            return Ok(HandshakeMessage::Refuse);
        }
        Err(CoreError::HandshakeFailed("unrecognized handshake message".into()))
    }
}

/// Fixed-size replay ring: rejects any nonce already present, otherwise
/// records it, evicting the oldest entry once full.
pub struct NonceRing {
    seen: Mutex<RingState>,
}

struct RingState {
    slots: Vec<[u8; 8]>,
    cursor: usize,
}

impl NonceRing {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(RingState { slots: Vec::with_capacity(NONCE_RING_SIZE), cursor: 0 }),
        }
    }

    /// Returns `true` if `nonce` was accepted (first time seen), `false` if
    /// it is a replay.
    pub fn accept(&self, nonce: [u8; 8]) -> bool {
        let mut state = self.seen.lock();
        if state.slots.iter().any(|n| *n == nonce) {
            return false;
        }
        if state.slots.len() < NONCE_RING_SIZE {
            state.slots.push(nonce);
        } else {
            let cursor = state.cursor;
            state.slots[cursor] = nonce;
            state.cursor = (cursor + 1) % NONCE_RING_SIZE;
        }
        true
    }
}

impl Default for NonceRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_round_trips() {
        let msg = HandshakeMessage::Apply { nonce: [1, 2, 3, 4, 5, 6, 7, 8] };
        let bytes = msg.encode();
        assert_eq!(HandshakeMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn reply_round_trips() {
        let msg = HandshakeMessage::Reply { bundle_id: 7, id_s2c: 1000, id_c2s: 2000 };
        let bytes = msg.encode();
        assert_eq!(HandshakeMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn refuse_round_trips() {
        let msg = HandshakeMessage::Refuse;
        assert_eq!(HandshakeMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn nonce_ring_rejects_replays() {
        let ring = NonceRing::new();
        assert!(ring.accept([1; 8]));
        assert!(!ring.accept([1; 8]));
        assert!(ring.accept([2; 8]));
    }

    #[test]
    fn nonce_ring_evicts_oldest_after_wrap() {
        let ring = NonceRing::new();
        for i in 0..NONCE_RING_SIZE {
            let mut n = [0u8; 8];
            n[..4].copy_from_slice(&(i as u32).to_be_bytes());
            assert!(ring.accept(n));
        }
        let mut first = [0u8; 8];
        first[..4].copy_from_slice(&0u32.to_be_bytes());
        // the ring is now full; inserting one more evicts slot 0, so the
        // original first nonce becomes acceptable again.
        let mut fresh = [0u8; 8];
        fresh[..4].copy_from_slice(&(NONCE_RING_SIZE as u32).to_be_bytes());
        assert!(ring.accept(fresh));
        assert!(ring.accept(first));
    }
}
