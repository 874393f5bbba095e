/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Packet model: the unit exchanged over a fiber once a record has been
//! decrypted. On-wire layout inside a record is `type:1B | id:4B | payload`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    RequestAllocation = 1,
    AllocationConfirm = 2,
    AddFiber = 3,
    FiberAdded = 4,
    SendData = 5,
    DataReceived = 6,
    Heartbeat = 7,
}

impl PacketType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::RequestAllocation,
            2 => Self::AllocationConfirm,
            3 => Self::AddFiber,
            4 => Self::FiberAdded,
            5 => Self::SendData,
            6 => Self::DataReceived,
            7 => Self::Heartbeat,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u32,
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("packet shorter than the 5-byte header")]
    Truncated,
    #[error("unrecognized packet type byte {0}")]
    UnknownType(u8),
}

impl Packet {
    pub fn heartbeat() -> Self {
        Self { id: 0, kind: PacketType::Heartbeat, payload: Vec::new() }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.payload.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn unpack(buf: &[u8]) -> Result<Self, PacketDecodeError> {
        if buf.len() < 5 {
            return Err(PacketDecodeError::Truncated);
        }
        let kind = PacketType::from_u8(buf[0]).ok_or(PacketDecodeError::UnknownType(buf[0]))?;
        let id = u32::from_be_bytes(buf[1..5].try_into().unwrap());
        let payload = buf[5..].to_vec();
        Ok(Self { id, kind, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let pkt = Packet { id: 42, kind: PacketType::SendData, payload: vec![1, 2, 3] };
        let bytes = pkt.pack();
        let back = Packet::unpack(&bytes).unwrap();
        assert_eq!(back.id, 42);
        assert_eq!(back.kind, PacketType::SendData);
        assert_eq!(back.payload, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let bytes = [0u8, 0, 0, 0, 1];
        assert!(matches!(Packet::unpack(&bytes), Err(PacketDecodeError::UnknownType(0))));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let bytes = [1u8, 0, 0];
        assert!(matches!(Packet::unpack(&bytes), Err(PacketDecodeError::Truncated)));
    }
}
