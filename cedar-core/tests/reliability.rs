/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Integration coverage for the reliability properties not already
//! exercised by `echo.rs`: duplicate-packet suppression, fiber failover,
//! bundle teardown after the grace window, and handshake replay through the
//! real accept path.

use std::net::SocketAddr;
use std::time::Duration;

use cedar_core::constants::{GRACE_WINDOW, RESEND_INTERVAL};
use cedar_core::endpoint::{Endpoint, Role};
use cedar_core::handshake::HandshakeMessage;
use cedar_core::packet::{Packet, PacketType};
use cedar_crypto::{decode_head, decode_rest, encode_record, KeySchedule, HEAD_ON_WIRE_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

async fn write_record(stream: &mut TcpStream, keys: &KeySchedule, plaintext: &[u8]) {
    let buf = encode_record(keys, plaintext);
    stream.write_all(&buf).await.unwrap();
}

async fn read_record(stream: &mut TcpStream, keys: &KeySchedule) -> Vec<u8> {
    let mut head_bytes = [0u8; HEAD_ON_WIRE_LEN];
    stream.read_exact(&mut head_bytes).await.unwrap();
    let head = decode_head(keys, &head_bytes).unwrap();
    let mut rest = vec![0u8; head.remaining_len()];
    stream.read_exact(&mut rest).await.unwrap();
    decode_rest(keys, head, rest).unwrap()
}

/// Perform the Apply handshake over a fresh raw socket, returning the socket
/// plus the bundle id and the `(idS2C, idC2S)` pair the server handed back.
async fn raw_apply(addr: SocketAddr, keys: &KeySchedule, nonce: [u8; 8]) -> (TcpStream, u32, u32, u32) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_record(&mut stream, keys, &HandshakeMessage::Apply { nonce }.encode()).await;
    let raw = read_record(&mut stream, keys).await;
    match HandshakeMessage::decode(&raw).unwrap() {
        HandshakeMessage::Reply { bundle_id, id_s2c, id_c2s } => (stream, bundle_id, id_s2c, id_c2s),
        other => panic!("expected Reply, got {other:?}"),
    }
}

async fn let_background_tasks_run() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn duplicate_send_data_is_not_redelivered() {
    let addr: SocketAddr = "127.0.0.1:28175".parse().unwrap();
    let passphrase = "integration-duplicate-passphrase";

    let server = Endpoint::new(Role::Server, addr, passphrase, Some(16));
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    server.set_on_received(move |_bundle_id, payload| {
        let _ = tx.send(payload);
    });
    let server_clone = server.clone();
    tokio::spawn(async move {
        let _ = server_clone.server_start().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let keys = KeySchedule::from_passphrase(passphrase);
    let (mut stream, _bundle_id, _id_s2c, id_c2s) = raw_apply(addr, &keys, [9; 8]).await;

    // id_c2s is the id the server expects first from this side.
    let packet = Packet { id: id_c2s, kind: PacketType::SendData, payload: b"once".to_vec() };
    write_record(&mut stream, &keys, &packet.pack()).await;
    write_record(&mut stream, &keys, &packet.pack()).await;

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, b"once");

    // The replayed id must not produce a second delivery.
    let second = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(second.is_err(), "duplicate SendData id must not be redelivered");
}

#[tokio::test(start_paused = true)]
async fn failover_to_surviving_fiber_after_one_is_killed() {
    let addr: SocketAddr = "127.0.0.1:28176".parse().unwrap();
    let passphrase = "integration-failover-passphrase";

    let server = Endpoint::new(Role::Server, addr, passphrase, Some(16));
    let server_clone = server.clone();
    tokio::spawn(async move {
        let _ = server_clone.server_start().await;
    });
    let_background_tasks_run().await;

    let keys = KeySchedule::from_passphrase(passphrase);
    let (fiber_a, bundle_id, _, _) = raw_apply(addr, &keys, [1; 8]).await;

    let mut fiber_b = TcpStream::connect(addr).await.unwrap();
    write_record(&mut fiber_b, &keys, &HandshakeMessage::Add { nonce: [2; 8], bundle_id }.encode()).await;
    let raw = read_record(&mut fiber_b, &keys).await;
    assert!(matches!(
        HandshakeMessage::decode(&raw).unwrap(),
        HandshakeMessage::Reply { bundle_id: b, .. } if b == bundle_id
    ));

    // Kill fiber_a outright; the server's retransmit loop must fall back to
    // fiber_b within a few resend intervals.
    drop(fiber_a);
    let_background_tasks_run().await;

    let keys_reader = KeySchedule::from_passphrase(passphrase);
    let read_task = tokio::spawn(async move {
        loop {
            let raw = read_record(&mut fiber_b, &keys_reader).await;
            if let Ok(packet) = Packet::unpack(&raw) {
                if packet.kind == PacketType::SendData {
                    return packet.payload;
                }
            }
        }
    });

    server.send(bundle_id, b"still arrives".to_vec()).await.unwrap();

    for _ in 0..3 {
        tokio::time::advance(RESEND_INTERVAL + Duration::from_millis(10)).await;
        let_background_tasks_run().await;
    }

    let payload = tokio::time::timeout(Duration::from_secs(2), read_task)
        .await
        .expect("surviving fiber should eventually receive the retransmit")
        .unwrap();
    assert_eq!(payload, b"still arrives");
}

#[tokio::test(start_paused = true)]
async fn bundle_is_lost_once_after_grace_window_with_no_fibers() {
    let addr: SocketAddr = "127.0.0.1:28177".parse().unwrap();
    let passphrase = "integration-teardown-passphrase";

    let server = Endpoint::new(Role::Server, addr, passphrase, Some(16));
    let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
    server.set_on_bundle_lost(move |bundle_id, _err| {
        let _ = tx.send(bundle_id);
    });
    let server_clone = server.clone();
    tokio::spawn(async move {
        let _ = server_clone.server_start().await;
    });
    let_background_tasks_run().await;

    let keys = KeySchedule::from_passphrase(passphrase);
    let (stream, bundle_id, _, _) = raw_apply(addr, &keys, [5; 8]).await;
    drop(stream);
    let_background_tasks_run().await;

    tokio::time::advance(GRACE_WINDOW + Duration::from_secs(1)).await;
    let_background_tasks_run().await;

    let lost_id = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(lost_id, bundle_id);

    // Must fire exactly once: no second notification queued.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn replayed_apply_record_is_refused() {
    let addr: SocketAddr = "127.0.0.1:28178".parse().unwrap();
    let passphrase = "integration-replay-passphrase";

    let server = Endpoint::new(Role::Server, addr, passphrase, Some(16));
    let server_clone = server.clone();
    tokio::spawn(async move {
        let _ = server_clone.server_start().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let keys = KeySchedule::from_passphrase(passphrase);
    let apply_record = encode_record(&keys, &HandshakeMessage::Apply { nonce: [42; 8] }.encode());

    // First use of this captured record: accepted.
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(&apply_record).await.unwrap();
    let reply = read_record(&mut first, &keys).await;
    assert!(matches!(HandshakeMessage::decode(&reply).unwrap(), HandshakeMessage::Reply { .. }));

    // Replaying the exact same bytes must be refused, not allocate a second bundle.
    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(&apply_record).await.unwrap();
    let reply = read_record(&mut second, &keys).await;
    assert_eq!(HandshakeMessage::decode(&reply).unwrap(), HandshakeMessage::Refuse);
}
