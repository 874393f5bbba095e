/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Accepts/dials TCP, drives the handshake, attaches fibers to bundles, and
//! exposes the `send`/`on_received`/`on_bundle_lost` contract applications
//! drive the transport through.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cedar_crypto::{random, KeySchedule};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, info_span, warn, Instrument};

use crate::bundle::Bundle;
use crate::bundle_collection::BundleCollection;
use crate::codec_async::{read_record_async, write_record_async};
use crate::constants::DEFAULT_BUFFER_LEN;
use crate::error::{CoreError, CoreResult};
use crate::handshake::{HandshakeMessage, NonceRing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

type ReceivedCallback = Arc<dyn Fn(u32, Vec<u8>) + Send + Sync>;
type LostCallback = Arc<dyn Fn(u32, CoreError) + Send + Sync>;

pub struct Endpoint {
    pub role: Role,
    pub addr: SocketAddr,
    buffer_len: usize,
    keys: Arc<KeySchedule>,
    collection: BundleCollection,
    nonces: NonceRing,
    next_bundle_id: AtomicU32,
    on_received: RwLock<Option<ReceivedCallback>>,
    on_bundle_lost: RwLock<Option<LostCallback>>,
}

impl Endpoint {
    pub fn new(role: Role, addr: SocketAddr, passphrase: &str, buffer_len: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            role,
            addr,
            buffer_len: buffer_len.unwrap_or(DEFAULT_BUFFER_LEN),
            keys: Arc::new(KeySchedule::from_passphrase(passphrase)),
            collection: BundleCollection::new(),
            nonces: NonceRing::new(),
            next_bundle_id: AtomicU32::new(1),
            on_received: RwLock::new(None),
            on_bundle_lost: RwLock::new(None),
        })
    }

    pub fn set_on_received<F: Fn(u32, Vec<u8>) + Send + Sync + 'static>(&self, f: F) {
        *self.on_received.write() = Some(Arc::new(f));
    }

    pub fn set_on_bundle_lost<F: Fn(u32, CoreError) + Send + Sync + 'static>(&self, f: F) {
        *self.on_bundle_lost.write() = Some(Arc::new(f));
    }

    fn wire_bundle_callbacks(self: &Arc<Self>, bundle: &Arc<Bundle>) {
        let endpoint = self.clone();
        let id = bundle.id;
        bundle.set_on_received(move |payload| {
            if let Some(cb) = endpoint.on_received.read().clone() {
                cb(id, payload);
            }
        });
        let endpoint = self.clone();
        bundle.set_on_bundle_lost(move |err| {
            if let Some(cb) = endpoint.on_bundle_lost.read().clone() {
                cb(id, err);
            }
            endpoint.collection.remove_bundle(id);
        });
    }

    /// Send `payload` reliably over the bundle identified by `bundle_id` (0
    /// resolves to the main bundle — relevant to single-bundle clients).
    pub async fn send(&self, bundle_id: u32, payload: Vec<u8>) -> CoreResult<()> {
        let bundle = self.collection.get_bundle(bundle_id).ok_or(CoreError::UnknownBundle(bundle_id))?;
        bundle.send_message(payload).await
    }

    // ---- server role ----------------------------------------------------

    /// Bind and accept connections forever, spawning a handshake task per
    /// incoming socket. Mirrors `endpoint.go`'s `ServerStart` accept loop.
    pub async fn server_start(self: Arc<Self>) -> CoreResult<()> {
        let listener = TcpListener::bind(self.addr).await.map_err(CoreError::FiberRead)?;
        info!(addr = %self.addr, "listening for Cedar connections");
        loop {
            let (stream, peer) = listener.accept().await.map_err(CoreError::FiberRead)?;
            let endpoint = self.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = endpoint.accept_connection(stream).await {
                        warn!(%peer, error = %err, "handshake failed");
                    }
                }
                .instrument(info_span!("handshake", %peer)),
            );
        }
    }

    async fn accept_connection(self: Arc<Self>, mut stream: TcpStream) -> CoreResult<()> {
        let raw = read_record_async(&mut stream, &self.keys).await.map_err(CoreError::IllegalPacket)?;
        let message = HandshakeMessage::decode(&raw)?;

        match message {
            HandshakeMessage::Apply { nonce } => {
                if !self.nonces.accept(nonce) {
                    self.refuse(&mut stream).await;
                    return Err(CoreError::HandshakeFailed("nonce replay on Apply".into()));
                }
                let bundle_id = self.next_bundle_id.fetch_add(1, Ordering::SeqCst);
                let id_s2c = random::next_u32();
                let id_c2s = random::next_u32();

                let bundle = Bundle::new(bundle_id, self.buffer_len, id_s2c, id_c2s, id_s2c, id_c2s);
                self.wire_bundle_callbacks(&bundle);
                if let Err(err) = self.collection.add_bundle(bundle.clone(), self.collection.is_empty()) {
                    bundle.close(CoreError::DuplicatedBundle(bundle_id));
                    return Err(err);
                }

                let reply = HandshakeMessage::Reply { bundle_id, id_s2c, id_c2s };
                write_record_async(&mut stream, &self.keys, &reply.encode())
                    .await
                    .map_err(CoreError::IllegalPacket)?;

                bundle.attach_fiber(stream, self.keys.clone());
                info!(bundle_id, "allocated new bundle");
                Ok(())
            }
            HandshakeMessage::Add { nonce, bundle_id } => {
                if !self.nonces.accept(nonce) {
                    self.refuse(&mut stream).await;
                    return Err(CoreError::HandshakeFailed("nonce replay on Add".into()));
                }
                let Some(bundle) = self.collection.get_bundle(bundle_id) else {
                    self.refuse(&mut stream).await;
                    return Err(CoreError::UnknownBundle(bundle_id));
                };
                let reply = HandshakeMessage::Reply {
                    bundle_id,
                    id_s2c: bundle.handshake_id_s2c,
                    id_c2s: bundle.handshake_id_c2s,
                };
                write_record_async(&mut stream, &self.keys, &reply.encode())
                    .await
                    .map_err(CoreError::IllegalPacket)?;
                bundle.attach_fiber(stream, self.keys.clone());
                info!(bundle_id, "attached additional fiber");
                Ok(())
            }
            other => Err(CoreError::HandshakeFailed(format!("unexpected first message {other:?}"))),
        }
    }

    async fn refuse(&self, stream: &mut TcpStream) {
        let _ = write_record_async(stream, &self.keys, &HandshakeMessage::Refuse.encode()).await;
    }

    // ---- client role ----------------------------------------------------

    /// Dial `n` fresh connections: the first performs `RequestNewBundle`
    /// (Apply), the remaining `n - 1` attach to the resulting bundle id via
    /// `RequestAddToBundle` (Add). Returns the new bundle's id.
    pub async fn create_connection(self: &Arc<Self>, n: usize) -> CoreResult<u32> {
        assert!(n >= 1, "a bundle needs at least one fiber");
        let bundle_id = self.request_new_bundle().await?;
        for _ in 1..n {
            self.add_connection(bundle_id).await?;
        }
        Ok(bundle_id)
    }

    async fn request_new_bundle(self: &Arc<Self>) -> CoreResult<u32> {
        let mut stream = TcpStream::connect(self.addr).await.map_err(CoreError::FiberWrite)?;
        let mut nonce = [0u8; 8];
        random::fill(&mut nonce);
        let apply = HandshakeMessage::Apply { nonce };
        write_record_async(&mut stream, &self.keys, &apply.encode()).await.map_err(CoreError::IllegalPacket)?;

        let raw = read_record_async(&mut stream, &self.keys).await.map_err(CoreError::IllegalPacket)?;
        match HandshakeMessage::decode(&raw)? {
            HandshakeMessage::Reply { bundle_id, id_s2c, id_c2s } => {
                let bundle = Bundle::new(bundle_id, self.buffer_len, id_c2s, id_s2c, id_s2c, id_c2s);
                self.wire_bundle_callbacks(&bundle);
                if let Err(err) = self.collection.add_bundle(bundle.clone(), true) {
                    bundle.close(CoreError::DuplicatedBundle(bundle_id));
                    return Err(err);
                }
                bundle.attach_fiber(stream, self.keys.clone());
                Ok(bundle_id)
            }
            HandshakeMessage::Refuse => Err(CoreError::HandshakeFailed("server refused RequestNewBundle".into())),
            other => Err(CoreError::HandshakeFailed(format!("unexpected reply {other:?}"))),
        }
    }

    async fn add_connection(self: &Arc<Self>, bundle_id: u32) -> CoreResult<()> {
        let bundle = self.collection.get_bundle(bundle_id).ok_or(CoreError::UnknownBundle(bundle_id))?;

        let mut stream = TcpStream::connect(self.addr).await.map_err(CoreError::FiberWrite)?;
        let mut nonce = [0u8; 8];
        random::fill(&mut nonce);
        let add = HandshakeMessage::Add { nonce, bundle_id };
        write_record_async(&mut stream, &self.keys, &add.encode()).await.map_err(CoreError::IllegalPacket)?;

        let raw = read_record_async(&mut stream, &self.keys).await.map_err(CoreError::IllegalPacket)?;
        match HandshakeMessage::decode(&raw)? {
            HandshakeMessage::Reply { bundle_id: confirmed, .. } if confirmed == bundle_id => {
                bundle.attach_fiber(stream, self.keys.clone());
                Ok(())
            }
            HandshakeMessage::Refuse => Err(CoreError::HandshakeFailed("server refused RequestAddToBundle".into())),
            other => Err(CoreError::HandshakeFailed(format!("unexpected reply {other:?}"))),
        }
    }
}
