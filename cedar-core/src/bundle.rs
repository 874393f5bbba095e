/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! The reliable ordered message channel built atop N fibers: sequencing,
//! retransmit, ack aggregation, reassembly, and lifecycle. One
//! `tokio::spawn` per in-flight send (`keep_sending`), a single
//! ack-batching task per bundle (`keep_confirming`), and a grace-window
//! task spawned only while the bundle has no attached fibers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cedar_crypto::KeySchedule;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::constants::{CONFIRM_WAIT, GRACE_WINDOW, RESEND_INTERVAL};
use crate::error::CoreError;
use crate::fiber::Fiber;
use crate::packet::{Packet, PacketType};
use crate::seq::{seq_check, SeqStatus};

type ReceivedCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
type LostCallback = Arc<dyn Fn(CoreError) + Send + Sync>;

pub struct Bundle {
    pub id: u32,
    /// The `(idS2C, idC2S)` pair handed out in the handshake Reply for this
    /// bundle, held immutably so a later Add to the same bundle can be
    /// answered with the identical pair.
    pub handshake_id_s2c: u32,
    pub handshake_id_c2s: u32,
    buffer_len: usize,

    seq_upload: AtomicU32,
    seq_download: AtomicU32,

    fibers: RwLock<HashMap<u64, Arc<Fiber>>>,
    next_fiber_id: AtomicU64,
    round_robin: AtomicUsize,

    receive_buffer: Mutex<HashMap<u32, Packet>>,
    pending_ack_ids: Mutex<HashSet<u32>>,
    awaiting_ack: Mutex<HashMap<u32, Arc<Notify>>>,
    send_tokens: Arc<Semaphore>,

    closed: AtomicBool,
    close_error: Mutex<Option<String>>,
    close_tx: watch::Sender<bool>,

    grace_epoch: AtomicU64,

    on_received: RwLock<Option<ReceivedCallback>>,
    on_bundle_lost: RwLock<Option<LostCallback>>,
}

impl Bundle {
    pub fn new(
        id: u32,
        buffer_len: usize,
        initial_upload_id: u32,
        initial_download_id: u32,
        handshake_id_s2c: u32,
        handshake_id_c2s: u32,
    ) -> Arc<Self> {
        let (close_tx, _) = watch::channel(false);
        let bundle = Arc::new(Self {
            id,
            handshake_id_s2c,
            handshake_id_c2s,
            buffer_len,
            seq_upload: AtomicU32::new(initial_upload_id),
            seq_download: AtomicU32::new(initial_download_id),
            fibers: RwLock::new(HashMap::new()),
            next_fiber_id: AtomicU64::new(0),
            round_robin: AtomicUsize::new(0),
            receive_buffer: Mutex::new(HashMap::new()),
            pending_ack_ids: Mutex::new(HashSet::new()),
            awaiting_ack: Mutex::new(HashMap::new()),
            send_tokens: Arc::new(Semaphore::new(buffer_len.max(1))),
            closed: AtomicBool::new(false),
            close_error: Mutex::new(None),
            close_tx,
            grace_epoch: AtomicU64::new(0),
            on_received: RwLock::new(None),
            on_bundle_lost: RwLock::new(None),
        });
        tokio::spawn(Self::keep_confirming(bundle.clone()));
        bundle
    }

    pub fn set_on_received<F: Fn(Vec<u8>) + Send + Sync + 'static>(&self, f: F) {
        *self.on_received.write() = Some(Arc::new(f));
    }

    pub fn set_on_bundle_lost<F: Fn(CoreError) + Send + Sync + 'static>(&self, f: F) {
        *self.on_bundle_lost.write() = Some(Arc::new(f));
    }

    pub fn fiber_count(&self) -> usize {
        self.fibers.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Attach a handshaken socket as a new fiber on this bundle.
    pub fn attach_fiber(self: &Arc<Self>, stream: TcpStream, keys: Arc<KeySchedule>) -> u64 {
        let slot_id = self.next_fiber_id.fetch_add(1, Ordering::SeqCst);
        // Invalidate any grace-window timer that might be in flight: a new
        // fiber just reattached before it expired.
        self.grace_epoch.fetch_add(1, Ordering::SeqCst);
        let fiber = Fiber::spawn(stream, keys, Arc::downgrade(self), slot_id);
        self.fibers.write().insert(slot_id, fiber);
        slot_id
    }

    fn pick_fiber(&self) -> Option<Arc<Fiber>> {
        let fibers = self.fibers.read();
        if fibers.is_empty() {
            return None;
        }
        let values: Vec<&Arc<Fiber>> = fibers.values().collect();
        let idx = self.round_robin.fetch_add(1, Ordering::SeqCst) % values.len();
        Some(values[idx].clone())
    }

    /// Queue `payload` for reliable delivery. Resolves once a send token is
    /// available and the message has been handed to its retransmit task;
    /// does not wait for the peer's acknowledgement.
    pub async fn send_message(self: &Arc<Self>, payload: Vec<u8>) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::BundleClosed);
        }
        let permit = self
            .send_tokens
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::BundleClosed)?;
        let id = self.seq_upload.fetch_add(1, Ordering::SeqCst);
        let notify = Arc::new(Notify::new());
        self.awaiting_ack.lock().insert(id, notify.clone());

        let bundle = self.clone();
        tokio::spawn(async move {
            bundle.keep_sending(id, payload, notify, permit).await;
        });
        Ok(())
    }

    async fn keep_sending(self: Arc<Self>, id: u32, payload: Vec<u8>, notify: Arc<Notify>, _permit: OwnedSemaphorePermit) {
        let packet = Packet { id, kind: PacketType::SendData, payload };
        let mut close_rx = self.close_tx.subscribe();
        loop {
            if let Some(fiber) = self.pick_fiber() {
                let _ = fiber.write(&packet).await;
            }
            tokio::select! {
                _ = notify.notified() => {
                    self.awaiting_ack.lock().remove(&id);
                    return;
                }
                _ = tokio::time::sleep(RESEND_INTERVAL) => continue,
                changed = close_rx.changed() => {
                    if changed.is_err() || *close_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn keep_confirming(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(CONFIRM_WAIT);
        let mut close_rx = self.close_tx.subscribe();
        loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    if changed.is_err() || *close_rx.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let ids: Vec<u32> = {
                        let mut pending = self.pending_ack_ids.lock();
                        if pending.is_empty() {
                            continue;
                        }
                        pending.drain().collect()
                    };
                    let mut payload = Vec::with_capacity(ids.len() * 4);
                    for id in ids {
                        payload.extend_from_slice(&id.to_be_bytes());
                    }
                    let packet = Packet { id: 0, kind: PacketType::DataReceived, payload };
                    if let Some(fiber) = self.pick_fiber() {
                        let _ = fiber.write(&packet).await;
                    }
                }
            }
        }
    }

    /// Dispatch a decoded packet arriving on one of this bundle's fibers.
    pub fn packet_received(self: &Arc<Self>, _fiber_id: u64, packet: Packet) {
        match packet.kind {
            PacketType::SendData => self.handle_send_data(packet),
            PacketType::DataReceived => self.handle_data_received(&packet.payload),
            PacketType::Heartbeat => {}
            other => debug!(bundle = self.id, ?other, "ignoring handshake-layer packet on attached bundle"),
        }
    }

    fn handle_send_data(self: &Arc<Self>, packet: Packet) {
        let expected = self.seq_download.load(Ordering::SeqCst);
        let status = seq_check(packet.id, expected, self.buffer_len as u32);

        if status == SeqStatus::Received {
            self.pending_ack_ids.lock().insert(packet.id);
            return;
        }

        if status == SeqStatus::OutOfRange {
            warn!(bundle = self.id, id = packet.id, expected, "dropping packet outside the send window");
            return;
        }

        self.pending_ack_ids.lock().insert(packet.id);
        self.receive_buffer.lock().insert(packet.id, packet);
        self.drain_receive_buffer();
    }

    fn drain_receive_buffer(self: &Arc<Self>) {
        let mut buffer = self.receive_buffer.lock();
        loop {
            let expected = self.seq_download.load(Ordering::SeqCst);
            match buffer.remove(&expected) {
                Some(packet) => {
                    self.seq_download.store(expected.wrapping_add(1), Ordering::SeqCst);
                    if let Some(cb) = self.on_received.read().clone() {
                        let payload = packet.payload;
                        // Run on a dedicated task so blocking application
                        // code can never stall the reassembly loop.
                        tokio::spawn(async move { cb(payload) });
                    }
                }
                None => break,
            }
        }
    }

    fn handle_data_received(&self, payload: &[u8]) {
        for chunk in payload.chunks_exact(4) {
            let id = u32::from_be_bytes(chunk.try_into().unwrap());
            if let Some(notify) = self.awaiting_ack.lock().get(&id).cloned() {
                notify.notify_one();
            }
        }
    }

    /// Called by a fiber when it closes itself. Starts the grace window if
    /// this was the last attached fiber.
    pub fn fiber_closed(self: &Arc<Self>, slot_id: u64, _error: Option<CoreError>) {
        let now_empty = {
            let mut fibers = self.fibers.write();
            fibers.remove(&slot_id);
            fibers.is_empty()
        };
        if !now_empty || self.is_closed() {
            return;
        }
        let epoch = self.grace_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let bundle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(GRACE_WINDOW).await;
            let still_empty = bundle.fibers.read().is_empty();
            if still_empty && bundle.grace_epoch.load(Ordering::SeqCst) == epoch {
                bundle.close(CoreError::AllFibersLost);
            }
        });
    }

    /// Close the bundle, closing every attached fiber and invoking the
    /// lost-bundle callback exactly once.
    pub fn close(self: &Arc<Self>, error: CoreError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.close_error.lock() = Some(error.to_string());
        let _ = self.close_tx.send(true);

        let fibers: Vec<Arc<Fiber>> = self.fibers.write().drain().map(|(_, f)| f).collect();
        for fiber in fibers {
            fiber.close(None);
        }

        if let Some(cb) = self.on_bundle_lost.read().clone() {
            tokio::spawn(async move { cb(error) });
        }
    }
}
