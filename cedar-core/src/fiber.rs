/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! One TCP carrier attached to a bundle: a reader driver and a heartbeat
//! driver, each a long-lived task, communicating close through a shared
//! signal.
//!
//! A fiber holds only a non-owning [`Weak`] handle back to its bundle; the
//! bundle is the sole owner of the fiber via its fiber slot table.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use cedar_crypto::{CodecError, KeySchedule};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::bundle::Bundle;
use crate::codec_async::{read_record_async, write_record_async};
use crate::constants::{CONNECTION_TIMEOUT, MIN_HEARTBEAT};
use crate::error::CoreError;
use crate::packet::Packet;

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_secs() as i64
}

pub struct Fiber {
    pub slot_id: u64,
    keys: Arc<KeySchedule>,
    write_half: AsyncMutex<OwnedWriteHalf>,
    last_read: AtomicI64,
    last_write: AtomicI64,
    cleaned: AtomicBool,
    close_tx: watch::Sender<bool>,
    bundle: Weak<Bundle>,
}

impl Fiber {
    /// Split `stream`, register the fiber with `bundle`, and start its
    /// reader and heartbeat driver tasks.
    pub fn spawn(stream: TcpStream, keys: Arc<KeySchedule>, bundle: Weak<Bundle>, slot_id: u64) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let (close_tx, close_rx) = watch::channel(false);

        let fiber = Arc::new(Self {
            slot_id,
            keys,
            write_half: AsyncMutex::new(write_half),
            last_read: AtomicI64::new(now_secs()),
            last_write: AtomicI64::new(now_secs()),
            cleaned: AtomicBool::new(false),
            close_tx,
            bundle,
        });

        tokio::spawn(Self::reader_loop(fiber.clone(), read_half, close_rx.clone()));
        tokio::spawn(Self::heartbeat_loop(fiber.clone(), close_rx));

        fiber
    }

    pub async fn write(&self, packet: &Packet) -> Result<(), CoreError> {
        let payload = packet.pack();
        let mut guard = self.write_half.lock().await;
        let result = write_record_async(&mut guard, &self.keys, &payload).await;
        drop(guard);
        match result {
            Ok(()) => {
                self.last_write.store(now_secs(), Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                let io_err = match err {
                    CodecError::Io(e) => e,
                    other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
                };
                self.close(Some(CoreError::FiberWrite(io_err)));
                Err(CoreError::FiberWrite(std::io::Error::new(std::io::ErrorKind::Other, "fiber closed")))
            }
        }
    }

    /// Idempotent close: the first caller wins, broadcasts the close signal,
    /// and notifies the owning bundle.
    pub fn close(&self, error: Option<CoreError>) {
        if self.cleaned.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        let _ = self.close_tx.send(true);
        if let Some(bundle) = self.bundle.upgrade() {
            bundle.fiber_closed(self.slot_id, error);
        }
    }

    async fn reader_loop(self: Arc<Self>, mut read_half: OwnedReadHalf, mut close_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = close_rx.changed() => return,
                result = read_record_async(&mut read_half, &self.keys) => {
                    match result {
                        Ok(payload) => {
                            self.last_read.store(now_secs(), Ordering::Relaxed);
                            match Packet::unpack(&payload) {
                                Ok(packet) => {
                                    if let Some(bundle) = self.bundle.upgrade() {
                                        bundle.packet_received(self.slot_id, packet);
                                    }
                                }
                                Err(_) => {
                                    self.close(Some(CoreError::IllegalPacket(CodecError::AuthenticationFailed)));
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            let core_err = match err {
                                CodecError::Io(e) => CoreError::FiberRead(e),
                                other => CoreError::IllegalPacket(other),
                            };
                            self.close(Some(core_err));
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, mut close_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(MIN_HEARTBEAT);
        loop {
            tokio::select! {
                _ = close_rx.changed() => return,
                _ = ticker.tick() => {
                    let idle = now_secs() - self.last_read.load(Ordering::Relaxed);
                    if idle as u64 > CONNECTION_TIMEOUT.as_secs() {
                        self.close(Some(CoreError::ConnectionTimeout));
                        return;
                    } else if idle as u64 >= MIN_HEARTBEAT.as_secs() {
                        let _ = self.write(&Packet::heartbeat()).await;
                    }
                }
            }
        }
    }
}
