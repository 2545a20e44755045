// src/core/listener/udp.rs

//! UDP listener: binds a datagram socket; each datagram is one potential
//! frame, decoded and pushed onto the shared queue.

use super::framing::split_and_parse;
use super::{Listener, ListenerStats, StatusNotifier};
use crate::config::{ConnectionDescriptor, DecoderKind, Transport};
use crate::core::queue::MessageQueue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::{Notify, broadcast};
use tracing::{error, info};

pub struct UdpListener {
    kind: DecoderKind,
    channel: usize,
    descriptor: ConnectionDescriptor,
    queue: MessageQueue,
    started: AtomicBool,
    connected: AtomicBool,
    frames_received: AtomicU64,
    last_error: Mutex<Option<String>>,
    stop_notify: Arc<Notify>,
    shutdown: Mutex<Option<broadcast::Receiver<()>>>,
    status_notifier: Mutex<Option<StatusNotifier>>,
}

impl UdpListener {
    pub fn new(
        kind: DecoderKind,
        channel: usize,
        descriptor: ConnectionDescriptor,
        queue: MessageQueue,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            kind,
            channel,
            descriptor,
            queue,
            started: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            frames_received: AtomicU64::new(0),
            last_error: Mutex::new(None),
            stop_notify: Arc::new(Notify::new()),
            shutdown: Mutex::new(Some(shutdown)),
            status_notifier: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("udp://{}:{}", self.descriptor.host, self.descriptor.port)
    }

    fn notify_status(&self) {
        if let Some(notifier) = self.status_notifier.lock().as_ref() {
            notifier();
        }
    }
}

#[async_trait]
impl Listener for UdpListener {
    async fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut shutdown = match self.shutdown.lock().take() {
            Some(rx) => rx,
            None => broadcast::channel(1).1,
        };

        let socket = match UdpSocket::bind((self.descriptor.host.as_str(), self.descriptor.port)).await {
            Ok(s) => s,
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                error!("{}: failed to bind: {e}", self.endpoint());
                return;
            }
        };
        self.connected.store(true, Ordering::SeqCst);
        info!("{}: UDP listener bound", self.endpoint());
        self.notify_status();

        let this = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            loop {
                tokio::select! {
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, _addr)) => {
                                this.frames_received.fetch_add(1, Ordering::Relaxed);
                                for value in split_and_parse(&buf[..len], &this.endpoint()) {
                                    this.queue.push(this.kind, value, this.channel);
                                }
                            }
                            Err(e) => {
                                *this.last_error.lock() = Some(e.to_string());
                                error!("{}: read error: {e}", this.endpoint());
                            }
                        }
                    }
                    _ = this.stop_notify.notified() => {
                        break;
                    }
                    _ = shutdown.recv() => {
                        break;
                    }
                }
            }
            this.connected.store(false, Ordering::SeqCst);
            info!("{}: UDP listener stopped", this.endpoint());
            this.notify_status();
        });
    }

    async fn stop(&self) {
        self.stop_notify.notify_waiters();
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn stats(&self) -> ListenerStats {
        ListenerStats {
            kind: self.kind,
            transport: Transport::Udp,
            endpoint: self.endpoint(),
            connected: self.connected(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }

    fn set_status_notifier(&self, notifier: StatusNotifier) {
        *self.status_notifier.lock() = Some(notifier);
    }
}
