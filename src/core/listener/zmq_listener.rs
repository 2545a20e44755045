// src/core/listener/zmq_listener.rs

//! ZMQ listener: a SUB socket subscribed to every topic, connected to a
//! remote publisher. Connect/disconnect transitions come from the socket's
//! own monitor event stream, not from data arrival, so a quiet publisher
//! still reads as connected.

use super::framing::split_and_parse;
use super::{Listener, ListenerStats, StatusNotifier};
use crate::config::{ConnectionDescriptor, DecoderKind, Transport};
use crate::core::queue::MessageQueue;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, error, info};
use zeromq::{Socket, SocketEvent, SocketRecv};

pub struct ZmqListener {
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

impl ZmqListener {
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
        format!("tcp://{}:{}", self.descriptor.host, self.descriptor.port)
    }

    fn notify_status(&self) {
        if let Some(notifier) = self.status_notifier.lock().as_ref() {
            notifier();
        }
    }
}

#[async_trait]
impl Listener for ZmqListener {
    async fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut shutdown = match self.shutdown.lock().take() {
            Some(rx) => rx,
            None => broadcast::channel(1).1,
        };

        let mut socket = zeromq::SubSocket::new();
        let monitor = socket.monitor();

        if let Err(e) = socket.connect(&self.endpoint()).await {
            *self.last_error.lock() = Some(e.to_string());
            error!("{}: failed to connect ZMQ SUB socket: {e}", self.endpoint());
            return;
        }
        if let Err(e) = socket.subscribe("").await {
            *self.last_error.lock() = Some(e.to_string());
            error!("{}: failed to subscribe: {e}", self.endpoint());
            return;
        }
        info!("{}: ZMQ SUB socket connecting", self.endpoint());

        let this = self.clone();
        tokio::spawn(async move {
            let mut monitor = monitor;
            loop {
                tokio::select! {
                    event = monitor.next() => {
                        match event {
                            Some(SocketEvent::Connected(_, _)) => {
                                this.connected.store(true, Ordering::SeqCst);
                                info!("{}: ZMQ transport reports connected", this.endpoint());
                                this.notify_status();
                            }
                            Some(SocketEvent::Disconnected(_)) => {
                                this.connected.store(false, Ordering::SeqCst);
                                info!("{}: ZMQ transport reports disconnected", this.endpoint());
                                this.notify_status();
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                    frame = socket.recv() => {
                        match frame {
                            Ok(message) => {
                                this.frames_received.fetch_add(1, Ordering::Relaxed);
                                for part in message.into_vec() {
                                    for value in split_and_parse(&part, &this.endpoint()) {
                                        this.queue.push(this.kind, value, this.channel);
                                    }
                                }
                            }
                            Err(e) => {
                                *this.last_error.lock() = Some(e.to_string());
                                debug!("{}: ZMQ receive error: {e}", this.endpoint());
                            }
                        }
                    }
                    _ = this.stop_notify.notified() => break,
                    _ = shutdown.recv() => break,
                }
            }
            this.connected.store(false, Ordering::SeqCst);
            info!("{}: ZMQ listener stopped", this.endpoint());
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
            transport: Transport::Zmq,
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
