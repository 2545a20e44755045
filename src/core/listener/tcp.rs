// src/core/listener/tcp.rs

//! TCP listener: dials the remote endpoint; on disconnect, retries with a
//! small backoff until `stop()` is called. A line-assembling buffer
//! accumulates bytes across reads; message boundaries are newlines.

use super::framing::split_and_parse;
use super::{Listener, ListenerStats, StatusNotifier};
use crate::config::{ConnectionDescriptor, DecoderKind, Transport};
use crate::core::queue::MessageQueue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{Notify, broadcast};
use tokio::time::Duration;
use tracing::{debug, error, info};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

pub struct TcpListener {
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

impl TcpListener {
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

    async fn stopping(stop_notify: &Notify, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            biased;
            _ = stop_notify.notified() => true,
            _ = shutdown.recv() => true,
            _ = std::future::ready(()) => false,
        }
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut shutdown = match self.shutdown.lock().take() {
            Some(rx) => rx,
            None => broadcast::channel(1).1,
        };

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                if Self::stopping(&this.stop_notify, &mut shutdown).await {
                    break;
                }

                let stream = match TcpStream::connect((this.descriptor.host.as_str(), this.descriptor.port)).await {
                    Ok(s) => s,
                    Err(e) => {
                        *this.last_error.lock() = Some(e.to_string());
                        debug!("{}: connect failed: {e}", this.endpoint());
                        tokio::select! {
                            _ = tokio::time::sleep(RECONNECT_BACKOFF) => continue,
                            _ = this.stop_notify.notified() => break,
                            _ = shutdown.recv() => break,
                        }
                    }
                };

                this.connected.store(true, Ordering::SeqCst);
                info!("{}: TCP connected", this.endpoint());
                this.notify_status();

                this.read_loop(stream, &mut shutdown).await;

                this.connected.store(false, Ordering::SeqCst);
                info!("{}: TCP disconnected", this.endpoint());
                this.notify_status();

                if Self::stopping(&this.stop_notify, &mut shutdown).await {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    _ = this.stop_notify.notified() => break,
                    _ = shutdown.recv() => break,
                }
            }
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
            transport: Transport::Tcp,
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

impl TcpListener {
    /// Reads from `stream` until EOF or a stop signal, assembling bytes
    /// into newline-delimited frames.
    async fn read_loop(&self, mut stream: TcpStream, shutdown: &mut broadcast::Receiver<()>) {
        let mut buf = [0u8; 8192];
        let mut pending = Vec::new();

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => break, // EOF
                        Ok(n) => {
                            pending.extend_from_slice(&buf[..n]);
                            self.drain_lines(&mut pending);
                        }
                        Err(e) => {
                            *self.last_error.lock() = Some(e.to_string());
                            error!("{}: read error: {e}", self.endpoint());
                            break;
                        }
                    }
                }
                _ = self.stop_notify.notified() => break,
                _ = shutdown.recv() => break,
            }
        }
    }

    fn drain_lines(&self, pending: &mut Vec<u8>) {
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            self.frames_received.fetch_add(1, Ordering::Relaxed);
            for value in split_and_parse(&line, &self.endpoint()) {
                self.queue.push(self.kind, value, self.channel);
            }
        }
    }
}
