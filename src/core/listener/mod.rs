// src/core/listener/mod.rs

//! The multi-transport listener fabric: one listener per
//! `ConnectionDescriptor`, all implementing the same `start`/`stop`/
//! `connected`/`stats` contract, fanned into the shared `MessageQueue`.

pub mod framing;
pub mod tcp;
pub mod udp;
pub mod zmq_listener;

use crate::config::{ConnectionDescriptor, DecoderKind, Transport};
use crate::core::queue::MessageQueue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A point-in-time snapshot of one listener's status.
#[derive(Debug, Clone)]
pub struct ListenerStats {
    pub kind: DecoderKind,
    pub transport: Transport,
    pub endpoint: String,
    pub connected: bool,
    pub frames_received: u64,
    pub last_error: Option<String>,
}

/// Called after every connect/disconnect transition a listener observes,
/// so the orchestrator can broadcast a fresh `system_status` event
/// immediately instead of waiting for the scheduler's periodic tick.
pub type StatusNotifier = Arc<dyn Fn() + Send + Sync>;

/// The contract every transport-specific listener implements.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Begins accepting frames. Idempotent: calling `start` on an
    /// already-started listener is a no-op.
    async fn start(self: Arc<Self>);

    /// Quiesces the listener and closes its resources. Idempotent.
    async fn stop(&self);

    fn connected(&self) -> bool;

    fn stats(&self) -> ListenerStats;

    /// Registers the callback to invoke on every future connect/disconnect
    /// transition. Replaces any previously set notifier.
    fn set_status_notifier(&self, notifier: StatusNotifier);
}

/// Owns every listener instance, grouped by decoder kind, and exposes the
/// OR-of-connected-flags status per kind that the orchestrator reports.
pub struct ListenerFabric {
    listeners: HashMap<DecoderKind, Vec<Arc<dyn Listener>>>,
}

impl ListenerFabric {
    /// Builds one listener per descriptor for every enabled decoder kind.
    pub fn build(
        decoders: &HashMap<DecoderKind, crate::config::DecoderConfig>,
        queue: MessageQueue,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let mut listeners: HashMap<DecoderKind, Vec<Arc<dyn Listener>>> = HashMap::new();

        for (kind, decoder_config) in decoders {
            let mut per_kind = Vec::new();
            for (channel, descriptor) in decoder_config.connections.iter().enumerate() {
                let listener = build_listener(*kind, channel, descriptor, queue.clone(), shutdown.subscribe());
                per_kind.push(listener);
            }
            listeners.insert(*kind, per_kind);
        }

        Self { listeners }
    }

    pub async fn start_all(&self) {
        for per_kind in self.listeners.values() {
            for listener in per_kind {
                listener.clone().start().await;
            }
        }
    }

    pub async fn stop_all(&self) {
        for per_kind in self.listeners.values() {
            for listener in per_kind {
                listener.stop().await;
            }
        }
    }

    /// The logical OR over every listener's connected flag for a kind.
    /// A kind with no listeners is reported disconnected.
    pub fn connected(&self, kind: DecoderKind) -> bool {
        self.listeners
            .get(&kind)
            .map(|ls| ls.iter().any(|l| l.connected()))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> Vec<ListenerStats> {
        self.listeners
            .values()
            .flatten()
            .map(|l| l.stats())
            .collect()
    }

    /// Registers `notifier` on every listener the fabric owns, so each one
    /// reports its own connect/disconnect transitions.
    pub fn set_status_notifier(&self, notifier: StatusNotifier) {
        for listener in self.listeners.values().flatten() {
            listener.set_status_notifier(notifier.clone());
        }
    }
}

fn build_listener(
    kind: DecoderKind,
    channel: usize,
    descriptor: &ConnectionDescriptor,
    queue: MessageQueue,
    shutdown: broadcast::Receiver<()>,
) -> Arc<dyn Listener> {
    match descriptor.transport {
        Transport::Udp => Arc::new(udp::UdpListener::new(kind, channel, descriptor.clone(), queue, shutdown)),
        Transport::Tcp => Arc::new(tcp::TcpListener::new(kind, channel, descriptor.clone(), queue, shutdown)),
        Transport::Zmq => Arc::new(zmq_listener::ZmqListener::new(kind, channel, descriptor.clone(), queue, shutdown)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeListener {
        kind: DecoderKind,
        connected: std::sync::atomic::AtomicBool,
        notifier: parking_lot::Mutex<Option<StatusNotifier>>,
    }

    #[async_trait]
    impl Listener for FakeListener {
        async fn start(self: Arc<Self>) {
            self.connected.store(true, std::sync::atomic::Ordering::Relaxed);
            if let Some(notifier) = self.notifier.lock().as_ref() {
                notifier();
            }
        }
        async fn stop(&self) {
            self.connected.store(false, std::sync::atomic::Ordering::Relaxed);
            if let Some(notifier) = self.notifier.lock().as_ref() {
                notifier();
            }
        }
        fn connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::Relaxed)
        }
        fn stats(&self) -> ListenerStats {
            ListenerStats {
                kind: self.kind,
                transport: Transport::Tcp,
                endpoint: "fake".to_string(),
                connected: self.connected(),
                frames_received: 0,
                last_error: None,
            }
        }
        fn set_status_notifier(&self, notifier: StatusNotifier) {
            *self.notifier.lock() = Some(notifier);
        }
    }

    fn fake_listener(kind: DecoderKind) -> Arc<FakeListener> {
        Arc::new(FakeListener {
            kind,
            connected: std::sync::atomic::AtomicBool::new(false),
            notifier: parking_lot::Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn fan_in_or_semantics_over_two_listeners() {
        let a = fake_listener(DecoderKind::Acars);
        let b = fake_listener(DecoderKind::Acars);
        let mut fabric = ListenerFabric {
            listeners: HashMap::new(),
        };
        fabric
            .listeners
            .insert(DecoderKind::Acars, vec![a.clone(), b.clone()]);

        assert!(!fabric.connected(DecoderKind::Acars));

        a.clone().start().await;
        assert!(fabric.connected(DecoderKind::Acars));

        b.clone().start().await;
        a.stop().await;
        assert!(fabric.connected(DecoderKind::Acars));

        b.stop().await;
        assert!(!fabric.connected(DecoderKind::Acars));
    }

    #[tokio::test]
    async fn set_status_notifier_reaches_every_listener_and_fires_on_transition() {
        let a = fake_listener(DecoderKind::Acars);
        let b = fake_listener(DecoderKind::Vdlm2);
        let mut fabric = ListenerFabric {
            listeners: HashMap::new(),
        };
        fabric.listeners.insert(DecoderKind::Acars, vec![a.clone()]);
        fabric.listeners.insert(DecoderKind::Vdlm2, vec![b.clone()]);

        let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let calls_for_notifier = calls.clone();
        fabric.set_status_notifier(Arc::new(move || {
            calls_for_notifier.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        a.clone().start().await;
        b.clone().start().await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);

        a.stop().await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
