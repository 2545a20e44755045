// src/core/orchestrator.rs

//! The orchestrator: owns every long-lived component and drives their
//! lifecycle. `initialize` wires listeners, the queue, the processor, the
//! scheduler, and (if enabled) the ADS-B poller; `start`/`stop` are
//! idempotent and reverse each other.

use crate::config::Config;
use crate::core::adsb::AdsbPoller;
use crate::core::alerts::AlertEngine;
use crate::core::errors::Result;
use crate::core::listener::ListenerFabric;
use crate::core::processor::MessageProcessor;
use crate::core::queue::MessageQueue;
use crate::core::scheduler::{status_payload, Scheduler, SchedulerRetention};
use crate::core::sink::{EventSink, EVENT_SYSTEM_STATUS};
use crate::core::storage::Storage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::reload;

/// The bundle of shared handles a caller needs to talk to a running core
/// (submit configuration changes, read cached snapshots, etc).
pub struct Handle {
    pub storage: Storage,
    pub queue: MessageQueue,
    pub fabric: Arc<ListenerFabric>,
    pub alerts: Arc<AlertEngine>,
    pub adsb: Arc<AdsbPoller>,
    /// Lets a config-change operation adjust the running log level without
    /// a restart. `None` when the caller (tests, embedders) has no
    /// reloadable subscriber to offer.
    pub log_reload_handle: Option<Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>>,
}

pub struct Orchestrator {
    handle: Handle,
    scheduler: Arc<Scheduler>,
    sink: Arc<dyn EventSink>,
    save_all: bool,
    shutdown_tx: broadcast::Sender<()>,
    started: AtomicBool,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl Orchestrator {
    /// Builds every component and wires their shared handles, without
    /// starting any background task yet. `log_reload_handle` is stored on
    /// the returned `Handle` so a config-change operation can adjust the
    /// running log level at runtime; pass `None` when there is no
    /// reloadable subscriber (tests, embedders that manage logging
    /// themselves).
    pub async fn initialize(
        config: &Config,
        sink: Arc<dyn EventSink>,
        log_reload_handle: Option<Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| crate::core::errors::AcarshubError::InvalidConfig(e.to_string()))?;

        let storage = Storage::open(&config.database_path).await?;
        let queue = MessageQueue::new(config.queue_capacity);
        let (shutdown_tx, _) = broadcast::channel(16);

        let fabric = Arc::new(ListenerFabric::build(&config.decoders, queue.clone(), &shutdown_tx));

        // Weak so the notifier stored inside the fabric's own listeners
        // doesn't keep the fabric alive past the orchestrator dropping it.
        let status_queue = queue.clone();
        let status_sink = sink.clone();
        let weak_fabric = Arc::downgrade(&fabric);
        fabric.set_status_notifier(Arc::new(move || {
            if let Some(fabric) = weak_fabric.upgrade() {
                status_sink.emit(EVENT_SYSTEM_STATUS, status_payload(&status_queue, &fabric));
            }
        }));

        let alerts = Arc::new(AlertEngine::load(storage.clone()).await?);
        let adsb = Arc::new(AdsbPoller::new(config.adsb.clone(), sink.clone()));

        let retention = SchedulerRetention {
            message_save_days: config.retention.message_save_days,
            alert_save_days: config.retention.alert_save_days,
            timeseries_prune_period: Duration::from_secs(3600),
        };
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            queue.clone(),
            fabric.clone(),
            sink.clone(),
            retention,
            config.retention.timeseries_retention,
        ));

        let handle = Handle {
            storage,
            queue,
            fabric,
            alerts,
            adsb,
            log_reload_handle,
        };

        info!("orchestrator: initialized");
        Ok(Self {
            handle,
            scheduler,
            sink,
            save_all: config.save_all,
            shutdown_tx,
            started: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Starts every listener, the processor, the scheduler, and (if
    /// enabled) the ADS-B poller. Idempotent.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.handle.fabric.start_all().await;

        let processor = MessageProcessor::new(
            self.handle.queue.clone(),
            self.handle.storage.clone(),
            self.handle.alerts.clone(),
            self.sink.clone(),
            self.save_all,
        );
        let mut tasks = self.tasks.lock().await;

        let processor_shutdown = self.shutdown_tx.subscribe();
        tasks.spawn(async move { processor.run(processor_shutdown).await });

        let scheduler = self.scheduler.clone();
        let scheduler_shutdown = self.shutdown_tx.subscribe();
        tasks.spawn(async move { scheduler.run(scheduler_shutdown).await });

        let queue = self.handle.queue.clone();
        let minute_reset_shutdown = self.shutdown_tx.subscribe();
        tasks.spawn(async move { queue.run_minute_reset(minute_reset_shutdown).await });

        let adsb = self.handle.adsb.clone();
        let adsb_shutdown = self.shutdown_tx.subscribe();
        tasks.spawn(async move { adsb.run(adsb_shutdown).await });

        info!("orchestrator: started");
    }

    /// Stops every component in reverse order. Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.handle.fabric.stop_all().await;

        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}

        info!("orchestrator: stopped");
    }

    /// True if any listener for this decoder kind is currently connected.
    pub fn connected(&self, kind: crate::config::DecoderKind) -> bool {
        self.handle.fabric.connected(kind)
    }

    /// The `{acars, vdlm2, hfdl, imsl, irdm, total}` response for an
    /// external stats endpoint. Prefers aggregated time-series within the
    /// last hour; with zero time-series rows, falls back to the queue's
    /// cumulative totals.
    pub async fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let ts = self.handle.storage.sum_last_hour_by_kind(now).await?;
        if ts.total != 0 {
            return Ok(StatsSnapshot {
                acars: ts.acars,
                vdlm2: ts.vdlm,
                hfdl: ts.hfdl,
                imsl: ts.imsl,
                irdm: ts.irdm,
                total: ts.total,
            });
        }

        let stats = self.handle.queue.snapshot_statistics();
        let cumulative = |kind: crate::config::DecoderKind| {
            stats.per_kind.get(&kind).map(|c| c.total as i64).unwrap_or(0)
        };
        let acars = cumulative(crate::config::DecoderKind::Acars);
        let vdlm2 = cumulative(crate::config::DecoderKind::Vdlm2);
        let hfdl = cumulative(crate::config::DecoderKind::Hfdl);
        let imsl = cumulative(crate::config::DecoderKind::Imsl);
        let irdm = cumulative(crate::config::DecoderKind::Irdm);
        Ok(StatsSnapshot {
            acars,
            vdlm2,
            hfdl,
            imsl,
            irdm,
            total: acars + vdlm2 + hfdl + imsl + irdm,
        })
    }
}

/// The stats-endpoint response shape: per-kind message counts plus their
/// sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub acars: i64,
    pub vdlm2: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub total: i64,
}
