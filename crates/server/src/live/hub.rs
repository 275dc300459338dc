//! Aggregation and broadcast hub.
//!
//! Owns every attached client's outbound queue, the ring buffer of recent
//! lifecycle events, and the file watcher. Snapshots are rebuilt on a fixed
//! interval or when the watcher reports a change, and fanned out to all
//! clients as one `sessions` frame.
//!
//! # Concurrency
//!
//! - `events` and `clients` are the only shared mutable state. When both are
//!   needed the order is always `events` then `clients`.
//! - The connected-clients gauge is only written while `clients` is held, so
//!   it always ends on the count of the last membership change.
//! - Fan-out copies the client senders out of the lock and then uses
//!   non-blocking `try_send`. A full queue force-disconnects that client; a
//!   closed queue just removes it. Neither affects any other client.
//! - Aggregation is single-flight: passes are serialized, and refresh
//!   requests that arrive during a pass collapse into one follow-up pass.
//!
//! # Client lifecycle
//!
//! ```text
//! attach() ──▶ Attached ──(heartbeat, backlog, live frames)──▶ Detached
//!                 │                                              ▲
//!                 └── drop / detach / backpressure / shutdown ───┘
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use co11y_core::{build_snapshot, HookEvent, Snapshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameKind};
use super::ring::EventRing;
use super::watcher::{ChangeCallback, SessionWatcher};
use crate::metrics;

pub type ClientId = u64;

/// Tunables for the hub. `Default` matches the CLI defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Quiet period per file before a change triggers re-aggregation.
    pub debounce: Duration,
    /// Periodic full re-aggregation.
    pub snapshot_interval: Duration,
    /// Per-client keepalive period.
    pub heartbeat_interval: Duration,
    /// Lifecycle events retained for replay on attach.
    pub event_capacity: usize,
    /// Live frames a client may fall behind before it is disconnected.
    pub client_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            snapshot_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            event_capacity: 100,
            client_queue: 64,
        }
    }
}

struct ClientSlot {
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

pub struct BroadcastHub {
    projects_dir: PathBuf,
    config: HubConfig,
    clients: Mutex<HashMap<ClientId, ClientSlot>>,
    events: Mutex<EventRing<HookEvent>>,
    next_client_id: AtomicU64,
    refresh: Notify,
    aggregation: tokio::sync::Mutex<()>,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown: CancellationToken,
    watcher: Mutex<Option<SessionWatcher>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BroadcastHub {
    pub fn new(projects_dir: impl Into<PathBuf>, config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            projects_dir: projects_dir.into(),
            events: Mutex::new(EventRing::new(config.event_capacity)),
            config,
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            refresh: Notify::new(),
            aggregation: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            watcher: Mutex::new(None),
        })
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Spawn the aggregation loop and the file watcher. Only the first call
    /// has an effect.
    ///
    /// A watcher that fails to start is logged; periodic aggregation still runs.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn(Arc::clone(self).run_aggregation_loop());

        let weak = Arc::downgrade(self);
        let on_change: ChangeCallback = Arc::new(move |path| {
            if let Some(hub) = weak.upgrade() {
                debug!(path = %path.display(), "Record file changed");
                hub.request_refresh();
            }
        });

        match SessionWatcher::start(&self.projects_dir, self.config.debounce, on_change) {
            Ok(watcher) => *lock(&self.watcher) = Some(watcher),
            Err(e) => warn!(error = %e, "File watcher failed to start; relying on periodic snapshots"),
        }

        info!(
            projects_dir = %self.projects_dir.display(),
            interval_secs = self.config.snapshot_interval.as_secs(),
            "Broadcast hub started"
        );
    }

    /// Stop the loop and watcher and disconnect every client. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        if let Some(mut watcher) = lock(&self.watcher).take() {
            watcher.close();
        }

        let drained: Vec<ClientSlot> = {
            let mut clients = lock(&self.clients);
            let drained = clients.drain().map(|(_, slot)| slot).collect();
            metrics::set_clients_connected(clients.len());
            drained
        };
        for slot in &drained {
            slot.cancel.cancel();
            metrics::record_client_dropped("shutdown");
        }
        info!(clients = drained.len(), "Broadcast hub shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a new client.
    ///
    /// Its queue is seeded with a heartbeat followed by the event backlog in
    /// insertion order, before it becomes visible to fan-out.
    pub fn attach(self: &Arc<Self>) -> ClientHandle {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        let events = lock(&self.events);
        // Room for the heartbeat and a full backlog on top of the live budget.
        let (tx, rx) = mpsc::channel(self.config.client_queue + events.capacity() + 1);
        let _ = tx.try_send(Frame::heartbeat(Utc::now()));
        for event in events.iter() {
            let _ = tx.try_send(Frame::hook(event));
        }
        let backlog = events.len();

        let registered = if self.is_shutdown() {
            None
        } else {
            let mut clients = lock(&self.clients);
            clients.insert(
                id,
                ClientSlot {
                    tx,
                    cancel: cancel.clone(),
                },
            );
            metrics::set_clients_connected(clients.len());
            Some(clients.len())
        };
        drop(events);

        if let Some(count) = registered {
            info!(client_id = id, backlog, clients = count, "Client attached");
        }

        ClientHandle {
            id,
            hub: Arc::downgrade(self),
            rx,
            cancel,
            heartbeat_interval: self.config.heartbeat_interval,
        }
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn detach(&self, id: ClientId) -> bool {
        self.remove_client(id, "closed")
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Current ring buffer contents, oldest first.
    pub fn event_backlog(&self) -> Vec<HookEvent> {
        lock(&self.events).to_vec()
    }

    /// Append a lifecycle event to the ring buffer and push it to every
    /// attached client. Returns the number of clients it was queued for.
    pub fn ingest(&self, event: HookEvent) -> usize {
        let frame = Frame::hook(&event);
        metrics::record_hook_event(event.kind());
        debug!(
            session_id = %event.session_id(),
            event_type = event.kind(),
            tool = event.tool_name(),
            "Ingesting hook event"
        );

        let targets = {
            let mut events = lock(&self.events);
            events.push(event);
            self.client_senders()
        };
        self.deliver(targets, frame)
    }

    /// Push `frame` to every attached client. Returns how many accepted it.
    pub fn broadcast(&self, frame: Frame) -> usize {
        let targets = self.client_senders();
        self.deliver(targets, frame)
    }

    /// Ask the aggregation loop for a pass. Requests made while a pass is
    /// running coalesce into a single follow-up pass.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Rebuild the snapshot now and fan it out, waiting for any in-flight
    /// pass to finish first.
    pub async fn aggregate_now(&self) -> Snapshot {
        let _guard = self.aggregation.lock().await;
        let started = Instant::now();

        let snapshot = build_snapshot(&self.projects_dir, Utc::now()).await;
        let sessions = snapshot.sessions();
        metrics::record_aggregation(started.elapsed(), sessions.len());

        self.broadcast(Frame::sessions(&sessions));
        snapshot
    }

    async fn run_aggregation_loop(self: Arc<Self>) {
        let period = self.config.snapshot_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.refresh.notified() => {}
                _ = ticker.tick() => {}
            }

            self.rearm_watcher();
            if self.client_count() == 0 {
                continue;
            }
            self.aggregate_now().await;
            ticker.reset();
        }
        debug!("Aggregation loop stopped");
    }

    /// Pick up a projects root that did not exist when the watcher started.
    fn rearm_watcher(&self) {
        if let Some(watcher) = lock(&self.watcher).as_mut() {
            if let Err(e) = watcher.rearm() {
                warn!(error = %e, "Failed to watch projects directory");
            }
        }
    }

    fn client_senders(&self) -> Vec<(ClientId, mpsc::Sender<Frame>)> {
        lock(&self.clients)
            .iter()
            .map(|(id, slot)| (*id, slot.tx.clone()))
            .collect()
    }

    fn deliver(&self, targets: Vec<(ClientId, mpsc::Sender<Frame>)>, frame: Frame) -> usize {
        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = id, kind = frame.kind().as_str(), "Client queue full, disconnecting");
                    self.remove_client(id, "backpressure");
                }
                Err(TrySendError::Closed(_)) => {
                    self.remove_client(id, "closed");
                }
            }
        }
        metrics::record_frames_sent(frame.kind().as_str(), delivered);
        delivered
    }

    fn remove_client(&self, id: ClientId, reason: &'static str) -> bool {
        let (slot, remaining) = {
            let mut clients = lock(&self.clients);
            let Some(slot) = clients.remove(&id) else {
                return false;
            };
            metrics::set_clients_connected(clients.len());
            (slot, clients.len())
        };

        slot.cancel.cancel();
        metrics::record_client_dropped(reason);
        info!(client_id = id, reason, clients = remaining, "Client detached");
        true
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One attached client's receiving end.
///
/// Dropping the handle detaches the client; this is the single terminal hook
/// for every way a connection can end.
pub struct ClientHandle {
    id: ClientId,
    hub: Weak<BroadcastHub>,
    rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Fires when the hub drops this client or shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next queued frame, or `None` once the client has been cancelled.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }

    /// Queued frames interleaved with a keepalive every heartbeat interval.
    /// Ends when the client is cancelled.
    pub fn into_frames(self) -> impl Stream<Item = Frame> + Send + 'static {
        async_stream::stream! {
            let mut client = self;
            let period = client.heartbeat_interval;
            let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    frame = client.recv() => match frame {
                        Some(frame) => yield frame,
                        None => break,
                    },
                    _ = heartbeat.tick() => {
                        metrics::record_frames_sent(FrameKind::Heartbeat.as_str(), 1);
                        yield Frame::heartbeat(Utc::now());
                    }
                }
            }
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use co11y_core::parse_hook_event;
    use serde_json::{json, Value};
    use tokio_stream::StreamExt;

    fn hook(n: u64) -> HookEvent {
        parse_hook_event(json!({
            "type": "SessionEnd",
            "sessionId": format!("s{n}"),
            "timestamp": "2026-03-01T12:00:00Z",
            "cwd": "/w",
            "messageCount": n,
            "duration": 1,
        }))
        .unwrap()
    }

    fn hook_session(frame: &Frame) -> String {
        assert_eq!(frame.kind(), FrameKind::Hook);
        let value: Value = serde_json::from_str(frame.data()).unwrap();
        value["sessionId"].as_str().unwrap().to_string()
    }

    fn test_hub(config: HubConfig) -> (Arc<BroadcastHub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (BroadcastHub::new(dir.path(), config), dir)
    }

    #[tokio::test]
    async fn test_attach_gets_heartbeat_then_backlog_then_live() {
        let (hub, _dir) = test_hub(HubConfig::default());
        hub.ingest(hook(1));
        hub.ingest(hook(2));

        let mut client = hub.attach();
        assert_eq!(client.recv().await.unwrap().kind(), FrameKind::Heartbeat);
        assert_eq!(hook_session(&client.recv().await.unwrap()), "s1");
        assert_eq!(hook_session(&client.recv().await.unwrap()), "s2");

        assert_eq!(hub.ingest(hook(3)), 1);
        assert_eq!(hook_session(&client.recv().await.unwrap()), "s3");
    }

    #[tokio::test]
    async fn test_ring_buffer_evicts_oldest() {
        let (hub, _dir) = test_hub(HubConfig {
            event_capacity: 3,
            ..HubConfig::default()
        });
        for n in 1..=5 {
            hub.ingest(hook(n));
        }
        let backlog: Vec<_> = hub
            .event_backlog()
            .iter()
            .map(|e| e.session_id().to_string())
            .collect();
        assert_eq!(backlog, vec!["s3", "s4", "s5"]);

        let mut client = hub.attach();
        client.recv().await.unwrap();
        assert_eq!(hook_session(&client.recv().await.unwrap()), "s3");
    }

    #[tokio::test]
    async fn test_slow_client_is_dropped_without_affecting_others() {
        let (hub, _dir) = test_hub(HubConfig {
            event_capacity: 2,
            client_queue: 1,
            ..HubConfig::default()
        });
        let mut slow = hub.attach();
        let mut healthy = hub.attach();
        assert_eq!(healthy.recv().await.unwrap().kind(), FrameKind::Heartbeat);

        // Slow queue holds 4: heartbeat + three events, then overflows.
        for n in 1..=6 {
            hub.ingest(hook(n));
            assert_eq!(hook_session(&healthy.recv().await.unwrap()), format!("s{n}"));
        }

        assert_eq!(hub.client_count(), 1);
        assert!(slow.cancellation().is_cancelled());
        assert!(slow.recv().await.is_none());
        assert_eq!(hub.broadcast(Frame::heartbeat(Utc::now())), 1);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let (hub, _dir) = test_hub(HubConfig::default());
        let client = hub.attach();
        let id = client.id();
        assert_eq!(hub.client_count(), 1);

        assert!(hub.detach(id));
        assert!(!hub.detach(id));
        drop(client);
        assert_eq!(hub.client_count(), 0);

        let other = hub.attach();
        drop(other);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_clients_and_is_idempotent() {
        let (hub, _dir) = test_hub(HubConfig::default());
        let mut client = hub.attach();
        client.recv().await.unwrap();

        hub.shutdown();
        hub.shutdown();
        assert!(client.recv().await.is_none());
        assert_eq!(hub.client_count(), 0);

        let mut late = hub.attach();
        assert_eq!(hub.client_count(), 0);
        assert!(late.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_every_interval() {
        let (hub, _dir) = test_hub(HubConfig {
            heartbeat_interval: Duration::from_secs(30),
            ..HubConfig::default()
        });
        let frames = hub.attach().into_frames();
        tokio::pin!(frames);

        let first = frames.next().await.unwrap();
        assert_eq!(first.kind(), FrameKind::Heartbeat);

        let start = tokio::time::Instant::now();
        let second = frames.next().await.unwrap();
        assert_eq!(second.kind(), FrameKind::Heartbeat);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_aggregate_now_pushes_sessions_frame() {
        let (hub, dir) = test_hub(HubConfig::default());
        let project = dir.path().join("-tmp-app");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(
            project.join("0b5c1a7e-1d2f-4c3b-9a8e-7f6d5c4b3a21.jsonl"),
            "{\"type\":\"user\",\"timestamp\":\"2026-01-01T00:00:00Z\",\"message\":{\"content\":\"hi\"}}\n",
        )
        .unwrap();

        let mut client = hub.attach();
        client.recv().await.unwrap();

        let snapshot = hub.aggregate_now().await;
        assert_eq!(snapshot.projects.len(), 1);

        let frame = client.recv().await.unwrap();
        assert_eq!(frame.kind(), FrameKind::Sessions);
        let sessions: Value = serde_json::from_str(frame.data()).unwrap();
        assert_eq!(sessions[0]["id"], "0b5c1a7e-1d2f-4c3b-9a8e-7f6d5c4b3a21");
        assert_eq!(sessions[0]["messageCount"], 1);
    }

    #[tokio::test]
    async fn test_refresh_requests_coalesce() {
        let (hub, _dir) = test_hub(HubConfig {
            snapshot_interval: Duration::from_secs(3600),
            ..HubConfig::default()
        });
        let mut client = hub.attach();
        client.recv().await.unwrap();

        hub.start();
        for _ in 0..5 {
            hub.request_refresh();
        }

        let frame = tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind(), FrameKind::Sessions);
        assert!(
            tokio::time::timeout(Duration::from_millis(300), client.recv())
                .await
                .is_err(),
            "burst of refresh requests should produce a single pass"
        );
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_file_change_triggers_snapshot() {
        let (hub, dir) = test_hub(HubConfig {
            debounce: Duration::from_millis(50),
            snapshot_interval: Duration::from_secs(3600),
            ..HubConfig::default()
        });
        let project = dir.path().join("-tmp-app");
        std::fs::create_dir(&project).unwrap();

        let mut client = hub.attach();
        client.recv().await.unwrap();
        hub.start();

        std::fs::write(
            project.join("11111111-2222-3333-4444-555555555555.jsonl"),
            "{\"type\":\"user\",\"message\":{\"content\":\"hi\"}}\n",
        )
        .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(10), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind(), FrameKind::Sessions);
        assert!(frame.data().contains("11111111-2222-3333-4444-555555555555"));
        hub.shutdown();
    }

    fn connected_gauge(handle: &metrics_exporter_prometheus::PrometheusHandle) -> Option<f64> {
        handle
            .render()
            .lines()
            .find_map(|line| line.strip_prefix("hub_clients_connected "))
            .and_then(|v| v.trim().parse().ok())
    }

    #[test]
    fn test_connected_gauge_tracks_membership() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let dir = tempfile::tempdir().unwrap();

        ::metrics::with_local_recorder(&recorder, || {
            let hub = BroadcastHub::new(dir.path(), HubConfig {
                event_capacity: 0,
                client_queue: 1,
                ..HubConfig::default()
            });
            let first = hub.attach();
            let second = hub.attach();
            let _third = hub.attach();
            assert_eq!(connected_gauge(&handle), Some(3.0));

            assert!(hub.detach(first.id()));
            assert_eq!(connected_gauge(&handle), Some(2.0));
            drop(second);
            assert_eq!(connected_gauge(&handle), Some(1.0));

            // Heartbeat plus one live frame fills the queue; the next overflows.
            hub.broadcast(Frame::heartbeat(Utc::now()));
            hub.broadcast(Frame::heartbeat(Utc::now()));
            assert_eq!(hub.client_count(), 0);
            assert_eq!(connected_gauge(&handle), Some(0.0));

            let _late = hub.attach();
            assert_eq!(connected_gauge(&handle), Some(1.0));
            hub.shutdown();
            assert_eq!(connected_gauge(&handle), Some(0.0));
            drop(first);
        });
    }

    #[tokio::test]
    async fn test_projects_root_created_after_start_is_watched() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("projects");
        let hub = BroadcastHub::new(&root, HubConfig {
            snapshot_interval: Duration::from_millis(100),
            ..HubConfig::default()
        });
        hub.start();
        fn armed(hub: &BroadcastHub) -> bool {
            lock(&hub.watcher).as_ref().is_some_and(|w| w.is_armed())
        }
        assert!(!armed(&hub));

        std::fs::create_dir_all(root.join("-tmp-late")).unwrap();
        // The next aggregation tick attaches the watcher even with no clients.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(armed(&hub));

        hub.shutdown();
        assert!(!armed(&hub));
    }
}
