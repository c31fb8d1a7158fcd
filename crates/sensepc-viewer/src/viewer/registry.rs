//! Session registry: one viewer per cloud-PC instance.
//!
//! `SessionRegistry` owns every live [`SessionRecord`] keyed by instance id,
//! in insertion order, plus the currently selected id. All state sits behind
//! one async mutex; the existence check and the insertion in [`open`] happen
//! under the same guard, so two rapid opens for one instance can never
//! create two viewers.
//!
//! Surface callbacks arrive as [`SurfaceSignal`]s on an unbounded channel and
//! are applied by the [`SignalPump`] task. Script injection runs in a spawned
//! continuation after the settle delay and re-validates the record (viewer
//! id, navigation counter, `injected`) before touching the viewer; a
//! continuation whose session was closed or re-navigated in the meantime is
//! dropped.
//!
//! [`open`]: SessionRegistry::open

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};

use crate::viewer::record::SessionRecord;
use crate::viewer::script::{build_connection_script, ScriptOptions};
use crate::viewer::surface::{SurfaceContext, SurfaceEventSink, SurfaceFactory, SurfaceSignal, ViewerHandle};
use crate::viewer::types::*;

/// Shared registry handle (used as Tauri managed state).
pub type SessionRegistryState = Arc<SessionRegistry>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Registry tunables.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Landing page every viewer loads before injection.
    pub connector_url: String,
    /// Wait between navigation completion and script injection, giving the
    /// landing page time to finish its own startup.
    pub settle_delay: Duration,
    pub script: ScriptOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            connector_url: "about:blank".to_string(),
            settle_delay: Duration::from_millis(500),
            script: ScriptOptions::default(),
        }
    }
}

struct RegistryInner {
    records: HashMap<String, SessionRecord>,
    order: Vec<String>,
    selected: Option<String>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            selected: None,
        }
    }

    fn info(&self, instance_id: &str) -> Option<SessionInfo> {
        let selected = self.selected.as_deref() == Some(instance_id);
        self.records.get(instance_id).map(|r| r.info(selected))
    }

    fn infos(&self) -> Vec<SessionInfo> {
        self.order.iter().filter_map(|id| self.info(id)).collect()
    }

    /// Make `next` the visible session. Returns whether the selection moved.
    fn select(&mut self, next: Option<String>) -> bool {
        if self.selected == next {
            return false;
        }
        if let Some(prev) = self.selected.as_deref().and_then(|id| self.records.get(id)) {
            set_visible(prev, false);
        }
        if let Some(record) = next.as_deref().and_then(|id| self.records.get(id)) {
            set_visible(record, true);
        }
        self.selected = next;
        true
    }

    /// Remove `instance_id`, returning the record and its former position.
    fn remove(&mut self, instance_id: &str) -> Option<(SessionRecord, usize)> {
        let record = self.records.remove(instance_id)?;
        let index = self.order.iter().position(|id| id == instance_id).unwrap_or(self.order.len());
        if index < self.order.len() {
            self.order.remove(index);
        }
        Some((record, index))
    }

    /// Session to show after the one at `removed_index` went away: its
    /// predecessor, or the new first session when it was first.
    fn successor(&self, removed_index: usize) -> Option<String> {
        if self.order.is_empty() {
            return None;
        }
        let index = removed_index.saturating_sub(1).min(self.order.len() - 1);
        self.order.get(index).cloned()
    }
}

fn set_visible(record: &SessionRecord, visible: bool) {
    if let Some(viewer) = record.viewer() {
        if let Err(e) = viewer.set_visible(visible) {
            log::warn!(
                "[viewer-registry] failed to {} viewer for {}: {}",
                if visible { "show" } else { "hide" },
                record.instance_id(),
                e
            );
        }
    }
}

/// Multi-session viewer registry.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    factory: Arc<dyn SurfaceFactory>,
    options: RegistryOptions,
    changes: broadcast::Sender<RegistryChange>,
    signals: mpsc::UnboundedSender<SurfaceSignal>,
    next_viewer_id: AtomicU64,
}

/// Drains surface signals into the registry. Spawn [`run`](Self::run) on
/// the async runtime once at startup.
pub struct SignalPump {
    registry: Weak<SessionRegistry>,
    rx: mpsc::UnboundedReceiver<SurfaceSignal>,
}

impl SignalPump {
    pub async fn run(mut self) {
        while let Some(signal) = self.rx.recv().await {
            let Some(registry) = self.registry.upgrade() else {
                break;
            };
            registry.handle_signal(signal).await;
        }
        log::info!("[viewer-registry] signal pump exited");
    }
}

impl SessionRegistry {
    /// Create an empty registry and the pump that feeds it surface signals.
    pub fn new(factory: Arc<dyn SurfaceFactory>, options: RegistryOptions) -> (SessionRegistryState, SignalPump) {
        let (signals, rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let registry = Arc::new(Self {
            inner: Mutex::new(RegistryInner::new()),
            factory,
            options,
            changes,
            signals,
            next_viewer_id: AtomicU64::new(1),
        });
        let pump = SignalPump {
            registry: Arc::downgrade(&registry),
            rx,
        };
        (registry, pump)
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Receive every subsequent [`RegistryChange`].
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: RegistryChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    // ── Open ────────────────────────────────────────────────────────

    /// Open (or re-select) the session for `request.instance_id`.
    ///
    /// An existing record is selected and returned untouched. Otherwise a
    /// record is inserted, its viewer created and navigated to the
    /// connector page. Viewer failures leave the record in `Failed` with the
    /// error attached; the only error returned is an empty instance id.
    pub async fn open(&self, request: OpenRequest) -> Result<SessionInfo, ViewerError> {
        if request.instance_id.trim().is_empty() {
            return Err(ViewerError::invalid_instance_id());
        }
        let instance_id = request.instance_id.clone();
        let mut inner = self.inner.lock().await;

        if inner.records.contains_key(&instance_id) {
            let moved = inner.select(Some(instance_id.clone()));
            log::debug!("[viewer-registry] reusing session for {}", instance_id);
            self.publish(RegistryChange::Reused { instance_id: instance_id.clone() });
            if moved {
                self.publish(RegistryChange::Selected { instance_id: Some(instance_id.clone()) });
            }
            return inner
                .info(&instance_id)
                .ok_or_else(|| ViewerError::session_not_found(&instance_id));
        }

        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let title = if request.system_name.is_empty() {
            instance_id.clone()
        } else {
            request.system_name.clone()
        };
        let mut record = SessionRecord::new(request, viewer_id);
        let context = SurfaceContext {
            instance_id: instance_id.clone(),
            viewer_id,
            title,
            events: SurfaceEventSink::new(instance_id.clone(), viewer_id, self.signals.clone()),
        };

        match self.factory.create(context) {
            Ok(surface) => {
                record.attach(ViewerHandle::new(surface));
                if let Err(e) = record.begin_navigation(&self.options.connector_url) {
                    log::warn!("[viewer-registry] navigation for {} failed: {}", instance_id, e);
                    record.fail(&e);
                }
            }
            Err(e) => {
                log::error!("[viewer-registry] viewer for {} could not be created: {}", instance_id, e);
                record.fail(&e);
            }
        }

        inner.records.insert(instance_id.clone(), record);
        inner.order.push(instance_id.clone());
        inner.select(Some(instance_id.clone()));
        log::info!(
            "[viewer-registry] session {} opened (viewer #{}, {} total)",
            instance_id,
            viewer_id,
            inner.records.len()
        );

        self.publish(RegistryChange::Opened { instance_id: instance_id.clone() });
        self.publish(RegistryChange::Selected { instance_id: Some(instance_id.clone()) });
        inner
            .info(&instance_id)
            .ok_or_else(|| ViewerError::session_not_found(&instance_id))
    }

    // ── Select ──────────────────────────────────────────────────────

    /// Make `instance_id` the visible session. `false` when it is unknown.
    pub async fn select(&self, instance_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.records.contains_key(instance_id) {
            return false;
        }
        if inner.select(Some(instance_id.to_string())) {
            self.publish(RegistryChange::Selected { instance_id: Some(instance_id.to_string()) });
        }
        true
    }

    // ── Close ───────────────────────────────────────────────────────

    /// Remove `instance_id` and dispose its viewer. `false` when unknown.
    pub async fn close(&self, instance_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        self.remove_locked(&mut inner, instance_id, false)
    }

    /// Remove every session, e.g. on sign-out. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        if inner.records.is_empty() {
            return 0;
        }
        let order = std::mem::take(&mut inner.order);
        let had_selection = inner.selected.take().is_some();
        let mut closed = 0;
        for id in order {
            if let Some(mut record) = inner.records.remove(&id) {
                record.dispose_viewer();
                closed += 1;
            }
        }
        // Anything not tracked in `order` would be a bookkeeping bug; still
        // release it.
        for (_, mut record) in inner.records.drain() {
            record.dispose_viewer();
            closed += 1;
        }
        log::info!("[viewer-registry] closed all sessions ({})", closed);
        self.publish(RegistryChange::Cleared);
        if had_selection {
            self.publish(RegistryChange::Selected { instance_id: None });
        }
        closed
    }

    fn remove_locked(&self, inner: &mut RegistryInner, instance_id: &str, engine_closed: bool) -> bool {
        let Some((mut record, index)) = inner.remove(instance_id) else {
            return false;
        };
        if engine_closed {
            record.release_closed_viewer();
        } else {
            record.dispose_viewer();
        }
        log::info!(
            "[viewer-registry] session {} closed ({} remaining)",
            instance_id,
            inner.records.len()
        );
        self.publish(RegistryChange::Closed { instance_id: instance_id.to_string() });

        if inner.selected.as_deref() == Some(instance_id) {
            inner.selected = None;
            let next = inner.successor(index);
            inner.select(next.clone());
            self.publish(RegistryChange::Selected { instance_id: next });
        }
        true
    }

    // ── Reload ──────────────────────────────────────────────────────

    /// Re-navigate the viewer to the connector page so the bootstrap runs
    /// again. `false` when the session is unknown or has no live viewer.
    pub async fn reload(&self, instance_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(instance_id) else {
            return false;
        };
        if !record.has_viewer() {
            return false;
        }
        match record.begin_navigation(&self.options.connector_url) {
            Ok(()) => {
                self.publish(RegistryChange::StateChanged {
                    instance_id: instance_id.to_string(),
                    state: record.state(),
                });
                true
            }
            Err(e) => {
                log::warn!("[viewer-registry] reload of {} failed: {}", instance_id, e);
                record.fail(&e);
                self.publish(RegistryChange::StateChanged {
                    instance_id: instance_id.to_string(),
                    state: SessionState::Failed,
                });
                false
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn count(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }

    pub async fn contains(&self, instance_id: &str) -> bool {
        self.inner.lock().await.records.contains_key(instance_id)
    }

    pub async fn get(&self, instance_id: &str) -> Option<SessionInfo> {
        self.inner.lock().await.info(instance_id)
    }

    /// All sessions in insertion order.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.inner.lock().await.infos()
    }

    pub async fn selected(&self) -> Option<String> {
        self.inner.lock().await.selected.clone()
    }

    // ── Signals ─────────────────────────────────────────────────────

    /// Queue a signal behind any engine callbacks already pending.
    pub fn dispatch(&self, signal: SurfaceSignal) {
        if self.signals.send(signal).is_err() {
            log::warn!("[viewer-registry] signal pump is not running");
        }
    }

    /// Apply one surface signal. Signals for unknown instances or from a
    /// replaced viewer are ignored.
    pub async fn handle_signal(self: &Arc<Self>, signal: SurfaceSignal) {
        let SurfaceSignal { instance_id, viewer_id, event } = signal;
        let mut inner = self.inner.lock().await;

        match inner.records.get(&instance_id).map(|r| r.viewer_id()) {
            None => {
                log::debug!("[viewer-registry] dropping {:?} for closed session {}", event, instance_id);
                return;
            }
            Some(current) if current != viewer_id => {
                log::debug!(
                    "[viewer-registry] dropping {:?} from stale viewer #{} of {}",
                    event,
                    viewer_id,
                    instance_id
                );
                return;
            }
            Some(_) => {}
        }

        if event == SurfaceEvent::Closed {
            log::info!("[viewer-registry] viewer for {} was closed by its window", instance_id);
            self.remove_locked(&mut inner, &instance_id, true);
            return;
        }
        let Some(record) = inner.records.get_mut(&instance_id) else {
            return;
        };

        let state = match event {
            SurfaceEvent::NavigationStarted { url } => {
                log::debug!("[viewer-registry] {} navigating to {}", instance_id, url);
                record.note_navigation_started();
                Some(SessionState::Loading)
            }
            SurfaceEvent::NavigationCompleted { url } => {
                if record.injected() || record.state() != SessionState::Loading || !record.has_viewer() {
                    log::debug!("[viewer-registry] {} loaded {} (no injection pending)", instance_id, url);
                } else {
                    self.schedule_injection(instance_id.clone(), viewer_id, record.navigation());
                }
                None
            }
            SurfaceEvent::NavigationFailed { message } => {
                log::warn!("[viewer-registry] navigation for {} failed: {}", instance_id, message);
                record.fail(&ViewerError::navigation(message));
                Some(SessionState::Failed)
            }
            SurfaceEvent::FirstFrame
            | SurfaceEvent::Disconnected { .. }
            | SurfaceEvent::ConnectFailed { .. }
                if !record.injected() =>
            {
                log::debug!("[viewer-registry] ignoring SDK status for {} before injection", instance_id);
                None
            }
            SurfaceEvent::FirstFrame => {
                log::info!("[viewer-registry] {} received first frame", instance_id);
                record.set_state(SessionState::Connected, None);
                Some(SessionState::Connected)
            }
            SurfaceEvent::Disconnected { reason } => {
                log::info!("[viewer-registry] {} disconnected: {:?}", instance_id, reason);
                record.set_state(SessionState::Disconnected, reason);
                Some(SessionState::Disconnected)
            }
            SurfaceEvent::ConnectFailed { message } => {
                log::warn!("[viewer-registry] {} failed to connect: {}", instance_id, message);
                record.fail(&ViewerError::connect_failure(message));
                Some(SessionState::Failed)
            }
            SurfaceEvent::Closed => None,
        };

        if let Some(state) = state {
            self.publish(RegistryChange::StateChanged { instance_id, state });
        }
    }

    fn schedule_injection(self: &Arc<Self>, instance_id: String, viewer_id: ViewerId, navigation: u64) {
        let registry = Arc::downgrade(self);
        let delay = self.options.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = registry.upgrade() {
                registry.inject(&instance_id, viewer_id, navigation).await;
            }
        });
    }

    /// Execute the bootstrap script if the record is still the one the
    /// continuation was scheduled for.
    async fn inject(&self, instance_id: &str, viewer_id: ViewerId, navigation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(instance_id) else {
            log::debug!("[viewer-registry] injection for {} skipped: session closed", instance_id);
            return false;
        };
        if record.viewer_id() != viewer_id
            || record.navigation() != navigation
            || record.injected()
            || record.state() != SessionState::Loading
        {
            log::debug!("[viewer-registry] injection for {} skipped: stale continuation", instance_id);
            return false;
        }

        let script = build_connection_script(record, &self.options.script);
        let result = match record.viewer() {
            Some(viewer) => viewer.execute_script(&script),
            None => return false,
        };

        match result {
            Ok(()) => {
                record.mark_injected();
                log::info!("[viewer-registry] bootstrap injected into {}", instance_id);
                self.publish(RegistryChange::StateChanged {
                    instance_id: instance_id.to_string(),
                    state: SessionState::ScriptInjected,
                });
                true
            }
            Err(e) => {
                log::warn!("[viewer-registry] bootstrap injection into {} failed: {}", instance_id, e);
                record.fail(&e);
                self.publish(RegistryChange::StateChanged {
                    instance_id: instance_id.to_string(),
                    state: SessionState::Failed,
                });
                false
            }
        }
    }
}
