//! One live remote-display connection.

use crate::viewer::surface::ViewerHandle;
use crate::viewer::types::{OpenRequest, SessionInfo, SessionState, ViewerError, ViewerId};

/// Registry entry for one cloud-PC instance.
///
/// Owns the instance's viewer exclusively; the viewer is disposed when the
/// record is removed (or dropped).
pub struct SessionRecord {
    instance_id: String,
    system_name: String,
    host_name: String,
    session_token: String,
    session_id: String,
    viewer_id: ViewerId,
    viewer: Option<ViewerHandle>,
    injected: bool,
    /// Bumped on every navigation start.
    navigation: u64,
    state: SessionState,
    error: Option<String>,
    opened_at: String,
}

impl SessionRecord {
    pub fn new(request: OpenRequest, viewer_id: ViewerId) -> Self {
        Self {
            instance_id: request.instance_id,
            system_name: request.system_name,
            host_name: request.host_name,
            session_token: request.session_token,
            session_id: request.session_id,
            viewer_id,
            viewer: None,
            injected: false,
            navigation: 0,
            state: SessionState::Created,
            error: None,
            opened_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn instance_id(&self) -> &str { &self.instance_id }
    pub fn system_name(&self) -> &str { &self.system_name }
    pub fn host_name(&self) -> &str { &self.host_name }
    pub fn session_token(&self) -> &str { &self.session_token }
    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn viewer_id(&self) -> ViewerId { self.viewer_id }
    pub fn injected(&self) -> bool { self.injected }
    pub fn navigation(&self) -> u64 { self.navigation }
    pub fn state(&self) -> SessionState { self.state }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    pub fn has_viewer(&self) -> bool {
        self.viewer.as_ref().map(|v| !v.is_disposed()).unwrap_or(false)
    }

    pub fn info(&self, selected: bool) -> SessionInfo {
        SessionInfo {
            instance_id: self.instance_id.clone(),
            system_name: self.system_name.clone(),
            host_name: self.host_name.clone(),
            session_id: self.session_id.clone(),
            viewer_id: self.viewer_id,
            state: self.state,
            injected: self.injected,
            selected,
            error: self.error.clone(),
            opened_at: self.opened_at.clone(),
        }
    }

    // ── Lifecycle (driven by the registry) ──────────────────────────

    pub(crate) fn attach(&mut self, viewer: ViewerHandle) {
        self.viewer = Some(viewer);
    }

    pub(crate) fn viewer(&self) -> Option<&ViewerHandle> {
        self.viewer.as_ref().filter(|v| !v.is_disposed())
    }

    /// Navigate the viewer to `url` and enter `Loading`.
    pub(crate) fn begin_navigation(&mut self, url: &str) -> Result<(), ViewerError> {
        let viewer = self
            .viewer()
            .ok_or_else(|| ViewerError::viewer_init("Viewer is not available"))?;
        viewer.navigate(url)?;
        self.note_navigation_started();
        Ok(())
    }

    /// A navigation began, whether we asked for it or the page did.
    pub(crate) fn note_navigation_started(&mut self) {
        self.navigation += 1;
        self.injected = false;
        self.state = SessionState::Loading;
        self.error = None;
    }

    pub(crate) fn mark_injected(&mut self) {
        self.injected = true;
        self.state = SessionState::ScriptInjected;
    }

    pub(crate) fn set_state(&mut self, state: SessionState, error: Option<String>) {
        self.state = state;
        self.error = error;
    }

    pub(crate) fn fail(&mut self, err: &ViewerError) {
        self.set_state(SessionState::Failed, Some(err.message.clone()));
    }

    /// Dispose the viewer now. Later calls are no-ops.
    pub(crate) fn dispose_viewer(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.dispose();
        }
    }

    /// Drop the viewer without disposing it; its engine already tore it down.
    pub(crate) fn release_closed_viewer(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.mark_disposed();
        }
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("instance_id", &self.instance_id)
            .field("system_name", &self.system_name)
            .field("host_name", &self.host_name)
            .field("session_token", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("viewer_id", &self.viewer_id)
            .field("injected", &self.injected)
            .field("navigation", &self.navigation)
            .field("state", &self.state)
            .finish()
    }
}
