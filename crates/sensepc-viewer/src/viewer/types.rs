//! Viewer types: open requests, session snapshots, surface events, registry
//! change notifications, and errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one viewer instance. Every newly created record gets a fresh
/// id, so callbacks that outlive their viewer can be recognised.
pub type ViewerId = u64;

// ── Open request ────────────────────────────────────────────────────────

/// Parameters for [`SessionRegistry::open`](crate::SessionRegistry::open).
///
/// Only `instance_id` is validated. Empty credential fields are treated as
/// "unknown" and handed to the bootstrap script as empty strings; rejecting
/// bad credentials is the remote-display SDK's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub instance_id: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub session_token: String,
    #[serde(default)]
    pub session_id: String,
}

impl OpenRequest {
    pub fn new(
        instance_id: impl Into<String>,
        system_name: impl Into<String>,
        host_name: impl Into<String>,
        session_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            system_name: system_name.into(),
            host_name: host_name.into(),
            session_token: session_token.into(),
            session_id: session_id.into(),
        }
    }
}

// ── Session lifecycle ───────────────────────────────────────────────────

/// Lifecycle of one session record.
///
/// `Created → Loading → ScriptInjected → Connected | Failed | Disconnected`.
/// A record may jump from `Created` straight to `Failed` when its viewer
/// cannot be created, and any re-navigation puts it back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Created,
    Loading,
    ScriptInjected,
    Connected,
    Failed,
    Disconnected,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Loading => "loading",
            Self::ScriptInjected => "scriptInjected",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// UI-facing snapshot of a session record. Never carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub instance_id: String,
    pub system_name: String,
    pub host_name: String,
    pub session_id: String,
    pub viewer_id: ViewerId,
    pub state: SessionState,
    pub injected: bool,
    pub selected: bool,
    /// Error text rendered in place of the loading overlay.
    pub error: Option<String>,
    /// RFC 3339 timestamp of when the record was created.
    pub opened_at: String,
}

// ── Surface events ──────────────────────────────────────────────────────

/// Callbacks a viewer surface reports back to the registry.
///
/// Navigation events come from the embedding engine; `FirstFrame`,
/// `Disconnected` and `ConnectFailed` originate in the remote-display SDK
/// running inside the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceEvent {
    NavigationStarted { url: String },
    NavigationCompleted { url: String },
    NavigationFailed { message: String },
    FirstFrame,
    Disconnected { reason: Option<String> },
    ConnectFailed { message: String },
    /// The surface was torn down from outside the registry (e.g. the user
    /// closed its window).
    Closed,
}

impl SurfaceEvent {
    /// Map a status string reported by the bootstrap script.
    pub fn from_sdk_status(status: &str, message: Option<String>) -> Option<Self> {
        match status {
            "firstFrame" => Some(Self::FirstFrame),
            "disconnected" => Some(Self::Disconnected { reason: message }),
            "connectFailed" => Some(Self::ConnectFailed {
                message: message.unwrap_or_else(|| "Connection failed".to_string()),
            }),
            _ => None,
        }
    }
}

// ── Registry change notifications ───────────────────────────────────────

/// Published whenever membership, selection or a session's state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RegistryChange {
    /// A new record was inserted.
    Opened { instance_id: String },
    /// `open` hit an existing record.
    Reused { instance_id: String },
    /// The visible session changed; `None` means no session is shown.
    Selected { instance_id: Option<String> },
    StateChanged { instance_id: String, state: SessionState },
    Closed { instance_id: String },
    /// Every record was removed at once.
    Cleared,
}

// ── Error type ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerErrorKind {
    InvalidInstanceId,
    ViewerInit,
    Navigation,
    Script,
    ConnectFailure,
    SessionNotFound,
}

/// Viewer crate error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerError {
    pub kind: ViewerErrorKind,
    pub message: String,
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ViewerError {}

impl ViewerError {
    pub fn new(kind: ViewerErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }
    pub fn invalid_instance_id() -> Self {
        Self::new(ViewerErrorKind::InvalidInstanceId, "Instance id must not be empty")
    }
    pub fn viewer_init(msg: impl Into<String>) -> Self {
        Self::new(ViewerErrorKind::ViewerInit, msg)
    }
    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::new(ViewerErrorKind::Navigation, msg)
    }
    pub fn script(msg: impl Into<String>) -> Self {
        Self::new(ViewerErrorKind::Script, msg)
    }
    pub fn connect_failure(msg: impl Into<String>) -> Self {
        Self::new(ViewerErrorKind::ConnectFailure, msg)
    }
    pub fn session_not_found(id: &str) -> Self {
        Self::new(ViewerErrorKind::SessionNotFound, format!("Session '{}' not found", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_request_deserializes_with_missing_fields() {
        let req: OpenRequest = serde_json::from_str(r#"{"instanceId":"vm-1"}"#).unwrap();
        assert_eq!(req.instance_id, "vm-1");
        assert!(req.host_name.is_empty());
        assert!(req.session_token.is_empty());
    }

    #[test]
    fn session_state_serializes_camel_case() {
        let json = serde_json::to_string(&SessionState::ScriptInjected).unwrap();
        assert_eq!(json, "\"scriptInjected\"");
        assert_eq!(SessionState::ScriptInjected.to_string(), "scriptInjected");
    }

    #[test]
    fn connect_failure_keeps_sdk_message() {
        let err = ViewerError::connect_failure("auth rejected");
        assert_eq!(err.kind, ViewerErrorKind::ConnectFailure);
        assert_eq!(err.message, "auth rejected");
        assert_eq!(err.to_string(), "ConnectFailure: auth rejected");
    }

    #[test]
    fn sdk_status_mapping() {
        assert_eq!(SurfaceEvent::from_sdk_status("firstFrame", None), Some(SurfaceEvent::FirstFrame));
        assert_eq!(
            SurfaceEvent::from_sdk_status("connectFailed", Some("denied".into())),
            Some(SurfaceEvent::ConnectFailed { message: "denied".into() })
        );
        assert_eq!(
            SurfaceEvent::from_sdk_status("disconnected", None),
            Some(SurfaceEvent::Disconnected { reason: None })
        );
        assert_eq!(SurfaceEvent::from_sdk_status("bogus", None), None);
    }

    #[test]
    fn registry_change_is_tagged() {
        let json = serde_json::to_value(RegistryChange::Selected { instance_id: None }).unwrap();
        assert_eq!(json["type"], "selected");
        assert!(json["instanceId"].is_null());
    }

    #[test]
    fn error_display() {
        let e = ViewerError::session_not_found("vm-9");
        assert_eq!(e.kind, ViewerErrorKind::SessionNotFound);
        let s = format!("{}", e);
        assert!(s.contains("SessionNotFound"));
        assert!(s.contains("vm-9"));
    }
}
