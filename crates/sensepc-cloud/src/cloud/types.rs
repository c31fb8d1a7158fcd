//! Wire types of the SensePC REST API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session id used when the launch response does not name one.
pub const DEFAULT_SESSION_ID: &str = "console";

/// Power state of a cloud PC as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Rebooting,
    #[serde(other)]
    Unknown,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One cloud PC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(alias = "instanceId")]
    pub id: String,
    #[serde(default, alias = "systemName")]
    pub name: String,
    #[serde(default)]
    pub state: InstanceState,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
}

/// `GET /instances` answers either with a bare array or wrapped in an
/// object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum InstanceList {
    Bare(Vec<Instance>),
    Wrapped { instances: Vec<Instance> },
}

impl From<InstanceList> for Vec<Instance> {
    fn from(list: InstanceList) -> Self {
        match list {
            InstanceList::Bare(v) => v,
            InstanceList::Wrapped { instances } => instances,
        }
    }
}

/// Response of `POST /instances/{id}/session`. Every field is optional on
/// the wire.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSession {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl LaunchSession {
    /// Credential handed to the remote-display SDK: `sessionToken`, falling
    /// back to `authToken`, else empty.
    pub fn credential(&self) -> &str {
        non_empty(&self.session_token)
            .or_else(|| non_empty(&self.auth_token))
            .unwrap_or("")
    }

    pub fn session_id_or_default(&self) -> &str {
        non_empty(&self.session_id).unwrap_or(DEFAULT_SESSION_ID)
    }

    /// Display endpoint: `hostName`, else the full `gatewayUrl` so its port
    /// and path survive.
    pub fn host(&self) -> String {
        non_empty(&self.host_name)
            .or_else(|| non_empty(&self.gateway_url))
            .unwrap_or("")
            .to_string()
    }
}

impl fmt::Debug for LaunchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("LaunchSession")
            .field("session_id", &self.session_id)
            .field("session_token", &redact(&self.session_token))
            .field("auth_token", &redact(&self.auth_token))
            .field("host_name", &self.host_name)
            .field("gateway_url", &self.gateway_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
