//! Launch a remote-display session and turn the backend's answer into
//! viewer open parameters.

use sensepc_viewer::OpenRequest;

use crate::cloud::api::CloudApi;
use crate::cloud::error::CloudError;

/// Everything the session registry needs to open a viewer.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub instance_id: String,
    pub system_name: String,
    pub host_name: String,
    pub session_token: String,
    pub session_id: String,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("instance_id", &self.instance_id)
            .field("system_name", &self.system_name)
            .field("host_name", &self.host_name)
            .field("session_token", &"<redacted>")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl From<ConnectionParams> for OpenRequest {
    fn from(p: ConnectionParams) -> Self {
        OpenRequest::new(p.instance_id, p.system_name, p.host_name, p.session_token, p.session_id)
    }
}

/// Call `launch_session` for `instance_id` and map the response.
///
/// Missing credential fields are not errors here; the viewer receives them
/// empty and the remote-display SDK reports the failure.
pub async fn prepare_connection(
    api: &dyn CloudApi,
    instance_id: &str,
    system_name: &str,
) -> Result<ConnectionParams, CloudError> {
    if instance_id.trim().is_empty() {
        return Err(CloudError::InvalidInput("Instance id must not be empty".to_string()));
    }
    let launch = api.launch_session(instance_id).await?;

    let params = ConnectionParams {
        instance_id: instance_id.to_string(),
        system_name: system_name.to_string(),
        host_name: launch.host(),
        session_token: launch.credential().to_string(),
        session_id: launch.session_id_or_default().to_string(),
    };
    if params.host_name.is_empty() || params.session_token.is_empty() {
        log::warn!(
            "[cloud-launch] incomplete launch response for {} (host: {}, token: {})",
            instance_id,
            !params.host_name.is_empty(),
            !params.session_token.is_empty()
        );
    }
    Ok(params)
}
