//! Cloud PC commands: instance listing, power actions, and sign-in state.

use std::sync::Arc;

use secrecy::SecretString;
use tauri::State;

use sensepc_cloud::{
  CloudApi, CloudError, Instance, SessionConnector, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use sensepc_core::DesktopConfig;
use sensepc_viewer::SessionRegistryState;

pub type CloudApiState = Arc<dyn CloudApi>;
pub type TokenStoreState = Arc<dyn TokenStore>;
pub type SessionConnectorState = Arc<SessionConnector>;

/// Map an API error for the UI. A rejected token is forgotten so the UI
/// falls back to the sign-in form.
pub(crate) fn api_error(tokens: &dyn TokenStore, err: CloudError) -> String {
  if err.is_unauthorized() && tokens.get(ACCESS_TOKEN_KEY).is_some() {
    log::warn!("[auth] stored token rejected, signing out");
    if let Err(e) = tokens.clear() {
      log::error!("[auth] failed to clear rejected token: {}", e);
    }
  }
  err.to_string()
}

#[tauri::command]
pub async fn list_instances(
  api: State<'_, CloudApiState>,
  tokens: State<'_, TokenStoreState>,
) -> Result<Vec<Instance>, String> {
  api.list_instances().await.map_err(|e| api_error(tokens.inner().as_ref(), e))
}

#[tauri::command]
pub async fn start_instance(
  api: State<'_, CloudApiState>,
  tokens: State<'_, TokenStoreState>,
  instance_id: String,
) -> Result<(), String> {
  api.start_instance(&instance_id).await.map_err(|e| api_error(tokens.inner().as_ref(), e))
}

/// Stop a PC. Its viewer, if any, is closed first since the display
/// connection cannot survive the shutdown.
#[tauri::command]
pub async fn stop_instance(
  api: State<'_, CloudApiState>,
  tokens: State<'_, TokenStoreState>,
  registry: State<'_, SessionRegistryState>,
  instance_id: String,
) -> Result<(), String> {
  registry.close(&instance_id).await;
  api.stop_instance(&instance_id).await.map_err(|e| api_error(tokens.inner().as_ref(), e))
}

#[tauri::command]
pub async fn restart_instance(
  api: State<'_, CloudApiState>,
  tokens: State<'_, TokenStoreState>,
  instance_id: String,
) -> Result<(), String> {
  api.restart_instance(&instance_id).await.map_err(|e| api_error(tokens.inner().as_ref(), e))
}

/// Store the tokens obtained by the sign-in page.
#[tauri::command]
pub async fn store_access_token(
  tokens: State<'_, TokenStoreState>,
  access_token: String,
  refresh_token: Option<String>,
) -> Result<(), String> {
  if access_token.trim().is_empty() {
    return Err("Access token must not be empty".to_string());
  }
  tokens
    .set(ACCESS_TOKEN_KEY, SecretString::new(access_token))
    .map_err(|e| e.to_string())?;
  match refresh_token.filter(|t| !t.trim().is_empty()) {
    Some(refresh) => tokens.set(REFRESH_TOKEN_KEY, SecretString::new(refresh)),
    None => tokens.remove(REFRESH_TOKEN_KEY),
  }
  .map_err(|e| e.to_string())?;
  log::info!("[auth] access token stored");
  Ok(())
}

#[tauri::command]
pub async fn is_signed_in(tokens: State<'_, TokenStoreState>) -> Result<bool, String> {
  Ok(tokens.get(ACCESS_TOKEN_KEY).is_some())
}

/// Forget the stored tokens and close every open session.
#[tauri::command]
pub async fn sign_out(
  tokens: State<'_, TokenStoreState>,
  registry: State<'_, SessionRegistryState>,
) -> Result<usize, String> {
  let closed = registry.close_all().await;
  tokens.clear().map_err(|e| e.to_string())?;
  log::info!("[auth] signed out, {} sessions closed", closed);
  Ok(closed)
}

#[tauri::command]
pub async fn get_config(config: State<'_, DesktopConfig>) -> Result<DesktopConfig, String> {
  Ok(config.inner().clone())
}
