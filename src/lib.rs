mod cloud;
mod viewer;

use std::sync::Arc;

use serde::Serialize;
use tauri::async_runtime;
use tauri::{AppHandle, Emitter, Manager, Runtime};
use tauri_plugin_log::{Target, TargetKind};
use tokio::sync::broadcast::error::RecvError;

use cloud::{CloudApiState, SessionConnectorState, TokenStoreState};
use sensepc_cloud::{FileTokenStore, MemoryTokenStore, SensePcApiClient, SessionConnector};
use sensepc_core::{default_config_dir, DesktopConfig, CONFIG_FILE_NAME};
use sensepc_viewer::{
  RegistryChange, RegistryOptions, ScriptOptions, SessionInfo, SessionRegistry, SessionRegistryState,
};
use viewer::TauriSurfaceFactory;

/// Event carrying the session list to the main window after every change.
pub const SESSIONS_CHANGED_EVENT: &str = "viewer://sessions-changed";

const TOKEN_FILE_NAME: &str = "tokens.json";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionsChanged {
  /// `None` after the forwarder fell behind and skipped changes.
  change: Option<RegistryChange>,
  sessions: Vec<SessionInfo>,
  selected: Option<String>,
}

fn registry_options(config: &DesktopConfig) -> RegistryOptions {
  RegistryOptions {
    connector_url: config.connector_url.clone(),
    settle_delay: config.settle_delay(),
    script: ScriptOptions {
      sdk_url: config.dcv_sdk_url.clone(),
      dcv_port: config.dcv_port,
      ..ScriptOptions::default()
    },
  }
}

fn log_targets() -> Vec<Target> {
  let mut targets = vec![Target::new(TargetKind::Stdout), Target::new(TargetKind::Webview)];
  if cfg!(debug_assertions) {
    targets.push(Target::new(TargetKind::LogDir {
      file_name: Some("sensepc".to_string()),
    }));
  }
  targets
}

/// Re-emit every registry change to the UI together with a fresh snapshot.
fn spawn_change_forwarder<R: Runtime>(app: AppHandle<R>, registry: SessionRegistryState) {
  let mut changes = registry.subscribe();
  async_runtime::spawn(async move {
    loop {
      let change = match changes.recv().await {
        Ok(change) => Some(change),
        Err(RecvError::Lagged(skipped)) => {
          log::warn!("[shell] session change forwarder skipped {} changes", skipped);
          None
        }
        Err(RecvError::Closed) => break,
      };
      let payload = SessionsChanged {
        change,
        sessions: registry.sessions().await,
        selected: registry.selected().await,
      };
      if let Err(e) = app.emit(SESSIONS_CHANGED_EVENT, &payload) {
        log::warn!("[shell] failed to emit {}: {}", SESSIONS_CHANGED_EVENT, e);
      }
    }
  });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
  tauri::Builder::default()
    .setup(|app| {
      let app_dir = app.path().app_data_dir().unwrap_or_else(|_| default_config_dir());
      let config = DesktopConfig::load_or_default(&app_dir.join(CONFIG_FILE_NAME));

      app.handle().plugin(
        tauri_plugin_log::Builder::default()
          .level(config.log_level_filter())
          .level_for("reqwest", log::LevelFilter::Warn)
          .level_for("hyper_util", log::LevelFilter::Warn)
          .targets(log_targets())
          .build(),
      )?;
      log::info!("[shell] starting with data dir {}", app_dir.display());

      // Token store
      let tokens: TokenStoreState = match FileTokenStore::open(app_dir.join(TOKEN_FILE_NAME)) {
        Ok(store) => Arc::new(store),
        Err(e) => {
          log::error!("[shell] token store unavailable ({}), tokens will not persist", e);
          Arc::new(MemoryTokenStore::new())
        }
      };

      // REST API client
      let api: CloudApiState = Arc::new(SensePcApiClient::from_config(&config, tokens.clone())?);

      // Session registry
      let factory = Arc::new(TauriSurfaceFactory::new(app.handle().clone()));
      let (registry, pump) = SessionRegistry::new(factory, registry_options(&config));
      async_runtime::spawn(pump.run());
      spawn_change_forwarder(app.handle().clone(), registry.clone());
      let connector: SessionConnectorState = Arc::new(SessionConnector::new(api.clone(), registry.clone()));

      app.manage(tokens);
      app.manage(api);
      app.manage(registry);
      app.manage(connector);
      app.manage(config);
      Ok(())
    })
    .invoke_handler(tauri::generate_handler![
      viewer::open_session,
      viewer::connect_instance,
      viewer::select_session,
      viewer::close_session,
      viewer::close_all_sessions,
      viewer::list_sessions,
      viewer::get_selected_session,
      viewer::reload_session,
      viewer::report_viewer_status,
      cloud::list_instances,
      cloud::start_instance,
      cloud::stop_instance,
      cloud::restart_instance,
      cloud::store_access_token,
      cloud::is_signed_in,
      cloud::sign_out,
      cloud::get_config,
    ])
    .run(tauri::generate_context!())
    .expect("error while running tauri application");
}
