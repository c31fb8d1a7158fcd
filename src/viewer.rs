//! Webview-backed viewer surfaces and the session commands.
//!
//! Every session gets its own webview window labelled `viewer-{viewerId}`.
//! The window is built on the first navigation so it starts directly on the
//! connector page. Page-load and destroy callbacks are forwarded to the
//! registry through the surface's event sink.

use std::sync::Mutex;

use tauri::webview::PageLoadEvent;
use tauri::{
  AppHandle, Runtime, State, Url, WebviewUrl, WebviewWindow, WebviewWindowBuilder, WindowEvent,
};

use sensepc_viewer::{
  OpenRequest, SessionInfo, SessionRegistryState, SurfaceContext, SurfaceEvent, SurfaceEventSink,
  SurfaceFactory, SurfaceSignal, ViewerError, ViewerId, ViewerSurface,
};

use crate::cloud::{api_error, SessionConnectorState, TokenStoreState};

const VIEWER_WIDTH: f64 = 1280.0;
const VIEWER_HEIGHT: f64 = 800.0;

pub fn viewer_window_label(viewer_id: ViewerId) -> String {
  format!("viewer-{}", viewer_id)
}

/// Inverse of [`viewer_window_label`].
pub fn viewer_id_from_label(label: &str) -> Option<ViewerId> {
  label.strip_prefix("viewer-")?.parse().ok()
}

// ── Surface ─────────────────────────────────────────────────────────────

pub struct TauriSurfaceFactory<R: Runtime> {
  app: AppHandle<R>,
}

impl<R: Runtime> TauriSurfaceFactory<R> {
  pub fn new(app: AppHandle<R>) -> Self {
    Self { app }
  }
}

impl<R: Runtime> SurfaceFactory for TauriSurfaceFactory<R> {
  fn create(&self, context: SurfaceContext) -> Result<Box<dyn ViewerSurface>, ViewerError> {
    log::debug!(
      "[viewer-window] allocating viewer #{} for {}",
      context.viewer_id,
      context.instance_id
    );
    Ok(Box::new(TauriViewerSurface {
      app: self.app.clone(),
      label: viewer_window_label(context.viewer_id),
      title: context.title,
      events: context.events,
      window: Mutex::new(None),
    }))
  }
}

pub struct TauriViewerSurface<R: Runtime> {
  app: AppHandle<R>,
  label: String,
  title: String,
  events: SurfaceEventSink,
  window: Mutex<Option<WebviewWindow<R>>>,
}

impl<R: Runtime> TauriViewerSurface<R> {
  fn window(&self) -> Option<WebviewWindow<R>> {
    self.window.lock().ok().and_then(|w| w.clone())
  }

  fn build(&self, url: Url) -> Result<WebviewWindow<R>, ViewerError> {
    let sink = self.events.clone();
    let window = WebviewWindowBuilder::new(&self.app, &self.label, WebviewUrl::External(url))
      .title(&self.title)
      .inner_size(VIEWER_WIDTH, VIEWER_HEIGHT)
      .min_inner_size(640.0, 400.0)
      .visible(false)
      .on_page_load(move |_window, payload| {
        let url = payload.url().to_string();
        match payload.event() {
          PageLoadEvent::Started => sink.emit(SurfaceEvent::NavigationStarted { url }),
          PageLoadEvent::Finished => sink.emit(SurfaceEvent::NavigationCompleted { url }),
        }
      })
      .build()
      .map_err(|e| ViewerError::viewer_init(format!("Failed to create viewer window: {}", e)))?;

    let sink = self.events.clone();
    window.on_window_event(move |event| {
      if let WindowEvent::Destroyed = event {
        sink.emit(SurfaceEvent::Closed);
      }
    });
    log::info!("[viewer-window] created {} for {}", self.label, self.events.instance_id());
    Ok(window)
  }
}

impl<R: Runtime> ViewerSurface for TauriViewerSurface<R> {
  fn navigate(&self, url: &str) -> Result<(), ViewerError> {
    let parsed = Url::parse(url)
      .map_err(|e| ViewerError::navigation(format!("Invalid URL '{}': {}", url, e)))?;
    let mut slot = self
      .window
      .lock()
      .map_err(|_| ViewerError::viewer_init("Viewer window lock poisoned"))?;
    match slot.as_ref() {
      Some(window) => window
        .navigate(parsed)
        .map_err(|e| ViewerError::navigation(e.to_string())),
      None => {
        *slot = Some(self.build(parsed)?);
        Ok(())
      }
    }
  }

  fn execute_script(&self, script: &str) -> Result<(), ViewerError> {
    let window = self
      .window()
      .ok_or_else(|| ViewerError::script("Viewer window does not exist"))?;
    window.eval(script).map_err(|e| ViewerError::script(e.to_string()))
  }

  fn set_visible(&self, visible: bool) -> Result<(), ViewerError> {
    let Some(window) = self.window() else {
      return Ok(());
    };
    let result = if visible {
      window.show().and_then(|_| window.set_focus())
    } else {
      window.hide()
    };
    result.map_err(|e| ViewerError::viewer_init(e.to_string()))
  }

  fn dispose(&self) {
    let window = self.window.lock().ok().and_then(|mut w| w.take());
    if let Some(window) = window {
      if let Err(e) = window.destroy() {
        log::warn!("[viewer-window] failed to destroy {}: {}", self.label, e);
      }
    }
  }
}

// ── Commands ────────────────────────────────────────────────────────────

/// Open (or re-select) a session with caller-supplied credentials.
#[tauri::command]
pub async fn open_session(
  state: State<'_, SessionRegistryState>,
  request: OpenRequest,
) -> Result<SessionInfo, String> {
  state.open(request).await.map_err(|e| e.to_string())
}

/// Connect button on a PC card: reuse the live session, or launch a new one
/// through the API and open it.
#[tauri::command]
pub async fn connect_instance(
  connector: State<'_, SessionConnectorState>,
  tokens: State<'_, TokenStoreState>,
  instance_id: String,
  system_name: Option<String>,
) -> Result<SessionInfo, String> {
  connector
    .connect(&instance_id, system_name.as_deref().unwrap_or_default())
    .await
    .map_err(|e| api_error(tokens.inner().as_ref(), e))
}

#[tauri::command]
pub async fn select_session(
  state: State<'_, SessionRegistryState>,
  instance_id: String,
) -> Result<bool, String> {
  Ok(state.select(&instance_id).await)
}

#[tauri::command]
pub async fn close_session(
  state: State<'_, SessionRegistryState>,
  instance_id: String,
) -> Result<bool, String> {
  Ok(state.close(&instance_id).await)
}

#[tauri::command]
pub async fn close_all_sessions(state: State<'_, SessionRegistryState>) -> Result<usize, String> {
  Ok(state.close_all().await)
}

#[tauri::command]
pub async fn list_sessions(state: State<'_, SessionRegistryState>) -> Result<Vec<SessionInfo>, String> {
  Ok(state.sessions().await)
}

#[tauri::command]
pub async fn get_selected_session(
  state: State<'_, SessionRegistryState>,
) -> Result<Option<String>, String> {
  Ok(state.selected().await)
}

#[tauri::command]
pub async fn reload_session(
  state: State<'_, SessionRegistryState>,
  instance_id: String,
) -> Result<bool, String> {
  Ok(state.reload(&instance_id).await)
}

/// Status callback from the bootstrap script running inside a viewer.
///
/// Only accepted from the viewer window the status claims to come from.
#[tauri::command]
pub async fn report_viewer_status<R: Runtime>(
  window: WebviewWindow<R>,
  state: State<'_, SessionRegistryState>,
  instance_id: String,
  viewer_id: ViewerId,
  status: String,
  message: Option<String>,
) -> Result<(), String> {
  if viewer_id_from_label(window.label()) != Some(viewer_id) {
    log::warn!(
      "[viewer-window] status '{}' for viewer #{} rejected from window {}",
      status,
      viewer_id,
      window.label()
    );
    return Err("Status report does not match the reporting window".to_string());
  }
  let event = SurfaceEvent::from_sdk_status(&status, message)
    .ok_or_else(|| format!("Unknown viewer status '{}'", status))?;
  state.dispatch(SurfaceSignal {
    instance_id,
    viewer_id,
    event,
  });
  Ok(())
}
