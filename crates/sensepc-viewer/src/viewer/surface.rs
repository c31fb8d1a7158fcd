//! Viewer surface abstraction.
//!
//! A [`ViewerSurface`] is one embedded browser instance hosting one
//! session's display. The registry only needs four capabilities from it
//! (navigate, execute a script, show/hide, dispose) plus a way to hear
//! back about navigation and SDK callbacks, which surfaces deliver through
//! the [`SurfaceEventSink`] handed to them at creation time.
//!
//! Implementations are responsible for marshalling their calls onto the UI
//! thread required by the embedding engine.

use tokio::sync::mpsc;

use crate::viewer::types::{SurfaceEvent, ViewerError, ViewerId};

/// One embedded browser instance.
pub trait ViewerSurface: Send + Sync {
    /// Start loading `url`. The first call makes the surface navigable.
    fn navigate(&self, url: &str) -> Result<(), ViewerError>;
    /// Evaluate `script` in the currently loaded page.
    fn execute_script(&self, script: &str) -> Result<(), ViewerError>;
    /// Show or hide the surface. Only the selected session is visible.
    fn set_visible(&self, visible: bool) -> Result<(), ViewerError>;
    /// Release the underlying engine instance. Called at most once.
    fn dispose(&self);
}

/// Allocates surfaces for new session records.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, context: SurfaceContext) -> Result<Box<dyn ViewerSurface>, ViewerError>;
}

/// Everything a factory needs to build a surface for one record.
#[derive(Debug, Clone)]
pub struct SurfaceContext {
    pub instance_id: String,
    pub viewer_id: ViewerId,
    /// Window/tab title.
    pub title: String,
    /// Where the surface reports its callbacks.
    pub events: SurfaceEventSink,
}

/// A surface callback tagged with the viewer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSignal {
    pub instance_id: String,
    pub viewer_id: ViewerId,
    pub event: SurfaceEvent,
}

/// Sending half of the registry's signal channel, bound to one viewer.
///
/// `emit` never blocks and may be called from any thread, including the
/// engine's own callback threads.
#[derive(Debug, Clone)]
pub struct SurfaceEventSink {
    instance_id: String,
    viewer_id: ViewerId,
    tx: mpsc::UnboundedSender<SurfaceSignal>,
}

impl SurfaceEventSink {
    pub fn new(
        instance_id: impl Into<String>,
        viewer_id: ViewerId,
        tx: mpsc::UnboundedSender<SurfaceSignal>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            viewer_id,
            tx,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn viewer_id(&self) -> ViewerId {
        self.viewer_id
    }

    /// Queue `event` for the registry. Dropped silently once the registry
    /// has shut down.
    pub fn emit(&self, event: SurfaceEvent) {
        let signal = SurfaceSignal {
            instance_id: self.instance_id.clone(),
            viewer_id: self.viewer_id,
            event,
        };
        if self.tx.send(signal).is_err() {
            log::debug!(
                "[viewer-surface] registry gone, dropping event for {}#{}",
                self.instance_id,
                self.viewer_id
            );
        }
    }
}

/// Exclusive owner of a surface. Disposes it exactly once: on
/// [`dispose`](Self::dispose) or, failing that, on drop.
pub struct ViewerHandle {
    surface: Box<dyn ViewerSurface>,
    disposed: bool,
}

impl ViewerHandle {
    pub fn new(surface: Box<dyn ViewerSurface>) -> Self {
        Self { surface, disposed: false }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn navigate(&self, url: &str) -> Result<(), ViewerError> {
        self.surface.navigate(url)
    }

    pub fn execute_script(&self, script: &str) -> Result<(), ViewerError> {
        self.surface.execute_script(script)
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), ViewerError> {
        self.surface.set_visible(visible)
    }

    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.surface.dispose();
        }
    }

    /// Record that the surface was already torn down by its engine, so it
    /// must not be disposed again.
    pub fn mark_disposed(&mut self) {
        self.disposed = true;
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ViewerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerHandle")
            .field("disposed", &self.disposed)
            .finish()
    }
}
