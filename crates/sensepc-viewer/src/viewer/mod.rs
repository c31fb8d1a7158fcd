//! Viewer crate: sub-modules.

pub mod types;
pub mod script;
pub mod surface;
pub mod record;
pub mod registry;

// Re-export top-level items for convenience.
pub use types::*;
pub use script::{build_connection_script, escape_script_literal, ScriptOptions};
pub use surface::{SurfaceContext, SurfaceEventSink, SurfaceFactory, SurfaceSignal, ViewerHandle, ViewerSurface};
pub use record::SessionRecord;
pub use registry::{RegistryOptions, SessionRegistry, SessionRegistryState, SignalPump};
