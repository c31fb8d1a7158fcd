//! # SensePC Desktop · viewer
//!
//! Session registry for embedded remote-display viewers. The registry keeps
//! at most one viewer per cloud-PC instance, drives each viewer through
//! navigation and bootstrap-script injection, and publishes membership and
//! selection changes for the shell. The rendering engine sits behind the
//! [`ViewerSurface`] trait.

pub mod viewer;

pub use viewer::*;
