//! SensePC backend adapters.
//!
//! Typed access to the cloud-PC REST API, storage for the auth tokens it
//! needs, and the mapping from a launch response to the parameters the
//! session registry opens a viewer with.

pub mod cloud;

pub use cloud::*;
