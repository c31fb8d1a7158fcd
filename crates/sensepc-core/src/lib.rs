//! # SensePC Desktop · core
//!
//! Configuration shared by the desktop shell, the viewer registry and the
//! cloud API adapter.

pub mod config;

pub use config::{default_config_dir, DesktopConfig, CONFIG_FILE_NAME};
