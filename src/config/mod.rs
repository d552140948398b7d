//! Configuration Module
//!
//! Typed view of the settings that shape the remote-access core. Persisting
//! them is left to the embedding application.

pub mod settings;

pub use settings::{ConnectTarget, Settings, SettingsError, TransferMode, DEFAULT_USERNAME};
