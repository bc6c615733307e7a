//! Library crate for vulnscan-ui: a thin client for an external port-scan and
//! vulnerability-matching service, with a terminal view and an embedded web UI.
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod types;
pub mod view;
