//! devloop - watch a project, rebuild it, restart it, reload the browser.
//!
//! The binary drives [`actor::Runner`]. The [`reload`] module is usable on
//! its own: host applications wrap their router with
//! [`reload::LiveReload`] to get script injection and the live reload
//! endpoints.

pub mod actor;
pub mod cli;
pub mod config;
pub mod core;
pub mod embed;
pub mod logger;
pub mod reload;
pub mod utils;
