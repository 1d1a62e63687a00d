//! The developer loop.
//!
//! ```text
//! fs (watch + debounce) --> build --> supervisor
//!            \                 \
//!             +-----------------+--> reload::Hub
//! ```
//!
//! # Module Structure
//!
//! - `fs` - recursive watcher, change events, pattern filter, debouncer
//! - `build` - project detection, toolchain runs, artifact install
//! - `supervisor` - child process lifecycle
//! - `coordinator` - the Runner wiring everything up

pub mod build;
pub mod coordinator;
pub mod fs;
pub mod supervisor;

pub use coordinator::Runner;
