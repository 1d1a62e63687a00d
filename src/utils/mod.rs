//! Shared helpers: external commands and paths.

pub mod exec;
pub mod path;
