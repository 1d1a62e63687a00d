//! Command-line interface module.

mod args;
pub mod run;
pub mod secret;

pub use args::{Cli, Commands};
