//! Configuration section definitions.
//!
//! Each module corresponds to a section in `devloop.toml`:
//!
//! | Module  | TOML Section | Purpose                              |
//! |---------|--------------|--------------------------------------|
//! | `build` | `[build]`    | Build command, cargo bin target      |
//! | `serve` | `[serve]`    | Live reload hub port                 |
//! | `watch` | `[watch]`    | Patterns, ignored dirs, debounce     |

mod build;
mod serve;
mod watch;

pub use build::BuildConfig;
pub use serve::{DEFAULT_PORT, ServeConfig};
pub use watch::{DEFAULT_DEBOUNCE_MS, WatchConfig};
