//! Process-wide state shared by the runner and the signal handler.

mod error;
mod state;

pub use error::SetupError;
pub use state::{is_shutdown, request_shutdown, setup_shutdown_handler};
