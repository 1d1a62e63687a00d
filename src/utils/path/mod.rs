//! Path utilities.
//!
//! Pure functions for path manipulation. No side effects.

pub mod fs;

pub use fs::{base_name, is_hidden, is_temp_file, normalize_path};
