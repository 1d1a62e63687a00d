use anyhow::{Context, Result};

use crate::actor::fs::Pattern;
use crate::config::WatchConfig;

/// Names that trigger a rebuild: `regex` when set, `patterns` otherwise.
pub(super) fn rebuild_pattern(watch: &WatchConfig) -> Result<Pattern> {
    match watch.regex.as_deref().filter(|r| !r.is_empty()) {
        Some(expr) => Pattern::regex(expr).context("invalid watch.regex"),
        None => Pattern::globs(&watch.patterns).context("invalid watch.patterns"),
    }
}

/// Names that only reload browsers. `None` when `reload` is empty.
pub(super) fn reload_pattern(watch: &WatchConfig) -> Result<Option<Pattern>> {
    if watch.reload.is_empty() {
        return Ok(None);
    }
    let pattern = Pattern::globs(&watch.reload).context("invalid watch.reload")?;
    Ok(Some(pattern))
}
