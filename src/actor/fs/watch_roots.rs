use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::WalkDir;
use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use crate::utils::path::is_hidden;

/// Per-directory watch registry.
///
/// Every directory under the root is registered non-recursively so hidden
/// and ignored subtrees never cost a watch. Directories created later are
/// attached through [`WatchRoots::attach_tree`].
pub(super) struct WatchRoots {
    root: PathBuf,
    ignore: Arc<[String]>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(root: PathBuf, ignore: Vec<String>) -> Self {
        Self {
            root,
            ignore: ignore.into(),
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a directory name is excluded from watching.
    pub(super) fn is_skipped(&self, name: &OsStr) -> bool {
        skip_dir(name, &self.ignore)
    }

    /// Whether any component between the root and `path` is skipped.
    pub(super) fn is_inside_skipped(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return true;
        };
        let mut components = rel.components().peekable();
        while let Some(component) = components.next() {
            // The last component is the entry itself, not a parent.
            if components.peek().is_none() {
                break;
            }
            if self.is_skipped(component.as_os_str()) {
                return true;
            }
        }
        false
    }

    /// Register `dir` and every visible directory beneath it.
    ///
    /// Returns the number of newly attached directories.
    pub(super) fn attach_tree<W: Watcher>(
        &mut self,
        watcher: &mut W,
        dir: &Path,
    ) -> notify::Result<usize> {
        let mut attached = 0;
        for path in self.collect_dirs(dir) {
            if self.attached.contains(&path) {
                continue;
            }
            match watcher.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.attached.insert(path);
                    attached += 1;
                }
                // Removed between the walk and the watch call.
                Err(e) if matches!(e.kind, notify::ErrorKind::PathNotFound) && path != dir => {
                    crate::debug!("watch"; "skipped vanished dir: {}", path.display());
                }
                Err(e) => return Err(e.add_path(path)),
            }
        }
        Ok(attached)
    }

    /// Forget a removed directory and everything beneath it.
    pub(super) fn detach(&mut self, path: &Path) {
        self.attached.retain(|p| !p.starts_with(path));
    }

    pub(super) fn attached_count(&self) -> usize {
        self.attached.len()
    }

    fn collect_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        let ignore = Arc::clone(&self.ignore);
        WalkDir::new(dir)
            .skip_hidden(false)
            .follow_links(false)
            .process_read_dir(move |depth, _path, _state, children| {
                // `dir` itself comes through with no depth; its own name never excludes it.
                if depth.is_none() {
                    return;
                }
                children.retain(|entry| {
                    entry.as_ref().is_ok_and(|e| {
                        e.file_type().is_dir() && !skip_dir(&e.file_name, &ignore)
                    })
                });
            })
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.path())
            .collect()
    }
}

fn skip_dir(name: &OsStr, ignore: &[String]) -> bool {
    is_hidden(Path::new(name)) || ignore.iter().any(|i| OsStr::new(i) == name)
}
