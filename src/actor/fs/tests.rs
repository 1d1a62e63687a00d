use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use super::*;
use crate::utils::path::normalize_path;

const D: Duration = Duration::from_millis(500);

fn write_event(path: &str) -> ChangeEvent {
    ChangeEvent::new(path, ChangeKind::Write)
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Debouncer over `*.rs` counting callbacks, running in its own task.
fn spawn_counting(
    count: &Arc<AtomicUsize>,
) -> (mpsc::Sender<ChangeEvent>, tokio::task::JoinHandle<()>) {
    let mut debouncer = Debouncer::new(D);
    let count = Arc::clone(count);
    debouncer.subscribe(Pattern::globs(["*.rs"]).unwrap(), move || {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });
    let (tx, rx) = mpsc::channel(64);
    (tx, tokio::spawn(debouncer.run(rx)))
}

#[test]
fn test_change_kind_mapping() {
    use notify::EventKind;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};

    let cases = [
        (EventKind::Create(CreateKind::File), Some(ChangeKind::Create)),
        (EventKind::Modify(ModifyKind::Data(DataChange::Content)), Some(ChangeKind::Write)),
        (EventKind::Modify(ModifyKind::Any), Some(ChangeKind::Write)),
        (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(ChangeKind::Rename)),
        (EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), Some(ChangeKind::Chmod)),
        (EventKind::Remove(RemoveKind::File), Some(ChangeKind::Remove)),
        (EventKind::Access(AccessKind::Any), None),
    ];
    for (kind, expected) in cases {
        assert_eq!(ChangeKind::from_notify(&kind), expected, "{kind:?}");
    }
}

#[test]
fn test_watch_error_fatality() {
    let fatal = WatchError::Notify(notify::Error::new(notify::ErrorKind::MaxFilesWatch));
    assert!(fatal.is_fatal());
    let transient = WatchError::Notify(notify::Error::path_not_found());
    assert!(!transient.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_burst_fires_once() {
    let count = counter();
    let (tx, handle) = spawn_counting(&count);

    // Three saves 50ms apart, then idle for 1s.
    for _ in 0..3 {
        tx.send(write_event("/app/main.rs")).await.unwrap();
        sleep(Duration::from_millis(50)).await;
    }
    sleep(Duration::from_secs(1)).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_each_quiet_period_fires() {
    let count = counter();
    let (tx, handle) = spawn_counting(&count);

    tx.send(write_event("/app/a.rs")).await.unwrap();
    sleep(Duration::from_millis(800)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    tx.send(write_event("/app/b.rs")).await.unwrap();
    tx.send(write_event("/app/c.rs")).await.unwrap();
    sleep(Duration::from_millis(800)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_steady_stream_resets_timer() {
    let count = counter();
    let (tx, handle) = spawn_counting(&count);

    // Gaps shorter than D: the timer keeps resetting.
    for _ in 0..10 {
        tx.send(write_event("/app/main.rs")).await.unwrap();
        sleep(Duration::from_millis(300)).await;
    }
    assert_eq!(count.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_events_do_not_reset() {
    let count = counter();
    let (tx, handle) = spawn_counting(&count);

    tx.send(write_event("/app/main.rs")).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    tx.send(write_event("/app/README.md")).await.unwrap();
    tx.send(write_event("/app/main.rs~")).await.unwrap();
    sleep(Duration::from_millis(300)).await;

    // 600ms after the only matching event.
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Non-matching events alone never arm.
    tx.send(write_event("/app/notes.txt")).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_never_overlap() {
    let running = counter();
    let max_running = counter();
    let calls = counter();

    let mut debouncer = Debouncer::new(D);
    for glob in ["*.rs", "*.css"] {
        let (running, max_running, calls) =
            (Arc::clone(&running), Arc::clone(&max_running), Arc::clone(&calls));
        debouncer.subscribe(Pattern::globs([glob]).unwrap(), move || {
            let (running, max_running, calls) =
                (Arc::clone(&running), Arc::clone(&max_running), Arc::clone(&calls));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_secs(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(debouncer.run(rx));

    tx.send(write_event("/app/main.rs")).await.unwrap();
    tx.send(write_event("/app/site.css")).await.unwrap();
    sleep(Duration::from_millis(700)).await;
    // Arrives while the first callback is still running.
    tx.send(write_event("/app/lib.rs")).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_due_timer_fires_before_backlog() {
    const CAPACITY: usize = 64;
    let (tx, rx) = mpsc::channel(CAPACITY);
    let queued_at_fire = Arc::new(AtomicUsize::new(usize::MAX));

    let mut debouncer = Debouncer::new(D);
    {
        let (tx, queued_at_fire) = (tx.clone(), Arc::clone(&queued_at_fire));
        debouncer.subscribe(Pattern::globs(["*.rs"]).unwrap(), move || {
            queued_at_fire.store(CAPACITY - tx.capacity(), Ordering::SeqCst);
            async {}
        });
    }

    // Armed and already due when the loop starts, behind a queue of
    // non-matching events.
    debouncer.observe(&write_event("/app/main.rs"));
    sleep(D).await;
    for i in 0..32 {
        tx.send(write_event(&format!("/app/notes{i}.txt"))).await.unwrap();
    }

    let handle = tokio::spawn(debouncer.run(rx));
    sleep(Duration::from_millis(10)).await;

    assert_eq!(queued_at_fire.load(Ordering::SeqCst), 32);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_observe_reports_arming() {
    let mut debouncer = Debouncer::new(D);
    debouncer.subscribe(Pattern::regex(r"\.html$").unwrap(), || async {});

    assert!(debouncer.next_deadline().is_none());
    assert!(!debouncer.observe(&write_event("/app/main.rs")));
    assert!(debouncer.next_deadline().is_none());
    assert!(debouncer.observe(&write_event("/app/views/index.html")));
    assert!(debouncer.next_deadline().is_some());

    // Not due yet.
    assert_eq!(debouncer.fire_due().await, 0);
    sleep(D).await;
    assert_eq!(debouncer.fire_due().await, 1);
    assert!(debouncer.next_deadline().is_none());
}

// ============================================================================
// Watcher (real filesystem)
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// Collect events until one satisfies `pred` or the wait runs out.
async fn wait_for(
    watcher: &mut Watcher,
    mut pred: impl FnMut(&ChangeEvent) -> bool,
) -> Option<ChangeEvent> {
    timeout(WAIT, async {
        while let Some(event) = watcher.next().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn test_watcher_reports_writes() {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());
    let mut watcher = Watcher::start(&root, vec![]).unwrap();

    let file = root.join("main.rs");
    std::fs::write(&file, "fn main() {}").unwrap();

    let event = wait_for(&mut watcher, |e| e.path == file).await;
    assert!(event.is_some(), "no event for {}", file.display());
}

#[tokio::test]
async fn test_watcher_attaches_new_directories() {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());
    let mut watcher = Watcher::start(&root, vec![]).unwrap();

    let dir = root.join("src");
    std::fs::create_dir(&dir).unwrap();
    wait_for(&mut watcher, |e| e.path == dir && e.kind == ChangeKind::Create)
        .await
        .expect("directory create event");

    let file = dir.join("lib.rs");
    std::fs::write(&file, "pub fn f() {}").unwrap();
    let event = wait_for(&mut watcher, |e| e.path == file).await;
    assert!(event.is_some(), "new directory was not watched");
}

#[tokio::test]
async fn test_watcher_skips_hidden_and_ignored_dirs() {
    let temp = TempDir::new().unwrap();
    let root = normalize_path(temp.path());
    std::fs::create_dir(root.join(".git")).unwrap();
    std::fs::create_dir(root.join("target")).unwrap();

    let mut watcher = Watcher::start(&root, vec!["target".into()]).unwrap();

    std::fs::write(root.join(".git").join("HEAD"), "ref").unwrap();
    std::fs::write(root.join("target").join("out.rs"), "").unwrap();
    let marker = root.join("marker.rs");
    std::fs::write(&marker, "").unwrap();

    // Everything before the marker must come from the root itself.
    let mut seen = Vec::new();
    let found = wait_for(&mut watcher, |e| {
        seen.push(e.path.clone());
        e.path == marker
    })
    .await;
    assert!(found.is_some());
    assert!(seen.iter().all(|p| p.parent() == Some(root.as_path())), "{seen:?}");
}

#[tokio::test]
async fn test_watcher_keeps_hidden_root() {
    let temp = tempfile::Builder::new().prefix(".hidden").tempdir().unwrap();
    let root = normalize_path(temp.path());
    let mut watcher = Watcher::start(&root, vec![]).unwrap();

    let file = root.join("main.rs");
    std::fs::write(&file, "fn main() {}").unwrap();
    let event = wait_for(&mut watcher, |e| e.path == file).await;
    assert!(event.is_some(), "hidden root was not watched");
}

#[tokio::test]
async fn test_watcher_keeps_root_named_like_ignored_dir() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("target")).unwrap();
    let root = normalize_path(&temp.path().join("target"));
    let mut watcher = Watcher::start(&root, vec!["target".into()]).unwrap();

    let file = root.join("main.rs");
    std::fs::write(&file, "fn main() {}").unwrap();
    let event = wait_for(&mut watcher, |e| e.path == file).await;
    assert!(event.is_some(), "ignored-name root was not watched");

    // The name still excludes directories below the root.
    std::fs::create_dir(root.join("target")).unwrap();
    std::fs::write(root.join("target").join("out.rs"), "").unwrap();
    let marker = root.join("marker.rs");
    std::fs::write(&marker, "").unwrap();
    let mut seen = Vec::new();
    let found = wait_for(&mut watcher, |e| {
        seen.push(e.path.clone());
        e.path == marker
    })
    .await;
    assert!(found.is_some());
    assert!(!seen.iter().any(|p| p.ends_with("target/out.rs")), "{seen:?}");
}

#[test]
fn test_watcher_missing_root() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");
    let err = Watcher::start(&missing, vec![]).err().expect("missing root must fail");
    assert!(matches!(err, WatchError::Setup { .. }));
    assert!(err.is_fatal());
}
