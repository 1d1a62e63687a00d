//! Runner - wires the developer loop together.
//!
//! ```text
//! Watcher --events--> Debouncer --callback--> Builder --> Supervisor
//!                                                 \
//!                                                  +--> Hub --> browsers
//! ```
//!
//! Startup order:
//! 1. detect the project and check its toolchain
//! 2. bind the HTTP port (status page, live reload routes)
//! 3. first build, then start the child
//! 4. watch the root and debounce changes into rebuilds
//!
//! Teardown stops the watcher, lets an in-flight rebuild finish, stops the
//! child and removes the artifact.

mod patterns;
mod runtime;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::response::Html;
use crossbeam::channel::Receiver;
use tokio::sync::oneshot;

use super::build::{Builder, Project};
use super::fs::{Debouncer, Watcher};
use super::supervisor::Supervisor;
use crate::config::DevConfig;
use crate::core::{SetupError, request_shutdown};
use crate::embed::serve::{STATUS_HTML, StatusVars};
use crate::reload::server::{self, LiveReload, compose};
use crate::reload::Hub;
use crate::{debug, log};

use runtime::{Cycle, Outcome};

/// How long teardown waits for open HTTP connections.
const SERVER_DRAIN: Duration = Duration::from_secs(1);

/// Runner - owns every component for the lifetime of `devloop run`.
pub struct Runner {
    config: DevConfig,
    shutdown_rx: Option<Receiver<()>>,
}

impl Runner {
    pub fn new(config: DevConfig) -> Self {
        Self {
            config,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run until shutdown.
    ///
    /// Setup failures (unbuildable root, missing toolchain, busy port,
    /// unwatchable root) and fatal watcher errors are returned; build and
    /// spawn failures are logged and wait for the next change.
    pub async fn run(mut self) -> Result<()> {
        let config = &self.config;
        let root = config.root.as_path();

        let project = Project::detect(config)?;
        project.check_toolchain()?;
        debug!("run"; "project {:?}", project);

        let builder = Arc::new(Builder::new(root, project));
        let supervisor =
            Arc::new(Supervisor::new(builder.artifact(), root).envs(config.env.iter()));

        // HTTP
        let listener = server::bind(config.serve.port).await?;
        let hub = Hub::new();
        let live = LiveReload::new(hub.clone(), config.debug());
        let router = compose(status_router(config, builder.project().name()), &[&live]);
        if let Ok(addr) = listener.local_addr() {
            let mode = if live.is_enabled() { "on" } else { "off" };
            log!("serve"; "http://{} (live reload {})", addr, mode);
        }
        let (server_stop, stopped) = oneshot::channel::<()>();
        let server_task = tokio::spawn(server::serve(listener, router, async move {
            let _ = stopped.await;
        }));

        let cycle = Arc::new(Cycle::new(
            Arc::clone(&builder),
            Arc::clone(&supervisor),
            hub.clone(),
        ));
        if let Outcome::Restarted(pid) = cycle.rebuild().await {
            debug!("run"; "first child is pid {}", pid);
        }

        // Watch
        let watcher = Watcher::start(root, config.watch.ignore.clone()).map_err(SetupError::from)?;
        let (events, errors, guard) = watcher.into_parts();

        let mut debouncer = Debouncer::new(config.watch.debounce());
        {
            let cycle = Arc::clone(&cycle);
            debouncer.subscribe(patterns::rebuild_pattern(&config.watch)?, move || {
                let cycle = Arc::clone(&cycle);
                async move {
                    cycle.rebuild().await;
                }
            });
        }
        if let Some(pattern) = patterns::reload_pattern(&config.watch)? {
            let hub = hub.clone();
            debouncer.subscribe(pattern, move || {
                let hub = hub.clone();
                async move {
                    log!("watch"; "reloading browsers");
                    hub.reload();
                }
            });
        }
        log!("watch"; "watching {}", root.display());

        let debounce_task = tokio::spawn(debouncer.run(events));
        let error_task = runtime::log_watch_errors(errors);

        let fatal = runtime::wait_for_shutdown(self.shutdown_rx.take(), error_task).await;
        if fatal.is_some() {
            // Wakes the signal receiver still blocked on the pool.
            request_shutdown();
        }

        // Teardown
        drop(guard);
        if let Err(e) = debounce_task.await {
            debug!("run"; "debouncer task: {}", e);
        }
        supervisor.stop().await;
        builder.remove_artifact();
        let _ = server_stop.send(());
        if tokio::time::timeout(SERVER_DRAIN, server_task).await.is_err() {
            debug!("serve"; "connections still open, dropping them");
        }
        log!("run"; "shutdown");

        match fatal {
            Some(e) => Err(SetupError::from(e).into()),
            None => Ok(()),
        }
    }
}

/// Fallback page for every non-reserved path.
fn status_router(config: &DevConfig, name: &str) -> Router {
    let page = STATUS_HTML.render(&StatusVars {
        name: name.to_string(),
        root: config.root.display().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    });
    Router::new().fallback(move || {
        let page = page.clone();
        async move { Html(page) }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::actor::build::artifact_path;
    use std::path::Path;
    use tempfile::TempDir;

    fn builds(root: &Path) -> usize {
        std::fs::read_to_string(root.join("builds.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    fn config(root: &Path) -> DevConfig {
        let mut config = DevConfig::load(root).unwrap();
        config.build.command = vec![
            "sh".into(),
            "-c".into(),
            r#"echo x >> builds.log && printf '#!/bin/sh\nexec sleep 30\n' > "$DEVLOOP_OUTPUT" && chmod +x "$DEVLOOP_OUTPUT""#.into(),
        ];
        config.watch.patterns = vec!["*.src".into()];
        config.watch.debounce_ms = 100;
        config.serve.port = 0;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_rebuilds_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let config = config(&root);
        let project = Project::detect(&config).unwrap();
        let artifact = artifact_path(&root, project.name());

        let (tx, rx) = crossbeam::channel::bounded(1);
        let runner = tokio::spawn(Runner::new(config).with_shutdown_signal(rx).run());

        assert!(wait_until(|| builds(&root) == 1 && artifact.is_file()).await);

        // The watcher registers after the first build; save until it notices.
        let mut rebuilt = false;
        for i in 0..10 {
            std::fs::write(root.join("main.src"), format!("v{i}")).unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            if builds(&root) >= 2 {
                rebuilt = true;
                break;
            }
        }
        assert!(rebuilt);

        tx.send(()).unwrap();
        runner.await.unwrap().unwrap();
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_unbuildable_root_fails_setup() {
        let temp = TempDir::new().unwrap();
        let config = DevConfig::load(temp.path()).unwrap();

        let err = Runner::new(config).run().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::NotBuildable(_))
        ));
    }

    #[tokio::test]
    async fn test_status_page() {
        use axum::body::{Body, to_bytes};
        use axum::http::Request;
        use tower::ServiceExt;

        let temp = TempDir::new().unwrap();
        let config = DevConfig::load(temp.path()).unwrap();
        let router = status_router(&config, "app<1>");

        let request = Request::builder().uri("/any/path").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        assert!(body.contains("app&lt;1&gt;"));
        assert!(body.contains("</head>"));
    }
}
