//! Live reload HTTP surface.
//!
//! [`LiveReload`] is a [`Middleware`]: given the host application's
//! router it returns one that also serves
//!
//! - `GET /livereload.js` - the browser client
//! - `GET /livereload` - WebSocket upgrade into a hub peer
//!
//! and runs every other response through the injector. With debug off
//! the router is returned as is and the hub never starts.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;

use super::hub::Hub;
use super::{inject, peer};
use crate::core::SetupError;
use crate::embed::serve::LIVERELOAD_JS;

/// Published URL of the client script.
pub const SCRIPT_PATH: &str = "/livereload.js";

/// WebSocket endpoint.
pub const SOCKET_PATH: &str = "/livereload";

/// A router transformation; applied in order, the first is innermost.
pub trait Middleware {
    fn wrap(&self, router: Router) -> Router;
}

/// Apply `middlewares` to `router` in order.
pub fn compose(router: Router, middlewares: &[&dyn Middleware]) -> Router {
    middlewares.iter().fold(router, |router, m| m.wrap(router))
}

#[derive(Clone)]
pub struct LiveReload {
    hub: Hub,
    enabled: bool,
}

impl LiveReload {
    pub fn new(hub: Hub, enabled: bool) -> Self {
        Self { hub, enabled }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Middleware for LiveReload {
    fn wrap(&self, router: Router) -> Router {
        if !self.enabled {
            return router;
        }
        self.hub.start();

        // Reserved routes are merged after the layer so they bypass injection.
        let reserved = Router::new()
            .route(SCRIPT_PATH, get(script))
            .route(SOCKET_PATH, get(socket))
            .with_state(self.hub.clone());

        router
            .layer(axum::middleware::from_fn(inject::layer))
            .merge(reserved)
    }
}

async fn script() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/javascript")], LIVERELOAD_JS)
}

async fn socket(State(hub): State<Hub>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| peer::serve(hub, socket))
}

/// Bind `127.0.0.1:<port>`.
pub async fn bind(port: u16) -> Result<TcpListener, SetupError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| SetupError::Bind { addr, source })
}

/// Serve `router` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::message::Message;
    use axum::body::{Body, to_bytes};
    use axum::http::header::HOST;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    const PAGE: &str = "<html><head><title>X</title></head><body>Y</body></html>";

    fn app() -> Router {
        Router::new().route(
            "/",
            get(|| async { axum::response::Html(PAGE) }),
        )
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let request = Request::builder()
            .uri(uri)
            .header(HOST, "h")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_disabled_is_passthrough() {
        let live = LiveReload::new(Hub::new(), false);
        let router = live.wrap(app());

        let (status, _, body) = get_body(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PAGE);

        let (status, _, _) = get_body(router, SCRIPT_PATH).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!live.hub().is_started());
    }

    #[tokio::test]
    async fn test_enabled_injects_and_serves_script() {
        let live = LiveReload::new(Hub::new(), true);
        let router = live.wrap(app());
        assert!(live.hub().is_started());

        let (_, _, body) = get_body(router.clone(), "/").await;
        assert_eq!(
            body,
            r#"<html><head><title>X</title><script src="//h/livereload.js"></script></head><body>Y</body></html>"#
        );

        let (status, content_type, body) = get_body(router, SCRIPT_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/javascript"));
        assert_eq!(body, LIVERELOAD_JS);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_setup_error() {
        let first = bind(0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind(port).await.unwrap_err();
        assert!(matches!(err, SetupError::Bind { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handshake_end_to_end() {
        let live = LiveReload::new(Hub::new(), true);
        let router = live.wrap(app());
        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, router, std::future::pending()));

        let frames = tokio::task::spawn_blocking(move || {
            use tungstenite::Message as Frame;

            let url = format!("ws://127.0.0.1:{port}{SOCKET_PATH}");
            let (mut socket, _) = tungstenite::connect(url).unwrap();
            socket
                .send(Frame::text(
                    r#"{"command":"hello","protocols":["http://livereload.com/protocols/official-7"]}"#,
                ))
                .unwrap();

            let mut frames = Vec::new();
            while frames.len() < 2 {
                if let Frame::Text(text) = socket.read().unwrap() {
                    frames.push(text.as_str().to_owned());
                }
            }
            socket.close(None).unwrap();
            frames
        })
        .await
        .unwrap();

        assert_eq!(Message::from_json(&frames[0]), Some(Message::hello()));
        assert_eq!(Message::from_json(&frames[1]), Some(Message::reload()));

        // Closing the client removes the peer.
        let hub = live.hub().clone();
        let mut count = hub.peer_count().await;
        for _ in 0..100 {
            if count == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            count = hub.peer_count().await;
        }
        assert_eq!(count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_broadcast_reaches_browser() {
        let live = LiveReload::new(Hub::new(), true);
        let router = live.wrap(app());
        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, router, std::future::pending()));

        let url = format!("ws://127.0.0.1:{port}{SOCKET_PATH}");
        let (mut socket, _) = tokio::task::spawn_blocking(move || tungstenite::connect(url).unwrap())
            .await
            .unwrap();

        let hub = live.hub().clone();
        for _ in 0..100 {
            if hub.peer_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        hub.alert("compile error");

        let frame = tokio::task::spawn_blocking(move || socket.read().unwrap())
            .await
            .unwrap();
        assert_eq!(
            Message::from_json(frame.to_text().unwrap()),
            Some(Message::alert("compile error"))
        );
    }
}
