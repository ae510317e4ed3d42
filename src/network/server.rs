//! HTTP Transport
//!
//! Game masters speak plain HTTP: one POST per message, response body in
//! `text/acl`. The transport layer is deliberately thin; it stamps the
//! arrival instant, enforces the method and a minimum body length, and
//! hands everything else to [`GgpHandler`]. Every request path gets a
//! response, whatever the path used, so the router is a single fallback.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{error, info, warn};

use crate::network::handler::GgpHandler;

/// Listener configuration for a player endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port. 4001 is the conventional GGP player port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4001,
        }
    }
}

/// An HTTP server wrapping one [`GgpHandler`].
pub struct PlayerServer {
    config: ServerConfig,
    handler: Arc<GgpHandler>,
}

impl PlayerServer {
    /// Wrap a handler with the given listener configuration.
    pub fn new(config: ServerConfig, handler: GgpHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Bind the listener and serve until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = Router::new()
            .fallback(handle_request)
            .with_state(self.handler);
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "GGP player listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn handle_request(
    State(handler): State<Arc<GgpHandler>>,
    method: Method,
    body: Bytes,
) -> Response {
    let arrived_at = Instant::now();
    let (status, body) = process(&handler, arrived_at, &method, &body).await;
    (
        status,
        [
            (header::CONTENT_TYPE, "text/acl"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

async fn process(
    handler: &GgpHandler,
    arrived_at: Instant,
    method: &Method,
    body: &[u8],
) -> (StatusCode, String) {
    // Error bodies stay empty on every path: the master only ever sees
    // protocol tokens or a bare status.
    if method != Method::POST {
        warn!(%method, "non-POST method not supported");
        return (StatusCode::METHOD_NOT_ALLOWED, String::new());
    }
    // Anything this short cannot hold a GGP message; drop it before it
    // takes a queue slot.
    if body.len() <= 5 {
        warn!("message content too short to be meaningful");
        return (StatusCode::BAD_REQUEST, String::new());
    }
    let Ok(text) = std::str::from_utf8(body) else {
        warn!("request body is not valid UTF-8");
        return (StatusCode::BAD_REQUEST, String::new());
    };

    match handler.handle(arrived_at, text).await {
        Ok(response) => (StatusCode::OK, response),
        Err(err) => {
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(%err, "request failed");
            } else {
                warn!(%err, "request refused");
            }
            (status, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Deadline;
    use crate::network::player::SimplePlayer;

    struct Noop;

    impl SimplePlayer for Noop {
        fn on_update(&mut self, _moves: &[(String, String)]) {}

        fn on_select(&mut self, _deadline: Deadline) -> String {
            "noop".to_string()
        }
    }

    fn noop_handler() -> GgpHandler {
        GgpHandler::simple(Noop)
    }

    #[tokio::test]
    async fn test_non_post_is_405() {
        let handler = noop_handler();
        let (status, _) = process(&handler, Instant::now(), &Method::GET, b"(INFO)").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_short_body_is_400() {
        let handler = noop_handler();
        let (status, _) = process(&handler, Instant::now(), &Method::POST, b"(hi)").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_400() {
        let handler = noop_handler();
        let (status, _) =
            process(&handler, Instant::now(), &Method::POST, &[0xff; 10]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unrecognized_message_is_400() {
        let handler = noop_handler();
        let (status, _) =
            process(&handler, Instant::now(), &Method::POST, b"(HELLO world)").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_error_responses_carry_no_body() {
        let handler = noop_handler();
        for (method, body) in [
            (Method::GET, b"(INFO)" as &[u8]),
            (Method::POST, b"(hi)"),
            (Method::POST, b"(HELLO world)"),
            (Method::POST, b"(PLAY m9 NIL)"),
        ] {
            let (status, response) = process(&handler, Instant::now(), &method, body).await;
            assert!(!status.is_success());
            assert_eq!(response, "", "unexpected body for {status}");
        }
    }

    #[tokio::test]
    async fn test_match_flow_is_200() {
        let handler = noop_handler();
        let now = Instant::now();

        let (status, body) = process(
            &handler,
            now,
            &Method::POST,
            b"(START m1 x ((role x) (role o)) 10 2)",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");

        let (status, body) = process(&handler, now, &Method::POST, b"(PLAY m1 NIL)").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "noop");
    }

    #[tokio::test]
    async fn test_unstartable_game_is_200_with_empty_body() {
        let handler = noop_handler();
        let (status, body) = process(
            &handler,
            Instant::now(),
            &Method::POST,
            b"(START m1 x ((init a)) 10 2)",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }
}
