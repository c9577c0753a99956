//! Server - route table を axum の Router に組み立て、listen/stop を管理する
//!
//! # 状態遷移
//! ```text
//! Created --start()--> Listening --stop()--> Stopped
//!    \______________________stop()_______________/
//! ```
//! - `stop()` は何度呼んでも Ok（Listening 以外では何もしない）
//! - Stopped から再度 `start()` はできない

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use indexmap::IndexMap;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::app::builder::ServerConfig;
use crate::app::lifecycle::Lifecycle;
use crate::app::pipeline::ErrorPipeline;
use crate::commands::universal;
use crate::domain::{Result, TransportFailure};
use crate::handler::Handler;
use crate::impls::{ContextHandle, Exchange, Parsing};
use crate::registry::Registry;
use crate::router::Method;

/// Headers added to every response unless the handler set them.
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-xss-protection", "0"),
];

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Put => MethodFilter::PUT,
            Method::Patch => MethodFilter::PATCH,
            Method::Delete => MethodFilter::DELETE,
            Method::Head => MethodFilter::HEAD,
            Method::Options => MethodFilter::OPTIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Created,
    Listening(SocketAddr),
    Stopped,
}

enum ServerState {
    Created,
    Listening {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        join: JoinHandle<std::io::Result<()>>,
    },
    Stopped,
}

pub struct Server {
    router: Router,
    host: IpAddr,
    port: u16,
    test: bool,
    state: Mutex<ServerState>,
}

/// Assemble a server from `config`. Nothing is bound until `start`.
///
/// # フロー
/// 1. base commands と `config.interpreters` をマージ（caller 側が勝つ）
/// 2. route を path ごとにまとめて Router へ
/// 3. security headers → middleware の順に layer を重ねる
pub fn init(config: ServerConfig) -> Server {
    let registry = Registry::merge(universal(), config.interpreters);
    let pipeline = ErrorPipeline::new(config.context.clone())
        .with_reporter(config.on_error)
        .with_renderer(config.handle_error);
    let lifecycle = Arc::new(Lifecycle::new(registry, config.context, pipeline));
    let parsing = Parsing {
        cookies: !config.disable_cookie,
        body: !config.disable_body_parser,
    };

    let mut grouped: IndexMap<String, MethodRouter> = IndexMap::new();
    for route in config.routes {
        let slot = grouped.entry(route.path).or_insert_with(MethodRouter::new);
        let methods = std::mem::replace(slot, MethodRouter::new());
        *slot = methods.on(
            route.method.into(),
            endpoint(Arc::clone(&lifecycle), route.handler, parsing),
        );
    }

    let mut router = grouped
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
        .fallback(|| async { Exchange::default().into_response() });

    if !config.disable_helmet {
        for (name, value) in SECURITY_HEADERS {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ));
        }
    }
    for middleware in &config.middleware {
        router = middleware(router);
    }

    tracing::debug!(commands = ?lifecycle.registry().names(), "server initialized");

    Server {
        router,
        host: config.host,
        port: config.port,
        test: config.test,
        state: Mutex::new(ServerState::Created),
    }
}

fn endpoint(
    lifecycle: Arc<Lifecycle>,
    handler: Handler,
    parsing: Parsing,
) -> impl Fn(Request) -> futures::future::BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |req: Request| -> futures::future::BoxFuture<'static, Response> {
        let lifecycle = Arc::clone(&lifecycle);
        let handler = handler.clone();
        Box::pin(async move {
            let exchange = match Exchange::from_request(req, parsing).await {
                Ok(exchange) => exchange,
                Err(rejection) => return rejection,
            };
            let ctx = ContextHandle::new(exchange);
            lifecycle.handle(&handler, &ctx).await;
            ctx.take().into_response()
        })
    }
}

impl Server {
    /// The assembled router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn status(&self) -> ServerStatus {
        match &*self.state.lock().await {
            ServerState::Created => ServerStatus::Created,
            ServerState::Listening { addr, .. } => ServerStatus::Listening(*addr),
            ServerState::Stopped => ServerStatus::Stopped,
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match self.status().await {
            ServerStatus::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// Bind and serve in the background. Port 0 picks a free port.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut state = self.state.lock().await;
        match &*state {
            ServerState::Created => {}
            ServerState::Listening { addr, .. } => {
                return Err(TransportFailure::AlreadyListening(*addr).into());
            }
            ServerState::Stopped => return Err(TransportFailure::Stopped.into()),
        }

        let listener = TcpListener::bind((self.host, self.port))
            .await
            .map_err(|source| TransportFailure::Bind {
                port: self.port,
                source,
            })?;
        let addr = listener.local_addr().map_err(TransportFailure::Serve)?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let router = self.router.clone();
        let join = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });

        if !self.test {
            tracing::info!("Server Listening on Port {}", addr.port());
        }
        *state = ServerState::Listening {
            addr,
            shutdown,
            join,
        };
        Ok(addr)
    }

    /// Close the listener and wait for in-flight requests.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ServerState::Stopped);
        let ServerState::Listening {
            addr,
            shutdown,
            join,
        } = previous
        else {
            return Ok(());
        };

        // receiver gone means the serve task already ended
        let _ = shutdown.send(());
        join.await
            .map_err(|e| TransportFailure::Join(e.to_string()))?
            .map_err(TransportFailure::Serve)?;

        if !self.test {
            tracing::info!(%addr, "Server Stopped");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("test", &self.test)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EffrouteError, send};
    use crate::router;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn config() -> crate::app::builder::ServerConfigBuilder {
        ServerConfig::builder().port(0).test(true)
    }

    async fn call(server: &Server, method: &str, uri: &str) -> Response {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        server.router().oneshot(req).await.unwrap()
    }

    async fn json_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn same_path_different_methods_share_a_route() {
        let server = init(
            config()
                .route(router::get("/thing", Handler::plain(|_| async { Ok(Some(send(json!("get")))) })))
                .route(router::delete("/thing", Handler::plain(|_| async { Ok(Some(send(json!({ "deleted": true }))))})))
                .build()
                .unwrap(),
        );

        let response = call(&server, "DELETE", "/thing").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await, json!({ "deleted": true }));

        let response = call(&server, "GET", "/thing").await;
        assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn caller_interpreter_overrides_base_command() {
        let handler = Handler::script(|_args, fx| async move {
            let value = fx.perform(crate::commands::cmds::echo(json!("ignored"))).await?;
            Ok(Some(send(value)))
        });
        let server = init(
            config()
                .route(router::get("/", handler))
                .interpreter_fn(crate::commands::ECHO, |_, _| async { Ok(json!({ "overridden": true })) })
                .build()
                .unwrap(),
        );

        let response = call(&server, "GET", "/").await;
        assert_eq!(json_of(response).await, json!({ "overridden": true }));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = init(config().build().unwrap());
        let response = call(&server, "GET", "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failure_status_is_rendered() {
        let handler = Handler::plain(|_| async {
            Err(EffrouteError::Handler(
                crate::domain::HandlerFailure::new("nope").with_status(403),
            ))
        });
        let server = init(config().route(router::get("/", handler)).build().unwrap());

        let response = call(&server, "GET", "/").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_of(response).await, json!({ "message": "nope" }));
    }

    #[tokio::test]
    async fn middleware_wraps_router() {
        let server = init(
            config()
                .route(router::get("/", Handler::plain(|_| async { Ok(Some(send(json!(1)))) })))
                .middleware(|router| {
                    router.layer(SetResponseHeaderLayer::overriding(
                        HeaderName::from_static("x-powered-by"),
                        HeaderValue::from_static("effroute"),
                    ))
                })
                .build()
                .unwrap(),
        );

        let response = call(&server, "GET", "/").await;
        assert_eq!(response.headers()["x-powered-by"], "effroute");
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let server = init(config().build().unwrap());
        assert_eq!(server.status().await, ServerStatus::Created);

        let addr = server.start().await.unwrap();
        assert_eq!(server.local_addr().await, Some(addr));
        assert!(matches!(
            server.start().await,
            Err(EffrouteError::Transport(TransportFailure::AlreadyListening(_)))
        ));

        server.stop().await.unwrap();
        assert_eq!(server.status().await, ServerStatus::Stopped);
        server.stop().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(EffrouteError::Transport(TransportFailure::Stopped))
        ));
    }

    #[tokio::test]
    async fn stop_before_start_is_ok() {
        let server = init(config().build().unwrap());
        server.stop().await.unwrap();
        assert_eq!(server.status().await, ServerStatus::Stopped);
    }
}
