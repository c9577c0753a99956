//! ServerConfig builder - サーバー設定の構築と起動前検証
//!
//! # Fail-fast 設計
//! - route は `(method, path)` で一意でなければならない
//! - path は `/` で始まり、パラメータ（`:name` / `*name`）は 1 セグメント全体を占める
//! - 同じ prefix の位置で名前の違うパラメータは共存できない（router が拒否する）
//! - `build()` 時にチェックし、あれば `ConfigError` を返す（`init` で panic させない）

use std::collections::HashSet;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::app::pipeline::{ErrorRenderer, ErrorReporter, Next};
use crate::domain::{AmbientContext, ErrorEnvelope, Result};
use crate::impls::ContextHandle;
use crate::ports::Resolver;
use crate::registry::Interpreters;
use crate::router::{Method, Route};

/// Wraps the router after the built-in layers; applied in registration order.
pub type Middleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// Everything `init` needs.
#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: IpAddr,
    pub routes: Vec<Route>,
    pub middleware: Vec<Middleware>,
    pub interpreters: Interpreters,
    pub context: AmbientContext,
    pub on_error: Option<ErrorReporter>,
    pub handle_error: Option<ErrorRenderer>,
    pub disable_helmet: bool,
    pub disable_cookie: bool,
    pub disable_body_parser: bool,
    /// Silences the "listening" log line.
    pub test: bool,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;

    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("routes", &self.routes.len())
            .field("middleware", &self.middleware.len())
            .field("interpreters", &self.interpreters)
            .field("on_error", &self.on_error.is_some())
            .field("handle_error", &self.handle_error.is_some())
            .field("disable_helmet", &self.disable_helmet)
            .field("disable_cookie", &self.disable_cookie)
            .field("disable_body_parser", &self.disable_body_parser)
            .field("test", &self.test)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute { method: Method, path: String },

    #[error("invalid route {method} {path}: {reason}")]
    InvalidRoute {
        method: Method,
        path: String,
        reason: String,
    },
}

/// # 使用例
/// ```ignore
/// let config = ServerConfig::builder()
///     .port(3000)
///     .route(router::get("/hello-world", Handler::script(hello)))
///     .context(json!({ "value": "foobar" }))
///     .build()?;
/// ```
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                port: ServerConfig::DEFAULT_PORT,
                host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                routes: Vec::new(),
                middleware: Vec::new(),
                interpreters: Interpreters::new(),
                context: AmbientContext::default(),
                on_error: None,
                handle_error: None,
                disable_helmet: false,
                disable_cookie: false,
                disable_body_parser: false,
                test: false,
            },
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.config.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.config.routes.extend(routes);
        self
    }

    pub fn middleware<F>(mut self, f: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.config.middleware.push(Arc::new(f));
        self
    }

    /// Caller overrides; win over the base command set on a name collision.
    pub fn interpreters(mut self, interpreters: Interpreters) -> Self {
        self.config.interpreters = interpreters;
        self
    }

    pub fn interpreter(mut self, name: impl Into<String>, resolver: Arc<dyn Resolver>) -> Self {
        self.config.interpreters.insert(name, resolver);
        self
    }

    pub fn interpreter_fn<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, AmbientContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.config.interpreters = self.config.interpreters.with_fn(name, f);
        self
    }

    pub fn context(mut self, context: impl Into<AmbientContext>) -> Self {
        self.config.context = context.into();
        self
    }

    /// Async reporting hook. The returned future must own what it needs.
    ///
    /// ```ignore
    /// .on_error(|err, _ambient| {
    ///     let message = err.message();
    ///     async move { collector.send(message).await }
    /// })
    /// ```
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&ErrorEnvelope, &AmbientContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.config.on_error = Some(Arc::new(
            move |err: &ErrorEnvelope, ambient: &AmbientContext| -> BoxFuture<'static, ()> {
                Box::pin(f(err, ambient))
            },
        ));
        self
    }

    pub fn handle_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextHandle, Next<'_>, &ErrorEnvelope, &AmbientContext) + Send + Sync + 'static,
    {
        self.config.handle_error = Some(Arc::new(f));
        self
    }

    pub fn disable_helmet(mut self, disable: bool) -> Self {
        self.config.disable_helmet = disable;
        self
    }

    pub fn disable_cookie(mut self, disable: bool) -> Self {
        self.config.disable_cookie = disable;
        self
    }

    pub fn disable_body_parser(mut self, disable: bool) -> Self {
        self.config.disable_body_parser = disable;
        self
    }

    pub fn test(mut self, test: bool) -> Self {
        self.config.test = test;
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> std::result::Result<ServerConfig, ConfigError> {
        let mut seen = HashSet::new();
        let mut paths: Vec<&str> = Vec::new();
        for route in &self.config.routes {
            if !seen.insert((route.method, route.path.as_str())) {
                return Err(ConfigError::DuplicateRoute {
                    method: route.method,
                    path: route.path.clone(),
                });
            }

            let invalid = |reason: String| ConfigError::InvalidRoute {
                method: route.method,
                path: route.path.clone(),
                reason,
            };
            check_path(&route.path).map_err(invalid)?;
            for other in &paths {
                check_conflict(other, &route.path).map_err(invalid)?;
            }
            if !paths.contains(&route.path.as_str()) {
                paths.push(&route.path);
            }
        }
        Ok(self.config)
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('*')
}

/// Shape rules the axum router enforces with a panic.
fn check_path(path: &str) -> std::result::Result<(), String> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("path must start with `/`".to_string());
    };
    let segments: Vec<&str> = rest.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if is_param(segment) {
            if segment.len() == 1 {
                return Err(format!("parameter `{segment}` has no name"));
            }
            if segment[1..].contains([':', '*']) {
                return Err(format!("`{segment}` must be a single parameter"));
            }
            if segment.starts_with('*') && i + 1 != segments.len() {
                return Err(format!("wildcard `{segment}` must be the last segment"));
            }
        } else if segment.contains([':', '*']) {
            return Err(format!("parameter in `{segment}` must span the whole segment"));
        }
    }
    Ok(())
}

/// Two paths conflict when, after an identical prefix, they put differently
/// named parameters at the same position.
fn check_conflict(existing: &str, path: &str) -> std::result::Result<(), String> {
    for (a, b) in existing.split('/').zip(path.split('/')) {
        if a == b {
            continue;
        }
        if is_param(a) && is_param(b) {
            return Err(format!("`{b}` conflicts with `{a}` in `{existing}`"));
        }
        return Ok(());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::router;
    use rstest::rstest;

    fn noop() -> Handler {
        Handler::plain(|_args| async move { Ok(None) })
    }

    #[test]
    fn test_build_defaults() {
        let config = ServerConfig::builder().build().unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.routes.is_empty());
        assert!(!config.disable_helmet && !config.disable_cookie && !config.disable_body_parser);
        assert!(!config.test);
        assert!(config.on_error.is_none() && config.handle_error.is_none());
    }

    #[test]
    fn test_build_duplicate_route() {
        let result = ServerConfig::builder()
            .route(router::get("/a", noop()))
            .route(router::post("/a", noop()))
            .route(router::get("/a", noop()))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateRoute { method: Method::Get, path }) if path == "/a"
        ));
    }

    #[rstest]
    #[case::no_leading_slash("hello")]
    #[case::empty_param("/a/:")]
    #[case::inline_param("/a/x:id")]
    #[case::wildcard_not_last("/a/*rest/b")]
    fn test_build_rejects_malformed_path(#[case] path: &str) {
        let result = ServerConfig::builder().route(router::get(path, noop())).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRoute { method: Method::Get, path: p, .. }) if p == path
        ));
    }

    #[test]
    fn test_build_rejects_param_name_conflict() {
        let result = ServerConfig::builder()
            .route(router::get("/a/:id", noop()))
            .route(router::post("/a/:name", noop()))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRoute { method: Method::Post, path, .. }) if path == "/a/:name"
        ));
    }

    #[test]
    fn test_build_accepts_routes_axum_can_mount() {
        let config = ServerConfig::builder()
            .route(router::get("/", noop()))
            .route(router::get("/a/:id", noop()))
            .route(router::put("/a/:id", noop()))
            .route(router::get("/a/:id/items/:item", noop()))
            .route(router::get("/files/*path", noop()))
            .build()
            .unwrap();

        // same shape the server mounts; must not panic
        let _server = crate::app::server::init(config);
    }

    #[test]
    fn test_build_collects_options() {
        let config = ServerConfig::builder()
            .port(0)
            .routes([router::get("/a", noop()), router::delete("/a", noop())])
            .interpreter_fn("ping", |_, _| async move { Ok(Value::from("pong")) })
            .context(serde_json::json!({ "value": "foobar" }))
            .on_error(|_err, _ctx| async {})
            .handle_error(|_ctx, next, _err, _ambient| next.run())
            .middleware(|router| router)
            .disable_helmet(true)
            .test(true)
            .build()
            .unwrap();

        assert_eq!(config.port, 0);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.interpreters.len(), 1);
        assert_eq!(config.middleware.len(), 1);
        assert!(config.on_error.is_some() && config.handle_error.is_some());
        assert!(config.disable_helmet && config.test);
    }
}
